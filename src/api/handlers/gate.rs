//! Identity, code and amount handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::Json,
};
use std::sync::Arc;
use tracing::info;

use crate::api::server::FraudGateServer;
use crate::api::types::*;
use crate::auth::{parse_amount, GateError, GateState};
use crate::risk::ScoreOutcome;

fn next_step(state: GateState) -> &'static str {
    match state {
        GateState::Start => "/api/identity",
        GateState::PhoneSubmitted => "/api/code",
        GateState::PinVerified => "/api/amount",
    }
}

/// POST /api/identity
pub async fn submit_identity(
    State(state): State<Arc<FraudGateServer>>,
    headers: HeaderMap,
    Json(req): Json<IdentityRequest>,
) -> Result<(HeaderMap, Json<GateStateResponse>), GateError> {
    let existing = state.cookies.token_from_headers(&headers);
    let token = state.gate.submit_identity(existing.as_deref(), &req.identifier)?;

    let mut response_headers = HeaderMap::new();
    state
        .cookies
        .set_session_cookie(&token, &mut response_headers)
        .map_err(GateError::Internal)?;

    Ok((
        response_headers,
        Json(GateStateResponse {
            state: GateState::PhoneSubmitted,
            next: next_step(GateState::PhoneSubmitted),
        }),
    ))
}

/// POST /api/code
pub async fn submit_code(
    State(state): State<Arc<FraudGateServer>>,
    headers: HeaderMap,
    Json(req): Json<CodeRequest>,
) -> Result<Json<GateStateResponse>, GateError> {
    let token = state
        .cookies
        .token_from_headers(&headers)
        .ok_or(GateError::SessionRequired)?;

    let gate_state = state
        .gate
        .submit_code(&token, &req.code, req.identifier.as_deref())?;

    Ok(Json(GateStateResponse {
        state: gate_state,
        next: next_step(gate_state),
    }))
}

/// POST /api/amount
///
/// The session is checked before the body: an unverified caller is refused
/// whatever it sent, and a malformed body from a verified caller is an
/// `invalid_amount` that keeps the verification. Admission consumes the
/// verification before scoring starts, so the verdict is returned with the
/// session already back at `phone_submitted`.
pub async fn submit_amount(
    State(state): State<Arc<FraudGateServer>>,
    headers: HeaderMap,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>, GateError> {
    let token = state.cookies.token_from_headers(&headers);
    let request = state.gate.admit_with(token.as_deref(), || match &payload {
        Ok(Json(req)) => parse_amount(&req.amount.as_raw()),
        Err(rejection) => Err(GateError::InvalidAmount(rejection.body_text())),
    })?;

    let cache = state.cache.clone();
    let scorer = state.scorer;
    let amount = request.amount;
    let outcome = tokio::task::spawn_blocking(move || {
        let lookup = cache.get_or_train();
        scorer.score(amount, &lookup)
    })
    .await
    .map_err(|e| GateError::Internal(format!("scoring task failed: {}", e)))?;

    info!(
        "Scored amount={} verdict={} nominal={}",
        amount,
        outcome.verdict(),
        outcome.is_nominal()
    );

    let (mode, reason) = match &outcome {
        ScoreOutcome::Scored { .. } => (ScoreMode::Model, None),
        ScoreOutcome::Degraded { reason, .. } => {
            (ScoreMode::Fallback, state.debug.then(|| reason.clone()))
        }
    };

    Ok(Json(ScoreResponse {
        verdict: outcome.verdict(),
        mode,
        probability: outcome.probability(),
        reason,
        state: GateState::PhoneSubmitted,
    }))
}
