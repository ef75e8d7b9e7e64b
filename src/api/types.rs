use serde::{Deserialize, Serialize};

use crate::auth::GateState;
use crate::risk::{CacheStatus, DegradedReason, Verdict};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityRequest {
    /// Phone number or other identifier
    pub identifier: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodeRequest {
    pub code: String,
    /// Must match the session's identifier when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// Amount as typed by the user: a JSON number or a string
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    /// Raw text handed to the gate's amount parser
    pub fn as_raw(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AmountRequest {
    pub amount: AmountInput,
}

#[derive(Debug, Serialize)]
pub struct GateStateResponse {
    pub state: GateState,
    /// Where to go next
    pub next: &'static str,
}

/// How the verdict was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    Model,
    Fallback,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub verdict: Verdict,
    pub mode: ScoreMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Only populated in debug mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DegradedReason>,
    pub state: GateState,
}

#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    #[serde(flatten)]
    pub cache: CacheStatus,
    pub fallback_amount_threshold: f64,
}
