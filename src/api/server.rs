use crate::api::server_config::*;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::{limit::ConcurrencyLimitLayer, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::api::cookie_config::SessionCookies;
use crate::api::handlers;
use crate::auth::SessionGate;
use crate::config::AppConfig;
use crate::risk::{CsvTrainer, ModelCache, ModelTrainer, Scorer};
use axum::error_handling::HandleErrorLayer;
use tower::BoxError;

#[derive(Clone)]
pub struct FraudGateServer {
    pub gate: Arc<SessionGate>,
    pub cache: Arc<ModelCache>,
    pub scorer: Scorer,
    pub cookies: SessionCookies,
    pub host: String,
    pub port: u16,
    /// Exposes degraded reasons in responses
    pub debug: bool,
}

impl FraudGateServer {
    /// Server training from the configured CSV dataset.
    pub fn new(config: &AppConfig) -> Self {
        let trainer = CsvTrainer::new(config.dataset_path.clone(), config.trainer_config());
        Self::with_trainer(config, Box::new(trainer))
    }

    /// Server with an arbitrary model source.
    pub fn with_trainer(config: &AppConfig, trainer: Box<dyn ModelTrainer>) -> Self {
        let cache = Arc::new(ModelCache::with_retry_cooldown(
            trainer,
            config.retrain_cooldown(),
        ));
        let cookies = SessionCookies::new(
            SESSION_COOKIE_NAME,
            &config.secret_key,
            i64::try_from(config.session_ttl_secs).unwrap_or(i64::MAX),
            !config.debug,
        );

        Self {
            gate: Arc::new(SessionGate::new(config.static_pin.clone(), config.session_ttl())),
            cache,
            scorer: Scorer::new(config.fallback_amount_threshold),
            cookies,
            host: config.host.clone(),
            port: config.port,
            debug: config.debug,
        }
    }

    pub fn create_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/api/model/status", get(handlers::model_status))
            .route("/api/identity", post(handlers::submit_identity))
            .route("/api/code", post(handlers::submit_code))
            .route("/api/amount", post(handlers::submit_amount))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    // Convert middleware errors (timeout/overload) into HTTP responses
                    .layer(HandleErrorLayer::new(|err: BoxError| async move {
                        if err.is::<tower::timeout::error::Elapsed>() {
                            (StatusCode::REQUEST_TIMEOUT, "request timed out")
                        } else {
                            (StatusCode::SERVICE_UNAVAILABLE, "service overloaded")
                        }
                    }))
                    .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENCY))
                    .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
                    .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                    .layer(TraceLayer::new_for_http()),
            )
    }

    pub async fn start(self) -> Result<(), anyhow::Error> {
        let cleanup = self.gate.clone().start_cleanup_task(SESSION_CLEANUP_INTERVAL);

        let addr = format!("{}:{}", self.host, self.port);
        let app = self.create_router();
        tracing::info!("Server listening on {}", addr);
        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        cleanup.abort();
        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
