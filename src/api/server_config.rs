//! Server limits

use std::time::Duration;

/// Concurrent request limit
pub const MAX_CONCURRENCY: usize = 256;

/// Request body limit
pub const MAX_BODY_SIZE: usize = 16 * 1024; // 16KB

/// Request timeout. A cold-start scoring request trains inline, so this has
/// to cover one full training run.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How often expired sessions are swept
pub const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Session cookie name
pub const SESSION_COOKIE_NAME: &str = "fraud_gate_session";
