//! Step-gated verification state machine
//!
//! ```text
//! START --submit_identity--> PHONE_SUBMITTED --submit_code--> PIN_VERIFIED
//!                                  ^                              |
//!                                  +-----------admit--------------+
//! ```
//!
//! Verification is one-shot: every admitted scoring request consumes it, and
//! the identity has to enter the code again for the next one. Sessions are
//! keyed by an opaque token and expire after an idle TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::errors::GateError;

/// Where an identity is in the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Start,
    PhoneSubmitted,
    PinVerified,
}

/// Per-client session
#[derive(Debug, Clone)]
pub struct IdentitySession {
    pub identifier: String,
    pub pin_verified: bool,
    pub created_at: Instant,
    pub last_seen: Instant,
}

impl IdentitySession {
    fn state(&self) -> GateState {
        if self.pin_verified {
            GateState::PinVerified
        } else {
            GateState::PhoneSubmitted
        }
    }
}

/// An admitted scoring request. Holding one means the session's
/// verification has already been consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringRequest {
    pub identifier: String,
    pub amount: f64,
}

/// Session store plus the configured secret code
pub struct SessionGate {
    sessions: RwLock<HashMap<String, IdentitySession>>,
    pin: String,
    session_ttl: Duration,
}

impl SessionGate {
    pub fn new(pin: impl Into<String>, session_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pin: pin.into().trim().to_string(),
            session_ttl,
        }
    }

    /// Start (or restart) a session for `identifier`.
    ///
    /// Reuses `token` when it names a live session, otherwise issues a new
    /// one. Either way the session ends up unverified.
    pub fn submit_identity(&self, token: Option<&str>, identifier: &str) -> Result<String, GateError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(GateError::InvalidIdentifier);
        }

        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let token = match token {
            Some(t) if sessions.get(t).is_some_and(|s| !self.is_expired(s, now)) => t.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        sessions.insert(
            token.clone(),
            IdentitySession {
                identifier: identifier.to_string(),
                pin_verified: false,
                created_at: now,
                last_seen: now,
            },
        );
        tracing::debug!("Identity submitted, session issued");
        Ok(token)
    }

    /// Check `code` against the configured secret.
    ///
    /// No lockout and no attempt counter: a mismatch leaves the session
    /// where it was and the caller may retry indefinitely.
    pub fn submit_code(
        &self,
        token: &str,
        code: &str,
        identifier: Option<&str>,
    ) -> Result<GateState, GateError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let session = self.live_session(&mut sessions, token, now)?;

        if let Some(claimed) = identifier {
            if claimed.trim() != session.identifier {
                return Err(GateError::IdentityMismatch);
            }
        }

        let matches: bool = code.trim().as_bytes().ct_eq(self.pin.as_bytes()).into();
        if !matches {
            tracing::info!("PIN mismatch for session");
            return Err(GateError::CodeMismatch);
        }

        session.pin_verified = true;
        Ok(GateState::PinVerified)
    }

    /// Admit one scoring request.
    ///
    /// Only a verified session is admitted. An unparseable amount is
    /// rejected without touching the session. On admission the verification
    /// is consumed under the same lock, so one code entry can never admit
    /// two requests.
    pub fn admit(&self, token: Option<&str>, raw_amount: &str) -> Result<ScoringRequest, GateError> {
        self.admit_with(token, || parse_amount(raw_amount))
    }

    /// [`Self::admit`] with a caller-supplied amount parser. `amount` runs
    /// only once the session is known to be verified, and its error leaves
    /// the verification in place.
    pub fn admit_with<F>(&self, token: Option<&str>, amount: F) -> Result<ScoringRequest, GateError>
    where
        F: FnOnce() -> Result<f64, GateError>,
    {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let session = match token {
            Some(token) => self
                .live_session(&mut sessions, token, now)
                .map_err(|_| GateError::NotVerified {
                    state: GateState::Start,
                })?,
            None => {
                return Err(GateError::NotVerified {
                    state: GateState::Start,
                })
            }
        };

        if !session.pin_verified {
            return Err(GateError::NotVerified {
                state: session.state(),
            });
        }

        let amount = amount()?;
        session.pin_verified = false;
        Ok(ScoringRequest {
            identifier: session.identifier.clone(),
            amount,
        })
    }

    /// Current state for `token`; unknown or expired tokens are at START.
    pub fn state(&self, token: &str) -> GateState {
        let now = Instant::now();
        self.sessions
            .read()
            .get(token)
            .filter(|s| !self.is_expired(s, now))
            .map(IdentitySession::state)
            .unwrap_or(GateState::Start)
    }

    /// Identifier bound to a live session
    pub fn identifier(&self, token: &str) -> Option<String> {
        let now = Instant::now();
        self.sessions
            .read()
            .get(token)
            .filter(|s| !self.is_expired(s, now))
            .map(|s| s.identifier.clone())
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Remove expired sessions, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        before - sessions.len()
    }

    /// Periodically run [`Self::cleanup_expired`].
    pub fn start_cleanup_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let cleaned = self.cleanup_expired();
                if cleaned > 0 {
                    tracing::info!("Session cleanup: removed {} expired sessions", cleaned);
                }
            }
        })
    }

    fn is_expired(&self, session: &IdentitySession, now: Instant) -> bool {
        now.duration_since(session.last_seen) > self.session_ttl
    }

    /// Live session for `token` with its idle timer refreshed
    fn live_session<'a>(
        &self,
        sessions: &'a mut HashMap<String, IdentitySession>,
        token: &str,
        now: Instant,
    ) -> Result<&'a mut IdentitySession, GateError> {
        if sessions.get(token).is_some_and(|s| self.is_expired(s, now)) {
            sessions.remove(token);
        }
        let session = sessions.get_mut(token).ok_or(GateError::SessionRequired)?;
        session.last_seen = now;
        Ok(session)
    }
}

/// Parse a user-entered amount as a non-negative finite number.
pub fn parse_amount(raw: &str) -> Result<f64, GateError> {
    let trimmed = raw.trim();
    let amount: f64 = trimmed
        .parse()
        .map_err(|_| GateError::InvalidAmount(format!("'{}' is not a number", trimmed)))?;
    if !amount.is_finite() {
        return Err(GateError::InvalidAmount(format!("'{}' is not finite", trimmed)));
    }
    if amount < 0.0 {
        return Err(GateError::InvalidAmount(format!("'{}' is negative", trimmed)));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const PIN: &str = "336333";

    fn gate() -> SessionGate {
        SessionGate::new(PIN, Duration::from_secs(3600))
    }

    #[test]
    fn test_verified_flow() {
        let gate = gate();
        let token = gate.submit_identity(None, "+919876543210").unwrap();
        assert_eq!(gate.state(&token), GateState::PhoneSubmitted);

        assert_eq!(gate.submit_code(&token, PIN, None).unwrap(), GateState::PinVerified);
        assert_eq!(gate.state(&token), GateState::PinVerified);

        let request = gate.admit(Some(&token), "15000").unwrap();
        assert_eq!(request.amount, 15000.0);
        assert_eq!(request.identifier, "+919876543210");
        assert_eq!(gate.state(&token), GateState::PhoneSubmitted);
    }

    #[test]
    fn test_wrong_code_keeps_phone_submitted() {
        let gate = gate();
        let token = gate.submit_identity(None, "+919876543210").unwrap();

        assert!(matches!(
            gate.submit_code(&token, "000000", None),
            Err(GateError::CodeMismatch)
        ));
        assert_eq!(gate.state(&token), GateState::PhoneSubmitted);
        assert!(matches!(
            gate.admit(Some(&token), "100"),
            Err(GateError::NotVerified { state: GateState::PhoneSubmitted })
        ));

        // unbounded retries
        for _ in 0..20 {
            assert!(gate.submit_code(&token, "111111", None).is_err());
        }
        assert!(gate.submit_code(&token, " 336333 ", None).is_ok());
    }

    #[test]
    fn test_verification_is_single_use() {
        let gate = gate();
        let token = gate.submit_identity(None, "alice").unwrap();
        gate.submit_code(&token, PIN, None).unwrap();

        gate.admit(Some(&token), "10").unwrap();
        assert!(matches!(
            gate.admit(Some(&token), "10"),
            Err(GateError::NotVerified { .. })
        ));

        gate.submit_code(&token, PIN, None).unwrap();
        assert!(gate.admit(Some(&token), "10").is_ok());
    }

    #[test]
    fn test_admit_refused_from_start() {
        let gate = gate();
        assert!(matches!(
            gate.admit(None, "10"),
            Err(GateError::NotVerified { state: GateState::Start })
        ));
        assert!(matches!(
            gate.admit(Some("unknown-token"), "10"),
            Err(GateError::NotVerified { state: GateState::Start })
        ));
    }

    #[test]
    fn test_invalid_amount_keeps_verification() {
        let gate = gate();
        let token = gate.submit_identity(None, "bob").unwrap();
        gate.submit_code(&token, PIN, None).unwrap();

        assert!(matches!(
            gate.admit(Some(&token), "-5"),
            Err(GateError::InvalidAmount(_))
        ));
        assert_eq!(gate.state(&token), GateState::PinVerified);
    }

    #[test]
    fn test_amount_parser_runs_only_when_verified() {
        let gate = gate();
        let token = gate.submit_identity(None, "ivan").unwrap();

        let refused = gate.admit_with(Some(&token), || panic!("parser must not run"));
        assert!(matches!(
            refused,
            Err(GateError::NotVerified { state: GateState::PhoneSubmitted })
        ));

        gate.submit_code(&token, PIN, None).unwrap();
        let bad = gate.admit_with(Some(&token), || {
            Err(GateError::InvalidAmount("malformed body".to_string()))
        });
        assert!(matches!(bad, Err(GateError::InvalidAmount(_))));
        assert_eq!(gate.state(&token), GateState::PinVerified);
    }

    #[test]
    fn test_resubmitting_identity_resets_verification() {
        let gate = gate();
        let token = gate.submit_identity(None, "carol").unwrap();
        gate.submit_code(&token, PIN, None).unwrap();

        let same = gate.submit_identity(Some(&token), "carol-2").unwrap();
        assert_eq!(same, token);
        assert_eq!(gate.state(&token), GateState::PhoneSubmitted);
        assert_eq!(gate.identifier(&token).as_deref(), Some("carol-2"));
    }

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(matches!(
            gate().submit_identity(None, "   "),
            Err(GateError::InvalidIdentifier)
        ));
    }

    #[test]
    fn test_code_requires_session() {
        assert!(matches!(
            gate().submit_code("nope", PIN, None),
            Err(GateError::SessionRequired)
        ));
    }

    #[test]
    fn test_identity_mismatch() {
        let gate = gate();
        let token = gate.submit_identity(None, "dave").unwrap();
        assert!(matches!(
            gate.submit_code(&token, PIN, Some("eve")),
            Err(GateError::IdentityMismatch)
        ));
        assert!(gate.submit_code(&token, PIN, Some("dave")).is_ok());
    }

    #[test]
    fn test_sessions_expire() {
        let gate = SessionGate::new(PIN, Duration::from_millis(20));
        let token = gate.submit_identity(None, "frank").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(gate.state(&token), GateState::Start);
        assert!(matches!(
            gate.submit_code(&token, PIN, None),
            Err(GateError::SessionRequired)
        ));
        gate.submit_identity(None, "grace").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(gate.cleanup_expired(), 1);
        assert_eq!(gate.active_session_count(), 0);
    }

    #[test]
    fn test_concurrent_admission_is_single_use() {
        let gate = Arc::new(gate());
        let token = gate.submit_identity(None, "heidi").unwrap();
        gate.submit_code(&token, PIN, None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let token = token.clone();
                std::thread::spawn(move || gate.admit(Some(&token), "42").is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test_case("100", Some(100.0) ; "integer")]
    #[test_case(" 12.5 ", Some(12.5) ; "trimmed decimal")]
    #[test_case("0", Some(0.0) ; "zero")]
    #[test_case("-1", None ; "negative")]
    #[test_case("abc", None ; "not a number")]
    #[test_case("inf", None ; "infinite")]
    #[test_case("NaN", None ; "nan")]
    #[test_case("", None ; "empty")]
    fn test_parse_amount(raw: &str, expected: Option<f64>) {
        assert_eq!(parse_amount(raw).ok(), expected);
    }
}
