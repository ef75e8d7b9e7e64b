//! Identity gate
//!
//! ```text
//! auth/
//! ├── errors.rs         # GateError + HTTP mapping
//! └── session_gate.rs   # per-session state machine
//! ```

pub mod errors;
pub mod session_gate;

pub use errors::GateError;
pub use session_gate::{parse_amount, GateState, IdentitySession, ScoringRequest, SessionGate};
