//! HTTP handlers

pub mod gate;
pub mod health;

pub use gate::{submit_amount, submit_code, submit_identity};
pub use health::{health_check, model_status};
