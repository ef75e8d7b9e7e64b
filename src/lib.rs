// src/lib.rs

pub mod api;

// Identity gate
pub mod auth;

pub mod config;

// Training, cache and scoring
pub mod risk;

pub use api::FraudGateServer;
pub use config::AppConfig;
