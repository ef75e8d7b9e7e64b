// src/api/mod.rs

pub mod cookie_config;  // Signed session cookie
pub mod handlers;
pub mod server;
pub mod server_config;  // Server limits and constants
pub mod types;

pub use server::FraudGateServer;
