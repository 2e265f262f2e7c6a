pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod openapi;
pub mod profiles;
pub mod repo;
pub mod rest;
pub mod routes;
pub mod security;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod wellness;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
