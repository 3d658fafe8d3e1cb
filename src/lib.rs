pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod idempotency;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;
