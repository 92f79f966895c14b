pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod types;

// Layered boundaries: ports and wiring in app, adapters in infra
pub mod app;
pub mod infra;
