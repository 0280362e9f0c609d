//! Orchestrator dispatcher process library.
//!
//! Provides configuration loading, telemetry setup, and a process-spawning
//! executor adapter so `main.rs` stays a thin wiring layer and these pieces
//! can be exercised directly from integration tests.

pub mod config;
pub mod executor;
pub mod telemetry;

pub use config::Config;
pub use executor::ProcessAgentExecutor;
pub use telemetry::init_telemetry;
