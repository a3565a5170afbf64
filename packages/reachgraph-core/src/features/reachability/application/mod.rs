//! Application layer: engine configuration and the outer convergence loop

pub mod config;
pub mod engine;

pub use config::{EngineConfig, SummaryFailurePolicy};
pub use engine::{ClosureEngine, ClosureReport, ClosureStats};
