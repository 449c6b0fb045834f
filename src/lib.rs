// Core modules
pub mod auth;
pub mod cycle;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod oracle;
pub mod persistence;
pub mod risk;
pub mod settings;

// Re-export commonly used types
pub use cycle::{CycleOptions, CycleReport, TradingCycle};
pub use models::*;
