// Risk management module
pub mod precision;
pub mod sizing;

pub use precision::normalize_price;
pub use sizing::{position_size, RiskParams};
