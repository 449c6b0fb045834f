// Order lifecycle: entry, protective stop, exit and stop adjustment
pub mod lifecycle;

pub use lifecycle::{
    LifecycleOutcome, LifecycleSettings, LifecycleState, OrderLifecycleManager, ANOMALY,
    INCONSISTENT, REJECTED, UNPROTECTED,
};
