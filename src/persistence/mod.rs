// Durable cross-cycle state
pub mod memory;

pub use memory::{LastTrade, MemoryStore, TradeMemory, TradeResult};
