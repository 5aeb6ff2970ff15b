// Per-tick purchase execution
pub mod executor;

pub use executor::{ExecutorConfig, PurchaseExecutor, TickOutcome};
