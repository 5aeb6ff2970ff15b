// Core modules
pub mod api;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod execution;
pub mod models;
pub mod persistence;
pub mod report;
pub mod schedule;

// Re-export commonly used types
pub use api::{ExchangeClient, ExchangeConnector};
pub use config::AppConfig;
pub use error::{ExchangeError, PersistenceError, StartError};
pub use execution::{PurchaseExecutor, TickOutcome};
pub use models::*;
pub use persistence::{MemoryGateway, PersistenceGateway};
pub use schedule::{translate, ScheduleController, TriggerSchedule};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
