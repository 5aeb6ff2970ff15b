// Settings store and purchase history
pub mod memory;

use crate::error::PersistenceError;
use crate::models::{BotConfiguration, PurchaseAttempt, PurchaseSettings, PurchaseStats};
use async_trait::async_trait;

pub use memory::MemoryGateway;

/// Storage contract used by the schedule controller and the purchase executor
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Current bot settings, `None` when nothing was ever stored
    async fn get_active_configuration(&self) -> Result<Option<BotConfiguration>, PersistenceError>;

    /// Persist whether the schedule is running
    async fn set_active_flag(&self, active: bool) -> Result<(), PersistenceError>;

    /// Append one attempt to the history (never updates existing rows)
    async fn append_purchase_attempt(&self, attempt: &PurchaseAttempt) -> Result<(), PersistenceError>;

    /// Page through the history, newest first
    async fn list_attempts(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PurchaseAttempt>, PersistenceError>;

    /// Store amount and interval, keeping credentials and the active flag
    async fn save_purchase_settings(&self, settings: &PurchaseSettings) -> Result<(), PersistenceError>;

    /// Store the credentials handle, keeping everything else
    async fn save_credentials_ref(&self, credentials_ref: &str) -> Result<(), PersistenceError>;

    async fn purchase_statistics(&self) -> Result<PurchaseStats, PersistenceError>;
}
