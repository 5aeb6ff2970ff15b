use super::PersistenceGateway;
use crate::error::PersistenceError;
use crate::models::{BotConfiguration, PurchaseAttempt, PurchaseSettings, PurchaseStats};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    configuration: Option<BotConfiguration>,
    attempts: Vec<PurchaseAttempt>,
}

/// In-process store
///
/// Used when no database is configured (nothing survives a restart) and in tests.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: RwLock<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configuration(configuration: BotConfiguration) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                configuration: Some(configuration),
                attempts: Vec::new(),
            }),
        }
    }

    /// Every recorded attempt in insertion order
    pub async fn attempts(&self) -> Vec<PurchaseAttempt> {
        self.state.read().await.attempts.clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get_active_configuration(&self) -> Result<Option<BotConfiguration>, PersistenceError> {
        Ok(self.state.read().await.configuration.clone())
    }

    async fn set_active_flag(&self, active: bool) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(configuration) = state.configuration.as_mut() {
            configuration.is_active = active;
            configuration.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn append_purchase_attempt(&self, attempt: &PurchaseAttempt) -> Result<(), PersistenceError> {
        attempt
            .check_consistency()
            .map_err(PersistenceError::InvalidRecord)?;

        self.state.write().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn list_attempts(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PurchaseAttempt>, PersistenceError> {
        let mut attempts = self.state.read().await.attempts.clone();
        attempts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(attempts.into_iter().skip(offset).take(limit).collect())
    }

    async fn save_purchase_settings(&self, settings: &PurchaseSettings) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        let configuration = state.configuration.get_or_insert_with(BotConfiguration::default);
        configuration.purchase_amount = Some(settings.amount);
        configuration.purchase_interval_minutes = Some(settings.interval_minutes);
        configuration.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn save_credentials_ref(&self, credentials_ref: &str) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        let configuration = state.configuration.get_or_insert_with(BotConfiguration::default);
        configuration.credentials_ref = Some(credentials_ref.to_string());
        configuration.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn purchase_statistics(&self) -> Result<PurchaseStats, PersistenceError> {
        Ok(PurchaseStats::from_attempts(&self.state.read().await.attempts))
    }
}
