use std::sync::Arc;

use chrono::Utc;

use crate::api::ExchangeClient;
use crate::config::{AppConfig, UnconfiguredTickPolicy};
use crate::error::ExecutionError;
use crate::models::{OrderFill, OrderSide, PurchaseAttempt, PurchaseSettings};
use crate::persistence::PersistenceGateway;

const NOT_CONFIGURED: &str = "purchase settings not configured";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub pair: String,
    pub quote_asset: String,
    pub unconfigured_tick: UnconfiguredTickPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pair: "BTCUSDT".to_string(),
            quote_asset: "USDT".to_string(),
            unconfigured_tick: UnconfiguredTickPolicy::Skip,
        }
    }
}

impl ExecutorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            pair: config.exchange.pair.clone(),
            quote_asset: config.exchange.quote_asset.clone(),
            unconfigured_tick: config.engine.unconfigured_tick,
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing was recorded
    Skipped(String),
    /// An attempt was built (and handed to persistence)
    Completed(PurchaseAttempt),
}

/// Runs one DCA purchase per tick
///
/// Every collaborator failure ends up either as a `Failed` attempt in the
/// history or as a logged skip; `execute_tick` itself cannot fail.
pub struct PurchaseExecutor {
    exchange: Arc<dyn ExchangeClient>,
    persistence: Arc<dyn PersistenceGateway>,
    config: ExecutorConfig,
}

impl PurchaseExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        persistence: Arc<dyn PersistenceGateway>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            exchange,
            persistence,
            config,
        }
    }

    pub async fn execute_tick(&self) -> TickOutcome {
        let started_at = Utc::now();

        let configuration = match self.persistence.get_active_configuration().await {
            Ok(configuration) => configuration,
            Err(e) => {
                tracing::error!("❌ Failed to load bot settings, skipping tick: {}", e);
                return TickOutcome::Skipped(format!("settings unavailable: {}", e));
            }
        };

        let settings = match configuration.as_ref().and_then(|c| c.purchase_settings()) {
            Some(settings) => settings,
            None => {
                return match self.config.unconfigured_tick {
                    UnconfiguredTickPolicy::Skip => {
                        tracing::warn!("⏭️  Purchase settings not configured, skipping tick");
                        TickOutcome::Skipped(NOT_CONFIGURED.to_string())
                    }
                    UnconfiguredTickPolicy::RecordFailure => {
                        let amount = configuration
                            .and_then(|c| c.purchase_amount)
                            .unwrap_or(0.0);
                        let attempt = PurchaseAttempt::failed(started_at, amount, NOT_CONFIGURED);
                        self.record(attempt).await
                    }
                };
            }
        };

        tracing::info!(
            "🛒 Executing DCA purchase: {:.2} {} of {}",
            settings.amount,
            self.config.quote_asset,
            self.config.pair
        );

        let attempt = match self.purchase(&settings).await {
            Ok(fill) => {
                tracing::info!(
                    "✅ Bought {:.8} @ ${:.2} (order {})",
                    fill.filled_quantity,
                    fill.avg_price,
                    fill.order_id
                );
                PurchaseAttempt::succeeded(started_at, settings.amount, &fill)
            }
            Err(e) => {
                tracing::error!("❌ DCA purchase failed: {}", e);
                PurchaseAttempt::failed(started_at, settings.amount, e.to_string())
            }
        };

        self.record(attempt).await
    }

    async fn purchase(&self, settings: &PurchaseSettings) -> Result<OrderFill, ExecutionError> {
        let balance = self.exchange.get_balance(&self.config.quote_asset).await?;
        if balance < settings.amount {
            return Err(ExecutionError::InsufficientBalance {
                available: balance,
                required: settings.amount,
            });
        }

        let reference_price = self.exchange.get_reference_price(&self.config.pair).await?;
        tracing::debug!("Reference price for {}: ${:.2}", self.config.pair, reference_price);

        let mut fill = self
            .exchange
            .place_market_order(&self.config.pair, OrderSide::Buy, settings.amount)
            .await?;

        if fill.avg_price <= 0.0 {
            fill.avg_price = reference_price;
        }

        Ok(fill)
    }

    async fn record(&self, attempt: PurchaseAttempt) -> TickOutcome {
        if let Err(e) = self.persistence.append_purchase_attempt(&attempt).await {
            tracing::error!("❌ Failed to save purchase attempt {}: {}", attempt.id, e);
        }
        TickOutcome::Completed(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeError;
    use crate::models::{AttemptStatus, BotConfiguration};
    use crate::persistence::MemoryGateway;
    use async_trait::async_trait;

    struct FixedExchange {
        balance: f64,
        avg_price: f64,
    }

    #[async_trait]
    impl ExchangeClient for FixedExchange {
        async fn get_balance(&self, _asset: &str) -> Result<f64, ExchangeError> {
            Ok(self.balance)
        }

        async fn get_reference_price(&self, _pair: &str) -> Result<f64, ExchangeError> {
            Ok(25000.0)
        }

        async fn place_market_order(
            &self,
            _pair: &str,
            _side: OrderSide,
            notional: f64,
        ) -> Result<OrderFill, ExchangeError> {
            Ok(OrderFill {
                order_id: "7".to_string(),
                filled_quantity: notional / 25000.0,
                avg_price: self.avg_price,
            })
        }
    }

    fn executor(exchange: FixedExchange, persistence: Arc<MemoryGateway>) -> PurchaseExecutor {
        PurchaseExecutor::new(Arc::new(exchange), persistence, ExecutorConfig::default())
    }

    #[tokio::test]
    async fn test_missing_fill_price_uses_reference_price() {
        let persistence = Arc::new(MemoryGateway::with_configuration(BotConfiguration {
            purchase_amount: Some(50.0),
            purchase_interval_minutes: Some(5.0),
            ..Default::default()
        }));
        let exec = executor(
            FixedExchange {
                balance: 100.0,
                avg_price: 0.0,
            },
            persistence.clone(),
        );

        let TickOutcome::Completed(attempt) = exec.execute_tick().await else {
            panic!("expected a recorded attempt");
        };
        assert_eq!(attempt.status, AttemptStatus::Success);
        assert_eq!(attempt.fill_price, 25000.0);
        assert_eq!(persistence.attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_interval_only_configuration_is_unconfigured() {
        let persistence = Arc::new(MemoryGateway::with_configuration(BotConfiguration {
            purchase_interval_minutes: Some(5.0),
            ..Default::default()
        }));
        let exec = executor(
            FixedExchange {
                balance: 100.0,
                avg_price: 25000.0,
            },
            persistence.clone(),
        );

        assert_eq!(
            exec.execute_tick().await,
            TickOutcome::Skipped(NOT_CONFIGURED.to_string())
        );
        assert!(persistence.attempts().await.is_empty());
    }

    #[tokio::test]
    async fn test_exact_balance_is_enough() {
        let persistence = Arc::new(MemoryGateway::with_configuration(BotConfiguration {
            purchase_amount: Some(20.0),
            purchase_interval_minutes: Some(1.0),
            ..Default::default()
        }));
        let exec = executor(
            FixedExchange {
                balance: 20.0,
                avg_price: 25000.0,
            },
            persistence.clone(),
        );

        exec.execute_tick().await;
        assert!(persistence.attempts().await[0].is_success());
    }
}
