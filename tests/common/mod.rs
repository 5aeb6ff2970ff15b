#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dcabot::config::AppConfig;
use dcabot::credentials::{ApiCredentials, CredentialStore};
use dcabot::error::{CredentialError, ExchangeError};
use dcabot::models::{BotConfiguration, OrderFill, OrderSide};
use dcabot::persistence::MemoryGateway;
use dcabot::schedule::ScheduleController;
use dcabot::{ExchangeClient, ExchangeConnector};

#[derive(Debug, Clone)]
pub enum OrderBehavior {
    Fill,
    Reject { code: i64, msg: String },
    Unreachable,
}

#[derive(Debug)]
struct MockState {
    balance: f64,
    price: f64,
    order_behavior: OrderBehavior,
    order_delay: Option<Duration>,
    probe_fails: bool,
    check_delay: Option<Duration>,
}

/// Scriptable exchange double
pub struct MockExchange {
    state: Mutex<MockState>,
    order_calls: AtomicUsize,
    balance_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockExchange {
    pub fn new(balance: f64, price: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                balance,
                price,
                order_behavior: OrderBehavior::Fill,
                order_delay: None,
                probe_fails: false,
                check_delay: None,
            }),
            order_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn set_order_behavior(&self, behavior: OrderBehavior) {
        self.state.lock().unwrap().order_behavior = behavior;
    }

    pub fn set_order_delay(&self, delay: Duration) {
        self.state.lock().unwrap().order_delay = Some(delay);
    }

    pub fn fail_probe(&self) {
        self.state.lock().unwrap().probe_fails = true;
    }

    pub fn set_check_delay(&self, delay: Duration) {
        self.state.lock().unwrap().check_delay = Some(delay);
    }

    pub fn order_calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    /// Most orders ever pending at the same time
    pub fn max_concurrent_orders(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_balance(&self, _asset: &str) -> Result<f64, ExchangeError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().balance)
    }

    async fn get_reference_price(&self, _pair: &str) -> Result<f64, ExchangeError> {
        Ok(self.state.lock().unwrap().price)
    }

    async fn place_market_order(
        &self,
        _pair: &str,
        _side: OrderSide,
        notional: f64,
    ) -> Result<OrderFill, ExchangeError> {
        let n = self.order_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let (behavior, delay, price) = {
            let state = self.state.lock().unwrap();
            (state.order_behavior.clone(), state.order_delay, state.price)
        };

        let pending = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(pending, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match behavior {
            OrderBehavior::Fill => Ok(OrderFill {
                order_id: format!("mock-{}", n),
                filled_quantity: notional / price,
                avg_price: price,
            }),
            OrderBehavior::Reject { code, msg } => Err(ExchangeError::Rejected { code, msg }),
            OrderBehavior::Unreachable => {
                Err(ExchangeError::Connectivity("connection reset by peer".to_string()))
            }
        }
    }

    async fn probe(&self, quote_asset: &str) -> Result<f64, ExchangeError> {
        let (fails, delay) = {
            let state = self.state.lock().unwrap();
            (state.probe_fails, state.check_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(ExchangeError::Unauthorized("Invalid API-key, IP, or permissions".to_string()));
        }
        self.get_balance(quote_asset).await
    }
}

/// Hands out the same mock for every credential set
pub struct MockConnector {
    exchange: Arc<MockExchange>,
}

impl MockConnector {
    pub fn new(exchange: Arc<MockExchange>) -> Arc<Self> {
        Arc::new(Self { exchange })
    }
}

impl ExchangeConnector for MockConnector {
    fn connect(&self, _credentials: ApiCredentials) -> Result<Arc<dyn ExchangeClient>, ExchangeError> {
        Ok(self.exchange.clone())
    }
}

/// Resolves exactly one handle
pub struct StaticCredentials {
    handle: String,
}

impl StaticCredentials {
    pub fn new(handle: &str) -> Arc<Self> {
        Arc::new(Self {
            handle: handle.to_string(),
        })
    }
}

impl CredentialStore for StaticCredentials {
    fn resolve(&self, credentials_ref: &str) -> Result<ApiCredentials, CredentialError> {
        if credentials_ref == self.handle {
            Ok(ApiCredentials {
                api_key: "test-key".to_string(),
                api_secret: "test-secret".to_string(),
            })
        } else {
            Err(CredentialError::NotFound(credentials_ref.to_string()))
        }
    }
}

pub fn configured(amount: f64, interval_minutes: f64) -> BotConfiguration {
    BotConfiguration {
        purchase_amount: Some(amount),
        purchase_interval_minutes: Some(interval_minutes),
        credentials_ref: Some("binance".to_string()),
        ..Default::default()
    }
}

pub fn controller_with(
    persistence: Arc<MemoryGateway>,
    exchange: Arc<MockExchange>,
) -> ScheduleController {
    ScheduleController::new(
        persistence,
        StaticCredentials::new("binance"),
        MockConnector::new(exchange),
        &AppConfig::default(),
    )
}

/// Advance paused time in one-second steps until `done` holds
pub async fn wait_until<F: Fn() -> bool>(done: F, max_secs: u64) -> bool {
    for _ in 0..max_secs {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    done()
}

/// Advance paused time until the store holds at least `count` attempts
pub async fn wait_for_attempts(persistence: &MemoryGateway, count: usize, max_secs: u64) -> bool {
    for _ in 0..max_secs {
        if persistence.attempts().await.len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    persistence.attempts().await.len() >= count
}
