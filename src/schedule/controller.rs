use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::api::ExchangeConnector;
use crate::config::AppConfig;
use crate::credentials::CredentialStore;
use crate::error::StartError;
use crate::execution::{ExecutorConfig, PurchaseExecutor};
use crate::models::{BotStatus, ControlResponse};
use crate::persistence::PersistenceGateway;
use crate::schedule::{translate, TriggerSchedule};

#[derive(Debug, Default)]
struct FireTiming {
    next_fire: Option<DateTime<Utc>>,
    last_fire: Option<DateTime<Utc>>,
    // Every timer fire, skipped ones included
    fires: u64,
    skipped: u64,
}

struct RunningSchedule {
    schedule: TriggerSchedule,
    shutdown: oneshot::Sender<()>,
    driver: JoinHandle<()>,
    timing: Arc<RwLock<FireTiming>>,
}

/// Clears the busy flag when a tick finishes, panics included
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the recurring purchase schedule
///
/// At most one schedule runs per controller. `start` and `stop` are
/// idempotent; a tick that is still running when the next fire arrives
/// causes that fire to be skipped, even when the tick was started by a
/// schedule that has since been stopped.
pub struct ScheduleController {
    persistence: Arc<dyn PersistenceGateway>,
    credentials: Arc<dyn CredentialStore>,
    connector: Arc<dyn ExchangeConnector>,
    executor_config: ExecutorConfig,
    quote_asset: String,
    min_notional: f64,
    state: Mutex<Option<RunningSchedule>>,
    /// Set while any tick runs; outlives individual schedules
    busy: Arc<AtomicBool>,
}

impl ScheduleController {
    pub fn new(
        persistence: Arc<dyn PersistenceGateway>,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn ExchangeConnector>,
        config: &AppConfig,
    ) -> Self {
        Self {
            persistence,
            credentials,
            connector,
            executor_config: ExecutorConfig::from_app(config),
            quote_asset: config.exchange.quote_asset.clone(),
            min_notional: config.exchange.min_notional,
            state: Mutex::new(None),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validate settings and connectivity, then arm the trigger
    ///
    /// On error nothing is scheduled and the controller stays stopped.
    pub async fn start(&self) -> Result<ControlResponse, StartError> {
        if self.is_running().await {
            tracing::info!("DCA bot is already running");
            return Ok(ControlResponse::ok("DCA bot is already running"));
        }

        // State lock is taken only once the exchange check has passed
        let configuration = self
            .persistence
            .get_active_configuration()
            .await
            .map_err(|e| StartError::Configuration(format!("settings store unavailable: {}", e)))?
            .ok_or_else(|| StartError::Configuration("Purchase settings not configured".to_string()))?;

        let settings = configuration
            .purchase_settings()
            .ok_or_else(|| StartError::Configuration("Purchase settings not configured".to_string()))?;
        settings.validate(self.min_notional)?;

        let credentials_ref = configuration
            .credentials_ref
            .as_deref()
            .ok_or_else(|| StartError::Configuration("API keys not configured".to_string()))?;
        let credentials = self.credentials.resolve(credentials_ref)?;

        let exchange = self
            .connector
            .connect(credentials)
            .map_err(|e| StartError::Connectivity(format!("API connection failed: {}", e)))?;
        let balance = exchange
            .probe(&self.quote_asset)
            .await
            .map_err(|e| StartError::Connectivity(format!("API connection failed: {}", e)))?;
        tracing::info!("🔌 Exchange reachable, {} balance: {:.2}", self.quote_asset, balance);

        let schedule = translate(settings.interval_minutes)?;

        let mut state = self.state.lock().await;
        if state.is_some() {
            tracing::info!("DCA bot is already running");
            return Ok(ControlResponse::ok("DCA bot is already running"));
        }

        self.persistence
            .set_active_flag(true)
            .await
            .map_err(|e| StartError::Configuration(format!("failed to persist active flag: {}", e)))?;

        let executor = Arc::new(PurchaseExecutor::new(
            exchange,
            self.persistence.clone(),
            self.executor_config.clone(),
        ));
        let timing = Arc::new(RwLock::new(FireTiming::default()));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let driver = tokio::spawn(drive(
            schedule,
            executor,
            timing.clone(),
            self.busy.clone(),
            shutdown_rx,
        ));

        tracing::info!(
            "🚀 DCA bot started: {:.2} {} {} ({})",
            settings.amount,
            self.quote_asset,
            schedule,
            schedule.cron_expression()
        );

        *state = Some(RunningSchedule {
            schedule,
            shutdown,
            driver,
            timing,
        });

        Ok(ControlResponse::ok("DCA bot started successfully"))
    }

    /// Cancel future fires; an in-flight tick runs to completion
    pub async fn stop(&self) -> ControlResponse {
        let mut state = self.state.lock().await;
        let Some(running) = state.take() else {
            return ControlResponse::ok("DCA bot is not running");
        };

        // Receiver may already be gone if the driver exited
        let _ = running.shutdown.send(());
        if let Err(e) = running.driver.await {
            tracing::error!("Schedule driver ended abnormally: {}", e);
        }

        if let Err(e) = self.persistence.set_active_flag(false).await {
            tracing::error!("❌ Failed to persist inactive flag: {}", e);
        }

        tracing::info!("🛑 DCA bot stopped");
        ControlResponse::ok("DCA bot stopped successfully")
    }

    pub async fn status(&self) -> BotStatus {
        let (is_running, next_execution_estimate, fires, skipped_fires) = {
            let state = self.state.lock().await;
            match state.as_ref() {
                Some(running) => {
                    let timing = running.timing.read().await;
                    (true, timing.next_fire, timing.fires, timing.skipped)
                }
                None => (false, None, 0, 0),
            }
        };

        let settings = match self.persistence.get_active_configuration().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load settings for status: {}", e);
                None
            }
        };

        BotStatus {
            is_running,
            next_execution_estimate,
            settings,
            fires,
            skipped_fires,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Active trigger, if running
    pub async fn schedule(&self) -> Option<TriggerSchedule> {
        self.state.lock().await.as_ref().map(|running| running.schedule)
    }

    /// Time of the most recent fire, if running
    pub async fn last_fire(&self) -> Option<DateTime<Utc>> {
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(running) => running.timing.read().await.last_fire,
            None => None,
        }
    }
}

async fn drive(
    schedule: TriggerSchedule,
    executor: Arc<PurchaseExecutor>,
    timing: Arc<RwLock<FireTiming>>,
    busy: Arc<AtomicBool>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let period = schedule.period();
    let period_chrono = chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero());

    // Align the first fire with the cron boundary, then keep a fixed period
    let now = Utc::now();
    let first_fire = schedule.next_fire_after(now);
    let delay = (first_fire - now).to_std().unwrap_or_default();
    timing.write().await.next_fire = Some(first_fire);
    tracing::info!("⏰ First purchase in {:?} at {}", delay, first_fire.format("%H:%M:%S"));

    let mut ticker = interval_at(Instant::now() + delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let fired_at = Utc::now();
                {
                    let mut timing = timing.write().await;
                    timing.last_fire = Some(fired_at);
                    timing.next_fire = Some(fired_at + period_chrono);
                    timing.fires += 1;

                    if busy.swap(true, Ordering::AcqRel) {
                        timing.skipped += 1;
                        tracing::warn!(
                            "⏭️  Previous purchase still running at {}, skipping this fire",
                            fired_at.format("%H:%M:%S")
                        );
                        continue;
                    }
                }

                tracing::info!("🔄 [DCA] Tick at {}", fired_at.format("%H:%M:%S"));

                let guard = BusyGuard(busy.clone());
                let executor = executor.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    executor.execute_tick().await;
                });
            }
        }
    }

    tracing::debug!("Schedule driver exited");
}
