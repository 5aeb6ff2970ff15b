use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dcabot::api::BinanceConnector;
use dcabot::config::AppConfig;
use dcabot::credentials::{CredentialStore, EnvCredentialStore};
use dcabot::db::PostgresGateway;
use dcabot::models::PurchaseSettings;
use dcabot::persistence::{MemoryGateway, PersistenceGateway};
use dcabot::report;
use dcabot::schedule::{translate, ScheduleController};
use dcabot::{ExchangeClient, ExchangeConnector};
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dcabot", version, about = "Recurring fixed-amount market buys on Binance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the purchase schedule and run until Ctrl+C
    Run(RunArgs),
    /// Validate and store purchase settings
    Configure(ConfigureArgs),
    /// Show purchase history, newest first
    History(HistoryArgs),
    /// Show aggregate purchase statistics
    Stats,
    /// Resolve API keys and test the exchange connection
    Check,
    /// Print the trigger an interval translates to
    Schedule {
        /// Interval in minutes (fractional allowed)
        #[arg(long)]
        interval: f64,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Store this purchase amount before starting
    #[arg(long, requires = "interval")]
    amount: Option<f64>,

    /// Store this interval (minutes) before starting
    #[arg(long, requires = "amount")]
    interval: Option<f64>,

    /// Store this credentials handle before starting
    #[arg(long)]
    credentials: Option<String>,
}

#[derive(Debug, Args)]
struct ConfigureArgs {
    /// Notional per purchase, in quote currency
    #[arg(long)]
    amount: f64,

    /// Minutes between purchases (fractional allowed)
    #[arg(long)]
    interval: f64,

    /// Credentials handle, resolved to <HANDLE>_API_KEY / <HANDLE>_API_SECRET
    #[arg(long)]
    credentials: Option<String>,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long, default_value_t = 50)]
    limit: usize,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Write CSV to stdout instead of a listing
    #[arg(long)]
    csv: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;
    setup_logging(&config.logging.filter);

    if let Command::Schedule { interval } = cli.command {
        return print_schedule(interval);
    }

    let persistence = connect_persistence(&config).await;

    match cli.command {
        Command::Run(args) => run(&config, persistence, args).await,
        Command::Configure(args) => {
            store_settings(
                &config,
                persistence.as_ref(),
                Some((args.amount, args.interval)),
                args.credentials.as_deref(),
            )
            .await?;
            println!("Settings saved");
            Ok(())
        }
        Command::History(args) => {
            let attempts = persistence
                .list_attempts(args.limit, args.offset)
                .await
                .context("Failed to load purchase history")?;
            if args.csv {
                report::write_csv(&attempts, std::io::stdout())
                    .map_err(|e| anyhow::anyhow!("Failed to write CSV: {}", e))?;
            } else if attempts.is_empty() {
                println!("No purchases recorded yet.");
            } else {
                for attempt in &attempts {
                    println!("{}", report::history_line(attempt));
                }
            }
            Ok(())
        }
        Command::Stats => {
            let stats = persistence
                .purchase_statistics()
                .await
                .context("Failed to compute statistics")?;
            println!("{}", report::stats_summary(&stats));
            Ok(())
        }
        Command::Check => check(&config, persistence.as_ref()).await,
        Command::Schedule { .. } => Ok(()),
    }
}

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_persistence(config: &AppConfig) -> Arc<dyn PersistenceGateway> {
    let database_url = config
        .database
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let Some(database_url) = database_url else {
        tracing::warn!("No database configured, settings and history are kept in memory only");
        return Arc::new(MemoryGateway::new());
    };

    match PostgresGateway::new(&database_url, config.database.max_connections, None).await {
        Ok(gateway) => {
            tracing::info!("Postgres persistence enabled");
            Arc::new(gateway)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), continuing with in-memory store",
                e
            );
            Arc::new(MemoryGateway::new())
        }
    }
}

async fn store_settings(
    config: &AppConfig,
    persistence: &dyn PersistenceGateway,
    settings: Option<(f64, f64)>,
    credentials_ref: Option<&str>,
) -> Result<()> {
    if let Some((amount, interval_minutes)) = settings {
        let settings = PurchaseSettings {
            amount,
            interval_minutes,
        };
        settings.validate(config.exchange.min_notional)?;
        persistence.save_purchase_settings(&settings).await?;
    }

    if let Some(credentials_ref) = credentials_ref {
        persistence.save_credentials_ref(credentials_ref).await?;
    }

    Ok(())
}

async fn run(config: &AppConfig, persistence: Arc<dyn PersistenceGateway>, args: RunArgs) -> Result<()> {
    let seed = args.amount.zip(args.interval);
    store_settings(config, persistence.as_ref(), seed, args.credentials.as_deref()).await?;

    let controller = ScheduleController::new(
        persistence,
        Arc::new(EnvCredentialStore::new()),
        Arc::new(BinanceConnector::new(config.exchange.clone())),
        config,
    );

    let response = controller.start().await?;
    tracing::info!("{}", response.message);

    let mut status_ticker = interval(Duration::from_secs(config.engine.status_log_secs.max(1)));
    // First tick completes immediately
    status_ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = status_ticker.tick() => {
                let status = controller.status().await;
                tracing::info!(
                    "📊 Status: running={} fires={} skipped={} next={}",
                    status.is_running,
                    status.fires,
                    status.skipped_fires,
                    status
                        .next_execution_estimate
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }

    let response = controller.stop().await;
    tracing::info!("{}", response.message);
    Ok(())
}

async fn check(config: &AppConfig, persistence: &dyn PersistenceGateway) -> Result<()> {
    let configuration = persistence.get_active_configuration().await?;
    let Some(credentials_ref) = configuration.and_then(|c| c.credentials_ref) else {
        bail!("API keys not configured (run `dcabot configure --credentials <HANDLE>`)");
    };

    let credentials = EnvCredentialStore::new().resolve(&credentials_ref)?;
    let client = BinanceConnector::new(config.exchange.clone()).connect(credentials)?;
    let balance = client
        .probe(&config.exchange.quote_asset)
        .await
        .context("API connection failed")?;
    let holdings = client
        .get_balance(&config.exchange.base_asset)
        .await
        .context("Failed to read base asset balance")?;

    println!("Connected to {}", config.exchange.endpoint());
    println!("  {} balance: {:.2}", config.exchange.quote_asset, balance);
    println!("  {} balance: {:.8}", config.exchange.base_asset, holdings);
    Ok(())
}

fn print_schedule(interval_minutes: f64) -> Result<()> {
    let schedule = translate(interval_minutes)?;
    let next = schedule.next_fire_after(chrono::Utc::now());

    println!("Interval:   {} minutes", interval_minutes);
    println!("Trigger:    {}", schedule);
    println!("Cron:       {}", schedule.cron_expression());
    println!("Period:     {:?}", schedule.period());
    println!("Next fire:  {} UTC", next.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}
