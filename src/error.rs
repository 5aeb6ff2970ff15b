use thiserror::Error;

/// Failures reported by an exchange client
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Exchange unreachable: {0}")]
    Connectivity(String),

    #[error("Invalid API credentials: {0}")]
    Unauthorized(String),

    #[error("Order rejected ({code}): {msg}")]
    Rejected { code: i64, msg: String },

    #[error("Order amount {amount} is below minimum {min_notional}")]
    BelowMinNotional { amount: f64, min_notional: f64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected exchange response: {0}")]
    Decode(String),
}

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

/// Credential handle could not be turned into usable API keys
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API keys not configured for '{0}'")]
    NotFound(String),

    #[error("API keys for '{0}' are incomplete")]
    Incomplete(String),
}

/// User-supplied purchase settings rejected by policy
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Minimum purchase amount is {min_notional} (got {amount})")]
    AmountBelowMinimum { amount: f64, min_notional: f64 },

    #[error("Purchase amount must be a finite number (got {0})")]
    InvalidAmount(f64),

    #[error("Interval must be greater than 0 (got {0})")]
    InvalidInterval(f64),
}

/// Start-time failures. Never retried, and the schedule stays stopped.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),
}

impl From<SettingsError> for StartError {
    fn from(err: SettingsError) -> Self {
        StartError::Configuration(err.to_string())
    }
}

impl From<CredentialError> for StartError {
    fn from(err: CredentialError) -> Self {
        StartError::Configuration(err.to_string())
    }
}

/// Failure inside a single tick. Recorded as a failed purchase attempt, never propagated.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("insufficient balance")]
    InsufficientBalance { available: f64, required: f64 },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}
