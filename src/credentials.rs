use crate::error::CredentialError;
use std::fmt;

/// Exchange API key pair
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &format!("{}…", self.api_key.chars().take(4).collect::<String>()))
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Resolves the opaque credentials handle stored with the bot settings
pub trait CredentialStore: Send + Sync {
    fn resolve(&self, credentials_ref: &str) -> Result<ApiCredentials, CredentialError>;
}

/// Reads `<REF>_API_KEY` / `<REF>_API_SECRET` from the environment
///
/// A handle of `binance-main` resolves to `BINANCE_MAIN_API_KEY` and `BINANCE_MAIN_API_SECRET`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn var_prefix(credentials_ref: &str) -> String {
        credentials_ref
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl CredentialStore for EnvCredentialStore {
    fn resolve(&self, credentials_ref: &str) -> Result<ApiCredentials, CredentialError> {
        let prefix = Self::var_prefix(credentials_ref);
        if prefix.is_empty() {
            return Err(CredentialError::NotFound(credentials_ref.to_string()));
        }

        let api_key = std::env::var(format!("{}_API_KEY", prefix)).ok();
        let api_secret = std::env::var(format!("{}_API_SECRET", prefix)).ok();

        match (api_key, api_secret) {
            (None, None) => Err(CredentialError::NotFound(credentials_ref.to_string())),
            (Some(api_key), Some(api_secret))
                if !api_key.trim().is_empty() && !api_secret.trim().is_empty() =>
            {
                tracing::debug!("Resolved API credentials for '{}'", credentials_ref);
                Ok(ApiCredentials {
                    api_key,
                    api_secret,
                })
            }
            _ => Err(CredentialError::Incomplete(credentials_ref.to_string())),
        }
    }
}
