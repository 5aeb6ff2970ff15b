use crate::credentials::ApiCredentials;
use crate::error::ExchangeError;
use crate::models::{OrderFill, OrderSide};
use async_trait::async_trait;
use std::sync::Arc;

/// Capability contract the purchase engine needs from an exchange
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Free balance of an asset (0 when the account holds none)
    async fn get_balance(&self, asset: &str) -> Result<f64, ExchangeError>;

    /// Last traded price of a pair, in quote currency
    async fn get_reference_price(&self, pair: &str) -> Result<f64, ExchangeError>;

    /// Submit a market order for a notional amount of quote currency
    async fn place_market_order(
        &self,
        pair: &str,
        side: OrderSide,
        notional: f64,
    ) -> Result<OrderFill, ExchangeError>;

    /// Connectivity probe run before a schedule is created
    ///
    /// Default implementation reads the quote balance, which also proves the keys work.
    async fn probe(&self, quote_asset: &str) -> Result<f64, ExchangeError> {
        self.get_balance(quote_asset).await
    }
}

/// Builds a client for a set of resolved credentials
pub trait ExchangeConnector: Send + Sync {
    fn connect(&self, credentials: ApiCredentials) -> Result<Arc<dyn ExchangeClient>, ExchangeError>;
}
