use super::exchange::{ExchangeClient, ExchangeConnector};
use crate::config::ExchangeConfig;
use crate::credentials::ApiCredentials;
use crate::error::ExchangeError;
use crate::models::{OrderFill, OrderSide};
use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

// Binance Spot REST API
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
const ACCOUNT_PATH: &str = "/api/v3/account";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
const ORDER_PATH: &str = "/api/v3/order";

// Error codes meaning the key pair itself is bad
const AUTH_ERROR_CODES: &[i64] = &[-1022, -2014, -2015];

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot client (market orders only)
///
/// Cloneable; clones share the rate limiter. Requests are never retried:
/// a retried order could buy twice.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
    recv_window_ms: u64,
    min_notional: f64,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    status: String,
    executed_qty: String,
    cummulative_quote_qty: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceClient {
    pub fn new(credentials: ApiCredentials, config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            client,
            base_url: config.endpoint().to_string(),
            credentials,
            recv_window_ms: config.recv_window_ms,
            min_notional: config.min_notional,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}?{}", self.base_url, path, encode_params(params));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        decode_response(response).await
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let mut query = params.to_vec();
        query.push(("recvWindow", self.recv_window_ms.to_string()));
        query.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let payload = encode_params(&query);
        let signature = sign_payload(&self.credentials.api_secret, &payload)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, payload, signature);

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        decode_response(response).await
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        let account: AccountInfo = self.signed_request(Method::GET, ACCOUNT_PATH, &[]).await?;

        let balance = account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| parse_number("free", &b.free))
            .transpose()?
            .unwrap_or(0.0);

        tracing::debug!("💳 {} balance: {}", asset, balance);
        Ok(balance)
    }

    async fn get_reference_price(&self, pair: &str) -> Result<f64, ExchangeError> {
        let ticker: TickerPrice = self
            .public_get(TICKER_PRICE_PATH, &[("symbol", pair.to_string())])
            .await?;
        parse_number("price", &ticker.price)
    }

    async fn place_market_order(
        &self,
        pair: &str,
        side: OrderSide,
        notional: f64,
    ) -> Result<OrderFill, ExchangeError> {
        if notional < self.min_notional {
            return Err(ExchangeError::BelowMinNotional {
                amount: notional,
                min_notional: self.min_notional,
            });
        }

        let params = [
            ("symbol", pair.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quoteOrderQty", format!("{:.2}", notional)),
            ("newOrderRespType", "FULL".to_string()),
        ];

        let order: OrderResponse = self
            .signed_request(Method::POST, ORDER_PATH, &params)
            .await?;

        let executed = parse_number("executedQty", &order.executed_qty)?;
        let quote_spent = parse_number("cummulativeQuoteQty", &order.cummulative_quote_qty)?;

        if executed <= 0.0 {
            return Err(ExchangeError::Rejected {
                code: 0,
                msg: format!("order {} not filled (status {})", order.order_id, order.status),
            });
        }

        tracing::debug!(
            order_id = order.order_id,
            status = %order.status,
            "Market order filled"
        );

        Ok(OrderFill {
            order_id: order.order_id.to_string(),
            filled_quantity: executed,
            avg_price: quote_spent / executed,
        })
    }
}

/// Builds `BinanceClient`s against the configured endpoint
#[derive(Debug, Clone)]
pub struct BinanceConnector {
    config: ExchangeConfig,
}

impl BinanceConnector {
    pub fn new(config: ExchangeConfig) -> Self {
        Self { config }
    }
}

impl ExchangeConnector for BinanceConnector {
    fn connect(&self, credentials: ApiCredentials) -> Result<Arc<dyn ExchangeClient>, ExchangeError> {
        tracing::info!(
            "🔌 Connecting to Binance at {} (testnet: {})",
            self.config.endpoint(),
            self.config.testnet
        );
        Ok(Arc::new(BinanceClient::new(credentials, &self.config)?))
    }
}

/// HMAC-SHA256 of the query string, hex encoded
pub fn sign_payload(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Unauthorized(format!("unusable API secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

// Parameter values are plain ASCII tokens (symbols, decimals, enum names)
fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn parse_number(field: &str, value: &str) -> Result<f64, ExchangeError> {
    value
        .parse::<f64>()
        .map_err(|_| ExchangeError::Decode(format!("{} is not a number: {:?}", field, value)))
}

fn transport_error(err: reqwest::Error) -> ExchangeError {
    if err.is_connect() || err.is_timeout() {
        ExchangeError::Connectivity(err.to_string())
    } else {
        ExchangeError::Http(err)
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ExchangeError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|e| ExchangeError::Decode(format!("{} in {}", e, body)));
    }

    Err(classify_failure(status, &body))
}

fn classify_failure(status: StatusCode, body: &str) -> ExchangeError {
    let api_error = serde_json::from_str::<ApiErrorBody>(body).ok();

    let auth_failure = status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || api_error
            .as_ref()
            .is_some_and(|e| AUTH_ERROR_CODES.contains(&e.code));
    if auth_failure {
        let msg = api_error.map(|e| e.msg).unwrap_or_else(|| body.to_string());
        return ExchangeError::Unauthorized(msg);
    }

    if status.is_server_error() {
        return ExchangeError::Connectivity(format!("{}: {}", status, body));
    }

    match api_error {
        Some(e) => ExchangeError::Rejected {
            code: e.code,
            msg: e.msg,
        },
        None => ExchangeError::Rejected {
            code: i64::from(status.as_u16()),
            msg: body.to_string(),
        },
    }
}
