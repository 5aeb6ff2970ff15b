pub mod binance;
pub mod exchange;

pub use binance::{BinanceClient, BinanceConnector};
pub use exchange::{ExchangeClient, ExchangeConnector};
