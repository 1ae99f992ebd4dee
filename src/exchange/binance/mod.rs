pub mod auth;
pub mod rest;
pub mod types;
pub mod websocket;

pub use rest::BinanceRestClient;
pub use types::*;
pub use websocket::TradeStream;
