use crate::data::{Candle, OrderStatus, Side};
use crate::error::{EngineError, EngineResult};
use crate::exchange::binance::auth;
use crate::exchange::binance::types::{AccountInfo, ApiError, ExchangeInfo, Kline, OrderResponse};
use crate::exchange::{AccountSource, MarketDataSource, OrderAck, OrderRequest, OrderSink, RulesSource};
use crate::risk::{OrderType, TimeInForce, TradingRules};
use crate::utils::config::ExchangeConfig;
use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

struct Credentials {
    api_key: String,
    secret_key: String,
}

/// Binance spot REST API client.
///
/// Public market-data endpoints work without credentials; account and
/// order endpoints need keys attached with [`BinanceRestClient::with_credentials`].
pub struct BinanceRestClient {
    client: Client,
    credentials: Option<Credentials>,
    base_url: String,
    recv_window_ms: u64,
}

impl BinanceRestClient {
    pub fn new(base_url: &str, timeout: Duration, recv_window_ms: u64) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::ConfigurationInvalid(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            credentials: None,
            base_url: base_url.trim_end_matches('/').to_string(),
            recv_window_ms,
        })
    }

    pub fn from_config(cfg: &ExchangeConfig) -> EngineResult<Self> {
        Self::new(
            &cfg.api_endpoint,
            Duration::from_secs(cfg.request_timeout_secs.max(1)),
            cfg.recv_window_ms,
        )
    }

    pub fn with_credentials(mut self, api_key: String, secret_key: String) -> Self {
        self.credentials = Some(Credentials { api_key, secret_key });
        self
    }

    /// `GET /api/v3/klines`, oldest first, including the forming bar
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> EngineResult<Vec<Kline>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_uppercase()),
                ("interval", interval.to_string()),
                ("limit", limit.clamp(1, 1000).to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<Vec<serde_json::Value>> = Self::decode(response).await?;
        let klines: Vec<Kline> = rows.iter().filter_map(|row| Kline::from_row(row)).collect();
        if klines.len() < rows.len() {
            debug!(symbol = %symbol, skipped = rows.len() - klines.len(), "skipped malformed kline rows");
        }
        Ok(klines)
    }

    /// `GET /api/v3/exchangeInfo` for the whole venue
    pub async fn get_exchange_info(&self) -> EngineResult<ExchangeInfo> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    /// `GET /api/v3/account` (signed)
    pub async fn get_account_info(&self) -> EngineResult<AccountInfo> {
        let creds = self.credentials()?;
        let query = auth::build_signed_query(&[], &creds.secret_key, self.recv_window_ms);
        let url = format!("{}/api/v3/account?{}", self.base_url, query);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// `POST /api/v3/order` (signed). The request must already be admitted.
    pub async fn place_order(&self, order: &OrderRequest) -> EngineResult<OrderResponse> {
        let creds = self.credentials()?;
        let params = order_params(order)?;
        let body = auth::build_signed_query(&params, &creds.secret_key, self.recv_window_ms);
        let url = format!("{}/api/v3/order", self.base_url);

        info!(
            symbol = %order.symbol,
            side = %order.side,
            order_type = order.order_type.as_str(),
            qty = %order.quantity,
            price = ?order.price,
            "submitting order"
        );

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let resp: OrderResponse = Self::decode(response).await.map_err(|e| {
            error!(symbol = %order.symbol, error = %e, "order failed");
            e
        })?;
        info!(symbol = %resp.symbol, order_id = resp.order_id, status = %resp.status, "order accepted");
        Ok(resp)
    }

    /// `GET /api/v3/ping`
    pub async fn test_connectivity(&self) -> EngineResult<()> {
        let url = format!("{}/api/v3/ping", self.base_url);
        let response = self.client.get(&url).send().await?;
        let _: serde_json::Value = Self::decode(response).await?;
        Ok(())
    }

    fn credentials(&self) -> EngineResult<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| EngineError::ConfigurationInvalid("API credentials not configured".to_string()))
    }

    /// Decode a success body, or map the error body to a rejection
    async fn decode<T: DeserializeOwned>(response: Response) -> EngineResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiError>(&text) {
                Ok(api) => EngineError::ExchangeRejection {
                    code: api.code,
                    message: api.msg,
                },
                Err(_) if status.is_server_error() => {
                    EngineError::Transport(format!("HTTP {}: {}", status.as_u16(), text))
                }
                Err(_) => EngineError::ExchangeRejection {
                    code: -i64::from(status.as_u16()),
                    message: text,
                },
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

fn order_params(order: &OrderRequest) -> EngineResult<Vec<(&'static str, String)>> {
    let mut params = vec![
        ("symbol", order.symbol.to_uppercase()),
        ("side", order.side.as_str().to_string()),
        ("type", order.order_type.as_str().to_string()),
    ];

    match order.order_type {
        OrderType::Market => {}
        OrderType::LimitMaker | OrderType::Limit { .. } => {
            let price = order
                .price
                .filter(|p| *p > Decimal::ZERO)
                .ok_or_else(|| EngineError::filter(&order.symbol, "limit order without a price"))?;
            if let OrderType::Limit {
                time_in_force: TimeInForce::Gtc,
            } = order.order_type
            {
                params.push(("timeInForce", "GTC".to_string()));
            }
            params.push(("price", price.normalize().to_string()));
        }
    }

    params.push(("quantity", order.quantity.normalize().to_string()));
    params.push(("newOrderRespType", "RESULT".to_string()));
    Ok(params)
}

#[async_trait]
impl MarketDataSource for BinanceRestClient {
    /// Drops the still-forming bar so only closed candles come back
    async fn closed_candles(&self, symbol: &str, interval: &str, limit: u32) -> EngineResult<Vec<Candle>> {
        let now_ms = auth::get_timestamp();
        let klines = self
            .get_klines(symbol, interval, limit)
            .await
            .map_err(|e| EngineError::MarketDataUnavailable(format!("{}: {}", symbol, e)))?;

        Ok(klines
            .into_iter()
            .filter(|k| k.is_closed(now_ms))
            .map(|k| k.candle)
            .collect())
    }
}

#[async_trait]
impl AccountSource for BinanceRestClient {
    async fn balances(&self) -> EngineResult<HashMap<String, Decimal>> {
        let info = self.get_account_info().await?;
        Ok(info
            .balances
            .into_iter()
            .map(|b| (b.asset, b.free + b.locked))
            .filter(|(_, total)| *total > Decimal::ZERO)
            .collect())
    }
}

#[async_trait]
impl RulesSource for BinanceRestClient {
    async fn trading_rules(&self, symbols: &[String]) -> EngineResult<HashMap<String, TradingRules>> {
        let info = self.get_exchange_info().await?;
        let wanted: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();

        Ok(info
            .symbols
            .iter()
            .filter(|s| wanted.contains(&s.symbol))
            .map(|s| (s.symbol.clone(), s.trading_rules()))
            .collect())
    }
}

#[async_trait]
impl OrderSink for BinanceRestClient {
    async fn submit(&self, order: &OrderRequest) -> EngineResult<OrderAck> {
        let resp = self.place_order(order).await?;
        let side = match resp.side.as_str() {
            "SELL" => Side::Sell,
            _ => Side::Buy,
        };

        Ok(OrderAck {
            exchange_order_id: resp.order_id,
            symbol: resp.symbol,
            side,
            status: OrderStatus::from_exchange(&resp.status),
            price: resp.price,
            quantity: resp.orig_qty,
            executed_quantity: resp.executed_qty,
            cumulative_quote_quantity: resp.cumulative_quote_qty,
        })
    }
}
