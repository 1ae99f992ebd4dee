use crate::data::{InstrumentLedger, TradePrint};
use crate::exchange::binance::types::{StreamWrapper, TradeEvent};
use crate::utils::supervisor::Backoff;
use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Combined `<symbol>@trade` stream feeding last prices into the ledger.
///
/// Reconnects with exponential backoff until the shutdown token fires.
pub struct TradeStream {
    ws_url: String,
    ledger: Arc<InstrumentLedger>,
    backoff: Backoff,
}

impl TradeStream {
    pub fn new<S: AsRef<str>>(ws_endpoint: &str, symbols: &[S], ledger: Arc<InstrumentLedger>, backoff: Backoff) -> Self {
        Self {
            ws_url: stream_url(ws_endpoint, symbols),
            ledger,
            backoff,
        }
    }

    pub fn url(&self) -> &str {
        &self.ws_url
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            info!("Connecting to Binance trade stream: {}", self.ws_url);

            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = self.connect_and_process() => r,
            };

            let delay = match result {
                Ok(()) => {
                    info!("Trade stream closed by server");
                    self.backoff.reset();
                    self.backoff.next_delay()
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    error!("Trade stream error: {}. Reconnecting in {:?}", e, delay);
                    delay
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Trade stream stopped");
    }

    async fn connect_and_process(&mut self) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| anyhow!("WebSocket connection failed: {}", e))?;

        info!("Trade stream connected");
        self.backoff.reset();

        let (mut write, mut read) = ws_stream.split();
        let mut ping = tokio::time::interval(Duration::from_secs(30));
        ping.tick().await;

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| anyhow!("ping failed: {}", e))?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match parse_trade(&text) {
                        Ok(print) => self.apply(print),
                        Err(e) => warn!("Error processing trade message: {}", e),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await
                            .map_err(|e| anyhow!("pong failed: {}", e))?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => debug!("ignored control frame"),
                    Some(Err(e)) => return Err(anyhow!("WebSocket error: {}", e)),
                }
            }
        }
    }

    fn apply(&self, print: TradePrint) {
        self.ledger.record_price(&print.symbol, print.price, print.timestamp_ms);
    }
}

/// `<ws>/stream?streams=btcusdc@trade/ethusdc@trade`
pub fn stream_url<S: AsRef<str>>(ws_endpoint: &str, symbols: &[S]) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@trade", s.as_ref().to_lowercase()))
        .collect();
    format!("{}/stream?streams={}", ws_endpoint.trim_end_matches('/'), streams.join("/"))
}

/// Decode one combined-stream frame into a trade print
pub fn parse_trade(text: &str) -> Result<TradePrint> {
    let wrapper: StreamWrapper =
        serde_json::from_str(text).map_err(|e| anyhow!("Failed to parse stream wrapper: {}", e))?;
    if !wrapper.stream.ends_with("@trade") {
        return Err(anyhow!("unexpected stream {}", wrapper.stream));
    }
    let event: TradeEvent =
        serde_json::from_value(wrapper.data).map_err(|e| anyhow!("Failed to parse trade: {}", e))?;
    Ok(event.to_print())
}
