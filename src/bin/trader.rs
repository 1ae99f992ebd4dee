use clap::Parser;
use spot_trend_trader::exchange::{AccountSource, MarketDataSource, OrderSink, RulesSource};
use spot_trend_trader::refresh::{spawn_refreshers, RefreshSources};
use spot_trend_trader::utils::{init_from_config, Backoff};
use spot_trend_trader::{
    BinanceRestClient, Config, ExecutionEngine, ExecutionSettings, SharedState, SignalEngine, SignalReporter,
    TradeStream,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Trend-following spot trader for Binance
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults to $CONFIG_FILE, then config/default.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record paper orders even when API credentials are present
    #[arg(long)]
    paper: bool,

    /// Enable autotrading at startup; arms every watched symbol if none are configured
    #[arg(long)]
    autotrade: bool,
}

fn credentials() -> Option<(String, String)> {
    let key = env::var("BINANCE_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let secret = env::var("BINANCE_SECRET_KEY").ok().filter(|s| !s.trim().is_empty())?;
    Some((key, secret))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    init_from_config(&config.logging)?;

    if args.autotrade {
        config.autotrade.enabled = true;
        if config.autotrade.symbols.is_empty() {
            config.autotrade.symbols = config.general.symbols.clone();
        }
    }

    let state = SharedState::from_config(&config)?;
    info!(
        symbols = ?state.symbols(),
        timeframe = %config.strategy.timeframe,
        testnet = config.exchange.testnet,
        "configuration loaded"
    );

    let public = Arc::new(BinanceRestClient::from_config(&config.exchange)?);
    match public.test_connectivity().await {
        Ok(()) => info!(endpoint = %config.exchange.api_endpoint, "connected to Binance API"),
        Err(e) => warn!(error = %e, "connectivity check failed, loops will retry"),
    }

    let signed = match credentials() {
        Some((key, secret)) => Some(Arc::new(
            BinanceRestClient::from_config(&config.exchange)?.with_credentials(key, secret),
        )),
        None => None,
    };

    let sink: Option<Arc<dyn OrderSink>> = match &signed {
        Some(client) if !args.paper => Some(Arc::clone(client) as Arc<dyn OrderSink>),
        _ => None,
    };
    if sink.is_some() {
        warn!("LIVE trading mode: orders will be sent to the exchange");
    } else {
        info!(credentials = signed.is_some(), "paper trading mode");
    }

    let shutdown = CancellationToken::new();

    let sources = RefreshSources {
        market: Arc::clone(&public) as Arc<dyn MarketDataSource>,
        rules: Arc::clone(&public) as Arc<dyn RulesSource>,
        account: signed.map(|c| c as Arc<dyn AccountSource>),
    };
    let mut handles = spawn_refreshers(&state, sources, &config, &shutdown);

    let stream = TradeStream::new(
        &config.exchange.ws_endpoint,
        &state.symbols(),
        Arc::clone(&state.ledger),
        Backoff::from_config(&config.refresh),
    );
    handles.push(tokio::spawn(stream.run(shutdown.clone())));

    let engine = Arc::new(ExecutionEngine::new(
        state.clone(),
        SignalReporter::new(SignalEngine::new(&config.indicators)),
        sink,
        ExecutionSettings::from(&config.autotrade),
    ));
    {
        let (engine, shutdown) = (Arc::clone(&engine), shutdown.clone());
        handles.push(tokio::spawn(async move { engine.run(shutdown).await }));
    }

    info!(
        autotrade = state.controls.is_enabled(),
        armed = ?state.controls.symbols(),
        "system ready, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();

    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("task did not stop within 5s");
        }
    }

    info!(orders = state.order_log.len(), "stopped");
    tracing::debug!(metrics = %state.metrics.render(), "final metrics");
    Ok(())
}
