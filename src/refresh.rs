//! Background refreshers that keep the shared stores current: closed candles,
//! account balances and exchange trading rules.
//!
//! Each refresh is a single pass returning a result; [`spawn_refreshers`]
//! wraps them in supervised periodic tasks. A failed pass leaves the previous
//! data in place.

use crate::data::Candle;
use crate::error::{EngineError, EngineResult};
use crate::exchange::{AccountSource, MarketDataSource, RulesSource};
use crate::state::SharedState;
use crate::utils::config::{Config, IndicatorConfig, RefreshConfig};
use crate::utils::supervisor::{run_periodic, Backoff};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Replace every watched symbol's buffer with its latest closed candles.
///
/// Symbols fail independently. Results fetched under a timeframe that has
/// since changed are dropped. Returns the number of symbols updated; errors
/// only when every symbol failed.
pub async fn refresh_candles(state: &SharedState, source: &dyn MarketDataSource, limit: u32) -> EngineResult<usize> {
    let (timeframe, generation) = state.strategy.timeframe();
    let symbols = state.symbols();
    let mut updated = 0;
    let mut last_error = None;

    for symbol in &symbols {
        let candles = match source.closed_candles(symbol, &timeframe, limit).await {
            Ok(c) => c,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "candle refresh failed");
                last_error = Some(e);
                continue;
            }
        };

        if !install_candles(state, symbol, candles, generation) {
            info!(timeframe = %timeframe, "timeframe changed during refresh, discarding");
            return Ok(updated);
        }
        updated += 1;
    }

    match last_error {
        Some(e) if updated == 0 && !symbols.is_empty() => Err(e),
        _ => {
            state.metrics.refreshes.inc();
            debug!(updated, timeframe = %timeframe, "candles refreshed");
            Ok(updated)
        }
    }
}

/// Install `candles` for `symbol` if the timeframe generation is still
/// `generation`, seeding the last price from the latest close when none exists.
///
/// The check runs under the symbol's entry guard. A timeframe change bumps the
/// generation before clearing, and clearing needs the same guard, so bars
/// fetched under the old timeframe never outlive the clear.
fn install_candles(state: &SharedState, symbol: &str, candles: Vec<Candle>, generation: u64) -> bool {
    state
        .ledger
        .with_instrument_mut(symbol, |inst| {
            if state.strategy.generation() != generation {
                return false;
            }
            let latest_close = candles.last().map(|c| c.close);
            inst.candles.replace(candles);
            if inst.last_price.is_none() {
                inst.last_price = latest_close;
            }
            true
        })
        .unwrap_or(false)
}

/// Replace the balance cache wholesale. Returns the number of held assets.
pub async fn refresh_balances(state: &SharedState, source: &dyn AccountSource) -> EngineResult<usize> {
    let snapshot = source.balances().await?;
    state.balances.replace(snapshot);
    let snapshot = state.balances.snapshot();
    debug!(assets = snapshot.len(), "balances refreshed");
    Ok(snapshot.len())
}

/// Reload trading rules for the watched symbols
pub async fn refresh_rules(state: &SharedState, source: &dyn RulesSource) -> EngineResult<usize> {
    let symbols = state.symbols();
    let rules = source.trading_rules(&symbols).await?;
    if rules.is_empty() && !symbols.is_empty() {
        return Err(EngineError::MarketDataUnavailable(
            "exchange returned no rules for any watched symbol".to_string(),
        ));
    }
    for missing in symbols.iter().filter(|s| !rules.contains_key(*s)) {
        warn!(symbol = %missing, "no trading rules listed, using defaults");
    }
    let count = rules.len();
    state.rules.replace_all(rules);
    info!(symbols = count, "trading rules loaded");
    Ok(count)
}

/// Collaborators backing the refreshers. `account` is absent in paper mode.
pub struct RefreshSources {
    pub market: Arc<dyn MarketDataSource>,
    pub rules: Arc<dyn RulesSource>,
    pub account: Option<Arc<dyn AccountSource>>,
}

/// Spawn one supervised task per refresher
pub fn spawn_refreshers(
    state: &SharedState,
    sources: RefreshSources,
    config: &Config,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let RefreshConfig {
        candles_secs,
        balances_secs,
        rules_secs,
        ..
    } = config.refresh;
    let IndicatorConfig { kline_limit, .. } = config.indicators;
    let backoff = Backoff::from_config(&config.refresh);
    let mut handles = Vec::new();

    {
        let (state, market, shutdown, backoff) = (state.clone(), sources.market, shutdown.clone(), backoff.clone());
        let failures = state.metrics.task_failures.with_label_values(&["candles"]);
        handles.push(tokio::spawn(async move {
            run_periodic(
                "candles",
                Duration::from_secs(candles_secs.max(1)),
                backoff,
                shutdown,
                || refresh_candles(&state, market.as_ref(), kline_limit),
                |_| failures.inc(),
            )
            .await
        }));
    }

    {
        let (state, rules, shutdown, backoff) = (state.clone(), sources.rules, shutdown.clone(), backoff.clone());
        let failures = state.metrics.task_failures.with_label_values(&["rules"]);
        handles.push(tokio::spawn(async move {
            run_periodic(
                "rules",
                Duration::from_secs(rules_secs.max(60)),
                backoff,
                shutdown,
                || refresh_rules(&state, rules.as_ref()),
                |_| failures.inc(),
            )
            .await
        }));
    }

    match sources.account {
        Some(account) => {
            let (state, shutdown) = (state.clone(), shutdown.clone());
            let failures = state.metrics.task_failures.with_label_values(&["balances"]);
            handles.push(tokio::spawn(async move {
                run_periodic(
                    "balances",
                    Duration::from_secs(balances_secs.max(1)),
                    backoff,
                    shutdown,
                    || refresh_balances(&state, account.as_ref()),
                    |_| failures.inc(),
                )
                .await
            }));
        }
        None => info!("no account source, balance refresh disabled"),
    }

    handles
}
