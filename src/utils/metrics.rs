use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Engine counters on a private registry
pub struct Metrics {
    registry: Registry,
    pub signal_evaluations: IntCounterVec,
    pub orders: IntCounterVec,
    pub filter_violations: IntCounterVec,
    pub symbol_failures: IntCounterVec,
    pub task_failures: IntCounterVec,
    pub refreshes: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("trader".to_string()), None)?;

        let signal_evaluations = IntCounterVec::new(
            Opts::new("signal_evaluations_total", "Signal evaluations by resulting side"),
            &["symbol", "side"],
        )?;
        let orders = IntCounterVec::new(
            Opts::new("orders_total", "Orders recorded by mode and status"),
            &["symbol", "mode", "status"],
        )?;
        let filter_violations = IntCounterVec::new(
            Opts::new("filter_violations_total", "Orders refused by local admission"),
            &["symbol"],
        )?;
        let symbol_failures = IntCounterVec::new(
            Opts::new("symbol_failures_total", "Per-symbol execution failures"),
            &["symbol"],
        )?;
        let task_failures = IntCounterVec::new(
            Opts::new("task_failures_total", "Failed runs of supervised background tasks"),
            &["task"],
        )?;
        let refreshes = IntCounter::new("candle_refreshes_total", "Completed candle refresh passes")?;

        registry.register(Box::new(signal_evaluations.clone()))?;
        registry.register(Box::new(orders.clone()))?;
        registry.register(Box::new(filter_violations.clone()))?;
        registry.register(Box::new(symbol_failures.clone()))?;
        registry.register(Box::new(task_failures.clone()))?;
        registry.register(Box::new(refreshes.clone()))?;

        Ok(Self {
            registry,
            signal_evaluations,
            orders,
            filter_violations,
            symbol_failures,
            task_failures,
            refreshes,
        })
    }

    /// Prometheus text exposition of every counter
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "metrics encoding failed");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_labelled_counters() {
        let m = Metrics::new().unwrap();
        m.orders.with_label_values(&["BTCUSDC", "paper", "PAPER"]).inc();
        m.task_failures.with_label_values(&["candles"]).inc_by(2);

        let text = m.render();
        assert!(text.contains("trader_orders_total{mode=\"paper\",status=\"PAPER\",symbol=\"BTCUSDC\"} 1"));
        assert!(text.contains("trader_task_failures_total{task=\"candles\"} 2"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.refreshes.inc();
        assert_eq!(a.refreshes.get(), 1);
        assert_eq!(b.refreshes.get(), 0);
    }
}
