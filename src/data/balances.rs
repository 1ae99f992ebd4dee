use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Quote assets recognised when splitting a spot symbol
const QUOTE_ASSETS: [&str; 4] = ["USDT", "USDC", "FDUSD", "TUSD"];

/// Split a spot symbol into (base, quote).
///
/// Known quote suffixes are tried first; anything else is split before the
/// last three characters.
pub fn base_quote(symbol: &str) -> (String, String) {
    let s = symbol.trim().to_uppercase();
    for quote in QUOTE_ASSETS {
        if s.len() > quote.len() && s.ends_with(quote) {
            return (s[..s.len() - quote.len()].to_string(), quote.to_string());
        }
    }
    let cut = s.len().saturating_sub(3);
    (s[..cut].to_string(), s[cut..].to_string())
}

/// Last-known account holdings (free + locked) per asset
#[derive(Default)]
pub struct BalanceCache {
    assets: DashMap<String, Decimal>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot. Zero and negative holdings are dropped.
    pub fn replace(&self, snapshot: HashMap<String, Decimal>) {
        self.assets.clear();
        for (asset, qty) in snapshot {
            if qty > Decimal::ZERO {
                self.assets.insert(asset.to_uppercase(), qty);
            }
        }
    }

    /// Held quantity, zero when unknown
    pub fn get(&self, asset: &str) -> Decimal {
        self.assets
            .get(&asset.to_uppercase())
            .map(|v| *v)
            .unwrap_or(Decimal::ZERO)
    }

    /// (base held, quote held) for a trading symbol
    pub fn for_symbol(&self, symbol: &str) -> (Decimal, Decimal) {
        let (base, quote) = base_quote(symbol);
        (self.get(&base), self.get(&quote))
    }

    pub fn snapshot(&self) -> HashMap<String, Decimal> {
        self.assets
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_base_quote_known_suffixes() {
        assert_eq!(base_quote("BTCUSDC"), ("BTC".into(), "USDC".into()));
        assert_eq!(base_quote("ethusdt"), ("ETH".into(), "USDT".into()));
        assert_eq!(base_quote("SOLFDUSD"), ("SOL".into(), "FDUSD".into()));
    }

    #[test]
    fn test_base_quote_fallback_three_chars() {
        assert_eq!(base_quote("ETHBTC"), ("ETH".into(), "BTC".into()));
        assert_eq!(base_quote("BNB"), ("".into(), "BNB".into()));
    }

    #[test]
    fn test_replace_drops_empty_assets() {
        let cache = BalanceCache::new();
        cache.replace(HashMap::from([
            ("BTC".to_string(), dec!(0.5)),
            ("USDC".to_string(), dec!(1000)),
            ("DOGE".to_string(), Decimal::ZERO),
        ]));

        assert_eq!(cache.for_symbol("BTCUSDC"), (dec!(0.5), dec!(1000)));
        assert_eq!(cache.get("DOGE"), Decimal::ZERO);
        assert_eq!(cache.snapshot().len(), 2);

        cache.replace(HashMap::new());
        assert!(cache.snapshot().is_empty());
    }
}
