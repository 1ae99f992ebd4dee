use rust_decimal::Decimal;

/// Exponential moving average over the last `length` points.
///
/// Seeded with the earliest value of the window and smoothed forward with
/// k = 2/(length+1). Returns `None` when fewer than `length` points exist;
/// callers must read that as "not enough data", never as zero.
pub fn ema(series: &[Decimal], length: usize) -> Option<Decimal> {
    if length == 0 || series.len() < length {
        return None;
    }

    let k = Decimal::TWO / Decimal::from(length + 1);

    let window = &series[series.len() - length..];
    let mut value = window[0];
    for v in &window[1..] {
        // v*k + e*(1-k), arranged so an unchanged input leaves e exact
        value += k * (*v - value);
    }
    Some(value)
}

/// Average of the last `length` true ranges.
///
/// True range at bar i = max(high-low, |high-prev close|, |low-prev close|),
/// so `length + 1` closes are required.
pub fn atr(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], length: usize) -> Option<Decimal> {
    let n = closes.len();
    if length == 0 || n < length + 1 || highs.len() < n || lows.len() < n {
        return None;
    }

    let mut sum = Decimal::ZERO;
    for i in n - length..n {
        let (h, l, prev_close) = (highs[i], lows[i], closes[i - 1]);
        let tr = (h - l)
            .max((h - prev_close).abs())
            .max((l - prev_close).abs());
        sum += tr;
    }
    Some(sum / Decimal::from(length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ema_seeds_from_window_start() {
        // k = 0.5, seed 11 -> 11.5 -> 12.25
        let series = [dec!(10), dec!(11), dec!(12), dec!(13)];
        assert_eq!(ema(&series, 3), Some(dec!(12.25)));
    }

    #[test]
    fn test_ema_undefined_when_short() {
        let series = [dec!(1), dec!(2)];
        assert_eq!(ema(&series, 3), None);
        assert_eq!(ema(&series, 0), None);
        assert!(ema(&series, 2).is_some());
    }

    #[test]
    fn test_ema_of_constant_is_constant() {
        let series = vec![dec!(42.5); 60];
        assert_eq!(ema(&series, 50), Some(dec!(42.5)));
    }

    #[test]
    fn test_atr_uses_previous_close_gaps() {
        // bar 2 gaps up: |high - prev close| dominates
        let highs = [dec!(10), dec!(11), dec!(15)];
        let lows = [dec!(9), dec!(10), dec!(14)];
        let closes = [dec!(10), dec!(10.5), dec!(14.5)];

        // tr1 = max(1, 1, 0) = 1 ; tr2 = max(1, 4.5, 3.5) = 4.5
        assert_eq!(atr(&highs, &lows, &closes, 2), Some(dec!(2.75)));
    }

    #[test]
    fn test_atr_requires_length_plus_one_closes() {
        let bars = [dec!(1), dec!(2), dec!(3)];
        assert_eq!(atr(&bars, &bars, &bars, 3), None);
        assert_eq!(atr(&bars, &bars, &bars, 2), Some(dec!(1)));
    }
}
