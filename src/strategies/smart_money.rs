//! Smart money concepts: order blocks, fair value gaps, liquidity sweeps

use crate::types::{Candle, StrategyScore};

use super::{Strategy, StrategyContext, WINDOW_3MO};

/// Last bearish candle (within 10 bars) followed by a >5% impulse, price back inside it
pub fn bullish_order_block(candles: &[Candle]) -> Option<(f64, f64)> {
    let n = candles.len();
    let price = candles.last()?.close;
    for i in n.saturating_sub(10)..n.saturating_sub(1) {
        let c = &candles[i];
        if !c.is_bearish() {
            continue;
        }
        let max_after = candles[i + 1..].iter().map(|c| c.close).fold(f64::MIN, f64::max);
        if max_after > c.high * 1.05 && c.low <= price && price <= c.high {
            return Some((c.low, c.high));
        }
    }
    None
}

/// Bullish gap >2% between bar i-1 high and bar i+1 low, price filling it
pub fn bullish_fair_value_gap(candles: &[Candle]) -> Option<(f64, f64)> {
    let n = candles.len();
    if n < 4 {
        return None;
    }
    let price = candles[n - 1].close;
    for i in (n - 3)..(n - 1) {
        let prev_high = candles[i - 1].high;
        let next_low = candles[i + 1].low;
        if next_low > prev_high && (next_low - prev_high) / prev_high > 0.02 {
            if prev_high <= price && price <= next_low {
                return Some((prev_high, next_low));
            }
        }
    }
    None
}

/// In the last 10 bars: a low taken out and reclaimed on the following bar
pub fn liquidity_sweep(candles: &[Candle]) -> Option<f64> {
    let recent = &candles[candles.len().saturating_sub(10)..];
    if recent.len() < 3 {
        return None;
    }
    for i in 0..recent.len() - 2 {
        let level = recent[i].low;
        if recent[i + 1].low < level && recent[i + 2].close > level {
            return Some(level);
        }
    }
    None
}

pub struct SmartMoney;

impl SmartMoney {
    pub const MIN_BARS: usize = 50;
}

impl Strategy for SmartMoney {
    fn name(&self) -> &'static str {
        "smart_money"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_3MO);
        if window.len() < Self::MIN_BARS {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        }
        let mut result = StrategyScore::new(self.name());
        if let Some((low, high)) = bullish_order_block(window) {
            result.add(25, format!("Precio en Order Block alcista {:.2}-{:.2} (+25)", low, high));
        }
        if let Some((low, high)) = bullish_fair_value_gap(window) {
            result.add(20, format!("FVG alcista llenándose {:.2}-{:.2} (+20)", low, high));
        }
        if let Some(level) = liquidity_sweep(window) {
            result.add(25, format!("Liquidity sweep en {:.2} (+25)", level));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;

    #[test]
    fn test_liquidity_sweep() {
        let closes = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 98.0, 101.0];
        let candles = series(closes.len(), |i| closes[i]);
        // bar 8 takes out the 99 low, bar 9 closes back above it
        assert!(liquidity_sweep(&candles).is_some());
    }

    #[test]
    fn test_monotonic_rise_has_no_sweep() {
        let candles = series(20, |i| 100.0 + i as f64);
        assert!(liquidity_sweep(&candles).is_none());
    }

    #[test]
    fn test_order_block_retest() {
        let mut candles = series(60, |_| 100.0);
        let n = candles.len();
        // bearish bar, impulse to 108, then back into the bearish bar's range
        candles[n - 5].open = 101.0;
        candles[n - 5].close = 100.0;
        candles[n - 5].high = 101.5;
        candles[n - 5].low = 99.5;
        for (k, close) in [(n - 4, 104.0), (n - 3, 108.0), (n - 2, 103.0), (n - 1, 100.5)] {
            candles[k].close = close;
            candles[k].open = close;
            candles[k].high = close * 1.01;
            candles[k].low = close * 0.99;
        }
        assert_eq!(bullish_order_block(&candles), Some((99.5, 101.5)));
        let s = SmartMoney.evaluate(&StrategyContext::new("GGAL", &candles));
        assert!(s.score >= 25);
    }

    #[test]
    fn test_needs_fifty_bars() {
        let candles = series(40, |_| 100.0);
        assert_eq!(SmartMoney.evaluate(&StrategyContext::new("GGAL", &candles)).score, 0);
    }
}
