//! Williams fractals as dynamic support / resistance

use crate::types::{Candle, StrategyScore};

use super::{Strategy, StrategyContext, WINDOW_1MO};

/// Bullish fractal lows and bearish fractal highs (5-bar pattern)
pub fn find_fractals(candles: &[Candle]) -> (Vec<f64>, Vec<f64>) {
    let mut supports = Vec::new();
    let mut resistances = Vec::new();
    if candles.len() < 5 {
        return (supports, resistances);
    }
    for i in 2..candles.len() - 2 {
        let low = candles[i].low;
        if [i - 2, i - 1, i + 1, i + 2].iter().all(|&j| low < candles[j].low) {
            supports.push(low);
        }
        let high = candles[i].high;
        if [i - 2, i - 1, i + 1, i + 2].iter().all(|&j| high > candles[j].high) {
            resistances.push(high);
        }
    }
    (supports, resistances)
}

fn nearest(levels: &[f64], price: f64) -> Option<f64> {
    levels
        .iter()
        .copied()
        .min_by(|a, b| (a - price).abs().total_cmp(&(b - price).abs()))
}

pub struct Fractals;

impl Strategy for Fractals {
    fn name(&self) -> &'static str {
        "fractals"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_1MO);
        if window.len() < 5 {
            return super::insufficient(self.name(), window.len(), 5);
        }
        let Some(price) = window.last().map(|c| c.close) else {
            return super::insufficient(self.name(), 0, 5);
        };
        let (supports, resistances) = find_fractals(window);
        let mut result = StrategyScore::new(self.name());

        if let Some(support) = nearest(&supports, price) {
            if (price - support).abs() / price < 0.02 {
                result.add(15, format!("Cerca de soporte fractal {:.2} (+15)", support));
            }
        }
        if let Some(resistance) = nearest(&resistances, price) {
            if (price - resistance).abs() / price < 0.02 {
                result.add(-15, format!("Cerca de resistencia fractal {:.2} (-15)", resistance));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;

    #[test]
    fn test_detects_v_shaped_low() {
        let closes = [105.0, 103.0, 100.0, 103.0, 105.0];
        let candles = series(5, |i| closes[i]);
        let (supports, resistances) = find_fractals(&candles);
        assert_eq!(supports.len(), 1);
        assert!(resistances.is_empty());
    }

    #[test]
    fn test_price_near_support_scores_positive() {
        // dip to 100 then recovery to 101: support within 2%
        let closes = [110.0, 108.0, 104.0, 102.0, 100.0, 102.0, 103.0, 102.5, 101.5, 101.0];
        let candles = series(closes.len(), |i| closes[i]);
        let s = Fractals.evaluate(&StrategyContext::new("GGAL", &candles));
        assert_eq!(s.score, 15);
    }

    #[test]
    fn test_price_far_from_fractals_is_neutral() {
        let closes = [110.0, 108.0, 104.0, 102.0, 100.0, 102.0, 106.0, 110.0, 115.0, 120.0];
        let candles = series(closes.len(), |i| closes[i]);
        let s = Fractals.evaluate(&StrategyContext::new("GGAL", &candles));
        assert_eq!(s.score, 0);
    }
}
