//! Volume, price and spread anomalies

use crate::types::StrategyScore;

use super::{Strategy, StrategyContext, WINDOW_1MO};

pub struct AnomalyDetector;

impl AnomalyDetector {
    pub const MIN_BARS: usize = 20;
}

impl Strategy for AnomalyDetector {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_1MO);
        if window.len() < Self::MIN_BARS {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        }
        let mut result = StrategyScore::new(self.name());
        let last = &window[window.len() - 1];
        let prev = &window[window.len() - 2];

        // average includes the current bar
        let recent = &window[window.len() - 20..];
        let avg_volume = recent.iter().map(|c| c.volume).sum::<f64>() / recent.len() as f64;
        if avg_volume > 0.0 {
            let ratio = last.volume / avg_volume;
            if ratio > 5.0 {
                result.add(25, format!("VOLUME_SPIKE {:.1}x promedio", ratio));
            } else if ratio > 3.0 {
                result.add(15, format!("HIGH_VOLUME {:.1}x promedio", ratio));
            }
        }

        if prev.close > 0.0 {
            let change = (last.close - prev.close) / prev.close;
            let pct = change.abs() * 100.0;
            if change.abs() > 0.10 {
                if change > 0.0 {
                    result.add(20, format!("PRICE_BREAKOUT subida {:.1}%", pct));
                } else {
                    result.add(-25, format!("PRICE_CRASH caída {:.1}%", pct));
                }
            } else if change.abs() > 0.05 {
                if change > 0.0 {
                    result.add(10, format!("STRONG_MOVE_UP subida {:.1}%", pct));
                } else {
                    result.add(-10, format!("STRONG_MOVE_DOWN caída {:.1}%", pct));
                }
            }
        }

        if let Some(spread) = ctx.quote.and_then(|q| q.spread_pct()) {
            if spread > 0.03 {
                result.add(-10, format!("WIDE_SPREAD {:.2}%", spread * 100.0));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::{make_candle_with_volume, series};
    use crate::types::Quote;

    #[test]
    fn test_volume_spike_and_breakout() {
        let mut candles: Vec<_> = (0..24).map(|i| make_candle_with_volume(i, 100.0, 1000.0)).collect();
        candles.push(make_candle_with_volume(24, 112.0, 10_000.0));
        let s = AnomalyDetector.evaluate(&StrategyContext::new("GGAL", &candles));
        // 10000 / ((19*1000 + 10000)/20) = 6.9x -> +25, +12% -> +20
        assert_eq!(s.score, 45);
    }

    #[test]
    fn test_crash_and_wide_spread() {
        let mut candles = series(24, |_| 100.0);
        candles.push(make_candle_with_volume(24, 85.0, 1000.0));
        let quote = Quote {
            price: 85.0,
            bid: Some(84.0),
            ask: Some(87.0),
            ..Default::default()
        };
        let ctx = StrategyContext::new("GGAL", &candles).with_quote(&quote);
        assert_eq!(AnomalyDetector.evaluate(&ctx).score, -35);
    }

    #[test]
    fn test_quiet_market() {
        let candles = series(30, |_| 100.0);
        assert_eq!(AnomalyDetector.evaluate(&StrategyContext::new("GGAL", &candles)).score, 0);
    }
}
