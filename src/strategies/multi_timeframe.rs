//! Multi-timeframe trend confirmation (1D, 4H, 1H, 15M)

use crate::features::{ema, rsi, sma};
use crate::types::{Candle, StrategyScore, Timeframe};

use super::{Strategy, StrategyContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

/// Analysis of a single timeframe
#[derive(Debug, Clone)]
pub struct TimeframeScore {
    pub timeframe: Timeframe,
    pub score: i32,
    pub trend: Trend,
}

pub struct MultiTimeframe {
    /// (timeframe, weight in %)
    weights: Vec<(Timeframe, i32)>,
    min_bars: usize,
}

impl MultiTimeframe {
    pub fn new() -> Self {
        Self {
            weights: vec![
                (Timeframe::Day1, 40),
                (Timeframe::Hour4, 30),
                (Timeframe::Hour1, 20),
                (Timeframe::Min15, 10),
            ],
            min_bars: 20,
        }
    }

    /// Score one series: SMA/EMA trend plus RSI extremes
    pub fn score_timeframe(&self, timeframe: Timeframe, candles: &[Candle]) -> Option<TimeframeScore> {
        if candles.len() < self.min_bars {
            return None;
        }
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let price = *closes.last()?;
        let sma20 = sma(&closes, 20)?;
        let sma50 = sma(&closes, 50).unwrap_or(sma20);
        let ema12 = ema(&closes, 12)?;
        let ema26 = ema(&closes, 26).unwrap_or(ema12);

        let mut score = 0;
        score += if price > sma20 { 10 } else { -10 };
        score += if sma20 > sma50 { 15 } else { -15 };
        score += if ema12 > ema26 { 10 } else { -10 };
        if let Some(r) = rsi(&closes, 14) {
            if r < 40.0 {
                score += 10;
            } else if r > 60.0 {
                score -= 10;
            }
        }

        let trend = if score > 15 {
            Trend::Bullish
        } else if score < -15 {
            Trend::Bearish
        } else {
            Trend::Neutral
        };
        Some(TimeframeScore {
            timeframe,
            score,
            trend,
        })
    }
}

impl Default for MultiTimeframe {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MultiTimeframe {
    fn name(&self) -> &'static str {
        "multi_timeframe"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let mut result = StrategyScore::new(self.name());
        let mut weighted = 0.0;
        let mut trends = Vec::new();

        for (tf, weight) in &self.weights {
            let Some(candles) = ctx.series(*tf) else {
                continue;
            };
            let Some(tf_score) = self.score_timeframe(*tf, candles) else {
                continue;
            };
            weighted += tf_score.score as f64 * *weight as f64 / 100.0;
            result
                .factors
                .push(format!("{}: {:+} ({:?})", tf, tf_score.score, tf_score.trend));
            trends.push(tf_score.trend);
        }

        if trends.is_empty() {
            return super::insufficient(self.name(), ctx.daily.len(), self.min_bars);
        }

        let mut score = weighted as i32;
        let total = trends.len() as f64;
        let bullish = trends.iter().filter(|t| **t == Trend::Bullish).count() as f64;
        let bearish = trends.iter().filter(|t| **t == Trend::Bearish).count() as f64;
        if bullish >= total * 0.75 {
            score += 15;
            result
                .factors
                .push(format!("Alineación alcista {:.0}% (+15)", bullish / total * 100.0));
        } else if bearish >= total * 0.75 {
            score -= 15;
            result
                .factors
                .push(format!("Alineación bajista {:.0}% (-15)", bearish / total * 100.0));
        }

        result.score = score;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;
    use std::collections::HashMap;

    #[test]
    fn test_uptrend_on_all_timeframes_is_aligned() {
        let daily = series(120, |i| 100.0 + i as f64 + if i % 2 == 0 { 0.6 } else { 0.0 });
        let hourly = series(60, |i| 200.0 + i as f64 * 0.5 + if i % 2 == 0 { 0.3 } else { 0.0 });
        let mut intraday = HashMap::new();
        intraday.insert(Timeframe::Hour1, hourly.clone());
        intraday.insert(Timeframe::Hour4, hourly.clone());
        intraday.insert(Timeframe::Min15, hourly);

        let ctx = StrategyContext::new("GGAL", &daily).with_intraday(&intraday);
        let s = MultiTimeframe::new().evaluate(&ctx);
        // per tf: +10 +15 +10 -10 (RSI overbought) = 25 -> bullish everywhere
        assert_eq!(s.score, 25 + 15);
    }

    #[test]
    fn test_daily_only_downtrend() {
        let daily = series(120, |i| 300.0 - i as f64 - if i % 2 == 0 { 0.6 } else { 0.0 });
        let ctx = StrategyContext::new("GGAL", &daily);
        let s = MultiTimeframe::new().evaluate(&ctx);
        // -10 -15 -10 +10 = -25 weighted 0.4 -> -10, fully aligned bearish -15
        assert_eq!(s.score, -10 - 15);
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let daily = series(10, |i| 100.0 + i as f64);
        let s = MultiTimeframe::new().evaluate(&StrategyContext::new("GGAL", &daily));
        assert_eq!(s.score, 0);
    }
}
