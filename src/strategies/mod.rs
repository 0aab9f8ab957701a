//! Advanced strategies
//!
//! Every strategy turns a candle window into a signed `StrategyScore`.
//! Strategies that need I/O (macro data, news sentiment) live in their own
//! services and are fed into scoring separately.

pub mod anomaly;
pub mod candlesticks;
pub mod elliott;
pub mod fractal;
pub mod macro_context;
pub mod monte_carlo;
pub mod multi_timeframe;
pub mod patterns;
pub mod prediction;
pub mod regime;
pub mod seasonal;
pub mod sentiment;
pub mod smart_money;
pub mod volume_profile;

pub use macro_context::{MacroService, MacroSnapshot};
pub use prediction::{Prediction, TrendPredictor};
pub use regime::{RegimeDetector, RegimeInfo};
pub use sentiment::{SentimentAnalyzer, SentimentLabel, SentimentSummary};

use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;

use crate::config::StrategiesConfig;
use crate::types::{local_now, Candle, Quote, StrategyScore, Timeframe};

/// Trailing windows in daily bars
pub const WINDOW_1MO: usize = 21;
pub const WINDOW_2MO: usize = 42;
pub const WINDOW_3MO: usize = 63;

/// Everything a strategy may look at
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    /// Daily candles, oldest first
    pub daily: &'a [Candle],
    /// Intraday series (1H, 4H, 15M)
    pub intraday: Option<&'a HashMap<Timeframe, Vec<Candle>>>,
    pub quote: Option<&'a Quote>,
    /// Local (Buenos Aires) time of the analysis
    pub now: DateTime<FixedOffset>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(symbol: &'a str, daily: &'a [Candle]) -> Self {
        Self {
            symbol,
            daily,
            intraday: None,
            quote: None,
            now: local_now(),
        }
    }

    pub fn with_intraday(mut self, intraday: &'a HashMap<Timeframe, Vec<Candle>>) -> Self {
        self.intraday = Some(intraday);
        self
    }

    pub fn with_quote(mut self, quote: &'a Quote) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn at(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = now;
        self
    }

    /// Last `n` daily bars (or all of them)
    pub fn window(&self, n: usize) -> &'a [Candle] {
        let start = self.daily.len().saturating_sub(n);
        &self.daily[start..]
    }

    /// Series for a timeframe, daily included
    pub fn series(&self, tf: Timeframe) -> Option<&'a [Candle]> {
        match tf {
            Timeframe::Day1 => Some(self.daily),
            _ => self.intraday?.get(&tf).map(|v| v.as_slice()),
        }
    }

    /// Quote price, falling back to the last close
    pub fn price(&self) -> Option<f64> {
        self.quote
            .map(|q| q.price)
            .filter(|p| *p > 0.0)
            .or_else(|| self.daily.last().map(|c| c.close))
    }
}

/// A candle-driven scoring rule
pub trait Strategy: Send + Sync {
    /// Key used in score maps and calibration
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore;
}

/// Score 0 with an "insufficient data" factor
pub fn insufficient(name: &str, have: usize, need: usize) -> StrategyScore {
    let mut s = StrategyScore::new(name);
    s.factors
        .push(format!("Datos insuficientes ({}/{} velas)", have, need));
    s
}

/// The ordered set of enabled candle strategies
pub struct StrategySet {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategySet {
    pub fn from_config(cfg: &StrategiesConfig) -> Self {
        let all: Vec<Box<dyn Strategy>> = vec![
            Box::new(multi_timeframe::MultiTimeframe::new()),
            Box::new(seasonal::Seasonal::new()),
            Box::new(fractal::Fractals),
            Box::new(anomaly::AnomalyDetector),
            Box::new(volume_profile::VolumeProfile::new(20)),
            Box::new(monte_carlo::MonteCarlo::new(
                cfg.monte_carlo_simulations,
                cfg.monte_carlo_horizon_days,
            )),
            Box::new(patterns::PatternRecognizer),
            Box::new(smart_money::SmartMoney),
            Box::new(elliott::ElliottWave::new(5)),
            Box::new(candlesticks::Candlesticks::new(5)),
        ];
        Self {
            strategies: all
                .into_iter()
                .filter(|s| cfg.is_enabled(s.name()))
                .collect(),
        }
    }

    /// Without the candle strategies (backtests of the technical core)
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn evaluate_all(&self, ctx: &StrategyContext<'_>) -> Vec<StrategyScore> {
        self.strategies
            .iter()
            .map(|s| {
                let score = s.evaluate(ctx);
                tracing::debug!(
                    symbol = ctx.symbol,
                    strategy = s.name(),
                    score = score.score,
                    "Strategy evaluated"
                );
                score
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;

    #[test]
    fn test_strategy_set_respects_enabled_list() {
        let all = StrategySet::from_config(&StrategiesConfig::default());
        assert_eq!(all.len(), 10);

        let cfg = StrategiesConfig {
            enabled: vec!["patterns".into(), "candlesticks".into()],
            ..Default::default()
        };
        let some = StrategySet::from_config(&cfg);
        assert_eq!(some.names(), vec!["patterns", "candlesticks"]);
    }

    #[test]
    fn test_context_window_and_price() {
        let candles = series(100, |i| 100.0 + i as f64);
        let ctx = StrategyContext::new("GGAL", &candles);
        assert_eq!(ctx.window(WINDOW_1MO).len(), 21);
        assert_eq!(ctx.window(500).len(), 100);
        assert_eq!(ctx.price(), Some(199.0));
        assert!(ctx.series(Timeframe::Hour1).is_none());
        assert_eq!(ctx.series(Timeframe::Day1).map(|s| s.len()), Some(100));
    }
}
