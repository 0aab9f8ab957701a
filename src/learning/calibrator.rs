//! Strategy Calibrator
//!
//! Learns a weight per strategy from closed trades. Each trade credits a win
//! or a loss to every strategy that pointed in the trade's direction at
//! entry. The weights feed the meta-learner.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::ClosedTrade;

/// Trade result for calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeResult {
    Win,
    Loss,
}

impl From<&ClosedTrade> for TradeResult {
    fn from(trade: &ClosedTrade) -> Self {
        if trade.is_win() {
            TradeResult::Win
        } else {
            TradeResult::Loss
        }
    }
}

/// Statistics for a single strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStats {
    pub name: String,
    pub total_signals: usize,
    pub wins: usize,
    pub losses: usize,
    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,
    /// Calibrated weight based on performance
    pub calibrated_weight: f64,
    /// Default weight (before calibration)
    pub default_weight: f64,
    pub last_updated: i64,
}

impl StrategyStats {
    pub fn new(name: &str, default_weight: f64) -> Self {
        Self {
            name: name.to_string(),
            total_signals: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            calibrated_weight: default_weight,
            default_weight,
            last_updated: 0,
        }
    }

    pub fn record_signal(&mut self, result: TradeResult) {
        match result {
            TradeResult::Win => self.wins += 1,
            TradeResult::Loss => self.losses += 1,
        }
        self.total_signals += 1;
        self.last_updated = chrono::Utc::now().timestamp();
    }

    pub fn recalculate(&mut self, min_samples: usize) {
        if self.total_signals > 0 {
            self.win_rate = self.wins as f64 / self.total_signals as f64;
        }

        if self.total_signals < min_samples {
            return;
        }

        // Exits run at 2:1 reward/risk, so ~34% is break-even.
        let performance_factor = if self.win_rate >= 0.50 {
            1.0 + (self.win_rate - 0.50) * 4.0
        } else if self.win_rate >= 0.40 {
            0.8 + (self.win_rate - 0.40) * 2.0
        } else if self.win_rate >= 0.30 {
            0.5 + (self.win_rate - 0.30) * 3.0
        } else {
            0.2 + self.win_rate
        };

        self.calibrated_weight = (self.default_weight * performance_factor)
            .clamp(self.default_weight * 0.1, self.default_weight * 3.0);
    }

    pub fn is_calibrated(&self, min_samples: usize) -> bool {
        self.total_signals >= min_samples
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyCalibrator {
    stats: HashMap<String, StrategyStats>,
    /// Minimum samples needed before calibration kicks in
    min_samples: usize,
}

impl Default for StrategyCalibrator {
    fn default() -> Self {
        Self::new(10)
    }
}

impl StrategyCalibrator {
    pub fn new(min_samples: usize) -> Self {
        Self {
            stats: HashMap::new(),
            min_samples,
        }
    }

    pub fn set_min_samples(&mut self, min_samples: usize) {
        self.min_samples = min_samples;
    }

    /// Credit `result` to every strategy in `strategies`
    pub fn record_trade(&mut self, strategies: &[String], result: TradeResult) {
        for name in strategies {
            self.stats
                .entry(name.clone())
                .or_insert_with(|| StrategyStats::new(name, 1.0))
                .record_signal(result);
        }
    }

    /// Recalculate all weights based on accumulated data
    pub fn recalibrate(&mut self) {
        for stats in self.stats.values_mut() {
            stats.recalculate(self.min_samples);
        }
    }

    pub fn weight(&self, name: &str) -> f64 {
        self.stats.get(name).map(|s| s.calibrated_weight).unwrap_or(1.0)
    }

    pub fn stats(&self, name: &str) -> Option<&StrategyStats> {
        self.stats.get(name)
    }

    /// Weights of the strategies with enough samples, for the meta-learner
    pub fn calibration(&self) -> HashMap<String, f64> {
        self.stats
            .values()
            .filter(|s| s.is_calibrated(self.min_samples))
            .map(|s| (s.name.clone(), s.calibrated_weight))
            .collect()
    }

    pub fn is_calibrated(&self) -> bool {
        self.stats.values().any(|s| s.is_calibrated(self.min_samples))
    }

    /// Strategies sorted by win rate, best first
    pub fn top_performers(&self, limit: usize) -> Vec<StrategyStats> {
        let mut stats: Vec<StrategyStats> = self.stats.values().cloned().collect();
        stats.sort_by(|a, b| {
            b.win_rate
                .partial_cmp(&a.win_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        stats.into_iter().take(limit).collect()
    }

    pub fn reset(&mut self) {
        self.stats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn uncalibrated_until_min_samples() {
        let mut c = StrategyCalibrator::new(10);
        for _ in 0..9 {
            c.record_trade(&names(&["fractal"]), TradeResult::Win);
        }
        c.recalibrate();
        assert_eq!(c.weight("fractal"), 1.0);
        assert!(c.calibration().is_empty());
    }

    #[test]
    fn winners_gain_weight_losers_lose_it() {
        let mut c = StrategyCalibrator::new(10);
        for i in 0..10 {
            let result = if i < 8 { TradeResult::Win } else { TradeResult::Loss };
            c.record_trade(&names(&["fractal", "technical"]), result);
            let result = if i < 2 { TradeResult::Win } else { TradeResult::Loss };
            c.record_trade(&names(&["elliott"]), result);
        }
        c.recalibrate();
        // 80% → 1 + 0.3·4 = 2.2
        assert!((c.weight("fractal") - 2.2).abs() < 1e-9);
        // 20% → 0.2 + 0.2 = 0.4
        assert!((c.weight("elliott") - 0.4).abs() < 1e-9);
        assert_eq!(c.calibration().len(), 3);
        assert_eq!(c.top_performers(1)[0].win_rate, 0.8);
    }

    #[test]
    fn weight_is_clamped() {
        let mut s = StrategyStats::new("x", 1.0);
        for _ in 0..20 {
            s.record_signal(TradeResult::Win);
        }
        s.recalculate(10);
        // 100% → 3.0, exactly at the cap
        assert!((s.calibrated_weight - 3.0).abs() < 1e-9);

        let mut s = StrategyStats::new("y", 1.0);
        for _ in 0..20 {
            s.record_signal(TradeResult::Loss);
        }
        s.recalculate(10);
        assert!((s.calibrated_weight - 0.2).abs() < 1e-9);
    }
}
