//! Adaptive buy/sell thresholds
//!
//! Looks at the most recent closed trades and nudges the thresholds: a poor
//! win rate makes entries stricter, a strong one relaxes them. Bounds keep
//! the buy threshold in 15..=35 and the sell threshold in -35..=-15.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

use crate::scoring::Thresholds;
use crate::types::{ClosedTrade, Confidence};

const STEP: i32 = 5;
const BUY_MAX: i32 = 35;
const BUY_MIN: i32 = 15;
const LOW_WIN_RATE: f64 = 0.40;
const HIGH_WIN_RATE: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            high: 1.5,
            medium: 1.0,
            low: 0.5,
        }
    }
}

impl ConfidenceWeights {
    pub fn get(&self, confidence: Confidence) -> f64 {
        match confidence {
            Confidence::High => self.high,
            Confidence::Medium => self.medium,
            Confidence::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub buy_threshold: i32,
    pub sell_threshold: i32,
    pub confidence_weights: ConfidenceWeights,
}

impl StrategyParams {
    pub fn from_thresholds(t: Thresholds) -> Self {
        Self {
            buy_threshold: t.buy,
            sell_threshold: t.sell,
            confidence_weights: ConfidenceWeights::default(),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            buy: self.buy_threshold,
            sell: self.sell_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adaptation {
    pub timestamp: DateTime<Utc>,
    pub win_rate: f64,
    pub avg_return: f64,
    pub changes: Vec<String>,
    pub params: StrategyParams,
}

/// Outcome of one closed trade, as remembered for adaptation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub win: bool,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    params: StrategyParams,
    recent: VecDeque<TradeOutcome>,
    log: Vec<Adaptation>,
    window: usize,
    min_trades: usize,
}

impl AdaptiveThresholds {
    pub fn new(base: Thresholds, window: usize, min_trades: usize) -> Self {
        Self {
            params: StrategyParams::from_thresholds(base),
            recent: VecDeque::with_capacity(window),
            log: Vec::new(),
            window: window.max(1),
            min_trades,
        }
    }

    pub fn params(&self) -> StrategyParams {
        self.params
    }

    pub fn thresholds(&self) -> Thresholds {
        self.params.thresholds()
    }

    pub fn log(&self) -> &[Adaptation] {
        &self.log
    }

    pub fn sample_size(&self) -> usize {
        self.recent.len()
    }

    pub fn record(&mut self, trade: &ClosedTrade) {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(TradeOutcome {
            win: trade.is_win(),
            pnl_pct: trade.pnl_pct,
        });
    }

    /// (win rate, average return) over the window
    pub fn recent_performance(&self) -> Option<(f64, f64)> {
        if self.recent.is_empty() {
            return None;
        }
        let n = self.recent.len() as f64;
        let wins = self.recent.iter().filter(|o| o.win).count() as f64;
        let avg = self.recent.iter().map(|o| o.pnl_pct).sum::<f64>() / n;
        Some((wins / n, avg))
    }

    /// Adjust parameters from recent performance. Returns the changes made.
    pub fn adapt(&mut self) -> Vec<String> {
        if self.recent.len() < self.min_trades {
            return Vec::new();
        }
        let Some((win_rate, avg_return)) = self.recent_performance() else {
            return Vec::new();
        };
        let mut changes = Vec::new();
        let before = self.params;

        if win_rate < LOW_WIN_RATE {
            self.params.buy_threshold = (self.params.buy_threshold + STEP).min(BUY_MAX);
            self.params.sell_threshold = (self.params.sell_threshold - STEP).max(-BUY_MAX);
            if self.params.buy_threshold != before.buy_threshold {
                changes.push(format!(
                    "Aumentado umbral de compra a {} (win rate bajo {:.0}%)",
                    self.params.buy_threshold,
                    win_rate * 100.0
                ));
            }
        } else if win_rate > HIGH_WIN_RATE {
            self.params.buy_threshold = (self.params.buy_threshold - STEP).max(BUY_MIN);
            self.params.sell_threshold = (self.params.sell_threshold + STEP).min(-BUY_MIN);
            if self.params.buy_threshold != before.buy_threshold {
                changes.push(format!(
                    "Reducido umbral de compra a {} (win rate alto {:.0}%)",
                    self.params.buy_threshold,
                    win_rate * 100.0
                ));
            }
        }

        if avg_return < 0.0 {
            let weights = ConfidenceWeights {
                high: 2.0,
                medium: 0.8,
                low: before.confidence_weights.low,
            };
            if weights != before.confidence_weights {
                self.params.confidence_weights = weights;
                changes.push("Aumentado peso de confianza alta (retornos negativos)".to_string());
            }
        }

        if !changes.is_empty() {
            info!(
                win_rate = %format!("{:.1}%", win_rate * 100.0),
                avg_return = %format!("{:+.2}%", avg_return * 100.0),
                buy = self.params.buy_threshold,
                sell = self.params.sell_threshold,
                changes = %changes.join(", "),
                "🧠 Estrategia adaptada"
            );
            self.log.push(Adaptation {
                timestamp: Utc::now(),
                win_rate,
                avg_return,
                changes: changes.clone(),
                params: self.params,
            });
        }
        changes
    }
}
