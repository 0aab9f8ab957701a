//! Learning from closed trades
//!
//! Two loops share one state file (`{data_dir}/learning_state.json`):
//! adaptive thresholds and per-strategy weight calibration.

pub mod adaptive;
pub mod calibrator;

pub use adaptive::{Adaptation, AdaptiveThresholds, ConfidenceWeights, StrategyParams};
pub use calibrator::{StrategyCalibrator, StrategyStats, TradeResult};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::LearningConfig;
use crate::scoring::Thresholds;
use crate::types::{ClosedTrade, Confidence};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LearningState {
    adaptive: AdaptiveThresholds,
    calibrator: StrategyCalibrator,
    trades_learned: usize,
}

pub struct LearningSystem {
    config: LearningConfig,
    state: LearningState,
    path: Option<PathBuf>,
}

impl LearningSystem {
    pub fn in_memory(config: LearningConfig, base: Thresholds) -> Self {
        let state = LearningState {
            adaptive: AdaptiveThresholds::new(base, config.window, config.min_trades),
            calibrator: StrategyCalibrator::new(config.calibration_min_samples),
            trades_learned: 0,
        };
        Self {
            config,
            state,
            path: None,
        }
    }

    /// Restore from `{data_dir}/learning_state.json` when present
    pub fn open(config: LearningConfig, base: Thresholds, data_dir: impl AsRef<Path>) -> Result<Self> {
        let path = data_dir.as_ref().join("learning_state.json");
        let mut system = Self::in_memory(config, base);
        if path.exists() {
            let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<LearningState>(&raw) {
                Ok(mut state) => {
                    state.calibrator.set_min_samples(system.config.calibration_min_samples);
                    info!(
                        trades = state.trades_learned,
                        buy = state.adaptive.thresholds().buy,
                        sell = state.adaptive.thresholds().sell,
                        "🧠 Estado de aprendizaje cargado"
                    );
                    system.state = state;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "⚠️ Estado de aprendizaje corrupto, se ignora"),
            }
        }
        system.path = Some(path);
        Ok(system)
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Feed a closed trade into both loops. Returns threshold changes, if any.
    pub fn learn_from_trade(&mut self, trade: &ClosedTrade) -> Result<Vec<String>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        self.state.trades_learned += 1;
        self.state.adaptive.record(trade);
        self.state
            .calibrator
            .record_trade(&trade.supporting_strategies, TradeResult::from(trade));
        self.state.calibrator.recalibrate();
        // one adaptation per batch of `min_trades`, not per trade
        let changes = if self.state.trades_learned % self.config.min_trades.max(1) == 0 {
            self.state.adaptive.adapt()
        } else {
            Vec::new()
        };
        debug!(
            symbol = %trade.symbol,
            pnl = trade.pnl,
            strategies = trade.supporting_strategies.len(),
            "🧠 Trade aprendido"
        );
        self.save()?;
        Ok(changes)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.state.adaptive.thresholds()
    }

    /// Calibrated strategy weights for the meta-learner
    pub fn calibration(&self) -> HashMap<String, f64> {
        if self.config.enabled {
            self.state.calibrator.calibration()
        } else {
            HashMap::new()
        }
    }

    /// Position size factor for a confidence level, capped at 1
    pub fn size_factor(&self, confidence: Confidence) -> f64 {
        self.state
            .adaptive
            .params()
            .confidence_weights
            .get(confidence)
            .clamp(0.0, 1.0)
    }

    pub fn adaptations(&self) -> &[Adaptation] {
        self.state.adaptive.log()
    }

    pub fn calibrator(&self) -> &StrategyCalibrator {
        &self.state.calibrator
    }

    pub fn summary(&self) -> String {
        let t = self.thresholds();
        let perf = self
            .state
            .adaptive
            .recent_performance()
            .map(|(wr, avg)| format!("WR {:.0}% / avg {:+.2}%", wr * 100.0, avg * 100.0))
            .unwrap_or_else(|| "sin datos".to_string());
        format!(
            "🧠 Aprendizaje: {} trades | umbrales {}/{} | {} | {} adaptaciones | {} estrategias calibradas",
            self.state.trades_learned,
            t.buy,
            t.sell,
            perf,
            self.state.adaptive.log().len(),
            self.state.calibrator.calibration().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExitReason;

    fn trade(pnl: f64, strategies: &[&str]) -> ClosedTrade {
        ClosedTrade {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: "YPF".to_string(),
            quantity: 1,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            pnl,
            pnl_pct: pnl / 100.0,
            fees: 0.0,
            reason: ExitReason::StopLoss,
            opened_at: 0,
            closed_at: 0,
            supporting_strategies: strategies.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn losing_streak_raises_thresholds_and_persists() {
        let dir = std::env::temp_dir().join(format!("iolbot-learning-{}", uuid::Uuid::new_v4()));
        {
            let mut ls = LearningSystem::open(LearningConfig::default(), Thresholds::default(), &dir).unwrap();
            for _ in 0..10 {
                ls.learn_from_trade(&trade(-2.0, &["technical", "fractal"])).unwrap();
            }
            assert_eq!(ls.thresholds().buy, 30);
            assert!(ls.calibration().get("fractal").unwrap() < &1.0);
            // MEDIUM sizing shrinks after negative returns
            assert_eq!(ls.size_factor(Confidence::Medium), 0.8);
            assert_eq!(ls.size_factor(Confidence::High), 1.0);
        }
        let ls = LearningSystem::open(LearningConfig::default(), Thresholds::default(), &dir).unwrap();
        assert_eq!(ls.thresholds().buy, 30);
        assert_eq!(ls.adaptations().len(), 1);
        assert!(ls.summary().contains("10 trades"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn disabled_learning_is_inert() {
        let mut ls = LearningSystem::in_memory(
            LearningConfig {
                enabled: false,
                ..Default::default()
            },
            Thresholds::default(),
        );
        for _ in 0..15 {
            ls.learn_from_trade(&trade(-2.0, &["technical"])).unwrap();
        }
        assert_eq!(ls.thresholds(), Thresholds::default());
        assert!(ls.calibration().is_empty());
    }
}
