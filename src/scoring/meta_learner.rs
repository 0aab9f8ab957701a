//! Regime-weighted blend of the score components

use std::collections::{BTreeMap, HashMap};

use crate::types::MarketRegime;

/// Weight for components the regime table does not list
const UNLISTED_WEIGHT: f64 = 0.1;

/// Component key for the technical core (prediction, RSI, MACD, SMA, sentiment)
pub const TECHNICAL: &str = "technical";

#[derive(Debug, Clone)]
pub struct MetaResult {
    pub final_score: f64,
    /// Normalized weights actually applied
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct MetaLearner;

impl MetaLearner {
    pub fn new() -> Self {
        Self
    }

    fn regime_weight(regime: MarketRegime, key: &str) -> Option<f64> {
        let table: &[(&str, f64)] = match regime {
            MarketRegime::Trending => &[
                ("multi_timeframe", 0.30),
                (TECHNICAL, 0.25),
                ("ai_prediction", 0.20),
                ("regime", 0.15),
                ("sentiment", 0.10),
            ],
            MarketRegime::Ranging => &[
                (TECHNICAL, 0.30),
                ("patterns", 0.25),
                ("volume_profile", 0.20),
                ("fractals", 0.15),
                ("sentiment", 0.10),
            ],
            MarketRegime::Volatile => &[
                ("monte_carlo", 0.35),
                ("anomaly", 0.25),
                (TECHNICAL, 0.20),
                ("sentiment", 0.20),
            ],
            MarketRegime::Unknown => return None,
        };
        Some(
            table
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, w)| *w)
                .unwrap_or(UNLISTED_WEIGHT),
        )
    }

    /// Weighted sum with weights rescaled to average 1, so a uniform table
    /// returns the plain sum of the components.
    ///
    /// `calibration` multiplies each weight by the learned strategy weight (default 1).
    pub fn combine(
        &self,
        components: &BTreeMap<String, f64>,
        regime: MarketRegime,
        calibration: &HashMap<String, f64>,
    ) -> MetaResult {
        if components.is_empty() {
            return MetaResult {
                final_score: 0.0,
                weights: BTreeMap::new(),
            };
        }
        let n = components.len() as f64;
        let raw: BTreeMap<String, f64> = components
            .keys()
            .map(|k| {
                let base = Self::regime_weight(regime, k).unwrap_or(1.0 / n);
                let learned = calibration.get(k).copied().unwrap_or(1.0);
                (k.clone(), base * learned)
            })
            .collect();

        let mean = raw.values().sum::<f64>() / n;
        let weights: BTreeMap<String, f64> = if mean > 0.0 {
            raw.into_iter().map(|(k, w)| (k, w / mean)).collect()
        } else {
            raw.into_keys().map(|k| (k, 1.0)).collect()
        };

        let final_score = components
            .iter()
            .map(|(k, score)| score * weights.get(k).copied().unwrap_or(1.0))
            .sum();
        MetaResult {
            final_score,
            weights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(items: &[(&str, f64)]) -> BTreeMap<String, f64> {
        items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_unknown_regime_is_plain_sum() {
        let c = components(&[(TECHNICAL, 30.0), ("patterns", 20.0), ("anomaly", -10.0)]);
        let r = MetaLearner::new().combine(&c, MarketRegime::Unknown, &HashMap::new());
        assert!((r.final_score - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatile_regime_favours_monte_carlo() {
        let c = components(&[(TECHNICAL, 10.0), ("monte_carlo", 30.0)]);
        let r = MetaLearner::new().combine(&c, MarketRegime::Volatile, &HashMap::new());
        // weights .20/.35 rescaled to mean 1: 0.727 / 1.273
        assert!((r.final_score - (10.0 * 0.4 / 0.55 + 30.0 * 0.7 / 0.55)).abs() < 1e-9);
        assert!(r.final_score > 40.0);
        let mean: f64 = r.weights.values().sum::<f64>() / r.weights.len() as f64;
        assert!((mean - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_calibration_scales_weights() {
        let c = components(&[(TECHNICAL, 10.0), ("patterns", 10.0)]);
        let mut cal = HashMap::new();
        cal.insert("patterns".to_string(), 3.0);
        let r = MetaLearner::new().combine(&c, MarketRegime::Unknown, &cal);
        assert!(r.weights["patterns"] > r.weights[TECHNICAL]);
        assert!((r.final_score - 20.0).abs() < 1e-9);
    }
}
