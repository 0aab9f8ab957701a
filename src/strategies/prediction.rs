//! Price prediction from a least-squares trend over recent closes

use serde::Serialize;

use crate::types::{Action, Candle};

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub action: Action,
    pub predicted_price: f64,
    /// Projected change in percent
    pub change_pct: f64,
    /// Model that produced it ("trend_model", "ai_model")
    pub source: String,
}

pub struct TrendPredictor {
    lookback: usize,
    horizon: usize,
}

impl Default for TrendPredictor {
    fn default() -> Self {
        Self::new(30, 5)
    }
}

impl TrendPredictor {
    pub const SOURCE: &'static str = "trend_model";

    pub fn new(lookback: usize, horizon: usize) -> Self {
        Self {
            lookback: lookback.max(2),
            horizon,
        }
    }

    /// `(slope, intercept)` of closes against their index
    fn fit(closes: &[f64]) -> (f64, f64) {
        let n = closes.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = closes.iter().sum::<f64>() / n;
        let (mut num, mut den) = (0.0, 0.0);
        for (i, y) in closes.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (y - mean_y);
            den += dx * dx;
        }
        let slope = if den > 0.0 { num / den } else { 0.0 };
        (slope, mean_y - slope * mean_x)
    }

    /// None with fewer than `lookback` candles
    pub fn predict(&self, candles: &[Candle]) -> Option<Prediction> {
        if candles.len() < self.lookback {
            return None;
        }
        let closes: Vec<f64> = candles[candles.len() - self.lookback..]
            .iter()
            .map(|c| c.close)
            .collect();
        let current = *closes.last()?;
        if current <= 0.0 {
            return None;
        }
        let (slope, intercept) = Self::fit(&closes);
        let x = (closes.len() - 1 + self.horizon) as f64;
        let predicted_price = intercept + slope * x;
        let change_pct = (predicted_price - current) / current * 100.0;
        let action = if change_pct > 0.5 {
            Action::Buy
        } else if change_pct < -0.5 {
            Action::Sell
        } else {
            Action::Hold
        };
        Some(Prediction {
            action,
            predicted_price,
            change_pct,
            source: Self::SOURCE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;

    #[test]
    fn test_linear_uptrend_projects_forward() {
        let candles = series(40, |i| 100.0 + i as f64);
        let p = TrendPredictor::default().predict(&candles).unwrap();
        assert!((p.predicted_price - 144.0).abs() < 1e-6);
        assert_eq!(p.action, Action::Buy);
        assert_eq!(p.source, "trend_model");
    }

    #[test]
    fn test_flat_is_hold_and_short_is_none() {
        let flat = series(30, |_| 50.0);
        assert_eq!(TrendPredictor::default().predict(&flat).unwrap().action, Action::Hold);
        assert!(TrendPredictor::default().predict(&flat[..10]).is_none());
    }

    #[test]
    fn test_downtrend_is_sell() {
        let candles = series(30, |i| 200.0 - 2.0 * i as f64);
        let p = TrendPredictor::default().predict(&candles).unwrap();
        assert_eq!(p.action, Action::Sell);
        assert!(p.change_pct < -0.5);
    }
}
