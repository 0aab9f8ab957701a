//! Market regime detection (ADX + annualized volatility + bar range)

use serde::Serialize;

use crate::features::{adx, annualized_volatility, avg_range};
use crate::types::{Candle, MarketRegime};

use super::WINDOW_3MO;

/// Regime plus the adjustments it implies
#[derive(Debug, Clone, Serialize)]
pub struct RegimeInfo {
    pub regime: MarketRegime,
    pub adx: Option<f64>,
    pub volatility: Option<f64>,
    pub avg_range: Option<f64>,
    /// Added to the buy threshold
    pub threshold_adjustment: i32,
    /// Position size multiplier
    pub size_multiplier: f64,
}

impl Default for RegimeInfo {
    fn default() -> Self {
        Self::for_regime(MarketRegime::Unknown)
    }
}

impl RegimeInfo {
    fn for_regime(regime: MarketRegime) -> Self {
        let (threshold_adjustment, size_multiplier) = adjustments(regime);
        Self {
            regime,
            adx: None,
            volatility: None,
            avg_range: None,
            threshold_adjustment,
            size_multiplier,
        }
    }
}

/// (buy threshold adjustment, position multiplier)
pub fn adjustments(regime: MarketRegime) -> (i32, f64) {
    match regime {
        MarketRegime::Trending => (-5, 1.2),
        MarketRegime::Ranging => (10, 0.8),
        MarketRegime::Volatile => (15, 0.5),
        MarketRegime::Unknown => (0, 1.0),
    }
}

/// Volatility always wins, then ADX, then volatility again in the 20..25 grey zone
pub fn classify(adx: f64, volatility: f64, avg_range: f64) -> MarketRegime {
    if volatility > 0.30 || avg_range > 0.05 {
        return MarketRegime::Volatile;
    }
    if adx > 25.0 {
        return MarketRegime::Trending;
    }
    if adx < 20.0 {
        return MarketRegime::Ranging;
    }
    if volatility > 0.20 {
        MarketRegime::Volatile
    } else {
        MarketRegime::Trending
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeDetector;

impl RegimeDetector {
    pub const MIN_BARS: usize = 30;

    pub fn new() -> Self {
        Self
    }

    /// Classify the last ~3 months of daily bars
    pub fn detect(&self, daily: &[Candle]) -> RegimeInfo {
        let window = &daily[daily.len().saturating_sub(WINDOW_3MO)..];
        if window.len() < Self::MIN_BARS {
            return RegimeInfo::default();
        }

        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
        let (Some(vol), Some(range)) = (annualized_volatility(&closes), avg_range(window, 20))
        else {
            return RegimeInfo::default();
        };
        // ADX needs 29 bars, a 30-bar window always has it unless ranges are flat
        let adx_value = adx(window, 14).map(|(a, _, _)| a).unwrap_or(0.0);

        let regime = classify(adx_value, vol, range);
        let mut info = RegimeInfo::for_regime(regime);
        info.adx = Some(adx_value);
        info.volatility = Some(vol);
        info.avg_range = Some(range);

        tracing::debug!(
            regime = %regime,
            adx = adx_value,
            volatility = vol,
            avg_range = range,
            "Regime detected"
        );
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify(30.0, 0.35, 0.01), MarketRegime::Volatile);
        assert_eq!(classify(30.0, 0.10, 0.06), MarketRegime::Volatile);
        assert_eq!(classify(30.0, 0.10, 0.01), MarketRegime::Trending);
        assert_eq!(classify(15.0, 0.10, 0.01), MarketRegime::Ranging);
        assert_eq!(classify(22.0, 0.25, 0.01), MarketRegime::Volatile);
        assert_eq!(classify(22.0, 0.15, 0.01), MarketRegime::Trending);
    }

    #[test]
    fn test_adjustments() {
        assert_eq!(adjustments(MarketRegime::Trending), (-5, 1.2));
        assert_eq!(adjustments(MarketRegime::Ranging), (10, 0.8));
        assert_eq!(adjustments(MarketRegime::Volatile), (15, 0.5));
    }

    #[test]
    fn test_short_history_is_unknown() {
        let candles = series(20, |i| 100.0 + i as f64);
        let info = RegimeDetector::new().detect(&candles);
        assert_eq!(info.regime, MarketRegime::Unknown);
        assert_eq!(info.size_multiplier, 1.0);
    }

    #[test]
    fn test_smooth_uptrend_is_trending() {
        // +0.3% per day, 2% bar range: low vol, strong ADX
        let candles = series(80, |i| 100.0 * 1.003f64.powi(i as i32));
        let info = RegimeDetector::new().detect(&candles);
        assert_eq!(info.regime, MarketRegime::Trending);
        assert_eq!(info.threshold_adjustment, -5);
    }
}
