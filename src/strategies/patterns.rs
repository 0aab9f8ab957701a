//! Classic chart patterns

use crate::types::{Candle, StrategyScore};

use super::{Strategy, StrategyContext, WINDOW_3MO};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPattern {
    DoubleBottom,
    DoubleTop,
    HeadAndShoulders,
    InverseHeadAndShoulders,
    AscendingTriangle,
    DescendingTriangle,
    BullFlag,
    BearFlag,
}

impl ChartPattern {
    pub fn score(&self) -> i32 {
        match self {
            ChartPattern::DoubleBottom => 30,
            ChartPattern::DoubleTop => -30,
            ChartPattern::HeadAndShoulders => -35,
            ChartPattern::InverseHeadAndShoulders => 35,
            ChartPattern::AscendingTriangle => 25,
            ChartPattern::DescendingTriangle => -25,
            ChartPattern::BullFlag => 20,
            ChartPattern::BearFlag => -20,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChartPattern::DoubleBottom => "Doble suelo",
            ChartPattern::DoubleTop => "Doble techo",
            ChartPattern::HeadAndShoulders => "Head & Shoulders",
            ChartPattern::InverseHeadAndShoulders => "Inverse Head & Shoulders",
            ChartPattern::AscendingTriangle => "Triángulo ascendente",
            ChartPattern::DescendingTriangle => "Triángulo descendente",
            ChartPattern::BullFlag => "Bandera alcista",
            ChartPattern::BearFlag => "Bandera bajista",
        }
    }
}

fn tail(candles: &[Candle], n: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(n)..]
}

fn last_close(candles: &[Candle]) -> f64 {
    candles.last().map(|c| c.close).unwrap_or(0.0)
}

/// Two similar lows (±2%) at least 5 bars apart, a 3% peak between, close above the peak
pub fn double_bottom(candles: &[Candle]) -> bool {
    if candles.len() < 20 {
        return false;
    }
    let lows: Vec<f64> = tail(candles, 20).iter().map(|c| c.low).collect();
    let close = last_close(candles);
    for i in 0..lows.len() - 10 {
        for j in (i + 5)..lows.len() - 2 {
            if (lows[i] - lows[j]).abs() / lows[i] < 0.02 {
                let middle_max = lows[i + 1..j].iter().copied().fold(f64::MIN, f64::max);
                if middle_max > lows[i] * 1.03 && close > middle_max {
                    return true;
                }
            }
        }
    }
    false
}

pub fn double_top(candles: &[Candle]) -> bool {
    if candles.len() < 20 {
        return false;
    }
    let highs: Vec<f64> = tail(candles, 20).iter().map(|c| c.high).collect();
    let close = last_close(candles);
    for i in 0..highs.len() - 10 {
        for j in (i + 5)..highs.len() - 2 {
            if (highs[i] - highs[j]).abs() / highs[i] < 0.02 {
                let middle_min = highs[i + 1..j].iter().copied().fold(f64::MAX, f64::min);
                if middle_min < highs[i] * 0.97 && close < middle_min {
                    return true;
                }
            }
        }
    }
    false
}

/// Head 3% above both shoulders, shoulders within 5%, close below the neckline
pub fn head_and_shoulders(candles: &[Candle]) -> bool {
    if candles.len() < 15 {
        return false;
    }
    let window = tail(candles, 15);
    let close = last_close(candles);
    for i in 2..window.len() - 2 {
        let left = window[i - 2].high;
        let head = window[i].high;
        let right = window[i + 2].high;
        if head > left * 1.03 && head > right * 1.03 && (left - right).abs() / left < 0.05 {
            let neckline = window[i - 2..=i + 2].iter().map(|c| c.low).fold(f64::MAX, f64::min);
            if close < neckline {
                return true;
            }
        }
    }
    false
}

pub fn inverse_head_and_shoulders(candles: &[Candle]) -> bool {
    if candles.len() < 15 {
        return false;
    }
    let window = tail(candles, 15);
    let close = last_close(candles);
    for i in 2..window.len() - 2 {
        let left = window[i - 2].low;
        let head = window[i].low;
        let right = window[i + 2].low;
        if head < left * 0.97 && head < right * 0.97 && (left - right).abs() / left < 0.05 {
            let neckline = window[i - 2..=i + 2].iter().map(|c| c.high).fold(f64::MIN, f64::max);
            if close > neckline {
                return true;
            }
        }
    }
    false
}

/// Flat resistance touched twice, rising lows, close within 2% of resistance
pub fn ascending_triangle(candles: &[Candle]) -> bool {
    if candles.len() < 15 {
        return false;
    }
    let window = tail(candles, 15);
    let resistance = tail(window, 5).iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let touches = window
        .iter()
        .filter(|c| (c.high - resistance).abs() / resistance < 0.01)
        .count();
    let low_slope = (window[window.len() - 1].low - window[0].low) / window.len() as f64;
    touches >= 2 && low_slope > 0.0 && last_close(candles) > resistance * 0.98
}

pub fn descending_triangle(candles: &[Candle]) -> bool {
    if candles.len() < 15 {
        return false;
    }
    let window = tail(candles, 15);
    let support = tail(window, 5).iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let touches = window
        .iter()
        .filter(|c| (c.low - support).abs() / support < 0.01)
        .count();
    let high_slope = (window[window.len() - 1].high - window[0].high) / window.len() as f64;
    touches >= 2 && high_slope < 0.0 && last_close(candles) < support * 1.02
}

fn consolidation_range(closes: &[f64]) -> f64 {
    let max = closes.iter().copied().fold(f64::MIN, f64::max);
    let min = closes.iter().copied().fold(f64::MAX, f64::min);
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;
    (max - min) / mean
}

/// >5% impulse over the first 4 of 10 bars, then a <3% consolidation over the last 6
pub fn bull_flag(candles: &[Candle]) -> bool {
    if candles.len() < 10 {
        return false;
    }
    let closes: Vec<f64> = tail(candles, 10).iter().map(|c| c.close).collect();
    let impulse = (closes[3] - closes[0]) / closes[0];
    impulse > 0.05 && consolidation_range(&closes[4..]) < 0.03
}

pub fn bear_flag(candles: &[Candle]) -> bool {
    if candles.len() < 10 {
        return false;
    }
    let closes: Vec<f64> = tail(candles, 10).iter().map(|c| c.close).collect();
    let impulse = (closes[0] - closes[3]) / closes[0];
    impulse > 0.05 && consolidation_range(&closes[4..]) < 0.03
}

/// All detected patterns on the series
pub fn detect_all(candles: &[Candle]) -> Vec<ChartPattern> {
    let checks: [(ChartPattern, fn(&[Candle]) -> bool); 8] = [
        (ChartPattern::DoubleBottom, double_bottom),
        (ChartPattern::DoubleTop, double_top),
        (ChartPattern::HeadAndShoulders, head_and_shoulders),
        (ChartPattern::InverseHeadAndShoulders, inverse_head_and_shoulders),
        (ChartPattern::AscendingTriangle, ascending_triangle),
        (ChartPattern::DescendingTriangle, descending_triangle),
        (ChartPattern::BullFlag, bull_flag),
        (ChartPattern::BearFlag, bear_flag),
    ];
    checks
        .iter()
        .filter(|(_, check)| check(candles))
        .map(|(p, _)| *p)
        .collect()
}

pub struct PatternRecognizer;

impl PatternRecognizer {
    pub const MIN_BARS: usize = 30;
}

impl Strategy for PatternRecognizer {
    fn name(&self) -> &'static str {
        "patterns"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_3MO);
        if window.len() < Self::MIN_BARS {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        }
        let mut result = StrategyScore::new(self.name());
        for pattern in detect_all(window) {
            result.add(
                pattern.score(),
                format!("{} ({:+})", pattern.description(), pattern.score()),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;

    #[test]
    fn test_bull_flag() {
        let closes = [100.0, 102.0, 104.0, 107.0, 107.5, 107.2, 107.8, 107.4, 107.6, 107.9];
        let candles = series(closes.len(), |i| closes[i]);
        assert!(bull_flag(&candles));
        assert!(!bear_flag(&candles));
    }

    #[test]
    fn test_double_bottom() {
        // 20 bars: low at 2, rally to 8, second low at 12, breakout above the middle peak
        let closes = [
            104.0, 102.0, 100.0, 101.0, 103.0, 105.0, 106.0, 107.0, 106.0, 104.0, 102.0, 101.0,
            100.5, 102.0, 104.0, 106.0, 107.0, 108.0, 109.0, 110.0,
        ];
        let candles = series(closes.len(), |i| closes[i]);
        assert!(double_bottom(&candles));
        assert!(!double_top(&candles));
    }

    #[test]
    fn test_flat_series_has_no_patterns() {
        let candles = series(40, |_| 100.0);
        let s = PatternRecognizer.evaluate(&StrategyContext::new("GGAL", &candles));
        // flat highs touch resistance but the low slope is 0
        assert_eq!(s.score, 0);
    }

    #[test]
    fn test_head_and_shoulders_breakdown() {
        let closes = [
            100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0,
            100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0,
            100.0, 100.0, 104.0, 100.0, 109.0, 100.0, 104.0, 95.0, 94.0, 93.0,
        ];
        let candles = series(closes.len(), |i| closes[i]);
        assert!(head_and_shoulders(&candles));
        assert!(detect_all(&candles).contains(&ChartPattern::HeadAndShoulders));
    }
}
