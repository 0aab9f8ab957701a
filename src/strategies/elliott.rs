//! Simplified Elliott wave classification from swing pivots

use crate::types::{Candle, StrategyScore};

use super::{Strategy, StrategyContext, WINDOW_3MO};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub kind: PivotKind,
    pub price: f64,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    Wave1,
    Wave3,
    WaveC,
    Unknown,
}

impl Wave {
    pub fn score(&self) -> i32 {
        match self {
            Wave::Wave1 => 10,
            Wave::Wave3 => 25,
            Wave::WaveC => 15,
            Wave::Unknown => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Wave::Wave1 => "WAVE_1",
            Wave::Wave3 => "WAVE_3",
            Wave::WaveC => "WAVE_C",
            Wave::Unknown => "UNKNOWN",
        }
    }
}

/// Bars that are the max high / min low of a ±`window` neighbourhood
pub fn find_pivots(candles: &[Candle], window: usize) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    if candles.len() < window * 2 + 1 {
        return pivots;
    }
    for i in window..candles.len() - window {
        let around = &candles[i - window..=i + window];
        let high = candles[i].high;
        if around.iter().all(|c| c.high <= high) {
            pivots.push(Pivot {
                kind: PivotKind::High,
                price: high,
                index: i,
            });
        }
        let low = candles[i].low;
        if around.iter().all(|c| c.low >= low) {
            pivots.push(Pivot {
                kind: PivotKind::Low,
                price: low,
                index: i,
            });
        }
    }
    pivots
}

/// More highs than lows with price above the last pivot is an impulse (wave 3),
/// more lows is the end of a correction (wave C), anything else an early impulse
pub fn classify(recent: &[Pivot], price: f64) -> Wave {
    let Some(last) = recent.last() else {
        return Wave::Unknown;
    };
    if recent.len() < 3 {
        return Wave::Unknown;
    }
    let highs = recent.iter().filter(|p| p.kind == PivotKind::High).count();
    let lows = recent.len() - highs;
    if highs > lows && price > last.price {
        Wave::Wave3
    } else if lows > highs {
        Wave::WaveC
    } else {
        Wave::Wave1
    }
}

pub struct ElliottWave {
    pivot_window: usize,
}

impl ElliottWave {
    pub const MIN_BARS: usize = 50;

    pub fn new(pivot_window: usize) -> Self {
        Self {
            pivot_window: pivot_window.max(1),
        }
    }
}

impl Strategy for ElliottWave {
    fn name(&self) -> &'static str {
        "elliott_wave"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_3MO);
        if window.len() < Self::MIN_BARS {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        }
        let mut result = StrategyScore::new(self.name());
        let pivots = find_pivots(window, self.pivot_window);
        if pivots.len() < 5 {
            result.factors.push(format!("Pivots insuficientes ({})", pivots.len()));
            return result;
        }
        let price = window[window.len() - 1].close;
        let wave = classify(&pivots[pivots.len() - 5..], price);
        if wave.score() != 0 {
            result.add(wave.score(), format!("{} ({:+})", wave.label(), wave.score()));
        }
        result
    }
}
