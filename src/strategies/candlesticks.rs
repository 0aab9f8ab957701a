//! Japanese candlestick patterns over the last few bars

use crate::types::{Candle, StrategyScore};

use super::{Strategy, StrategyContext, WINDOW_1MO};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandlePattern {
    Hammer,
    InvertedHammer,
    BullishEngulfing,
    PiercingPattern,
    MorningStar,
    ThreeWhiteSoldiers,
    BullishHarami,
    DojiBullish,
    HangingMan,
    ShootingStar,
    BearishEngulfing,
    DarkCloud,
    EveningStar,
    ThreeBlackCrows,
    BearishHarami,
    DojiBearish,
}

impl CandlePattern {
    pub fn score(&self) -> i32 {
        use CandlePattern::*;
        match self {
            Hammer => 15,
            InvertedHammer => 12,
            BullishEngulfing => 20,
            PiercingPattern => 18,
            MorningStar => 25,
            ThreeWhiteSoldiers => 22,
            BullishHarami => 10,
            DojiBullish => 8,
            HangingMan => -15,
            ShootingStar => -18,
            BearishEngulfing => -20,
            DarkCloud => -18,
            EveningStar => -25,
            ThreeBlackCrows => -22,
            BearishHarami => -10,
            DojiBearish => -8,
        }
    }

    pub fn label(&self) -> &'static str {
        use CandlePattern::*;
        match self {
            Hammer => "HAMMER",
            InvertedHammer => "INVERTED_HAMMER",
            BullishEngulfing => "BULLISH_ENGULFING",
            PiercingPattern => "PIERCING_PATTERN",
            MorningStar => "MORNING_STAR",
            ThreeWhiteSoldiers => "THREE_WHITE_SOLDIERS",
            BullishHarami => "BULLISH_HARAMI",
            DojiBullish => "DOJI_BULLISH",
            HangingMan => "HANGING_MAN",
            ShootingStar => "SHOOTING_STAR",
            BearishEngulfing => "BEARISH_ENGULFING",
            DarkCloud => "DARK_CLOUD",
            EveningStar => "EVENING_STAR",
            ThreeBlackCrows => "THREE_BLACK_CROWS",
            BearishHarami => "BEARISH_HARAMI",
            DojiBearish => "DOJI_BEARISH",
        }
    }
}

fn single(c: &Candle, prev: Option<&Candle>) -> Option<CandlePattern> {
    let range = c.range();
    if range <= 0.0 {
        return None;
    }
    let body = c.body() / range;
    let upper = c.upper_shadow() / range;
    let lower = c.lower_shadow() / range;

    if body < 0.1 {
        if let Some(p) = prev {
            if c.close < p.close * 0.98 {
                return Some(CandlePattern::DojiBullish);
            } else if c.close > p.close * 1.02 {
                return Some(CandlePattern::DojiBearish);
            }
        }
    }

    let hammer_shape = body < 0.3 && lower > 0.6 && upper < 0.1;
    let inverted_shape = body < 0.3 && upper > 0.6 && lower < 0.1;

    if hammer_shape && c.is_bullish() {
        return Some(CandlePattern::Hammer);
    }
    if inverted_shape && c.is_bullish() {
        return Some(CandlePattern::InvertedHammer);
    }
    if hammer_shape && c.is_bearish() {
        if let Some(p) = prev {
            if c.high > p.high * 0.99 {
                return Some(CandlePattern::HangingMan);
            }
        }
    }
    if inverted_shape && c.is_bearish() {
        return Some(CandlePattern::ShootingStar);
    }
    None
}

fn two(curr: &Candle, prev: &Candle) -> Option<CandlePattern> {
    let prev_mid = (prev.open + prev.close) / 2.0;

    if prev.is_bearish() && curr.is_bullish() && curr.open < prev.close && curr.close > prev.open {
        return Some(CandlePattern::BullishEngulfing);
    }
    if prev.is_bullish() && curr.is_bearish() && curr.open > prev.close && curr.close < prev.open {
        return Some(CandlePattern::BearishEngulfing);
    }
    if prev.is_bearish() && curr.is_bullish() && curr.open < prev.low && curr.close > prev_mid {
        return Some(CandlePattern::PiercingPattern);
    }
    if prev.is_bullish() && curr.is_bearish() && curr.open > prev.high && curr.close < prev_mid {
        return Some(CandlePattern::DarkCloud);
    }
    if prev.is_bearish()
        && curr.open > prev.close
        && curr.close < prev.open
        && curr.body() < prev.body() * 0.5
    {
        return Some(CandlePattern::BullishHarami);
    }
    if prev.is_bullish()
        && curr.open < prev.close
        && curr.close > prev.open
        && curr.body() < prev.body() * 0.5
    {
        return Some(CandlePattern::BearishHarami);
    }
    None
}

fn three(curr: &Candle, prev1: &Candle, prev2: &Candle) -> Option<CandlePattern> {
    let star = prev1.range() > 0.0 && prev1.body() / prev1.range() < 0.3;
    let first_mid = (prev2.open + prev2.close) / 2.0;

    if prev2.is_bearish() && star && curr.is_bullish() && curr.close > first_mid {
        return Some(CandlePattern::MorningStar);
    }
    if prev2.is_bullish() && star && curr.is_bearish() && curr.close < first_mid {
        return Some(CandlePattern::EveningStar);
    }
    let bars = [prev2, prev1, curr];
    if bars.iter().all(|c| c.is_bullish()) && prev1.close > prev2.close && curr.close > prev1.close {
        return Some(CandlePattern::ThreeWhiteSoldiers);
    }
    if bars.iter().all(|c| c.is_bearish()) && prev1.close < prev2.close && curr.close < prev1.close {
        return Some(CandlePattern::ThreeBlackCrows);
    }
    None
}

/// Unique patterns found in the last `lookback` bars, most recent first
pub fn detect(candles: &[Candle], lookback: usize) -> Vec<CandlePattern> {
    let recent = &candles[candles.len().saturating_sub(lookback)..];
    let mut found: Vec<CandlePattern> = Vec::new();
    let mut push = |p: Option<CandlePattern>| {
        if let Some(p) = p {
            if !found.contains(&p) {
                found.push(p);
            }
        }
    };
    for i in (0..recent.len()).rev() {
        let prev = if i >= 1 { Some(&recent[i - 1]) } else { None };
        push(single(&recent[i], prev));
        if let Some(prev) = prev {
            push(two(&recent[i], prev));
        }
        if i >= 2 {
            push(three(&recent[i], &recent[i - 1], &recent[i - 2]));
        }
    }
    found
}

pub struct Candlesticks {
    lookback: usize,
}

impl Candlesticks {
    pub const MIN_BARS: usize = 3;

    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(Self::MIN_BARS),
        }
    }
}

impl Strategy for Candlesticks {
    fn name(&self) -> &'static str {
        "candlesticks"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_1MO);
        if window.len() < Self::MIN_BARS {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        }
        let mut result = StrategyScore::new(self.name());
        for pattern in detect(window, self.lookback) {
            result.add(pattern.score(), format!("{} ({:+})", pattern.label(), pattern.score()));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timeframe: Timeframe::Day1,
            open,
            high,
            low,
            close,
            volume: 1000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_hammer() {
        let c = bar(100.0, 101.2, 90.0, 101.0);
        assert_eq!(single(&c, None), Some(CandlePattern::Hammer));
    }

    #[test]
    fn test_shooting_star() {
        let c = bar(101.0, 111.0, 99.9, 100.0);
        assert_eq!(single(&c, None), Some(CandlePattern::ShootingStar));
    }

    #[test]
    fn test_engulfing() {
        let prev = bar(102.0, 102.5, 99.5, 100.0);
        let curr = bar(99.0, 104.0, 98.5, 103.5);
        assert_eq!(two(&curr, &prev), Some(CandlePattern::BullishEngulfing));
        let prev = bar(100.0, 102.5, 99.5, 102.0);
        let curr = bar(103.0, 103.5, 98.0, 99.0);
        assert_eq!(two(&curr, &prev), Some(CandlePattern::BearishEngulfing));
    }

    #[test]
    fn test_three_white_soldiers_and_dedup() {
        let bars = vec![
            bar(100.0, 103.0, 99.0, 102.0),
            bar(102.0, 105.0, 101.0, 104.0),
            bar(104.0, 107.0, 103.0, 106.0),
            bar(106.0, 109.0, 105.0, 108.0),
            bar(108.0, 111.0, 107.0, 110.0),
        ];
        let found = detect(&bars, 5);
        // soldiers appear at three positions but are counted once
        assert_eq!(found, vec![CandlePattern::ThreeWhiteSoldiers]);
        let ctx = StrategyContext::new("GGAL", &bars);
        assert_eq!(Candlesticks::new(5).evaluate(&ctx).score, 22);
    }
}
