//! Feature Engine - Technical indicators over a candle series
//!
//! Stateless: every call recomputes from the full series (oldest first).
//! - RSI (Wilder's smoothing)
//! - MACD (EMA12 - EMA26, EMA9 signal line)
//! - SMA20 / SMA50, EMA12 / EMA26
//! - Bollinger Bands
//! - ATR and ATR% of price
//! - ADX with +DI / -DI
//! - Volatility (daily std dev and annualized)
//! - Average high-low range
//! - Relative volume, OBV, VWAP

use serde::Serialize;

use crate::types::{Candle, Timeframe};

/// Trading days per year for annualization
pub const TRADING_DAYS: f64 = 252.0;

/// Computed features for the last candle of a series
#[derive(Debug, Clone, Default, Serialize)]
pub struct Features {
    pub timeframe: Option<Timeframe>,
    pub ts: i64,
    pub candles: usize,

    // Price features
    pub close: f64,
    pub returns: f64,

    pub rsi: Option<f64>,

    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,

    // Trend
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,

    // Bollinger Bands
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_position: Option<f64>, // 0 = lower band, 1 = upper band

    pub atr: Option<f64>,
    pub atr_pct: Option<f64>, // ATR as % of price (2.5 = 2.5%)

    pub adx: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,

    // Volatility
    pub volatility: Option<f64>,
    pub annualized_volatility: Option<f64>,
    pub avg_range: Option<f64>,

    // Volume
    pub relative_volume: Option<f64>,
    pub obv: Option<f64>,
    pub obv_slope: Option<f64>,
    pub vwap: Option<f64>,
}

impl Features {
    /// Price above its 20-period SMA
    pub fn above_sma20(&self) -> Option<bool> {
        self.sma_20.map(|s| self.close > s)
    }

    pub fn macd_bullish(&self) -> Option<bool> {
        Some(self.macd? > self.macd_signal?)
    }
}

/// Feature engine for computing technical indicators
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    rsi_period: usize,
    /// MACD periods (fast, slow, signal)
    macd_periods: (usize, usize, usize),
    /// Bollinger Band period and multiplier
    bb_config: (usize, f64),
    atr_period: usize,
    adx_period: usize,
    volatility_period: usize,
    volume_period: usize,
}

impl FeatureEngine {
    pub fn new() -> Self {
        Self {
            rsi_period: 14,
            macd_periods: (12, 26, 9),
            bb_config: (20, 2.0),
            atr_period: 14,
            adx_period: 14,
            volatility_period: 20,
            volume_period: 20,
        }
    }

    /// Compute features for the last candle. None when the series is empty.
    pub fn compute(&self, candles: &[Candle]) -> Option<Features> {
        let last = candles.last()?;

        tracing::debug!(
            timeframe = %last.timeframe,
            candle_count = candles.len(),
            last_close = last.close,
            "FeatureEngine::compute"
        );

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let mut features = Features {
            timeframe: Some(last.timeframe),
            ts: last.open_time,
            candles: candles.len(),
            close: last.close,
            ..Default::default()
        };

        if candles.len() >= 2 {
            let prev = candles[candles.len() - 2].close;
            if prev > 0.0 {
                features.returns = (last.close - prev) / prev;
            }
        }

        features.rsi = rsi(&closes, self.rsi_period);

        let (fast, slow, signal) = self.macd_periods;
        if let Some((m, s, h)) = macd(&closes, fast, slow, signal) {
            features.macd = Some(m);
            features.macd_signal = Some(s);
            features.macd_hist = Some(h);
        }

        features.sma_20 = sma(&closes, 20);
        features.sma_50 = sma(&closes, 50);
        features.ema_12 = ema(&closes, 12);
        features.ema_26 = ema(&closes, 26);

        let (bb_period, bb_mult) = self.bb_config;
        if let Some((upper, middle, lower)) = bollinger(&closes, bb_period, bb_mult) {
            features.bb_upper = Some(upper);
            features.bb_middle = Some(middle);
            features.bb_lower = Some(lower);
            let width = upper - lower;
            features.bb_position = Some(if width > 0.0 {
                ((last.close - lower) / width).clamp(0.0, 1.0)
            } else {
                0.5
            });
        }

        features.atr = atr(candles, self.atr_period);
        if let Some(a) = features.atr {
            if last.close > 0.0 {
                features.atr_pct = Some(a / last.close * 100.0);
            }
        }

        if let Some((adx, plus_di, minus_di)) = adx(candles, self.adx_period) {
            features.adx = Some(adx);
            features.plus_di = Some(plus_di);
            features.minus_di = Some(minus_di);
        }

        features.volatility = volatility(&closes, self.volatility_period);
        // last 20 returns only
        let recent = &closes[closes.len().saturating_sub(self.volatility_period + 1)..];
        features.annualized_volatility = annualized_volatility(recent);
        features.avg_range = avg_range(candles, self.volatility_period);

        features.relative_volume = relative_volume(candles, self.volume_period);
        if let Some((obv, slope)) = obv(candles) {
            features.obv = Some(obv);
            features.obv_slope = Some(slope);
        }
        features.vwap = vwap(candles, 50);

        Some(features)
    }
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Indicator functions
// ─────────────────────────────────────────────────────────────────

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
}

/// EMA series seeded with the first value (same as ewm(adjust=False))
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(first) = values.first() else {
        return out;
    };
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = *first;
    out.push(ema);
    for v in values.iter().skip(1) {
        ema = (v - ema) * multiplier + ema;
        out.push(ema);
    }
    out
}

/// Last EMA value, requires at least `period` values
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    ema_series(values, period).last().copied()
}

/// RSI with Wilder's smoothing, clamped to avoid exact 0/100
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    // Seed with the simple average of the first `period` changes
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += change.abs();
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let p = period as f64;
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss < 1e-12 && avg_gain < 1e-12 {
        return Some(50.0); // No movement = neutral
    }
    if avg_loss < 1e-12 {
        return Some(99.0);
    }
    if avg_gain < 1e-12 {
        return Some(1.0);
    }
    let rs = avg_gain / avg_loss;
    Some((100.0 - 100.0 / (1.0 + rs)).clamp(1.0, 99.0))
}

/// MACD line, signal line and histogram
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64, f64)> {
    if closes.len() < slow {
        return None;
    }
    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    let macd_series: Vec<f64> = fast_series
        .iter()
        .zip(slow_series.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_series = ema_series(&macd_series, signal);
    let m = *macd_series.last()?;
    let s = *signal_series.last()?;
    Some((m, s, m - s))
}

/// Bollinger Bands (upper, middle, lower)
pub fn bollinger(closes: &[f64], period: usize, multiplier: f64) -> Option<(f64, f64, f64)> {
    let middle = sma(closes, period)?;
    let recent = &closes[closes.len() - period..];
    let variance = recent.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / period as f64;
    let std = variance.sqrt();
    Some((middle + multiplier * std, middle, middle - multiplier * std))
}

fn true_range(curr: &Candle, prev: &Candle) -> f64 {
    (curr.high - curr.low)
        .max((curr.high - prev.close).abs())
        .max((curr.low - prev.close).abs())
}

/// ATR as the mean true range of the last `period` candles
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let sum: f64 = (candles.len() - period..candles.len())
        .map(|i| true_range(&candles[i], &candles[i - 1]))
        .sum();
    Some(sum / period as f64)
}

/// ADX (Average Directional Index). Returns (ADX, +DI, -DI)
pub fn adx(candles: &[Candle], period: usize) -> Option<(f64, f64, f64)> {
    let dx = dx_series(candles, period);
    if dx.len() < period {
        return None;
    }

    // Wilder: seed with the mean of the first `period` DX, then smooth
    let p = period as f64;
    let mut adx = dx.iter().take(period).map(|(d, _, _)| d).sum::<f64>() / p;
    for (d, _, _) in &dx[period..] {
        adx = (adx * (p - 1.0) + d) / p;
    }
    let (_, plus_di, minus_di) = *dx.last()?;
    Some((adx, plus_di, minus_di))
}

/// (DX, +DI, -DI) per bar once the directional movement is seeded
fn dx_series(candles: &[Candle], period: usize) -> Vec<(f64, f64, f64)> {
    if period == 0 || candles.len() < period * 2 + 1 {
        return Vec::new();
    }

    let mut plus_dm_values = Vec::with_capacity(candles.len());
    let mut minus_dm_values = Vec::with_capacity(candles.len());
    let mut tr_values = Vec::with_capacity(candles.len());

    for pair in candles.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let up_move = curr.high - prev.high;
        let down_move = prev.low - curr.low;

        plus_dm_values.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm_values.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        tr_values.push(true_range(curr, prev));
    }

    let p = period as f64;
    let mut smoothed_plus_dm = plus_dm_values.iter().take(period).sum::<f64>();
    let mut smoothed_minus_dm = minus_dm_values.iter().take(period).sum::<f64>();
    let mut smoothed_tr = tr_values.iter().take(period).sum::<f64>();

    let mut dx_values = Vec::new();
    for i in period..tr_values.len() {
        smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / p + plus_dm_values[i];
        smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / p + minus_dm_values[i];
        smoothed_tr = smoothed_tr - smoothed_tr / p + tr_values[i];

        if smoothed_tr == 0.0 {
            continue;
        }
        let plus_di = 100.0 * smoothed_plus_dm / smoothed_tr;
        let minus_di = 100.0 * smoothed_minus_dm / smoothed_tr;
        let di_sum = plus_di + minus_di;
        if di_sum > 0.0 {
            let dx = 100.0 * (plus_di - minus_di).abs() / di_sum;
            dx_values.push((dx, plus_di, minus_di));
        }
    }
    dx_values
}

/// Simple returns of a close series
pub fn returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Std dev of the last `period` returns
pub fn volatility(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    std_dev(&returns(&closes[closes.len() - period - 1..]))
}

/// Std dev of all daily returns scaled by sqrt(252)
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    std_dev(&returns(closes)).map(|s| s * TRADING_DAYS.sqrt())
}

/// Mean (high - low) / close of the last `period` candles
pub fn avg_range(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let n = period.min(candles.len());
    let recent = &candles[candles.len() - n..];
    let ranges: Vec<f64> = recent
        .iter()
        .filter(|c| c.close > 0.0)
        .map(|c| (c.high - c.low) / c.close)
        .collect();
    if ranges.is_empty() {
        return None;
    }
    Some(ranges.iter().sum::<f64>() / ranges.len() as f64)
}

/// Current volume / average volume of the previous `period` candles
pub fn relative_volume(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let current_volume = candles.last()?.volume;
    let avg_volume = candles
        .iter()
        .rev()
        .skip(1)
        .take(period)
        .map(|c| c.volume)
        .sum::<f64>()
        / period as f64;
    if avg_volume > 0.0 {
        Some(current_volume / avg_volume)
    } else {
        None
    }
}

/// On Balance Volume and its change over the last 5 candles
pub fn obv(candles: &[Candle]) -> Option<(f64, f64)> {
    if candles.len() < 2 {
        return None;
    }
    let mut series = Vec::with_capacity(candles.len());
    let mut acc = 0.0;
    series.push(acc);
    for w in candles.windows(2) {
        if w[1].close > w[0].close {
            acc += w[1].volume;
        } else if w[1].close < w[0].close {
            acc -= w[1].volume;
        }
        series.push(acc);
    }
    let back = series.len().saturating_sub(6);
    Some((acc, acc - series[back]))
}

/// VWAP over the last `lookback` candles
pub fn vwap(candles: &[Candle], lookback: usize) -> Option<f64> {
    let mut sum_pv = 0.0;
    let mut sum_volume = 0.0;
    for c in candles.iter().rev().take(lookback) {
        let typical = (c.high + c.low + c.close) / 3.0;
        sum_pv += typical * c.volume;
        sum_volume += c.volume;
    }
    if sum_volume > 0.0 {
        Some(sum_pv / sum_volume)
    } else {
        None
    }
}

/// Pearson correlation of two equally long series
pub fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 3 {
        return None;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_candle(i: usize, close: f64) -> Candle {
        make_candle_with_volume(i, close, 1000.0)
    }

    pub(crate) fn make_candle_with_volume(i: usize, close: f64, volume: f64) -> Candle {
        let ts = 1_700_000_000_000i64 + i as i64 * 86_400_000;
        Candle {
            open_time: ts,
            close_time: ts + 86_400_000,
            timeframe: Timeframe::Day1,
            open: close * 0.995,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume,
        }
    }

    /// Series built from a close generator
    pub(crate) fn series(n: usize, f: impl Fn(usize) -> f64) -> Vec<Candle> {
        (0..n).map(|i| make_candle(i, f(i))).collect()
    }

    #[test]
    fn test_rsi_uptrend_is_high() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(99.0));

        let mixed: Vec<f64> = (0..30)
            .map(|i| 100.0 + i as f64 + if i % 3 == 0 { -2.0 } else { 0.0 })
            .collect();
        let r = rsi(&mixed, 14).unwrap();
        assert!(r > 50.0 && r < 99.0);
    }

    #[test]
    fn test_rsi_needs_period_plus_one() {
        let closes: Vec<f64> = (0..14).map(|i| i as f64).collect();
        assert!(rsi(&closes, 14).is_none());
        assert_eq!(rsi(&[10.0; 20], 14), Some(50.0));
    }

    #[test]
    fn test_macd_signal_follows_trend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let (m, s, h) = macd(&closes, 12, 26, 9).unwrap();
        assert!(m > 0.0);
        assert!(s > 0.0);
        assert!((h - (m - s)).abs() < 1e-12);
    }

    #[test]
    fn test_sma_and_ema() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 2), Some(4.5));
        assert!(sma(&values, 6).is_none());
        let e = ema(&values, 3).unwrap();
        assert!(e > 3.0 && e < 5.0);
    }

    #[test]
    fn test_bb_computation() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + ((i % 5) as f64 - 2.0)).collect();
        let (upper, middle, lower) = bollinger(&closes, 20, 2.0).unwrap();
        assert!(upper > middle && middle > lower);
    }

    #[test]
    fn test_adx_strong_trend() {
        let candles = series(60, |i| 100.0 + i as f64 * 2.0);
        let (adx, plus_di, minus_di) = adx(&candles, 14).unwrap();
        assert!(adx > 25.0);
        assert!(plus_di > minus_di);
    }

    #[test]
    fn test_adx_is_wilder_smoothed_dx() {
        let candles = series(70, |i| 100.0 + (i as f64 * 0.4).sin() * 6.0 + i as f64 * 0.3);
        let dx = dx_series(&candles, 14);
        assert!(dx.len() > 14);

        // seed: with exactly 2 × period + 1 bars the ADX is the plain DX mean
        let (seed, _, _) = adx(&candles[..29], 14).unwrap();
        let first: Vec<f64> = dx_series(&candles[..29], 14).iter().map(|d| d.0).collect();
        assert_eq!(first.len(), 14);
        assert!((seed - first.iter().sum::<f64>() / 14.0).abs() < 1e-9);

        // every further bar: adx = (prev × 13 + dx) / 14
        let (prev, _, _) = adx(&candles[..69], 14).unwrap();
        let (last, _, _) = adx(&candles, 14).unwrap();
        let last_dx = dx.last().unwrap().0;
        assert!((last - (prev * 13.0 + last_dx) / 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_annualized_volatility_uses_recent_window() {
        // wild swings early, a calm drift over the last 40 bars
        let candles = series(100, |i| {
            if i < 60 {
                if i % 2 == 0 { 100.0 } else { 115.0 }
            } else {
                100.0 + (i - 60) as f64 * 0.1
            }
        });
        let f = FeatureEngine::new().compute(&candles).unwrap();
        let vol = f.annualized_volatility.unwrap();
        assert!(vol < 0.05, "vol = {vol}");

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        assert!(annualized_volatility(&closes).unwrap() > 1.0);
    }

    #[test]
    fn test_relative_volume() {
        let mut candles: Vec<Candle> = (0..24).map(|i| make_candle_with_volume(i, 100.0, 1000.0)).collect();
        candles.push(make_candle_with_volume(24, 100.0, 3000.0));
        let rv = relative_volume(&candles, 20).unwrap();
        assert!((rv - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_engine_compute_fills_indicators() {
        let candles = series(80, |i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.2);
        let f = FeatureEngine::new().compute(&candles).unwrap();
        assert!(f.rsi.is_some());
        assert!(f.macd.is_some());
        assert!(f.sma_20.is_some());
        assert!(f.sma_50.is_some());
        assert!(f.atr_pct.unwrap() > 0.0);
        assert!(f.adx.is_some());
        assert!(f.annualized_volatility.unwrap() > 0.0);
        assert!((f.avg_range.unwrap() - 0.02).abs() < 1e-6);
        assert_eq!(f.candles, 80);
    }

    #[test]
    fn test_engine_empty_series() {
        assert!(FeatureEngine::new().compute(&[]).is_none());
    }

    #[test]
    fn test_correlation() {
        let a: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..20).map(|i| 2.0 * i as f64 + 1.0).collect();
        let c: Vec<f64> = (0..20).map(|i| -(i as f64)).collect();
        assert!((correlation(&a, &b).unwrap() - 1.0).abs() < 1e-9);
        assert!((correlation(&a, &c).unwrap() + 1.0).abs() < 1e-9);
    }
}
