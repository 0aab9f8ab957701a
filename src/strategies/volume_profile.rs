//! Volume profile: point of control and 70% value area

use crate::types::{Candle, StrategyScore};

use super::{Strategy, StrategyContext, WINDOW_2MO};

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub poc: f64,
    pub value_area_low: f64,
    pub value_area_high: f64,
}

pub struct VolumeProfile {
    bins: usize,
}

impl VolumeProfile {
    pub const MIN_BARS: usize = 30;

    pub fn new(bins: usize) -> Self {
        Self { bins: bins.max(2) }
    }

    /// Volume per price level (mid of each bar), levels are the bin lower edges
    pub fn profile(&self, candles: &[Candle]) -> Option<Profile> {
        let min = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let max = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() || max <= min {
            return None;
        }
        // `bins` edges -> `bins - 1` buckets
        let step = (max - min) / (self.bins - 1) as f64;
        let buckets = self.bins - 1;
        let mut volume = vec![0.0; buckets];
        for c in candles {
            let mid = (c.high + c.low) / 2.0;
            let idx = (((mid - min) / step).floor() as usize).min(buckets - 1);
            volume[idx] += c.volume;
        }
        let total: f64 = volume.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let level = |i: usize| min + step * i as f64;

        let mut order: Vec<usize> = (0..buckets).filter(|i| volume[*i] > 0.0).collect();
        order.sort_by(|a, b| volume[*b].total_cmp(&volume[*a]));
        let poc = level(*order.first()?);

        let target = total * 0.70;
        let mut acc = 0.0;
        let mut low = f64::INFINITY;
        let mut high = f64::NEG_INFINITY;
        for i in order {
            acc += volume[i];
            low = low.min(level(i));
            high = high.max(level(i));
            if acc >= target {
                break;
            }
        }
        Some(Profile {
            poc,
            value_area_low: low,
            value_area_high: high,
        })
    }
}

impl Strategy for VolumeProfile {
    fn name(&self) -> &'static str {
        "volume_profile"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_2MO);
        if window.len() < Self::MIN_BARS {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        }
        let mut result = StrategyScore::new(self.name());
        let (Some(profile), Some(last)) = (self.profile(window), window.last()) else {
            return result;
        };
        let price = last.close;
        if price < profile.value_area_low {
            let dist = (profile.value_area_low - price) / price * 100.0;
            let points = 25i32.min((dist * 5.0) as i32);
            result.add(points, format!("Debajo de value area {:.2} (+{})", profile.value_area_low, points));
        } else if price > profile.value_area_high {
            let dist = (price - profile.value_area_high) / price * 100.0;
            let points = (-25i32).max(-((dist * 5.0) as i32));
            result.add(points, format!("Encima de value area {:.2} ({})", profile.value_area_high, points));
        } else if (price - profile.poc).abs() / price < 0.01 {
            result.factors.push("En POC (zona de equilibrio)".to_string());
        }
        result
    }
}
