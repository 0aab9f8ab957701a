//! Seasonal effects: historical month / weekday returns plus known calendar effects

use chrono::{Datelike, Weekday};

use crate::types::{to_local, Candle, StrategyScore};

use super::{Strategy, StrategyContext};

pub struct Seasonal {
    min_bars: usize,
    month_effects: Vec<(u32, &'static str, i32)>,
    day_effects: Vec<(Weekday, &'static str, i32)>,
}

impl Seasonal {
    pub fn new() -> Self {
        Self {
            min_bars: 250,
            month_effects: vec![
                (1, "January Effect", 5),
                (12, "Santa Rally", 8),
                (9, "September Effect", -5),
                (10, "October Volatility", -3),
            ],
            day_effects: vec![
                (Weekday::Mon, "Monday Effect", -3),
                (Weekday::Fri, "Friday Effect", 5),
            ],
        }
    }
}

impl Default for Seasonal {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean change between consecutive closes of the selected bars
fn mean_return(closes: &[f64]) -> Option<f64> {
    let rets = crate::features::returns(closes);
    if rets.is_empty() {
        return None;
    }
    Some(rets.iter().sum::<f64>() / rets.len() as f64)
}

fn closes_where(candles: &[Candle], pred: impl Fn(chrono::NaiveDate) -> bool) -> Vec<f64> {
    candles
        .iter()
        .filter_map(|c| {
            let date = to_local(c.open_datetime()?).date_naive();
            pred(date).then_some(c.close)
        })
        .collect()
}

impl Strategy for Seasonal {
    fn name(&self) -> &'static str {
        "seasonal"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        if ctx.daily.len() < self.min_bars {
            return super::insufficient(self.name(), ctx.daily.len(), self.min_bars);
        }
        let mut result = StrategyScore::new(self.name());
        let month = ctx.now.month();
        let weekday = ctx.now.weekday();

        let month_closes = closes_where(ctx.daily, |d| d.month() == month);
        if month_closes.len() >= 10 {
            if let Some(avg) = mean_return(&month_closes) {
                let points = (avg * 100.0) as i32;
                if points.abs() > 2 {
                    result.add(
                        points,
                        format!("Patrón mensual ({:.1}% promedio en mes {})", avg * 100.0, month),
                    );
                }
            }
        }

        let day_closes = closes_where(ctx.daily, |d| d.weekday() == weekday);
        if day_closes.len() >= 20 {
            if let Some(avg) = mean_return(&day_closes) {
                let points = (avg * 200.0) as i32;
                if points.abs() > 1 {
                    result.add(
                        points,
                        format!("{} ({:.2}% promedio)", weekday, avg * 100.0),
                    );
                }
            }
        }

        if let Some((_, name, points)) = self.month_effects.iter().find(|(m, _, _)| *m == month) {
            result.add(*points, format!("{} ({:+})", name, points));
        }
        if let Some((_, name, points)) = self.day_effects.iter().find(|(d, _, _)| *d == weekday) {
            result.add(*points, format!("{} ({:+})", name, points));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;
    use chrono::{FixedOffset, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> chrono::DateTime<FixedOffset> {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_flat_history_only_calendar_effects() {
        let candles = series(300, |_| 100.0);
        // 2024-12-06 is a Friday: Santa Rally +8, Friday +5
        let ctx = StrategyContext::new("GGAL", &candles).at(at(2024, 12, 6));
        let s = Seasonal::new().evaluate(&ctx);
        assert_eq!(s.score, 13);
        assert_eq!(s.factors.len(), 2);
    }

    #[test]
    fn test_no_effects_midweek_in_june() {
        let candles = series(300, |_| 100.0);
        // Wednesday 2024-06-12
        let ctx = StrategyContext::new("GGAL", &candles).at(at(2024, 6, 12));
        assert_eq!(Seasonal::new().evaluate(&ctx).score, 0);
    }

    #[test]
    fn test_requires_a_year() {
        let candles = series(200, |_| 100.0);
        let ctx = StrategyContext::new("GGAL", &candles).at(at(2024, 12, 6));
        assert_eq!(Seasonal::new().evaluate(&ctx).score, 0);
    }
}
