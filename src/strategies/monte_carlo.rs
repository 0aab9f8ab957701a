//! Monte Carlo simulation of the holding-period return

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::features::{annualized_volatility, returns, TRADING_DAYS};
use crate::types::StrategyScore;

use super::{Strategy, StrategyContext, WINDOW_3MO};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub win_rate: f64,
    pub expected_value: f64,
    pub worst_case: f64,
    pub median: f64,
    pub best_case: f64,
}

pub struct MonteCarlo {
    simulations: usize,
    horizon_days: usize,
    seed: Option<u64>,
}

impl MonteCarlo {
    pub const MIN_BARS: usize = 30;

    pub fn new(simulations: usize, horizon_days: usize) -> Self {
        Self {
            simulations: simulations.max(100),
            horizon_days: horizon_days.max(1),
            seed: None,
        }
    }

    /// Deterministic paths
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Standard normal via Box-Muller
    fn standard_normal(rng: &mut impl Rng) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// P&L per share for `simulations` horizons of N(mean·h, vol/√252·√h)
    pub fn simulate(&self, price: f64, annual_vol: f64, mean_daily_return: f64) -> SimulationResult {
        let h = self.horizon_days as f64;
        let sigma = annual_vol / TRADING_DAYS.sqrt() * h.sqrt();
        let mu = mean_daily_return * h;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut pnls: Vec<f64> = (0..self.simulations)
            .map(|_| price * (mu + sigma * Self::standard_normal(&mut rng)))
            .collect();
        let n = pnls.len() as f64;
        let wins = pnls.iter().filter(|p| **p > 0.0).count() as f64;
        let expected_value = pnls.iter().sum::<f64>() / n;

        pnls.sort_by(|a, b| a.total_cmp(b));
        let pct = |q: f64| pnls[((pnls.len() - 1) as f64 * q).round() as usize];

        SimulationResult {
            win_rate: wins / n,
            expected_value,
            worst_case: pct(0.05),
            median: pct(0.50),
            best_case: pct(0.95),
        }
    }

    pub fn score_result(&self, price: f64, sim: &SimulationResult) -> StrategyScore {
        let mut result = StrategyScore::new(self.name());
        let ev_pct = (sim.expected_value / price * 100.0) as i32;
        if sim.expected_value > 0.0 && sim.win_rate > 0.55 {
            let points = 30i32.min(ev_pct);
            result.add(points, format!("Expected value positivo (+{})", points));
        } else if sim.expected_value < 0.0 {
            let points = (-25i32).max(ev_pct);
            result.add(points, format!("Expected value negativo ({})", points));
        }
        if sim.win_rate > 0.65 {
            result.add(10, format!("Alta probabilidad de éxito {:.0}% (+10)", sim.win_rate * 100.0));
        } else if sim.win_rate < 0.40 {
            result.add(-15, format!("Baja probabilidad de éxito {:.0}% (-15)", sim.win_rate * 100.0));
        }
        result
    }
}

impl Strategy for MonteCarlo {
    fn name(&self) -> &'static str {
        "monte_carlo"
    }

    fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
        let window = ctx.window(WINDOW_3MO);
        if window.len() < Self::MIN_BARS {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        }
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
        let rets = returns(&closes);
        let (Some(price), Some(vol)) = (ctx.price(), annualized_volatility(&closes)) else {
            return super::insufficient(self.name(), window.len(), Self::MIN_BARS);
        };
        let mean = rets.iter().sum::<f64>() / rets.len().max(1) as f64;
        let sim = self.simulate(price, vol, mean);
        tracing::debug!(
            symbol = ctx.symbol,
            win_rate = sim.win_rate,
            expected_value = sim.expected_value,
            "Monte Carlo simulated"
        );
        self.score_result(price, &sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;

    #[test]
    fn test_strong_drift_scores_high() {
        // +2% / 0% alternating: ~1% daily drift
        let candles = series(63, |i| 100.0 * 1.02f64.powi(((i + 1) / 2) as i32));
        let s = MonteCarlo::new(10_000, 30)
            .with_seed(7)
            .evaluate(&StrategyContext::new("GGAL", &candles));
        assert!(s.score >= 39 && s.score <= 40, "score {}", s.score);
    }

    #[test]
    fn test_negative_drift_scores_low() {
        let candles = series(63, |i| 100.0 * 0.98f64.powi(((i + 1) / 2) as i32));
        let s = MonteCarlo::new(10_000, 30)
            .with_seed(7)
            .evaluate(&StrategyContext::new("GGAL", &candles));
        // EV capped at -25, win rate near 0 -> -15
        assert_eq!(s.score, -40);
    }

    #[test]
    fn test_zero_drift_is_a_coin_flip() {
        let sim = MonteCarlo::new(10_000, 30).with_seed(1).simulate(100.0, 0.30, 0.0);
        assert!((sim.win_rate - 0.5).abs() < 0.03);
        assert!(sim.worst_case < sim.median && sim.median < sim.best_case);
    }
}
