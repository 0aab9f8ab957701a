//! Risk Manager - Position sizing and risk controls
//!
//! Implements:
//! - ATR-based stop-loss and reward/risk take-profit
//! - Fixed-fractional position sizing capped by max position size
//! - Portfolio heat (summed open risk) limit
//! - Daily loss kill switch and max trades per day
//! - Half-Kelly fraction

pub mod commissions;
pub mod trailing;

pub use commissions::{AssetType, CommissionModel};
pub use trailing::{TrailingStop, TrailingStopBook, TrailingUpdate};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::RiskConfig;
use crate::types::{local_now, ExitReason, Position};

/// Fallback stop distance when ATR is unknown
const FALLBACK_STOP_PCT: f64 = 0.05;

/// Daily statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct DailyStats {
    pub date: String,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl: f64,
    pub total_volume: f64,
}

/// Risk manager for position sizing and limits
pub struct RiskManager {
    config: RiskConfig,
    /// Daily stats (RwLock for interior mutability so checks work through &self)
    daily_stats: RwLock<HashMap<String, DailyStats>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            daily_stats: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// entry − k·ATR; never at or below zero
    pub fn stop_loss(&self, entry: f64, atr: Option<f64>) -> f64 {
        let fallback = entry * (1.0 - FALLBACK_STOP_PCT);
        match atr.filter(|a| *a > 0.0) {
            Some(atr) => {
                let stop = entry - self.config.atr_stop_multiplier * atr;
                if stop > 0.0 {
                    stop
                } else {
                    fallback
                }
            }
            None => fallback,
        }
    }

    /// entry + R·(entry − stop)
    pub fn take_profit(&self, entry: f64, stop: f64) -> f64 {
        entry + self.config.reward_risk_ratio * (entry - stop)
    }

    /// Shares to buy: the tighter of the risk budget and the position cap,
    /// scaled by the regime multiplier
    pub fn position_size(&self, capital: f64, entry: f64, stop: f64, multiplier: f64) -> u64 {
        if capital <= 0.0 || entry <= 0.0 || entry <= stop {
            return 0;
        }
        let per_share_risk = (entry - stop).abs();
        let by_risk = (capital * self.config.max_risk_per_trade / per_share_risk).floor();
        let by_cap = (capital * self.config.max_position_pct / entry).floor();
        let shares = (by_risk.min(by_cap) * multiplier.max(0.0)).floor();
        if shares.is_finite() && shares > 0.0 {
            shares as u64
        } else {
            0
        }
    }

    /// Summed open risk over capital
    pub fn portfolio_heat(&self, positions: &[Position], capital: f64) -> f64 {
        if capital <= 0.0 {
            return 0.0;
        }
        positions.iter().map(|p| p.open_risk()).sum::<f64>() / capital
    }

    /// Approve a new entry with `new_risk` ARS at risk
    pub fn can_open(
        &self,
        symbol: &str,
        positions: &[Position],
        capital: f64,
        new_risk: f64,
    ) -> Result<(), String> {
        if positions.iter().any(|p| p.symbol == symbol) {
            return Err(format!("Ya existe una posición en {}", symbol));
        }
        if positions.len() >= self.config.max_open_positions {
            return Err(format!(
                "Máximo de posiciones abiertas alcanzado ({}/{})",
                positions.len(),
                self.config.max_open_positions
            ));
        }

        if let Some(stats) = self.today_stats() {
            if self.config.kill_switch_enabled && stats.pnl <= -self.config.max_daily_loss {
                return Err(format!(
                    "Kill switch: pérdida diaria ${:.2} (máx -${:.2})",
                    stats.pnl, self.config.max_daily_loss
                ));
            }
            if stats.trades >= self.config.max_trades_per_day {
                return Err(format!(
                    "Máximo de operaciones diarias alcanzado: {} (máx {})",
                    stats.trades, self.config.max_trades_per_day
                ));
            }
        }

        let heat = self.portfolio_heat(positions, capital);
        let new_heat = if capital > 0.0 { heat + new_risk / capital } else { f64::INFINITY };
        if new_heat > self.config.max_portfolio_heat {
            return Err(format!(
                "Excedería el heat máximo: {:.2}% > {:.2}%",
                new_heat * 100.0,
                self.config.max_portfolio_heat * 100.0
            ));
        }
        Ok(())
    }

    /// Exit the stop / take-profit plan asks for at `price`
    pub fn should_close(&self, position: &Position, price: f64) -> Option<ExitReason> {
        if position.stop_loss > 0.0 && price <= position.stop_loss {
            Some(ExitReason::StopLoss)
        } else if position.take_profit > 0.0 && price >= position.take_profit {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }

    /// Half Kelly, clamped to [0, 0.25]
    pub fn kelly_fraction(win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
        if avg_win <= 0.0 || avg_loss <= 0.0 {
            return 0.0;
        }
        let r = avg_win / avg_loss.abs();
        let kelly = (win_rate * r - (1.0 - win_rate)) / r;
        (kelly * 0.5).clamp(0.0, 0.25)
    }

    fn with_today<F: FnOnce(&mut DailyStats)>(&self, now: DateTime<FixedOffset>, f: F) {
        if let Ok(mut stats_map) = self.daily_stats.write() {
            let today = Self::get_date_key(now);
            let stats = stats_map
                .entry(today.clone())
                .or_insert_with(|| DailyStats {
                    date: today,
                    ..Default::default()
                });
            f(stats);
        }
    }

    /// Count an entry of `volume` ARS
    pub fn record_entry(&self, volume: f64) {
        self.record_entry_at(volume, local_now());
    }

    pub fn record_entry_at(&self, volume: f64, now: DateTime<FixedOffset>) {
        self.with_today(now, |s| {
            s.trades += 1;
            s.total_volume += volume;
        });
    }

    /// Book a closed trade's net P&L
    pub fn record_exit(&self, pnl: f64) {
        self.record_exit_at(pnl, local_now());
    }

    pub fn record_exit_at(&self, pnl: f64, now: DateTime<FixedOffset>) {
        self.with_today(now, |s| {
            s.pnl += pnl;
            if pnl > 0.0 {
                s.wins += 1;
            } else {
                s.losses += 1;
            }
        });
    }

    /// Get today's statistics
    pub fn today_stats(&self) -> Option<DailyStats> {
        self.stats_for(local_now())
    }

    pub fn stats_for(&self, day: DateTime<FixedOffset>) -> Option<DailyStats> {
        let stats = self.daily_stats.read().ok()?;
        stats.get(&Self::get_date_key(day)).cloned()
    }

    /// Whether the daily loss limit is hit
    pub fn kill_switch_active(&self) -> bool {
        self.config.kill_switch_enabled
            && self
                .today_stats()
                .map(|s| s.pnl <= -self.config.max_daily_loss)
                .unwrap_or(false)
    }

    /// Get date key for stats grouping (market local date)
    fn get_date_key(dt: DateTime<FixedOffset>) -> String {
        dt.format("%Y-%m-%d").to_string()
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(symbol: &str, entry: f64, stop: f64, qty: u64) -> Position {
        Position {
            symbol: symbol.to_string(),
            quantity: qty,
            entry_price: entry,
            current_price: entry,
            stop_loss: stop,
            take_profit: entry + 2.0 * (entry - stop),
            ..Default::default()
        }
    }

    #[test]
    fn test_stop_and_take_profit() {
        let rm = RiskManager::default();
        assert_eq!(rm.stop_loss(100.0, Some(3.0)), 94.0);
        // missing or oversized ATR falls back to 5%
        assert_eq!(rm.stop_loss(100.0, None), 95.0);
        assert_eq!(rm.stop_loss(100.0, Some(60.0)), 95.0);
        assert_eq!(rm.take_profit(100.0, 94.0), 112.0);
    }

    #[test]
    fn test_position_sizing() {
        let rm = RiskManager::default();
        // risk budget 2000 / 6 = 333, cap 10000 / 100 = 100
        assert_eq!(rm.position_size(100_000.0, 100.0, 94.0, 1.0), 100);
        // risk budget 2000 / 40 = 50 binds
        assert_eq!(rm.position_size(100_000.0, 100.0, 60.0, 1.0), 50);
        // regime multiplier
        assert_eq!(rm.position_size(100_000.0, 100.0, 94.0, 0.5), 50);
        assert_eq!(rm.position_size(100_000.0, 100.0, 100.0, 1.0), 0);
        assert_eq!(rm.position_size(0.0, 100.0, 94.0, 1.0), 0);
    }

    #[test]
    fn test_heat_limit() {
        let rm = RiskManager::default();
        // 2 × (10 × 100) = 2000 at risk on 100k = 2%
        let open = vec![position("GGAL", 100.0, 90.0, 100), position("YPF", 100.0, 90.0, 100)];
        assert!((rm.portfolio_heat(&open, 100_000.0) - 0.02).abs() < 1e-9);
        assert!(rm.can_open("PAMP", &open, 100_000.0, 3_000.0).is_ok());
        assert!(rm.can_open("PAMP", &open, 100_000.0, 5_000.0).is_err());
        assert!(rm.can_open("GGAL", &open, 100_000.0, 100.0).is_err());
    }

    #[test]
    fn test_kill_switch_and_trade_count() {
        let rm = RiskManager::new(RiskConfig {
            max_trades_per_day: 2,
            ..Default::default()
        });
        rm.record_entry(1000.0);
        assert!(rm.can_open("GGAL", &[], 100_000.0, 100.0).is_ok());
        rm.record_entry(1000.0);
        assert!(rm.can_open("GGAL", &[], 100_000.0, 100.0).is_err());

        let rm = RiskManager::default();
        rm.record_exit(-6_000.0);
        assert!(rm.kill_switch_active());
        let err = rm.can_open("GGAL", &[], 100_000.0, 100.0).unwrap_err();
        assert!(err.contains("Kill switch"));
        let stats = rm.today_stats().unwrap();
        assert_eq!(stats.losses, 1);
    }

    #[test]
    fn test_should_close() {
        let rm = RiskManager::default();
        let p = position("GGAL", 100.0, 94.0, 10);
        assert_eq!(rm.should_close(&p, 93.5), Some(ExitReason::StopLoss));
        assert_eq!(rm.should_close(&p, 112.0), Some(ExitReason::TakeProfit));
        assert_eq!(rm.should_close(&p, 101.0), None);
    }

    #[test]
    fn test_kelly_fraction() {
        // wr 0.6, r 2: (1.2 - 0.4) / 2 = 0.4, halved 0.2
        assert!((RiskManager::kelly_fraction(0.6, 200.0, 100.0) - 0.2).abs() < 1e-9);
        assert_eq!(RiskManager::kelly_fraction(0.9, 500.0, 100.0), 0.25);
        assert_eq!(RiskManager::kelly_fraction(0.2, 100.0, 100.0), 0.0);
    }
}
