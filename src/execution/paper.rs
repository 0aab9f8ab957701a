//! Paper Trading Engine
//!
//! Simulates IOL order execution against live quotes.
//!
//! Key features:
//! - **Real costs**: IOL commissions on both legs plus configurable slippage
//! - **Stop / take-profit plans** stored with every position
//! - **Dashboard**: win rate, P&L, profit factor, drawdown, streaks, per-symbol breakdown
//! - **State persistence**: saves/loads JSON so a restart keeps the virtual account

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{info, warn};

use super::{ExecutionMode, Executor, SellOutcome};
use crate::config::PaperTradingCfg;
use crate::risk::CommissionModel;
use crate::types::{ClosedTrade, ExitReason, OrderResult, Position, TradePlan};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperStats {
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_pnl: f64,
    pub total_fees: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Peak-to-trough equity drop in percent
    pub max_drawdown: f64,
    pub peak_balance: f64,
    pub current_streak: i32,
    pub best_streak: i32,
    pub worst_streak: i32,
    pub sum_win_pnl: f64,
    pub sum_loss_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub exits_stop_loss: u32,
    pub exits_take_profit: u32,
    pub exits_trailing_stop: u32,
    pub exits_signal: u32,
    pub exits_other: u32,
}

impl PaperStats {
    pub fn win_rate(&self) -> f64 {
        if self.total_trades > 0 {
            self.wins as f64 / self.total_trades as f64
        } else {
            0.0
        }
    }

    pub fn profit_factor(&self) -> f64 {
        if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else {
            0.0
        }
    }

    fn record(&mut self, trade: &ClosedTrade) {
        self.total_trades += 1;
        self.total_pnl += trade.pnl;
        self.total_fees += trade.fees;
        if trade.is_win() {
            self.wins += 1;
            self.sum_win_pnl += trade.pnl;
            self.gross_profit += trade.pnl;
            self.largest_win = self.largest_win.max(trade.pnl);
            self.current_streak = if self.current_streak > 0 { self.current_streak + 1 } else { 1 };
            self.best_streak = self.best_streak.max(self.current_streak);
        } else {
            self.losses += 1;
            self.sum_loss_pnl += trade.pnl;
            self.gross_loss += trade.pnl.abs();
            self.largest_loss = self.largest_loss.min(trade.pnl);
            self.current_streak = if self.current_streak < 0 { self.current_streak - 1 } else { -1 };
            self.worst_streak = self.worst_streak.min(self.current_streak);
        }
        match trade.reason {
            ExitReason::StopLoss => self.exits_stop_loss += 1,
            ExitReason::TakeProfit => self.exits_take_profit += 1,
            ExitReason::TrailingStop => self.exits_trailing_stop += 1,
            ExitReason::Signal => self.exits_signal += 1,
            ExitReason::Manual | ExitReason::EndOfData => self.exits_other += 1,
        }
    }

    fn mark_equity(&mut self, equity: f64) {
        if equity > self.peak_balance {
            self.peak_balance = equity;
        } else if self.peak_balance > 0.0 {
            let dd = (self.peak_balance - equity) / self.peak_balance * 100.0;
            self.max_drawdown = self.max_drawdown.max(dd);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolStats {
    pub trades: u32,
    pub wins: u32,
    pub pnl: f64,
}

/// Everything the engine persists between restarts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperTradingState {
    pub balance: f64,
    pub positions: HashMap<String, Position>,
    pub history: Vec<ClosedTrade>,
    pub stats: PaperStats,
    pub symbol_stats: HashMap<String, SymbolStats>,
    pub saved_at: i64,
}

impl PaperTradingState {
    fn equity(&self) -> f64 {
        self.balance + self.positions.values().map(|p| p.market_value()).sum::<f64>()
    }
}

pub struct PaperTradingEngine {
    config: PaperTradingCfg,
    commissions: CommissionModel,
    state: RwLock<PaperTradingState>,
    last_dashboard: RwLock<i64>,
    state_file: Option<PathBuf>,
}

impl PaperTradingEngine {
    pub fn new(config: PaperTradingCfg, commissions: CommissionModel) -> Self {
        let initial_balance = config.initial_balance;
        Self {
            config,
            commissions,
            state: RwLock::new(PaperTradingState {
                balance: initial_balance,
                stats: PaperStats {
                    peak_balance: initial_balance,
                    ..Default::default()
                },
                ..Default::default()
            }),
            last_dashboard: RwLock::new(0),
            state_file: None,
        }
    }

    /// Set the state file path for persistence
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    fn snapshot(&self) -> PaperTradingState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Save current state to JSON file
    pub fn save_state(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let mut state = self.snapshot();
        state.saved_at = Utc::now().timestamp_millis();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "💾 [PAPER] State saved");
        Ok(())
    }

    /// Load state from JSON file; a missing file keeps the clean boot defaults
    pub fn load_state(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        if !path.exists() {
            info!(path = %path.display(), "💾 [PAPER] No state file found, starting fresh");
            return Ok(());
        }
        let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let loaded: PaperTradingState =
            serde_json::from_str(&json).with_context(|| format!("Invalid paper state {}", path.display()))?;
        info!(
            path = %path.display(),
            balance = %format!("${:.2}", loaded.balance),
            positions = loaded.positions.len(),
            trades = loaded.stats.total_trades,
            "💾 [PAPER] State loaded"
        );
        let mut state = self.state.write().map_err(|_| anyhow!("paper state lock poisoned"))?;
        *state = loaded;
        Ok(())
    }

    fn slipped(&self, price: f64, side_buy: bool) -> f64 {
        let slip = self.config.slippage_bps / 10_000.0;
        if side_buy {
            price * (1.0 + slip)
        } else {
            price * (1.0 - slip)
        }
    }

    /// Simulated limit buy
    pub fn open_position(&self, symbol: &str, quantity: u64, price: f64, plan: &TradePlan) -> Result<OrderResult> {
        if quantity == 0 || price <= 0.0 {
            return Ok(rejected("Cantidad o precio inválido"));
        }
        let fill = self.slipped(price, true);
        let commission = self.commissions.commission(symbol, fill, quantity);
        let cost = fill * quantity as f64 + commission;

        let mut state = self.state.write().map_err(|_| anyhow!("paper state lock poisoned"))?;
        if state.positions.contains_key(symbol) {
            return Ok(rejected(&format!("Ya existe una posición en {}", symbol)));
        }
        if cost > state.balance {
            warn!(symbol, cost, balance = state.balance, "⚠️ [PAPER] Saldo insuficiente");
            return Ok(rejected(&format!(
                "Saldo insuficiente: ${:.2} requerido, ${:.2} disponible",
                cost, state.balance
            )));
        }

        state.balance -= cost;
        state.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                quantity,
                entry_price: fill,
                current_price: fill,
                stop_loss: plan.stop_loss,
                take_profit: plan.take_profit,
                entry_commission: commission,
                opened_at: Utc::now().timestamp_millis(),
                score: plan.score,
                supporting_strategies: plan.supporting_strategies.clone(),
            },
        );
        info!(
            symbol,
            quantity,
            fill = %format!("${:.2}", fill),
            commission = %format!("${:.2}", commission),
            stop = %format!("${:.2}", plan.stop_loss),
            take_profit = %format!("${:.2}", plan.take_profit),
            balance = %format!("${:.2}", state.balance),
            "📥 [PAPER] Compra simulada"
        );

        Ok(OrderResult {
            success: true,
            operation_id: Some(format!("PAPER-{}", uuid::Uuid::new_v4())),
            message: "Orden simulada ejecutada".to_string(),
            fill_price: fill,
            quantity,
            commission,
        })
    }

    /// Simulated sell of up to `quantity` shares of an open position
    pub fn close_position(&self, symbol: &str, quantity: u64, price: f64, reason: ExitReason) -> Result<SellOutcome> {
        let mut state = self.state.write().map_err(|_| anyhow!("paper state lock poisoned"))?;
        let Some(position) = state.positions.get(symbol).cloned() else {
            return Ok(SellOutcome {
                order: rejected(&format!("Sin posición en {}", symbol)),
                closed: None,
            });
        };
        if price <= 0.0 {
            return Ok(SellOutcome {
                order: rejected("Precio inválido"),
                closed: None,
            });
        }

        let qty = if quantity == 0 { position.quantity } else { quantity.min(position.quantity) };
        let fill = self.slipped(price, false);
        let exit_commission = self.commissions.commission(symbol, fill, qty);
        let share = qty as f64 / position.quantity as f64;
        let entry_commission = position.entry_commission * share;
        let fees = entry_commission + exit_commission;
        let pnl = (fill - position.entry_price) * qty as f64 - fees;
        let invested = position.entry_price * qty as f64;
        let now = Utc::now().timestamp_millis();

        let trade = ClosedTrade {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            quantity: qty,
            entry_price: position.entry_price,
            exit_price: fill,
            pnl,
            pnl_pct: if invested > 0.0 { pnl / invested } else { 0.0 },
            fees,
            reason,
            opened_at: position.opened_at,
            closed_at: now,
            supporting_strategies: position.supporting_strategies.clone(),
        };

        state.balance += fill * qty as f64 - exit_commission;
        if qty >= position.quantity {
            state.positions.remove(symbol);
        } else if let Some(p) = state.positions.get_mut(symbol) {
            p.quantity -= qty;
            p.entry_commission -= entry_commission;
            p.current_price = price;
        }
        state.stats.record(&trade);
        let sym = state.symbol_stats.entry(symbol.to_string()).or_default();
        sym.trades += 1;
        sym.pnl += pnl;
        if trade.is_win() {
            sym.wins += 1;
        }
        let equity = state.equity();
        state.stats.mark_equity(equity);
        state.history.push(trade.clone());

        let emoji = if trade.is_win() { "✅" } else { "❌" };
        info!(
            symbol,
            quantity = qty,
            entry = %format!("${:.2}", position.entry_price),
            exit = %format!("${:.2}", fill),
            pnl = %format!("${:+.2}", pnl),
            pnl_pct = %format!("{:+.2}%", trade.pnl_pct * 100.0),
            reason = %reason,
            balance = %format!("${:.2}", state.balance),
            "{} [PAPER] Posición cerrada",
            emoji
        );

        Ok(SellOutcome {
            order: OrderResult {
                success: true,
                operation_id: Some(format!("PAPER-{}", trade.id)),
                message: "Venta simulada ejecutada".to_string(),
                fill_price: fill,
                quantity: qty,
                commission: exit_commission,
            },
            closed: Some(trade),
        })
    }

    /// Mark an open position and track drawdown on equity
    pub fn update_price(&self, symbol: &str, price: f64) {
        if price <= 0.0 {
            return;
        }
        if let Ok(mut state) = self.state.write() {
            if let Some(p) = state.positions.get_mut(symbol) {
                p.current_price = price;
            }
            let equity = state.equity();
            state.stats.mark_equity(equity);
        }
    }

    // ── Getters ─────────────────────────────────────────────────

    pub fn get_balance(&self) -> f64 {
        self.state.read().map(|s| s.balance).unwrap_or(0.0)
    }

    pub fn get_total_equity(&self) -> f64 {
        self.state.read().map(|s| s.equity()).unwrap_or(0.0)
    }

    pub fn get_stats(&self) -> PaperStats {
        self.snapshot().stats
    }

    pub fn get_positions(&self) -> Vec<Position> {
        self.state
            .read()
            .map(|s| s.positions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_trade_history(&self) -> Vec<ClosedTrade> {
        self.state.read().map(|s| s.history.clone()).unwrap_or_default()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.state.read().map(|s| s.positions.contains_key(symbol)).unwrap_or(false)
    }

    pub fn open_position_count(&self) -> usize {
        self.state.read().map(|s| s.positions.len()).unwrap_or(0)
    }

    // ── Dashboard ───────────────────────────────────────────────

    pub fn maybe_print_dashboard(&self) -> bool {
        let now = Utc::now().timestamp_millis();
        let interval_ms = (self.config.dashboard_interval_secs * 1000) as i64;
        let last = self.last_dashboard.read().map(|l| *l).unwrap_or(0);
        if now - last < interval_ms {
            return false;
        }
        self.print_dashboard();
        if let Ok(mut last) = self.last_dashboard.write() {
            *last = now;
        }
        true
    }

    pub fn print_dashboard(&self) {
        let state = self.snapshot();
        let stats = &state.stats;
        let equity = state.equity();
        let initial = self.config.initial_balance;
        let total_return = if initial > 0.0 { (equity - initial) / initial * 100.0 } else { 0.0 };
        let wr = stats.win_rate() * 100.0;
        let avg_win = if stats.wins > 0 { stats.sum_win_pnl / stats.wins as f64 } else { 0.0 };
        let avg_loss = if stats.losses > 0 { stats.sum_loss_pnl / stats.losses as f64 } else { 0.0 };
        let wr_dec = stats.win_rate();
        let ev = if stats.total_trades > 0 {
            wr_dec * avg_win + (1.0 - wr_dec) * avg_loss
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════════════════╗");
        info!("║  📋 IOL PAPER TRADING DASHBOARD                                          ║");
        info!("╠══════════════════════════════════════════════════════════════════════════╣");
        info!(
            "║  💰 Cash: ${:.2} | Equity: ${:.2} (initial: ${:.2})",
            state.balance, equity, initial
        );
        info!(
            "║  📈 P&L: ${:+.2} ({:+.2}%) | Fees: ${:.2}",
            stats.total_pnl, total_return, stats.total_fees
        );
        info!(
            "║  🎯 WINRATE: {:.1}% ({} W / {} L / {} total) | Streak: {} | EV/trade: ${:+.2}",
            wr, stats.wins, stats.losses, stats.total_trades, stats.current_streak, ev
        );
        info!(
            "║  📊 Avg Win: ${:+.2} | Avg Loss: ${:+.2} | Profit Factor: {:.2}",
            avg_win,
            avg_loss,
            stats.profit_factor()
        );
        info!(
            "║  📊 Best: ${:+.2} | Worst: ${:+.2} | Max DD: {:.2}%",
            stats.largest_win, stats.largest_loss, stats.max_drawdown
        );
        info!(
            "║  🚪 Exits → SL: {} | TP: {} | Trailing: {} | Signal: {} | Other: {}",
            stats.exits_stop_loss,
            stats.exits_take_profit,
            stats.exits_trailing_stop,
            stats.exits_signal,
            stats.exits_other
        );

        if !state.symbol_stats.is_empty() {
            info!("║  ─── Per-Symbol Breakdown ───");
            let mut symbols: Vec<_> = state.symbol_stats.iter().collect();
            symbols.sort_by(|a, b| a.0.cmp(b.0));
            for (symbol, s) in symbols {
                let swr = if s.trades > 0 { s.wins as f64 / s.trades as f64 * 100.0 } else { 0.0 };
                info!(
                    "║  {:>6}: {:.1}% WR ({}/{}) P&L: ${:+.2}",
                    symbol, swr, s.wins, s.trades, s.pnl
                );
            }
        }

        if state.positions.is_empty() {
            info!("║  📌 No open positions");
        } else {
            info!("║  ─── Open Positions ───");
            for p in state.positions.values() {
                info!(
                    "║  {:>6} x{} @ ${:.2} → ${:.2} | P&L: ${:+.2} ({:+.1}%) | SL: ${:.2} TP: ${:.2}",
                    p.symbol,
                    p.quantity,
                    p.entry_price,
                    p.current_price,
                    p.unrealized_pnl(),
                    p.unrealized_pnl_pct() * 100.0,
                    p.stop_loss,
                    p.take_profit
                );
            }
        }
        info!("╚══════════════════════════════════════════════════════════════════════════╝");
    }

    pub fn summary_string(&self) -> String {
        let state = self.snapshot();
        let stats = &state.stats;
        format!(
            "📋 Paper: ${:.2} cash | ${:.2} equity | {}/{} ({:.0}% WR) | P&L: ${:+.2} | PF: {:.2} | DD: {:.1}% | {} open",
            state.balance,
            state.equity(),
            stats.wins,
            stats.total_trades,
            stats.win_rate() * 100.0,
            stats.total_pnl,
            stats.profit_factor(),
            stats.max_drawdown,
            state.positions.len()
        )
    }
}

fn rejected(message: &str) -> OrderResult {
    OrderResult {
        success: false,
        message: message.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl Executor for PaperTradingEngine {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Paper
    }

    async fn available_balance(&self) -> Result<f64> {
        Ok(self.get_balance())
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        Ok(self.get_positions())
    }

    async fn buy(&self, symbol: &str, quantity: u64, price: f64, plan: &TradePlan) -> Result<OrderResult> {
        let result = self.open_position(symbol, quantity, price, plan)?;
        if result.success {
            // the fill already happened in memory
            if let Err(e) = self.save_state() {
                warn!(symbol, error = %e, "⚠️ [PAPER] No se pudo guardar el estado");
            }
        }
        Ok(result)
    }

    async fn sell(&self, symbol: &str, quantity: u64, price: f64, reason: ExitReason) -> Result<SellOutcome> {
        let outcome = self.close_position(symbol, quantity, price, reason)?;
        if outcome.order.success {
            if let Err(e) = self.save_state() {
                warn!(symbol, error = %e, "⚠️ [PAPER] No se pudo guardar el estado");
            }
        }
        Ok(outcome)
    }

    async fn mark_price(&self, symbol: &str, price: f64) -> Result<()> {
        self.update_price(symbol, price);
        Ok(())
    }

    async fn summary(&self) -> Result<String> {
        Ok(self.summary_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PaperTradingEngine {
        PaperTradingEngine::new(
            PaperTradingCfg {
                slippage_bps: 0.0,
                ..Default::default()
            },
            CommissionModel::default(),
        )
    }

    fn plan() -> TradePlan {
        TradePlan {
            stop_loss: 940.0,
            take_profit: 1120.0,
            score: 40,
            supporting_strategies: vec!["technical".to_string()],
        }
    }

    #[test]
    fn buy_deducts_cost_and_commission() {
        let e = engine();
        let r = e.open_position("GGAL", 10, 1000.0, &plan()).unwrap();
        assert!(r.success);
        assert_eq!(r.commission, 60.0);
        assert!((e.get_balance() - 89_940.0).abs() < 1e-9);
        assert!(e.has_position("GGAL"));
        // second entry on the same symbol is refused
        assert!(!e.open_position("GGAL", 1, 1000.0, &plan()).unwrap().success);
    }

    #[test]
    fn insufficient_balance_is_rejected() {
        let e = engine();
        let r = e.open_position("GGAL", 1_000, 1000.0, &plan()).unwrap();
        assert!(!r.success);
        assert!(r.message.contains("Saldo insuficiente"));
        assert_eq!(e.open_position_count(), 0);
    }

    #[test]
    fn close_books_net_pnl_and_stats() {
        let e = engine();
        e.open_position("GGAL", 10, 1000.0, &plan()).unwrap();
        let out = e.close_position("GGAL", 10, 1100.0, ExitReason::TakeProfit).unwrap();
        let trade = out.closed.unwrap();
        // 1000 gross − 60 − 66 commissions
        assert!((trade.pnl - 874.0).abs() < 1e-9);
        assert!((e.get_balance() - 100_874.0).abs() < 1e-9);
        let stats = e.get_stats();
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.exits_take_profit, 1);
        assert_eq!(stats.current_streak, 1);
        assert!(!e.has_position("GGAL"));
    }

    #[test]
    fn losses_track_streak_and_drawdown() {
        let e = engine();
        e.open_position("YPF", 10, 1000.0, &plan()).unwrap();
        e.update_price("YPF", 900.0);
        e.close_position("YPF", 0, 900.0, ExitReason::StopLoss).unwrap();
        let stats = e.get_stats();
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.worst_streak, -1);
        assert_eq!(stats.exits_stop_loss, 1);
        assert!(stats.max_drawdown > 1.0);
        assert_eq!(stats.profit_factor(), 0.0);
    }

    #[test]
    fn partial_close_keeps_remaining_shares() {
        let e = engine();
        e.open_position("PAMP", 10, 1000.0, &plan()).unwrap();
        let out = e.close_position("PAMP", 4, 1000.0, ExitReason::Manual).unwrap();
        assert_eq!(out.order.quantity, 4);
        let p = &e.get_positions()[0];
        assert_eq!(p.quantity, 6);
        assert!((p.entry_commission - 36.0).abs() < 1e-9);
    }

    #[test]
    fn sell_without_position_is_rejected() {
        let e = engine();
        let out = e.close_position("BMA", 1, 100.0, ExitReason::Signal).unwrap();
        assert!(!out.order.success);
        assert!(out.closed.is_none());
    }

    #[test]
    fn slippage_moves_fills_against_us() {
        let e = PaperTradingEngine::new(PaperTradingCfg::default(), CommissionModel::default());
        let r = e.open_position("GGAL", 10, 1000.0, &plan()).unwrap();
        assert!((r.fill_price - 1001.0).abs() < 1e-9);
    }

    #[test]
    fn state_roundtrip_and_missing_file() {
        let path = std::env::temp_dir().join(format!("iolbot-paper-{}.json", uuid::Uuid::new_v4()));
        let e = engine().with_state_file(path.clone());
        e.load_state().unwrap();
        assert_eq!(e.get_balance(), 100_000.0);

        e.open_position("GGAL", 10, 1000.0, &plan()).unwrap();
        e.save_state().unwrap();

        let restored = engine().with_state_file(path.clone());
        restored.load_state().unwrap();
        assert!(restored.has_position("GGAL"));
        assert!((restored.get_balance() - 89_940.0).abs() < 1e-9);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn fills_survive_unwritable_state_file() {
        // a regular file as parent directory makes every write fail
        let blocker = std::env::temp_dir().join(format!("iolbot-blocker-{}", uuid::Uuid::new_v4()));
        fs::write(&blocker, "x").unwrap();
        let e = engine().with_state_file(blocker.join("paper_state.json"));
        tokio_test::block_on(async {
            let order = e.buy("GGAL", 5, 1000.0, &plan()).await.unwrap();
            assert!(order.success);
            assert!(e.has_position("GGAL"));
            let out = e.sell("GGAL", 5, 1010.0, ExitReason::Signal).await.unwrap();
            assert!(out.order.success);
            assert!(out.closed.is_some());
        });
        assert!(e.save_state().is_err());
        let _ = fs::remove_file(&blocker);
    }

    #[test]
    fn executor_trait_roundtrip() {
        let e = engine();
        tokio_test::block_on(async {
            assert_eq!(e.mode(), ExecutionMode::Paper);
            e.buy("GGAL", 5, 1000.0, &plan()).await.unwrap();
            assert_eq!(e.positions().await.unwrap().len(), 1);
            let out = e.sell("GGAL", 5, 1000.0, ExitReason::Signal).await.unwrap();
            assert!(out.closed.is_some());
            assert!(e.summary().await.unwrap().contains("Paper"));
        });
    }
}
