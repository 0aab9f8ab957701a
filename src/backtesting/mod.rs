//! Backtesting Module
//!
//! Walk-forward simulation over daily candles:
//! - The offline scoring stack (features, candle strategies, regime, trend)
//! - Entries at the next bar's open, exits on stop, take profit, SELL or end of data
//! - IOL commissions on both legs
//! - Win rate, profit factor, drawdown and per-trade Sharpe

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::{AppConfig, StrategiesConfig};
use crate::features::FeatureEngine;
use crate::risk::{CommissionModel, RiskManager};
use crate::scoring::{Analysis, ScoreInputs, Scorer, Thresholds};
use crate::strategies::{RegimeDetector, StrategyContext, StrategySet, TrendPredictor};
use crate::types::{to_local, Action, Candle, ExitReason};

/// Historical trade record for backtesting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    /// Entry timestamp (ms)
    pub entry_ts: i64,
    /// Exit timestamp (ms)
    pub exit_ts: i64,
    pub symbol: String,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Score of the signal that opened the trade
    pub score: i32,
    /// Net PnL after both commissions
    pub pnl: f64,
    /// Net PnL over the entry notional
    pub pnl_pct: f64,
    pub fees: f64,
    pub exit_reason: ExitReason,
    pub is_win: bool,
    /// Strategies that pointed up at entry
    pub strategies: Vec<String>,
}

/// Backtest performance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,
    /// Profit factor (gross profit / gross loss)
    pub profit_factor: f64,
    /// Maximum drawdown of the equity curve (0.0 to 1.0)
    pub max_drawdown: f64,
    /// Mean over standard deviation of per-trade returns
    pub sharpe_ratio: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Expectancy (average net PnL per trade)
    pub expectancy: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_pnl: f64,
    pub final_equity: f64,
}

impl Default for BacktestMetrics {
    fn default() -> Self {
        Self {
            total_trades: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            expectancy: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            total_pnl: 0.0,
            final_equity: 0.0,
        }
    }
}

/// Backtest configuration
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Bars required before the first signal is evaluated
    pub warmup_bars: usize,
    /// Monte Carlo paths per bar (the live default is too slow for a replay)
    pub monte_carlo_simulations: usize,
    pub thresholds: Thresholds,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            warmup_bars: 60,
            monte_carlo_simulations: 500,
            thresholds: Thresholds::default(),
        }
    }
}

impl BacktestConfig {
    /// Capital and thresholds taken from the bot configuration
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            initial_capital: app.paper_trading.initial_balance,
            thresholds: Thresholds {
                buy: app.scoring.buy_threshold,
                sell: app.scoring.sell_threshold,
            },
            ..Default::default()
        }
    }
}

/// Full run summary, exported as YAML
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub bars: usize,
    pub period_start: String,
    pub period_end: String,
    pub initial_capital: f64,
    pub buy_threshold: i32,
    pub sell_threshold: i32,
    pub strategies: Vec<String>,
    pub metrics: BacktestMetrics,
    pub trades: Vec<BacktestTrade>,
}

impl BacktestReport {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize backtest report")
    }
}

struct OpenTrade {
    entry_ts: i64,
    quantity: u64,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    entry_commission: f64,
    score: i32,
    strategies: Vec<String>,
}

enum Pending {
    Enter(Analysis),
    Exit,
}

/// Backtester
pub struct Backtester {
    symbol: String,
    config: BacktestConfig,
    strategies: StrategySet,
    scorer: Scorer,
    risk: RiskManager,
    commissions: CommissionModel,
    feature_engine: FeatureEngine,
    regime: RegimeDetector,
    predictor: TrendPredictor,
    historical_data: Vec<Candle>,
    trades: Vec<BacktestTrade>,
    equity_curve: Vec<f64>,
    cash: f64,
}

impl Backtester {
    pub fn new(symbol: &str, config: BacktestConfig, app: &AppConfig) -> Self {
        let strategies = StrategySet::from_config(&StrategiesConfig {
            monte_carlo_simulations: config
                .monte_carlo_simulations
                .min(app.strategies.monte_carlo_simulations),
            ..app.strategies.clone()
        });
        Self {
            symbol: symbol.to_string(),
            cash: config.initial_capital,
            config,
            strategies,
            scorer: Scorer::new(&app.scoring),
            risk: RiskManager::new(app.risk.clone()),
            commissions: CommissionModel::new(app.commissions.clone()),
            feature_engine: FeatureEngine::new(),
            regime: RegimeDetector::new(),
            predictor: TrendPredictor::default(),
            historical_data: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Replace the candle strategies
    pub fn with_strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = strategies;
        self
    }

    /// Load daily candles (sorted oldest first on load)
    pub fn load_data(&mut self, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        self.historical_data = candles;
    }

    /// Score the series up to and including its last bar
    fn analyze(&self, window: &[Candle]) -> Option<Analysis> {
        let last = window.last()?;
        let features = self.feature_engine.compute(window)?;
        let now = to_local(Utc.timestamp_millis_opt(last.close_time).single()?);
        let ctx = StrategyContext::new(&self.symbol, window).at(now);
        let strategy_scores = self.strategies.evaluate_all(&ctx);
        let regime = self.regime.detect(window);
        let prediction = self.predictor.predict(window);
        let inputs = ScoreInputs {
            features: &features,
            prediction: prediction.as_ref(),
            sentiment: None,
            strategy_scores: &strategy_scores,
            regime: &regime,
            macro_score: None,
        };
        Some(self.scorer.score(
            &self.symbol,
            last.close,
            &inputs,
            self.config.thresholds,
            &HashMap::new(),
        ))
    }

    fn enter(&mut self, signal: &Analysis, bar: &Candle) -> Option<OpenTrade> {
        let entry = bar.open;
        let stop = self.risk.stop_loss(entry, signal.atr);
        let take_profit = self.risk.take_profit(entry, stop);
        let mut quantity = self
            .risk
            .position_size(self.cash, entry, stop, signal.size_multiplier);
        // never spend more cash than we have, commission included
        while quantity > 0
            && entry * quantity as f64 + self.commissions.commission(&self.symbol, entry, quantity) > self.cash
        {
            quantity -= 1;
        }
        if quantity == 0 {
            debug!(symbol = %self.symbol, ts = bar.open_time, "Backtest entry skipped: size 0");
            return None;
        }
        let check = self
            .commissions
            .should_execute(&self.symbol, entry, take_profit, quantity);
        if !check.should_execute {
            debug!(symbol = %self.symbol, ts = bar.open_time, reason = %check.reason, "Backtest entry skipped: commissions");
            return None;
        }
        let commission = self.commissions.commission(&self.symbol, entry, quantity);
        self.cash -= entry * quantity as f64 + commission;
        Some(OpenTrade {
            entry_ts: bar.open_time,
            quantity,
            entry_price: entry,
            stop_loss: stop,
            take_profit,
            entry_commission: commission,
            score: signal.score,
            strategies: signal.supporting_strategies(),
        })
    }

    fn exit(&mut self, open: OpenTrade, price: f64, ts: i64, reason: ExitReason) {
        let commission = self.commissions.commission(&self.symbol, price, open.quantity);
        self.cash += price * open.quantity as f64 - commission;
        let fees = open.entry_commission + commission;
        let pnl = (price - open.entry_price) * open.quantity as f64 - fees;
        let notional = open.entry_price * open.quantity as f64;
        let trade = BacktestTrade {
            entry_ts: open.entry_ts,
            exit_ts: ts,
            symbol: self.symbol.clone(),
            quantity: open.quantity,
            entry_price: open.entry_price,
            exit_price: price,
            score: open.score,
            pnl,
            pnl_pct: if notional > 0.0 { pnl / notional } else { 0.0 },
            fees,
            exit_reason: reason,
            is_win: pnl > 0.0,
            strategies: open.strategies,
        };
        debug!(
            symbol = %trade.symbol,
            reason = %reason,
            entry = trade.entry_price,
            exit = trade.exit_price,
            pnl = trade.pnl,
            "Backtest trade closed"
        );
        self.trades.push(trade);
    }

    /// Run backtest
    pub fn run(&mut self) -> BacktestMetrics {
        self.trades.clear();
        self.equity_curve.clear();
        self.cash = self.config.initial_capital;

        let candles = std::mem::take(&mut self.historical_data);
        let warmup = self.config.warmup_bars.max(2);
        if candles.len() <= warmup {
            self.historical_data = candles;
            return BacktestMetrics {
                final_equity: self.cash,
                ..Default::default()
            };
        }

        let mut position: Option<OpenTrade> = None;
        let mut pending: Option<Pending> = None;

        for i in warmup..candles.len() {
            let bar = &candles[i];

            // orders decided on the previous close fill at this open
            match pending.take() {
                Some(Pending::Enter(signal)) if position.is_none() => {
                    position = self.enter(&signal, bar);
                }
                Some(Pending::Exit) => {
                    if let Some(open) = position.take() {
                        self.exit(open, bar.open, bar.open_time, ExitReason::Signal);
                    }
                }
                _ => {}
            }

            // intrabar stop before take profit; gaps fill at the open
            if let Some(open) = position.take() {
                if bar.low <= open.stop_loss {
                    let price = bar.open.min(open.stop_loss);
                    self.exit(open, price, bar.open_time, ExitReason::StopLoss);
                } else if bar.high >= open.take_profit {
                    let price = bar.open.max(open.take_profit);
                    self.exit(open, price, bar.open_time, ExitReason::TakeProfit);
                } else {
                    position = Some(open);
                }
            }

            if i + 1 < candles.len() {
                if let Some(analysis) = self.analyze(&candles[..=i]) {
                    pending = match (analysis.action, position.is_some()) {
                        (Action::Buy, false) => Some(Pending::Enter(analysis)),
                        (Action::Sell, true) => Some(Pending::Exit),
                        _ => None,
                    };
                }
            }

            let marked = position
                .as_ref()
                .map(|p| p.quantity as f64 * bar.close)
                .unwrap_or(0.0);
            self.equity_curve.push(self.cash + marked);
        }

        if let Some(open) = position.take() {
            if let Some(last) = candles.last() {
                self.exit(open, last.close, last.close_time, ExitReason::EndOfData);
                if let Some(equity) = self.equity_curve.last_mut() {
                    *equity = self.cash;
                }
            }
        }

        self.historical_data = candles;
        let metrics = self.calculate_metrics();
        info!(
            symbol = %self.symbol,
            trades = metrics.total_trades,
            win_rate = %format!("{:.1}%", metrics.win_rate * 100.0),
            pnl = %format!("{:+.2}", metrics.total_pnl),
            max_dd = %format!("{:.1}%", metrics.max_drawdown * 100.0),
            "📈 Backtest completado"
        );
        metrics
    }

    /// Calculate performance metrics from trades
    pub fn calculate_metrics(&self) -> BacktestMetrics {
        let final_equity = self.equity_curve.last().copied().unwrap_or(self.cash);
        if self.trades.is_empty() {
            return BacktestMetrics {
                final_equity,
                max_drawdown: max_drawdown(self.config.initial_capital, &self.equity_curve),
                ..Default::default()
            };
        }

        let wins: Vec<&BacktestTrade> = self.trades.iter().filter(|t| t.is_win).collect();
        let losses: Vec<&BacktestTrade> = self.trades.iter().filter(|t| !t.is_win).collect();

        let total_trades = self.trades.len();
        let win_count = wins.len();
        let loss_count = losses.len();
        let win_rate = win_count as f64 / total_trades as f64;

        let gross_profit: f64 = wins.iter().map(|t| t.pnl).sum();
        let gross_loss: f64 = losses.iter().map(|t| t.pnl.abs()).sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if win_count > 0 {
            gross_profit / win_count as f64
        } else {
            0.0
        };
        let avg_loss = if loss_count > 0 {
            gross_loss / loss_count as f64
        } else {
            0.0
        };

        let total_pnl: f64 = self.trades.iter().map(|t| t.pnl).sum();
        let expectancy = total_pnl / total_trades as f64;

        let largest_win = wins.iter().map(|t| t.pnl).fold(0.0, f64::max);
        let largest_loss = losses.iter().map(|t| t.pnl.abs()).fold(0.0, f64::max);

        let returns: Vec<f64> = self.trades.iter().map(|t| t.pnl_pct).collect();
        let avg_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance: f64 = returns
            .iter()
            .map(|r| (r - avg_return).powi(2))
            .sum::<f64>()
            / returns.len() as f64;
        let std_dev = variance.sqrt();
        let sharpe_ratio = if std_dev > 0.0 { avg_return / std_dev } else { 0.0 };

        BacktestMetrics {
            total_trades,
            wins: win_count,
            losses: loss_count,
            win_rate,
            profit_factor,
            max_drawdown: max_drawdown(self.config.initial_capital, &self.equity_curve),
            sharpe_ratio,
            avg_win,
            avg_loss,
            expectancy,
            largest_win,
            largest_loss,
            total_pnl,
            final_equity,
        }
    }

    pub fn report(&self) -> BacktestReport {
        let date = |ts: Option<i64>| {
            ts.and_then(|t| Utc.timestamp_millis_opt(t).single())
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };
        BacktestReport {
            symbol: self.symbol.clone(),
            bars: self.historical_data.len(),
            period_start: date(self.historical_data.first().map(|c| c.open_time)),
            period_end: date(self.historical_data.last().map(|c| c.open_time)),
            initial_capital: self.config.initial_capital,
            buy_threshold: self.config.thresholds.buy,
            sell_threshold: self.config.thresholds.sell,
            strategies: self.strategies.names().iter().map(|s| s.to_string()).collect(),
            metrics: self.calculate_metrics(),
            trades: self.trades.clone(),
        }
    }

    pub fn get_trades(&self) -> &[BacktestTrade] {
        &self.trades
    }

    /// Equity marked at each close after warmup
    pub fn get_equity_curve(&self) -> &[f64] {
        &self.equity_curve
    }

    /// Export trades to CSV format (header always present)
    pub fn export_trades_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        writer.write_record(TRADE_CSV_HEADER)?;
        for trade in &self.trades {
            writer
                .serialize(TradeRow::from(trade))
                .with_context(|| format!("Failed to write trade {} {}", trade.symbol, trade.entry_ts))?;
        }
        let bytes = writer.into_inner().context("Failed to flush trades CSV")?;
        Ok(String::from_utf8(bytes)?)
    }
}

const TRADE_CSV_HEADER: [&str; 12] = [
    "entry_ts",
    "exit_ts",
    "symbol",
    "quantity",
    "entry_price",
    "exit_price",
    "score",
    "pnl",
    "pnl_pct",
    "fees",
    "exit_reason",
    "is_win",
];

/// One CSV line per trade, in `TRADE_CSV_HEADER` order
#[derive(Serialize)]
struct TradeRow<'a> {
    entry_ts: i64,
    exit_ts: i64,
    symbol: &'a str,
    quantity: u64,
    entry_price: f64,
    exit_price: f64,
    score: i32,
    pnl: f64,
    pnl_pct: f64,
    fees: f64,
    exit_reason: String,
    is_win: bool,
}

impl<'a> From<&'a BacktestTrade> for TradeRow<'a> {
    fn from(t: &'a BacktestTrade) -> Self {
        Self {
            entry_ts: t.entry_ts,
            exit_ts: t.exit_ts,
            symbol: &t.symbol,
            quantity: t.quantity,
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            score: t.score,
            pnl: t.pnl,
            pnl_pct: t.pnl_pct,
            fees: t.fees,
            exit_reason: t.exit_reason.to_string(),
            is_win: t.is_win,
        }
    }
}

/// Largest peak-to-trough fall as a fraction of the peak
fn max_drawdown(initial: f64, curve: &[f64]) -> f64 {
    let mut peak = initial;
    let mut max_dd: f64 = 0.0;
    for &equity in curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::series;
    use crate::strategies::Strategy;
    use crate::types::StrategyScore;

    /// Fires at fixed series lengths
    struct Scripted {
        buy_at: usize,
        sell_at: Option<usize>,
    }

    impl Strategy for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyScore {
            let mut s = StrategyScore::new("scripted");
            let n = ctx.daily.len();
            if n == self.buy_at {
                s.score = 200;
            } else if Some(n) == self.sell_at {
                s.score = -200;
            }
            s
        }
    }

    fn backtester(buy_at: usize, sell_at: Option<usize>) -> Backtester {
        let mut app = AppConfig::default();
        app.scoring.meta_learner_enabled = false;
        let config = BacktestConfig {
            thresholds: Thresholds { buy: 150, sell: -150 },
            ..Default::default()
        };
        Backtester::new("GGAL", config, &app)
            .with_strategies(StrategySet::empty().with_strategy(Box::new(Scripted { buy_at, sell_at })))
    }

    #[test]
    fn test_empty_backtest() {
        let mut bt = backtester(70, None);
        let metrics = bt.run();
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.final_equity, 100_000.0);
        assert_eq!(
            bt.export_trades_csv().unwrap(),
            "entry_ts,exit_ts,symbol,quantity,entry_price,exit_price,score,pnl,pnl_pct,fees,exit_reason,is_win\n"
        );
    }

    #[test]
    fn test_signal_round_trip_fills_at_next_open() {
        let candles = series(120, |i| 100.0 + i as f64 * 0.1);
        let mut bt = backtester(70, Some(90));
        bt.load_data(candles.clone());
        let metrics = bt.run();

        assert_eq!(metrics.total_trades, 1);
        let t = &bt.get_trades()[0];
        assert_eq!(t.exit_reason, ExitReason::Signal);
        // signal on bar 69's close, filled at bar 70's open
        assert_eq!(t.entry_ts, candles[70].open_time);
        assert!((t.entry_price - candles[70].open).abs() < 1e-9);
        assert!((t.exit_price - candles[90].open).abs() < 1e-9);
        assert!(t.fees > 0.0);
        let gross = (t.exit_price - t.entry_price) * t.quantity as f64;
        assert!((t.pnl - (gross - t.fees)).abs() < 1e-6);
        assert!(t.strategies.contains(&"scripted".to_string()));
        assert!((metrics.final_equity - (100_000.0 + t.pnl)).abs() < 1e-6);
    }

    #[test]
    fn test_trades_csv_reads_back() {
        let mut bt = backtester(70, Some(90));
        bt.load_data(series(120, |i| 100.0 + i as f64 * 0.1));
        bt.run();
        let t = bt.get_trades()[0].clone();

        let csv = bt.export_trades_csv().unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        assert_eq!(reader.headers().unwrap().len(), 12);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][2], "GGAL");
        assert_eq!(rows[0][3].parse::<u64>().unwrap(), t.quantity);
        assert!((rows[0][7].parse::<f64>().unwrap() - t.pnl).abs() < 1e-9);
        assert_eq!(&rows[0][10], "SIGNAL");
        assert_eq!(rows[0][11].parse::<bool>().unwrap(), t.is_win);
    }

    #[test]
    fn test_gap_down_exits_at_stop_or_open() {
        let mut candles = series(100, |_| 100.0);
        for c in candles.iter_mut().skip(80) {
            c.open = 70.0;
            c.high = 71.0;
            c.low = 69.0;
            c.close = 70.0;
        }
        let mut bt = backtester(75, None);
        bt.load_data(candles);
        let metrics = bt.run();

        assert_eq!(metrics.total_trades, 1);
        let t = &bt.get_trades()[0];
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
        assert_eq!(t.exit_price, 70.0);
        assert!(!t.is_win);
        assert_eq!(metrics.losses, 1);
        assert!(metrics.max_drawdown > 0.0);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn test_open_position_closed_at_end_of_data() {
        let candles = series(100, |i| 100.0 + i as f64 * 0.05);
        let mut bt = backtester(95, None);
        bt.load_data(candles.clone());
        bt.run();
        let t = &bt.get_trades()[0];
        assert_eq!(t.exit_reason, ExitReason::EndOfData);
        assert_eq!(t.exit_price, candles[99].close);
        assert_eq!(*bt.get_equity_curve().last().unwrap(), bt.calculate_metrics().final_equity);
    }

    #[test]
    fn test_report_yaml() {
        let mut bt = backtester(70, Some(90));
        bt.load_data(series(120, |i| 100.0 + i as f64 * 0.1));
        bt.run();
        let yaml = bt.report().to_yaml().unwrap();
        assert!(yaml.contains("symbol: GGAL"));
        assert!(yaml.contains("exit_reason: Signal"));
        assert!(yaml.contains("total_trades: 1"));
    }

    #[test]
    fn test_max_drawdown() {
        assert_eq!(max_drawdown(100.0, &[]), 0.0);
        let dd = max_drawdown(100.0, &[110.0, 88.0, 120.0]);
        assert!((dd - 0.2).abs() < 1e-12);
    }
}
