//! CSV Persistence Module
//!
//! Daily journals of analyses, orders, closed-trade results and balance
//! snapshots. One file per journal per local trading day, e.g.
//! `data/trades/trades_2026-03-02.csv`.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{debug, info};

use crate::execution::ExecutionMode;
use crate::scoring::Analysis;
use crate::types::{local_now, ClosedTrade, OrderResult, OrderSide, Position};

/// One row per analyzed symbol per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub timestamp: i64,
    pub symbol: String,
    pub price: f64,
    pub score: i32,
    pub action: String,
    pub confidence: String,
    pub regime: String,
    pub buy_threshold: i32,
    pub sell_threshold: i32,
    pub rsi: Option<f64>,
    pub macd_hist: Option<f64>,
    pub adx: Option<f64>,
    pub atr_pct: Option<f64>,
    pub relative_volume: Option<f64>,
    /// `name:score` pairs separated by `|`
    pub strategy_scores: String,
    pub buy_factors: String,
    pub sell_factors: String,
    pub blocked_by: Option<String>,
    pub tag: String,
}

impl AnalysisRecord {
    pub fn from_analysis(a: &Analysis, tag: &str) -> Self {
        Self {
            timestamp: a.timestamp.timestamp_millis(),
            symbol: a.symbol.clone(),
            price: a.price,
            score: a.score,
            action: a.action.to_string(),
            confidence: a.confidence.to_string(),
            regime: a.regime.to_string(),
            buy_threshold: a.thresholds.buy,
            sell_threshold: a.thresholds.sell,
            rsi: a.features.rsi,
            macd_hist: a.features.macd_hist,
            adx: a.features.adx,
            atr_pct: a.features.atr_pct,
            relative_volume: a.features.relative_volume,
            strategy_scores: a
                .strategy_scores
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect::<Vec<_>>()
                .join("|"),
            buy_factors: a.buy_factors.join("; "),
            sell_factors: a.sell_factors.join("; "),
            blocked_by: a.blocked_by.clone(),
            tag: tag.to_string(),
        }
    }
}

/// Order journal. `pnl` is only set on the leg that closes a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: i64,
    pub symbol: String,
    pub side: String,
    pub quantity: u64,
    pub price: f64,
    pub commission: f64,
    pub operation_id: Option<String>,
    pub mode: String,
    pub score: Option<i32>,
    pub exit_reason: Option<String>,
    pub pnl: Option<f64>,
}

impl TradeRecord {
    pub fn from_order(
        symbol: &str,
        side: OrderSide,
        order: &OrderResult,
        mode: ExecutionMode,
        score: Option<i32>,
    ) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            symbol: symbol.to_string(),
            side: side.to_string(),
            quantity: order.quantity,
            price: order.fill_price,
            commission: order.commission,
            operation_id: order.operation_id.clone(),
            mode: mode.to_string(),
            score,
            exit_reason: None,
            pnl: None,
        }
    }

    pub fn with_close(mut self, trade: &ClosedTrade) -> Self {
        self.exit_reason = Some(trade.reason.to_string());
        self.pnl = Some(trade.pnl);
        self
    }
}

/// Win/Loss record for internal winrate tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinLossRecord {
    pub timestamp: i64,
    pub symbol: String,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,
    /// "WIN" or "LOSS"
    pub internal_result: String,
    /// STOP_LOSS, TAKE_PROFIT, TRAILING_STOP, SIGNAL, MANUAL
    pub exit_reason: String,
    pub holding_minutes: i64,
    /// Strategies credited with the entry, `|`-separated
    pub strategies: String,
}

impl From<&ClosedTrade> for WinLossRecord {
    fn from(t: &ClosedTrade) -> Self {
        Self {
            timestamp: t.closed_at,
            symbol: t.symbol.clone(),
            quantity: t.quantity,
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            pnl: t.pnl,
            pnl_pct: t.pnl_pct,
            fees: t.fees,
            internal_result: classify_trade_result(t.pnl).to_string(),
            exit_reason: t.reason.to_string(),
            holding_minutes: (t.closed_at - t.opened_at).max(0) / 60_000,
            strategies: t.supporting_strategies.join("|"),
        }
    }
}

/// Balance snapshot record for tracking equity over time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub timestamp: i64,
    pub mode: String,
    pub cash: f64,
    pub positions_value: f64,
    pub unrealized_pnl: f64,
    pub total_equity: f64,
    pub open_positions: usize,
}

impl BalanceRecord {
    pub fn snapshot(mode: ExecutionMode, cash: f64, positions: &[Position]) -> Self {
        let positions_value: f64 = positions.iter().map(|p| p.market_value()).sum();
        Self {
            timestamp: Utc::now().timestamp_millis(),
            mode: mode.to_string(),
            cash,
            positions_value,
            unrealized_pnl: positions.iter().map(|p| p.unrealized_pnl()).sum(),
            total_equity: cash + positions_value,
            open_positions: positions.len(),
        }
    }
}

/// Performance metrics over closed trades
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub timestamp: i64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub avg_pnl: f64,
}

/// Classify a closed trade as WIN or LOSS based on PnL
pub fn classify_trade_result(pnl: f64) -> &'static str {
    if pnl > 0.0 {
        "WIN"
    } else {
        "LOSS"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Journal {
    Analysis,
    Trades,
    WinLoss,
    Balance,
}

impl Journal {
    const ALL: [Journal; 4] = [Journal::Analysis, Journal::Trades, Journal::WinLoss, Journal::Balance];

    fn dir(&self) -> &'static str {
        match self {
            Journal::Analysis => "analysis",
            Journal::Trades => "trades",
            Journal::WinLoss => "winloss",
            Journal::Balance => "balance",
        }
    }

    fn file_name(&self, day: &DateTime<FixedOffset>) -> String {
        format!("{}_{}.csv", self.dir(), day.format("%Y-%m-%d"))
    }
}

struct DatedWriter {
    date: String,
    writer: csv::Writer<fs::File>,
}

/// CSV persistence manager
pub struct CsvPersistence {
    data_dir: PathBuf,
    writers: AsyncRwLock<HashMap<Journal, DatedWriter>>,
}

impl CsvPersistence {
    /// Create a new CSV persistence manager
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        for journal in Journal::ALL {
            fs::create_dir_all(data_dir.join(journal.dir()))
                .with_context(|| format!("Failed to create {} directory", journal.dir()))?;
        }
        info!(data_dir = %data_dir.display(), "💾 CSV journals ready");
        Ok(Self {
            data_dir,
            writers: AsyncRwLock::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn create_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
        let file_has_data = path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

        Ok(WriterBuilder::new().has_headers(!file_has_data).from_writer(file))
    }

    /// Append to today's file, rolling over when the local date changes
    async fn append<T: Serialize>(&self, journal: Journal, record: &T) -> Result<()> {
        let now = local_now();
        let date = now.format("%Y-%m-%d").to_string();
        let mut writers = self.writers.write().await;

        let stale = writers.get(&journal).map(|w| w.date != date).unwrap_or(true);
        if stale {
            let path = self.data_dir.join(journal.dir()).join(journal.file_name(&now));
            debug!(path = %path.display(), "📝 Opening journal");
            writers.insert(
                journal,
                DatedWriter {
                    date,
                    writer: Self::create_writer(&path)?,
                },
            );
        }
        if let Some(w) = writers.get_mut(&journal) {
            w.writer
                .serialize(record)
                .with_context(|| format!("Failed to write {} record", journal.dir()))?;
            w.writer
                .flush()
                .with_context(|| format!("Failed to flush {} writer", journal.dir()))?;
        }
        Ok(())
    }

    pub async fn save_analysis(&self, record: AnalysisRecord) -> Result<()> {
        self.append(Journal::Analysis, &record).await
    }

    pub async fn save_trade(&self, record: TradeRecord) -> Result<()> {
        self.append(Journal::Trades, &record).await
    }

    pub async fn save_winloss(&self, record: WinLossRecord) -> Result<()> {
        self.append(Journal::WinLoss, &record).await
    }

    pub async fn save_balance(&self, record: BalanceRecord) -> Result<()> {
        self.append(Journal::Balance, &record).await
    }

    fn load<T: DeserializeOwned>(&self, journal: Journal, days: u32) -> Result<Vec<T>> {
        let mut records = Vec::new();
        let today = local_now();
        for i in 0..days {
            let day = today - chrono::Duration::days(i as i64);
            let path = self.data_dir.join(journal.dir()).join(journal.file_name(&day));
            if !path.exists() {
                continue;
            }
            let file = fs::File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
            for result in reader.deserialize() {
                let record: T = result.with_context(|| format!("Failed to deserialize {} record", journal.dir()))?;
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Order journal of the last `days` local days, oldest first
    pub fn load_trade_history(&self, days: u32) -> Result<Vec<TradeRecord>> {
        let mut records: Vec<TradeRecord> = self.load(Journal::Trades, days)?;
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    pub fn load_winloss_history(&self, days: u32) -> Result<Vec<WinLossRecord>> {
        let mut records: Vec<WinLossRecord> = self.load(Journal::WinLoss, days)?;
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    pub fn load_analysis_history(&self, symbol: &str, days: u32) -> Result<Vec<AnalysisRecord>> {
        let mut records: Vec<AnalysisRecord> = self
            .load::<AnalysisRecord>(Journal::Analysis, days)?
            .into_iter()
            .filter(|r| r.symbol == symbol)
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Calculate performance metrics from the closing legs of the order journal
    pub fn calculate_performance(&self, days: u32) -> Result<PerformanceRecord> {
        let pnls: Vec<f64> = self
            .load_trade_history(days)?
            .iter()
            .filter_map(|t| t.pnl)
            .collect();

        let total_trades = pnls.len() as u64;
        let winning_trades = pnls.iter().filter(|p| **p > 0.0).count() as u64;
        let total_pnl: f64 = pnls.iter().sum();
        let (win_rate, avg_pnl) = if total_trades > 0 {
            (
                winning_trades as f64 / total_trades as f64,
                total_pnl / total_trades as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Ok(PerformanceRecord {
            timestamp: Utc::now().timestamp(),
            total_trades,
            winning_trades,
            total_pnl,
            win_rate,
            avg_pnl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExitReason;

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("iolbot_persistence_{}_{}", test_name, uuid::Uuid::new_v4()))
    }

    fn closed(symbol: &str, pnl: f64) -> ClosedTrade {
        ClosedTrade {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            quantity: 10,
            entry_price: 1000.0,
            exit_price: 1000.0 + pnl / 10.0,
            pnl,
            pnl_pct: pnl / 10_000.0,
            fees: 120.0,
            reason: if pnl > 0.0 { ExitReason::TakeProfit } else { ExitReason::StopLoss },
            opened_at: 0,
            closed_at: 3_600_000,
            supporting_strategies: vec!["technical".to_string()],
        }
    }

    fn sell_record(symbol: &str, pnl: f64) -> TradeRecord {
        let order = OrderResult {
            success: true,
            operation_id: Some("1".to_string()),
            message: String::new(),
            fill_price: 1000.0,
            quantity: 10,
            commission: 60.0,
        };
        TradeRecord::from_order(symbol, OrderSide::Sell, &order, ExecutionMode::Paper, None)
            .with_close(&closed(symbol, pnl))
    }

    #[test]
    fn classify_breakeven_as_loss() {
        assert_eq!(classify_trade_result(10.0), "WIN");
        assert_eq!(classify_trade_result(0.0), "LOSS");
        assert_eq!(classify_trade_result(-5.0), "LOSS");
    }

    #[test]
    fn winloss_from_closed_trade() {
        let r = WinLossRecord::from(&closed("GGAL", 500.0));
        assert_eq!(r.internal_result, "WIN");
        assert_eq!(r.exit_reason, "TAKE_PROFIT");
        assert_eq!(r.holding_minutes, 60);
    }

    #[tokio::test]
    async fn trades_roundtrip_and_performance() {
        let dir = temp_data_dir("perf");
        let p = CsvPersistence::new(&dir).unwrap();

        let buy = TradeRecord::from_order(
            "GGAL",
            OrderSide::Buy,
            &OrderResult {
                success: true,
                fill_price: 1000.0,
                quantity: 10,
                ..Default::default()
            },
            ExecutionMode::Paper,
            Some(40),
        );
        p.save_trade(buy).await.unwrap();
        p.save_trade(sell_record("GGAL", 300.0)).await.unwrap();
        p.save_trade(sell_record("YPF", -100.0)).await.unwrap();

        let history = p.load_trade_history(1).unwrap();
        assert_eq!(history.len(), 3);

        let perf = p.calculate_performance(7).unwrap();
        assert_eq!(perf.total_trades, 2);
        assert_eq!(perf.winning_trades, 1);
        assert!((perf.total_pnl - 200.0).abs() < 1e-9);
        assert!((perf.win_rate - 0.5).abs() < 1e-9);
        assert!((perf.avg_pnl - 100.0).abs() < 1e-9);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn header_written_once_across_reopen() {
        let dir = temp_data_dir("header");
        {
            let p = CsvPersistence::new(&dir).unwrap();
            p.save_winloss(WinLossRecord::from(&closed("GGAL", 10.0))).await.unwrap();
        }
        let p = CsvPersistence::new(&dir).unwrap();
        p.save_winloss(WinLossRecord::from(&closed("YPF", -10.0))).await.unwrap();

        let file = dir.join("winloss").join(Journal::WinLoss.file_name(&local_now()));
        let content = fs::read_to_string(file).unwrap();
        assert_eq!(content.matches("internal_result").count(), 1);
        assert_eq!(p.load_winloss_history(1).unwrap().len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_history_has_zero_performance() {
        let dir = temp_data_dir("empty");
        let p = CsvPersistence::new(&dir).unwrap();
        let perf = p.calculate_performance(30).unwrap();
        assert_eq!(perf.total_trades, 0);
        assert_eq!(perf.win_rate, 0.0);
        let _ = fs::remove_dir_all(&dir);
    }
}
