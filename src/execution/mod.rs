//! Order execution
//!
//! The bot talks to a single `Executor`; paper and live modes differ only
//! in which implementation is plugged in.

pub mod live;
pub mod paper;

pub use live::IolExecutor;
pub use paper::{PaperStats, PaperTradingEngine};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::types::{ClosedTrade, ExitReason, OrderResult, Position, TradePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Paper => write!(f, "PAPER"),
            ExecutionMode::Live => write!(f, "LIVE"),
        }
    }
}

/// Result of a sell: the broker answer plus the closed round trip when the
/// executor knew the entry
#[derive(Debug, Clone)]
pub struct SellOutcome {
    pub order: OrderResult,
    pub closed: Option<ClosedTrade>,
}

#[async_trait]
pub trait Executor: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    /// Cash available for new entries (ARS)
    async fn available_balance(&self) -> Result<f64>;

    async fn positions(&self) -> Result<Vec<Position>>;

    async fn buy(&self, symbol: &str, quantity: u64, price: f64, plan: &TradePlan) -> Result<OrderResult>;

    async fn sell(&self, symbol: &str, quantity: u64, price: f64, reason: ExitReason) -> Result<SellOutcome>;

    /// Mark an open position to the latest price
    async fn mark_price(&self, _symbol: &str, _price: f64) -> Result<()> {
        Ok(())
    }

    /// One-line state summary for logs and Telegram
    async fn summary(&self) -> Result<String>;
}
