//! Live execution through the IOL API
//!
//! IOL knows holdings but not our stop/take-profit plan, so every entry's plan
//! is kept in `{data_dir}/open_plans.json` and merged with the portfolio.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use super::{ExecutionMode, Executor, SellOutcome};
use crate::error::IolError;
use crate::iol::types::Holding;
use crate::iol::IolClient;
use crate::risk::CommissionModel;
use crate::types::{ClosedTrade, ExitReason, OrderResult, OrderSide, Position, TradePlan};

/// Entry details IOL does not keep for us
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPlan {
    pub entry_price: f64,
    pub quantity: u64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_commission: f64,
    pub score: i32,
    pub supporting_strategies: Vec<String>,
    pub opened_at: i64,
}

pub struct IolExecutor {
    client: Arc<IolClient>,
    commissions: CommissionModel,
    plans: RwLock<HashMap<String, OpenPlan>>,
    plans_file: Option<PathBuf>,
}

impl IolExecutor {
    pub fn new(client: Arc<IolClient>, commissions: CommissionModel) -> Self {
        Self {
            client,
            commissions,
            plans: RwLock::new(HashMap::new()),
            plans_file: None,
        }
    }

    /// Load (and later persist) plans from `{data_dir}/open_plans.json`
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Result<Self> {
        let path = data_dir.as_ref().join("open_plans.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<HashMap<String, OpenPlan>>(&raw) {
                Ok(plans) => {
                    info!(path = %path.display(), plans = plans.len(), "💾 [LIVE] Planes abiertos cargados");
                    self.plans = RwLock::new(plans);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "⚠️ [LIVE] Planes corruptos, se ignoran"),
            }
        }
        self.plans_file = Some(path);
        Ok(self)
    }

    fn save_plans(&self) -> Result<()> {
        let Some(path) = &self.plans_file else {
            return Ok(());
        };
        let plans = self.plans.read().map_err(|_| anyhow!("plans lock poisoned"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&*plans)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn plan(&self, symbol: &str) -> Option<OpenPlan> {
        self.plans.read().ok()?.get(symbol).cloned()
    }

    fn plans_snapshot(&self) -> HashMap<String, OpenPlan> {
        self.plans.read().map(|p| p.clone()).unwrap_or_default()
    }

    async fn send(&self, symbol: &str, quantity: u64, price: f64, side: OrderSide) -> Result<OrderResult> {
        match self.client.place_order(symbol, quantity, price, side, None).await {
            Ok(result) => Ok(result),
            Err(IolError::OrderRejected(message)) => {
                error!(symbol, side = %side, %message, "❌ [LIVE] Orden rechazada");
                Ok(OrderResult {
                    success: false,
                    message,
                    ..Default::default()
                })
            }
            Err(e) => Err(e).with_context(|| format!("Order {} {} failed", side, symbol)),
        }
    }
}

/// Portfolio holdings enriched with the locally stored plans. A plan without
/// a holding is an order sent but not settled yet; it still counts as a position.
pub fn merge_holdings(holdings: &[Holding], plans: &HashMap<String, OpenPlan>) -> Vec<Position> {
    let mut positions: Vec<Position> = holdings
        .iter()
        .map(|h| {
            let plan = plans.get(&h.symbol);
            Position {
                symbol: h.symbol.clone(),
                quantity: h.quantity,
                entry_price: plan.map(|p| p.entry_price).unwrap_or(h.average_price),
                current_price: h.last_price,
                stop_loss: plan.map(|p| p.stop_loss).unwrap_or(0.0),
                take_profit: plan.map(|p| p.take_profit).unwrap_or(0.0),
                entry_commission: plan.map(|p| p.entry_commission).unwrap_or(0.0),
                opened_at: plan.map(|p| p.opened_at).unwrap_or(0),
                score: plan.map(|p| p.score).unwrap_or(0),
                supporting_strategies: plan.map(|p| p.supporting_strategies.clone()).unwrap_or_default(),
            }
        })
        .collect();

    let mut pending: Vec<(&String, &OpenPlan)> = plans
        .iter()
        .filter(|(symbol, _)| !holdings.iter().any(|h| &h.symbol == *symbol))
        .collect();
    pending.sort_by(|a, b| a.0.cmp(b.0));
    for (symbol, plan) in pending {
        positions.push(Position {
            symbol: symbol.clone(),
            quantity: plan.quantity,
            entry_price: plan.entry_price,
            current_price: plan.entry_price,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            entry_commission: plan.entry_commission,
            opened_at: plan.opened_at,
            score: plan.score,
            supporting_strategies: plan.supporting_strategies.clone(),
        });
    }
    positions
}

/// Estimated round trip for a sell at `price` against a stored plan
pub fn estimate_closed_trade(
    commissions: &CommissionModel,
    symbol: &str,
    plan: &OpenPlan,
    quantity: u64,
    price: f64,
    reason: ExitReason,
) -> ClosedTrade {
    let qty = quantity;
    let exit_commission = commissions.commission(symbol, price, qty);
    let entry_commission = if plan.quantity > 0 {
        plan.entry_commission * (qty as f64 / plan.quantity as f64).min(1.0)
    } else {
        0.0
    };
    let fees = entry_commission + exit_commission;
    let pnl = (price - plan.entry_price) * qty as f64 - fees;
    let invested = plan.entry_price * qty as f64;
    ClosedTrade {
        id: uuid::Uuid::new_v4().to_string(),
        symbol: symbol.to_string(),
        quantity: qty,
        entry_price: plan.entry_price,
        exit_price: price,
        pnl,
        pnl_pct: if invested > 0.0 { pnl / invested } else { 0.0 },
        fees,
        reason,
        opened_at: plan.opened_at,
        closed_at: Utc::now().timestamp_millis(),
        supporting_strategies: plan.supporting_strategies.clone(),
    }
}

#[async_trait]
impl Executor for IolExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Live
    }

    async fn available_balance(&self) -> Result<f64> {
        self.client
            .get_available_balance()
            .await
            .context("Failed to fetch IOL balance")
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let holdings = self
            .client
            .get_portfolio(None)
            .await
            .context("Failed to fetch IOL portfolio")?;
        Ok(merge_holdings(&holdings, &self.plans_snapshot()))
    }

    async fn buy(&self, symbol: &str, quantity: u64, price: f64, plan: &TradePlan) -> Result<OrderResult> {
        let mut result = self.send(symbol, quantity, price, OrderSide::Buy).await?;
        if !result.success {
            return Ok(result);
        }
        result.commission = self.commissions.commission(symbol, price, quantity);
        {
            let mut plans = self.plans.write().map_err(|_| anyhow!("plans lock poisoned"))?;
            plans.insert(
                symbol.to_string(),
                OpenPlan {
                    entry_price: price,
                    quantity,
                    stop_loss: plan.stop_loss,
                    take_profit: plan.take_profit,
                    entry_commission: result.commission,
                    score: plan.score,
                    supporting_strategies: plan.supporting_strategies.clone(),
                    opened_at: Utc::now().timestamp_millis(),
                },
            );
        }
        // the order is already at IOL: a failed write must not hide the fill
        if let Err(e) = self.save_plans() {
            warn!(symbol, error = %e, "⚠️ [LIVE] No se pudieron guardar los planes abiertos");
        }
        info!(
            symbol,
            quantity,
            price = %format!("${:.2}", price),
            operation_id = ?result.operation_id,
            "📥 [LIVE] Compra enviada"
        );
        Ok(result)
    }

    async fn sell(&self, symbol: &str, quantity: u64, price: f64, reason: ExitReason) -> Result<SellOutcome> {
        let mut order = self.send(symbol, quantity, price, OrderSide::Sell).await?;
        if !order.success {
            return Ok(SellOutcome { order, closed: None });
        }
        order.commission = self.commissions.commission(symbol, price, quantity);

        let closed = self
            .plan(symbol)
            .map(|plan| estimate_closed_trade(&self.commissions, symbol, &plan, quantity, price, reason));
        {
            let mut plans = self.plans.write().map_err(|_| anyhow!("plans lock poisoned"))?;
            let exhausted = match plans.get_mut(symbol) {
                Some(p) if quantity < p.quantity => {
                    let share = quantity as f64 / p.quantity as f64;
                    p.entry_commission -= p.entry_commission * share;
                    p.quantity -= quantity;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if exhausted {
                plans.remove(symbol);
            }
        }
        if let Err(e) = self.save_plans() {
            warn!(symbol, error = %e, "⚠️ [LIVE] No se pudieron guardar los planes abiertos");
        }
        info!(
            symbol,
            quantity,
            price = %format!("${:.2}", price),
            reason = %reason,
            operation_id = ?order.operation_id,
            "📤 [LIVE] Venta enviada"
        );
        Ok(SellOutcome { order, closed })
    }

    async fn summary(&self) -> Result<String> {
        let balance = self.available_balance().await?;
        let positions = self.positions().await?;
        let value: f64 = positions.iter().map(|p| p.market_value()).sum();
        let unrealized: f64 = positions.iter().map(|p| p.unrealized_pnl()).sum();
        Ok(format!(
            "💼 IOL: ${:.2} disponible | {} posiciones (${:.2}) | P&L abierto: ${:+.2}",
            balance,
            positions.len(),
            value,
            unrealized
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, qty: u64, avg: f64, last: f64) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            quantity: qty,
            average_price: avg,
            last_price: last,
            valuation: qty as f64 * last,
            gain_pct: 0.0,
            instrument_type: "ACCIONES".to_string(),
        }
    }

    fn open_plan() -> OpenPlan {
        OpenPlan {
            entry_price: 1000.0,
            quantity: 10,
            stop_loss: 940.0,
            take_profit: 1120.0,
            entry_commission: 60.0,
            score: 35,
            supporting_strategies: vec!["technical".to_string(), "fractal".to_string()],
            opened_at: 1,
        }
    }

    #[test]
    fn merge_uses_plan_when_known() {
        let mut plans = HashMap::new();
        plans.insert("GGAL".to_string(), open_plan());
        let positions = merge_holdings(
            &[holding("GGAL", 10, 1005.0, 1050.0), holding("YPF", 3, 20_000.0, 21_000.0)],
            &plans,
        );
        assert_eq!(positions.len(), 2);
        let ggal = positions.iter().find(|p| p.symbol == "GGAL").unwrap();
        assert_eq!(ggal.entry_price, 1000.0);
        assert_eq!(ggal.stop_loss, 940.0);
        assert_eq!(ggal.current_price, 1050.0);
        let ypf = positions.iter().find(|p| p.symbol == "YPF").unwrap();
        assert_eq!(ypf.entry_price, 20_000.0);
        assert_eq!(ypf.stop_loss, 0.0);
    }

    #[test]
    fn unsettled_plan_counts_as_position() {
        let mut plans = HashMap::new();
        plans.insert("GGAL".to_string(), open_plan());
        let positions = merge_holdings(&[], &plans);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "GGAL");
        assert_eq!(positions[0].quantity, 10);
        assert_eq!(positions[0].current_price, 1000.0);
        assert_eq!(positions[0].stop_loss, 940.0);
    }

    #[test]
    fn estimated_trade_nets_both_commissions() {
        let t = estimate_closed_trade(
            &CommissionModel::default(),
            "GGAL",
            &open_plan(),
            10,
            1100.0,
            ExitReason::TakeProfit,
        );
        assert!((t.pnl - 874.0).abs() < 1e-9);
        assert!(t.is_win());
        assert_eq!(t.supporting_strategies.len(), 2);
    }
}
