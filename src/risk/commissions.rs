//! IOL commission and spread model
//!
//! Money is computed in `Decimal` and rounded half-up to cents.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::config::CommissionsConfig;
use crate::types::normalize_symbol;

const CEDEARS: &[&str] = &["AAPL", "GOOGL", "MSFT", "TSLA", "AMZN", "NVDA"];
const BOND_PREFIXES: &[&str] = &["AL", "AE", "GD"];
const BOND_NAMES: &[&str] = &["DICP", "PARP"];

const HIGH_LIQUIDITY: &[&str] = &["GGAL", "PAMP", "YPF", "MIRG", "TXAR", "BBAR", "BMA"];
const MEDIUM_LIQUIDITY: &[&str] = &["KO", "LOMA", "EDN", "CEPU"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetType {
    Cedear,
    Stock,
    Bond,
    Option,
}

impl AssetType {
    /// Classify by ticker shape. Sovereign bonds look like AL30 / GD35 / AE38.
    pub fn detect(symbol: &str) -> Self {
        let s = normalize_symbol(symbol);
        if CEDEARS.iter().any(|c| s.contains(c)) {
            return AssetType::Cedear;
        }
        let bond_ticker = BOND_PREFIXES.iter().any(|p| {
            s.strip_prefix(p)
                .map(|rest| !rest.is_empty() && rest.chars().take(2).all(|c| c.is_ascii_digit()))
                .unwrap_or(false)
        });
        if bond_ticker || BOND_NAMES.iter().any(|b| s.contains(b)) {
            return AssetType::Bond;
        }
        if s.contains("OP") || s.contains("CALL") || s.contains("PUT") {
            return AssetType::Option;
        }
        AssetType::Stock
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundTrip {
    pub buy_commission: f64,
    pub sell_commission: f64,
    pub total_commissions: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    /// Gain in percent needed to cover commissions
    pub break_even_pct: f64,
    pub break_even_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeCheck {
    pub should_execute: bool,
    pub total_cost: f64,
    pub total_cost_pct: f64,
    pub net_profit: f64,
    pub net_profit_pct: f64,
    pub break_even_price: f64,
    pub reason: String,
}

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[derive(Debug, Clone)]
pub struct CommissionModel {
    config: CommissionsConfig,
}

impl Default for CommissionModel {
    fn default() -> Self {
        Self::new(CommissionsConfig::default())
    }
}

impl CommissionModel {
    pub fn new(config: CommissionsConfig) -> Self {
        Self { config }
    }

    pub fn rate(&self, asset: AssetType) -> f64 {
        match asset {
            AssetType::Cedear => self.config.cedear_rate,
            AssetType::Stock => self.config.stock_rate,
            AssetType::Bond => self.config.bond_rate,
            AssetType::Option => self.config.option_rate,
        }
    }

    /// Commission for one leg, minimum applied, in cents
    pub fn commission_decimal(&self, symbol: &str, price: f64, quantity: u64) -> Decimal {
        let rate = dec(self.rate(AssetType::detect(symbol)));
        let value = dec(price) * Decimal::from(quantity);
        let commission = (value * rate).max(dec(self.config.minimum));
        commission.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn commission(&self, symbol: &str, price: f64, quantity: u64) -> f64 {
        to_f64(self.commission_decimal(symbol, price, quantity))
    }

    pub fn round_trip(&self, symbol: &str, buy_price: f64, sell_price: f64, quantity: u64) -> RoundTrip {
        let buy = self.commission_decimal(symbol, buy_price, quantity);
        let sell = self.commission_decimal(symbol, sell_price, quantity);
        let total = buy + sell;
        let invested = dec(buy_price) * Decimal::from(quantity);
        let gross = (dec(sell_price) - dec(buy_price)) * Decimal::from(quantity);
        let break_even_pct = if invested.is_zero() {
            0.0
        } else {
            to_f64(total / invested * Decimal::ONE_HUNDRED)
        };
        RoundTrip {
            buy_commission: to_f64(buy),
            sell_commission: to_f64(sell),
            total_commissions: to_f64(total),
            gross_pnl: to_f64(gross),
            net_pnl: to_f64(gross - total),
            break_even_pct,
            break_even_price: buy_price * (1.0 + break_even_pct / 100.0),
        }
    }

    /// Typical bid/ask spread as a fraction, by liquidity tier
    pub fn spread_pct(&self, symbol: &str) -> f64 {
        let s = normalize_symbol(symbol);
        if HIGH_LIQUIDITY.contains(&s.as_str()) {
            0.002
        } else if MEDIUM_LIQUIDITY.contains(&s.as_str()) {
            0.005
        } else {
            0.01
        }
    }

    /// Whether the expected move pays for commissions and spread with margin
    pub fn should_execute(&self, symbol: &str, entry: f64, exit: f64, quantity: u64) -> TradeCheck {
        let invested = entry * quantity as f64;
        if invested <= 0.0 {
            return TradeCheck {
                should_execute: false,
                total_cost: 0.0,
                total_cost_pct: 0.0,
                net_profit: 0.0,
                net_profit_pct: 0.0,
                break_even_price: entry,
                reason: "Cantidad o precio inválido".to_string(),
            };
        }
        let rt = self.round_trip(symbol, entry, exit, quantity);
        let spread_cost = invested * self.spread_pct(symbol);
        let total_cost = rt.total_commissions + spread_cost;
        let net_profit = (exit - entry) * quantity as f64 - total_cost;
        let net_profit_pct = net_profit / invested * 100.0;
        let total_cost_pct = total_cost / invested * 100.0;
        let should_execute = net_profit_pct > self.config.min_net_profit_pct * 100.0;

        let reason = if should_execute {
            format!(
                "Rentable: +{:.2}% neto después de costos ({:.2}%)",
                net_profit_pct, total_cost_pct
            )
        } else if net_profit_pct < 0.0 {
            format!("No rentable: {:.2}% neto (costos: {:.2}%)", net_profit_pct, total_cost_pct)
        } else {
            format!(
                "Ganancia muy pequeña: +{:.2}% neto (costos: {:.2}%)",
                net_profit_pct, total_cost_pct
            )
        };
        TradeCheck {
            should_execute,
            total_cost,
            total_cost_pct,
            net_profit,
            net_profit_pct,
            break_even_price: rt.break_even_price,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_asset_detection() {
        assert_eq!(AssetType::detect("AAPL"), AssetType::Cedear);
        assert_eq!(AssetType::detect("AL30"), AssetType::Bond);
        assert_eq!(AssetType::detect("GD35"), AssetType::Bond);
        assert_eq!(AssetType::detect("DICP"), AssetType::Bond);
        assert_eq!(AssetType::detect("GGAL"), AssetType::Stock);
        assert_eq!(AssetType::detect("ALUA"), AssetType::Stock);
        assert_eq!(AssetType::detect("GFGCALL"), AssetType::Option);
    }

    #[test]
    fn test_commission_rate_and_minimum() {
        let m = CommissionModel::default();
        assert_eq!(m.commission_decimal("GGAL", 1000.0, 10), dec!(60.00));
        assert_eq!(m.commission("GGAL", 100.0, 1), 50.0);
        assert_eq!(m.commission_decimal("AL30", 100_000.0, 1), dec!(300.00));
    }

    #[test]
    fn test_rounds_half_up() {
        let m = CommissionModel::default();
        // 5004.5 × 1% = 50.045
        assert_eq!(m.commission_decimal("GFGCALL", 5004.5, 1), dec!(50.05));
    }

    #[test]
    fn test_round_trip() {
        let m = CommissionModel::default();
        let rt = m.round_trip("GGAL", 1000.0, 1050.0, 10);
        assert_eq!(rt.buy_commission, 60.0);
        assert_eq!(rt.sell_commission, 63.0);
        assert_eq!(rt.gross_pnl, 500.0);
        assert_eq!(rt.net_pnl, 377.0);
        assert!((rt.break_even_pct - 1.23).abs() < 1e-9);
        assert!((rt.break_even_price - 1012.3).abs() < 1e-9);
    }

    #[test]
    fn test_should_execute() {
        let m = CommissionModel::default();
        // 3% move on GGAL: costs 60 + 61.8 + 20 spread = 141.8 on 10k → net 1.58%
        let ok = m.should_execute("GGAL", 1000.0, 1030.0, 10);
        assert!(ok.should_execute, "{}", ok.reason);
        // 1% move does not cover costs plus the 0.5% margin
        let skip = m.should_execute("GGAL", 1000.0, 1010.0, 10);
        assert!(!skip.should_execute);
        assert_eq!(m.spread_pct("KO"), 0.005);
        assert_eq!(m.spread_pct("XYZ"), 0.01);
    }
}
