//! Core types used throughout IolBot
//!
//! Defines common data structures for quotes, candles, analyses, orders and positions.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Buenos Aires is UTC-3 all year (no DST since 2009)
pub const ART_OFFSET_SECS: i32 = -3 * 3600;

/// Current time in Argentina (market local time)
pub fn local_now() -> DateTime<FixedOffset> {
    to_local(Utc::now())
}

/// Convert a UTC instant to Argentina local time
pub fn to_local(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    // -3h is always a valid offset
    let offset = FixedOffset::east_opt(ART_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    ts.with_timezone(&offset)
}

/// Normalize a user-supplied ticker: uppercase, trimmed, without the Yahoo `.BA` suffix
pub fn normalize_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    upper
        .strip_suffix(".BA")
        .map(|s| s.to_string())
        .unwrap_or(upper)
}

/// Markets where IOL lists instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    Bcba,
    Nasdaq,
    Nyse,
}

impl Default for Market {
    fn default() -> Self {
        Market::Bcba
    }
}

const NASDAQ_SYMBOLS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "META"];
const NYSE_SYMBOLS: &[&str] = &["KO", "TSM", "NU"];

impl Market {
    /// Code used in IOL URLs
    pub fn iol_code(&self) -> &'static str {
        match self {
            Market::Bcba => "bCBA",
            Market::Nasdaq => "NASDAQ",
            Market::Nyse => "NYSE",
        }
    }

    /// Guess the listing market from the ticker. Unknown tickers are assumed local (BCBA).
    pub fn detect(symbol: &str) -> Self {
        let symbol = normalize_symbol(symbol);
        if NASDAQ_SYMBOLS.contains(&symbol.as_str()) {
            Market::Nasdaq
        } else if NYSE_SYMBOLS.contains(&symbol.as_str()) {
            Market::Nyse
        } else {
            Market::Bcba
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BCBA" => Some(Market::Bcba),
            "NASDAQ" => Some(Market::Nasdaq),
            "NYSE" => Some(Market::Nyse),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iol_code())
    }
}

/// Candle timeframes used by the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Min15,
    Hour1,
    Hour4,
    Day1,
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Day1
    }
}

impl Timeframe {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Timeframe::Min15 => 15 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour4 => 4 * 60 * 60,
            Timeframe::Day1 => 24 * 60 * 60,
        }
    }

    /// Interval label understood by the Yahoo chart API
    pub fn yahoo_interval(&self) -> &'static str {
        match self {
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            // Yahoo has no 4h bars, they are resampled from 1h
            Timeframe::Hour4 => "1h",
            Timeframe::Day1 => "1d",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "15m" | "15min" => Some(Timeframe::Min15),
            "1h" | "60m" => Some(Timeframe::Hour1),
            "4h" => Some(Timeframe::Hour4),
            "1d" | "d" => Some(Timeframe::Day1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Min15 => write!(f, "15M"),
            Timeframe::Hour1 => write!(f, "1H"),
            Timeframe::Hour4 => write!(f, "4H"),
            Timeframe::Day1 => write!(f, "1D"),
        }
    }
}

/// OHLCV candle (timestamps in milliseconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub timeframe: Timeframe,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Open time as a UTC datetime
    pub fn open_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }
}

/// Normalized quote from any data provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    /// Best bid (IOL only)
    pub bid: Option<f64>,
    /// Best ask (IOL only)
    pub ask: Option<f64>,
    pub currency: String,
    /// Which provider answered ("IOL", "Yahoo Finance")
    pub source: String,
    /// Timestamp in milliseconds
    pub ts: i64,
}

impl Quote {
    /// Daily change in percent, when the previous close is known
    pub fn change_pct(&self) -> Option<f64> {
        let prev = self.previous_close?;
        if prev > 0.0 {
            Some((self.price - prev) / prev * 100.0)
        } else {
            None
        }
    }

    /// Relative bid/ask spread, when both sides are quoted
    pub fn spread_pct(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask >= bid => Some((ask - bid) / bid),
            _ => None,
        }
    }
}

/// Trading decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Default for Action {
    fn default() -> Self {
        Action::Hold
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Confidence attached to a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Low
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

/// Market regime classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
    Unknown,
}

impl Default for MarketRegime {
    fn default() -> Self {
        MarketRegime::Unknown
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketRegime::Trending => write!(f, "TRENDING"),
            MarketRegime::Ranging => write!(f, "RANGING"),
            MarketRegime::Volatile => write!(f, "VOLATILE"),
            MarketRegime::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Score produced by a single advanced strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyScore {
    /// Strategy name (e.g. "monte_carlo")
    pub name: String,
    /// Signed contribution (positive = bullish)
    pub score: i32,
    /// Human readable reasons
    pub factors: Vec<String>,
}

impl StrategyScore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Add points with a reason
    pub fn add(&mut self, points: i32, factor: impl Into<String>) {
        self.score += points;
        self.factors.push(factor.into());
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Outcome of an order submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    /// Broker operation number (IOL `numeroOperacion`) or paper trade id
    pub operation_id: Option<String>,
    pub message: String,
    /// Price actually used (after simulated slippage in paper mode)
    pub fill_price: f64,
    pub quantity: u64,
    /// Commission charged on this leg
    pub commission: f64,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    Signal,
    Manual,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::TrailingStop => write!(f, "TRAILING_STOP"),
            ExitReason::Signal => write!(f, "SIGNAL"),
            ExitReason::Manual => write!(f, "MANUAL"),
            ExitReason::EndOfData => write!(f, "END_OF_DATA"),
        }
    }
}

/// Stop-loss / take-profit plan attached to an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Score at entry time
    pub score: i32,
    /// Strategies that pointed in the trade direction at entry
    pub supporting_strategies: Vec<String>,
}

/// Open long position
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Commission paid on entry
    pub entry_commission: f64,
    /// Open timestamp in milliseconds
    pub opened_at: i64,
    pub score: i32,
    pub supporting_strategies: Vec<String>,
}

impl Position {
    pub fn market_value(&self) -> f64 {
        self.current_price * self.quantity as f64
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.entry_price) * self.quantity as f64
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        if self.entry_price > 0.0 {
            (self.current_price - self.entry_price) / self.entry_price
        } else {
            0.0
        }
    }

    /// Capital at risk between entry and stop
    pub fn open_risk(&self) -> f64 {
        ((self.entry_price - self.stop_loss).max(0.0)) * self.quantity as f64
    }
}

/// Round-trip trade result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: String,
    pub symbol: String,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Net P&L after commissions
    pub pnl: f64,
    /// Net return over invested capital
    pub pnl_pct: f64,
    pub fees: f64,
    pub reason: ExitReason,
    pub opened_at: i64,
    pub closed_at: i64,
    pub supporting_strategies: Vec<String>,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
