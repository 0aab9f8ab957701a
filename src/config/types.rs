//! Configuration section types
//!
//! Every section implements `Default` so a bare `AppConfig::load()` with no files works.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot version tag for logging and CSV
    pub tag: String,
    /// Symbol universe to analyze each cycle
    pub symbols: Vec<String>,
    /// Seconds between analysis cycles
    pub interval_secs: u64,
    /// Send real orders through IOL (false = paper trading)
    pub live: bool,
    /// Skip cycles outside market hours
    pub respect_market_hours: bool,
    /// Flag file that stops the loop when present
    pub stop_file: String,
    /// Local hour (Buenos Aires) at which the daily summary is sent
    pub daily_summary_hour: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tag: env!("CARGO_PKG_VERSION").to_string(),
            symbols: ["GGAL", "YPF", "PAMP", "BMA", "TXAR", "AAPL", "KO"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interval_secs: 300,
            live: false,
            respect_market_hours: true,
            stop_file: "./data/STOP".to_string(),
            daily_summary_hour: 17,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IolConfig {
    /// REST base URL
    pub base_url: String,
    /// OAuth token endpoint
    pub token_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per request (including the first one)
    pub max_retries: u32,
    /// Calls allowed per sliding window
    pub rate_limit_calls: usize,
    /// Sliding window length in seconds
    pub rate_limit_window_secs: u64,
    /// Prefer the immediate-settlement balance over 48hs
    pub prefer_immediate_balance: bool,
    /// Country used for /portafolio/{country}
    pub portfolio_country: String,
}

impl Default for IolConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.invertironline.com/api/v2".to_string(),
            token_url: "https://api.invertironline.com/token".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            rate_limit_calls: 100,
            rate_limit_window_secs: 60,
            prefer_immediate_balance: true,
            portfolio_country: "argentina".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YahooConfig {
    /// Use Yahoo Finance as fallback data source
    pub enabled: bool,
    /// Chart API base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Daily history range (Yahoo range syntax)
    pub history_range: String,
    /// Intraday history range for multi-timeframe analysis
    pub intraday_range: String,
    /// History cache TTL in seconds
    pub cache_ttl_secs: u64,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            timeout_secs: 15,
            history_range: "1y".to_string(),
            intraday_range: "1mo".to_string(),
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Static BUY threshold (used when adaptive thresholds are off)
    pub buy_threshold: i32,
    /// Static SELL threshold (used when adaptive thresholds are off)
    pub sell_threshold: i32,
    /// Use thresholds adapted from recent performance
    pub use_adaptive_thresholds: bool,
    /// Blend component scores with regime weights
    pub meta_learner_enabled: bool,
    /// Minimum adjustment (points) before the blended score replaces the raw sum
    pub meta_min_adjustment: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            buy_threshold: 25,
            sell_threshold: -25,
            use_adaptive_thresholds: true,
            meta_learner_enabled: true,
            meta_min_adjustment: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    /// Names of advanced strategies to run (empty = all)
    pub enabled: Vec<String>,
    /// Monte Carlo path count
    pub monte_carlo_simulations: usize,
    /// Monte Carlo horizon in trading days
    pub monte_carlo_horizon_days: usize,
    /// Fetch intraday bars for multi-timeframe analysis
    pub intraday_enabled: bool,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            monte_carlo_simulations: 10_000,
            monte_carlo_horizon_days: 30,
            intraday_enabled: true,
        }
    }
}

impl StrategiesConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|s| s == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Entry filters (RSI, volume, trend, ATR) on BUY signals
    pub entry_enabled: bool,
    pub rsi_min: f64,
    pub rsi_max: f64,
    /// Minimum current volume / 20-bar average
    pub min_volume_ratio: f64,
    /// Reject when price < SMA20 or SMA20 < SMA50
    pub require_trend_confirmation: bool,
    /// ATR as % of price
    pub atr_pct_min: f64,
    pub atr_pct_max: f64,
    /// Time filters (Buenos Aires local time)
    pub time_enabled: bool,
    /// Allowed weekdays, 1 = Monday .. 7 = Sunday
    pub trading_days: Vec<u32>,
    /// "HH:MM"
    pub start_time: String,
    /// "HH:MM"
    pub end_time: String,
    pub avoid_first_minutes: i64,
    pub avoid_last_minutes: i64,
    /// Minutes without new entries on a symbol after a losing trade
    pub loss_cooldown_minutes: i64,
    /// Correlation filter against open positions
    pub correlation_enabled: bool,
    pub correlation_threshold: f64,
    pub correlation_penalty: i32,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            entry_enabled: true,
            rsi_min: 30.0,
            rsi_max: 70.0,
            min_volume_ratio: 1.0,
            require_trend_confirmation: true,
            atr_pct_min: 0.5,
            atr_pct_max: 8.0,
            time_enabled: true,
            trading_days: vec![1, 2, 3, 4, 5],
            start_time: "11:00".to_string(),
            end_time: "17:00".to_string(),
            avoid_first_minutes: 15,
            avoid_last_minutes: 15,
            loss_cooldown_minutes: 60,
            correlation_enabled: true,
            correlation_threshold: 0.8,
            correlation_penalty: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Max fraction of capital in a single position (0.10 = 10%)
    pub max_position_pct: f64,
    /// Max fraction of capital at risk per trade (0.02 = 2%)
    pub max_risk_per_trade: f64,
    /// Max summed open risk as fraction of capital (0.06 = 6%)
    pub max_portfolio_heat: f64,
    /// Stop distance in ATRs
    pub atr_stop_multiplier: f64,
    /// Take-profit distance in multiples of the stop distance
    pub reward_risk_ratio: f64,
    /// Maximum open positions
    pub max_open_positions: usize,
    /// Maximum daily loss in ARS (kill switch)
    pub max_daily_loss: f64,
    /// Maximum entries per day
    pub max_trades_per_day: usize,
    /// Whether the kill switch is enabled
    pub kill_switch_enabled: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_pct: 0.10,
            max_risk_per_trade: 0.02,
            max_portfolio_heat: 0.06,
            atr_stop_multiplier: 2.0,
            reward_risk_ratio: 2.0,
            max_open_positions: 5,
            max_daily_loss: 5_000.0, // ARS 5k on a 100k account
            max_trades_per_day: 10,
            kill_switch_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub enabled: bool,
    /// Distance from the high-water mark (0.05 = 5%)
    pub trail_pct: f64,
    /// Gain required before the stop starts trailing (0.03 = 3%)
    pub activation_pct: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trail_pct: 0.05,
            activation_pct: 0.03,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommissionsConfig {
    /// Commission rate for CEDEARs
    pub cedear_rate: f64,
    /// Commission rate for local stocks
    pub stock_rate: f64,
    /// Commission rate for bonds
    pub bond_rate: f64,
    /// Commission rate for options
    pub option_rate: f64,
    /// Minimum commission per order in ARS
    pub minimum: f64,
    /// Minimum net expected profit to execute (0.005 = 0.5%)
    pub min_net_profit_pct: f64,
}

impl Default for CommissionsConfig {
    fn default() -> Self {
        Self {
            cedear_rate: 0.006,
            stock_rate: 0.006,
            bond_rate: 0.003,
            option_rate: 0.01,
            minimum: 50.0,
            min_net_profit_pct: 0.005,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperTradingCfg {
    /// Starting virtual balance in ARS
    pub initial_balance: f64,
    /// Simulated slippage in basis points
    pub slippage_bps: f64,
    /// Dashboard log interval in seconds
    pub dashboard_interval_secs: u64,
}

impl Default for PaperTradingCfg {
    fn default() -> Self {
        Self {
            initial_balance: 100_000.0,
            slippage_bps: 10.0,
            dashboard_interval_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable CSV journals
    pub csv_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            csv_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub enabled: bool,
    /// Closed trades considered for threshold adaptation
    pub window: usize,
    /// Minimum closed trades before adapting
    pub min_trades: usize,
    /// Minimum samples per strategy before its weight is calibrated
    pub calibration_min_samples: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 20,
            min_trades: 10,
            calibration_min_samples: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Send notifications (requires TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID)
    pub enabled: bool,
    /// Listen for /commands
    pub commands_enabled: bool,
    /// Long-poll timeout for getUpdates
    pub poll_timeout_secs: u64,
    /// Telegram Bot API base URL
    pub api_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            commands_enabled: true,
            poll_timeout_secs: 30,
            api_url: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MacroConfig {
    pub enabled: bool,
    /// dolarapi.com base URL
    pub dolar_api_url: String,
    /// Annual inflation in percent (INDEC, updated by hand)
    pub annual_inflation_pct: f64,
    /// Seconds to cache the dollar quotes
    pub cache_secs: u64,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dolar_api_url: "https://dolarapi.com/v1".to_string(),
            annual_inflation_pct: 40.0,
            cache_secs: 3600,
        }
    }
}
