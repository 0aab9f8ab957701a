//! Configuration management for IolBot
//!
//! Loads from YAML/TOML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub iol: IolConfig,
    pub yahoo: YahooConfig,
    pub scoring: ScoringConfig,
    pub strategies: StrategiesConfig,
    pub filters: FiltersConfig,
    pub risk: RiskConfig,
    pub trailing: TrailingConfig,
    pub commissions: CommissionsConfig,
    pub paper_trading: PaperTradingCfg,
    pub persistence: PersistenceConfig,
    pub learning: LearningConfig,
    pub telegram: TelegramConfig,
    #[serde(rename = "macro")]
    pub macro_ctx: MacroConfig,
}

/// Secrets read from the environment only (never from config files)
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub iol_username: Option<String>,
    pub iol_password: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            iol_username: non_empty_env("IOL_USERNAME"),
            iol_password: non_empty_env("IOL_PASSWORD"),
            telegram_token: non_empty_env("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty_env("TELEGRAM_CHAT_ID"),
        }
    }

    pub fn has_iol(&self) -> bool {
        self.iol_username.is_some() && self.iol_password.is_some()
    }

    pub fn has_telegram(&self) -> bool {
        self.telegram_token.is_some() && self.telegram_chat_id.is_some()
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, optionally with an explicit config file on top of the defaults
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Config::builder()
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let config = builder
            // Override with environment variables (IOLBOT__BOT__INTERVAL_SECS=60)
            .add_source(
                Environment::with_prefix("IOLBOT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("bot.symbols")
                    .with_list_parse_key("strategies.enabled")
                    .with_list_parse_key("filters.trading_days"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Sanity checks on values that would silently break trading
    pub fn validate(&self) -> Result<()> {
        if self.bot.symbols.is_empty() {
            bail!("bot.symbols must list at least one symbol");
        }
        if self.bot.interval_secs == 0 {
            bail!("bot.interval_secs must be > 0");
        }
        if self.scoring.buy_threshold <= self.scoring.sell_threshold {
            bail!(
                "scoring.buy_threshold ({}) must be above scoring.sell_threshold ({})",
                self.scoring.buy_threshold,
                self.scoring.sell_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.risk.max_position_pct)
            || !(0.0..=1.0).contains(&self.risk.max_risk_per_trade)
        {
            bail!("risk percentages must be fractions between 0 and 1");
        }
        if self.trailing.trail_pct <= 0.0 || self.trailing.trail_pct >= 1.0 {
            bail!("trailing.trail_pct must be between 0 and 1");
        }
        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "bot={} symbols={:?} interval={}s live={} thresholds={}/{} adaptive={}",
            self.bot.tag,
            self.bot.symbols,
            self.bot.interval_secs,
            self.bot.live,
            self.scoring.buy_threshold,
            self.scoring.sell_threshold,
            self.scoring.use_adaptive_thresholds
        )
    }

    /// Validate required environment variables
    pub fn validate_env(&self, live: bool) -> Result<()> {
        let creds = Credentials::from_env();
        if live && !creds.has_iol() {
            bail!("Live trading requires IOL_USERNAME and IOL_PASSWORD to be set");
        }
        if self.telegram.enabled && !creds.has_telegram() {
            tracing::warn!(
                "Telegram enabled but TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID missing, notifications go to the log only"
            );
        }
        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
