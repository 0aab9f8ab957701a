//! Filtros de trader profesional
//!
//! - Entrada: RSI, volumen relativo, confirmación de tendencia, ATR%
//! - Horario: días hábiles, horario de mercado, primeros/últimos minutos, cooldown tras pérdida
//! - Correlación con posiciones abiertas (penalización, no veto)

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::FiltersConfig;
use crate::features::{correlation, returns, Features};
use crate::scoring::Analysis;
use crate::types::Action;

/// Días de retornos usados para la correlación
const CORRELATION_DAYS: usize = 30;

/// Decisión del filtro
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Allow,
    Reject(FilterReason),
}

/// Razón de rechazo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FilterReason {
    RsiOutOfRange(f64),
    LowVolume(f64),
    NoTrendConfirmation,
    AtrOutOfRange(f64),
    NonTradingDay,
    OutsideHours,
    OpeningMinutes,
    ClosingMinutes,
    LossCooldown { minutes_left: i64 },
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::RsiOutOfRange(rsi) => write!(f, "RSI fuera de rango ({:.1})", rsi),
            FilterReason::LowVolume(ratio) => write!(f, "Volumen bajo ({:.2}x)", ratio),
            FilterReason::NoTrendConfirmation => write!(f, "Sin confirmación de tendencia"),
            FilterReason::AtrOutOfRange(pct) => write!(f, "ATR fuera de rango ({:.2}%)", pct),
            FilterReason::NonTradingDay => write!(f, "Día no operable"),
            FilterReason::OutsideHours => write!(f, "Fuera de horario de mercado"),
            FilterReason::OpeningMinutes => write!(f, "Primeros minutos de la rueda"),
            FilterReason::ClosingMinutes => write!(f, "Últimos minutos de la rueda"),
            FilterReason::LossCooldown { minutes_left } => {
                write!(f, "Cooldown tras pérdida ({} min)", minutes_left)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterStats {
    pub times_applied: usize,
    pub allowed: usize,
    pub rejected: usize,
    pub by_reason: HashMap<String, usize>,
}

impl FilterStats {
    fn record(&mut self, decision: &FilterDecision) {
        self.times_applied += 1;
        match decision {
            FilterDecision::Allow => self.allowed += 1,
            FilterDecision::Reject(reason) => {
                self.rejected += 1;
                let key = format!("{:?}", reason)
                    .split(['(', ' '])
                    .next()
                    .unwrap_or_default()
                    .to_string();
                *self.by_reason.entry(key).or_insert(0) += 1;
            }
        }
    }
}

fn parse_hhmm(s: &str, fallback: (u32, u32)) -> NaiveTime {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .ok()
        .or_else(|| NaiveTime::from_hms_opt(fallback.0, fallback.1, 0))
        .unwrap_or(NaiveTime::MIN)
}

pub struct TraderFilters {
    config: FiltersConfig,
    start: NaiveTime,
    end: NaiveTime,
    /// symbol -> time of the last losing exit
    last_loss: HashMap<String, DateTime<FixedOffset>>,
    stats: FilterStats,
}

impl TraderFilters {
    pub fn new(config: FiltersConfig) -> Self {
        let start = parse_hhmm(&config.start_time, (11, 0));
        let end = parse_hhmm(&config.end_time, (17, 0));
        Self {
            config,
            start,
            end,
            last_loss: HashMap::new(),
            stats: FilterStats::default(),
        }
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Entry checks on a BUY candidate
    pub fn check_entry(&self, f: &Features) -> FilterDecision {
        let cfg = &self.config;
        if !cfg.entry_enabled {
            return FilterDecision::Allow;
        }
        if let Some(rsi) = f.rsi {
            if rsi < cfg.rsi_min || rsi > cfg.rsi_max {
                return FilterDecision::Reject(FilterReason::RsiOutOfRange(rsi));
            }
        }
        if let Some(rv) = f.relative_volume {
            if rv < cfg.min_volume_ratio {
                return FilterDecision::Reject(FilterReason::LowVolume(rv));
            }
        }
        if cfg.require_trend_confirmation {
            let below_sma20 = f.sma_20.map(|s| f.close < s).unwrap_or(false);
            let sma_inverted = match (f.sma_20, f.sma_50) {
                (Some(s20), Some(s50)) => s20 < s50,
                _ => false,
            };
            if below_sma20 || sma_inverted {
                return FilterDecision::Reject(FilterReason::NoTrendConfirmation);
            }
        }
        if let Some(atr_pct) = f.atr_pct {
            if atr_pct < cfg.atr_pct_min || atr_pct > cfg.atr_pct_max {
                return FilterDecision::Reject(FilterReason::AtrOutOfRange(atr_pct));
            }
        }
        FilterDecision::Allow
    }

    /// Weekday and trading hours only
    pub fn is_market_open(&self, now: DateTime<FixedOffset>) -> bool {
        let weekday = now.weekday().number_from_monday();
        let t = now.time();
        self.config.trading_days.contains(&weekday) && t >= self.start && t < self.end
    }

    /// Time checks for a new entry on `symbol`
    pub fn check_time(&self, symbol: &str, now: DateTime<FixedOffset>) -> FilterDecision {
        let cfg = &self.config;
        if !cfg.time_enabled {
            return FilterDecision::Allow;
        }
        if !cfg.trading_days.contains(&now.weekday().number_from_monday()) {
            return FilterDecision::Reject(FilterReason::NonTradingDay);
        }
        let t = now.time();
        if t < self.start || t >= self.end {
            return FilterDecision::Reject(FilterReason::OutsideHours);
        }
        if t < self.start + Duration::minutes(cfg.avoid_first_minutes) {
            return FilterDecision::Reject(FilterReason::OpeningMinutes);
        }
        if t >= self.end - Duration::minutes(cfg.avoid_last_minutes) {
            return FilterDecision::Reject(FilterReason::ClosingMinutes);
        }
        if let Some(loss_at) = self.last_loss.get(symbol) {
            let until = *loss_at + Duration::minutes(cfg.loss_cooldown_minutes);
            if now < until {
                let minutes_left = (until - now).num_minutes().max(1);
                return FilterDecision::Reject(FilterReason::LossCooldown { minutes_left });
            }
        }
        FilterDecision::Allow
    }

    /// Start the post-loss cooldown for `symbol`
    pub fn record_loss(&mut self, symbol: &str, at: DateTime<FixedOffset>) {
        self.last_loss.insert(symbol.to_string(), at);
    }

    /// (symbol, correlation) of open positions correlated above the threshold
    pub fn correlated_positions(
        &self,
        candidate_closes: &[f64],
        open_positions: &[(String, Vec<f64>)],
    ) -> Vec<(String, f64)> {
        if !self.config.correlation_enabled {
            return Vec::new();
        }
        let tail = |closes: &[f64]| -> Vec<f64> {
            let start = closes.len().saturating_sub(CORRELATION_DAYS + 1);
            returns(&closes[start..])
        };
        let candidate = tail(candidate_closes);
        open_positions
            .iter()
            .filter_map(|(symbol, closes)| {
                let corr = correlation(&candidate, &tail(closes))?;
                (corr > self.config.correlation_threshold).then(|| (symbol.clone(), corr))
            })
            .collect()
    }

    /// Run all filters on a BUY analysis: correlation penalty first, then the vetoes
    pub fn apply(
        &mut self,
        analysis: &mut Analysis,
        now: DateTime<FixedOffset>,
        candidate_closes: &[f64],
        open_positions: &[(String, Vec<f64>)],
    ) -> FilterDecision {
        if analysis.action != Action::Buy {
            return FilterDecision::Allow;
        }
        for (symbol, corr) in self.correlated_positions(candidate_closes, open_positions) {
            let penalty = self.config.correlation_penalty;
            analysis.adjust(
                -penalty,
                format!("Correlación {:.2} con {} (-{})", corr, symbol, penalty),
            );
        }
        if analysis.action != Action::Buy {
            return FilterDecision::Allow;
        }

        let mut decision = self.check_entry(&analysis.features);
        if decision == FilterDecision::Allow {
            decision = self.check_time(&analysis.symbol, now);
        }
        self.stats.record(&decision);
        if let FilterDecision::Reject(reason) = &decision {
            debug!(symbol = %analysis.symbol, reason = %reason, "🚫 Filtro rechazó la entrada");
            analysis.block(reason.to_string());
        }
        decision
    }
}
