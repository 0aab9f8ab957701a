//! Trailing stop book
//!
//! One entry per symbol. The stop only moves up, and only after the position
//! has gained `activation_pct`. Persisted as JSON after every change. A hit
//! keeps the entry until the caller confirms the exit with `remove`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::TrailingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStop {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: u64,
    pub initial_stop: f64,
    pub current_stop: f64,
    pub highest_price: f64,
    pub trail_pct: f64,
    pub activation_pct: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl TrailingStop {
    pub fn gain_pct(&self, price: f64) -> f64 {
        if self.entry_price > 0.0 {
            (price - self.entry_price) / self.entry_price
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrailingUpdate {
    Untracked,
    Unchanged,
    /// Gain crossed the activation level
    Activated { stop: f64 },
    Raised { from: f64, to: f64 },
    /// Price at or below the stop: sell, then `remove` the entry once the sell went through
    Hit { stop: f64, price: f64, quantity: u64 },
}

pub struct TrailingStopBook {
    config: TrailingConfig,
    path: Option<PathBuf>,
    stops: HashMap<String, TrailingStop>,
}

impl TrailingStopBook {
    /// Book without persistence
    pub fn in_memory(config: TrailingConfig) -> Self {
        Self {
            config,
            path: None,
            stops: HashMap::new(),
        }
    }

    /// Book stored in `{data_dir}/trailing_stops.json`
    pub fn open(config: TrailingConfig, data_dir: impl AsRef<Path>) -> Result<Self> {
        let path = data_dir.as_ref().join("trailing_stops.json");
        let stops = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "⚠️ Trailing stops corruptos, se ignoran");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };
        Ok(Self {
            config,
            path: Some(path),
            stops,
        })
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.stops)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Start tracking a freshly opened position
    pub fn add(&mut self, symbol: &str, entry_price: f64, quantity: u64, initial_stop: f64) -> Result<()> {
        let stop = TrailingStop {
            symbol: symbol.to_string(),
            entry_price,
            quantity,
            initial_stop,
            current_stop: initial_stop,
            highest_price: entry_price,
            trail_pct: self.config.trail_pct,
            activation_pct: self.config.activation_pct,
            active: false,
            created_at: Utc::now(),
        };
        self.stops.insert(symbol.to_string(), stop);
        self.save()
    }

    pub fn remove(&mut self, symbol: &str) -> Result<Option<TrailingStop>> {
        let removed = self.stops.remove(symbol);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn get(&self, symbol: &str) -> Option<&TrailingStop> {
        self.stops.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn all(&self) -> Vec<TrailingStop> {
        self.stops.values().cloned().collect()
    }

    /// Feed a new price for `symbol`. A failed save is logged: the in-memory
    /// book stays authoritative for this run.
    pub fn update(&mut self, symbol: &str, price: f64) -> TrailingUpdate {
        let Some(stop) = self.stops.get_mut(symbol) else {
            return TrailingUpdate::Untracked;
        };
        if price <= 0.0 {
            return TrailingUpdate::Unchanged;
        }

        let was_active = stop.active;
        let mut changed = false;
        let mut outcome = TrailingUpdate::Unchanged;

        if price > stop.highest_price {
            stop.highest_price = price;
            changed = true;
        }
        if !stop.active && stop.gain_pct(price) >= stop.activation_pct {
            stop.active = true;
            changed = true;
        }
        if stop.active {
            let candidate = stop.highest_price * (1.0 - stop.trail_pct);
            if candidate > stop.current_stop {
                let from = stop.current_stop;
                stop.current_stop = candidate;
                outcome = TrailingUpdate::Raised { from, to: candidate };
                changed = true;
            }
        }
        if stop.active && !was_active {
            info!(symbol, stop = stop.current_stop, "🎯 Trailing stop activado");
            outcome = TrailingUpdate::Activated {
                stop: stop.current_stop,
            };
        }

        if price <= stop.current_stop {
            outcome = TrailingUpdate::Hit {
                stop: stop.current_stop,
                price,
                quantity: stop.quantity,
            };
            info!(symbol, stop = stop.current_stop, price, "🛑 Trailing stop alcanzado");
        }

        if changed {
            if let Err(e) = self.save() {
                warn!(symbol, error = %e, "⚠️ No se pudieron guardar los trailing stops");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> TrailingStopBook {
        TrailingStopBook::in_memory(TrailingConfig::default())
    }

    #[test]
    fn test_inactive_until_gain_reaches_activation() {
        let mut b = book();
        b.add("GGAL", 100.0, 10, 94.0).unwrap();
        assert_eq!(b.update("GGAL", 102.0), TrailingUpdate::Unchanged);
        assert_eq!(b.get("GGAL").unwrap().current_stop, 94.0);
        assert!(!b.get("GGAL").unwrap().active);
    }

    #[test]
    fn test_activation_raise_and_hit() {
        let mut b = book();
        b.add("GGAL", 100.0, 10, 94.0).unwrap();
        // +4%: stop 104 × 0.95 = 98.8
        match b.update("GGAL", 104.0) {
            TrailingUpdate::Activated { stop } => assert!((stop - 98.8).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        match b.update("GGAL", 110.0) {
            TrailingUpdate::Raised { to, .. } => assert!((to - 104.5).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        // a pullback never lowers the stop
        assert_eq!(b.update("GGAL", 106.0), TrailingUpdate::Unchanged);
        assert!(matches!(
            b.update("GGAL", 104.0),
            TrailingUpdate::Hit { quantity: 10, .. }
        ));
        // still tracked until the exit is confirmed
        assert!(b.get("GGAL").is_some());
        assert!(matches!(b.update("GGAL", 103.0), TrailingUpdate::Hit { .. }));
        assert!(b.remove("GGAL").unwrap().is_some());
        assert_eq!(b.update("GGAL", 90.0), TrailingUpdate::Untracked);
    }

    #[test]
    fn test_initial_stop_hit() {
        let mut b = book();
        b.add("YPF", 100.0, 5, 94.0).unwrap();
        assert!(matches!(b.update("YPF", 93.0), TrailingUpdate::Hit { .. }));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = std::env::temp_dir().join(format!("iolbot-trail-{}", uuid::Uuid::new_v4()));
        {
            let mut b = TrailingStopBook::open(TrailingConfig::default(), &dir).unwrap();
            b.add("PAMP", 50.0, 20, 47.0).unwrap();
            b.update("PAMP", 55.0);
        }
        let b = TrailingStopBook::open(TrailingConfig::default(), &dir).unwrap();
        let s = b.get("PAMP").unwrap();
        assert!(s.active);
        assert!((s.current_stop - 52.25).abs() < 1e-9);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
