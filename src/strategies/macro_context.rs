//! Argentine macro context: dollar gap and inflation
//!
//! Dollar quotes come from dolarapi.com; inflation is a configured figure.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::MacroConfig;
use crate::types::StrategyScore;

#[derive(Debug, Deserialize)]
struct DolarResponse {
    #[serde(default)]
    venta: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MacroSnapshot {
    pub usd_official: Option<f64>,
    pub usd_blue: Option<f64>,
    /// Annual inflation in percent
    pub inflation: f64,
}

impl MacroSnapshot {
    /// Blue over official gap in percent
    pub fn gap_pct(&self) -> Option<f64> {
        match (self.usd_official, self.usd_blue) {
            (Some(official), Some(blue)) if official > 0.0 => Some((blue - official) / official * 100.0),
            _ => None,
        }
    }

    pub fn score(&self) -> StrategyScore {
        let mut result = StrategyScore::new("macro");
        if let Some(gap) = self.gap_pct() {
            if gap > 30.0 {
                result.add(-10, format!("Brecha cambiaria alta {:.1}% (-10)", gap));
            } else if gap < 10.0 {
                result.add(5, format!("Brecha cambiaria baja {:.1}% (+5)", gap));
            }
        }
        let inflation = self.inflation;
        if inflation > 100.0 {
            result.add(-15, format!("Inflación muy alta {:.0}% (-15)", inflation));
        } else if inflation > 50.0 {
            result.add(-8, format!("Inflación alta {:.0}% (-8)", inflation));
        } else if inflation < 20.0 {
            result.add(5, format!("Inflación controlada {:.0}% (+5)", inflation));
        }
        result
    }
}

/// Fetches and caches the macro snapshot
pub struct MacroService {
    http: Client,
    config: MacroConfig,
    cache: Mutex<Option<(Instant, MacroSnapshot)>>,
}

impl MacroService {
    pub fn new(config: MacroConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build macro HTTP client")?;
        Ok(Self {
            http,
            config,
            cache: Mutex::new(None),
        })
    }

    async fn fetch_dollar(&self, kind: &str) -> Result<Option<f64>> {
        let url = format!("{}/dolares/{}", self.config.dolar_api_url.trim_end_matches('/'), kind);
        let resp: DolarResponse = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Invalid dolarapi payload for {}", kind))?;
        Ok(resp.venta.filter(|v| *v > 0.0))
    }

    fn cached(&self) -> Option<MacroSnapshot> {
        let guard = self.cache.lock().ok()?;
        let (at, snap) = guard.as_ref()?;
        (at.elapsed() < Duration::from_secs(self.config.cache_secs)).then(|| snap.clone())
    }

    /// Current snapshot. Failed dollar fetches leave the gap unknown.
    pub async fn snapshot(&self) -> MacroSnapshot {
        if let Some(snap) = self.cached() {
            return snap;
        }
        let mut snap = MacroSnapshot {
            inflation: self.config.annual_inflation_pct,
            ..Default::default()
        };
        if self.config.enabled {
            match self.fetch_dollar("oficial").await {
                Ok(v) => snap.usd_official = v,
                Err(e) => warn!(error = %e, "⚠️ Dólar oficial no disponible"),
            }
            match self.fetch_dollar("blue").await {
                Ok(v) => snap.usd_blue = v,
                Err(e) => warn!(error = %e, "⚠️ Dólar blue no disponible"),
            }
        }
        debug!(
            official = ?snap.usd_official,
            blue = ?snap.usd_blue,
            inflation = snap.inflation,
            "Macro snapshot refreshed"
        );
        if let Ok(mut guard) = self.cache.lock() {
            *guard = Some((Instant::now(), snap.clone()));
        }
        snap
    }

    /// Macro adjustment for scoring (0 when disabled)
    pub async fn score(&self) -> StrategyScore {
        if !self.config.enabled {
            return StrategyScore::new("macro");
        }
        self.snapshot().await.score()
    }
}
