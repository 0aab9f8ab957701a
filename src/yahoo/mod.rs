//! Yahoo Finance fallback client
//!
//! Uses the public v8 chart endpoint. Local tickers get the `.BA` suffix.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::YahooConfig;
use crate::types::{normalize_symbol, Candle, Market, Quote, Timeframe};

/// Yahoo ticker for an IOL symbol: US listings as-is, everything else on the BCBA (.BA)
pub fn yahoo_symbol(symbol: &str) -> String {
    let symbol = normalize_symbol(symbol);
    match Market::detect(&symbol) {
        Market::Bcba => format!("{}.BA", symbol),
        _ => symbol,
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChartMeta {
    currency: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteArrays>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteArrays {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

impl ChartResult {
    /// Candles with complete OHLC, oldest first
    fn candles(&self, timeframe: Timeframe) -> Vec<Candle> {
        let Some(q) = self.indicators.quote.first() else {
            return Vec::new();
        };
        let step_ms = timeframe.duration_secs() as i64 * 1000;
        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let open = (*q.open.get(i)?)?;
                let high = (*q.high.get(i)?)?;
                let low = (*q.low.get(i)?)?;
                let close = (*q.close.get(i)?)?;
                let volume = q.volume.get(i).copied().flatten().unwrap_or(0.0);
                if close <= 0.0 {
                    return None;
                }
                Some(Candle {
                    open_time: ts * 1000,
                    close_time: ts * 1000 + step_ms,
                    timeframe,
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            })
            .collect()
    }
}

/// Yahoo Finance chart client
pub struct YahooClient {
    http: Client,
    config: YahooConfig,
}

impl YahooClient {
    pub fn new(config: YahooConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) iolbot")
            .build()
            .context("Failed to create Yahoo HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &YahooConfig {
        &self.config
    }

    async fn chart(&self, symbol: &str, range: &str, interval: &str) -> Result<ChartResult> {
        let ticker = yahoo_symbol(symbol);
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), ticker);
        debug!(ticker = %ticker, range = range, interval = interval, "Yahoo chart request");

        let resp = self
            .http
            .get(&url)
            .query(&[("range", range), ("interval", interval)])
            .send()
            .await
            .with_context(|| format!("Yahoo request failed for {}", ticker))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Yahoo returned {} for {}", status, ticker);
        }
        let body: ChartResponse = resp
            .json()
            .await
            .with_context(|| format!("Invalid Yahoo chart JSON for {}", ticker))?;
        parse_chart(body, &ticker)
    }

    /// Latest quote
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let chart = self.chart(symbol, "5d", "1d").await?;
        chart_to_quote(&chart, symbol)
    }

    /// Historical candles for a Yahoo range ("1y", "1mo") and timeframe
    pub async fn get_history(
        &self,
        symbol: &str,
        range: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>> {
        let chart = self.chart(symbol, range, timeframe.yahoo_interval()).await?;
        // 4H is not native, bars come back as 1H and are resampled upstream
        let tf = if timeframe == Timeframe::Hour4 {
            Timeframe::Hour1
        } else {
            timeframe
        };
        Ok(chart.candles(tf))
    }
}

fn parse_chart(body: ChartResponse, ticker: &str) -> Result<ChartResult> {
    if let Some(err) = body.chart.error {
        bail!("Yahoo error for {}: {} {}", ticker, err.code, err.description);
    }
    body.chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .with_context(|| format!("Yahoo returned no data for {}", ticker))
}

fn chart_to_quote(chart: &ChartResult, symbol: &str) -> Result<Quote> {
    let candles = chart.candles(Timeframe::Day1);
    let last = candles.last();
    let meta = &chart.meta;

    let price = meta
        .regular_market_price
        .or_else(|| last.map(|c| c.close))
        .filter(|p| *p > 0.0)
        .with_context(|| format!("Yahoo quote without price for {}", symbol))?;

    let previous_close = if candles.len() >= 2 {
        Some(candles[candles.len() - 2].close)
    } else {
        meta.previous_close.or(meta.chart_previous_close)
    };

    Ok(Quote {
        symbol: normalize_symbol(symbol),
        price,
        previous_close,
        open: last.map(|c| c.open),
        high: meta.regular_market_day_high.or_else(|| last.map(|c| c.high)),
        low: meta.regular_market_day_low.or_else(|| last.map(|c| c.low)),
        volume: meta.regular_market_volume.or_else(|| last.map(|c| c.volume)),
        bid: None,
        ask: None,
        currency: meta.currency.clone().unwrap_or_else(|| "ARS".to_string()),
        source: "Yahoo Finance".to_string(),
        ts: meta
            .regular_market_time
            .map(|t| t * 1000)
            .unwrap_or_else(|| Utc::now().timestamp_millis()),
    })
}
