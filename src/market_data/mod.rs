//! Market data providers and the fallback chain
//!
//! - `MarketDataProvider`: common async interface implemented by IOL and Yahoo
//! - `FallbackDataService`: first provider that answers wins, per-provider circuit breaker
//! - History cache with TTL, 4H bars resampled from 1H

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::iol::IolClient;
use crate::types::{local_now, Candle, Quote, Timeframe};
use crate::yahoo::YahooClient;

/// Common interface for quote/history sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> String;

    /// Latest quote
    async fn get_quote(&self, symbol: &str) -> Result<Quote>;

    /// Candles (oldest first) for a Yahoo-style range ("1y", "1mo")
    async fn get_history(&self, symbol: &str, range: &str, timeframe: Timeframe)
        -> Result<Vec<Candle>>;
}

/// Convert a Yahoo-style range ("5d", "1mo", "2y") to calendar days
pub fn range_to_days(range: &str) -> Option<i64> {
    let range = range.trim().to_lowercase();
    let (num, unit) = if let Some(n) = range.strip_suffix("mo") {
        (n, 30)
    } else if let Some(n) = range.strip_suffix('y') {
        (n, 365)
    } else if let Some(n) = range.strip_suffix('d') {
        (n, 1)
    } else {
        return None;
    };
    num.parse::<i64>().ok().map(|n| n * unit)
}

#[async_trait]
impl MarketDataProvider for IolClient {
    fn name(&self) -> String {
        "IOL".to_string()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        Ok(IolClient::get_quote(self, symbol, None).await?)
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>> {
        if timeframe != Timeframe::Day1 {
            bail!("IOL only serves daily history");
        }
        let days = range_to_days(range).ok_or_else(|| anyhow!("Invalid range {}", range))?;
        let to = local_now().date_naive();
        let from: NaiveDate = to - chrono::Duration::days(days);
        Ok(IolClient::get_history(self, symbol, from, to).await?)
    }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    fn name(&self) -> String {
        "Yahoo Finance".to_string()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        YahooClient::get_quote(self, symbol).await
    }

    async fn get_history(
        &self,
        symbol: &str,
        range: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>> {
        YahooClient::get_history(self, symbol, range, timeframe).await
    }
}

/// Merge candles into buckets of `timeframe` (e.g. 1H -> 4H), oldest first
pub fn resample(candles: &[Candle], timeframe: Timeframe) -> Vec<Candle> {
    let bucket_ms = timeframe.duration_secs() as i64 * 1000;
    let mut out: Vec<Candle> = Vec::new();
    for c in candles {
        let bucket = c.open_time - c.open_time.rem_euclid(bucket_ms);
        match out.last_mut() {
            Some(last) if last.open_time == bucket => {
                last.high = last.high.max(c.high);
                last.low = last.low.min(c.low);
                last.close = c.close;
                last.volume += c.volume;
            }
            _ => out.push(Candle {
                open_time: bucket,
                close_time: bucket + bucket_ms,
                timeframe,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            }),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────
// Circuit breaker
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Half-open probe call currently in flight
    trial_started: Option<Instant>,
}

/// Skips a provider after `failure_threshold` consecutive failures for `cooldown`
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_started: None,
            }),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut BreakerInner) -> R) -> R {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.with_inner(|i| i.state)
    }

    /// Whether a call may go through. Open breakers become half-open after the
    /// cooldown and then let exactly one trial call through until it reports
    /// back. A trial that never reports expires after another cooldown.
    pub fn allow(&self) -> bool {
        let cooldown = self.cooldown;
        self.with_inner(|i| match i.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if i.trial_started.map(|t| t.elapsed() >= cooldown).unwrap_or(true) {
                    i.trial_started = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            BreakerState::Open => {
                if i.opened_at.map(|t| t.elapsed() >= cooldown).unwrap_or(true) {
                    i.state = BreakerState::HalfOpen;
                    i.trial_started = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
        })
    }

    pub fn record_success(&self) {
        self.with_inner(|i| {
            i.state = BreakerState::Closed;
            i.consecutive_failures = 0;
            i.opened_at = None;
            i.trial_started = None;
        })
    }

    pub fn record_failure(&self) {
        let threshold = self.failure_threshold;
        self.with_inner(|i| {
            i.consecutive_failures += 1;
            i.trial_started = None;
            if i.state == BreakerState::HalfOpen || i.consecutive_failures >= threshold {
                i.state = BreakerState::Open;
                i.opened_at = Some(Instant::now());
            }
        })
    }

    /// The call neither proved nor disproved the provider (empty history):
    /// free the half-open slot without changing state.
    pub fn release(&self) {
        self.with_inner(|i| i.trial_started = None)
    }
}

// ─────────────────────────────────────────────────────────────────
// Fallback service
// ─────────────────────────────────────────────────────────────────

struct ProviderSlot {
    provider: Arc<dyn MarketDataProvider>,
    breaker: CircuitBreaker,
}

type HistoryKey = (String, String, Timeframe);

/// Ordered provider chain with a history cache
pub struct FallbackDataService {
    providers: Vec<ProviderSlot>,
    cache: RwLock<HashMap<HistoryKey, (Instant, Vec<Candle>)>>,
    cache_ttl: Duration,
}

impl FallbackDataService {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            providers: Vec::new(),
            cache: RwLock::new(HashMap::new()),
            cache_ttl,
        }
    }

    /// Append a provider (earlier providers are preferred)
    pub fn with_provider(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.providers.push(ProviderSlot {
            provider,
            breaker: CircuitBreaker::new(5, Duration::from_secs(60)),
        });
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.provider.name()).collect()
    }

    /// First successful quote from the chain
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let mut errors = Vec::new();
        for slot in &self.providers {
            let name = slot.provider.name();
            if !slot.breaker.allow() {
                debug!(provider = %name, symbol = symbol, "Circuit open, skipping provider");
                continue;
            }
            match slot.provider.get_quote(symbol).await {
                Ok(quote) if quote.price > 0.0 => {
                    slot.breaker.record_success();
                    return Ok(quote);
                }
                Ok(_) => {
                    slot.breaker.record_failure();
                    errors.push(format!("{}: zero price", name));
                }
                Err(e) => {
                    slot.breaker.record_failure();
                    warn!(provider = %name, symbol = symbol, error = %e, "⚠️ Quote failed, trying next provider");
                    errors.push(format!("{}: {}", name, e));
                }
            }
        }
        bail!("No provider could quote {}: [{}]", symbol, errors.join("; "))
    }

    fn cached(&self, key: &HistoryKey) -> Option<Vec<Candle>> {
        let cache = self.cache.read().ok()?;
        let (at, candles) = cache.get(key)?;
        if at.elapsed() < self.cache_ttl {
            Some(candles.clone())
        } else {
            None
        }
    }

    /// History (oldest first). 4H is built from 1H bars.
    pub async fn get_history(
        &self,
        symbol: &str,
        range: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>> {
        let key = (symbol.to_string(), range.to_string(), timeframe);
        if let Some(candles) = self.cached(&key) {
            return Ok(candles);
        }

        let fetch_tf = if timeframe == Timeframe::Hour4 {
            Timeframe::Hour1
        } else {
            timeframe
        };

        let mut errors = Vec::new();
        for slot in &self.providers {
            let name = slot.provider.name();
            if !slot.breaker.allow() {
                continue;
            }
            match slot.provider.get_history(symbol, range, fetch_tf).await {
                Ok(candles) if !candles.is_empty() => {
                    slot.breaker.record_success();
                    let candles = if timeframe == Timeframe::Hour4 {
                        resample(&candles, Timeframe::Hour4)
                    } else {
                        candles
                    };
                    if let Ok(mut cache) = self.cache.write() {
                        cache.insert(key, (Instant::now(), candles.clone()));
                    }
                    return Ok(candles);
                }
                Ok(_) => {
                    slot.breaker.release();
                    errors.push(format!("{}: empty history", name));
                }
                Err(e) => {
                    slot.breaker.release();
                    // "only daily" style errors are not provider failures
                    debug!(provider = %name, symbol = symbol, error = %e, "History not available");
                    errors.push(format!("{}: {}", name, e));
                }
            }
        }
        bail!(
            "No provider returned {} history for {}: [{}]",
            timeframe,
            symbol,
            errors.join("; ")
        )
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(price: f64, source: &str) -> Quote {
        Quote {
            symbol: "GGAL".into(),
            price,
            source: source.into(),
            ..Default::default()
        }
    }

    fn hourly(n: usize) -> Vec<Candle> {
        // 2024-03-04 12:00 UTC, aligned to a 4h bucket
        let start = 1_709_553_600_000i64;
        (0..n)
            .map(|i| Candle {
                open_time: start + i as i64 * 3_600_000,
                close_time: start + (i as i64 + 1) * 3_600_000,
                timeframe: Timeframe::Hour1,
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn test_range_to_days() {
        assert_eq!(range_to_days("1y"), Some(365));
        assert_eq!(range_to_days("3mo"), Some(90));
        assert_eq!(range_to_days("5d"), Some(5));
        assert_eq!(range_to_days("max"), None);
    }

    #[test]
    fn test_resample_hourly_to_four_hours() {
        let bars = resample(&hourly(8), Timeframe::Hour4);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].close, 103.5);
        assert_eq!(bars[0].high, 104.0);
        assert_eq!(bars[0].volume, 40.0);
        assert_eq!(bars[1].timeframe, Timeframe::Hour4);
    }

    #[test]
    fn test_fallback_uses_second_provider_when_first_fails() {
        let mut primary = MockMarketDataProvider::new();
        primary.expect_name().return_const("IOL".to_string());
        primary
            .expect_get_quote()
            .returning(|_| Err(anyhow!("401 unauthorized")));

        let mut secondary = MockMarketDataProvider::new();
        secondary.expect_name().return_const("Yahoo Finance".to_string());
        secondary
            .expect_get_quote()
            .returning(|_| Ok(quote(1500.0, "Yahoo Finance")));

        let service = FallbackDataService::new(Duration::from_secs(60))
            .with_provider(Arc::new(primary))
            .with_provider(Arc::new(secondary));

        let q = tokio_test::block_on(service.get_quote("GGAL")).unwrap();
        assert_eq!(q.source, "Yahoo Finance");
        assert_eq!(q.price, 1500.0);
    }

    #[test]
    fn test_all_providers_failing_is_an_error() {
        let mut only = MockMarketDataProvider::new();
        only.expect_name().return_const("IOL".to_string());
        only.expect_get_quote().returning(|_| Ok(quote(0.0, "IOL")));
        let service = FallbackDataService::new(Duration::from_secs(60)).with_provider(Arc::new(only));
        assert!(tokio_test::block_on(service.get_quote("GGAL")).is_err());
    }

    #[test]
    fn test_history_is_cached() {
        let mut provider = MockMarketDataProvider::new();
        provider.expect_name().return_const("Yahoo Finance".to_string());
        provider
            .expect_get_history()
            .times(1)
            .returning(|_, _, _| Ok(hourly(8)));
        let service =
            FallbackDataService::new(Duration::from_secs(60)).with_provider(Arc::new(provider));

        let first = tokio_test::block_on(service.get_history("GGAL", "1mo", Timeframe::Hour4)).unwrap();
        let second = tokio_test::block_on(service.get_history("GGAL", "1mo", Timeframe::Hour4)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_circuit_breaker_opens_and_recovers() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_lets_a_single_trial_through() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(30));

        // first caller gets the trial, a concurrent one is refused
        assert!(breaker.allow());
        assert!(!breaker.allow());
        assert!(!breaker.allow());

        // failed trial: open again for a full cooldown
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow());
        assert!(!breaker.allow());
        // an inconclusive trial frees the slot
        breaker.release();
        assert!(breaker.allow());
        breaker.record_success();
        assert!(breaker.allow());
        assert!(breaker.allow());
    }
}
