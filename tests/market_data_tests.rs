//! Tests de la cadena de proveedores de datos

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use iolbot::market_data::{FallbackDataService, MarketDataProvider};
    use iolbot::types::{Candle, Quote, Timeframe};
    use mockall::{mock, predicate::eq};
    use std::sync::Arc;
    use std::time::Duration;

    mock! {
        pub Provider {}

        #[async_trait]
        impl MarketDataProvider for Provider {
            fn name(&self) -> String;
            async fn get_quote(&self, symbol: &str) -> Result<Quote>;
            async fn get_history(&self, symbol: &str, range: &str, timeframe: Timeframe) -> Result<Vec<Candle>>;
        }
    }

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price,
            ..Default::default()
        }
    }

    fn hourly(n: usize) -> Vec<Candle> {
        // 2024-01-02 00:00 UTC, aligned to a 4H bucket
        let start = 1_704_153_600_000i64;
        (0..n)
            .map(|i| {
                let ts = start + i as i64 * 3_600_000;
                Candle {
                    open_time: ts,
                    close_time: ts + 3_600_000,
                    timeframe: Timeframe::Hour1,
                    open: 100.0 + i as f64,
                    high: 101.0 + i as f64,
                    low: 99.0 + i as f64,
                    close: 100.5 + i as f64,
                    volume: 10.0,
                }
            })
            .collect()
    }

    fn named(name: &'static str) -> MockProvider {
        let mut p = MockProvider::new();
        p.expect_name().returning(move || name.to_string());
        p
    }

    // ============================================================================
    // Tests de Fallback
    // ============================================================================

    #[tokio::test]
    async fn test_quote_falls_back_to_second_provider() {
        let mut iol = named("IOL");
        iol.expect_get_quote()
            .with(eq("GGAL"))
            .times(1)
            .returning(|_| Err(anyhow!("401 Unauthorized")));
        let mut yahoo = named("Yahoo Finance");
        yahoo
            .expect_get_quote()
            .times(1)
            .returning(|s| Ok(quote(s, 1234.5)));

        let service = FallbackDataService::new(Duration::from_secs(60))
            .with_provider(Arc::new(iol))
            .with_provider(Arc::new(yahoo));

        let q = service.get_quote("GGAL").await.unwrap();
        assert_eq!(q.price, 1234.5);
        assert_eq!(service.provider_names(), vec!["IOL", "Yahoo Finance"]);
    }

    #[tokio::test]
    async fn test_zero_price_is_not_a_quote() {
        let mut only = named("IOL");
        only.expect_get_quote().returning(|s| Ok(quote(s, 0.0)));
        let service = FallbackDataService::new(Duration::from_secs(60)).with_provider(Arc::new(only));

        let err = service.get_quote("YPF").await.unwrap_err();
        assert!(err.to_string().contains("zero price"));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_failures() {
        let mut flaky = named("IOL");
        // five failures open the breaker; later calls never reach the provider
        flaky
            .expect_get_quote()
            .times(5)
            .returning(|_| Err(anyhow!("timeout")));
        let mut backup = named("Yahoo Finance");
        backup.expect_get_quote().times(8).returning(|s| Ok(quote(s, 10.0)));

        let service = FallbackDataService::new(Duration::from_secs(60))
            .with_provider(Arc::new(flaky))
            .with_provider(Arc::new(backup));

        for _ in 0..8 {
            assert_eq!(service.get_quote("PAMP").await.unwrap().price, 10.0);
        }
    }

    // ============================================================================
    // Tests de Historia
    // ============================================================================

    #[tokio::test]
    async fn test_history_is_cached() {
        let mut p = named("Yahoo Finance");
        p.expect_get_history()
            .with(eq("GGAL"), eq("1y"), eq(Timeframe::Day1))
            .times(1)
            .returning(|_, _, _| Ok(hourly(3)));
        let service = FallbackDataService::new(Duration::from_secs(60)).with_provider(Arc::new(p));

        let first = service.get_history("GGAL", "1y", Timeframe::Day1).await.unwrap();
        let second = service.get_history("GGAL", "1y", Timeframe::Day1).await.unwrap();
        assert_eq!(first.len(), second.len());

        service.clear_cache();
    }

    #[tokio::test]
    async fn test_four_hour_bars_built_from_hourly() {
        let mut p = named("Yahoo Finance");
        p.expect_get_history()
            .with(eq("AAPL"), eq("1mo"), eq(Timeframe::Hour1))
            .times(1)
            .returning(|_, _, _| Ok(hourly(8)));
        let service = FallbackDataService::new(Duration::from_secs(60)).with_provider(Arc::new(p));

        let bars = service.get_history("AAPL", "1mo", Timeframe::Hour4).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timeframe, Timeframe::Hour4);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].close, 103.5);
        assert_eq!(bars[0].high, 104.0);
        assert_eq!(bars[1].low, 103.0);
    }

    #[tokio::test]
    async fn test_empty_history_tries_next_provider() {
        let mut iol = named("IOL");
        iol.expect_get_history().returning(|_, _, _| Ok(Vec::new()));
        let mut yahoo = named("Yahoo Finance");
        yahoo.expect_get_history().returning(|_, _, _| Ok(hourly(2)));

        let service = FallbackDataService::new(Duration::from_secs(60))
            .with_provider(Arc::new(iol))
            .with_provider(Arc::new(yahoo));
        let bars = service.get_history("KO", "5d", Timeframe::Hour1).await.unwrap();
        assert_eq!(bars.len(), 2);
    }
}
