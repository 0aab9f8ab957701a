use criterion::{black_box, criterion_group, criterion_main, Criterion};
use iolbot::config::{ScoringConfig, StrategiesConfig};
use iolbot::features::FeatureEngine;
use iolbot::scoring::{ScoreInputs, Scorer, Thresholds};
use iolbot::strategies::{RegimeDetector, StrategyContext, StrategySet};
use iolbot::types::{Candle, Timeframe};
use std::collections::HashMap;

fn series(n: usize) -> Vec<Candle> {
    let start = 1_700_000_000_000i64;
    (0..n)
        .map(|i| {
            let close = 1000.0 + (i as f64 * 0.15).sin() * 60.0 + i as f64 * 1.5;
            let ts = start + i as i64 * 86_400_000;
            Candle {
                open_time: ts,
                close_time: ts + 86_400_000,
                timeframe: Timeframe::Day1,
                open: close * 0.997,
                high: close * 1.015,
                low: close * 0.985,
                close,
                volume: 40_000.0 + (i % 9) as f64 * 5_000.0,
            }
        })
        .collect()
}

fn bench_scoring(c: &mut Criterion) {
    let candles = series(250);
    let engine = FeatureEngine::new();
    let regime = RegimeDetector::new();
    let scorer = Scorer::new(&ScoringConfig::default());
    let strategies = StrategySet::from_config(&StrategiesConfig {
        monte_carlo_simulations: 1_000,
        ..Default::default()
    });
    let thresholds = Thresholds { buy: 40, sell: -40 };

    c.bench_function("features_250_bars", |b| {
        b.iter(|| engine.compute(black_box(&candles)))
    });

    c.bench_function("strategies_250_bars", |b| {
        b.iter(|| {
            let ctx = StrategyContext::new("GGAL", black_box(&candles));
            strategies.evaluate_all(&ctx)
        })
    });

    c.bench_function("full_score_250_bars", |b| {
        b.iter(|| {
            let features = engine.compute(&candles)?;
            let ctx = StrategyContext::new("GGAL", &candles);
            let scores = strategies.evaluate_all(&ctx);
            let regime = regime.detect(&candles);
            let inputs = ScoreInputs {
                features: &features,
                prediction: None,
                sentiment: None,
                strategy_scores: &scores,
                regime: &regime,
                macro_score: None,
            };
            Some(scorer.score("GGAL", 1300.0, &inputs, thresholds, &HashMap::new()))
        })
    });
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
