//! Score aggregation
//!
//! Turns features, prediction, sentiment, advanced strategy scores and the
//! macro context into one signed score, then into an action with confidence.
//! Positive points are buy factors, negative points sell factors.

pub mod meta_learner;

pub use meta_learner::{MetaLearner, MetaResult, TECHNICAL};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::features::Features;
use crate::strategies::{Prediction, RegimeInfo, SentimentLabel, SentimentSummary};
use crate::types::{Action, Confidence, MarketRegime, StrategyScore};

/// Extra distance past a threshold for HIGH confidence
const HIGH_CONFIDENCE_MARGIN: i32 = 25;

/// Buy / sell thresholds in score points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub buy: i32,
    pub sell: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { buy: 25, sell: -25 }
    }
}

/// Everything that feeds one score
pub struct ScoreInputs<'a> {
    pub features: &'a Features,
    pub prediction: Option<&'a Prediction>,
    pub sentiment: Option<&'a SentimentSummary>,
    pub strategy_scores: &'a [StrategyScore],
    pub regime: &'a RegimeInfo,
    pub macro_score: Option<&'a StrategyScore>,
}

/// Result of analyzing one symbol
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub symbol: String,
    pub price: f64,
    pub score: i32,
    pub action: Action,
    pub confidence: Confidence,
    pub buy_factors: Vec<String>,
    pub sell_factors: Vec<String>,
    /// Advanced strategy scores by name (gated ones included)
    pub strategy_scores: BTreeMap<String, i32>,
    pub regime: MarketRegime,
    pub size_multiplier: f64,
    pub atr: Option<f64>,
    /// Effective thresholds (regime adjustment applied)
    pub thresholds: Thresholds,
    /// Set when a filter vetoed the signal
    pub blocked_by: Option<String>,
    pub features: Features,
    pub timestamp: DateTime<Utc>,
}

impl Analysis {
    fn push_factor(&mut self, points: i32, factor: String) {
        self.score += points;
        if points >= 0 {
            self.buy_factors.push(factor);
        } else {
            self.sell_factors.push(factor);
        }
    }

    fn decide(&mut self) {
        let (action, confidence) = decide(self.score, self.thresholds);
        self.action = action;
        self.confidence = confidence;
    }

    /// Score adjustment after aggregation (correlation penalty); re-evaluates the action
    pub fn adjust(&mut self, points: i32, reason: impl Into<String>) {
        if points == 0 {
            return;
        }
        self.push_factor(points, reason.into());
        if self.blocked_by.is_none() {
            self.decide();
        }
    }

    /// Veto the signal: the action becomes HOLD
    pub fn block(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(symbol = %self.symbol, action = %self.action, reason = %reason, "Signal blocked");
        self.blocked_by = Some(reason);
        self.action = Action::Hold;
        self.confidence = Confidence::Low;
    }

    /// Strategies pointing in the direction of the action
    pub fn supporting_strategies(&self) -> Vec<String> {
        let sign = match self.action {
            Action::Buy => 1,
            Action::Sell => -1,
            Action::Hold => return Vec::new(),
        };
        let mut names: Vec<String> = self
            .strategy_scores
            .iter()
            .filter(|(_, s)| s.signum() == sign)
            .map(|(n, _)| n.clone())
            .collect();
        names.push(TECHNICAL.to_string());
        names
    }

    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold
    }
}

/// Minimum |score| an advanced strategy needs before it counts
pub fn passes_gate(name: &str, score: i32) -> bool {
    match name {
        "multi_timeframe" | "anomaly" | "volume_profile" | "monte_carlo" | "candlesticks" => {
            score.abs() > 5
        }
        "patterns" | "smart_money" => score.abs() > 10,
        _ => score != 0,
    }
}

/// Action and confidence for a score
pub fn decide(score: i32, t: Thresholds) -> (Action, Confidence) {
    if score >= t.buy {
        let c = if score >= t.buy + HIGH_CONFIDENCE_MARGIN {
            Confidence::High
        } else {
            Confidence::Medium
        };
        (Action::Buy, c)
    } else if score <= t.sell {
        let c = if score <= t.sell - HIGH_CONFIDENCE_MARGIN {
            Confidence::High
        } else {
            Confidence::Medium
        };
        (Action::Sell, c)
    } else {
        (Action::Hold, Confidence::Low)
    }
}

fn prediction_points(p: &Prediction) -> i32 {
    let base = if p.change_pct.abs() > 2.0 { 30 } else { 15 };
    let scaled = if p.source == "ai_model" {
        base
    } else {
        (base as f64 * 0.7) as i32
    };
    match p.action {
        Action::Buy => scaled,
        Action::Sell => -scaled,
        Action::Hold => 0,
    }
}

/// Open bands: exactly 30, 50 or 70 scores nothing
fn rsi_points(rsi: f64) -> i32 {
    if rsi < 30.0 {
        20
    } else if rsi > 70.0 {
        -20
    } else if rsi > 50.0 && rsi < 70.0 {
        5
    } else if rsi > 30.0 && rsi < 50.0 {
        -5
    } else {
        0
    }
}

fn sentiment_points(s: &SentimentSummary) -> i32 {
    let strength = s.score.abs();
    let points = if strength > 0.3 {
        20
    } else if strength > 0.15 {
        15
    } else {
        10
    };
    match s.label {
        SentimentLabel::Positive => points,
        SentimentLabel::Negative => -points,
        SentimentLabel::Neutral => 0,
    }
}

pub struct Scorer {
    meta: MetaLearner,
    meta_enabled: bool,
    min_adjustment: i32,
}

impl Scorer {
    pub fn new(cfg: &ScoringConfig) -> Self {
        Self {
            meta: MetaLearner::new(),
            meta_enabled: cfg.meta_learner_enabled,
            min_adjustment: cfg.meta_min_adjustment,
        }
    }

    /// Aggregate one symbol. `calibration` holds learned per-component weights.
    pub fn score(
        &self,
        symbol: &str,
        price: f64,
        inputs: &ScoreInputs<'_>,
        thresholds: Thresholds,
        calibration: &HashMap<String, f64>,
    ) -> Analysis {
        let f = inputs.features;
        let regime = inputs.regime;
        let mut a = Analysis {
            symbol: symbol.to_string(),
            price,
            score: 0,
            action: Action::Hold,
            confidence: Confidence::Low,
            buy_factors: Vec::new(),
            sell_factors: Vec::new(),
            strategy_scores: BTreeMap::new(),
            regime: regime.regime,
            size_multiplier: regime.size_multiplier,
            atr: f.atr,
            thresholds: Thresholds {
                buy: thresholds.buy + regime.threshold_adjustment,
                sell: thresholds.sell,
            },
            blocked_by: None,
            features: f.clone(),
            timestamp: Utc::now(),
        };

        if let Some(p) = inputs.prediction {
            let points = prediction_points(p);
            if points != 0 {
                a.push_factor(
                    points,
                    format!("Predicción {} {} ({:+.2}%) ({:+})", p.source, p.action, p.change_pct, points),
                );
            }
        }
        if let Some(rsi) = f.rsi {
            let points = rsi_points(rsi);
            a.push_factor(points, format!("RSI {:.1} ({:+})", rsi, points));
        }
        if let Some(bullish) = f.macd_bullish() {
            let points = if bullish { 15 } else { -15 };
            let label = if bullish { "MACD sobre señal" } else { "MACD bajo señal" };
            a.push_factor(points, format!("{} ({:+})", label, points));
        }
        if let Some(above) = f.above_sma20() {
            let points = if above { 10 } else { -10 };
            let label = if above { "Precio sobre SMA20" } else { "Precio bajo SMA20" };
            a.push_factor(points, format!("{} ({:+})", label, points));
        }
        if let Some(s) = inputs.sentiment.filter(|s| s.sample_size > 0) {
            let points = sentiment_points(s);
            if points != 0 {
                a.push_factor(
                    points,
                    format!("Sentimiento {} {:.2} (n={}) ({:+})", s.label, s.score, s.sample_size, points),
                );
            }
        }

        let technical = a.score;
        let mut components: BTreeMap<String, f64> = BTreeMap::new();
        for s in inputs.strategy_scores {
            a.strategy_scores.insert(s.name.clone(), s.score);
            if !passes_gate(&s.name, s.score) {
                continue;
            }
            components.insert(s.name.clone(), s.score as f64);
            let detail = if s.factors.is_empty() {
                String::new()
            } else {
                format!(": {}", s.factors.join(", "))
            };
            a.push_factor(s.score, format!("{} ({:+}){}", s.name, s.score, detail));
        }

        if self.meta_enabled && !components.is_empty() {
            components.insert(TECHNICAL.to_string(), technical as f64);
            let meta = self.meta.combine(&components, regime.regime, calibration);
            let blended = meta.final_score.round() as i32;
            let delta = blended - a.score;
            if delta.abs() > self.min_adjustment {
                debug!(symbol, raw = a.score, blended, regime = %regime.regime, "Meta-learner adjusted score");
                a.push_factor(delta, format!("Meta-learner {} ({:+})", regime.regime, delta));
            }
        }

        if let Some(m) = inputs.macro_score.filter(|m| m.score != 0) {
            a.push_factor(m.score, format!("Macro ({:+}): {}", m.score, m.factors.join(", ")));
        }

        a.decide();
        debug!(
            symbol,
            score = a.score,
            action = %a.action,
            confidence = %a.confidence,
            buy_threshold = a.thresholds.buy,
            sell_threshold = a.thresholds.sell,
            "Score aggregated"
        );
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullish_features() -> Features {
        Features {
            close: 110.0,
            rsi: Some(28.0),
            macd: Some(1.0),
            macd_signal: Some(0.5),
            sma_20: Some(100.0),
            atr: Some(2.0),
            ..Default::default()
        }
    }

    fn scorer(meta: bool) -> Scorer {
        Scorer::new(&ScoringConfig {
            meta_learner_enabled: meta,
            ..Default::default()
        })
    }

    #[test]
    fn test_technical_core_and_thresholds() {
        let f = bullish_features();
        let regime = RegimeInfo::default();
        let prediction = Prediction {
            action: Action::Buy,
            predicted_price: 115.0,
            change_pct: 4.5,
            source: "trend_model".into(),
        };
        let inputs = ScoreInputs {
            features: &f,
            prediction: Some(&prediction),
            sentiment: None,
            strategy_scores: &[],
            regime: &regime,
            macro_score: None,
        };
        let a = scorer(true).score("GGAL", 110.0, &inputs, Thresholds::default(), &HashMap::new());
        // 21 (30 × 0.7) + 20 + 15 + 10
        assert_eq!(a.score, 66);
        assert_eq!(a.action, Action::Buy);
        assert_eq!(a.confidence, Confidence::High);
        assert_eq!(a.buy_factors.len(), 4);
        assert!(a.sell_factors.is_empty());
    }

    #[test]
    fn test_rsi_band_edges_score_zero() {
        assert_eq!(rsi_points(29.9), 20);
        assert_eq!(rsi_points(30.0), 0);
        assert_eq!(rsi_points(40.0), -5);
        assert_eq!(rsi_points(50.0), 0);
        assert_eq!(rsi_points(60.0), 5);
        assert_eq!(rsi_points(70.0), 0);
        assert_eq!(rsi_points(70.1), -20);
    }

    #[test]
    fn test_gates_and_regime_threshold() {
        let f = Features {
            close: 100.0,
            rsi: Some(55.0),
            ..Default::default()
        };
        let regime = RegimeInfo {
            regime: MarketRegime::Ranging,
            threshold_adjustment: 10,
            size_multiplier: 0.8,
            ..Default::default()
        };
        let scores = vec![
            StrategyScore { name: "patterns".into(), score: 10, factors: vec![] },
            StrategyScore { name: "seasonal".into(), score: 5, factors: vec![] },
            StrategyScore { name: "smart_money".into(), score: 25, factors: vec![] },
        ];
        let inputs = ScoreInputs {
            features: &f,
            prediction: None,
            sentiment: None,
            strategy_scores: &scores,
            regime: &regime,
            macro_score: None,
        };
        let a = scorer(false).score("YPF", 100.0, &inputs, Thresholds::default(), &HashMap::new());
        // 5 (RSI) + 5 (seasonal) + 25 (smart money); patterns gated out
        assert_eq!(a.score, 35);
        assert_eq!(a.thresholds.buy, 35);
        assert_eq!(a.action, Action::Buy);
        assert_eq!(a.confidence, Confidence::Medium);
        assert_eq!(a.strategy_scores["patterns"], 10);
        assert_eq!(a.size_multiplier, 0.8);
    }

    #[test]
    fn test_sentiment_requires_samples() {
        let f = Features::default();
        let regime = RegimeInfo::default();
        let empty = SentimentSummary::neutral("GGAL");
        let negative = SentimentSummary {
            symbol: "GGAL".into(),
            label: SentimentLabel::Negative,
            score: -0.4,
            sample_size: 3,
        };
        let mut inputs = ScoreInputs {
            features: &f,
            prediction: None,
            sentiment: Some(&empty),
            strategy_scores: &[],
            regime: &regime,
            macro_score: None,
        };
        let s = scorer(false);
        assert_eq!(s.score("GGAL", 1.0, &inputs, Thresholds::default(), &HashMap::new()).score, 0);
        inputs.sentiment = Some(&negative);
        let a = s.score("GGAL", 1.0, &inputs, Thresholds::default(), &HashMap::new());
        assert_eq!(a.score, -20);
        assert_eq!(a.sell_factors.len(), 1);
    }

    #[test]
    fn test_meta_learner_only_applies_large_adjustments() {
        let f = bullish_features();
        let regime = RegimeInfo {
            regime: MarketRegime::Volatile,
            threshold_adjustment: 15,
            size_multiplier: 0.5,
            ..Default::default()
        };
        let scores = vec![StrategyScore { name: "monte_carlo".into(), score: 30, factors: vec![] }];
        let inputs = ScoreInputs {
            features: &f,
            prediction: None,
            sentiment: None,
            strategy_scores: &scores,
            regime: &regime,
            macro_score: None,
        };
        let raw = scorer(false).score("GGAL", 110.0, &inputs, Thresholds::default(), &HashMap::new());
        let blended = scorer(true).score("GGAL", 110.0, &inputs, Thresholds::default(), &HashMap::new());
        assert_eq!(raw.score, 75);
        // technical 45 × 0.727 + 30 × 1.273 = 70.9 → 71, delta 4 is ignored
        assert_eq!(blended.score, 75);
    }

    #[test]
    fn test_decide_confidence_bands() {
        let t = Thresholds::default();
        assert_eq!(decide(50, t), (Action::Buy, Confidence::High));
        assert_eq!(decide(25, t), (Action::Buy, Confidence::Medium));
        assert_eq!(decide(0, t), (Action::Hold, Confidence::Low));
        assert_eq!(decide(-25, t), (Action::Sell, Confidence::Medium));
        assert_eq!(decide(-50, t), (Action::Sell, Confidence::High));
    }

    #[test]
    fn test_block_and_supporting() {
        let f = bullish_features();
        let regime = RegimeInfo::default();
        let scores = vec![
            StrategyScore { name: "candlesticks".into(), score: 20, factors: vec![] },
            StrategyScore { name: "anomaly".into(), score: -10, factors: vec![] },
        ];
        let inputs = ScoreInputs {
            features: &f,
            prediction: None,
            sentiment: None,
            strategy_scores: &scores,
            regime: &regime,
            macro_score: None,
        };
        let mut a = scorer(false).score("GGAL", 110.0, &inputs, Thresholds::default(), &HashMap::new());
        assert_eq!(a.action, Action::Buy);
        assert_eq!(a.supporting_strategies(), vec!["candlesticks".to_string(), TECHNICAL.to_string()]);
        a.adjust(-10, "Correlación alta con YPF (-10)");
        assert_eq!(a.score, 45);
        a.block("RSI fuera de rango");
        assert_eq!(a.action, Action::Hold);
        assert!(a.supporting_strategies().is_empty());
    }
}
