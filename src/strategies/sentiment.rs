//! Keyword news sentiment with a rolling JSON history

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

const POSITIVE_WORDS: &[&str] = &[
    "ganancia",
    "crecimiento",
    "sube",
    "aumenta",
    "mejora",
    "éxito",
    "fuerte",
    "positivo",
    "bullish",
    "rally",
];

const NEGATIVE_WORDS: &[&str] = &[
    "pérdida",
    "cae",
    "baja",
    "débil",
    "negativo",
    "bearish",
    "caída",
    "recesión",
    "crisis",
];

/// Entries kept on disk
const MAX_HISTORY: usize = 5_000;
/// Entries considered for the current sentiment
const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    fn from_score(score: f64) -> Self {
        if score > 0.1 {
            SentimentLabel::Positive
        } else if score < -0.1 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "POSITIVE"),
            SentimentLabel::Negative => write!(f, "NEGATIVE"),
            SentimentLabel::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// One analyzed news text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentEntry {
    pub symbol: String,
    pub sentiment: SentimentLabel,
    pub score: f64,
    pub positive_words: usize,
    pub negative_words: usize,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate over the recent entries of one symbol
#[derive(Debug, Clone, Serialize)]
pub struct SentimentSummary {
    pub symbol: String,
    pub label: SentimentLabel,
    pub score: f64,
    pub sample_size: usize,
}

impl SentimentSummary {
    pub fn neutral(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            label: SentimentLabel::Neutral,
            score: 0.0,
            sample_size: 0,
        }
    }
}

/// (pos − neg) keyword hits over the word count
pub fn score_text(text: &str) -> (f64, usize, usize) {
    let lower = text.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let words = text.split_whitespace().count();
    if words == 0 {
        return (0.0, positive, negative);
    }
    ((positive as f64 - negative as f64) / words as f64, positive, negative)
}

pub struct SentimentAnalyzer {
    path: Option<PathBuf>,
    history: RwLock<Vec<SentimentEntry>>,
}

impl SentimentAnalyzer {
    /// In-memory analyzer (tests, backtests)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            history: RwLock::new(Vec::new()),
        }
    }

    /// Analyzer backed by `{data_dir}/sentiment_history.json`
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let path = data_dir.as_ref().join("sentiment_history.json");
        let history = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str(&raw) {
                Ok(h) => h,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "⚠️ Historial de sentimiento corrupto, se reinicia");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            history: RwLock::new(history),
        })
    }

    fn save(&self, history: &[SentimentEntry]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(history)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Score a news text for `symbol` and store it
    pub fn analyze_text(&self, symbol: &str, text: &str) -> Result<SentimentEntry> {
        let (score, positive_words, negative_words) = score_text(text);
        let entry = SentimentEntry {
            symbol: symbol.to_string(),
            sentiment: SentimentLabel::from_score(score),
            score,
            positive_words,
            negative_words,
            timestamp: Utc::now(),
        };
        debug!(symbol, score, sentiment = %entry.sentiment, "News sentiment analyzed");

        let snapshot = {
            let mut history = self
                .history
                .write()
                .map_err(|_| anyhow::anyhow!("sentiment history lock poisoned"))?;
            history.push(entry.clone());
            if history.len() > MAX_HISTORY {
                let excess = history.len() - MAX_HISTORY;
                history.drain(..excess);
            }
            history.clone()
        };
        self.save(&snapshot)?;
        Ok(entry)
    }

    /// Average of the last 7 days of entries for `symbol`
    pub fn summary(&self, symbol: &str) -> SentimentSummary {
        self.summary_at(symbol, Utc::now())
    }

    pub fn summary_at(&self, symbol: &str, now: DateTime<Utc>) -> SentimentSummary {
        let cutoff = now - Duration::days(RECENT_DAYS);
        let Ok(history) = self.history.read() else {
            return SentimentSummary::neutral(symbol);
        };
        let scores: Vec<f64> = history
            .iter()
            .filter(|e| e.symbol == symbol && e.timestamp >= cutoff)
            .map(|e| e.score)
            .collect();
        if scores.is_empty() {
            return SentimentSummary::neutral(symbol);
        }
        let avg = scores.iter().sum::<f64>() / scores.len() as f64;
        SentimentSummary {
            symbol: symbol.to_string(),
            label: SentimentLabel::from_score(avg),
            score: avg,
            sample_size: scores.len(),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.read().map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_text() {
        let (score, pos, neg) = score_text("GGAL sube fuerte rally");
        assert_eq!((pos, neg), (3, 0));
        assert!((score - 0.75).abs() < 1e-9);

        let (score, _, neg) = score_text("Crisis y caída del mercado");
        assert_eq!(neg, 2);
        assert!(score < -0.1);

        assert_eq!(score_text("").0, 0.0);
    }

    #[test]
    fn test_summary_averages_recent_entries() {
        let analyzer = SentimentAnalyzer::in_memory();
        analyzer.analyze_text("YPF", "YPF sube fuerte").unwrap();
        analyzer.analyze_text("YPF", "resultados neutros hoy").unwrap();
        analyzer.analyze_text("GGAL", "crisis").unwrap();

        let s = analyzer.summary("YPF");
        assert_eq!(s.sample_size, 2);
        assert_eq!(s.label, SentimentLabel::Positive);

        let old = analyzer.summary_at("YPF", Utc::now() + Duration::days(8));
        assert_eq!(old.sample_size, 0);
        assert_eq!(old.label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_history_persists() {
        let dir = std::env::temp_dir().join(format!("iolbot-sent-{}", uuid::Uuid::new_v4()));
        {
            let analyzer = SentimentAnalyzer::open(&dir).unwrap();
            analyzer.analyze_text("PAMP", "mejora y crecimiento").unwrap();
        }
        let reopened = SentimentAnalyzer::open(&dir).unwrap();
        assert_eq!(reopened.history_len(), 1);
        assert_eq!(reopened.summary("PAMP").label, SentimentLabel::Positive);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
