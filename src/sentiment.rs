// src/sentiment.rs
//! Sentiment scoring: a swappable text model producing
//! (subjectivity, polarity) plus the exact polarity → label mapping.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// word -> [polarity, subjectivity]
static LEXICON: Lazy<HashMap<String, [f64; 2]>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, [f64; 2]>>(raw).expect("valid sentiment lexicon")
});

/// Negated words have their polarity scaled by this factor.
const NEGATION_FACTOR: f64 = -0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// `< 0` Negative, `== 0` Neutral, `> 0` Positive. NaN is Neutral.
    pub fn from_polarity(p: f64) -> Self {
        match p.partial_cmp(&0.0) {
            Some(std::cmp::Ordering::Less) => SentimentLabel::Negative,
            Some(std::cmp::Ordering::Greater) => SentimentLabel::Positive,
            _ => SentimentLabel::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::Negative => "Negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentScore {
    pub subjectivity: f64,
    pub polarity: f64,
    pub label: SentimentLabel,
}

/// Linguistic model: text -> (subjectivity in [0,1], polarity in [-1,1]).
pub trait SentimentModel: Send + Sync {
    fn analyze(&self, text: &str) -> (f64, f64);
}

/// Lexicon averaging model with intensifiers and a short negation lookback.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconModel;

impl LexiconModel {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn entry(&self, w: &str) -> Option<[f64; 2]> {
        LEXICON.get(w).copied()
    }
}

impl SentimentModel for LexiconModel {
    fn analyze(&self, text: &str) -> (f64, f64) {
        // indexed backwards for negation, so collect
        let tokens: Vec<String> = tokenize(text).collect();
        let mut pol_sum = 0.0;
        let mut subj_sum = 0.0;
        let mut hits = 0usize;

        for (i, w) in tokens.iter().enumerate() {
            let Some([mut pol, mut subj]) = self.entry(w) else {
                continue;
            };
            if i > 0 {
                if let Some(f) = intensifier(&tokens[i - 1]) {
                    pol *= f;
                    subj *= f;
                }
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(&tokens[i - k]));
            if negated {
                pol *= NEGATION_FACTOR;
            }
            pol_sum += pol;
            subj_sum += subj;
            hits += 1;
        }

        if hits == 0 {
            return (0.0, 0.0);
        }
        let n = hits as f64;
        ((subj_sum / n).clamp(0.0, 1.0), (pol_sum / n).clamp(-1.0, 1.0))
    }
}

/// Lower-case word tokens; apostrophes stay inside words so "don't" survives.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn intensifier(tok: &str) -> Option<f64> {
    match tok {
        "very" | "really" | "so" | "super" | "highly" => Some(1.3),
        "extremely" | "incredibly" => Some(1.5),
        "pretty" | "quite" => Some(1.1),
        _ => None,
    }
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "doesn't"
            | "didn't"
            | "without"
            | "hardly"
    )
}

#[derive(Clone)]
pub struct SentimentScorer {
    model: Arc<dyn SentimentModel>,
}

impl Default for SentimentScorer {
    fn default() -> Self {
        Self::new(Arc::new(LexiconModel::new()))
    }
}

impl SentimentScorer {
    pub fn new(model: Arc<dyn SentimentModel>) -> Self {
        Self { model }
    }

    /// Score already-normalized, non-empty text.
    pub fn score(&self, normalized: &str) -> SentimentScore {
        let (subjectivity, polarity) = self.model.analyze(normalized);
        SentimentScore {
            subjectivity,
            polarity,
            label: SentimentLabel::from_polarity(polarity),
        }
    }
}
