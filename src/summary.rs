// src/summary.rs
//! Aggregate statistics over a scored result set (the KPI strip shown above
//! the item table).

use serde::Serialize;

use crate::pipeline::ScoredItem;
use crate::sentiment::SentimentLabel;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct SentimentSummary {
    pub total: usize,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    pub positive_pct: f64,
    pub neutral_pct: f64,
    pub negative_pct: f64,
    pub mean_polarity: f64,
    pub mean_subjectivity: f64,
}

impl SentimentSummary {
    pub fn from_items(items: &[ScoredItem]) -> Self {
        if items.is_empty() {
            return Self::default();
        }
        let count = |l: SentimentLabel| items.iter().filter(|i| i.sentiment_label == l).count();
        let total = items.len();
        let positive = count(SentimentLabel::Positive);
        let negative = count(SentimentLabel::Negative);
        let n = total as f64;

        let positive_pct = round1(positive as f64 / n * 100.0);
        let negative_pct = round1(negative as f64 / n * 100.0);
        Self {
            total,
            positive,
            neutral: total - positive - negative,
            negative,
            positive_pct,
            // remainder, so the three shares always add up to 100
            neutral_pct: round1(100.0 - positive_pct - negative_pct),
            negative_pct,
            mean_polarity: items.iter().map(|i| i.polarity).sum::<f64>() / n,
            mean_subjectivity: items.iter().map(|i| i.subjectivity).sum::<f64>() / n,
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceTag;
    use chrono::Utc;

    fn item(polarity: f64) -> ScoredItem {
        ScoredItem {
            id: "x".into(),
            raw_text: "x".into(),
            created_at: Utc::now(),
            source_tag: SourceTag::Synthetic,
            normalized_text: "x".into(),
            subjectivity: 0.5,
            polarity,
            sentiment_label: SentimentLabel::from_polarity(polarity),
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn empty_is_all_zero() {
        assert_eq!(SentimentSummary::from_items(&[]), SentimentSummary::default());
    }

    #[test]
    fn counts_and_percentages() {
        let items = vec![item(0.5), item(0.2), item(0.0), item(-0.4)];
        let s = SentimentSummary::from_items(&items);
        assert_eq!((s.total, s.positive, s.neutral, s.negative), (4, 2, 1, 1));
        assert_eq!(s.positive_pct, 50.0);
        assert_eq!(s.negative_pct, 25.0);
        assert_eq!(s.neutral_pct, 25.0);
        assert!((s.mean_polarity - 0.075).abs() < 1e-12);
        assert_eq!(s.mean_subjectivity, 0.5);
    }

    #[test]
    fn thirds_round_to_one_decimal() {
        let items = vec![item(1.0), item(0.0), item(-1.0)];
        let s = SentimentSummary::from_items(&items);
        assert_eq!(s.positive_pct, 33.3);
        assert_eq!(s.negative_pct, 33.3);
        assert_eq!(s.neutral_pct, 33.4);
    }
}
