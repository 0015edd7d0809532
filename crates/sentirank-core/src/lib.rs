//! Core domain model for SentiRank: ranked product summaries, sentiment buckets and
//! synthetic review records.

use serde::{Deserialize, Serialize};

mod validate;

pub use validate::{
    validate_records, RawProductSummary, ValidatedBatch, ValidationError, ValidationFailure,
    ValidationMode,
};

pub const CRATE_NAME: &str = "sentirank-core";

/// Lower bound (inclusive) of the highly positive bucket.
pub const HIGHLY_POSITIVE_THRESHOLD: f64 = 0.7;
/// Lower bound (inclusive) of the neutral bucket.
pub const NEUTRAL_THRESHOLD: f64 = 0.5;

/// One product's upstream-computed sentiment and ranking snapshot.
///
/// Lists of summaries arrive ordered by descending `composite_score`; the rank of a
/// product is its 1-based position in that list and is never stored on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub name: String,
    pub link: String,
    pub price: Option<String>,
    pub rating: Option<f64>,
    pub review_count: u64,
    pub average_sentiment: f64,
    pub positive_ratio: f64,
    pub composite_score: f64,
    pub last_updated: String,
}

impl ProductSummary {
    pub fn bucket(&self) -> SentimentBucket {
        SentimentBucket::classify(self.average_sentiment)
    }
}

/// Classification of a product's average sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBucket {
    HighlyPositive,
    Neutral,
    Negative,
}

impl SentimentBucket {
    pub const ALL: [SentimentBucket; 3] = [
        SentimentBucket::HighlyPositive,
        SentimentBucket::Neutral,
        SentimentBucket::Negative,
    ];

    pub fn classify(average_sentiment: f64) -> Self {
        if average_sentiment >= HIGHLY_POSITIVE_THRESHOLD {
            SentimentBucket::HighlyPositive
        } else if average_sentiment >= NEUTRAL_THRESHOLD {
            SentimentBucket::Neutral
        } else {
            SentimentBucket::Negative
        }
    }

    /// Badge text shown next to a product.
    pub fn display_label(self) -> &'static str {
        match self {
            SentimentBucket::HighlyPositive => "Positive",
            SentimentBucket::Neutral => "Neutral",
            SentimentBucket::Negative => "Negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic review produced for a drill-down. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub text: String,
    pub sentiment_label: SentimentLabel,
    pub score: f64,
}

/// Converts a ratio into a whole percentage, rounding half away from zero.
pub fn percent(ratio: f64) -> u32 {
    let pct = (100.0 * ratio).round();
    if pct <= 0.0 {
        0
    } else {
        pct as u32
    }
}

/// First two whitespace-separated tokens of a product name, joined by one space.
pub fn short_name(name: &str) -> String {
    name.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries_are_inclusive_at_the_lower_edge() {
        assert_eq!(SentimentBucket::classify(0.7), SentimentBucket::HighlyPositive);
        assert_eq!(SentimentBucket::classify(0.6999), SentimentBucket::Neutral);
        assert_eq!(SentimentBucket::classify(0.5), SentimentBucket::Neutral);
        assert_eq!(SentimentBucket::classify(0.4999), SentimentBucket::Negative);
        assert_eq!(SentimentBucket::classify(0.0), SentimentBucket::Negative);
        assert_eq!(SentimentBucket::classify(1.0), SentimentBucket::HighlyPositive);
    }

    #[test]
    fn percent_rounds_half_away_from_zero() {
        assert_eq!(percent(0.125), 13);
        assert_eq!(percent(0.124), 12);
        assert_eq!(percent(0.005), 1);
        assert_eq!(percent(0.625), 63);
        assert_eq!(percent(1.0 - 0.875), 13);
        assert_eq!(percent(0.0), 0);
        assert_eq!(percent(1.0), 100);
    }

    #[test]
    fn short_name_takes_first_two_tokens() {
        assert_eq!(
            short_name("Apple iPhone 15 Pro Max (256GB) - Natural Titanium"),
            "Apple iPhone"
        );
        assert_eq!(short_name("  Pixel   8  "), "Pixel 8");
        assert_eq!(short_name("Nothing"), "Nothing");
        assert_eq!(short_name(""), "");
    }

    #[test]
    fn short_name_is_a_pure_function_of_name() {
        let name = "Samsung Galaxy S24 Ultra 5G";
        assert_eq!(short_name(name), short_name(&name.to_string()));
        assert_eq!(short_name(&short_name(name)), short_name(name));
    }

    #[test]
    fn sentiment_label_serializes_snake_case() {
        let json = serde_json::to_string(&SentimentLabel::Positive).unwrap();
        assert_eq!(json, "\"positive\"");
        let bucket = serde_json::to_string(&SentimentBucket::HighlyPositive).unwrap();
        assert_eq!(bucket, "\"highly_positive\"");
    }
}
