//! Cross-product summary numbers for the insights view.

use sentirank_core::{percent, ProductSummary, SentimentBucket};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub highly_positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl BucketCounts {
    pub fn get(&self, bucket: SentimentBucket) -> usize {
        match bucket {
            SentimentBucket::HighlyPositive => self.highly_positive,
            SentimentBucket::Neutral => self.neutral,
            SentimentBucket::Negative => self.negative,
        }
    }

    pub fn total(&self) -> usize {
        self.highly_positive + self.neutral + self.negative
    }

    fn bump(&mut self, bucket: SentimentBucket) {
        match bucket {
            SentimentBucket::HighlyPositive => self.highly_positive += 1,
            SentimentBucket::Neutral => self.neutral += 1,
            SentimentBucket::Negative => self.negative += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsightStats {
    pub total_products: usize,
    pub total_reviews: u64,
    pub average_sentiment_pct: u32,
    pub top_composite_pct: u32,
    pub buckets: BucketCounts,
}

/// Headline for the rank-1 product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopPerformer {
    pub name: String,
    pub composite_pct: u32,
    pub positive_pct: u32,
    pub bucket: SentimentBucket,
}

/// Computes the insight statistics for an ordered product list. An empty list yields all zeros.
pub fn aggregate(products: &[ProductSummary]) -> InsightStats {
    if products.is_empty() {
        return InsightStats::default();
    }

    let mut buckets = BucketCounts::default();
    let mut total_reviews = 0u64;
    let mut sentiment_sum = 0.0f64;
    let mut top_composite = f64::NEG_INFINITY;

    for p in products {
        buckets.bump(p.bucket());
        total_reviews += p.review_count;
        sentiment_sum += p.average_sentiment;
        top_composite = top_composite.max(p.composite_score);
    }

    let mean_sentiment = sentiment_sum / products.len() as f64;

    InsightStats {
        total_products: products.len(),
        total_reviews,
        average_sentiment_pct: percent(mean_sentiment),
        top_composite_pct: percent(top_composite),
        buckets,
    }
}

pub fn leader(products: &[ProductSummary]) -> Option<TopPerformer> {
    products.first().map(|p| TopPerformer {
        name: p.name.clone(),
        composite_pct: percent(p.composite_score),
        positive_pct: percent(p.positive_ratio),
        bucket: p.bucket(),
    })
}
