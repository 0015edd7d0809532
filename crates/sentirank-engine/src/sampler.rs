//! Synthetic review samples for a single product drill-down.
//!
//! The sampler never sees real review text. It allocates the product's `review_count` across
//! positive, negative and neutral labels from `positive_ratio`, caps each label, fills the
//! slots from fixed templates with label-specific scores, shuffles and truncates.

use std::ops::Range;

use rand::seq::SliceRandom;
use rand::Rng;
use sentirank_core::{ProductSummary, ReviewRecord, SentimentLabel};
use serde::Serialize;

const POSITIVE_TEMPLATES: [&str; 8] = [
    "Excellent phone with great performance and battery life!",
    "Amazing camera quality and fast processing speed.",
    "Best value for money, highly recommended!",
    "Outstanding build quality and user experience.",
    "Perfect phone for daily use, very satisfied!",
    "Great features and smooth performance.",
    "Impressive display quality and fast charging.",
    "Reliable phone with excellent customer service.",
];

const NEGATIVE_TEMPLATES: [&str; 8] = [
    "Battery drains too quickly, not satisfied.",
    "Camera quality could be better for the price.",
    "Heating issues during heavy usage.",
    "Software bugs and slow performance.",
    "Poor build quality, feels cheap.",
    "Disappointing performance, expected better.",
    "Network connectivity issues frequently.",
    "Not worth the money, many better alternatives.",
];

const NEUTRAL_TEMPLATES: [&str; 8] = [
    "Decent phone, nothing extraordinary but works fine.",
    "Average performance, meets basic requirements.",
    "Good phone but has some minor issues.",
    "Okay for the price range, could be improved.",
    "Standard features, nothing special to highlight.",
    "Fair performance, some pros and cons.",
    "Acceptable quality, meets expectations.",
    "Reasonable choice in this price segment.",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub positive_cap: usize,
    pub negative_cap: usize,
    pub neutral_cap: usize,
    pub max_total: usize,
    /// Fraction of the non-positive remainder allocated to the negative label.
    pub negative_share: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            positive_cap: 12,
            negative_cap: 8,
            neutral_cap: 5,
            max_total: 20,
            negative_share: 0.3,
        }
    }
}

/// Deterministic label counts for one product, before and after capping.
///
/// `neutral` is the remainder after rounding the other two labels. It is not clamped and goes
/// negative when the rounded counts overshoot `review_count`; a negative remainder generates
/// no neutral records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewAllocation {
    pub positive: i64,
    pub negative: i64,
    pub neutral: i64,
    pub positive_generated: usize,
    pub negative_generated: usize,
    pub neutral_generated: usize,
}

impl ReviewAllocation {
    pub fn generated_total(&self) -> usize {
        self.positive_generated + self.negative_generated + self.neutral_generated
    }
}

/// Label counts of a returned sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewTally {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl ReviewTally {
    pub fn of(reviews: &[ReviewRecord]) -> Self {
        let mut tally = Self::default();
        for review in reviews {
            match review.sentiment_label {
                SentimentLabel::Positive => tally.positive += 1,
                SentimentLabel::Neutral => tally.neutral += 1,
                SentimentLabel::Negative => tally.negative += 1,
            }
        }
        tally
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewSampler {
    config: SamplerConfig,
}

impl ReviewSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn allocate(&self, product: &ProductSummary) -> ReviewAllocation {
        let total = product.review_count as f64;
        let positive = (total * product.positive_ratio).round() as i64;
        let negative =
            (total * (1.0 - product.positive_ratio) * self.config.negative_share).round() as i64;
        let neutral = product.review_count as i64 - positive - negative;

        ReviewAllocation {
            positive,
            negative,
            neutral,
            positive_generated: capped(positive, self.config.positive_cap),
            negative_generated: capped(negative, self.config.negative_cap),
            neutral_generated: capped(neutral, self.config.neutral_cap),
        }
    }

    /// Produces a fresh, shuffled, bounded sample. Randomness comes only from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, product: &ProductSummary, rng: &mut R) -> Vec<ReviewRecord> {
        self.sample_allocated(&self.allocate(product), rng)
    }

    /// Same as [`ReviewSampler::sample`] for an allocation the caller already computed.
    pub fn sample_allocated<R: Rng + ?Sized>(
        &self,
        allocation: &ReviewAllocation,
        rng: &mut R,
    ) -> Vec<ReviewRecord> {
        let mut reviews = Vec::with_capacity(allocation.generated_total());

        generate(
            &mut reviews,
            rng,
            SentimentLabel::Positive,
            &POSITIVE_TEMPLATES,
            allocation.positive_generated,
        );
        generate(
            &mut reviews,
            rng,
            SentimentLabel::Negative,
            &NEGATIVE_TEMPLATES,
            allocation.negative_generated,
        );
        generate(
            &mut reviews,
            rng,
            SentimentLabel::Neutral,
            &NEUTRAL_TEMPLATES,
            allocation.neutral_generated,
        );

        reviews.shuffle(rng);
        reviews.truncate(self.config.max_total);
        reviews
    }
}

/// Half-open score range assigned to a label.
pub fn score_range(label: SentimentLabel) -> Range<f64> {
    match label {
        SentimentLabel::Positive => 0.7..1.0,
        SentimentLabel::Negative => 0.1..0.4,
        SentimentLabel::Neutral => 0.4..0.6,
    }
}

fn capped(count: i64, cap: usize) -> usize {
    if count <= 0 {
        0
    } else {
        (count as usize).min(cap)
    }
}

fn generate<R: Rng + ?Sized>(
    out: &mut Vec<ReviewRecord>,
    rng: &mut R,
    label: SentimentLabel,
    templates: &[&str],
    count: usize,
) {
    let range = score_range(label);
    for i in 0..count {
        out.push(ReviewRecord {
            text: templates[i % templates.len()].to_string(),
            sentiment_label: label,
            score: rng.gen_range(range.clone()),
        });
    }
}
