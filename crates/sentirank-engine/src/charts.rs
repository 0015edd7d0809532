//! Chart-ready projections of the product list.
//!
//! Each series is derived independently from the same ordered input and is not reconciled with
//! the others. In particular the stacked comparison splits the non-positive share 30/70 between
//! negative and neutral, which does not match the review sampler's own split.

use sentirank_core::{percent, short_name, ProductSummary};
use serde::Serialize;

pub const PALETTE: [&str; 5] = ["#0088FE", "#00C49F", "#FFBB28", "#FF8042", "#8884D8"];
pub const PALETTE_SIZE: usize = PALETTE.len();

/// Percentage points of the stacked bar drawn as negative per unit of non-positive ratio.
const STACKED_NEGATIVE_POINTS: f64 = 30.0;
/// Percentage points drawn as neutral per unit of non-positive ratio.
const STACKED_NEUTRAL_POINTS: f64 = 70.0;

/// Multi-metric point used by the ranking/trend chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub short_name: String,
    pub full_name: String,
    pub sentiment_pct: u32,
    pub positive_pct: u32,
    pub negative_pct: u32,
    pub composite_pct: u32,
    pub review_count: u64,
    pub rank: usize,
}

/// Composite-only slice for proportion views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeSlice {
    pub short_name: String,
    pub full_name: String,
    pub value: u32,
    pub color_index: usize,
}

impl CompositeSlice {
    pub fn color(&self) -> &'static str {
        PALETTE[self.color_index % PALETTE_SIZE]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentimentStack {
    pub short_name: String,
    pub full_name: String,
    pub positive_pct: u32,
    pub negative_pct: u32,
    pub neutral_pct: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    pub trend: Vec<TrendPoint>,
    pub composite: Vec<CompositeSlice>,
    pub sentiment_comparison: Vec<SentimentStack>,
}

pub fn trend_series(products: &[ProductSummary]) -> Vec<TrendPoint> {
    products
        .iter()
        .enumerate()
        .map(|(idx, p)| TrendPoint {
            short_name: short_name(&p.name),
            full_name: p.name.clone(),
            sentiment_pct: percent(p.average_sentiment),
            positive_pct: percent(p.positive_ratio),
            negative_pct: percent(1.0 - p.positive_ratio),
            composite_pct: percent(p.composite_score),
            review_count: p.review_count,
            rank: idx + 1,
        })
        .collect()
}

pub fn composite_series(products: &[ProductSummary]) -> Vec<CompositeSlice> {
    products
        .iter()
        .enumerate()
        .map(|(idx, p)| CompositeSlice {
            short_name: short_name(&p.name),
            full_name: p.name.clone(),
            value: percent(p.composite_score),
            color_index: idx % PALETTE_SIZE,
        })
        .collect()
}

pub fn sentiment_comparison_series(products: &[ProductSummary]) -> Vec<SentimentStack> {
    products
        .iter()
        .map(|p| {
            let non_positive = 1.0 - p.positive_ratio;
            SentimentStack {
                short_name: short_name(&p.name),
                full_name: p.name.clone(),
                positive_pct: percent(p.positive_ratio),
                negative_pct: scaled_percent(non_positive, STACKED_NEGATIVE_POINTS),
                neutral_pct: scaled_percent(non_positive, STACKED_NEUTRAL_POINTS),
            }
        })
        .collect()
}

/// round(ratio x points). A single multiplication keeps exact .5 products on the boundary.
fn scaled_percent(ratio: f64, points: f64) -> u32 {
    let pct = (ratio * points).round();
    if pct <= 0.0 {
        0
    } else {
        pct as u32
    }
}

pub fn build_chart_series(products: &[ProductSummary]) -> ChartSeries {
    ChartSeries {
        trend: trend_series(products),
        composite: composite_series(products),
        sentiment_comparison: sentiment_comparison_series(products),
    }
}
