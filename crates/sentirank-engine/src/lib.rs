//! Pure aggregation, chart projection and review sampling over ranked product summaries.
//!
//! Nothing in this crate performs I/O. Every function takes the current product list (or a
//! single product) by reference and returns freshly computed data.

pub mod charts;
pub mod sampler;
pub mod stats;

pub use charts::{
    build_chart_series, ChartSeries, CompositeSlice, SentimentStack, TrendPoint, PALETTE,
    PALETTE_SIZE,
};
pub use sampler::{ReviewAllocation, ReviewSampler, ReviewTally, SamplerConfig};
pub use stats::{aggregate, leader, BucketCounts, InsightStats, TopPerformer};

pub const CRATE_NAME: &str = "sentirank-engine";
