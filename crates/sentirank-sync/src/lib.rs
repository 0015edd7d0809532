//! Refresh pipeline orchestration: configuration, source selection, snapshot recomputation,
//! periodic scheduling and review drill-downs.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sentirank_core::{ProductSummary, ReviewRecord, ValidationError, ValidationMode};
use sentirank_engine::{
    aggregate, build_chart_series, leader, ChartSeries, InsightStats, ReviewAllocation,
    ReviewSampler, ReviewTally, TopPerformer,
};
use sentirank_fetch::{HttpClientConfig, HttpFetcher};
use sentirank_sources::{
    FixtureSummarySource, HttpSummarySource, SourceContext, SourcePayload, SummarySource,
};
use serde::{Deserialize, Serialize};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

mod slot;

pub use slot::{LatestSlot, Ticket};

pub const CRATE_NAME: &str = "sentirank-sync";

pub const DEFAULT_CONFIG_FILE: &str = "sentirank.yaml";

/// Keys accepted in the optional YAML config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub fixture_path: Option<PathBuf>,
    pub validation_mode: Option<ValidationMode>,
    pub user_agent: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub scheduler_enabled: Option<bool>,
    pub refresh_cron: Option<String>,
    pub sampler_seed: Option<u64>,
    pub web_port: Option<u16>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_url: String,
    pub fixture_path: Option<PathBuf>,
    pub validation_mode: ValidationMode,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub refresh_cron: String,
    pub sampler_seed: Option<u64>,
    pub web_port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            fixture_path: None,
            validation_mode: ValidationMode::Lenient,
            user_agent: "sentirank/0.1".to_string(),
            http_timeout_secs: 20,
            scheduler_enabled: false,
            // Upstream considers its data stale after two hours.
            refresh_cron: "0 0 */2 * * *".to_string(),
            sampler_seed: None,
            web_port: 8001,
        }
    }
}

impl SyncConfig {
    /// Loads `SENTIRANK_CONFIG` (or `./sentirank.yaml` when present), then applies
    /// `SENTIRANK_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var("SENTIRANK_CONFIG") {
            Ok(path) => ConfigFile::load(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    ConfigFile::load(default_path)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Layers `env` over `file` over the defaults. Blank variables count as unset.
    pub fn resolve(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let validation_mode = match var("SENTIRANK_VALIDATION_MODE") {
            Some(raw) => raw
                .parse::<ValidationMode>()
                .map_err(anyhow::Error::msg)
                .context("parsing SENTIRANK_VALIDATION_MODE")?,
            None => file.validation_mode.unwrap_or(defaults.validation_mode),
        };

        Ok(Self {
            api_url: var("SENTIRANK_API_URL")
                .or(file.api_url)
                .unwrap_or(defaults.api_url),
            fixture_path: var("SENTIRANK_FIXTURE_PATH")
                .map(PathBuf::from)
                .or(file.fixture_path),
            validation_mode,
            user_agent: var("SENTIRANK_USER_AGENT")
                .or(file.user_agent)
                .unwrap_or(defaults.user_agent),
            http_timeout_secs: var("SENTIRANK_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .or(file.http_timeout_secs)
                .unwrap_or(defaults.http_timeout_secs),
            scheduler_enabled: var("SENTIRANK_SCHEDULER_ENABLED")
                .map(|v| is_truthy(&v))
                .or(file.scheduler_enabled)
                .unwrap_or(defaults.scheduler_enabled),
            refresh_cron: var("SENTIRANK_REFRESH_CRON")
                .or(file.refresh_cron)
                .unwrap_or(defaults.refresh_cron),
            sampler_seed: var("SENTIRANK_SAMPLER_SEED")
                .and_then(|v| v.parse().ok())
                .or(file.sampler_seed),
            web_port: var("SENTIRANK_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .or(file.web_port)
                .unwrap_or(defaults.web_port),
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

/// Picks the fixture source when a fixture path is configured, the upstream API otherwise.
pub fn source_from_config(config: &SyncConfig) -> Result<Box<dyn SummarySource>> {
    if let Some(path) = &config.fixture_path {
        return Ok(Box::new(FixtureSummarySource::new(path.clone())));
    }
    let http = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        ..Default::default()
    })?;
    Ok(Box::new(HttpSummarySource::new(config.api_url.clone(), http)))
}

/// Everything the dashboard shows, recomputed wholesale from one fetched product list.
#[derive(Debug, Clone, Serialize)]
pub struct InsightsSnapshot {
    pub run_id: Uuid,
    pub refreshed_at: DateTime<Utc>,
    pub source_id: String,
    pub upstream_timestamp: Option<String>,
    pub products: Vec<ProductSummary>,
    pub rejected: Vec<ValidationError>,
    pub stats: InsightStats,
    pub charts: ChartSeries,
    pub leader: Option<TopPerformer>,
}

impl InsightsSnapshot {
    /// Product at 1-based `rank`.
    pub fn product_at(&self, rank: usize) -> Option<&ProductSummary> {
        rank.checked_sub(1).and_then(|idx| self.products.get(idx))
    }
}

/// Pure recomputation step: validate, then derive stats, charts and the leader.
pub fn build_snapshot(
    run_id: Uuid,
    refreshed_at: DateTime<Utc>,
    payload: SourcePayload,
    mode: ValidationMode,
) -> Result<InsightsSnapshot, ValidationError> {
    let source_id = payload.source_id.clone();
    let upstream_timestamp = payload.upstream_timestamp.clone();
    let batch = payload.validate(mode)?;

    Ok(InsightsSnapshot {
        run_id,
        refreshed_at,
        source_id,
        upstream_timestamp,
        stats: aggregate(&batch.products),
        charts: build_chart_series(&batch.products),
        leader: leader(&batch.products),
        products: batch.products,
        rejected: batch.rejected,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub run_id: Uuid,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub backend_ack: Option<String>,
    pub products: usize,
    pub skipped_records: usize,
    /// False when a newer refresh started before this one finished.
    pub published: bool,
}

pub struct RefreshPipeline {
    config: SyncConfig,
    source: Box<dyn SummarySource>,
    snapshots: LatestSlot<InsightsSnapshot>,
    last_error: Mutex<Option<String>>,
}

impl RefreshPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let source = source_from_config(&config)?;
        Ok(Self::with_source(config, source))
    }

    pub fn with_source(config: SyncConfig, source: Box<dyn SummarySource>) -> Self {
        Self {
            config,
            source,
            snapshots: LatestSlot::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn source_id(&self) -> &str {
        self.source.source_id()
    }

    pub fn current(&self) -> Option<Arc<InsightsSnapshot>> {
        self.snapshots.latest()
    }

    /// Message from the most recent failed refresh, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.error_slot().clone()
    }

    /// Optionally asks the upstream to recompute, fetches, and on success replaces the
    /// snapshot. On failure the previous snapshot stays and the error is recorded.
    pub async fn refresh(&self, trigger_backend: bool) -> Result<RefreshSummary> {
        let ctx = SourceContext::new();
        let ticket = self.snapshots.issue();
        let span = info_span!("refresh", run_id = %ctx.run_id, source_id = %self.source.source_id());

        let outcome = self.run_refresh(&ctx, ticket, trigger_backend).instrument(span).await;
        if let Err(err) = &outcome {
            warn!(run_id = %ctx.run_id, error = %format!("{err:#}"), "refresh failed");
            if self.snapshots.is_current(ticket) {
                *self.error_slot() = Some(format!("{err:#}"));
            }
        }
        outcome
    }

    async fn run_refresh(
        &self,
        ctx: &SourceContext,
        ticket: Ticket,
        trigger_backend: bool,
    ) -> Result<RefreshSummary> {
        let backend_ack = if trigger_backend {
            let ack = self
                .source
                .trigger_refresh(ctx)
                .await
                .context("triggering upstream refresh")?;
            Some(ack.detail)
        } else {
            None
        };

        let payload = self
            .source
            .fetch_summaries(ctx)
            .await
            .with_context(|| format!("fetching summaries from {}", self.source.source_id()))?;

        let snapshot = build_snapshot(ctx.run_id, Utc::now(), payload, self.config.validation_mode)
            .context("validating fetched summaries")?;

        for rejected in &snapshot.rejected {
            warn!(index = rejected.index, field = rejected.field, "skipped invalid record: {rejected}");
        }

        let products = snapshot.products.len();
        let skipped_records = snapshot.rejected.len();
        let source_id = snapshot.source_id.clone();
        let published = self.snapshots.publish(ticket, snapshot);
        if published {
            *self.error_slot() = None;
            info!(products, skipped_records, "snapshot published");
        } else {
            info!("newer refresh in flight; discarding this snapshot");
        }

        Ok(RefreshSummary {
            run_id: ctx.run_id,
            source_id,
            started_at: ctx.requested_at,
            finished_at: Utc::now(),
            backend_ack,
            products,
            skipped_records,
            published,
        })
    }

    /// Builds (but does not start) a scheduler that refreshes on `refresh_cron`.
    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.refresh_cron.as_str();
        let pipeline = Arc::clone(self);
        let job = Job::new_async(cron, move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                if let Err(err) = pipeline.refresh(false).await {
                    warn!(error = %format!("{err:#}"), "scheduled refresh failed");
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }

    fn error_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_error.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub async fn run_refresh_once_from_env(trigger_backend: bool) -> Result<RefreshSummary> {
    let config = SyncConfig::from_env()?;
    let pipeline = RefreshPipeline::new(config)?;
    pipeline.refresh(trigger_backend).await
}

/// One product's synthetic review sample.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSample {
    pub rank: usize,
    pub product_name: String,
    pub allocation: ReviewAllocation,
    pub tally: ReviewTally,
    pub reviews: Vec<ReviewRecord>,
    pub sampled_at: DateTime<Utc>,
}

/// Drill-down sampler with its own random source. Only the latest selection is retained.
pub struct DrillDown {
    sampler: ReviewSampler,
    rng: Mutex<StdRng>,
    latest: LatestSlot<ReviewSample>,
}

impl DrillDown {
    pub fn new(sampler: ReviewSampler, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sampler,
            rng: Mutex::new(rng),
            latest: LatestSlot::new(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(ReviewSampler::default(), config.sampler_seed)
    }

    /// Samples reviews for the product at 1-based `rank`; `None` if the rank is out of range.
    pub fn select(&self, snapshot: &InsightsSnapshot, rank: usize) -> Option<ReviewSample> {
        let product = snapshot.product_at(rank)?;
        let ticket = self.latest.issue();

        let allocation = self.sampler.allocate(product);
        let reviews = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.sampler.sample_allocated(&allocation, &mut *rng)
        };
        let sample = ReviewSample {
            rank,
            product_name: product.name.clone(),
            allocation,
            tally: ReviewTally::of(&reviews),
            reviews,
            sampled_at: Utc::now(),
        };

        if !self.latest.publish(ticket, sample.clone()) {
            info!(rank, "drill-down superseded by a newer selection");
        }
        Some(sample)
    }

    pub fn latest(&self) -> Option<Arc<ReviewSample>> {
        self.latest.latest()
    }
}
