//! Axum + Askama dashboard for SentiRank: insights page plus JSON endpoints for charts,
//! product list, review drill-downs and manual refresh.

use std::sync::Arc;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sentirank_core::{percent, short_name, ProductSummary, SentimentBucket};
use sentirank_engine::{InsightStats, TopPerformer, PALETTE};
use sentirank_sync::{DrillDown, InsightsSnapshot, RefreshPipeline, SyncConfig};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "sentirank-web";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RefreshPipeline>,
    pub drill_down: Arc<DrillDown>,
}

impl AppState {
    pub fn new(pipeline: Arc<RefreshPipeline>) -> Self {
        let drill_down = Arc::new(DrillDown::from_config(pipeline.config()));
        Self {
            pipeline,
            drill_down,
        }
    }
}

#[derive(Debug, Clone)]
struct ProductRow {
    rank: usize,
    name: String,
    short_name: String,
    link: String,
    price: String,
    rating: String,
    review_count: u64,
    sentiment_pct: u32,
    positive_pct: u32,
    composite_pct: u32,
    bucket_label: &'static str,
    bucket_class: &'static str,
}

impl ProductRow {
    fn from_summary(rank: usize, p: &ProductSummary) -> Self {
        let bucket = p.bucket();
        Self {
            rank,
            name: p.name.clone(),
            short_name: short_name(&p.name),
            link: p.link.clone(),
            price: p.price.clone().unwrap_or_else(|| "n/a".into()),
            rating: p.rating.map(|r| format!("{r:.1}")).unwrap_or_else(|| "n/a".into()),
            review_count: p.review_count,
            sentiment_pct: percent(p.average_sentiment),
            positive_pct: percent(p.positive_ratio),
            composite_pct: percent(p.composite_score),
            bucket_label: bucket.display_label(),
            bucket_class: bucket_class(bucket),
        }
    }
}

fn bucket_class(bucket: SentimentBucket) -> &'static str {
    match bucket {
        SentimentBucket::HighlyPositive => "badge-positive",
        SentimentBucket::Neutral => "badge-neutral",
        SentimentBucket::Negative => "badge-negative",
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    has_snapshot: bool,
    last_error: Option<String>,
    refreshed_at: String,
    upstream_timestamp: String,
    skipped_records: usize,
    stats: InsightStats,
    leader: Option<TopPerformer>,
    leader_label: &'static str,
    rows: Vec<ProductRow>,
}

#[derive(Debug, Serialize)]
struct InsightsResponse<'a> {
    run_id: String,
    refreshed_at: String,
    upstream_timestamp: Option<&'a str>,
    stats: &'a InsightStats,
    leader: Option<&'a TopPerformer>,
    skipped_records: usize,
    rejected: &'a [sentirank_core::ValidationError],
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    has_snapshot: bool,
    products: usize,
    last_error: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/products", get(products_handler))
        .route("/api/insights", get(insights_handler))
        .route("/api/charts", get(charts_handler))
        .route("/api/products/{rank}/reviews", get(reviews_handler))
        .route("/api/refresh", post(refresh_handler))
        .with_state(Arc::new(state))
}

/// Loads config, runs an initial refresh, starts the optional scheduler and serves the
/// dashboard. A failed initial refresh is reported on the dashboard rather than aborting.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env()?;
    let port = config.web_port;
    let pipeline = Arc::new(RefreshPipeline::new(config)?);

    if let Err(err) = pipeline.refresh(false).await {
        warn!(error = %format!("{err:#}"), "initial refresh failed; serving without data");
    }

    // Held for the life of the server so scheduled jobs keep running.
    let _scheduler = match pipeline.maybe_build_scheduler().await? {
        Some(sched) => {
            sched.start().await.context("starting refresh scheduler")?;
            info!(cron = %pipeline.config().refresh_cron, "refresh scheduler started");
            Some(sched)
        }
        None => None,
    };

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding dashboard port {port}"))?;
    info!(port, source_id = %pipeline.source_id(), "dashboard listening");
    axum::serve(listener, app(AppState::new(pipeline))).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let last_error = state.pipeline.last_error();
    let tpl = match state.pipeline.current() {
        Some(snapshot) => IndexTemplate {
            has_snapshot: true,
            last_error,
            refreshed_at: snapshot.refreshed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            upstream_timestamp: snapshot
                .upstream_timestamp
                .clone()
                .unwrap_or_else(|| "n/a".into()),
            skipped_records: snapshot.rejected.len(),
            stats: snapshot.stats,
            leader_label: snapshot
                .leader
                .as_ref()
                .map(|l| l.bucket.display_label())
                .unwrap_or_default(),
            leader: snapshot.leader.clone(),
            rows: snapshot
                .products
                .iter()
                .enumerate()
                .map(|(idx, p)| ProductRow::from_summary(idx + 1, p))
                .collect(),
        },
        None => IndexTemplate {
            has_snapshot: false,
            last_error,
            refreshed_at: "never".into(),
            upstream_timestamp: "n/a".into(),
            skipped_records: 0,
            stats: InsightStats::default(),
            leader: None,
            leader_label: "",
            rows: Vec::new(),
        },
    };
    render_html(tpl)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.pipeline.current();
    let last_error = state.pipeline.last_error();
    Json(HealthResponse {
        status: if last_error.is_none() { "ok" } else { "degraded" },
        has_snapshot: snapshot.is_some(),
        products: snapshot.map(|s| s.products.len()).unwrap_or(0),
        last_error,
    })
    .into_response()
}

async fn products_handler(State(state): State<Arc<AppState>>) -> Response {
    match current_snapshot(&state) {
        Ok(snapshot) => Json(&snapshot.products).into_response(),
        Err(resp) => resp,
    }
}

async fn insights_handler(State(state): State<Arc<AppState>>) -> Response {
    match current_snapshot(&state) {
        Ok(snapshot) => Json(InsightsResponse {
            run_id: snapshot.run_id.to_string(),
            refreshed_at: snapshot.refreshed_at.to_rfc3339(),
            upstream_timestamp: snapshot.upstream_timestamp.as_deref(),
            stats: &snapshot.stats,
            leader: snapshot.leader.as_ref(),
            skipped_records: snapshot.rejected.len(),
            rejected: &snapshot.rejected,
        })
        .into_response(),
        Err(resp) => resp,
    }
}

async fn charts_handler(State(state): State<Arc<AppState>>) -> Response {
    match current_snapshot(&state) {
        Ok(snapshot) => Json(serde_json::json!({
            "trend": snapshot.charts.trend,
            "composite": snapshot.charts.composite,
            "sentiment_comparison": snapshot.charts.sentiment_comparison,
            "palette": PALETTE,
        }))
        .into_response(),
        Err(resp) => resp,
    }
}

async fn reviews_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(rank): AxumPath<usize>,
) -> Response {
    let snapshot = match current_snapshot(&state) {
        Ok(snapshot) => snapshot,
        Err(resp) => return resp,
    };
    match state.drill_down.select(&snapshot, rank) {
        Some(sample) => Json(sample).into_response(),
        None => json_error(
            StatusCode::NOT_FOUND,
            format!("no product at rank {rank} (have {})", snapshot.products.len()),
        ),
    }
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.refresh(true).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => json_error(StatusCode::BAD_GATEWAY, format!("{err:#}")),
    }
}

fn current_snapshot(state: &AppState) -> Result<Arc<InsightsSnapshot>, Response> {
    state.pipeline.current().ok_or_else(|| {
        let message = state
            .pipeline
            .last_error()
            .unwrap_or_else(|| "no data loaded yet".to_string());
        json_error(StatusCode::SERVICE_UNAVAILABLE, message)
    })
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Server error: {err}")),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::path::{Path, PathBuf};
    use tower::ServiceExt;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/top-mobiles")
            .join(name)
    }

    fn state_for(path: PathBuf) -> AppState {
        let config = SyncConfig {
            fixture_path: Some(path),
            sampler_seed: Some(11),
            ..Default::default()
        };
        AppState::new(Arc::new(RefreshPipeline::new(config).unwrap()))
    }

    async fn loaded_state() -> AppState {
        let state = state_for(fixture("sample.json"));
        state.pipeline.refresh(false).await.unwrap();
        state
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn handler_smoke_get_index() {
        let app = app(loaded_state().await);
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("SentiRank"));
        assert!(text.contains("Apple iPhone"));
        assert!(text.contains("208"));
    }

    #[tokio::test]
    async fn index_renders_without_data() {
        let app = app(state_for(fixture("absent.json")));
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("No product data loaded"));
    }

    #[tokio::test]
    async fn products_and_insights_reflect_the_fixture() {
        let app = app(loaded_state().await);

        let (status, products) = get(app.clone(), "/api/products").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(products.as_array().unwrap().len(), 5);

        let (status, insights) = get(app, "/api/insights").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(insights["stats"]["total_reviews"], 208);
        assert_eq!(insights["stats"]["top_composite_pct"], 93);
        assert_eq!(insights["leader"]["positive_pct"], 88);
        assert_eq!(insights["skipped_records"], 0);
    }

    #[tokio::test]
    async fn charts_include_palette_and_three_series() {
        let (status, charts) = get(app(loaded_state().await), "/api/charts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(charts["palette"].as_array().unwrap().len(), PALETTE.len());
        for key in ["trend", "composite", "sentiment_comparison"] {
            assert_eq!(charts[key].as_array().unwrap().len(), 5, "{key}");
        }
    }

    #[tokio::test]
    async fn review_drill_down_by_rank() {
        let app = app(loaded_state().await);

        let (status, sample) = get(app.clone(), "/api/products/1/reviews").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sample["rank"], 1);
        assert!(sample["reviews"].as_array().unwrap().len() <= 20);

        let (status, body) = get(app, "/api/products/6/reviews").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("rank 6"));
    }

    #[tokio::test]
    async fn api_reports_unavailable_without_snapshot() {
        let app = app(state_for(fixture("absent.json")));
        for uri in ["/api/products", "/api/insights", "/api/charts", "/api/products/1/reviews"] {
            let (status, body) = get(app.clone(), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn refresh_post_reloads_and_reports_failures() {
        let ok = app(state_for(fixture("sample.json")));
        let resp = ok
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap(), "application/json");

        let broken = app(state_for(fixture("absent.json")));
        let resp = broken
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let (status, health) = get(broken, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["has_snapshot"], false);
        assert!(health["last_error"].as_str().unwrap().contains("absent.json"));
    }

    #[tokio::test]
    async fn partial_fixture_surfaces_skipped_records() {
        let state = state_for(fixture("partial.json"));
        state.pipeline.refresh(false).await.unwrap();
        let (status, insights) = get(app(state), "/api/insights").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(insights["skipped_records"], 2);
        assert_eq!(insights["rejected"][0]["index"], 1);
        assert_eq!(insights["upstream_timestamp"], "2026-02-24T12:05:00");
    }
}
