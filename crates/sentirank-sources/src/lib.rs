//! Summary source contracts + HTTP API and fixture-file implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentirank_core::{validate_records, ValidatedBatch, ValidationError, ValidationMode};
use sentirank_fetch::{FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "sentirank-sources";

pub const PRODUCTS_PATH: &str = "/top-mobiles";
pub const REFRESH_PATH: &str = "/refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Http,
    Fixture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub run_id: Uuid,
    pub requested_at: DateTime<Utc>,
}

impl SourceContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            requested_at: Utc::now(),
        }
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Upstream acknowledgement of a refresh request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshAck {
    pub detail: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Raw records from one fetch, still untyped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePayload {
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    pub upstream_timestamp: Option<String>,
    pub records: Vec<JsonValue>,
}

impl SourcePayload {
    pub fn validate(self, mode: ValidationMode) -> Result<ValidatedBatch, ValidationError> {
        validate_records(self.records, mode)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding payload from {origin}: {message}")]
    Decode { origin: String, message: String },
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait SummarySource: Send + Sync {
    fn source_id(&self) -> &str;
    fn kind(&self) -> SourceKind;

    /// Asks the upstream to drop caches and recompute before the next fetch.
    async fn trigger_refresh(&self, ctx: &SourceContext) -> Result<RefreshAck, SourceError>;

    async fn fetch_summaries(&self, ctx: &SourceContext) -> Result<SourcePayload, SourceError>;
}

#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    timestamp: Option<String>,
    data: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PayloadShape {
    List(Vec<JsonValue>),
    Envelope(SnapshotEnvelope),
}

/// Accepts either a bare JSON array of records or a `{ "timestamp", "data" }` envelope.
pub fn decode_payload(
    origin: &str,
    bytes: &[u8],
) -> Result<(Vec<JsonValue>, Option<String>), SourceError> {
    let shape: PayloadShape = serde_json::from_slice(bytes).map_err(|err| SourceError::Decode {
        origin: origin.to_string(),
        message: err.to_string(),
    })?;
    Ok(match shape {
        PayloadShape::List(records) => (records, None),
        PayloadShape::Envelope(envelope) => (envelope.data, envelope.timestamp),
    })
}

pub struct HttpSummarySource {
    api_url: String,
    http: HttpFetcher,
}

impl HttpSummarySource {
    pub fn new(api_url: impl Into<String>, http: HttpFetcher) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { api_url, http }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

#[async_trait]
impl SummarySource for HttpSummarySource {
    fn source_id(&self) -> &str {
        &self.api_url
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Http
    }

    async fn trigger_refresh(&self, ctx: &SourceContext) -> Result<RefreshAck, SourceError> {
        let url = self.endpoint(REFRESH_PATH);
        let resp = self.http.post_empty(ctx.run_id, &url).await?;
        let ack: RefreshAck =
            serde_json::from_slice(&resp.body).map_err(|err| SourceError::Decode {
                origin: url.clone(),
                message: err.to_string(),
            })?;
        info!(run_id = %ctx.run_id, detail = %ack.detail, "upstream refresh acknowledged");
        Ok(ack)
    }

    async fn fetch_summaries(&self, ctx: &SourceContext) -> Result<SourcePayload, SourceError> {
        let url = self.endpoint(PRODUCTS_PATH);
        let resp = self.http.get_bytes(ctx.run_id, &url).await?;
        let (records, upstream_timestamp) = decode_payload(&resp.final_url, &resp.body)?;
        debug!(run_id = %ctx.run_id, records = records.len(), "fetched summaries");
        Ok(SourcePayload {
            source_id: self.api_url.clone(),
            fetched_at: Utc::now(),
            upstream_timestamp,
            records,
        })
    }
}

/// Reads summaries from a JSON file in the upstream payload shape. Refresh is a no-op.
#[derive(Debug, Clone)]
pub struct FixtureSummarySource {
    source_id: String,
    path: PathBuf,
}

impl FixtureSummarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let source_id = format!("fixture:{}", path.display());
        Self { source_id, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SummarySource for FixtureSummarySource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fixture
    }

    async fn trigger_refresh(&self, ctx: &SourceContext) -> Result<RefreshAck, SourceError> {
        Ok(RefreshAck {
            detail: "fixture source has no upstream cache".to_string(),
            timestamp: Some(ctx.requested_at.to_rfc3339()),
        })
    }

    async fn fetch_summaries(&self, _ctx: &SourceContext) -> Result<SourcePayload, SourceError> {
        load_fixture_payload(&self.path).await
    }
}

pub async fn load_fixture_payload(path: impl AsRef<Path>) -> Result<SourcePayload, SourceError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();
    let (records, upstream_timestamp) = decode_payload(&origin, &bytes)?;
    Ok(SourcePayload {
        source_id: format!("fixture:{origin}"),
        fetched_at: Utc::now(),
        upstream_timestamp,
        records,
    })
}
