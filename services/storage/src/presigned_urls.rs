use crate::config::ApiConfig;
use crate::s3_presigner::UploadPresigner;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use image_pipeline::{MetadataTable, RecordId, RecordStatus, UploadRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

pub const UPLOAD_INSTRUCTIONS: &str = "Use a PUT request to upload your file to the uploadUrl";
pub const ISSUE_FAILED_MESSAGE: &str = "Could not generate upload URL";

/// Upload URL request body
#[derive(Debug, Default, Deserialize)]
pub struct UploadUrlRequest {
    /// Desired object key; synthesized when absent or empty
    #[serde(default)]
    pub filename: Option<String>,
}

/// Upload URL response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    /// Presigned URL accepting a single PUT
    pub upload_url: String,
    /// Object key the upload will land at
    pub key: String,
    pub message: String,
    /// URL expiration time
    pub expires_at: DateTime<Utc>,
}

/// Generic failure body; never carries internal detail
#[derive(Debug, Serialize)]
pub struct FailureResponse {
    pub message: String,
}

/// Result of one issue request
#[derive(Debug)]
pub enum IssueOutcome {
    Issued(UploadUrlResponse),
    Failed,
}

impl IssueOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            IssueOutcome::Issued(_) => StatusCode::OK,
            IssueOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body for either outcome
    pub fn body(&self) -> serde_json::Value {
        let body = match self {
            IssueOutcome::Issued(response) => serde_json::to_value(response),
            IssueOutcome::Failed => serde_json::to_value(FailureResponse {
                message: ISSUE_FAILED_MESSAGE.to_string(),
            }),
        };
        body.unwrap_or_else(|_| serde_json::json!({ "message": ISSUE_FAILED_MESSAGE }))
    }
}

impl IntoResponse for IssueOutcome {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Issues presigned upload URLs into the upload bucket. Writes no record;
/// the record appears once the upload itself triggers intake.
pub struct UploadUrlIssuer {
    presigner: Arc<dyn UploadPresigner>,
    bucket: String,
    expiry: Duration,
    extension: String,
}

impl UploadUrlIssuer {
    pub fn new(
        presigner: Arc<dyn UploadPresigner>,
        bucket: impl Into<String>,
        expiry: Duration,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            presigner,
            bucket: bucket.into(),
            expiry,
            extension: extension.into(),
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Handle a raw request body
    #[instrument(skip(self, body), fields(bucket = %self.bucket))]
    pub async fn issue(&self, body: Option<&[u8]>) -> IssueOutcome {
        let request = match parse_request(body) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Rejected upload URL request");
                metrics::counter!("issuer.urls.failed").increment(1);
                return IssueOutcome::Failed;
            }
        };

        let key = match request.filename {
            Some(name) if !name.is_empty() => name,
            _ => self.synthesized_key(Utc::now()),
        };

        let Some(expires_at) = after(Utc::now(), self.expiry) else {
            error!(expiry_secs = self.expiry.as_secs(), "Upload URL expiry out of range");
            metrics::counter!("issuer.urls.failed").increment(1);
            return IssueOutcome::Failed;
        };

        match self.presigner.presign_put(&self.bucket, &key, self.expiry).await {
            Ok(upload_url) => {
                metrics::counter!("issuer.urls.issued").increment(1);
                info!(key = %key, expires_at = %expires_at, "Upload URL issued");

                IssueOutcome::Issued(UploadUrlResponse {
                    upload_url,
                    key,
                    message: UPLOAD_INSTRUCTIONS.to_string(),
                    expires_at,
                })
            }
            Err(e) => {
                error!(error = %e, key = %key, "Failed to presign upload URL");
                metrics::counter!("issuer.urls.failed").increment(1);
                IssueOutcome::Failed
            }
        }
    }

    fn synthesized_key(&self, now: DateTime<Utc>) -> String {
        format!("upload-{}.{}", now.timestamp_millis(), self.extension)
    }
}

/// `now + span`, or `None` when it is not representable
fn after(now: DateTime<Utc>, span: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_add_signed(span))
}

/// `now - span`, or `None` when it is not representable
fn before(now: DateTime<Utc>, span: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_sub_signed(span))
}

fn parse_request(body: Option<&[u8]>) -> Result<UploadUrlRequest, serde_json::Error> {
    match body {
        None => Ok(UploadUrlRequest::default()),
        Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(UploadUrlRequest::default()),
        Some(bytes) => serde_json::from_slice(bytes),
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<UploadUrlIssuer>,
    pub table: Arc<dyn MetadataTable>,
    /// Default age for the stuck-record listing
    pub stale_after: Duration,
    pub max_list_limit: usize,
}

/// Query parameters for record listings
#[derive(Debug, Deserialize)]
pub struct RecordListQuery {
    /// Status filter, `INITIALIZED` when absent
    pub status: Option<String>,
    /// Only records created at least this long ago; `0` disables the cutoff
    pub older_than_secs: Option<u64>,
    /// Maximum results
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Record list response
#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<UploadRecord>,
    pub count: usize,
    pub created_before: Option<DateTime<Utc>>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/uploads", post(create_upload_url))
        .route("/api/v1/records", get(list_records))
        .route("/api/v1/records/*id", get(get_record))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "image-storage"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.table.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "table": "reachable"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "table": "unreachable",
                "error": e.to_string()
            })),
        ),
    }
}

/// Issue a presigned upload URL
async fn create_upload_url(State(state): State<AppState>, body: Bytes) -> IssueOutcome {
    state.issuer.issue(Some(&body)).await
}

/// List records by status, by default those stuck at INITIALIZED
#[instrument(skip(state))]
async fn list_records(
    State(state): State<AppState>,
    Query(params): Query<RecordListQuery>,
) -> Result<Json<RecordListResponse>, ApiError> {
    let status = match params.status.as_deref() {
        Some(raw) => raw
            .parse::<RecordStatus>()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_STATUS"))?,
        None => RecordStatus::Initialized,
    };

    let older_than = params
        .older_than_secs
        .map(Duration::from_secs)
        .unwrap_or(state.stale_after);
    let created_before = if older_than.is_zero() {
        None
    } else {
        let cutoff = before(Utc::now(), older_than).ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "older_than_secs is out of range",
                "INVALID_QUERY",
            )
        })?;
        Some(cutoff)
    };

    let limit = params.limit.clamp(1, state.max_list_limit.max(1));

    let records = state
        .table
        .list_by_status(status, created_before, limit)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to list records");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list records",
                "QUERY_ERROR",
            )
        })?;

    Ok(Json(RecordListResponse {
        count: records.len(),
        records,
        created_before,
    }))
}

/// Get a single record; the id is the normalized object key and may contain `/`
#[instrument(skip(state))]
async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UploadRecord>, ApiError> {
    let id = RecordId::from_normalized(id)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_ID"))?;

    let record = state.table.get(&id).await.map_err(|e| {
        error!(error = %e, "Failed to get record");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to get record",
            "QUERY_ERROR",
        )
    })?;

    record
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Record not found", "NOT_FOUND"))
}

/// Start the API server, returning once `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting upload API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
