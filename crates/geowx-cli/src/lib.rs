use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use geowx_core::{color_preview, DataSource, TimeRange};
use geowx_refresh::{RefreshHandle, RefreshReport, RefreshTrigger};
use geowx_store::{
    DataSourcePatch, MapStore, NewPolygon, NewRule, RulePatch, StoreError, Viewport,
};
use opentelemetry::metrics::{Counter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;

const MAX_PREVIEW_STEPS: usize = 256;

pub struct AppState {
    ready: AtomicBool,
    registry: Registry,
    #[allow(dead_code)]
    provider: SdkMeterProvider,
    requests_total: Counter<u64>,
    refresh_passes_total: Counter<u64>,
    polygon_outcomes_total: Counter<u64>,
    store: Arc<MapStore>,
    refresh: Option<RefreshHandle>,
}

impl AppState {
    fn count_request(&self, route: &'static str) {
        self.requests_total
            .add(1, &[KeyValue::new("route", route)]);
    }
}

/// Build the API router over a shared store.
///
/// `refresh` is the scheduler handle used by the manual refresh endpoint;
/// without one that endpoint answers 503.
pub fn build_app(
    store: Arc<MapStore>,
    refresh: Option<RefreshHandle>,
) -> Result<(Router, Arc<AppState>)> {
    // Prometheus exporter via OpenTelemetry
    let registry = Registry::new();
    let reader = exporter()
        .with_registry(registry.clone())
        .build()
        .context("prometheus exporter")?;
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    let meter = provider.meter("geowx-cli");

    let requests_total = meter
        .u64_counter("geowx_requests_total")
        .with_description("Total HTTP requests served")
        .init();
    let refresh_passes_total = meter
        .u64_counter("geowx_refresh_passes_total")
        .with_description("Completed refresh passes")
        .init();
    let polygon_outcomes_total = meter
        .u64_counter("geowx_polygon_refresh_total")
        .with_description("Per-polygon refresh results by outcome")
        .init();

    let state = Arc::new(AppState {
        ready: AtomicBool::new(false),
        registry,
        provider,
        requests_total,
        refresh_passes_total,
        polygon_outcomes_total,
        store,
        refresh,
    });

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/refresh", post(refresh_now))
        .route("/api/v1/polygons", get(list_polygons).post(create_polygon))
        .route(
            "/api/v1/polygons/:id",
            get(get_polygon).delete(delete_polygon),
        )
        .route(
            "/api/v1/data-sources",
            get(list_data_sources).post(create_data_source),
        )
        .route(
            "/api/v1/data-sources/:id",
            get(get_data_source).patch(update_data_source),
        )
        .route("/api/v1/data-sources/:id/rules", post(add_rule))
        .route(
            "/api/v1/data-sources/:id/rules/:rule_id",
            put(update_rule).delete(delete_rule),
        )
        .route("/api/v1/data-sources/:id/validation", get(validation))
        .route("/api/v1/data-sources/:id/preview", get(preview))
        .route("/api/v1/time-range", get(get_time_range).put(set_time_range))
        .route("/api/v1/viewport", get(get_viewport).put(set_viewport))
        .with_state(Arc::clone(&state));

    Ok((router, state))
}

pub fn set_ready(state: &Arc<AppState>, is_ready: bool) {
    state.ready.store(is_ready, Ordering::Relaxed);
}

/// Record a finished refresh pass in the metrics registry
pub fn record_refresh(state: &AppState, report: &RefreshReport) {
    state.refresh_passes_total.add(1, &[]);
    for (outcome, count) in [
        ("updated", report.updated),
        ("unconfigured", report.unconfigured),
        ("no_data", report.no_data),
        ("discarded", report.discarded),
        ("failed", report.failed),
    ] {
        if count > 0 {
            state
                .polygon_outcomes_total
                .add(count as u64, &[KeyValue::new("outcome", outcome)]);
        }
    }
}

/// JSON error body with a status derived from the store error
#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    BadRequest(String),
    Unavailable(&'static str),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Store(e) => {
                let status = match &e {
                    StoreError::PolygonNotFound(_)
                    | StoreError::DataSourceNotFound(_)
                    | StoreError::RuleNotFound { .. } => StatusCode::NOT_FOUND,
                    StoreError::DuplicateRule { .. } | StoreError::DuplicateDataSource(_) => {
                        StatusCode::CONFLICT
                    }
                    StoreError::InvalidOutline(_)
                    | StoreError::InvalidApiUrl(_)
                    | StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    StoreError::Io(_) | StoreError::Serialization(_) => {
                        tracing::error!(error = %e, "store failure");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn healthz(State(state): State<Arc<AppState>>) -> StatusCode {
    state.count_request("healthz");
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(
    State(state): State<Arc<AppState>>,
) -> (
    [(axum::http::header::HeaderName, axum::http::HeaderValue); 1],
    String,
) {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(error=?e, "failed to encode metrics");
    }
    let body = String::from_utf8(buf).unwrap_or_default();
    let header = (
        header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    ([header], body)
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.count_request("status");
    let store = &state.store;
    Json(serde_json::json!({
        "loading": store.is_loading().await,
        "polygons": store.polygons().await.len(),
        "dataSources": store.data_sources().await.len(),
    }))
}

async fn refresh_now(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    state.count_request("refresh");
    match &state.refresh {
        Some(handle) if handle.trigger(RefreshTrigger::Manual) => Ok(StatusCode::ACCEPTED),
        _ => Err(ApiError::Unavailable("refresh scheduler is not running")),
    }
}

// Polygons

async fn list_polygons(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.count_request("polygons");
    Json(state.store.polygons().await)
}

async fn get_polygon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("polygons");
    let polygon = state
        .store
        .polygon(&id)
        .await
        .ok_or(StoreError::PolygonNotFound(id))?;
    Ok(Json(polygon))
}

async fn create_polygon(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewPolygon>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("polygons");
    let polygon = state.store.add_polygon(new).await?;
    Ok((StatusCode::CREATED, Json(polygon)))
}

async fn delete_polygon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("polygons");
    let removed = state.store.delete_polygon(&id).await?;
    Ok(Json(removed))
}

// Data sources and rules

async fn list_data_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.count_request("data_sources");
    Json(state.store.data_sources().await)
}

async fn get_data_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("data_sources");
    let source = state
        .store
        .data_source(&id)
        .await
        .ok_or(StoreError::DataSourceNotFound(id))?;
    Ok(Json(source))
}

async fn create_data_source(
    State(state): State<Arc<AppState>>,
    Json(source): Json<DataSource>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("data_sources");
    let source = state.store.add_data_source(source).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

async fn update_data_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<DataSourcePatch>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("data_sources");
    let source = state.store.update_data_source(&id, patch).await?;
    Ok(Json(source))
}

async fn add_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(new): Json<NewRule>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("rules");
    let rule = state.store.add_rule(&id, new).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path((id, rule_id)): Path<(String, String)>,
    Json(patch): Json<RulePatch>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("rules");
    let rule = state.store.update_rule(&id, &rule_id, patch).await?;
    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path((id, rule_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("rules");
    let rule = state.store.delete_rule(&id, &rule_id).await?;
    Ok(Json(rule))
}

async fn validation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("validation");
    let violations = state.store.validate_rules(&id).await?;
    let messages: Vec<String> = violations.iter().map(ToString::to_string).collect();
    Ok(Json(serde_json::json!({
        "valid": violations.is_empty(),
        "violations": violations,
        "messages": messages,
    })))
}

#[derive(Deserialize)]
struct PreviewQuery {
    min: f64,
    max: f64,
    steps: Option<usize>,
}

async fn preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<PreviewQuery>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("preview");
    if !q.min.is_finite() || !q.max.is_finite() {
        return Err(ApiError::BadRequest("min and max must be finite".into()));
    }
    let steps = q.steps.unwrap_or(10).min(MAX_PREVIEW_STEPS);
    let source = state
        .store
        .data_source(&id)
        .await
        .ok_or(StoreError::DataSourceNotFound(id))?;
    Ok(Json(color_preview(&source.color_rules, q.min, q.max, steps)))
}

// Time range and viewport

async fn get_time_range(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.count_request("time_range");
    Json(state.store.time_range().await)
}

async fn set_time_range(
    State(state): State<Arc<AppState>>,
    Json(range): Json<TimeRange>,
) -> impl IntoResponse {
    state.count_request("time_range");
    state.store.set_time_range(range).await;
    Json(range)
}

async fn get_viewport(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.count_request("viewport");
    Json(state.store.viewport().await)
}

async fn set_viewport(
    State(state): State<Arc<AppState>>,
    Json(viewport): Json<Viewport>,
) -> ApiResult<impl IntoResponse> {
    state.count_request("viewport");
    let c = viewport.center;
    if !(-90.0..=90.0).contains(&c.latitude)
        || !(-180.0..=180.0).contains(&c.longitude)
        || !viewport.zoom.is_finite()
    {
        return Err(ApiError::BadRequest("viewport out of range".into()));
    }
    state.store.set_viewport(viewport).await;
    Ok(Json(viewport))
}
