//! Data route handlers

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use lemmario_lib::{
    ActiveView, CacheStats, Facets, FilterPatch, Granularity, IndexStats, LemmaRecord, RecordId, Session, Suggestion,
    DEFAULT_SUGGESTION_LIMIT,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_SEARCH_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

// === Request/Response types ===

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct RegionsQuery {
    codes: Option<String>,
}

#[derive(Deserialize)]
pub struct ViewRequest {
    #[serde(default)]
    filters: FilterPatch,
    #[serde(default)]
    granularity: Granularity,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    #[serde(flatten)]
    view: ActiveView,
    elapsed_ms: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    records: usize,
    generation: u64,
    fingerprint: Option<String>,
    index: IndexStats,
    cache: CacheStats,
}

// === Handlers ===

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let dataset = state.dataset();
    Json(HealthResponse {
        status: if dataset.is_empty() { "degraded" } else { "ok" },
        timestamp: Utc::now(),
        records: dataset.len(),
        generation: dataset.generation(),
        fingerprint: dataset.fingerprint().map(str::to_string),
        index: dataset.index().stats(),
        cache: state.cache.stats(),
    })
}

pub async fn get_lemmi(State(state): State<Arc<AppState>>) -> Json<Vec<LemmaRecord>> {
    Json(state.dataset().records().to_vec())
}

/// Every attestation of one lemma.
pub async fn get_lemma(
    State(state): State<Arc<AppState>>,
    Path(lemma_id): Path<String>,
) -> ApiResult<Vec<LemmaRecord>> {
    let dataset = state.dataset();
    let rows: Vec<LemmaRecord> = dataset.lemma_rows(&RecordId::from(lemma_id)).into_iter().cloned().collect();
    if rows.is_empty() {
        return Err(ApiError::NotFound("Lemma not found".to_string()));
    }
    Ok(Json(rows))
}

async fn read_geojson(path: &path::Path) -> Result<Value, ApiError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to read boundary data");
        ApiError::Internal("Failed to load data".to_string())
    })?;
    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "boundary data is not valid JSON");
        ApiError::Internal("Failed to load data".to_string())
    })
}

pub async fn get_geojson(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    read_geojson(&state.config.geojson_path()).await.map(Json)
}

/// Normalised region code: numeric codes compare without leading zeros.
fn region_key(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<u32>() {
        Ok(n) => n.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

fn feature_region(feature: &Value) -> Option<String> {
    match feature.pointer("/properties/reg_istat_code")? {
        Value::String(s) => Some(region_key(s)),
        Value::Number(n) => Some(region_key(&n.to_string())),
        _ => None,
    }
}

/// Region boundaries, optionally restricted to `?codes=03,19`.
pub async fn get_regions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionsQuery>,
) -> ApiResult<Value> {
    let mut regions = read_geojson(&state.config.regions_path()).await?;

    let wanted: HashSet<String> = params
        .codes
        .iter()
        .flat_map(|codes| codes.split(','))
        .filter(|code| !code.trim().is_empty())
        .map(region_key)
        .collect();

    if !wanted.is_empty() {
        if let Some(Value::Array(features)) = regions.get_mut("features") {
            features.retain(|feature| feature_region(feature).is_some_and(|code| wanted.contains(&code)));
        }
    }
    Ok(Json(regions))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Vec<LemmaRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_LIMIT);
    let dataset = state.dataset();
    let records = dataset.search(&params.q, limit).into_iter().cloned().collect();
    Ok(Json(records))
}

pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Vec<Suggestion>> {
    let limit = params.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.dataset().suggest(&params.q, limit)))
}

pub async fn get_facets(State(state): State<Arc<AppState>>) -> Json<Facets> {
    Json(state.dataset().facets())
}

/// Filtered records plus every aggregate, for one filter state.
pub async fn view(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ViewRequest>,
) -> ApiResult<ViewResponse> {
    let start = Instant::now();
    let mut session = Session::new(state.dataset(), Arc::clone(&state.cache));
    session.set_filters(request.filters);
    let view = session.view(request.granularity);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    tracing::debug!(records = view.records.len(), elapsed_ms, "view computed");
    Ok(Json(ViewResponse { view, elapsed_ms }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("The requested endpoint does not exist".to_string())
}
