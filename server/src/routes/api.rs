use std::fmt::Write as _;
use std::sync::Arc;

use agcensus_shared::choropleth;
use agcensus_shared::format::variable_label;
use agcensus_shared::{JoinMode, Selection, SelectionError};
use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cache::{CachedChoropleth, ChoroplethKey};
use crate::state::{AppState, MapConfig, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
// Inputs never change while the process runs.
const DATA_CACHE_CONTROL: &str = "public, max-age=300";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let dataset = &state.dataset;
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "divisions": dataset.boundaries.len(),
        "census_records": dataset.census.len(),
        "years": dataset.catalog.years().count(),
        "loaded_at": dataset.loaded_at.to_rfc3339(),
        "choropleth_cache_size": state.choropleth_cache.len(),
        "census_report": {
            "malformed_columns": dataset.census_report.malformed_columns,
            "rows_without_key": dataset.census_report.rows_without_key,
            "duplicate_records": dataset.census_report.duplicate_records,
            "unparsable_cells": dataset.census_report.unparsable_cells,
        },
        "observability": {
            "choropleth_requests_total": observability.choropleth_requests_total,
            "choropleth_cache_hits_total": observability.choropleth_cache_hits_total,
            "choropleth_cache_misses_total": observability.choropleth_cache_misses_total,
            "rejected_selections_total": observability.rejected_selections_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render_prometheus_metrics(
        state.dataset.boundaries.len(),
        state.dataset.census.len(),
        state.choropleth_cache.len(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn render_prometheus_metrics(
    division_count: usize,
    census_record_count: usize,
    choropleth_cache_size: usize,
    observability: ObservabilitySnapshot,
) -> String {
    let gauges = [
        (
            "agcensus_divisions",
            "Number of boundary divisions loaded.",
            division_count as u64,
        ),
        (
            "agcensus_census_records",
            "Number of long-form census records loaded.",
            census_record_count as u64,
        ),
        (
            "agcensus_choropleth_cache_size",
            "Number of serialized choropleths held in the cache.",
            choropleth_cache_size as u64,
        ),
    ];
    let counters = [
        (
            "agcensus_choropleth_requests_total",
            "Total choropleth requests.",
            observability.choropleth_requests_total,
        ),
        (
            "agcensus_choropleth_cache_hits_total",
            "Choropleth requests served from the cache.",
            observability.choropleth_cache_hits_total,
        ),
        (
            "agcensus_choropleth_cache_misses_total",
            "Choropleth requests that had to be computed.",
            observability.choropleth_cache_misses_total,
        ),
        (
            "agcensus_rejected_selections_total",
            "Requests rejected for an unknown year or variable.",
            observability.rejected_selections_total,
        ),
    ];

    let mut body = String::new();
    for (name, help, value) in gauges {
        let _ = writeln!(body, "# HELP {name} {help}");
        let _ = writeln!(body, "# TYPE {name} gauge");
        let _ = writeln!(body, "{name} {value}");
    }
    for (name, help, value) in counters {
        let _ = writeln!(body, "# HELP {name} {help}");
        let _ = writeln!(body, "# TYPE {name} counter");
        let _ = writeln!(body, "{name} {value}");
    }
    body
}

#[derive(Debug, Serialize)]
struct YearOptions<'a> {
    year: &'a str,
    variables: Vec<VariableOption<'a>>,
}

#[derive(Debug, Serialize)]
struct VariableOption<'a> {
    name: &'a str,
    label: String,
}

#[derive(Debug, Serialize)]
struct ConfigResponse<'a> {
    #[serde(flatten)]
    map: &'a MapConfig,
    years: Vec<YearOptions<'a>>,
}

/// Map settings plus every selectable year and its variables.
pub async fn get_config(State(state): State<AppState>) -> Response {
    let catalog = &state.dataset.catalog;
    let years = catalog
        .years()
        .map(|year| YearOptions {
            year,
            variables: catalog
                .variables(year)
                .map(|name| VariableOption {
                    name,
                    label: variable_label(name),
                })
                .collect(),
        })
        .collect();
    let body = ConfigResponse {
        map: &state.map_config,
        years,
    };

    match serde_json::to_vec(&body) {
        Ok(json) => json_bytes_response(Bytes::from(json), DATA_CACHE_CONTROL, None),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize map config");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectionQuery {
    pub year: Option<String>,
    pub variable: Option<String>,
}

#[derive(Debug, Serialize)]
struct SelectionResponse<'a> {
    year: String,
    variable: String,
    label: String,
    years: Vec<&'a str>,
    variables: Vec<&'a str>,
}

/// Resolve a possibly partial selection to a valid (year, variable) pair.
///
/// `variable` is the previously chosen variable; it survives a year change
/// only when the new year offers it.
pub async fn get_selection(
    State(state): State<AppState>,
    Query(query): Query<SelectionQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let catalog = &state.dataset.catalog;
    let selection = catalog
        .resolve(
            non_empty(query.year.as_deref()),
            non_empty(query.variable.as_deref()),
        )
        .map_err(|e| reject_selection(&state, &e))?;

    let response = SelectionResponse {
        label: variable_label(&selection.variable),
        years: catalog.years().collect(),
        variables: catalog.variables(&selection.year).collect(),
        year: selection.year,
        variable: selection.variable,
    };
    serde_json::to_value(response)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Debug, Default, Deserialize)]
pub struct ChoroplethQuery {
    pub year: Option<String>,
    pub variable: Option<String>,
    pub join: Option<String>,
}

/// Colored boundaries for one (year, variable) selection.
pub async fn get_choropleth(
    State(state): State<AppState>,
    Query(query): Query<ChoroplethQuery>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    state.observability.record_choropleth_request();

    let (Some(year), Some(variable)) = (
        non_empty(query.year.as_deref()),
        non_empty(query.variable.as_deref()),
    ) else {
        state.observability.record_rejected_selection();
        return Err(StatusCode::BAD_REQUEST);
    };
    let selection = Selection::new(year, variable);
    state
        .dataset
        .catalog
        .validate(&selection)
        .map_err(|e| reject_selection(&state, &e))?;

    let join_mode = match non_empty(query.join.as_deref()) {
        Some(raw) => raw.parse::<JoinMode>().map_err(|e| {
            tracing::debug!(error = %e, "rejected join mode");
            StatusCode::BAD_REQUEST
        })?,
        None => state.map_config.default_join_mode,
    };

    let key = ChoroplethKey {
        selection,
        join_mode,
    };
    let cached = match state.choropleth_cache.get(&key) {
        Some(cached) => {
            state.observability.record_cache_hit();
            cached
        }
        None => {
            state.observability.record_cache_miss();
            let cached = render_choropleth(&state, key.clone()).await?;
            state.choropleth_cache.insert(key, cached.clone());
            cached
        }
    };

    if if_none_match_matches(&headers, &cached.etag) {
        return Ok(not_modified_response(
            DATA_CACHE_CONTROL,
            Some(cached.etag.as_str()),
        ));
    }

    Ok(json_bytes_response(
        (*cached.json).clone(),
        DATA_CACHE_CONTROL,
        Some(cached.etag.as_str()),
    ))
}

/// Build and serialize off the async runtime; large boundary sets take a
/// while to walk.
async fn render_choropleth(
    state: &AppState,
    key: ChoroplethKey,
) -> Result<CachedChoropleth, StatusCode> {
    let dataset = Arc::clone(&state.dataset);
    let rendered = tokio::task::spawn_blocking(move || {
        let choropleth = choropleth::build(
            &dataset.census,
            &dataset.boundaries,
            &key.selection,
            key.join_mode,
        );
        tracing::debug!(
            year = %key.selection.year,
            variable = %key.selection.variable,
            join = %key.join_mode,
            features = choropleth.features.len(),
            "built choropleth"
        );
        serde_json::to_vec(&choropleth.to_payload())
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "choropleth task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        tracing::error!(error = %e, "failed to serialize choropleth");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let etag = choropleth_etag(&rendered);
    Ok(CachedChoropleth {
        json: Arc::new(Bytes::from(rendered)),
        etag,
    })
}

fn reject_selection(state: &AppState, error: &SelectionError) -> StatusCode {
    state.observability.record_rejected_selection();
    tracing::debug!(error = %error, "rejected selection");
    match error {
        SelectionError::Empty => StatusCode::SERVICE_UNAVAILABLE,
        SelectionError::UnknownYear(_) | SelectionError::UnknownVariable { .. } => {
            StatusCode::BAD_REQUEST
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn choropleth_etag(body: &[u8]) -> String {
    format!("\"choropleth-{:08x}\"", crc32fast::hash(body))
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}
