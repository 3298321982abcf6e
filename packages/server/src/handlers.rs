//! HTTP handler functions for the heatmap API.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use complaint_map_complaint_models::ComplaintReport;
use complaint_map_heatmap::HeatmapError;
use complaint_map_heatmap::service::HeatmapParams;
use complaint_map_heatmap_models::{HeatmapBin, HeatmapResponse};
use complaint_map_server_models::{
    ApiCategory, ApiError, ApiHealth, ApiHeatmap, ApiInvalidation, HeatmapQueryParams,
};
use complaint_map_spatial::render;
use geojson::{FeatureCollection, JsonObject};

use crate::AppState;

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        cached_heatmaps: state.heatmap.cache().len(),
        pending_heatmaps: state.heatmap.cache().pending(),
    })
}

/// `GET /api/categories`
///
/// Returns the complaint categories accepted by the `category` parameter.
pub async fn categories() -> HttpResponse {
    let catalog: Vec<ApiCategory> = complaint_map_complaint_models::ComplaintCategory::all()
        .iter()
        .copied()
        .map(ApiCategory::from)
        .collect();

    HttpResponse::Ok().json(catalog)
}

/// `GET /api/heatmap/global`
pub async fn global_heatmap(
    state: web::Data<AppState>,
    query: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    match global(&state, &query).await {
        Ok(response) => HttpResponse::Ok().json(ApiHeatmap::from(response)),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/heatmap/global.geojson`
pub async fn global_geojson(
    state: web::Data<AppState>,
    query: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    match global(&state, &query).await {
        Ok(response) => geojson_response(&response.bins),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/heatmap/profile/{entity_id}`
pub async fn profile_heatmap(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    match profile(&state, Some(path.as_str()), &query).await {
        Ok(response) => HttpResponse::Ok().json(ApiHeatmap::from(response)),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/heatmap/profile/{entity_id}/geojson`
pub async fn profile_geojson(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    match profile(&state, Some(path.as_str()), &query).await {
        Ok(response) => geojson_response(&response.bins),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/heatmap/profile`
///
/// A profile request without an entity id is a not-found, never a
/// fallback to the global heatmap.
pub async fn missing_profile(
    state: web::Data<AppState>,
    query: web::Query<HeatmapQueryParams>,
) -> HttpResponse {
    match profile(&state, None, &query).await {
        Ok(response) => HttpResponse::Ok().json(ApiHeatmap::from(response)),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/complaints/persisted`
///
/// Called by the intake service after a report is stored.
pub async fn complaint_persisted(
    state: web::Data<AppState>,
    report: web::Json<ComplaintReport>,
) -> HttpResponse {
    let evicted = state.heatmap.notify_complaint_persisted(&report);

    HttpResponse::Ok().json(ApiInvalidation {
        success: true,
        evicted,
        data_version: state.heatmap.cache().data_version(),
    })
}

async fn global(
    state: &AppState,
    query: &HeatmapQueryParams,
) -> Result<HeatmapResponse, HeatmapError> {
    state.heatmap.handle_global(heatmap_params(query)?).await
}

async fn profile(
    state: &AppState,
    entity_id: Option<&str>,
    query: &HeatmapQueryParams,
) -> Result<HeatmapResponse, HeatmapError> {
    // The entity id is checked before any parameter, including the ones
    // parsed here.
    if entity_id.is_none_or(|id| id.trim().is_empty()) {
        return Err(HeatmapError::EntityNotFound {
            entity_id: entity_id.unwrap_or_default().to_string(),
        });
    }

    state
        .heatmap
        .handle_profile(entity_id, heatmap_params(query)?)
        .await
}

/// Parses the numeric query parameters, precision first.
fn heatmap_params(query: &HeatmapQueryParams) -> Result<HeatmapParams, HeatmapError> {
    let precision = parse_integer("precision", query.precision.as_deref())?;
    let days = parse_integer("days", query.days.as_deref())?;

    Ok(HeatmapParams {
        days,
        category: query.category.clone(),
        precision,
    })
}

fn parse_integer(name: &'static str, raw: Option<&str>) -> Result<Option<i64>, HeatmapError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| {
                HeatmapError::invalid(name, format!("expected an integer, got {value:?}"))
            }),
    }
}

const fn status_for(error: &HeatmapError) -> StatusCode {
    match error {
        HeatmapError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        HeatmapError::EntityNotFound { .. } => StatusCode::NOT_FOUND,
        HeatmapError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        HeatmapError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        HeatmapError::InternalAggregation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &HeatmapError) -> HttpResponse {
    let status = status_for(error);
    if error.is_transient() {
        log::warn!("Heatmap request failed: {error}");
    } else if status.is_server_error() {
        log::error!("Heatmap request failed: {error}");
    } else {
        log::debug!("Heatmap request rejected: {error}");
    }

    HttpResponse::build(status).json(ApiError::new(error.to_string(), error.code()))
}

fn feature_collection(bins: &[HeatmapBin]) -> FeatureCollection {
    render::cell_feature_collection(bins.iter().map(|bin| {
        let mut properties = JsonObject::new();
        properties.insert("count".to_string(), bin.count.into());
        properties.insert("averageSeverity".to_string(), bin.average_severity.into());
        (bin.cell_id, properties)
    }))
}

fn geojson_response(bins: &[HeatmapBin]) -> HttpResponse {
    match serde_json::to_string(&feature_collection(bins)) {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/geo+json")
            .body(body),
        Err(e) => {
            log::error!("Failed to serialize heatmap GeoJSON: {e}");
            error_response(&HeatmapError::InternalAggregation {
                message: format!("GeoJSON serialization failed: {e}"),
            })
        }
    }
}
