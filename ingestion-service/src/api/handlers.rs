use axum::extract::{Path, Query, State};
use axum::Json;
use energy_client::domain::EnrichedReading;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::{ApiError, ApiState};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: Vec<EnrichedReading>,
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<OffsetDateTime, ApiError> {
    let raw = value.ok_or_else(|| ApiError::BadRequest(format!("missing '{name}' query parameter")))?;
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| ApiError::BadRequest(format!("'{name}' is not an RFC 3339 timestamp: {e}")))
}

pub async fn get_records(
    State(state): State<ApiState>,
    Path(site_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<DataResponse>, ApiError> {
    metrics::counter!("read_api_requests_total", "route" => "records").increment(1);

    let start = parse_bound("start", range.start.as_deref())?;
    let end = parse_bound("end", range.end.as_deref())?;
    if start > end {
        return Err(ApiError::BadRequest(
            "please check and enter a proper timestamp range (start is after end)".to_string(),
        ));
    }

    let data = state.store.query_range(&site_id, start, end).await?;
    if data.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no record found for site_id '{site_id}' in the given time frame"
        )));
    }
    Ok(Json(DataResponse { data }))
}

pub async fn get_anomalies(
    State(state): State<ApiState>,
    Path(site_id): Path<String>,
) -> Result<Json<DataResponse>, ApiError> {
    metrics::counter!("read_api_requests_total", "route" => "anomalies").increment(1);

    let data = state.store.query_anomalies(&site_id).await?;
    if data.is_empty() {
        return Err(ApiError::NotFound(format!("no anomaly found for {site_id}")));
    }
    Ok(Json(DataResponse { data }))
}

pub async fn net_negative_energy(State(state): State<ApiState>) -> Result<Json<DataResponse>, ApiError> {
    metrics::counter!("read_api_requests_total", "route" => "net_negative_energy").increment(1);

    let data = state.store.scan_net_negative().await?;
    if data.is_empty() {
        return Err(ApiError::NotFound("no record found".to_string()));
    }
    Ok(Json(DataResponse { data }))
}
