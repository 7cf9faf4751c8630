//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Networking API surface for external integrations."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use urja_pipeline::{
    realtime_stats, screen_batch, validate_readings, AggregateMetrics, AnomalyRecord,
    ConsumptionReading, DataSource, EnergySample, Granularity, MeterReading, TimeRange,
    TimeSeriesStats,
};

use crate::{ApiError, ApiState};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RealtimeMetricsResponse {
    success: bool,
    data: Vec<EnergySample>,
    metrics: AggregateMetrics,
    is_connected: bool,
    timestamp: DateTime<Utc>,
}

pub(crate) async fn get_realtime_metrics(
    State(state): State<Arc<ApiState>>,
) -> Json<RealtimeMetricsResponse> {
    let data = state.source().instant();
    let metrics = state.pipeline().aggregator().aggregate(&data);
    let is_connected = state.source().store().ping().await.is_ok();
    if let Some(recorder) = state.metrics() {
        recorder.add_synthesized(data.len());
    }
    Json(RealtimeMetricsResponse {
        success: true,
        data,
        metrics,
        is_connected,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActionRequest {
    action: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceFlags {
    store: bool,
    data_generation: bool,
    anomaly_detection: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HealthResponse {
    success: bool,
    status: &'static str,
    services: ServiceFlags,
    uptime_seconds: u64,
    timestamp: DateTime<Utc>,
}

pub(crate) async fn post_realtime_metrics(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<HealthResponse> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    if request.action != "health-check" {
        return Err(ApiError::bad_request(format!(
            "Invalid action '{}'",
            request.action
        )));
    }

    let store = match state.source().store().ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "store ping failed during health check");
            false
        }
    };
    let data_generation = !state.source().synthesizer().devices().is_empty();
    // Detection is stateless over in-memory samples.
    let anomaly_detection = true;
    let healthy = store && data_generation && anomaly_detection;

    Ok(Json(HealthResponse {
        success: true,
        status: if healthy { "healthy" } else { "degraded" },
        services: ServiceFlags {
            store,
            data_generation,
            anomaly_detection,
        },
        uptime_seconds: state.uptime_seconds(),
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SeriesParams {
    range: Option<String>,
    source: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SeriesResponse {
    success: bool,
    data: Vec<EnergySample>,
    metrics: AggregateMetrics,
    anomalies: Vec<AnomalyRecord>,
    data_source: DataSource,
    timestamp: DateTime<Utc>,
    range: TimeRange,
}

fn parse_source(value: Option<&str>) -> Result<DataSource, ApiError> {
    match value.map(str::trim) {
        None | Some("") | Some("synthetic") => Ok(DataSource::Synthetic),
        Some("live") => Ok(DataSource::Live),
        Some(other) => Err(ApiError::bad_request(format!(
            "unsupported data source '{other}', expected live or synthetic"
        ))),
    }
}

fn parse_range(value: Option<&str>) -> Result<TimeRange, ApiError> {
    match value {
        Some(symbol) => Ok(symbol.parse::<TimeRange>()?),
        None => Ok(TimeRange::default()),
    }
}

pub(crate) async fn get_realtime_data(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<SeriesParams>,
) -> ApiResult<SeriesResponse> {
    let range = parse_range(params.range.as_deref())?;
    let prefer = parse_source(params.source.as_deref())?;
    let user = state.user(params.user_id.as_deref());

    let started = Instant::now();
    let sourced = state.source().series(user, range, prefer).await?;
    let report = state.pipeline().analyze(sourced);

    if let Some(recorder) = state.metrics() {
        recorder.observe_run(started.elapsed().as_secs_f64());
        recorder.record_response(report.data_source.as_str());
        if report.data_source == DataSource::Synthetic {
            recorder.add_synthesized(report.samples.len());
        }
        for anomaly in &report.anomalies {
            recorder.record_anomaly(anomaly.severity.as_str());
        }
    }

    Ok(Json(SeriesResponse {
        success: true,
        data: report.samples,
        metrics: report.metrics,
        anomalies: report.anomalies,
        data_source: report.data_source,
        timestamp: Utc::now(),
        range,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IngestRequest {
    data_points: Vec<Value>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct IngestResponse {
    success: bool,
    accepted: usize,
    rejected: usize,
    message: String,
    timestamp: DateTime<Utc>,
}

pub(crate) async fn post_realtime_data(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<IngestResponse> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let user = state.user(request.user_id.as_deref()).to_owned();
    let batch = screen_batch(request.data_points);
    if batch.accepted.is_empty() {
        if let Some(recorder) = state.metrics() {
            recorder.record_ingestion(0, batch.rejected);
        }
        return Err(ApiError::bad_request("No valid data points provided"));
    }

    let written = state.source().store().write(&user, &batch.accepted).await?;
    // The store refuses points already past retention.
    let rejected = batch.rejected + batch.accepted.len().saturating_sub(written);
    if let Some(recorder) = state.metrics() {
        recorder.record_ingestion(written, rejected);
    }
    if written == 0 {
        return Err(ApiError::bad_request(
            "No data points inside the retention window",
        ));
    }
    info!(
        user_id = %user,
        accepted = written,
        rejected,
        "data points ingested"
    );
    Ok(Json(IngestResponse {
        success: true,
        accepted: written,
        rejected,
        message: format!("Processed {written} data points"),
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimeSeriesParams {
    time_range: Option<String>,
    granularity: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    device_id: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsumptionMetadata {
    time_range: TimeRange,
    granularity: String,
    data_points: usize,
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeviceMetadata {
    time_range: TimeRange,
    device_id: String,
    device_count: usize,
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatsMetadata {
    timestamp: DateTime<Utc>,
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum TimeSeriesResponse {
    Consumption {
        success: bool,
        data: Vec<ConsumptionReading>,
        metadata: ConsumptionMetadata,
    },
    Devices {
        success: bool,
        data: Vec<ConsumptionReading>,
        metadata: DeviceMetadata,
    },
    Stats {
        success: bool,
        data: TimeSeriesStats,
        metadata: StatsMetadata,
    },
}

fn parse_granularity(value: Option<&str>) -> Result<Option<Granularity>, ApiError> {
    Ok(value.map(str::parse::<Granularity>).transpose()?)
}

pub(crate) async fn get_time_series(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<TimeSeriesParams>,
) -> ApiResult<TimeSeriesResponse> {
    let user = state.user(params.user_id.as_deref()).to_owned();
    let store = state.source().store();
    match params.kind.as_deref().unwrap_or("consumption") {
        "consumption" => {
            let range = parse_range(params.time_range.as_deref())?;
            let granularity = parse_granularity(params.granularity.as_deref())?;
            let data = store.query(&user, range, granularity).await?;
            Ok(Json(TimeSeriesResponse::Consumption {
                success: true,
                metadata: ConsumptionMetadata {
                    time_range: range,
                    granularity: granularity
                        .map(|g| g.to_string())
                        .unwrap_or_else(|| "auto".to_owned()),
                    data_points: data.len(),
                    user_id: user,
                },
                data,
            }))
        }
        "devices" => {
            let range = parse_range(params.time_range.as_deref())?;
            let granularity = parse_granularity(params.granularity.as_deref())?;
            let device = params
                .device_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty());
            let mut data = store.query(&user, range, granularity).await?;
            if let Some(device) = device {
                data.retain(|reading| reading.device_id.as_deref() == Some(device));
            }
            Ok(Json(TimeSeriesResponse::Devices {
                success: true,
                metadata: DeviceMetadata {
                    time_range: range,
                    device_id: device.unwrap_or("all").to_owned(),
                    device_count: data.len(),
                    user_id: user,
                },
                data,
            }))
        }
        "stats" => {
            let now = Utc::now();
            let data = realtime_stats(store.as_ref(), &user, now).await?;
            Ok(Json(TimeSeriesResponse::Stats {
                success: true,
                data,
                metadata: StatsMetadata {
                    timestamp: now,
                    user_id: user,
                },
            }))
        }
        other => Err(ApiError::bad_request(format!("Unknown data type: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReadingsRequest {
    #[serde(default)]
    readings: Vec<MeterReading>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReadingsResponse {
    success: bool,
    message: String,
    count: usize,
    timestamp: DateTime<Utc>,
}

pub(crate) async fn post_time_series_ingest(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ReadingsRequest>, JsonRejection>,
) -> ApiResult<ReadingsResponse> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    if request.readings.is_empty() {
        return Err(ApiError::bad_request(
            "Readings array is required and cannot be empty",
        ));
    }
    let user = state.user(request.user_id.as_deref()).to_owned();
    let submitted = request.readings.len();
    let samples = match validate_readings(request.readings, Utc::now()) {
        Ok(samples) => samples,
        Err(err) => {
            if let Some(recorder) = state.metrics() {
                recorder.record_ingestion(0, submitted);
            }
            return Err(err.into());
        }
    };

    let count = state.source().store().write(&user, &samples).await?;
    if let Some(recorder) = state.metrics() {
        recorder.record_ingestion(count, submitted.saturating_sub(count));
    }
    info!(
        user_id = %user,
        count,
        source = request.source.as_deref().unwrap_or("unknown"),
        "readings ingested"
    );
    Ok(Json(ReadingsResponse {
        success: true,
        message: format!("Successfully ingested {count} readings"),
        count,
        timestamp: Utc::now(),
    }))
}

const MAX_SEED_BATCHES: usize = 24;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SeedRequest {
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SeedResponse {
    success: bool,
    message: String,
    device_count: usize,
    batch_size: usize,
    count: usize,
    timestamp: DateTime<Utc>,
}

/// Seed the store with synthetic hourly batches, newest ending now.
pub(crate) async fn put_time_series_seed(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<SeedRequest>, JsonRejection>,
) -> ApiResult<SeedResponse> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let batch_size = request.batch_size.unwrap_or(1);
    if !(1..=MAX_SEED_BATCHES).contains(&batch_size) {
        return Err(ApiError::bad_request(format!(
            "batchSize must be between 1 and {MAX_SEED_BATCHES}"
        )));
    }
    let user = state.user(request.user_id.as_deref()).to_owned();

    let now = Utc::now();
    let mut samples = Vec::new();
    for batch in 0..batch_size {
        let end = now - Duration::hours(batch as i64);
        samples.extend(state.source().synthetic_series_ending(TimeRange::Hour, end));
    }
    let count = state.source().store().write(&user, &samples).await?;
    if let Some(recorder) = state.metrics() {
        recorder.add_synthesized(samples.len());
    }

    let device_count = state.source().synthesizer().devices().len();
    info!(user_id = %user, batch_size, count, "store seeded with synthetic data");
    Ok(Json(SeedResponse {
        success: true,
        message: format!(
            "Generated {batch_size} batches of mock data with {device_count} devices each"
        ),
        device_count,
        batch_size,
        count,
        timestamp: now,
    }))
}

pub(crate) async fn head_time_series(
    State(state): State<Arc<ApiState>>,
) -> (StatusCode, HeaderMap) {
    let mut headers = HeaderMap::new();
    headers.insert("x-service", HeaderValue::from_static("time-series-api"));
    match state.source().store().ping().await {
        Ok(()) => {
            headers.insert("x-status", HeaderValue::from_static("healthy"));
            (StatusCode::OK, headers)
        }
        Err(err) => {
            warn!(error = %err, "time-series store health probe failed");
            headers.insert("x-status", HeaderValue::from_static("unhealthy"));
            (StatusCode::SERVICE_UNAVAILABLE, headers)
        }
    }
}
