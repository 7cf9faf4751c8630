//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::error;

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every family in `registry` in the Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

/// Router exposing `registry` at `/metrics`, ready to merge into an API router.
pub fn metrics_router<S>(registry: SharedRegistry) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(move || metrics_handler(registry.clone())))
}

async fn metrics_handler(registry: SharedRegistry) -> Response {
    match encode_registry(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone, Debug)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "urjad_starts_total",
            "Total number of times the UrjaBandhu daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "urjad_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("urjad_build_info", "Build metadata for the running daemon"),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

/// Counters and timings for pipeline runs served by the API.
#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    registry: SharedRegistry,
    samples_synthesized: IntCounter,
    samples_ingested: IntCounter,
    samples_rejected: IntCounter,
    anomalies: IntCounterVec,
    run_seconds: Histogram,
    responses: IntCounterVec,
}

impl PipelineMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let samples_synthesized = IntCounter::with_opts(Opts::new(
            "urja_samples_synthesized_total",
            "Samples produced by the synthesizer",
        ))?;
        registry.register(Box::new(samples_synthesized.clone()))?;

        let samples_ingested = IntCounter::with_opts(Opts::new(
            "urja_samples_ingested_total",
            "Externally supplied samples accepted and stored",
        ))?;
        registry.register(Box::new(samples_ingested.clone()))?;

        let samples_rejected = IntCounter::with_opts(Opts::new(
            "urja_samples_rejected_total",
            "Externally supplied samples that failed validation or decoding",
        ))?;
        registry.register(Box::new(samples_rejected.clone()))?;

        let anomalies = IntCounterVec::new(
            Opts::new("urja_anomalies_total", "Anomalies flagged by severity"),
            &["severity"],
        )?;
        registry.register(Box::new(anomalies.clone()))?;

        let run_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "urja_pipeline_run_seconds",
                "Wall time of one sourcing, aggregation and detection pass",
            )
            .buckets(prometheus::exponential_buckets(0.0005, 2.0, 14)?),
        )?;
        registry.register(Box::new(run_seconds.clone()))?;

        let responses = IntCounterVec::new(
            Opts::new(
                "urja_series_responses_total",
                "Series responses served by data source",
            ),
            &["data_source"],
        )?;
        registry.register(Box::new(responses.clone()))?;

        Ok(Self {
            registry,
            samples_synthesized,
            samples_ingested,
            samples_rejected,
            anomalies,
            run_seconds,
            responses,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn add_synthesized(&self, count: usize) {
        self.samples_synthesized.inc_by(count as u64);
    }

    pub fn record_ingestion(&self, accepted: usize, rejected: usize) {
        self.samples_ingested.inc_by(accepted as u64);
        self.samples_rejected.inc_by(rejected as u64);
    }

    pub fn record_anomaly(&self, severity: &str) {
        self.anomalies.with_label_values(&[severity]).inc();
    }

    pub fn observe_run(&self, seconds: f64) {
        self.run_seconds.observe(seconds);
    }

    pub fn record_response(&self, data_source: &str) {
        self.responses.with_label_values(&[data_source]).inc();
    }
}

pub use prometheus;
