//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Household energy data pipeline: synthesis, aggregation, anomaly detection,
//! validation, export and the time-series store seam.

pub mod aggregate;
pub mod anomaly;
pub mod errors;
pub mod export;
pub mod range;
pub mod sample;
pub mod source;
pub mod store;
pub mod synth;
pub mod validate;

use serde::Serialize;
use tracing::info;
use urja_common::config::{AggregationConfig, DetectionConfig};

pub use aggregate::{resample, AggregateMetrics, Aggregator};
pub use anomaly::{AnomalyDetector, AnomalyRecord, Severity};
pub use errors::{PipelineError, Result};
pub use export::{export_series, read_csv, ExportFormat, CSV_COLUMNS};
pub use range::{Granularity, RangeWindow, TimeRange};
pub use sample::{ConsumptionReading, EnergySample, UNASSIGNED_DEVICE};
pub use source::{DataSource, SampleSource, SourcedSamples};
pub use store::{realtime_stats, InMemoryStore, TimeSeriesStats, TimeSeriesStore};
pub use synth::{hour_multiplier, Synthesizer};
pub use validate::{
    screen_batch, validate_readings, validate_sample, MeterReading, ScreenedBatch,
};

/// Everything a consumer needs to render one series.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub samples: Vec<EnergySample>,
    pub metrics: AggregateMetrics,
    pub anomalies: Vec<AnomalyRecord>,
    pub data_source: DataSource,
}

/// Aggregation and detection stages bound to their configuration.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    aggregator: Aggregator,
    detector: AnomalyDetector,
}

impl Pipeline {
    pub fn from_config(aggregation: &AggregationConfig, detection: &DetectionConfig) -> Self {
        Self {
            aggregator: Aggregator::new(aggregation),
            detector: AnomalyDetector::new(detection.clone()),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    /// Aggregate and scan `sourced`, keeping the samples for the caller.
    pub fn analyze(&self, sourced: SourcedSamples) -> PipelineReport {
        let metrics = self.aggregator.aggregate(&sourced.samples);
        let anomalies = self.detector.detect(&sourced.samples);
        info!(
            samples = sourced.samples.len(),
            anomalies = anomalies.len(),
            data_source = %sourced.source,
            total_kwh = metrics.total_consumption_kwh,
            "pipeline run complete"
        );
        PipelineReport {
            samples: sourced.samples,
            metrics,
            anomalies,
            data_source: sourced.source,
        }
    }
}
