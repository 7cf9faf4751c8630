//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use urja_common::config::DetectionConfig;

use crate::sample::EnergySample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flagged deviation for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub device_id: String,
    pub description: String,
    pub severity: Severity,
}

/// Flags consumption spikes and efficiency degradation per device.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectionConfig,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Detect anomalies, ordered by device first appearance and then by
    /// condition (spike before efficiency).
    pub fn detect(&self, samples: &[EnergySample]) -> Vec<AnomalyRecord> {
        let mut groups: IndexMap<&str, Vec<&EnergySample>> = IndexMap::new();
        for sample in samples {
            groups
                .entry(sample.device_id.as_str())
                .or_default()
                .push(sample);
        }

        let mut anomalies = Vec::new();
        for (device_id, group) in groups {
            if let Some(record) = self.consumption_spike(device_id, &group) {
                anomalies.push(record);
            }
            if let Some(record) = self.low_efficiency(device_id, &group) {
                anomalies.push(record);
            }
        }
        anomalies
    }

    fn consumption_spike(&self, device_id: &str, group: &[&EnergySample]) -> Option<AnomalyRecord> {
        let consumption: Vec<f64> = group.iter().map(|s| s.consumption_kwh).collect();
        let mean = consumption.iter().mean();
        let peak = Statistics::max(&consumption);
        if !(peak > mean * self.config.spike_ratio) {
            return None;
        }
        let severity = if peak > mean * self.config.severe_spike_ratio {
            Severity::High
        } else {
            Severity::Medium
        };
        let over_mean_pct = (peak / mean - 1.0) * 100.0;
        Some(AnomalyRecord {
            device_id: device_id.to_owned(),
            description: format!(
                "Consumption spike detected: {peak:.1} kWh ({over_mean_pct:.0}% above average)"
            ),
            severity,
        })
    }

    fn low_efficiency(&self, device_id: &str, group: &[&EnergySample]) -> Option<AnomalyRecord> {
        let reported: Vec<f64> = group.iter().filter_map(|s| s.efficiency_pct).collect();
        if reported.is_empty() {
            return None;
        }
        let mean = reported.iter().mean();
        if !(mean < self.config.low_efficiency_pct) {
            return None;
        }
        let severity = if mean < self.config.critical_efficiency_pct {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(AnomalyRecord {
            device_id: device_id.to_owned(),
            description: format!("Low efficiency detected: {mean:.1}%"),
            severity,
        })
    }
}
