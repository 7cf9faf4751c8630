//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device id assigned to store readings that carry no device tag.
pub const UNASSIGNED_DEVICE: &str = "unassigned";

/// One observation of a single device at an instant.
///
/// Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergySample {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    pub consumption_kwh: f64,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub current_amps: f64,
    #[serde(default)]
    pub power_watts: f64,
    #[serde(default)]
    pub cost_local: f64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub efficiency_pct: Option<f64>,
}

impl EnergySample {
    /// Scale the energy-proportional fields by `factor`.
    pub(crate) fn scale(&mut self, factor: f64) {
        self.consumption_kwh *= factor;
        self.current_amps *= factor;
        self.power_watts *= factor;
        self.cost_local *= factor;
    }
}

/// Tuple shape returned by time-series store queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionReading {
    pub timestamp: DateTime<Utc>,
    pub consumption_kwh: f64,
    pub cost_local: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl From<&EnergySample> for ConsumptionReading {
    fn from(sample: &EnergySample) -> Self {
        Self {
            timestamp: sample.timestamp,
            consumption_kwh: sample.consumption_kwh,
            cost_local: sample.cost_local,
            device_id: Some(sample.device_id.clone()),
        }
    }
}

impl From<ConsumptionReading> for EnergySample {
    fn from(reading: ConsumptionReading) -> Self {
        let device_id = reading
            .device_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| UNASSIGNED_DEVICE.to_owned());
        Self {
            timestamp: reading.timestamp,
            device_name: device_id.clone(),
            device_id,
            consumption_kwh: reading.consumption_kwh,
            voltage: 0.0,
            current_amps: 0.0,
            power_watts: reading.consumption_kwh * 1000.0,
            cost_local: reading.cost_local,
            location: None,
            efficiency_pct: None,
        }
    }
}
