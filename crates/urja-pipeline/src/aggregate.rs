//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use urja_common::config::AggregationConfig;

use crate::range::Granularity;
use crate::sample::EnergySample;

/// Summary statistics over a sample collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub total_consumption_kwh: f64,
    pub total_cost_local: f64,
    pub active_device_count: usize,
    pub peak_demand_watts: f64,
    pub average_efficiency_pct: f64,
    pub estimated_carbon_kg: f64,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    idle_threshold_kwh: f64,
    carbon_intensity_kg_per_kwh: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(&AggregationConfig::default())
    }
}

impl Aggregator {
    pub fn new(config: &AggregationConfig) -> Self {
        Self {
            idle_threshold_kwh: config.idle_threshold_kwh,
            carbon_intensity_kg_per_kwh: config.carbon_intensity_kg_per_kwh,
        }
    }

    /// Reduce `samples` into [`AggregateMetrics`].
    ///
    /// Empty input yields zero totals, a zero peak and a zero average efficiency.
    pub fn aggregate(&self, samples: &[EnergySample]) -> AggregateMetrics {
        let mut total_consumption_kwh = 0.0;
        let mut total_cost_local = 0.0;
        let mut efficiency_sum = 0.0;
        let mut active_device_count = 0;
        let mut peak_demand_watts = 0.0_f64;
        for sample in samples {
            total_consumption_kwh += sample.consumption_kwh;
            total_cost_local += sample.cost_local;
            efficiency_sum += sample.efficiency_pct.unwrap_or(0.0);
            if sample.consumption_kwh > self.idle_threshold_kwh {
                active_device_count += 1;
            }
            peak_demand_watts = peak_demand_watts.max(sample.power_watts);
        }
        let average_efficiency_pct = if samples.is_empty() {
            0.0
        } else {
            efficiency_sum / samples.len() as f64
        };

        AggregateMetrics {
            total_consumption_kwh,
            total_cost_local,
            active_device_count,
            peak_demand_watts,
            average_efficiency_pct,
            estimated_carbon_kg: total_consumption_kwh * self.carbon_intensity_kg_per_kwh,
        }
    }
}

#[derive(Debug, Default)]
struct Bucket<'a> {
    first: Option<&'a EnergySample>,
    count: usize,
    consumption_kwh: f64,
    voltage: f64,
    current_amps: f64,
    power_watts: f64,
    cost_local: f64,
    efficiency_sum: f64,
    efficiency_count: usize,
}

impl<'a> Bucket<'a> {
    fn push(&mut self, sample: &'a EnergySample) {
        self.first.get_or_insert(sample);
        self.count += 1;
        self.consumption_kwh += sample.consumption_kwh;
        self.voltage += sample.voltage;
        self.current_amps += sample.current_amps;
        self.power_watts += sample.power_watts;
        self.cost_local += sample.cost_local;
        if let Some(efficiency) = sample.efficiency_pct {
            self.efficiency_sum += efficiency;
            self.efficiency_count += 1;
        }
    }

    fn into_sample(self, window_start: i64) -> Option<EnergySample> {
        let first = self.first?;
        let timestamp = Utc.timestamp_opt(window_start, 0).single()?;
        let n = self.count as f64;
        Some(EnergySample {
            timestamp,
            device_id: first.device_id.clone(),
            device_name: first.device_name.clone(),
            consumption_kwh: self.consumption_kwh / n,
            voltage: self.voltage / n,
            current_amps: self.current_amps / n,
            power_watts: self.power_watts / n,
            cost_local: self.cost_local / n,
            location: first.location.clone(),
            efficiency_pct: (self.efficiency_count > 0)
                .then(|| self.efficiency_sum / self.efficiency_count as f64),
        })
    }
}

/// Mean-downsample `samples` per device into aligned `granularity` windows.
///
/// Each output sample is stamped with its window start. Windows without samples
/// are not emitted. Output is ordered by window, then by device first appearance.
pub fn resample(samples: &[EnergySample], granularity: Granularity) -> Vec<EnergySample> {
    let width = granularity.as_secs();
    let mut windows: BTreeMap<i64, IndexMap<&str, Bucket<'_>>> = BTreeMap::new();
    for sample in samples {
        let start = sample.timestamp.timestamp().div_euclid(width) * width;
        windows
            .entry(start)
            .or_default()
            .entry(sample.device_id.as_str())
            .or_default()
            .push(sample);
    }
    windows
        .into_iter()
        .flat_map(|(start, devices)| {
            devices
                .into_values()
                .filter_map(move |bucket| bucket.into_sample(start))
        })
        .collect()
}
