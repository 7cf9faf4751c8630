//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use tracing::debug;
use urja_common::config::{DeviceSpec, SynthesisConfig};

use crate::errors::{PipelineError, Result};
use crate::range::TimeRange;
use crate::sample::EnergySample;

/// Generates synthetic household samples from a device catalog.
///
/// The random source is always supplied by the caller so runs can be seeded.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    devices: Vec<DeviceSpec>,
    rate_per_kwh: f64,
    nominal_voltage: f64,
    consumption_noise: Uniform<f64>,
    voltage_noise: Uniform<f64>,
    efficiency: Uniform<f64>,
    offset: FixedOffset,
}

impl Synthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|err| PipelineError::InvalidConfig(err.to_string()))?;
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "utc offset of {} minutes is out of range",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self {
            devices: config.devices.clone(),
            rate_per_kwh: config.rate_per_kwh,
            nominal_voltage: config.nominal_voltage,
            consumption_noise: Uniform::new_inclusive(
                1.0 - config.consumption_noise,
                1.0 + config.consumption_noise,
            ),
            voltage_noise: Uniform::new_inclusive(-config.voltage_jitter, config.voltage_jitter),
            efficiency: Uniform::new_inclusive(config.efficiency_min, config.efficiency_max),
            offset,
        })
    }

    pub fn devices(&self) -> &[DeviceSpec] {
        &self.devices
    }

    /// One sample per catalog device, stamped with the current time.
    pub fn generate_instant<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<EnergySample> {
        self.generate_instant_at(Utc::now(), rng)
    }

    /// One sample per catalog device, stamped with `at`.
    pub fn generate_instant_at<R: Rng + ?Sized>(
        &self,
        at: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<EnergySample> {
        self.devices
            .iter()
            .map(|device| {
                let consumption = device.base_consumption_kwh * self.consumption_noise.sample(rng);
                let voltage = self.nominal_voltage + self.voltage_noise.sample(rng);
                EnergySample {
                    timestamp: at,
                    device_id: device.id.clone(),
                    device_name: device.name.clone(),
                    consumption_kwh: consumption,
                    voltage,
                    current_amps: (consumption * 1000.0) / voltage,
                    power_watts: consumption * 1000.0,
                    cost_local: consumption * self.rate_per_kwh,
                    location: device.location.clone(),
                    efficiency_pct: Some(self.efficiency.sample(rng)),
                }
            })
            .collect()
    }

    /// Back-filled series for `range` ending now.
    pub fn generate_series<R: Rng + ?Sized>(
        &self,
        range: TimeRange,
        rng: &mut R,
    ) -> Vec<EnergySample> {
        self.generate_series_ending(range, Utc::now(), rng)
    }

    /// Back-filled series for `range`; batch `i` of `n` sits at `end - (n - i) * interval`.
    pub fn generate_series_ending<R: Rng + ?Sized>(
        &self,
        range: TimeRange,
        end: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<EnergySample> {
        let window = range.window();
        let mut samples = Vec::with_capacity(window.points * self.devices.len());
        for i in 0..window.points {
            let at = end - window.interval * (window.points - i) as i32;
            let multiplier = hour_multiplier(at.with_timezone(&self.offset).hour());
            let mut batch = self.generate_instant_at(at, rng);
            for sample in &mut batch {
                sample.scale(multiplier);
            }
            samples.extend(batch);
        }
        debug!(
            range = %range,
            batches = window.points,
            samples = samples.len(),
            "synthetic series generated"
        );
        samples
    }
}

/// Time-of-day load shape applied to synthetic series.
pub fn hour_multiplier(hour: u32) -> f64 {
    match hour {
        6..=9 => 1.3,
        12..=14 => 1.2,
        18..=22 => 1.4,
        23 | 0..=5 => 0.6,
        _ => 1.0,
    }
}
