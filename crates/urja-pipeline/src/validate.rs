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
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::sample::{ConsumptionReading, EnergySample};

/// Ingestion gate for externally supplied samples.
///
/// Accepts a sample iff every numeric reading is non-negative (NaN fails) and the
/// device id is not blank.
pub fn validate_sample(sample: &EnergySample) -> bool {
    let readings = [
        sample.consumption_kwh,
        sample.voltage,
        sample.current_amps,
        sample.power_watts,
        sample.cost_local,
    ];
    readings.iter().all(|value| *value >= 0.0)
        && sample.efficiency_pct.map_or(true, |value| value >= 0.0)
        && !sample.device_id.trim().is_empty()
}

/// Outcome of screening a raw ingestion batch.
#[derive(Debug, Default)]
pub struct ScreenedBatch {
    pub accepted: Vec<EnergySample>,
    pub rejected: usize,
}

/// Deserialize and validate each raw item; malformed items count as rejected.
pub fn screen_batch(items: Vec<Value>) -> ScreenedBatch {
    let mut batch = ScreenedBatch::default();
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<EnergySample>(item) {
            Ok(sample) if validate_sample(&sample) => batch.accepted.push(sample),
            Ok(sample) => {
                debug!(index, device_id = %sample.device_id, "sample failed validation");
                batch.rejected += 1;
            }
            Err(err) => {
                debug!(index, error = %err, "sample could not be decoded");
                batch.rejected += 1;
            }
        }
    }
    batch
}

/// Meter reading as pushed by collectors to the time-series ingest route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub consumption: f64,
    pub power: f64,
    pub cost: f64,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MeterReading {
    /// Stamp missing timestamps with `now` and convert to a sample.
    fn into_sample(self, now: DateTime<Utc>) -> EnergySample {
        let mut sample = EnergySample::from(ConsumptionReading {
            timestamp: self.timestamp.unwrap_or(now),
            consumption_kwh: self.consumption,
            cost_local: self.cost,
            device_id: self.device_id,
        });
        sample.power_watts = self.power;
        sample.location = self.location.filter(|l| !l.trim().is_empty());
        sample
    }
}

/// All-or-nothing validation of a reading batch.
///
/// The first negative or NaN field fails the whole batch.
pub fn validate_readings(
    readings: Vec<MeterReading>,
    now: DateTime<Utc>,
) -> Result<Vec<EnergySample>> {
    readings
        .into_iter()
        .map(|reading| {
            let checks = [
                ("consumption", reading.consumption),
                ("power", reading.power),
                ("cost", reading.cost),
            ];
            match checks
                .into_iter()
                .find(|(_, value)| value.is_nan() || *value < 0.0)
            {
                Some((field, _)) => Err(PipelineError::InvalidReading(field)),
                None => Ok(reading.into_sample(now)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn zeroed(device_id: &str) -> EnergySample {
        EnergySample {
            timestamp: Utc::now(),
            device_id: device_id.to_owned(),
            device_name: String::new(),
            consumption_kwh: 0.0,
            voltage: 0.0,
            current_amps: 0.0,
            power_watts: 0.0,
            cost_local: 0.0,
            location: None,
            efficiency_pct: None,
        }
    }

    #[test]
    fn accepts_all_zero_sample_with_device() {
        assert!(validate_sample(&zeroed("dev_001")));
    }

    #[test]
    fn rejects_negative_readings_and_blank_device() {
        let mut negative_consumption = zeroed("dev_001");
        negative_consumption.consumption_kwh = -0.1;
        assert!(!validate_sample(&negative_consumption));

        let mut negative_voltage = zeroed("dev_001");
        negative_voltage.voltage = -230.0;
        assert!(!validate_sample(&negative_voltage));

        let mut negative_efficiency = zeroed("dev_001");
        negative_efficiency.efficiency_pct = Some(-1.0);
        assert!(!validate_sample(&negative_efficiency));

        let mut not_a_number = zeroed("dev_001");
        not_a_number.cost_local = f64::NAN;
        assert!(!validate_sample(&not_a_number));

        assert!(!validate_sample(&zeroed("")));
        assert!(!validate_sample(&zeroed("   ")));
    }

    #[test]
    fn screening_counts_malformed_items_as_rejected() {
        let batch = screen_batch(vec![
            json!({"deviceId": "dev_001", "consumptionKwh": 0.5, "costLocal": 3.25}),
            json!({"deviceId": "dev_002", "consumptionKwh": -1.0}),
            json!({"deviceId": "dev_003"}),
            json!("not an object"),
        ]);
        assert_eq!(batch.accepted.len(), 1);
        assert_eq!(batch.accepted[0].device_id, "dev_001");
        assert_eq!(batch.rejected, 3);
    }

    fn meter(consumption: f64, power: f64, cost: f64) -> MeterReading {
        MeterReading {
            consumption,
            power,
            cost,
            device_id: None,
            location: None,
            timestamp: None,
        }
    }

    #[test]
    fn readings_convert_with_defaults() {
        let now = Utc::now();
        let mut tagged = meter(0.8, 450.0, 5.2);
        tagged.device_id = Some("dev_004".into());
        tagged.location = Some("Kitchen".into());
        let samples = validate_readings(vec![tagged, meter(0.2, 0.0, 1.3)], now).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].device_id, "dev_004");
        assert_eq!(samples[0].power_watts, 450.0);
        assert_eq!(samples[0].location.as_deref(), Some("Kitchen"));
        assert_eq!(samples[1].device_id, crate::sample::UNASSIGNED_DEVICE);
        assert_eq!(samples[1].timestamp, now);
    }

    #[test]
    fn one_bad_reading_rejects_the_batch() {
        let err = validate_readings(vec![meter(0.5, 10.0, 1.0), meter(0.5, -1.0, 1.0)], Utc::now())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidReading("power")));
        assert_eq!(err.to_string(), "Invalid power value");

        let err = validate_readings(vec![meter(f64::NAN, 0.0, 0.0)], Utc::now()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidReading("consumption")));
    }
}
