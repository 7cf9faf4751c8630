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
use std::io::Read;
use std::str::FromStr;

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};
use crate::sample::EnergySample;

/// Fixed CSV column order.
pub const CSV_COLUMNS: [&str; 10] = [
    "timestamp",
    "deviceId",
    "deviceName",
    "consumptionKwh",
    "voltage",
    "currentAmps",
    "powerWatts",
    "costLocal",
    "location",
    "efficiencyPct",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(PipelineError::InvalidFormat(value.to_owned())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Serialize `samples` without validating them.
pub fn export_series(samples: &[EnergySample], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(samples)?),
        ExportFormat::Csv => write_csv(samples),
    }
}

fn write_csv(samples: &[EnergySample]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;
    for sample in samples {
        writer.serialize(sample)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| PipelineError::Io(err.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Parse samples previously written by [`export_series`] in CSV form.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<EnergySample>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut samples = Vec::new();
    for row in reader.deserialize::<EnergySample>() {
        samples.push(row?);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_csv_still_has_header() {
        let csv = export_series(&[], ExportFormat::Csv).unwrap();
        assert_eq!(csv.trim_end(), CSV_COLUMNS.join(","));
    }

    #[test]
    fn names_with_commas_are_quoted() {
        let sample = EnergySample {
            timestamp: Utc::now(),
            device_id: "dev_010".into(),
            device_name: "Lamp, bedside".into(),
            consumption_kwh: 0.04,
            voltage: 221.0,
            current_amps: 0.18,
            power_watts: 40.0,
            cost_local: 0.26,
            location: None,
            efficiency_pct: None,
        };
        let csv = export_series(std::slice::from_ref(&sample), ExportFormat::Csv).unwrap();
        assert!(csv.contains("\"Lamp, bedside\""));
        let parsed = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed, vec![sample]);
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
