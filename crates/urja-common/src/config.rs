//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the pipeline runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_true() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_rate_per_kwh() -> f64 {
    6.5
}

fn default_nominal_voltage() -> f64 {
    220.0
}

fn default_voltage_jitter() -> f64 {
    10.0
}

fn default_consumption_noise() -> f64 {
    0.2
}

fn default_efficiency_min() -> f64 {
    70.0
}

fn default_efficiency_max() -> f64 {
    95.0
}

fn default_idle_threshold() -> f64 {
    0.01
}

fn default_carbon_intensity() -> f64 {
    0.82
}

fn default_spike_ratio() -> f64 {
    2.0
}

fn default_severe_spike_ratio() -> f64 {
    3.0
}

fn default_low_efficiency() -> f64 {
    70.0
}

fn default_critical_efficiency() -> f64 {
    50.0
}

fn default_store_user() -> String {
    "household".to_owned()
}

fn default_retention() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

/// Primary configuration object for the pipeline daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
///
/// `source` is `None` when no candidate existed and built-in defaults apply.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "URJA_CONFIG";

    /// Load configuration from the first existing candidate, respecting the
    /// `URJA_CONFIG` override. Falls back to defaults when nothing is found.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.synthesis.validate()?;
        self.aggregation.validate()?;
        self.detection.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_api_listen(),
        }
    }
}

/// Controls whether the Prometheus registry is served at `/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// One entry of the household device catalog used for synthetic samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: String,
    pub name: String,
    pub base_consumption_kwh: f64,
    #[serde(default)]
    pub location: Option<String>,
}

impl DeviceSpec {
    pub fn new(id: &str, name: &str, base_consumption_kwh: f64, location: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            base_consumption_kwh,
            location: Some(location.to_owned()),
        }
    }
}

/// The eight-device household catalog.
pub fn default_device_catalog() -> Vec<DeviceSpec> {
    vec![
        DeviceSpec::new("dev_001", "Living Room AC", 1.5, "Living Room"),
        DeviceSpec::new("dev_002", "Refrigerator", 0.3, "Kitchen"),
        DeviceSpec::new("dev_003", "LED TV", 0.15, "Living Room"),
        DeviceSpec::new("dev_004", "Washing Machine", 2.0, "Utility"),
        DeviceSpec::new("dev_005", "Water Heater", 3.0, "Bathroom"),
        DeviceSpec::new("dev_006", "Microwave", 1.2, "Kitchen"),
        DeviceSpec::new("dev_007", "Laptop Charger", 0.065, "Study"),
        DeviceSpec::new("dev_008", "Ceiling Fans", 0.2, "All Rooms"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_rate_per_kwh")]
    pub rate_per_kwh: f64,
    #[serde(default = "default_nominal_voltage")]
    pub nominal_voltage: f64,
    #[serde(default = "default_voltage_jitter")]
    pub voltage_jitter: f64,
    /// Fractional multiplicative noise applied to each device's base consumption.
    #[serde(default = "default_consumption_noise")]
    pub consumption_noise: f64,
    #[serde(default = "default_efficiency_min")]
    pub efficiency_min: f64,
    #[serde(default = "default_efficiency_max")]
    pub efficiency_max: f64,
    /// Offset from UTC used when picking the time-of-day multiplier.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default = "default_device_catalog")]
    pub devices: Vec<DeviceSpec>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            rate_per_kwh: default_rate_per_kwh(),
            nominal_voltage: default_nominal_voltage(),
            voltage_jitter: default_voltage_jitter(),
            consumption_noise: default_consumption_noise(),
            efficiency_min: default_efficiency_min(),
            efficiency_max: default_efficiency_max(),
            utc_offset_minutes: 0,
            random_seed: None,
            devices: default_device_catalog(),
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(anyhow!("synthesis catalog must declare at least one device"));
        }
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(anyhow!("device '{}' has an empty id", device.name));
            }
            if !(device.base_consumption_kwh >= 0.0) {
                return Err(anyhow!(
                    "device '{}' must have a non-negative base consumption",
                    device.id
                ));
            }
        }
        if !(self.rate_per_kwh >= 0.0) {
            return Err(anyhow!("synthesis rate_per_kwh must be non-negative"));
        }
        if !(self.voltage_jitter >= 0.0) || !(self.nominal_voltage - self.voltage_jitter > 0.0) {
            return Err(anyhow!(
                "synthesis nominal_voltage ({}) must exceed voltage_jitter ({})",
                self.nominal_voltage,
                self.voltage_jitter
            ));
        }
        if !(0.0..1.0).contains(&self.consumption_noise) {
            return Err(anyhow!(
                "synthesis consumption_noise must be within [0, 1), got {}",
                self.consumption_noise
            ));
        }
        if !(0.0 <= self.efficiency_min
            && self.efficiency_min <= self.efficiency_max
            && self.efficiency_max <= 100.0)
        {
            return Err(anyhow!(
                "synthesis efficiency range [{}, {}] must lie within [0, 100]",
                self.efficiency_min,
                self.efficiency_max
            ));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(anyhow!(
                "synthesis utc_offset_minutes must be within +/- 1439, got {}",
                self.utc_offset_minutes
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Samples at or below this consumption do not count as active devices.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_kwh: f64,
    /// Regional grid emission factor in kg CO2 per kWh.
    #[serde(default = "default_carbon_intensity")]
    pub carbon_intensity_kg_per_kwh: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            idle_threshold_kwh: default_idle_threshold(),
            carbon_intensity_kg_per_kwh: default_carbon_intensity(),
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.idle_threshold_kwh >= 0.0) || !(self.carbon_intensity_kg_per_kwh >= 0.0) {
            return Err(anyhow!(
                "aggregation idle threshold and carbon intensity must be non-negative"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,
    #[serde(default = "default_severe_spike_ratio")]
    pub severe_spike_ratio: f64,
    #[serde(default = "default_low_efficiency")]
    pub low_efficiency_pct: f64,
    #[serde(default = "default_critical_efficiency")]
    pub critical_efficiency_pct: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            spike_ratio: default_spike_ratio(),
            severe_spike_ratio: default_severe_spike_ratio(),
            low_efficiency_pct: default_low_efficiency(),
            critical_efficiency_pct: default_critical_efficiency(),
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.spike_ratio > 1.0 && self.severe_spike_ratio >= self.spike_ratio) {
            return Err(anyhow!(
                "detection spike ratios must satisfy 1 < spike_ratio ({}) <= severe_spike_ratio ({})",
                self.spike_ratio,
                self.severe_spike_ratio
            ));
        }
        if !(self.critical_efficiency_pct <= self.low_efficiency_pct) {
            return Err(anyhow!(
                "detection critical_efficiency_pct ({}) must not exceed low_efficiency_pct ({})",
                self.critical_efficiency_pct,
                self.low_efficiency_pct
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_user")]
    pub default_user: String,
    #[serde(default = "default_retention")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retention: Duration,
    /// Serve synthetic data, tagged as such, when the store is empty or failing.
    #[serde(default = "default_true")]
    pub fallback_to_synthetic: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_user: default_store_user(),
            retention: default_retention(),
            fallback_to_synthetic: true,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_user.trim().is_empty() {
            return Err(anyhow!("store default_user must not be empty"));
        }
        if self.retention.is_zero() {
            return Err(anyhow!("store retention must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.synthesis.devices.len(), 8);
        assert_eq!(config.synthesis.rate_per_kwh, 6.5);
        assert_eq!(config.aggregation.carbon_intensity_kg_per_kwh, 0.82);
        assert_eq!(config.aggregation.idle_threshold_kwh, 0.01);
        assert_eq!(config.detection.spike_ratio, 2.0);
        assert_eq!(config.detection.critical_efficiency_pct, 50.0);
        assert!(config.store.fallback_to_synthetic);
        assert_eq!(config.api.listen.port(), 8080);
    }

    #[test]
    fn parses_overrides() {
        let config: AppConfig = r#"
            [synthesis]
            rate_per_kwh = 8.0
            random_seed = 42
            utc_offset_minutes = 330

            [[synthesis.devices]]
            id = "dev_100"
            name = "Heat Pump"
            base_consumption_kwh = 2.5

            [store]
            retention = 3600
            fallback_to_synthetic = false
        "#
        .parse()
        .unwrap();
        assert_eq!(config.synthesis.rate_per_kwh, 8.0);
        assert_eq!(config.synthesis.random_seed, Some(42));
        assert_eq!(config.synthesis.devices.len(), 1);
        assert_eq!(config.synthesis.devices[0].location, None);
        assert_eq!(config.store.retention, Duration::from_secs(3600));
        assert!(!config.store.fallback_to_synthetic);
    }

    #[test]
    fn rejects_inverted_spike_ratios() {
        let err = r#"
            [detection]
            spike_ratio = 3.0
            severe_spike_ratio = 2.0
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("spike"));
    }

    #[test]
    fn rejects_jitter_exceeding_nominal_voltage() {
        let mut config = AppConfig::default();
        config.synthesis.voltage_jitter = 250.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_catalog() {
        let mut config = AppConfig::default();
        config.synthesis.devices.clear();
        assert!(config.validate().is_err());
    }
}
