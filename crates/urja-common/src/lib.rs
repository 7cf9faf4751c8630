//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the pipeline runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the UrjaBandhu workspace.
//! This crate exposes configuration loading and tracing initialisation
//! consumed by the pipeline, the API and the daemon.

pub mod config;
pub mod logging;

pub use config::{
    AggregationConfig, ApiConfig, AppConfig, DetectionConfig, DeviceSpec, LoadedAppConfig,
    LoggingConfig, MetricsConfig, StoreConfig, SynthesisConfig,
};
pub use logging::{init_tracing, LogFormat};
