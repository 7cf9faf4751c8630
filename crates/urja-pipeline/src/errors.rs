//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Energy data pipeline routines for household consumption."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported time range '{0}', expected one of 1h, 6h, 24h, 7d, 30d")]
    InvalidRange(String),
    #[error("invalid granularity '{0}', expected <n><s|m|h|d>")]
    InvalidGranularity(String),
    #[error("unsupported export format '{0}', expected json or csv")]
    InvalidFormat(String),
    #[error("Invalid {0} value")]
    InvalidReading(&'static str),
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
    #[error("time-series store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("export produced non UTF-8 output")]
    NonUtf8Export(#[from] std::string::FromUtf8Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
