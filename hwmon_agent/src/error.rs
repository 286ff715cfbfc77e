//! Error types for sensor queries, publishing, the poll loop and startup config.

use thiserror::Error;

/// Faults raised while reading sensors. None of these are recovered locally.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("temperature sensor '{label}' not present on this platform")]
    MissingSensor { label: String },

    #[error("core index {index} out of range (detected {count})")]
    CoreOutOfRange { index: usize, count: usize },

    #[error("sensor interface unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("mqtt client rejected publish: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("publish client already shut down")]
    Closed,
}

/// Anything that ends the poll loop.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0}")]
    Usage(String),

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid poll interval '{0}': expected a positive integer number of seconds")]
    InvalidInterval(String),

    #[error("unknown profile '{0}' (expected standard, per-core or rk3588)")]
    UnknownProfile(String),
}
