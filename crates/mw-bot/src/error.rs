//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("REST client error: {0}")]
    Rest(#[from] mw_rest::RestError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] mw_telemetry::TelemetryError),

    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
