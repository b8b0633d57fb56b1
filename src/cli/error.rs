//! CLI error types and conversions

use crate::metrics::MetricsError;
use crate::progress::ProgressError;
use crate::pull::PullError;
use crate::range::RangeError;
use crate::session::SessionError;
use crate::store::StoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Pull error
    #[error("pull error: {0}")]
    PullError(#[from] PullError),

    /// Progress error
    #[error("progress error: {0}")]
    ProgressError(#[from] ProgressError),

    /// Session error
    #[error("session error: {0}")]
    SessionError(#[from] SessionError),

    /// Database error
    #[error("database error: {0}")]
    StoreError(#[from] StoreError),

    /// Range error
    #[error("range error: {0}")]
    RangeError(#[from] RangeError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Interactive prompt failed
    #[error("prompt failed: {0}")]
    Prompt(String),
}
