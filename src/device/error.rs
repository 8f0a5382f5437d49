//! Error types for the device double
//!
//! Domain errors use thiserror; the session and binary wrap them with
//! anyhow at the boundary.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level device error
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Inbound frame could not be dispatched
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Registry snapshot could not be encoded
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Failures while turning an inbound frame into a lifecycle command.
///
/// None of these are fatal: the session logs them and drops the frame.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Frame is not valid JSON or not a JSON-RPC object
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required parameter is absent or has the wrong type
    #[error("missing or invalid parameter: {0}")]
    MissingField(&'static str),

    /// Method carried the subscriber prefix but names no known operation
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
}

/// Convenience result alias for dispatch operations
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Path of the config file
        path: PathBuf,
        /// Underlying IO error
        source: io::Error,
    },

    /// Config file is not valid JSON for [`DeviceConfig`](super::DeviceConfig)
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Path of the config file
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// A setting has an unusable value
    #[error("invalid setting '{key}': {detail}")]
    Invalid {
        /// Setting name
        key: &'static str,
        /// Why the value was rejected
        detail: String,
    },
}
