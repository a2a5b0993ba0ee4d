//! Error types for hostprobe.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostprobeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("invalid destination port: {0}")]
    InvalidPort(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for hostprobe operations
pub type HostprobeResult<T> = Result<T, HostprobeError>;
