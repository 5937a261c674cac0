//! # Error Types
//!
//! Custom error types for UWB Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for UWB Bridge
#[derive(Debug, Error)]
pub enum UwbBridgeError {
    /// On-air frame codec errors
    #[error("Frame codec error: {0}")]
    Frame(String),

    /// PPRZ protocol errors
    #[error("PPRZ protocol error: {0}")]
    Pprz(String),

    /// Radio HAL errors
    #[error("Radio error: {0}")]
    Radio(String),

    /// Degenerate or malformed ranging exchange
    #[error("Ranging error: {0}")]
    Ranging(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No usable serial device
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Range log serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for UWB Bridge
pub type Result<T> = std::result::Result<T, UwbBridgeError>;
