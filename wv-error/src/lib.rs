//! Unified error handling for WireView
//!
//! This crate provides a single error type used across all WireView components.
//! Transient conditions (busy port, timeouts, missing daemon) are ordinary variants
//! so callers can match on them instead of unwinding.

use std::io;
use std::path::PathBuf;

/// Result type alias using WireViewError
pub type Result<T> = std::result::Result<T, WireViewError>;

/// Unified error type for all WireView operations
#[derive(thiserror::Error, Debug)]
pub enum WireViewError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Serial Port and Device Protocol Errors
    // ============================================================================
    #[error("Serial port is busy (held by another thread or process)")]
    PortBusy,

    #[error("Serial port error on {port}: {reason}")]
    SerialPort {
        port: String,
        reason: String,
    },

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        expected: usize,
        actual: usize,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unsupported config version: {0}")]
    UnsupportedConfigVersion(u8),

    #[error("Device not connected")]
    DeviceNotConnected,

    #[error("Operation cancelled")]
    Cancelled,

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    #[error("Daemon not available")]
    DaemonUnavailable,

    #[error("Daemon returned status {status:#04x}")]
    DaemonStatus {
        status: u8,
    },

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },

    // ============================================================================
    // Configuration and Settings Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl WireViewError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed-response error from a string
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a serial port error for the given port
    pub fn serial(port: impl Into<String>, reason: impl ToString) -> Self {
        Self::SerialPort {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Conditions worth retrying later without user intervention
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PortBusy | Self::Timeout(_) | Self::DaemonUnavailable | Self::DaemonStatus { .. }
        )
    }
}
