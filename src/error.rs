//! # Error Types
//!
//! Custom error types for CRSF Link using `thiserror`.

use thiserror::Error;

use crate::crsf::decoder::FrameError;

/// Main error type for CRSF Link
#[derive(Debug, Error)]
pub enum CrsfLinkError {
    /// CRSF protocol errors (frame construction)
    #[error("CRSF protocol error: {0}")]
    CrsfProtocol(String),

    /// Malformed inbound frame
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No configured serial device could be opened
    #[error("Serial port not found, tried: {0}")]
    SerialPortNotFound(String),

    /// Transport is currently disconnected
    #[error("Serial transport is not connected")]
    NotConnected,

    /// Channel index outside 1..=16
    #[error("Channel must be between 1 and 16, got {channel}")]
    ChannelOutOfRange { channel: i64 },

    /// Channel value outside 1000..=2000 in a single-channel update
    #[error("Channel {channel} value must be between 1000 and 2000, got {value}")]
    ValueOutOfRange { channel: i64, value: i64 },

    /// Channel value outside 1000..=2000 in a bulk update
    #[error("Invalid value {value} at position {index}: must be between 1000 and 2000")]
    InvalidChannelValue { index: usize, value: i64 },

    /// Bulk update with the wrong number of channels
    #[error("Expected {expected} channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    /// Unknown work mode name
    #[error("Invalid work mode '{0}': expected 'joystick' or 'manual'")]
    InvalidWorkMode(String),

    /// Client used before attaching to an engine
    #[error("CRSF client is not initialized: call init() first")]
    NotInitialized,

    /// Handle does not identify a live engine
    #[error("Invalid engine handle: {0}")]
    InvalidHandle(u64),

    /// Client attached to published telemetry tried to drive the link
    #[error("Client is attached to published telemetry and cannot control the link")]
    ReadOnlyAttachment,

    /// Shared telemetry location is missing
    #[error("Telemetry file {path} not found: make sure the crsf-link producer process is running")]
    Unavailable { path: String },

    /// Shared telemetry record has not been refreshed recently
    #[error("Telemetry record is stale ({age_ms} ms old): the producer may have stopped")]
    StalePublication { age_ms: i64 },

    /// Shared telemetry record was written by an incompatible producer
    #[error("Incompatible telemetry format version {found}, expected {expected}")]
    IncompatibleFormat { found: u32, expected: u32 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Record (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification for binding layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Serial I/O failure, recovered by reconnecting
    Transport,
    /// Malformed or CRC-failed frame, counted as loss
    Frame,
    /// Channel index or value out of range
    Range,
    /// Out-of-range value inside a bulk channel update
    Value,
    /// Wrong number of channels in a bulk update
    Count,
    /// API used before attach
    NotInitialized,
    /// Shared state missing, stale or unreadable
    Unavailable,
    /// Invalid configuration
    Config,
    /// Any other rejected caller input
    InvalidInput,
}

impl CrsfLinkError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Serial(_) | Self::SerialPortNotFound(_) | Self::NotConnected | Self::Io(_) => {
                ErrorKind::Transport
            }
            Self::CrsfProtocol(_) | Self::Frame(_) => ErrorKind::Frame,
            Self::ChannelOutOfRange { .. } | Self::ValueOutOfRange { .. } => ErrorKind::Range,
            Self::InvalidChannelValue { .. } => ErrorKind::Value,
            Self::ChannelCount { .. } => ErrorKind::Count,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::Unavailable { .. }
            | Self::StalePublication { .. }
            | Self::IncompatibleFormat { .. }
            | Self::Serialization(_) => ErrorKind::Unavailable,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidWorkMode(_) | Self::InvalidHandle(_) | Self::ReadOnlyAttachment => {
                ErrorKind::InvalidInput
            }
        }
    }
}

/// Result type alias for CRSF Link
pub type Result<T> = std::result::Result<T, CrsfLinkError>;
