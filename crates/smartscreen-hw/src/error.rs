//! Error types for the smartscreen hardware library.

use std::time::Duration;

use thiserror::Error;

use crate::lcd::Rect;
use crate::profile::Revision;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a panel.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serial port communication error.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Serial I/O error.
    #[error("Serial I/O error: {0}")]
    SerialIo(#[from] std::io::Error),

    /// No response arrived within the read bound.
    #[error("Timed out after {0:?} waiting for response")]
    Timeout(Duration),

    /// Command parameters outside the allowed range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Rectangle does not fit the buffer or the panel.
    #[error("Rectangle {rect} out of bounds for {width}x{height}")]
    OutOfBounds { rect: Rect, width: u16, height: u16 },

    /// The revision has no opcode for this command.
    #[error("{command} is not supported by {revision}")]
    Unsupported {
        command: &'static str,
        revision: Revision,
    },

    /// Unknown hardware revision identifier.
    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    /// Invalid orientation value.
    #[error("Invalid orientation: {0}")]
    InvalidOrientation(String),

    /// Pixel buffer size mismatch.
    #[error("Pixel buffer size mismatch: expected {expected}, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// Session has not been connected yet.
    #[error("Session is not connected")]
    NotConnected,

    /// Another command is in flight on this session.
    #[error("Session is busy")]
    Busy,

    /// Session lost frame alignment and needs an explicit reset.
    #[error("Session is faulted, reset required")]
    SessionFaulted,

    /// Device kept rejecting the command after the retry budget.
    #[error("Device rejected command (code {code:#04x})")]
    DeviceRejected { code: u8 },

    /// Responses stayed malformed after resynchronization.
    #[error("Protocol desynchronized")]
    Desync,
}
