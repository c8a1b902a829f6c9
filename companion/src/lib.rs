//! Network client for the companion eye tracker device.
//!
//! The companion device exposes a TCP control channel (newline-delimited
//! JSON request/response), one TCP subscription per sensor stream (scene
//! video, gaze), and a binary time-echo endpoint used for clock-offset
//! probing. This crate owns the transport and wire model; stream fusion
//! and scheduling live in the engine crate.

pub mod client;
pub mod data;
pub mod protocol;
pub mod stream;
pub mod time_echo;

pub use client::CompanionClient;
pub use data::{Calibration, EyeState, GazeDatum, SceneFrame};
pub use protocol::{DeviceStatus, SensorEndpoint};
pub use stream::{GazeStream, SceneStream};
pub use time_echo::{OffsetSample, TimeEchoClient};

/// Errors raised by companion device communication.
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// Low-level I/O error (socket read/write failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish a TCP connection to the device.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No response received within the timeout period.
    #[error("Timeout waiting for device response")]
    Timeout,

    /// The device closed the connection.
    #[error("Connection closed by device")]
    Closed,

    /// Response or stream item does not match the expected wire format.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The device answered a control request with an error.
    #[error("Device error: {0}")]
    Device(String),

    /// A sensor endpoint URL could not be parsed.
    #[error("Invalid sensor URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Result type for companion device operations.
pub type CompanionResult<T> = Result<T, CompanionError>;
