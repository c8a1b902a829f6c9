//! Control channel wire protocol.
//!
//! The control channel is newline-delimited JSON over TCP. Each request
//! carries an `action` tag; each response is an envelope with `ok: true`
//! and an action-specific payload, or `ok: false` with an error string.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::SceneFrame;
use crate::{CompanionError, CompanionResult};

/// Control requests accepted by the companion device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Calibration,
    RecordingStart,
    RecordingStopAndSave,
    Event {
        name: String,
        /// Event timestamp in device seconds; the device stamps receipt
        /// time when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
}

/// Response envelope for control requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Action-specific payload fields, if any
    #[serde(flatten)]
    pub payload: Value,
}

impl ControlResponse {
    /// Unwrap the envelope into its payload.
    pub fn into_payload(self) -> CompanionResult<Value> {
        if self.ok {
            Ok(self.payload)
        } else {
            Err(CompanionError::Device(
                self.error.unwrap_or_else(|| "unspecified error".to_string()),
            ))
        }
    }
}

/// A sensor endpoint advertised by device status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEndpoint {
    /// Endpoint URL, e.g. `tcp://192.168.1.40:8081`
    pub url: String,
}

impl SensorEndpoint {
    /// Resolve the URL into a `host:port` socket address string.
    ///
    /// # Errors
    /// Returns [`CompanionError::InvalidUrl`] when the URL does not parse
    /// or lacks a host or port.
    pub fn socket_addr(&self) -> CompanionResult<String> {
        let parsed = url::Url::parse(&self.url).map_err(|e| CompanionError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CompanionError::InvalidUrl {
                url: self.url.clone(),
                reason: "missing host".to_string(),
            })?;
        let port = parsed.port().ok_or_else(|| CompanionError::InvalidUrl {
            url: self.url.clone(),
            reason: "missing port".to_string(),
        })?;
        Ok(format!("{host}:{port}"))
    }
}

/// Device status: identity plus the sensor endpoints to subscribe to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub serial: String,
    pub scene: SensorEndpoint,
    pub gaze: SensorEndpoint,
    pub time_echo: SensorEndpoint,
}

/// Scene frame as transported on the wire (pixels base64-encoded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSceneFrame {
    #[serde(rename = "ts")]
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub data_b64: String,
}

impl WireSceneFrame {
    /// Decode the pixel payload into a [`SceneFrame`].
    ///
    /// # Errors
    /// Returns [`CompanionError::InvalidMessage`] when the payload is not
    /// valid base64 or decodes to other than `width * height` bytes.
    pub fn decode(self) -> CompanionResult<SceneFrame> {
        let pixels = base64::engine::general_purpose::STANDARD
            .decode(&self.data_b64)
            .map_err(|e| CompanionError::InvalidMessage(format!("frame payload: {e}")))?;

        let expected = self.width as usize * self.height as usize;
        if pixels.len() != expected {
            return Err(CompanionError::InvalidMessage(format!(
                "frame payload is {} bytes, expected {expected} for {}x{}",
                pixels.len(),
                self.width,
                self.height
            )));
        }

        Ok(SceneFrame {
            timestamp: self.timestamp,
            width: self.width,
            height: self.height,
            pixels,
        })
    }
}
