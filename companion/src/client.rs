//! Control channel client for the companion device.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::data::Calibration;
use crate::protocol::{ControlRequest, ControlResponse, DeviceStatus};
use crate::{CompanionError, CompanionResult};

/// Default timeout for control transactions.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the companion device control channel.
///
/// One request/response transaction at a time over a single TCP
/// connection, newline-delimited JSON in both directions. All calls are
/// fallible; callers that must keep running catch errors individually.
pub struct CompanionClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl CompanionClient {
    /// Connect to the device control channel at `address:port`.
    ///
    /// # Errors
    /// Returns [`CompanionError::ConnectionFailed`] if the TCP connection
    /// cannot be established within the timeout.
    pub async fn connect(address: &str, port: u16) -> CompanionResult<Self> {
        let addr = format!("{address}:{port}");
        let stream = tokio::time::timeout(DEFAULT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| CompanionError::ConnectionFailed(format!("{addr}: connect timed out")))?
            .map_err(|e| CompanionError::ConnectionFailed(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        debug!("Connected to companion device at {addr}");

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set the timeout applied to each control transaction.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send one request and read the matching response line.
    async fn request(&mut self, request: &ControlRequest) -> CompanionResult<ControlResponse> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| CompanionError::InvalidMessage(e.to_string()))?;
        line.push('\n');

        debug!("control send: {}", line.trim());
        self.writer.write_all(line.as_bytes()).await?;

        let mut response = String::new();
        let n = tokio::time::timeout(self.timeout, self.reader.read_line(&mut response))
            .await
            .map_err(|_| CompanionError::Timeout)??;
        if n == 0 {
            return Err(CompanionError::Closed);
        }

        serde_json::from_str(&response)
            .map_err(|e| CompanionError::InvalidMessage(format!("{e}: {}", response.trim())))
    }

    /// Query device status: serial and sensor endpoint URLs.
    pub async fn get_status(&mut self) -> CompanionResult<DeviceStatus> {
        let payload = self.request(&ControlRequest::Status).await?.into_payload()?;
        serde_json::from_value(payload)
            .map_err(|e| CompanionError::InvalidMessage(format!("status payload: {e}")))
    }

    /// Query the scene camera calibration.
    pub async fn get_calibration(&mut self) -> CompanionResult<Calibration> {
        let payload = self
            .request(&ControlRequest::Calibration)
            .await?
            .into_payload()?;
        serde_json::from_value(payload)
            .map_err(|e| CompanionError::InvalidMessage(format!("calibration payload: {e}")))
    }

    /// Start a raw recording on the device.
    pub async fn recording_start(&mut self) -> CompanionResult<()> {
        self.request(&ControlRequest::RecordingStart)
            .await?
            .into_payload()
            .map(|_| ())
    }

    /// Stop the active recording and ask the device to save it.
    pub async fn recording_stop_and_save(&mut self) -> CompanionResult<()> {
        self.request(&ControlRequest::RecordingStopAndSave)
            .await?
            .into_payload()
            .map(|_| ())
    }

    /// Forward a named event marker, timestamped in device seconds.
    pub async fn send_event(
        &mut self,
        name: &str,
        timestamp: Option<f64>,
    ) -> CompanionResult<()> {
        self.request(&ControlRequest::Event {
            name: name.to_string(),
            timestamp,
        })
        .await?
        .into_payload()
        .map(|_| ())
    }

    /// Close the control connection.
    pub async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}
