//! Time-echo probe transport.
//!
//! The device's time-echo endpoint answers each 8-byte probe (big-endian
//! u64, client clock in nanoseconds) with 16 bytes: the echoed probe
//! followed by the device clock in big-endian u64 nanoseconds. One probe
//! round trip yields one offset sample; statistics over many samples are
//! the estimator's concern.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::protocol::SensorEndpoint;
use crate::{CompanionError, CompanionResult};

const NANOS_PER_SEC: f64 = 1e9;

/// One probe round trip: estimated device-minus-client clock offset and
/// the round-trip time, both in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetSample {
    pub offset: f64,
    pub round_trip: f64,
}

/// Client for the device time-echo endpoint.
pub struct TimeEchoClient {
    stream: TcpStream,
}

impl TimeEchoClient {
    pub async fn connect(endpoint: &SensorEndpoint) -> CompanionResult<Self> {
        let addr = endpoint.socket_addr()?;
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| CompanionError::ConnectionFailed(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Run one probe transaction against the device.
    ///
    /// `now` supplies the client clock in seconds; it is read immediately
    /// before the send and immediately after the receive, and the offset
    /// sample assumes symmetric transmission delay over that bracket.
    pub async fn probe(&mut self, now: impl Fn() -> f64) -> CompanionResult<OffsetSample> {
        let send_time = now();
        let probe = (send_time * NANOS_PER_SEC) as u64;
        self.stream.write_all(&probe.to_be_bytes()).await?;

        let mut echoed = [0u8; 8];
        let mut device = [0u8; 8];
        self.stream.read_exact(&mut echoed).await?;
        self.stream.read_exact(&mut device).await?;
        let receive_time = now();

        let echoed = u64::from_be_bytes(echoed);
        if echoed != probe {
            return Err(CompanionError::InvalidMessage(format!(
                "time echo mismatch: sent {probe}, got {echoed}"
            )));
        }

        let device_time = u64::from_be_bytes(device) as f64 / NANOS_PER_SEC;

        let midpoint = (send_time + receive_time) / 2.0;
        let sample = OffsetSample {
            offset: device_time - midpoint,
            round_trip: receive_time - send_time,
        };
        trace!(
            "time echo probe: offset {:.6}s rtt {:.6}s",
            sample.offset,
            sample.round_trip
        );
        Ok(sample)
    }
}
