//! Sensor stream subscriptions.
//!
//! Each sensor (scene video, gaze) is one TCP subscription delivering an
//! unbounded sequence of newline-delimited JSON items. `next()` yields
//! exactly one item or suspends until one arrives; dropping the stream
//! closes the connection and unsubscribes. Reconnecting is a caller
//! concern.

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::net::TcpStream;
use tracing::debug;

use crate::data::{GazeDatum, SceneFrame};
use crate::protocol::{SensorEndpoint, WireSceneFrame};
use crate::{CompanionError, CompanionResult};

async fn subscribe(endpoint: &SensorEndpoint) -> CompanionResult<Lines<BufReader<TcpStream>>> {
    let addr = endpoint.socket_addr()?;
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| CompanionError::ConnectionFailed(format!("{addr}: {e}")))?;
    debug!("Subscribed to sensor stream at {addr}");
    Ok(BufReader::new(stream).lines())
}

/// Read one JSON item off a subscription.
async fn next_item<T: serde::de::DeserializeOwned>(
    lines: &mut Lines<BufReader<TcpStream>>,
) -> CompanionResult<T> {
    let line = lines.next_line().await?.ok_or(CompanionError::Closed)?;
    serde_json::from_str(&line)
        .map_err(|e| CompanionError::InvalidMessage(format!("{e}: {}", line.trim())))
}

/// Subscription to the gaze sensor stream.
pub struct GazeStream {
    lines: Lines<BufReader<TcpStream>>,
}

impl GazeStream {
    pub async fn subscribe(endpoint: &SensorEndpoint) -> CompanionResult<Self> {
        Ok(Self {
            lines: subscribe(endpoint).await?,
        })
    }

    /// Wait for the next gaze datum.
    pub async fn next(&mut self) -> CompanionResult<GazeDatum> {
        next_item(&mut self.lines).await
    }
}

/// Subscription to the scene video stream.
pub struct SceneStream {
    lines: Lines<BufReader<TcpStream>>,
}

impl SceneStream {
    pub async fn subscribe(endpoint: &SensorEndpoint) -> CompanionResult<Self> {
        Ok(Self {
            lines: subscribe(endpoint).await?,
        })
    }

    /// Wait for the next scene frame and decode its pixel payload.
    pub async fn next(&mut self) -> CompanionResult<SceneFrame> {
        let wire: WireSceneFrame = next_item(&mut self.lines).await?;
        wire.decode()
    }
}
