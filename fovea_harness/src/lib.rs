//! Test harness for the gaze-mapping engine.
//!
//! Provides an in-process mock companion device (control channel, sensor
//! streams, time echo) and a scripted marker detector, so the full engine
//! can be driven end-to-end without hardware.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use base64::Engine as _;
use companion::GazeDatum;
use fovea::{DetectedMarker, MarkerDetector};
use serde_json::{json, Value};
use surface::{MarkerKey, Point, Quad};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::debug;

/// An event marker received by the mock device.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    pub name: String,
    pub timestamp: Option<f64>,
}

/// Mock device configuration.
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// Serial reported in status responses
    pub serial: String,
    /// Offset of the mock device clock relative to the mock's own
    /// monotonic epoch, in seconds
    pub clock_offset: f64,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            serial: "MOCK-0001".to_string(),
            clock_offset: 0.0,
        }
    }
}

struct MockState {
    serial: String,
    scene_url: String,
    gaze_url: String,
    echo_url: String,
    recording: AtomicBool,
    events: Mutex<Vec<ReceivedEvent>>,
    control_down: AtomicBool,
}

impl MockState {
    fn respond(&self, line: &str) -> Value {
        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return json!({"ok": false, "error": format!("bad request: {e}")}),
        };
        match request["action"].as_str() {
            Some("status") => json!({
                "ok": true,
                "serial": self.serial,
                "scene": {"url": self.scene_url},
                "gaze": {"url": self.gaze_url},
                "time_echo": {"url": self.echo_url},
            }),
            Some("calibration") => json!({
                "ok": true,
                "serial": self.serial,
                "scene_camera_matrix": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                "distortion_coefficients": [],
            }),
            Some("recording_start") => {
                self.recording.store(true, Ordering::SeqCst);
                json!({"ok": true})
            }
            Some("recording_stop_and_save") => {
                self.recording.store(false, Ordering::SeqCst);
                json!({"ok": true})
            }
            Some("event") => {
                let event = ReceivedEvent {
                    name: request["name"].as_str().unwrap_or_default().to_string(),
                    timestamp: request["timestamp"].as_f64(),
                };
                self.events.lock().unwrap().push(event);
                json!({"ok": true})
            }
            other => json!({"ok": false, "error": format!("unknown action: {other:?}")}),
        }
    }
}

/// An in-process companion device: TCP servers for the control channel,
/// both sensor streams, and the time-echo endpoint.
///
/// Dropping the mock shuts every server down.
pub struct MockCompanion {
    // Owns the server tasks; dropped last
    _runtime: tokio::runtime::Runtime,
    state: Arc<MockState>,
    scene_tx: broadcast::Sender<String>,
    gaze_tx: broadcast::Sender<String>,
    control_addr: SocketAddr,
    epoch: Instant,
    clock_offset: f64,
}

impl MockCompanion {
    /// Bind all four endpoints on ephemeral loopback ports and start
    /// serving.
    pub fn spawn(config: MockDeviceConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let epoch = Instant::now();

        let (scene_tx, _) = broadcast::channel::<String>(256);
        let (gaze_tx, _) = broadcast::channel::<String>(256);

        let (control, scene, gaze, echo) = runtime.block_on(async {
            std::io::Result::Ok((
                TcpListener::bind("127.0.0.1:0").await?,
                TcpListener::bind("127.0.0.1:0").await?,
                TcpListener::bind("127.0.0.1:0").await?,
                TcpListener::bind("127.0.0.1:0").await?,
            ))
        })?;

        let control_addr = control.local_addr()?;
        let state = Arc::new(MockState {
            serial: config.serial,
            scene_url: format!("tcp://{}", scene.local_addr()?),
            gaze_url: format!("tcp://{}", gaze.local_addr()?),
            echo_url: format!("tcp://{}", echo.local_addr()?),
            recording: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
            control_down: AtomicBool::new(false),
        });

        runtime.spawn(control_server(control, Arc::clone(&state)));
        runtime.spawn(stream_server(scene, scene_tx.clone()));
        runtime.spawn(stream_server(gaze, gaze_tx.clone()));
        runtime.spawn(echo_server(echo, epoch, config.clock_offset));

        Ok(Self {
            _runtime: runtime,
            state,
            scene_tx,
            gaze_tx,
            control_addr,
            epoch,
            clock_offset: config.clock_offset,
        })
    }

    pub fn address(&self) -> String {
        self.control_addr.ip().to_string()
    }

    pub fn control_port(&self) -> u16 {
        self.control_addr.port()
    }

    /// Current mock device clock reading in seconds.
    pub fn device_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() + self.clock_offset
    }

    /// Publish a gaze datum to every gaze subscriber.
    pub fn publish_gaze(&self, datum: &GazeDatum) {
        if let Ok(line) = serde_json::to_string(datum) {
            let _ = self.gaze_tx.send(line);
        }
    }

    /// Publish a blank scene frame (the scripted detector ignores pixel
    /// content) to every scene subscriber.
    pub fn publish_frame(&self, timestamp: f64, width: u32, height: u32) {
        let pixels = vec![0u8; width as usize * height as usize];
        let line = json!({
            "ts": timestamp,
            "width": width,
            "height": height,
            "data_b64": base64::engine::general_purpose::STANDARD.encode(pixels),
        })
        .to_string();
        let _ = self.scene_tx.send(line);
    }

    /// Whether the mock believes a recording is active.
    pub fn recording_active(&self) -> bool {
        self.state.recording.load(Ordering::SeqCst)
    }

    /// Event markers received so far, in arrival order.
    pub fn received_events(&self) -> Vec<ReceivedEvent> {
        self.state.events.lock().unwrap().clone()
    }

    /// Simulate losing the control channel: existing connections are
    /// dropped at the next request and new ones are refused.
    pub fn set_control_down(&self, down: bool) {
        self.state.control_down.store(down, Ordering::SeqCst);
    }
}

async fn control_server(listener: TcpListener, state: Arc<MockState>) {
    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            return;
        };
        if state.control_down.load(Ordering::SeqCst) {
            continue;
        }
        debug!("mock control connection from {addr}");
        tokio::spawn(control_connection(stream, Arc::clone(&state)));
    }
}

async fn control_connection(stream: TcpStream, state: Arc<MockState>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if state.control_down.load(Ordering::SeqCst) {
            break;
        }
        let mut response = state.respond(&line).to_string();
        response.push('\n');
        if write_half.write_all(response.as_bytes()).await.is_err() {
            break;
        }
    }
}

async fn stream_server(listener: TcpListener, tx: broadcast::Sender<String>) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(stream_connection(stream, tx.subscribe()));
    }
}

async fn stream_connection(mut stream: TcpStream, mut rx: broadcast::Receiver<String>) {
    loop {
        match rx.recv().await {
            Ok(mut line) => {
                line.push('\n');
                if stream.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn echo_server(listener: TcpListener, epoch: Instant, clock_offset: f64) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let mut probe = [0u8; 8];
            while stream.read_exact(&mut probe).await.is_ok() {
                let device_time = epoch.elapsed().as_secs_f64() + clock_offset;
                let device_nanos = (device_time * 1e9) as u64;
                let mut reply = [0u8; 16];
                reply[..8].copy_from_slice(&probe);
                reply[8..].copy_from_slice(&device_nanos.to_be_bytes());
                if stream.write_all(&reply).await.is_err() {
                    break;
                }
            }
        });
    }
}

/// Detector fixture reporting a fixed marker layout for every frame.
pub struct ScriptedDetector {
    markers: Vec<DetectedMarker>,
}

impl ScriptedDetector {
    pub fn new(markers: Vec<DetectedMarker>) -> Self {
        Self { markers }
    }
}

impl MarkerDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &companion::SceneFrame) -> Vec<DetectedMarker> {
        self.markers.clone()
    }
}

/// Corner-marker layout for a screen of the given size: four tags of
/// `tag_size` pixels in the screen corners. Returns the registration
/// polygons (as decimal-string keys, exercising canonicalization) and the
/// matching detections with the scene camera seeing the screen 1:1.
pub fn corner_marker_layout(
    width: f64,
    height: f64,
    tag_size: f64,
) -> (Vec<(MarkerKey, Vec<Point>)>, Vec<DetectedMarker>) {
    let quad = |x: f64, y: f64| -> Quad {
        [
            Point::new(x, y),
            Point::new(x + tag_size, y),
            Point::new(x + tag_size, y + tag_size),
            Point::new(x, y + tag_size),
        ]
    };
    let origins = [
        (0u32, 0.0, 0.0),
        (1, width - tag_size, 0.0),
        (2, width - tag_size, height - tag_size),
        (3, 0.0, height - tag_size),
    ];

    let mut registration = Vec::new();
    let mut detections = Vec::new();
    for (id, x, y) in origins {
        let corners = quad(x, y);
        registration.push((MarkerKey::Name(id.to_string()), corners.to_vec()));
        detections.push(DetectedMarker { id, corners });
    }
    (registration, detections)
}
