//! Host-facing bridge to the background engine.
//!
//! `EyeTrackerBridge::connect` spawns the engine thread and propagates
//! startup failure; afterwards the host's per-frame loop calls
//! [`EyeTrackerBridge::poll`] once per tick to drain whatever the engine
//! produced since the last call. Nothing here ever blocks on the engine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use companion::{CompanionError, EyeState};
use crossbeam_channel::{Receiver, Sender};
use surface::{FrameSize, MarkerKey, Point, SurfaceHandle};
use tracing::debug;

use crate::clock::{ClockMapping, ClockOffsetEstimate, HostClock};
use crate::command::{Command, MappedGazeSample, Output, PupilSample};
use crate::config::EngineConfig;
use crate::detector::MarkerDetector;
use crate::tasks;

/// Ring buffer capacity for host-side sample records; oldest entries are
/// dropped when the host polls less often than samples arrive.
const EVENT_BUFFER_CAPACITY: usize = 4096;

/// Errors surfaced by [`EyeTrackerBridge::connect`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The device was unreachable or rejected a startup request.
    #[error("Device connection failed: {0}")]
    Device(#[from] CompanionError),

    /// The engine thread or its runtime could not be started.
    #[error("Engine startup failed: {0}")]
    Runtime(String),

    /// The engine thread died before reporting a startup outcome.
    #[error("Engine terminated during startup")]
    EngineExited,
}

/// A mapped gaze sample rebased into host time and window coordinates.
#[derive(Debug, Clone)]
pub struct HostGazeRecord {
    /// Device-native timestamp in seconds
    pub device_time: f64,
    /// Device timestamp converted through the composed clock mapping
    pub host_time: f64,
    /// Host clock reading when the sample was drained
    pub logged_time: f64,
    /// `logged_time - host_time`
    pub delay: f64,
    pub surface: SurfaceHandle,
    /// Gaze in surface-normalized [0,1] x [0,1] coordinates
    pub normalized: Point,
    /// Gaze scaled to the registered window size, in pixels
    pub window_px: Point,
    /// Raw gaze in scene-camera pixels
    pub raw: Point,
    pub left: Option<EyeState>,
    pub right: Option<EyeState>,
}

/// A pupillometry-only sample rebased into host time.
#[derive(Debug, Clone)]
pub struct HostPupilRecord {
    pub device_time: f64,
    pub host_time: f64,
    pub logged_time: f64,
    pub left: Option<EyeState>,
    pub right: Option<EyeState>,
}

/// Sample records delivered to the host, one variant per sample kind.
#[derive(Debug, Clone)]
pub enum HostSample {
    Gaze(HostGazeRecord),
    Pupil(HostPupilRecord),
}

/// Owned handle to a running gaze-mapping engine.
///
/// One handle per engine; whoever wires up the session decides how many
/// sessions exist. Dropping the handle stops the engine.
pub struct EyeTrackerBridge {
    commands: Sender<Command>,
    outputs: Receiver<Output>,
    clock: HostClock,
    mapping: ClockMapping,
    estimate: Option<ClockOffsetEstimate>,
    window_size: Option<(f64, f64)>,
    latest: Option<HostSample>,
    latest_gaze_position: Option<Point>,
    events: VecDeque<HostSample>,
    recording: bool,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EyeTrackerBridge {
    /// Spawn the background engine and wait for it to finish startup.
    ///
    /// # Errors
    /// Startup failures (device unreachable, status/calibration refused,
    /// sensor streams unopenable) are returned here and the engine does
    /// not start. A failed clock-offset estimation is not a startup
    /// failure.
    pub fn connect(
        config: EngineConfig,
        detector: Box<dyn MarkerDetector>,
    ) -> Result<Self, ConnectError> {
        let clock = HostClock::new();
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (output_tx, output_rx) = crossbeam_channel::unbounded();
        let (startup_tx, startup_rx) = crossbeam_channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));

        let engine_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("fovea-engine".to_string())
            .spawn(move || {
                tasks::run(
                    config,
                    detector,
                    clock,
                    command_rx,
                    output_tx,
                    startup_tx,
                    engine_running,
                )
            })
            .map_err(|e| ConnectError::Runtime(e.to_string()))?;

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands: command_tx,
                outputs: output_rx,
                clock,
                mapping: ClockMapping::default(),
                estimate: None,
                window_size: None,
                latest: None,
                latest_gaze_position: None,
                events: VecDeque::with_capacity(1024),
                recording: false,
                running,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(ConnectError::EngineExited)
            }
        }
    }

    /// Drain everything the engine produced since the last call.
    ///
    /// Non-blocking: returns immediately, with the number of queue items
    /// consumed. Call once per host frame tick.
    pub fn poll(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(output) = self.outputs.try_recv() {
            drained += 1;
            match output {
                Output::TimeOffset(estimate) => {
                    debug!(
                        "time offset update: {:.6}s +/- {:.6}s",
                        estimate.mean, estimate.std_dev
                    );
                    self.mapping.apply_estimate(&estimate);
                    self.estimate = Some(estimate);
                }
                Output::MappedGaze(sample) => {
                    let record = self.build_gaze_record(sample);
                    self.latest_gaze_position = Some(record.window_px);
                    self.push_sample(HostSample::Gaze(record));
                }
                Output::Pupil(sample) => {
                    let record = self.build_pupil_record(sample);
                    self.push_sample(HostSample::Pupil(record));
                }
            }
        }
        drained
    }

    fn build_gaze_record(&self, sample: MappedGazeSample) -> HostGazeRecord {
        let host_time = self.mapping.device_to_host(sample.device_timestamp);
        let logged_time = self.clock.now();
        let (w, h) = self.window_size.unwrap_or((1.0, 1.0));
        HostGazeRecord {
            device_time: sample.device_timestamp,
            host_time,
            logged_time,
            delay: logged_time - host_time,
            surface: sample.surface,
            normalized: sample.point,
            window_px: Point::new(sample.point.x * w, sample.point.y * h),
            raw: sample.raw,
            left: sample.left,
            right: sample.right,
        }
    }

    fn build_pupil_record(&self, sample: PupilSample) -> HostPupilRecord {
        let host_time = self.mapping.device_to_host(sample.device_timestamp);
        let logged_time = self.clock.now();
        HostPupilRecord {
            device_time: sample.device_timestamp,
            host_time,
            logged_time,
            left: sample.left,
            right: sample.right,
        }
    }

    fn push_sample(&mut self, sample: HostSample) {
        if self.events.len() >= EVENT_BUFFER_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(sample.clone());
        self.latest = Some(sample);
    }

    fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Register the on-screen surface: marker polygons in window pixels
    /// relative to `window_size`, which is also used to scale mapped
    /// samples back into window coordinates.
    ///
    /// Returns false if the engine is no longer accepting commands.
    pub fn register_surface(
        &mut self,
        markers: Vec<(MarkerKey, Vec<Point>)>,
        window_size: (f64, f64),
    ) -> bool {
        self.window_size = Some(window_size);
        self.send(Command::UpdateSurface {
            markers,
            frame_size: FrameSize::new(window_size.0 as u32, window_size.1 as u32),
        })
    }

    /// Start or stop the device recording. Stopping also clears the
    /// last-sample state, matching the "no samples while not recording"
    /// host contract.
    pub fn set_recording(&mut self, should_record: bool) -> bool {
        self.recording = should_record;
        if !should_record {
            self.latest = None;
            self.latest_gaze_position = None;
        }
        self.send(Command::SetRecording(should_record))
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Forward a named event marker to the device. `timestamp` is in
    /// device seconds; `None` lets the engine stamp "now".
    pub fn send_event(&self, name: &str, timestamp: Option<f64>) -> bool {
        self.send(Command::SendEvent {
            name: name.to_string(),
            timestamp,
        })
    }

    /// Latest sample record, if any has arrived since recording started.
    pub fn last_sample(&self) -> Option<&HostSample> {
        self.latest.as_ref()
    }

    /// Latest mapped gaze position in window pixels.
    pub fn last_gaze_position(&self) -> Option<Point> {
        self.latest_gaze_position
    }

    /// Take all buffered sample records.
    pub fn drain_samples(&mut self) -> Vec<HostSample> {
        self.events.drain(..).collect()
    }

    /// Most recent clock-offset estimate delivered by the engine.
    pub fn clock_offset(&self) -> Option<&ClockOffsetEstimate> {
        self.estimate.as_ref()
    }

    /// Configure the engine/host clock offset leg. Zero (the default) is
    /// correct when the engine thread shares the host clock.
    pub fn set_engine_host_offset(&mut self, offset: f64) {
        self.mapping.engine_host = offset;
    }

    /// Current host time expressed on the device clock.
    pub fn tracker_time(&self) -> f64 {
        self.mapping.host_to_device(self.clock.now())
    }

    /// The host clock used for sample timestamps.
    pub fn host_clock(&self) -> HostClock {
        self.clock
    }

    /// True while the engine thread is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the engine and join its thread. Idempotent; queued output
    /// can still be drained with [`poll`](Self::poll) afterwards.
    pub fn stop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        let _ = self.send(Command::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EyeTrackerBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
