//! Messages crossing the host/engine boundary.
//!
//! Both directions are closed sum types, exhaustively handled: commands
//! flow host -> engine, outputs flow engine -> host. The channels carrying
//! them are the only shared resources between the two sides.

use companion::EyeState;
use surface::{FrameSize, MarkerKey, Point, SurfaceHandle};

use crate::clock::ClockOffsetEstimate;

/// Commands the host enqueues for the engine.
#[derive(Debug, Clone)]
pub enum Command {
    /// Terminate all engine loops and close the device connection.
    Stop,
    /// Replace the active surface definition wholesale.
    UpdateSurface {
        /// Marker id (integer or decimal string) to polygon corners, in
        /// reference-frame pixels
        markers: Vec<(MarkerKey, Vec<Point>)>,
        frame_size: FrameSize,
    },
    /// Start (`true`) or stop-and-save (`false`) the device recording.
    SetRecording(bool),
    /// Forward a named event marker to the device. A `None` timestamp
    /// means "now", converted to device time by the engine.
    SendEvent {
        name: String,
        timestamp: Option<f64>,
    },
}

/// A gaze sample successfully mapped onto the active surface.
#[derive(Debug, Clone)]
pub struct MappedGazeSample {
    /// Device-native timestamp in seconds
    pub device_timestamp: f64,
    /// Surface registration the mapping used
    pub surface: SurfaceHandle,
    /// Gaze in surface-normalized [0,1] x [0,1] coordinates
    pub point: Point,
    /// Raw gaze in scene-camera pixels
    pub raw: Point,
    pub left: Option<EyeState>,
    pub right: Option<EyeState>,
}

/// A pupillometry-only sample, emitted when surface mapping is bypassed.
#[derive(Debug, Clone)]
pub struct PupilSample {
    /// Device-native timestamp in seconds
    pub device_timestamp: f64,
    pub left: Option<EyeState>,
    pub right: Option<EyeState>,
}

/// Items the engine enqueues for the host's per-tick poller.
#[derive(Debug, Clone)]
pub enum Output {
    /// A fresh clock-offset estimate; replaces any previous one.
    TimeOffset(ClockOffsetEstimate),
    MappedGaze(MappedGazeSample),
    Pupil(PupilSample),
}
