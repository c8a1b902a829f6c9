//! Background gaze-mapping and time-synchronization engine.
//!
//! The engine runs on its own thread, off the host's per-frame critical
//! path. It consumes the companion device's scene and gaze streams,
//! projects gaze through the active surface homography, estimates the
//! device/engine clock offset, and exchanges messages with the host over
//! a pair of FIFO channels: commands in, samples and offset updates out.
//!
//! Hosts interact only with [`EyeTrackerBridge`]: a constructor that
//! propagates startup failures, a non-blocking per-frame [`poll`]
//! drain, and command wrappers. Everything else here is engine-internal.
//!
//! [`poll`]: EyeTrackerBridge::poll

pub mod bridge;
pub mod clock;
pub mod command;
pub mod config;
pub mod detector;
pub mod mapper;
mod tasks;

pub use bridge::{
    ConnectError, EyeTrackerBridge, HostGazeRecord, HostPupilRecord, HostSample,
};
pub use clock::{ClockMapping, ClockOffsetEstimate, HostClock};
pub use command::{Command, MappedGazeSample, Output, PupilSample};
pub use config::EngineConfig;
pub use detector::{DetectedMarker, MarkerDetector};
pub use mapper::{GazeMapper, MappedGazeResult};
