//! Fiducial marker detection seam.
//!
//! Marker detection is an opaque service to the engine: implementations
//! wrap whatever detector library (or test fixture) localizes the
//! fiducial tags in a scene frame. The engine only consumes ids and
//! corner positions.

use companion::SceneFrame;
use surface::Quad;

/// A fiducial marker localized in a scene frame.
#[derive(Debug, Clone)]
pub struct DetectedMarker {
    /// Marker id encoded in the tag pattern
    pub id: u32,
    /// Corner positions in scene-camera pixels, in the same order as the
    /// corresponding surface polygon corners
    pub corners: Quad,
}

/// Detector service localizing fiducial markers in scene frames.
pub trait MarkerDetector: Send {
    /// Detect all markers visible in `frame`.
    fn detect(&mut self, frame: &SceneFrame) -> Vec<DetectedMarker>;
}
