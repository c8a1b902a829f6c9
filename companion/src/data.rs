//! Data model for sensor items delivered by the companion device.

use serde::{Deserialize, Serialize};
use surface::Point;

/// Per-eye optical measurements attached to a gaze datum when the device
/// provides them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeState {
    /// Pupil diameter in millimetres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pupil_diameter_mm: Option<f64>,
    /// Per-eye gaze point in scene-camera pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze: Option<Point>,
}

/// A single gaze measurement in device coordinates and device time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeDatum {
    /// Device-native monotonic timestamp in seconds
    #[serde(rename = "ts")]
    pub timestamp: f64,
    /// Combined gaze point in scene-camera pixels
    pub x: f64,
    pub y: f64,
    /// Whether the headset is being worn, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worn: Option<bool>,
    /// Detection confidence in [0, 1], if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<EyeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<EyeState>,
}

impl GazeDatum {
    /// Combined gaze point.
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// True when the datum carries any per-eye pupil measurement.
    pub fn has_pupil_data(&self) -> bool {
        let has = |eye: &Option<EyeState>| {
            eye.as_ref()
                .is_some_and(|e| e.pupil_diameter_mm.is_some())
        };
        has(&self.left) || has(&self.right)
    }
}

/// One scene-camera frame, decoded from the wire. Consumed to refresh
/// surface geometry and dropped; never buffered beyond the one in flight.
#[derive(Debug, Clone)]
pub struct SceneFrame {
    /// Device-native monotonic timestamp in seconds
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Grayscale pixels, row-major, `width * height` bytes
    pub pixels: Vec<u8>,
}

/// Scene camera calibration reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// 3x3 intrinsic camera matrix, row-major
    pub scene_camera_matrix: [[f64; 3]; 3],
    /// Lens distortion coefficients
    #[serde(default)]
    pub distortion_coefficients: Vec<f64>,
}

impl Calibration {
    /// An identity calibration for devices that report none.
    pub fn identity() -> Self {
        Self {
            serial: None,
            scene_camera_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            distortion_coefficients: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaze_datum_roundtrip() {
        let datum = GazeDatum {
            timestamp: 1234.5678,
            x: 960.0,
            y: 540.0,
            worn: Some(true),
            confidence: Some(0.97),
            left: Some(EyeState {
                pupil_diameter_mm: Some(3.2),
                gaze: Some(Point::new(958.0, 541.0)),
            }),
            right: None,
        };
        let json = serde_json::to_string(&datum).unwrap();
        let parsed: GazeDatum = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, datum);
    }

    #[test]
    fn test_gaze_datum_minimal_fields() {
        let parsed: GazeDatum =
            serde_json::from_str(r#"{"ts": 10.0, "x": 1.0, "y": 2.0}"#).unwrap();
        assert_eq!(parsed.timestamp, 10.0);
        assert!(parsed.confidence.is_none());
        assert!(!parsed.has_pupil_data());
    }

    #[test]
    fn test_has_pupil_data() {
        let mut datum: GazeDatum =
            serde_json::from_str(r#"{"ts": 10.0, "x": 1.0, "y": 2.0}"#).unwrap();
        datum.right = Some(EyeState {
            pupil_diameter_mm: Some(2.9),
            gaze: None,
        });
        assert!(datum.has_pupil_data());
    }
}
