//! Gaze/scene fuser.
//!
//! Consumes scene frames to refresh the active surface's device-space
//! homography, and gaze data to project raw gaze into surface-normalized
//! coordinates. The two inputs interleave as they arrive: a gaze datum
//! processed before a newer scene frame simply uses the previous
//! homography.

use companion::{Calibration, GazeDatum, SceneFrame};
use surface::{
    estimate_homography, Point, SurfaceDefinition, SurfaceHandle, SurfaceRegistry,
};
use tracing::{debug, warn};

use crate::detector::MarkerDetector;

/// Projection result for one gaze datum: zero or more points per tracked
/// surface, in detection order, unaveraged.
#[derive(Debug, Clone)]
pub struct MappedGazeResult {
    pub surface: SurfaceHandle,
    /// Points inside the surface, in [0,1] x [0,1]
    pub points: Vec<Point>,
}

/// Fuses marker detections and gaze data through the active surface.
pub struct GazeMapper {
    calibration: Calibration,
    detector: Box<dyn MarkerDetector>,
    registry: SurfaceRegistry,
}

impl GazeMapper {
    pub fn new(calibration: Calibration, detector: Box<dyn MarkerDetector>) -> Self {
        Self {
            calibration,
            detector,
            registry: SurfaceRegistry::new(),
        }
    }

    /// Scene camera calibration the mapper was built with.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Detect markers in a scene frame and refresh the surface
    /// homography when every configured marker was found.
    ///
    /// Side effect only; emits nothing.
    pub fn process_scene(&mut self, frame: &SceneFrame) {
        let detections = self.detector.detect(frame);

        let Some(active) = self.registry.active_mut() else {
            return;
        };

        let mut correspondences = Vec::new();
        for id in active.definition.marker_ids().collect::<Vec<_>>() {
            let Some(detected) = detections.iter().find(|d| d.id == id) else {
                // Partial marker visibility keeps the previous homography
                debug!("marker {id} not detected, keeping current geometry");
                return;
            };
            let Some(normalized) = active.definition.normalized_polygon(id) else {
                continue;
            };
            correspondences
                .extend(detected.corners.iter().copied().zip(normalized.iter().copied()));
        }

        match estimate_homography(&correspondences) {
            Ok(h) => {
                debug!(
                    "surface homography refreshed from {} markers (rms {:.2e})",
                    active.definition.marker_count(),
                    h.rms_error
                );
                active.homography = Some(h);
            }
            Err(e) => warn!("homography solve failed: {e}"),
        }
    }

    /// Project a gaze datum through the current surface homography.
    ///
    /// Returns `None` when no surface is registered or no valid
    /// homography has been produced yet. Points outside the surface are
    /// filtered; multiple in-bounds points (e.g. per-eye gaze) are all
    /// returned, unaveraged.
    pub fn process_gaze(&self, datum: &GazeDatum) -> Option<MappedGazeResult> {
        let active = self.registry.active()?;
        let homography = active.homography.as_ref()?;

        let mut candidates = vec![datum.point()];
        for eye in [&datum.left, &datum.right].into_iter().flatten() {
            if let Some(gaze) = eye.gaze {
                candidates.push(gaze);
            }
        }

        let points = candidates
            .into_iter()
            .filter_map(|p| homography.project(p))
            .filter(|p| (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y))
            .collect();

        Some(MappedGazeResult {
            surface: active.handle,
            points,
        })
    }

    /// Replace any prior surface registration with a fresh one.
    ///
    /// The swap is all-or-nothing: gaze processed mid-update sees either
    /// the old registration or the new one, never a mix.
    pub fn add_surface(&mut self, definition: SurfaceDefinition) -> SurfaceHandle {
        self.registry.replace(definition)
    }

    /// Drop all surface state; `process_gaze` returns `None` until a new
    /// surface is added.
    pub fn clear_surfaces(&mut self) {
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectedMarker;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;
    use surface::{FrameSize, Quad};

    /// Detector fixture reporting a fixed marker layout for every frame.
    struct FixedDetector {
        markers: Vec<DetectedMarker>,
    }

    impl MarkerDetector for FixedDetector {
        fn detect(&mut self, _frame: &SceneFrame) -> Vec<DetectedMarker> {
            self.markers.clone()
        }
    }

    fn quad(x: f64, y: f64, side: f64) -> Quad {
        [
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ]
    }

    fn frame() -> SceneFrame {
        SceneFrame {
            timestamp: 1.0,
            width: 4,
            height: 4,
            pixels: vec![0; 16],
        }
    }

    fn gaze_at(x: f64, y: f64) -> GazeDatum {
        GazeDatum {
            timestamp: 2.0,
            x,
            y,
            worn: None,
            confidence: None,
            left: None,
            right: None,
        }
    }

    /// Corner markers of a 1920x1080 reference frame, with the scene
    /// camera seeing the screen exactly at reference coordinates.
    fn screen_mapper() -> (GazeMapper, SurfaceHandle) {
        let corners = [
            (0, 0.0, 0.0),
            (1, 1856.0, 0.0),
            (2, 1856.0, 1016.0),
            (3, 0.0, 1016.0),
        ];
        let mut markers = BTreeMap::new();
        let mut detected = Vec::new();
        for (id, x, y) in corners {
            markers.insert(id, quad(x, y, 64.0));
            detected.push(DetectedMarker {
                id,
                corners: quad(x, y, 64.0),
            });
        }

        let definition =
            SurfaceDefinition::new(markers, FrameSize::new(1920, 1080)).unwrap();
        let mut mapper = GazeMapper::new(
            Calibration::identity(),
            Box::new(FixedDetector { markers: detected }),
        );
        let handle = mapper.add_surface(definition);
        (mapper, handle)
    }

    #[test]
    fn test_gaze_before_any_scene_frame_is_unmapped() {
        let (mapper, _) = screen_mapper();
        assert!(mapper.process_gaze(&gaze_at(960.0, 540.0)).is_none());
    }

    #[test]
    fn test_center_gaze_maps_to_half_half() {
        let (mut mapper, handle) = screen_mapper();
        mapper.process_scene(&frame());

        let result = mapper.process_gaze(&gaze_at(960.0, 540.0)).unwrap();
        assert_eq!(result.surface, handle);
        assert_eq!(result.points.len(), 1);
        assert_relative_eq!(result.points[0].x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(result.points[0].y, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_off_surface_gaze_yields_no_points() {
        let (mut mapper, _) = screen_mapper();
        mapper.process_scene(&frame());

        let result = mapper.process_gaze(&gaze_at(5000.0, 540.0)).unwrap();
        assert!(result.points.is_empty());
    }

    #[test]
    fn test_clear_surfaces_resets_mapping() {
        let (mut mapper, _) = screen_mapper();
        mapper.process_scene(&frame());
        assert!(mapper.process_gaze(&gaze_at(960.0, 540.0)).is_some());

        mapper.clear_surfaces();
        assert!(mapper.process_gaze(&gaze_at(960.0, 540.0)).is_none());
        // Idempotent
        mapper.clear_surfaces();
        assert!(mapper.process_gaze(&gaze_at(960.0, 540.0)).is_none());
    }

    #[test]
    fn test_partial_detection_keeps_previous_homography() {
        let (mut mapper, _) = screen_mapper();
        mapper.process_scene(&frame());
        let before = mapper.process_gaze(&gaze_at(960.0, 540.0)).unwrap();

        // Replace the detector's view with a single marker; the refresh
        // must be skipped and the old mapping kept
        mapper.detector = Box::new(FixedDetector {
            markers: vec![DetectedMarker {
                id: 0,
                corners: quad(500.0, 500.0, 64.0),
            }],
        });
        mapper.process_scene(&frame());
        let after = mapper.process_gaze(&gaze_at(960.0, 540.0)).unwrap();
        assert_relative_eq!(after.points[0].x, before.points[0].x, epsilon = 1e-12);
        assert_relative_eq!(after.points[0].y, before.points[0].y, epsilon = 1e-12);
    }

    #[test]
    fn test_per_eye_points_returned_in_order() {
        let (mut mapper, _) = screen_mapper();
        mapper.process_scene(&frame());

        let mut datum = gaze_at(960.0, 540.0);
        datum.left = Some(companion::EyeState {
            pupil_diameter_mm: Some(3.1),
            gaze: Some(Point::new(480.0, 540.0)),
        });
        datum.right = Some(companion::EyeState {
            pupil_diameter_mm: Some(3.0),
            gaze: Some(Point::new(1440.0, 540.0)),
        });

        let result = mapper.process_gaze(&datum).unwrap();
        assert_eq!(result.points.len(), 3);
        assert_relative_eq!(result.points[0].x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(result.points[1].x, 0.25, epsilon = 1e-6);
        assert_relative_eq!(result.points[2].x, 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_surface_replacement_is_atomic_swap() {
        let (mut mapper, first) = screen_mapper();
        mapper.process_scene(&frame());

        // Re-register with a half-width surface; handle changes and the
        // stale homography is gone until the next scene frame
        let mut markers = BTreeMap::new();
        for (id, x, y) in [(0, 0.0, 0.0), (1, 896.0, 0.0), (2, 896.0, 1016.0), (3, 0.0, 1016.0)]
        {
            markers.insert(id, quad(x, y, 64.0));
        }
        let narrow = SurfaceDefinition::new(markers, FrameSize::new(960, 1080)).unwrap();
        let second = mapper.add_surface(narrow);
        assert_ne!(first, second);
        assert!(mapper.process_gaze(&gaze_at(480.0, 540.0)).is_none());
    }
}
