//! Surface definitions and the single-slot surface registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::homography::Homography;
use crate::marker::{FrameSize, MarkerKey, Point, Quad, SurfaceError};

/// Opaque handle identifying a registered surface, used to correlate
/// mapped gaze output with the registration that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(pub u64);

/// A validated surface definition: marker polygons in a reference pixel
/// frame, keyed by canonical integer marker id.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDefinition {
    markers: BTreeMap<u32, Quad>,
    frame_size: FrameSize,
}

impl SurfaceDefinition {
    /// Build a definition from canonical integer-keyed polygons.
    ///
    /// # Errors
    /// Rejects an empty marker set or a degenerate frame size; the caller
    /// keeps its previous surface state on rejection.
    pub fn new(markers: BTreeMap<u32, Quad>, frame_size: FrameSize) -> Result<Self, SurfaceError> {
        if frame_size.is_degenerate() {
            return Err(SurfaceError::DegenerateFrame(frame_size));
        }
        if markers.is_empty() {
            return Err(SurfaceError::NoMarkers);
        }
        Ok(Self {
            markers,
            frame_size,
        })
    }

    /// Build a definition from caller-supplied marker keys (integers or
    /// decimal strings) and free-length corner lists, canonicalizing keys
    /// and checking polygon arity.
    pub fn from_keys(
        markers: impl IntoIterator<Item = (MarkerKey, Vec<Point>)>,
        frame_size: FrameSize,
    ) -> Result<Self, SurfaceError> {
        let mut canonical = BTreeMap::new();
        for (key, corners) in markers {
            let id = key.canonical()?;
            let quad: Quad = corners
                .as_slice()
                .try_into()
                .map_err(|_| SurfaceError::WrongPolygonArity {
                    id,
                    got: corners.len(),
                })?;
            canonical.insert(id, quad);
        }
        Self::new(canonical, frame_size)
    }

    /// Marker ids configured for this surface.
    pub fn marker_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.markers.keys().copied()
    }

    /// Polygon for a marker id, if configured.
    pub fn polygon(&self, id: u32) -> Option<&Quad> {
        self.markers.get(&id)
    }

    /// Polygon for a marker id with corners normalized by the reference
    /// frame size, for use as homography destination coordinates.
    pub fn normalized_polygon(&self, id: u32) -> Option<Quad> {
        let quad = self.markers.get(&id)?;
        let w = f64::from(self.frame_size.width);
        let h = f64::from(self.frame_size.height);
        Some(quad.map(|p| Point::new(p.x / w, p.y / h)))
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

/// The active surface slot: definition plus the most recent device-space
/// homography produced from scene detection.
#[derive(Debug)]
pub struct ActiveSurface {
    pub handle: SurfaceHandle,
    pub definition: SurfaceDefinition,
    pub homography: Option<Homography>,
}

/// Single-slot registry owning the current surface.
///
/// Each registration replaces the slot wholesale and issues a fresh
/// handle, so gaze processed concurrently with an update never observes a
/// half-applied marker set.
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    next_id: u64,
    active: Option<ActiveSurface>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active surface with a fresh registration.
    pub fn replace(&mut self, definition: SurfaceDefinition) -> SurfaceHandle {
        let handle = SurfaceHandle(self.next_id);
        self.next_id += 1;
        self.active = Some(ActiveSurface {
            handle,
            definition,
            homography: None,
        });
        handle
    }

    /// Drop all surface state.
    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&ActiveSurface> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveSurface> {
        self.active.as_mut()
    }
}
