//! Surface geometry for gaze-to-screen mapping.
//!
//! A *surface* is a quadrilateral screen region delimited by fiducial
//! markers. This crate holds the marker/polygon data model, the registry
//! that owns the active surface definition, and the planar homography math
//! used to project scene-camera points into surface-normalized coordinates.

pub mod homography;
pub mod marker;
pub mod registry;

pub use homography::{estimate_homography, Homography, HomographyError};
pub use marker::{FrameSize, MarkerKey, Point, Quad, SurfaceError};
pub use registry::{SurfaceDefinition, SurfaceHandle, SurfaceRegistry};
