//! Marker and coordinate value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2D point in pixel or normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from(p: (f64, f64)) -> Self {
        Self { x: p.0, y: p.1 }
    }
}

/// An ordered four-corner polygon. Corner order must be consistent across
/// all markers feeding one surface so the homography solve is well-defined.
pub type Quad = [Point; 4];

/// Reference frame dimensions used to normalize surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A marker identifier as supplied by callers: either an integer or its
/// decimal string form. The registry is keyed by integer id canonically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerKey {
    Id(u32),
    Name(String),
}

impl MarkerKey {
    /// Canonicalize to the integer marker id.
    ///
    /// # Errors
    /// Returns [`SurfaceError::InvalidMarkerKey`] if the string form does
    /// not parse as a decimal integer.
    pub fn canonical(&self) -> Result<u32, SurfaceError> {
        match self {
            MarkerKey::Id(id) => Ok(*id),
            MarkerKey::Name(name) => name
                .trim()
                .parse::<u32>()
                .map_err(|_| SurfaceError::InvalidMarkerKey(name.clone())),
        }
    }
}

impl From<u32> for MarkerKey {
    fn from(id: u32) -> Self {
        MarkerKey::Id(id)
    }
}

impl From<&str> for MarkerKey {
    fn from(name: &str) -> Self {
        MarkerKey::Name(name.to_string())
    }
}

/// Errors raised while validating a surface definition.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurfaceError {
    /// Marker key string does not parse as a decimal integer id.
    #[error("Invalid marker key: {0:?}")]
    InvalidMarkerKey(String),

    /// Reference frame has a zero dimension.
    #[error("Degenerate reference frame: {0}")]
    DegenerateFrame(FrameSize),

    /// Surface definition contains no markers.
    #[error("Surface definition has no markers")]
    NoMarkers,

    /// Polygon supplied with the wrong number of corners.
    #[error("Marker {id} polygon has {got} corners, expected 4")]
    WrongPolygonArity { id: u32, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_key_canonicalization() {
        assert_eq!(MarkerKey::Id(7).canonical().unwrap(), 7);
        assert_eq!(MarkerKey::from("7").canonical().unwrap(), 7);
        assert_eq!(MarkerKey::from(" 12 ").canonical().unwrap(), 12);
    }

    #[test]
    fn test_marker_key_rejects_non_numeric() {
        assert!(MarkerKey::from("tag7").canonical().is_err());
        assert!(MarkerKey::from("").canonical().is_err());
        assert!(MarkerKey::from("-3").canonical().is_err());
    }

    #[test]
    fn test_marker_key_untagged_deserialization() {
        let from_int: MarkerKey = serde_json::from_str("7").unwrap();
        let from_str: MarkerKey = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(from_int.canonical().unwrap(), 7);
        assert_eq!(from_str.canonical().unwrap(), 7);
    }

    #[test]
    fn test_frame_size_degenerate() {
        assert!(FrameSize::new(0, 1080).is_degenerate());
        assert!(FrameSize::new(1920, 0).is_degenerate());
        assert!(!FrameSize::new(1920, 1080).is_degenerate());
    }
}
