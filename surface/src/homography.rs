//! Planar homography estimation and projection.
//!
//! Solves for the 3x3 projective transform mapping scene-camera pixel
//! coordinates to surface-normalized coordinates using the direct linear
//! transform, with SVD for robustness to ill-conditioned marker layouts.

use nalgebra::{DMatrix, Matrix3, Vector3};

use crate::marker::Point;

/// Errors raised during homography estimation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HomographyError {
    /// Fewer than four point correspondences were supplied.
    #[error("Need at least 4 correspondences, got {0}")]
    InsufficientCorrespondences(usize),

    /// The SVD produced no usable null-space vector.
    #[error("Homography solve failed: degenerate correspondence geometry")]
    DegenerateGeometry,
}

/// A planar projective transform from source to destination coordinates.
#[derive(Debug, Clone)]
pub struct Homography {
    matrix: Matrix3<f64>,
    /// RMS reprojection error over the correspondences used for the solve
    pub rms_error: f64,
}

impl Homography {
    /// Project a source point through the transform.
    ///
    /// Returns `None` when the point maps to the plane at infinity
    /// (homogeneous scale numerically zero).
    pub fn project(&self, p: Point) -> Option<Point> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        if v.z.abs() < 1e-12 {
            return None;
        }
        Some(Point::new(v.x / v.z, v.y / v.z))
    }
}

/// Estimate the homography mapping `src` points onto `dst` points.
///
/// Builds the standard 2N x 9 DLT design matrix and takes the right
/// singular vector of the smallest singular value as the solution.
///
/// # Errors
/// Returns an error for fewer than 4 correspondences or degenerate
/// geometry (e.g., collinear points).
pub fn estimate_homography(
    correspondences: &[(Point, Point)],
) -> Result<Homography, HomographyError> {
    let n = correspondences.len();
    if n < 4 {
        return Err(HomographyError::InsufficientCorrespondences(n));
    }

    let mut rows = Vec::with_capacity(2 * n * 9);
    for (src, dst) in correspondences {
        let (x, y) = (src.x, src.y);
        let (u, v) = (dst.x, dst.y);
        rows.extend_from_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u]);
        rows.extend_from_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v]);
    }

    let a = DMatrix::from_row_slice(2 * n, 9, &rows);
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::DegenerateGeometry)?;

    // Null-space vector: the row of V^T for the smallest singular value
    let min_idx = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or(HomographyError::DegenerateGeometry)?;
    let h = v_t.row(min_idx);

    let mut matrix = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    // Fix the projective scale; an h33 near zero means the solve collapsed
    if matrix[(2, 2)].abs() < 1e-12 {
        return Err(HomographyError::DegenerateGeometry);
    }
    matrix /= matrix[(2, 2)];

    let mut homography = Homography {
        matrix,
        rms_error: 0.0,
    };

    let mut sum_sq = 0.0;
    for (src, dst) in correspondences {
        match homography.project(*src) {
            Some(p) => {
                let (ex, ey) = (p.x - dst.x, p.y - dst.y);
                sum_sq += ex * ex + ey * ey;
            }
            None => return Err(HomographyError::DegenerateGeometry),
        }
    }
    homography.rms_error = (sum_sq / n as f64).sqrt();

    Ok(homography)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square_from(src: [(f64, f64); 4]) -> Vec<(Point, Point)> {
        let dst = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        src.iter()
            .zip(dst.iter())
            .map(|(&s, &d)| (Point::from(s), Point::from(d)))
            .collect()
    }

    #[test]
    fn test_axis_aligned_rectangle_to_unit_square() {
        let pairs = unit_square_from([
            (0.0, 0.0),
            (1920.0, 0.0),
            (1920.0, 1080.0),
            (0.0, 1080.0),
        ]);
        let h = estimate_homography(&pairs).unwrap();

        let center = h.project(Point::new(960.0, 540.0)).unwrap();
        assert_relative_eq!(center.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(center.y, 0.5, epsilon = 1e-9);
        assert!(h.rms_error < 1e-9);
    }

    #[test]
    fn test_perspective_quad_maps_corners() {
        // A tilted quadrilateral as a scene camera might see the screen
        let pairs = unit_square_from([
            (210.0, 140.0),
            (1650.0, 230.0),
            (1580.0, 980.0),
            (260.0, 900.0),
        ]);
        let h = estimate_homography(&pairs).unwrap();

        for (src, dst) in &pairs {
            let p = h.project(*src).unwrap();
            assert_relative_eq!(p.x, dst.x, epsilon = 1e-8);
            assert_relative_eq!(p.y, dst.y, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_too_few_correspondences() {
        let pairs = vec![
            (Point::new(0.0, 0.0), Point::new(0.0, 0.0)),
            (Point::new(1.0, 0.0), Point::new(1.0, 0.0)),
            (Point::new(1.0, 1.0), Point::new(1.0, 1.0)),
        ];
        assert!(matches!(
            estimate_homography(&pairs),
            Err(HomographyError::InsufficientCorrespondences(3))
        ));
    }

    #[test]
    fn test_translated_square_interior_point() {
        let pairs = unit_square_from([
            (100.0, 200.0),
            (612.0, 200.0),
            (612.0, 712.0),
            (100.0, 712.0),
        ]);
        let h = estimate_homography(&pairs).unwrap();

        // Quarter of the way across the square
        let p = h.project(Point::new(228.0, 328.0)).unwrap();
        assert_relative_eq!(p.x, 0.25, epsilon = 1e-9);
        assert_relative_eq!(p.y, 0.25, epsilon = 1e-9);
    }
}
