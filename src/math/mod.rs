//! Geometry helpers for culling and coordinate conversions

mod bounds;
mod frustum;

pub use bounds::*;
pub use frustum::*;

use glam::{Mat4, Vec3};

/// Invert a matrix, falling back to identity when it is singular.
///
/// Degenerate cameras (zero viewport, zero near/far range) produce singular
/// matrices; callers get a usable matrix instead of NaNs.
pub fn safe_inverse(matrix: Mat4) -> Mat4 {
    let det = matrix.determinant();
    if det == 0.0 || !det.is_finite() {
        log::warn!("Attempted to invert a singular matrix, using identity");
        return Mat4::IDENTITY;
    }
    matrix.inverse()
}

/// A ray with a normalized direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_inverse_singular() {
        let singular = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(safe_inverse(singular), Mat4::IDENTITY);
    }

    #[test]
    fn test_safe_inverse_regular() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let inv = safe_inverse(m);
        assert!((inv * m).abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_ray_normalizes_direction() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(ray.direction, Vec3::NEG_Z);
        assert_eq!(ray.point_at(2.0), Vec3::new(0.0, 0.0, -2.0));
    }
}
