//! Bounding volumes

use glam::{Mat4, Vec3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::splat(-0.5),
            max: Vec3::splat(0.5),
        }
    }
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_extent(center: Vec3, extent: Vec3) -> Self {
        Self {
            min: center - extent,
            max: center + extent,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size along each axis
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Transform the box and return the axis-aligned box enclosing the result.
    pub fn transform(&self, matrix: &Mat4) -> BoundingBox {
        let center = matrix.transform_point3(self.center());
        let extent = self.extent();
        let abs_x = matrix.x_axis.truncate().abs() * extent.x;
        let abs_y = matrix.y_axis.truncate().abs() * extent.y;
        let abs_z = matrix.z_axis.truncate().abs() * extent.z;
        BoundingBox::from_center_extent(center, abs_x + abs_y + abs_z)
    }

    /// Smallest box containing both boxes.
    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere around the centroid of `points` reaching the farthest one.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0f32, f32::max);
        Self { center, radius }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_transform_translation() {
        let b = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = b.transform(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.extent(), Vec3::ONE);
    }

    #[test]
    fn test_box_transform_rotation_grows_extent() {
        let b = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated = b.transform(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let expected = 2.0f32.sqrt();
        assert!((rotated.extent().x - expected).abs() < 1e-5);
        assert!((rotated.extent().y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_from_points() {
        let sphere = BoundingSphere::from_points(&[Vec3::X, -Vec3::X]);
        assert_eq!(sphere.center, Vec3::ZERO);
        assert_eq!(sphere.radius, 1.0);
        assert!(sphere.contains_point(Vec3::new(0.5, 0.0, 0.0)));
    }
}
