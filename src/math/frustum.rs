//! Planes and view frusta

use glam::{Mat4, Vec3, Vec4};

use super::{safe_inverse, BoundingBox};

/// A plane `normal · p + distance = 0`
///
/// Points with a positive signed distance are on the inner side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::Y,
            distance: 0.0,
        }
    }
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Plane from `(a, b, c, d)` coefficients, normalized.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let length = normal.length();
        if length == 0.0 {
            return Self::default();
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Plane through three points, normal along `(p1 - p0) x (p2 - p0)`.
    pub fn from_points(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        let normal = (p1 - p0).cross(p2 - p0).normalize_or_zero();
        Self {
            normal,
            distance: -normal.dot(p0),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Flip the plane so that `point` lies on its inner side.
    pub fn facing(self, point: Vec3) -> Self {
        if self.signed_distance(point) < 0.0 {
            Self {
                normal: -self.normal,
                distance: -self.distance,
            }
        } else {
            self
        }
    }

    /// Whether the box lies entirely on the outer side.
    pub fn is_box_outside(&self, aabb: &BoundingBox) -> bool {
        let positive = Vec3::select(self.normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
        self.signed_distance(positive) < 0.0
    }
}

/// Whether the box intersects (or is inside) the convex volume bounded by `planes`.
pub fn box_intersects_planes(planes: &[Plane], aabb: &BoundingBox) -> bool {
    !planes.iter().any(|plane| plane.is_box_outside(aabb))
}

/// Frustum faces, in plane storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrustumFace {
    Near = 0,
    Far = 1,
    Left = 2,
    Right = 3,
    Bottom = 4,
    Top = 5,
}

impl FrustumFace {
    pub const ALL: [FrustumFace; 6] = [
        FrustumFace::Near,
        FrustumFace::Far,
        FrustumFace::Left,
        FrustumFace::Right,
        FrustumFace::Bottom,
        FrustumFace::Top,
    ];

    pub fn opposite(self) -> FrustumFace {
        match self {
            FrustumFace::Near => FrustumFace::Far,
            FrustumFace::Far => FrustumFace::Near,
            FrustumFace::Left => FrustumFace::Right,
            FrustumFace::Right => FrustumFace::Left,
            FrustumFace::Bottom => FrustumFace::Top,
            FrustumFace::Top => FrustumFace::Bottom,
        }
    }

    /// Whether corner `index` lies on this face.
    ///
    /// Corner bits: 0 = right (else left), 1 = top (else bottom), 2 = far (else near).
    pub fn contains_corner(self, index: usize) -> bool {
        match self {
            FrustumFace::Left => index & 1 == 0,
            FrustumFace::Right => index & 1 != 0,
            FrustumFace::Bottom => index & 2 == 0,
            FrustumFace::Top => index & 2 != 0,
            FrustumFace::Near => index & 4 == 0,
            FrustumFace::Far => index & 4 != 0,
        }
    }

    /// The two corners shared with an adjacent face, `None` for the same or opposite face.
    pub fn shared_edge(self, other: FrustumFace) -> Option<(usize, usize)> {
        if self == other || self.opposite() == other {
            return None;
        }
        let mut shared = (0..8).filter(|&i| self.contains_corner(i) && other.contains_corner(i));
        Some((shared.next()?, shared.next()?))
    }
}

/// A convex frustum: six inward-facing planes and eight corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingFrustum {
    planes: [Plane; 6],
    corners: [Vec3; 8],
}

impl Default for BoundingFrustum {
    fn default() -> Self {
        Self::from_matrix(&Mat4::IDENTITY)
    }
}

impl BoundingFrustum {
    /// Extract the frustum of a view-projection matrix (depth range [0, 1]).
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        let mut planes = [Plane::default(); 6];
        planes[FrustumFace::Near as usize] = Plane::from_coefficients(r2);
        planes[FrustumFace::Far as usize] = Plane::from_coefficients(r3 - r2);
        planes[FrustumFace::Left as usize] = Plane::from_coefficients(r3 + r0);
        planes[FrustumFace::Right as usize] = Plane::from_coefficients(r3 - r0);
        planes[FrustumFace::Bottom as usize] = Plane::from_coefficients(r3 + r1);
        planes[FrustumFace::Top as usize] = Plane::from_coefficients(r3 - r1);

        let inverse = safe_inverse(*view_projection);
        let mut corners = [Vec3::ZERO; 8];
        for (index, corner) in corners.iter_mut().enumerate() {
            let ndc = Vec3::new(
                if index & 1 != 0 { 1.0 } else { -1.0 },
                if index & 2 != 0 { 1.0 } else { -1.0 },
                if index & 4 != 0 { 1.0 } else { 0.0 },
            );
            *corner = inverse.project_point3(ndc);
        }

        Self { planes, corners }
    }

    /// Build a frustum from its eight corners (indexed as in [`FrustumFace::contains_corner`]).
    pub fn from_corners(corners: [Vec3; 8]) -> Self {
        let centroid = corners.iter().copied().sum::<Vec3>() / 8.0;
        let mut planes = [Plane::default(); 6];
        for face in FrustumFace::ALL {
            let mut on_face = (0..8).filter(|&i| face.contains_corner(i)).map(|i| corners[i]);
            let (Some(p0), Some(p1), Some(p2)) = (on_face.next(), on_face.next(), on_face.next())
            else {
                continue;
            };
            planes[face as usize] = Plane::from_points(p0, p1, p2).facing(centroid);
        }
        Self { planes, corners }
    }

    pub fn plane(&self, face: FrustumFace) -> &Plane {
        &self.planes[face as usize]
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn corners(&self) -> &[Vec3; 8] {
        &self.corners
    }

    pub fn intersects_box(&self, aabb: &BoundingBox) -> bool {
        box_intersects_planes(&self.planes, aabb)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> BoundingFrustum {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        BoundingFrustum::from_matrix(&(proj * view))
    }

    #[test]
    fn test_frustum_contains_point_in_front() {
        let frustum = test_frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -200.0)));
    }

    #[test]
    fn test_frustum_box_culling() {
        let frustum = test_frustum();
        let visible = BoundingBox::from_center_extent(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE);
        let behind = BoundingBox::from_center_extent(Vec3::new(0.0, 0.0, 5.0), Vec3::ONE);
        let straddling = BoundingBox::from_center_extent(Vec3::new(0.0, 0.0, 0.0), Vec3::ONE);
        assert!(frustum.intersects_box(&visible));
        assert!(!frustum.intersects_box(&behind));
        assert!(frustum.intersects_box(&straddling));
    }

    #[test]
    fn test_corners_lie_on_near_and_far() {
        let frustum = test_frustum();
        for (index, corner) in frustum.corners().iter().enumerate() {
            let expected = if index & 4 != 0 { -100.0 } else { -0.1 };
            assert!((corner.z - expected).abs() < expected.abs() * 1e-3);
        }
    }

    #[test]
    fn test_from_corners_matches_from_matrix() {
        let frustum = test_frustum();
        let rebuilt = BoundingFrustum::from_corners(*frustum.corners());
        for face in FrustumFace::ALL {
            let a = frustum.plane(face);
            let b = rebuilt.plane(face);
            assert!(a.normal.dot(b.normal) > 0.999, "{face:?} normals differ");
        }
    }

    #[test]
    fn test_shared_edge() {
        assert_eq!(FrustumFace::Near.shared_edge(FrustumFace::Far), None);
        let (a, b) = FrustumFace::Near.shared_edge(FrustumFace::Left).unwrap();
        assert_eq!((a, b), (0, 2));
    }
}
