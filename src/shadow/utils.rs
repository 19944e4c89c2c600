//! Cascade geometry: splits, bounding spheres, cull planes and light matrices

use glam::{Mat4, UVec2, Vec3, Vec4};

use crate::math::{BoundingFrustum, BoundingSphere, FrustumFace, Plane};
use crate::scene::Camera;
use crate::shadow::CascadeSplits;

/// Texels kept free around each cascade tile
pub const ATLAS_BORDER: f32 = 4.0;

/// Upper bound of light-space cull planes per cascade
pub const MAX_CULL_PLANES: usize = 10;

/// Maps light clip space to shadow texture coordinates (uv y down, depth kept).
pub const SHADOW_COORDINATE_MATRIX: Mat4 = Mat4::from_cols(
    Vec4::new(0.5, 0.0, 0.0, 0.0),
    Vec4::new(0.0, -0.5, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 1.0, 0.0),
    Vec4::new(0.5, 0.5, 0.0, 1.0),
);

/// Cascade boundaries from `near` to `far`, `cascades + 1` values.
///
/// The first value is always `near` and the last `far`.
pub fn split_distances(near: f32, far: f32, cascades: usize, splits: CascadeSplits) -> Vec<f32> {
    let cascades = cascades.max(1);
    let mut distances = Vec::with_capacity(cascades + 1);
    distances.push(near);
    for i in 1..cascades {
        let distance = match splits {
            CascadeSplits::Practical { lambda } => {
                let p = i as f32 / cascades as f32;
                let log = near * (far / near).powf(p);
                let uniform = near + (far - near) * p;
                lambda * log + (1.0 - lambda) * uniform
            }
            CascadeSplits::Ratios(ratios) => {
                // Two cascades split at the first ratio, four at all three.
                let ratio = match cascades {
                    2 => ratios[0],
                    _ => ratios[(i - 1).min(2)],
                };
                near + (far - near) * ratio
            }
        };
        distances.push(distance.clamp(near, far));
    }
    distances.push(far);
    distances
}

/// World-space corners of the camera frustum between view depths `near` and `far`.
///
/// Indexed like [`FrustumFace::contains_corner`].
pub fn slice_corners(camera: &Camera, near: f32, far: f32) -> [Vec3; 8] {
    let aspect = camera.aspect_ratio();
    let inverse_view = camera.inverse_view_matrix();
    let half_extent = |depth: f32| {
        if camera.is_orthographic() {
            let half_height = camera.orthographic_size();
            (half_height * aspect, half_height)
        } else {
            let half_height = depth * (camera.field_of_view().to_radians() * 0.5).tan();
            (half_height * aspect, half_height)
        }
    };

    let mut corners = [Vec3::ZERO; 8];
    for (index, corner) in corners.iter_mut().enumerate() {
        let depth = if index & 4 != 0 { far } else { near };
        let (half_width, half_height) = half_extent(depth);
        let x = if index & 1 != 0 { half_width } else { -half_width };
        let y = if index & 2 != 0 { half_height } else { -half_height };
        *corner = inverse_view.transform_point3(Vec3::new(x, y, -depth));
    }
    corners
}

/// Smallest sphere enclosing the camera frustum slice `[near, far]`.
pub fn slice_bounding_sphere(camera: &Camera, near: f32, far: f32) -> BoundingSphere {
    if camera.is_orthographic() {
        return BoundingSphere::from_points(&slice_corners(camera, near, far));
    }

    let aspect = camera.aspect_ratio();
    let k = (1.0 + aspect * aspect).sqrt() * (camera.field_of_view().to_radians() * 0.5).tan();
    let k2 = k * k;
    let (n, f) = (near, far);

    let (center_depth, radius) = if k2 >= (f - n) / (f + n) {
        (f, f * k)
    } else {
        let center = 0.5 * (f + n) * (1.0 + k2);
        let radius = 0.5
            * ((f - n) * (f - n) + 2.0 * (f * f + n * n) * k2 + (f + n) * (f + n) * k2 * k2).sqrt();
        (center, radius)
    };

    let center = camera
        .inverse_view_matrix()
        .transform_point3(Vec3::new(0.0, 0.0, -center_depth));
    BoundingSphere::new(center, radius)
}

/// Planes bounding every caster that can shadow the slice.
///
/// The slice faces the light leaves through are kept; the faces it enters are
/// replaced by the silhouette edges extruded towards the light. All planes
/// face inwards.
pub fn light_cull_planes(corners: &[Vec3; 8], light_direction: Vec3) -> Vec<Plane> {
    let frustum = BoundingFrustum::from_corners(*corners);
    let centroid = corners.iter().copied().sum::<Vec3>() / 8.0;
    let kept = |face: FrustumFace| frustum.plane(face).normal.dot(light_direction) <= 0.0;

    let mut planes: Vec<Plane> = FrustumFace::ALL
        .iter()
        .filter(|&&face| kept(face))
        .map(|&face| *frustum.plane(face))
        .collect();

    for &back in FrustumFace::ALL.iter().filter(|&&face| kept(face)) {
        for &front in FrustumFace::ALL.iter().filter(|&&face| !kept(face)) {
            if let Some((a, b)) = back.shared_edge(front) {
                let (p0, p1) = (corners[a], corners[b]);
                planes.push(Plane::from_points(p0, p1, p0 + light_direction).facing(centroid));
            }
        }
    }

    planes.truncate(MAX_CULL_PLANES);
    planes
}

/// Light view and projection covering `sphere`, texel-snapped for a `tile`-sized map.
///
/// Returns `(view, projection, texel_size)` where `texel_size` is the world
/// size of one shadow-map texel.
pub fn light_matrices(
    sphere: &BoundingSphere,
    light_direction: Vec3,
    tile: u32,
    near_plane: f32,
) -> (Mat4, Mat4, f32) {
    let forward = light_direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let up_hint = if forward.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let side = forward.cross(up_hint).normalize();
    let up = side.cross(forward);

    let half = tile as f32 * 0.5;
    let border_radius = sphere.radius * half / (half - ATLAS_BORDER).max(1.0);
    let texel_size = 2.0 * border_radius / tile.max(1) as f32;

    // Snap the center to whole texels so the map does not swim when the camera moves.
    let mut center = sphere.center;
    if texel_size > 0.0 {
        let x = center.dot(side);
        let y = center.dot(up);
        let snapped_x = (x / texel_size).floor() * texel_size;
        let snapped_y = (y / texel_size).floor() * texel_size;
        center += side * (snapped_x - x) + up * (snapped_y - y);
    }

    let eye = center - forward * (sphere.radius + near_plane);
    let view = Mat4::look_at_rh(eye, center, up);
    let projection = Mat4::orthographic_rh(
        -border_radius,
        border_radius,
        -border_radius,
        border_radius,
        0.0,
        2.0 * sphere.radius + near_plane,
    );
    (view, projection, texel_size)
}

/// Atlas size and tile size for a cascade count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    pub width: u32,
    pub height: u32,
    pub tile: u32,
}

impl AtlasLayout {
    pub fn new(resolution: u32, cascades: usize) -> Self {
        match cascades {
            0 | 1 => Self {
                width: resolution,
                height: resolution,
                tile: resolution,
            },
            2 => Self {
                width: resolution,
                height: resolution / 2,
                tile: resolution / 2,
            },
            _ => Self {
                width: resolution,
                height: resolution,
                tile: resolution / 2,
            },
        }
    }

    /// Pixel offset of cascade `index`
    pub fn tile_offset(&self, index: usize) -> UVec2 {
        UVec2::new((index % 2) as u32 * self.tile, (index / 2) as u32 * self.tile)
    }

    /// Maps shadow texture coordinates into the tile of cascade `index`.
    pub fn slice_transform(&self, index: usize) -> Mat4 {
        let offset = self.tile_offset(index);
        let scale_x = self.tile as f32 / self.width as f32;
        let scale_y = self.tile as f32 / self.height as f32;
        Mat4::from_cols(
            Vec4::new(scale_x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, scale_y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(
                offset.x as f32 / self.width as f32,
                offset.y as f32 / self.height as f32,
                0.0,
                1.0,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::BoundingBox;
    use crate::scene::Transform;
    use rstest::rstest;

    fn test_camera() -> Camera {
        let mut camera = Camera::new(Transform::new());
        camera.update_surface_size(1280, 720);
        camera
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(4)]
    fn test_split_distances_monotonic(#[case] cascades: usize) {
        for splits in [
            CascadeSplits::Practical { lambda: 0.0 },
            CascadeSplits::Practical { lambda: 0.5 },
            CascadeSplits::Practical { lambda: 1.0 },
            CascadeSplits::Ratios([0.1, 0.25, 0.5]),
        ] {
            let distances = split_distances(0.1, 100.0, cascades, splits);
            assert_eq!(distances.len(), cascades + 1);
            assert_eq!(distances[0], 0.1);
            assert_eq!(distances[cascades], 100.0);
            assert!(distances.windows(2).all(|w| w[0] < w[1]), "{distances:?}");
        }
    }

    #[test]
    fn test_practical_split_blend() {
        let uniform = split_distances(1.0, 100.0, 2, CascadeSplits::Practical { lambda: 0.0 });
        assert!((uniform[1] - 50.5).abs() < 1e-4);
        let log = split_distances(1.0, 100.0, 2, CascadeSplits::Practical { lambda: 1.0 });
        assert!((log[1] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_bounding_sphere_contains_slice() {
        let camera = test_camera();
        for (near, far) in [(0.1, 5.0), (5.0, 20.0), (20.0, 100.0)] {
            let sphere = slice_bounding_sphere(&camera, near, far);
            for corner in slice_corners(&camera, near, far) {
                assert!(
                    corner.distance(sphere.center) <= sphere.radius * 1.0001,
                    "corner {corner} outside sphere {sphere:?}"
                );
            }
        }
    }

    #[test]
    fn test_bounding_sphere_is_tight() {
        // Thin far slice: the far corners lie on the sphere.
        let camera = test_camera();
        let sphere = slice_bounding_sphere(&camera, 90.0, 100.0);
        let corners = slice_corners(&camera, 90.0, 100.0);
        let farthest = corners
            .iter()
            .map(|c| c.distance(sphere.center))
            .fold(0.0f32, f32::max);
        assert!((farthest - sphere.radius).abs() < sphere.radius * 1e-4);
    }

    #[test]
    fn test_cull_planes_keep_slice_and_casters_towards_light() {
        let camera = test_camera();
        let corners = slice_corners(&camera, 0.1, 20.0);
        let light = Vec3::new(0.3, -1.0, 0.2).normalize();
        let planes = light_cull_planes(&corners, light);
        assert!(!planes.is_empty() && planes.len() <= MAX_CULL_PLANES);

        let inside = |p: Vec3| planes.iter().all(|plane| plane.signed_distance(p) >= -1e-3);
        let slice_point = Vec3::new(0.0, 0.0, -10.0);
        assert!(inside(slice_point));
        // A caster far up towards the light still shadows the slice.
        assert!(inside(slice_point - light * 200.0));
        // Something past the slice along the light direction cannot.
        assert!(!inside(slice_point + light * 200.0));

        let behind_light = BoundingBox::from_center_extent(slice_point + light * 200.0, Vec3::ONE);
        assert!(!crate::math::box_intersects_planes(&planes, &behind_light));
    }

    #[test]
    fn test_light_matrices_cover_sphere() {
        let sphere = BoundingSphere::new(Vec3::new(3.0, 1.0, -7.0), 5.0);
        let light = Vec3::new(-0.4, -1.0, 0.1).normalize();
        let (view, projection, texel) = light_matrices(&sphere, light, 1024, 0.5);
        let view_projection = projection * view;
        assert!(texel > 0.0);

        let center = view_projection.project_point3(sphere.center);
        assert!(center.x.abs() < 0.01 && center.y.abs() < 0.01);
        assert!(center.z > 0.0 && center.z < 1.0);

        let side = light.cross(Vec3::Y).normalize();
        let edge = view_projection.project_point3(sphere.center + side * sphere.radius);
        assert!(edge.x.abs() < 1.0 && edge.x.abs() > 0.9);
    }

    #[test]
    fn test_atlas_layout() {
        let one = AtlasLayout::new(2048, 1);
        assert_eq!((one.width, one.height, one.tile), (2048, 2048, 2048));

        let two = AtlasLayout::new(2048, 2);
        assert_eq!((two.width, two.height, two.tile), (2048, 1024, 1024));
        assert_eq!(two.tile_offset(1), UVec2::new(1024, 0));

        let four = AtlasLayout::new(2048, 4);
        assert_eq!(four.tile_offset(3), UVec2::new(1024, 1024));
        let uv = four.slice_transform(3).transform_point3(Vec3::new(0.5, 0.5, 0.3));
        assert!(uv.abs_diff_eq(Vec3::new(0.75, 0.75, 0.3), 1e-6));
    }
}
