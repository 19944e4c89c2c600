//! Per-cascade shadow data

use glam::{Mat4, UVec2};

use crate::math::{BoundingSphere, Plane};

/// Virtual light camera of one cascade
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSliceData {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// World size of one shadow-map texel
    pub texel_size: f32,
    /// Sphere enclosing the camera frustum slice
    pub sphere: BoundingSphere,
    /// Inward planes bounding every caster that can shadow the slice
    pub cull_planes: Vec<Plane>,
    /// Tile size in texels
    pub resolution: u32,
    /// Tile offset in the atlas, in texels
    pub offset: UVec2,
}

impl ShadowSliceData {
    pub fn new(
        view: Mat4,
        projection: Mat4,
        texel_size: f32,
        sphere: BoundingSphere,
        cull_planes: Vec<Plane>,
        resolution: u32,
        offset: UVec2,
    ) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            texel_size,
            sphere,
            cull_planes,
            resolution,
            offset,
        }
    }
}
