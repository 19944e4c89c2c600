//! Drawable geometry descriptions
//!
//! The render core never touches vertex data. A [`Primitive`] only carries
//! what ordering, culling and batching need: an identity, local bounds and
//! its index ranges.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use crate::math::BoundingBox;

static NEXT_PRIMITIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique primitive identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId(pub u64);

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    Points,
    Lines,
    #[default]
    Triangles,
    TriangleStrip,
}

/// A contiguous index range of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubMesh {
    pub start: u32,
    pub count: u32,
    pub topology: Topology,
}

impl SubMesh {
    pub fn new(start: u32, count: u32) -> Self {
        Self {
            start,
            count,
            topology: Topology::Triangles,
        }
    }
}

/// GPU geometry as seen by the render core
#[derive(Debug, Clone)]
pub struct Primitive {
    id: PrimitiveId,
    pub name: String,
    pub bounds: BoundingBox,
    pub vertex_count: u32,
    pub index_count: u32,
    pub sub_meshes: Vec<SubMesh>,
}

impl Primitive {
    pub fn new(name: &str, bounds: BoundingBox, vertex_count: u32, index_count: u32) -> Self {
        Self {
            id: PrimitiveId(NEXT_PRIMITIVE_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            bounds,
            vertex_count,
            index_count,
            sub_meshes: vec![SubMesh::new(0, index_count)],
        }
    }

    /// Unit cube centered at origin
    pub fn cube() -> Self {
        Self::new("cube", BoundingBox::default(), 24, 36)
    }

    /// Unit quad in the XY plane
    pub fn quad() -> Self {
        Self::new(
            "quad",
            BoundingBox::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(0.5, 0.5, 0.0)),
            4,
            6,
        )
    }

    /// Replace the index ranges.
    pub fn with_sub_meshes(mut self, sub_meshes: Vec<SubMesh>) -> Self {
        self.sub_meshes = sub_meshes;
        self
    }

    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}
