//! Renderable objects

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::math::BoundingBox;
use crate::resources::{Material, Primitive, SubMesh};
use crate::scene::Transform;

static NEXT_RENDERER_ID: AtomicU64 = AtomicU64::new(1);

bitflags! {
    /// Render layers used for camera and pass masking
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Layer: u32 {
        const LAYER0 = 1 << 0;
        const LAYER1 = 1 << 1;
        const LAYER2 = 1 << 2;
        const LAYER3 = 1 << 3;
        const LAYER4 = 1 << 4;
        const LAYER5 = 1 << 5;
        const LAYER6 = 1 << 6;
        const LAYER7 = 1 << 7;
        const EVERYTHING = u32::MAX;
    }
}

impl Layer {
    pub const NOTHING: Layer = Layer::empty();

    /// Layer with only bit `index` set (0..32).
    pub fn from_index(index: u32) -> Layer {
        Layer::from_bits_retain(1u32.checked_shl(index).unwrap_or(0))
    }
}

impl Default for Layer {
    fn default() -> Self {
        Layer::LAYER0
    }
}

/// Unique renderer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendererId(pub u64);

/// One drawable part of a renderer
#[derive(Debug, Clone)]
pub struct RendererElement {
    pub primitive: Arc<Primitive>,
    pub sub_mesh: Option<SubMesh>,
    pub material: Arc<Material>,
}

/// A renderable object in the scene
#[derive(Debug)]
pub struct Renderer {
    id: RendererId,
    pub transform: Transform,
    pub local_bounds: BoundingBox,
    pub layer: Layer,
    pub priority: i32,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub enabled: bool,
    pub elements: Vec<RendererElement>,
}

impl Renderer {
    pub fn new(transform: Transform) -> Self {
        Self {
            id: RendererId(NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed)),
            transform,
            local_bounds: BoundingBox::default(),
            layer: Layer::default(),
            priority: 0,
            cast_shadows: false,
            receive_shadows: true,
            enabled: true,
            elements: Vec::new(),
        }
    }

    /// Renderer drawing a whole primitive with one material.
    pub fn with_primitive(transform: Transform, primitive: Arc<Primitive>, material: Arc<Material>) -> Self {
        Self::new(transform).with_element(primitive, None, material)
    }

    /// Add a drawable part, growing the local bounds to include its primitive.
    pub fn with_element(
        mut self,
        primitive: Arc<Primitive>,
        sub_mesh: Option<SubMesh>,
        material: Arc<Material>,
    ) -> Self {
        self.local_bounds = if self.elements.is_empty() {
            primitive.bounds
        } else {
            self.local_bounds.merge(&primitive.bounds)
        };
        self.elements.push(RendererElement {
            primitive,
            sub_mesh,
            material,
        });
        self
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    pub fn id(&self) -> RendererId {
        self.id
    }

    pub fn world_bounds(&self) -> BoundingBox {
        self.local_bounds.transform(&self.transform.world_matrix())
    }
}
