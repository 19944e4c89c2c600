//! Materials as seen by the render core
//!
//! Shader compilation and binding live in the material system; the core only
//! needs a material's identity, the queue it belongs to, its fixed-function
//! state and the shader variant (name + macros) to request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::backend::types::RenderState;
use crate::pipeline::{RenderContext, RenderElement};
use crate::shader_data::{ShaderData, ShaderProperty};
use crate::shadow::SHADOW_MAP_COUNT_MACRO;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Alpha cutoff used by alpha-tested materials
pub const ALPHA_CUTOFF: ShaderProperty = ShaderProperty::new("u_alphaCutoff");

/// Unique material identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// Queue a material's elements are sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderQueueType {
    #[default]
    Opaque,
    AlphaTest,
    Transparent,
}

/// Shader variant and state resolved for one draw
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMaterial {
    pub shader: String,
    pub render_state: RenderState,
    pub macros: Vec<String>,
}

/// Material description
#[derive(Debug, Clone)]
pub struct Material {
    id: MaterialId,
    pub name: String,
    pub shader: String,
    pub queue_type: RenderQueueType,
    pub render_state: RenderState,
    pub shader_data: ShaderData,
}

impl Material {
    pub fn new(name: &str, shader: &str) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            shader: shader.to_string(),
            queue_type: RenderQueueType::Opaque,
            render_state: RenderState::opaque(),
            shader_data: ShaderData::new(),
        }
    }

    /// Opaque material using the default lit shader
    pub fn opaque(name: &str) -> Self {
        Self::new(name, "pbr")
    }

    /// Alpha-tested material discarding fragments below `cutoff`
    pub fn alpha_test(name: &str, cutoff: f32) -> Self {
        let mut material = Self::new(name, "pbr").with_queue_type(RenderQueueType::AlphaTest);
        material.shader_data.set_float(ALPHA_CUTOFF, cutoff);
        material.shader_data.enable_macro("ALPHA_CUTOFF", None);
        material
    }

    /// Alpha-blended material
    pub fn transparent(name: &str) -> Self {
        Self::new(name, "pbr").with_queue_type(RenderQueueType::Transparent)
    }

    /// Shared depth-only material used to render shadow casters.
    pub fn shadow_caster() -> Arc<Material> {
        static SHADOW_CASTER: OnceLock<Arc<Material>> = OnceLock::new();
        SHADOW_CASTER
            .get_or_init(|| {
                Arc::new(
                    Material::new("shadow-caster", "shadow-map")
                        .with_render_state(RenderState::depth_only()),
                )
            })
            .clone()
    }

    /// Set the queue type, switching to the matching default render state.
    pub fn with_queue_type(mut self, queue_type: RenderQueueType) -> Self {
        self.queue_type = queue_type;
        self.render_state = match queue_type {
            RenderQueueType::Opaque | RenderQueueType::AlphaTest => RenderState::opaque(),
            RenderQueueType::Transparent => RenderState::transparent(),
        };
        self
    }

    pub fn with_render_state(mut self, render_state: RenderState) -> Self {
        self.render_state = render_state;
        self
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Resolve the shader variant for drawing `element` in `context`.
    ///
    /// Macros are the union of the scene-global and material macros. Elements
    /// whose renderer does not receive shadows never get the shadow macro.
    pub fn prepare_drawing(&self, context: &RenderContext, element: &RenderElement) -> PreparedMaterial {
        let mut macros: Vec<String> = context
            .shader_data
            .macro_list()
            .filter(|m| element.receive_shadows || !m.starts_with(SHADOW_MAP_COUNT_MACRO))
            .chain(self.shader_data.macro_list())
            .collect();
        macros.sort();
        macros.dedup();

        PreparedMaterial {
            shader: self.shader.clone(),
            render_state: self.render_state,
            macros,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_type_switches_render_state() {
        let material = Material::transparent("glass");
        assert_eq!(material.queue_type, RenderQueueType::Transparent);
        assert!(material.render_state.blend.is_some());
        assert!(!material.render_state.depth_write);
    }

    #[test]
    fn test_alpha_test_cutoff() {
        let material = Material::alpha_test("leaves", 0.3);
        assert_eq!(material.shader_data.float(ALPHA_CUTOFF), Some(0.3));
        assert!(material.shader_data.has_macro("ALPHA_CUTOFF"));
    }

    #[test]
    fn test_shadow_caster_is_shared() {
        let a = Material::shadow_caster();
        let b = Material::shadow_caster();
        assert_eq!(a.id(), b.id());
        assert!(!a.render_state.color_write);
    }
}
