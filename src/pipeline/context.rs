//! Per-frame render context

use glam::{Mat4, Vec3};

use crate::backend::types::CameraUniform;
use crate::math::safe_inverse;
use crate::scene::Camera;
use crate::shader_data::ShaderData;

/// The point of view draws are recorded from
///
/// Usually the camera's, but the shadow caster substitutes a virtual light
/// camera per cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderView {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub position: Vec3,
}

impl RenderView {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            position: safe_inverse(view).w_axis.truncate(),
        }
    }

    pub fn from_camera(camera: &Camera) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        Self {
            view,
            projection,
            view_projection: projection * view,
            position: camera.position(),
        }
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            view: self.view,
            proj: self.projection,
            view_proj: self.view_projection,
            position: self.position.extend(1.0),
        }
    }
}

/// Context for recording draws
pub struct RenderContext<'a> {
    pub view: RenderView,
    /// Scene-global shader values and macros
    pub shader_data: &'a ShaderData,
    /// Coalesce adjacent compatible elements into instanced draws
    pub batching: bool,
}

impl<'a> RenderContext<'a> {
    pub fn new(view: RenderView, shader_data: &'a ShaderData, batching: bool) -> Self {
        Self {
            view,
            shader_data,
            batching,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_position_from_matrix() {
        let view = Mat4::look_at_rh(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y);
        let render_view = RenderView::new(view, Mat4::IDENTITY);
        assert!(render_view.position.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
    }
}
