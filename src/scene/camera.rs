//! Camera system
//!
//! Matrices are cached and recomputed lazily:
//!
//! * the view matrix when the owning transform raised its change flag;
//! * the projection when a projection parameter or the surface size changed;
//! * inverses and the frustum when one of their sources was recomputed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::traits::GraphicsDevice;
use crate::backend::types::ClearFlags;
use crate::cached::Cached;
use crate::math::{safe_inverse, BoundingFrustum, Ray};
use crate::resources::RenderTarget;
use crate::scene::{Layer, Scene, Transform, UpdateFlag};

static NEXT_CAMERA_ID: AtomicU64 = AtomicU64::new(1);

/// Unique camera identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u64);

/// Camera for viewing the scene
#[derive(Debug)]
pub struct Camera {
    id: CameraId,
    transform: Transform,
    transform_flag: UpdateFlag,

    near: f32,
    far: f32,
    fov: f32,
    orthographic: bool,
    orthographic_size: f32,
    viewport: Vec4,
    custom_aspect: Option<f32>,
    custom_projection: Option<Mat4>,
    surface_size: (u32, u32),
    render_target: Option<Arc<RenderTarget>>,

    pub priority: i32,
    pub clear_flags: ClearFlags,
    /// Clear color, `None` uses the scene background
    pub background: Option<Vec4>,
    pub culling_mask: Layer,
    pub enable_frustum_culling: bool,

    view: Cached<Mat4>,
    projection: Cached<Mat4>,
    inverse_view: Cached<Mat4>,
    inverse_projection: Cached<Mat4>,
    inverse_view_projection: Cached<Mat4>,
    frustum: Cached<BoundingFrustum>,

    active: bool,
}

impl Camera {
    pub fn new(transform: Transform) -> Self {
        let transform_flag = transform.register_world_change_flag();
        Self {
            id: CameraId(NEXT_CAMERA_ID.fetch_add(1, Ordering::Relaxed)),
            transform,
            transform_flag,
            near: 0.1,
            far: 100.0,
            fov: 45.0,
            orthographic: false,
            orthographic_size: 10.0,
            viewport: Vec4::new(0.0, 0.0, 1.0, 1.0),
            custom_aspect: None,
            custom_projection: None,
            surface_size: (1, 1),
            render_target: None,
            priority: 0,
            clear_flags: ClearFlags::DEPTH_COLOR,
            background: None,
            culling_mask: Layer::EVERYTHING,
            enable_frustum_culling: true,
            view: Cached::new(Mat4::IDENTITY),
            projection: Cached::new(Mat4::IDENTITY),
            inverse_view: Cached::new(Mat4::IDENTITY),
            inverse_projection: Cached::new(Mat4::IDENTITY),
            inverse_view_projection: Cached::new(Mat4::IDENTITY),
            frustum: Cached::new(BoundingFrustum::default()),
            active: false,
        }
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    // Projection parameters

    pub fn near_clip_plane(&self) -> f32 {
        self.near
    }

    pub fn set_near_clip_plane(&mut self, near: f32) {
        if self.near != near {
            self.near = near;
            self.invalidate_projection();
        }
    }

    pub fn far_clip_plane(&self) -> f32 {
        self.far
    }

    pub fn set_far_clip_plane(&mut self, far: f32) {
        if self.far != far {
            self.far = far;
            self.invalidate_projection();
        }
    }

    /// Vertical field of view in degrees
    pub fn field_of_view(&self) -> f32 {
        self.fov
    }

    pub fn set_field_of_view(&mut self, fov: f32) {
        if self.fov != fov {
            self.fov = fov;
            self.invalidate_projection();
        }
    }

    pub fn is_orthographic(&self) -> bool {
        self.orthographic
    }

    pub fn set_orthographic(&mut self, orthographic: bool) {
        if self.orthographic != orthographic {
            self.orthographic = orthographic;
            self.invalidate_projection();
        }
    }

    /// Half height of the orthographic view volume
    pub fn orthographic_size(&self) -> f32 {
        self.orthographic_size
    }

    pub fn set_orthographic_size(&mut self, size: f32) {
        if self.orthographic_size != size {
            self.orthographic_size = size;
            self.invalidate_projection();
        }
    }

    /// Normalized viewport `(x, y, width, height)`
    pub fn viewport(&self) -> Vec4 {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Vec4) {
        if self.viewport != viewport {
            self.viewport = viewport;
            if self.custom_aspect.is_none() {
                self.invalidate_projection();
            }
        }
    }

    /// Width over height of the rendered area
    pub fn aspect_ratio(&self) -> f32 {
        if let Some(aspect) = self.custom_aspect {
            return aspect;
        }
        let (width, height) = self.surface_size;
        let denominator = height as f32 * self.viewport.w;
        if denominator == 0.0 {
            return 1.0;
        }
        width as f32 * self.viewport.z / denominator
    }

    /// Override the aspect ratio until [`Camera::reset_aspect_ratio`].
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if self.custom_aspect != Some(aspect) {
            self.custom_aspect = Some(aspect);
            self.invalidate_projection();
        }
    }

    pub fn reset_aspect_ratio(&mut self) {
        if self.custom_aspect.take().is_some() {
            self.invalidate_projection();
        }
    }

    /// Override the projection matrix until [`Camera::reset_projection_matrix`].
    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        self.custom_projection = Some(projection);
        self.invalidate_projection();
    }

    pub fn reset_projection_matrix(&mut self) {
        if self.custom_projection.take().is_some() {
            self.invalidate_projection();
        }
    }

    /// Size of the surface the camera renders to, in pixels
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    /// Record the backing surface size; the projection is only invalidated on change.
    pub fn update_surface_size(&mut self, width: u32, height: u32) {
        if self.surface_size != (width, height) {
            self.surface_size = (width, height);
            if self.custom_aspect.is_none() {
                self.invalidate_projection();
            }
        }
    }

    pub fn render_target(&self) -> Option<&Arc<RenderTarget>> {
        self.render_target.as_ref()
    }

    /// Render into `target`, or to the screen with `None`.
    pub fn set_render_target(&mut self, target: Option<Arc<RenderTarget>>) {
        if let Some(target) = &target {
            self.update_surface_size(target.width(), target.height());
        }
        self.render_target = target;
    }

    fn invalidate_projection(&self) {
        self.projection.invalidate();
        self.inverse_projection.invalidate();
        self.inverse_view_projection.invalidate();
        self.frustum.invalidate();
    }

    fn sync_view(&self) {
        if self.transform_flag.take() {
            self.view.invalidate();
            self.inverse_view.invalidate();
            self.inverse_view_projection.invalidate();
            self.frustum.invalidate();
        }
    }

    // Matrices

    /// World to view space
    pub fn view_matrix(&self) -> Mat4 {
        self.sync_view();
        self.view
            .get_or_update(|| safe_inverse(self.transform.rotation_translation_matrix()))
    }

    /// View to clip space (depth range [0, 1])
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.get_or_update(|| {
            if let Some(projection) = self.custom_projection {
                return projection;
            }
            let aspect = self.aspect_ratio();
            if self.orthographic {
                let width = self.orthographic_size * aspect;
                Mat4::orthographic_rh(
                    -width,
                    width,
                    -self.orthographic_size,
                    self.orthographic_size,
                    self.near,
                    self.far,
                )
            } else {
                Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
            }
        })
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn inverse_view_matrix(&self) -> Mat4 {
        let view = self.view_matrix();
        self.inverse_view.get_or_update(|| safe_inverse(view))
    }

    pub fn inverse_projection_matrix(&self) -> Mat4 {
        let projection = self.projection_matrix();
        self.inverse_projection.get_or_update(|| safe_inverse(projection))
    }

    pub fn inverse_view_projection_matrix(&self) -> Mat4 {
        let view_projection = self.view_projection_matrix();
        self.inverse_view_projection
            .get_or_update(|| safe_inverse(view_projection))
    }

    /// World-space view frustum
    pub fn frustum(&self) -> BoundingFrustum {
        let view_projection = self.view_projection_matrix();
        self.frustum
            .get_or_update(|| BoundingFrustum::from_matrix(&view_projection))
    }

    /// Number of view matrix recomputations so far
    pub fn view_recompute_count(&self) -> u32 {
        self.view.recompute_count()
    }

    /// Number of projection matrix recomputations so far
    pub fn projection_recompute_count(&self) -> u32 {
        self.projection.recompute_count()
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position()
    }

    pub fn forward(&self) -> Vec3 {
        self.transform.forward()
    }

    // Conversions

    /// World point to viewport space: xy in [0, 1] from the top left, z the view depth.
    pub fn world_to_viewport_point(&self, point: Vec3) -> Vec3 {
        let clip = self.view_projection_matrix() * point.extend(1.0);
        let depth = -self.view_matrix().transform_point3(point).z;
        if clip.w == 0.0 {
            return Vec3::new(0.5, 0.5, depth);
        }
        let ndc = clip.truncate() / clip.w;
        Vec3::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5, depth)
    }

    /// Viewport point (z = view depth) to world space.
    pub fn viewport_to_world_point(&self, point: Vec3) -> Vec3 {
        let inverse_projection = self.inverse_projection_matrix();
        let ndc = Vec2::new(point.x * 2.0 - 1.0, 1.0 - point.y * 2.0);
        let near = inverse_projection.project_point3(ndc.extend(0.0));
        let far = inverse_projection.project_point3(ndc.extend(1.0));

        let span = far.z - near.z;
        let t = if span == 0.0 {
            0.0
        } else {
            (-point.z - near.z) / span
        };
        let view_point = near + (far - near) * t;
        self.inverse_view_matrix().transform_point3(view_point)
    }

    /// Ray from the near plane through a viewport point.
    pub fn viewport_point_to_ray(&self, point: Vec2) -> Ray {
        let inverse_view_projection = self.inverse_view_projection_matrix();
        let ndc = Vec2::new(point.x * 2.0 - 1.0, 1.0 - point.y * 2.0);
        let near = inverse_view_projection.project_point3(ndc.extend(0.0));
        let far = inverse_view_projection.project_point3(ndc.extend(1.0));
        Ray::new(near, far - near)
    }

    /// Screen pixel position to viewport space; z passes through.
    pub fn screen_to_viewport_point(&self, point: Vec3) -> Vec3 {
        let (width, height) = self.surface_size;
        let vp = self.viewport;
        Vec3::new(
            (point.x / width.max(1) as f32 - vp.x) / vp.z,
            (point.y / height.max(1) as f32 - vp.y) / vp.w,
            point.z,
        )
    }

    /// Viewport point to screen pixels; z passes through.
    pub fn viewport_to_screen_point(&self, point: Vec3) -> Vec3 {
        let (width, height) = self.surface_size;
        let vp = self.viewport;
        Vec3::new(
            (point.x * vp.z + vp.x) * width.max(1) as f32,
            (point.y * vp.w + vp.y) * height.max(1) as f32,
            point.z,
        )
    }

    pub fn world_to_screen_point(&self, point: Vec3) -> Vec3 {
        self.viewport_to_screen_point(self.world_to_viewport_point(point))
    }

    pub fn screen_to_world_point(&self, point: Vec3) -> Vec3 {
        self.viewport_to_world_point(self.screen_to_viewport_point(point))
    }

    pub fn screen_point_to_ray(&self, point: Vec2) -> Ray {
        let viewport = self.screen_to_viewport_point(point.extend(0.0));
        self.viewport_point_to_ray(viewport.truncate())
    }

    // Lifecycle

    /// The camera became active: it renders with the scene from now on.
    pub fn on_active(&mut self, scene: &mut Scene) {
        if !self.active {
            self.active = true;
            scene.attach_camera(self.id, self.priority);
        }
    }

    pub fn on_inactive(&mut self, scene: &mut Scene) {
        if self.active {
            self.active = false;
            scene.detach_camera(self.id);
        }
    }

    /// Detach from the scene and drop the change subscription.
    ///
    /// The render target is destroyed when this camera held the last
    /// reference to it; shared targets stay alive for their other owners.
    pub fn on_destroy(&mut self, scene: &mut Scene, device: &mut dyn GraphicsDevice) {
        self.on_inactive(scene);
        self.transform_flag.dispose();
        if let Some(target) = self.render_target.take().and_then(Arc::into_inner) {
            target.destroy(device);
        }
    }
}
