//! Shared world transforms with change notification
//!
//! A [`Transform`] is a cheap, clonable handle: clones refer to the same
//! position/rotation/scale. Dependents that cache something derived from the
//! world matrix (a camera's view matrix) register an [`UpdateFlag`]; every
//! setter raises all registered flags, and the dependent lowers its flag when
//! it recomputes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use glam::{Mat3, Mat4, Quat, Vec3};
use parking_lot::RwLock;

#[derive(Debug)]
struct TransformState {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    next_flag_id: u64,
    flags: Vec<(u64, Arc<AtomicBool>)>,
}

impl TransformState {
    fn notify(&self) {
        for (_, flag) in &self.flags {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Shared transform handle
#[derive(Debug, Clone)]
pub struct Transform {
    state: Arc<RwLock<TransformState>>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_position_rotation_scale(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::from_position_rotation_scale(position, Quat::IDENTITY, Vec3::ONE)
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self::from_position_rotation_scale(position, rotation, Vec3::ONE)
    }

    pub fn from_position_rotation_scale(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            state: Arc::new(RwLock::new(TransformState {
                position,
                rotation,
                scale,
                next_flag_id: 0,
                flags: Vec::new(),
            })),
        }
    }

    /// Whether two handles refer to the same transform.
    pub fn ptr_eq(&self, other: &Transform) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn position(&self) -> Vec3 {
        self.state.read().position
    }

    pub fn rotation(&self) -> Quat {
        self.state.read().rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.state.read().scale
    }

    pub fn set_position(&self, position: Vec3) {
        let mut state = self.state.write();
        state.position = position;
        state.notify();
    }

    pub fn set_rotation(&self, rotation: Quat) {
        let mut state = self.state.write();
        state.rotation = rotation.normalize();
        state.notify();
    }

    pub fn set_scale(&self, scale: Vec3) {
        let mut state = self.state.write();
        state.scale = scale;
        state.notify();
    }

    /// Translate by an offset
    pub fn translate(&self, offset: Vec3) {
        let mut state = self.state.write();
        state.position += offset;
        state.notify();
    }

    /// Rotate around a world axis
    pub fn rotate_axis(&self, axis: Vec3, angle: f32) {
        let mut state = self.state.write();
        state.rotation = (Quat::from_axis_angle(axis, angle) * state.rotation).normalize();
        state.notify();
    }

    /// Orient local -Z towards `target`.
    pub fn look_at(&self, target: Vec3, up: Vec3) {
        let mut state = self.state.write();
        let forward = (target - state.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return;
        }
        let mut right = forward.cross(up).normalize_or_zero();
        if right == Vec3::ZERO {
            right = forward.any_orthonormal_vector();
        }
        let up = right.cross(forward);
        state.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward)).normalize();
        state.notify();
    }

    /// Model matrix
    pub fn world_matrix(&self) -> Mat4 {
        let state = self.state.read();
        Mat4::from_scale_rotation_translation(state.scale, state.rotation, state.position)
    }

    /// World matrix with scale stripped
    pub fn rotation_translation_matrix(&self) -> Mat4 {
        let state = self.state.read();
        Mat4::from_rotation_translation(state.rotation, state.position)
    }

    /// Forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }

    /// Right direction (local +X in world space)
    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    /// Up direction (local +Y in world space)
    pub fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }

    /// Subscribe to world matrix changes.
    ///
    /// The returned flag starts raised so the first read computes.
    pub fn register_world_change_flag(&self) -> UpdateFlag {
        let flag = Arc::new(AtomicBool::new(true));
        let mut state = self.state.write();
        let id = state.next_flag_id;
        state.next_flag_id += 1;
        state.flags.push((id, flag.clone()));
        UpdateFlag {
            id,
            flag,
            registry: Some(Arc::downgrade(&self.state)),
        }
    }

    /// Number of live subscriptions
    pub fn change_flag_count(&self) -> usize {
        self.state.read().flags.len()
    }
}

/// Subscription to a transform's world changes
///
/// Disposing (explicitly or by dropping) unregisters it. Disposal is
/// idempotent.
#[derive(Debug)]
pub struct UpdateFlag {
    id: u64,
    flag: Arc<AtomicBool>,
    registry: Option<Weak<RwLock<TransformState>>>,
}

impl UpdateFlag {
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Lower the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    /// Raise the flag manually.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.registry.is_none()
    }

    pub fn dispose(&mut self) {
        let Some(registry) = self.registry.take() else {
            return;
        };
        if let Some(state) = registry.upgrade() {
            state.write().flags.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for UpdateFlag {
    fn drop(&mut self) {
        self.dispose();
    }
}
