//! Light types for the scene

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Shadow filtering mode of a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowType {
    /// No shadows
    #[default]
    None,
    Hard,
    SoftLow,
    SoftHigh,
}

/// Point light
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub enabled: bool,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            enabled: true,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            radius,
            enabled: true,
        }
    }

    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: self.position.extend(self.radius),
            color_intensity: self.color.extend(self.intensity),
            direction_type: Vec4::new(0.0, 0.0, 0.0, 0.0), // type 0 = point
            spot_params: Vec4::ZERO,
        }
    }
}

/// Spot light
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32, // radians
    pub outer_angle: f32, // radians
    pub enabled: bool,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
            enabled: true,
        }
    }
}

impl SpotLight {
    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: self.position.extend(self.radius),
            color_intensity: self.color.extend(self.intensity),
            direction_type: self.direction.normalize_or_zero().extend(1.0), // type 1 = spot
            spot_params: Vec4::new(self.inner_angle.cos(), self.outer_angle.cos(), 0.0, 0.0),
        }
    }
}

/// Directional light (the sun)
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub enabled: bool,
    pub shadow_type: ShadowType,
    /// 0 = no darkening, 1 = fully dark
    pub shadow_strength: f32,
    /// Depth bias in shadow-map texels
    pub shadow_bias: f32,
    /// Normal offset in shadow-map texels
    pub shadow_normal_bias: f32,
    /// Distance the light camera is pulled back beyond the cascade sphere
    pub shadow_near_plane: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            enabled: true,
            shadow_type: ShadowType::None,
            shadow_strength: 1.0,
            shadow_bias: 1.0,
            shadow_normal_bias: 1.0,
            shadow_near_plane: 0.1,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
            ..Default::default()
        }
    }

    pub fn with_shadows(mut self, shadow_type: ShadowType) -> Self {
        self.shadow_type = shadow_type;
        self
    }

    /// Whether the light currently produces a shadow map
    pub fn casts_shadows(&self) -> bool {
        self.enabled && self.shadow_type != ShadowType::None && self.shadow_strength > 0.0
    }

    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: Vec4::new(0.0, 0.0, 0.0, f32::INFINITY),
            color_intensity: self.color.extend(self.intensity),
            direction_type: self.direction.extend(2.0), // type 2 = directional
            spot_params: Vec4::ZERO,
        }
    }
}

/// Any scene light
#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    pub fn is_enabled(&self) -> bool {
        match self {
            Light::Directional(l) => l.enabled,
            Light::Point(l) => l.enabled,
            Light::Spot(l) => l.enabled,
        }
    }

    pub fn to_gpu_data(&self) -> GpuLightData {
        match self {
            Light::Directional(l) => l.to_gpu_data(),
            Light::Point(l) => l.to_gpu_data(),
            Light::Spot(l) => l.to_gpu_data(),
        }
    }
}

/// GPU-friendly light data structure
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position, w = radius
    pub position: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = light type (0=point, 1=spot, 2=directional)
    pub direction_type: Vec4,
    /// x = cos(inner_angle), y = cos(outer_angle), zw = unused
    pub spot_params: Vec4,
}

impl GpuLightData {
    pub fn to_vec4s(&self) -> [Vec4; 4] {
        [
            self.position,
            self.color_intensity,
            self.direction_type,
            self.spot_params,
        ]
    }
}
