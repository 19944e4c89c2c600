//! Shadow configuration

use crate::error::{RenderError, RenderResult};

/// Shadow atlas resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowResolution {
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl ShadowResolution {
    pub fn pixels(&self) -> u32 {
        match self {
            ShadowResolution::Low => 512,
            ShadowResolution::Medium => 1024,
            ShadowResolution::High => 2048,
            ShadowResolution::VeryHigh => 4096,
        }
    }
}

/// Number of cascades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowCascades {
    One,
    #[default]
    Two,
    Four,
}

impl ShadowCascades {
    pub fn count(&self) -> usize {
        match self {
            ShadowCascades::One => 1,
            ShadowCascades::Two => 2,
            ShadowCascades::Four => 4,
        }
    }
}

/// How the shadow distance is divided between cascades
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CascadeSplits {
    /// Blend of logarithmic and uniform splits, `lambda` = 1 is fully logarithmic
    Practical { lambda: f32 },
    /// Explicit split points as fractions of the shadow distance.
    ///
    /// Two cascades use the first ratio, four cascades all three.
    Ratios([f32; 3]),
}

impl Default for CascadeSplits {
    fn default() -> Self {
        CascadeSplits::Practical { lambda: 0.7 }
    }
}

/// Shadow settings
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    pub enabled: bool,
    pub resolution: ShadowResolution,
    pub cascades: ShadowCascades,
    pub splits: CascadeSplits,
    /// Maximum distance from the camera that receives shadows
    pub distance: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: ShadowResolution::default(),
            cascades: ShadowCascades::default(),
            splits: CascadeSplits::default(),
            distance: 50.0,
        }
    }
}

impl ShadowSettings {
    pub fn validate(&self) -> RenderResult<()> {
        if !(self.distance > 0.0) {
            return Err(RenderError::InvalidConfiguration(format!(
                "shadow distance must be positive, got {}",
                self.distance
            )));
        }
        match self.splits {
            CascadeSplits::Practical { lambda } if !(0.0..=1.0).contains(&lambda) => {
                Err(RenderError::InvalidConfiguration(format!(
                    "cascade split lambda must be in [0, 1], got {}",
                    lambda
                )))
            }
            CascadeSplits::Ratios(ratios) => {
                let used = &ratios[..self.cascades.count() - 1];
                let mut previous = 0.0;
                for &ratio in used {
                    if !(ratio > previous && ratio < 1.0) {
                        return Err(RenderError::InvalidConfiguration(format!(
                            "cascade split ratios must increase within (0, 1), got {:?}",
                            used
                        )));
                    }
                    previous = ratio;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ratios() {
        let mut settings = ShadowSettings {
            cascades: ShadowCascades::Four,
            splits: CascadeSplits::Ratios([0.1, 0.3, 0.6]),
            ..Default::default()
        };
        assert!(settings.validate().is_ok());

        settings.splits = CascadeSplits::Ratios([0.3, 0.2, 0.6]);
        assert!(settings.validate().is_err());

        // Unused ratios are ignored.
        settings.cascades = ShadowCascades::Two;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_distance_and_lambda() {
        let settings = ShadowSettings {
            distance: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = ShadowSettings {
            splits: CascadeSplits::Practical { lambda: 1.5 },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
