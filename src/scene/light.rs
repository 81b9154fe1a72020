use glam::Vec3;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient,
    /// Parallel light shining from `direction` towards the origin.
    Directional { direction: Vec3 },
}

#[derive(Debug, Clone)]
pub struct Light {
    pub uuid: Uuid,
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
    pub cast_shadows: bool,
}

impl Light {
    #[must_use]
    pub fn new_ambient(color: Vec3, intensity: f32) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            color,
            intensity,
            kind: LightKind::Ambient,
            cast_shadows: false,
        }
    }

    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32, direction: Vec3) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            color,
            intensity,
            kind: LightKind::Directional {
                direction: direction.normalize_or(Vec3::NEG_Y),
            },
            cast_shadows: true,
        }
    }

    /// Soft ambient fill plus one shadow-casting key light.
    #[must_use]
    pub fn default_rig() -> Vec<Light> {
        vec![
            Self::new_ambient(Vec3::ONE, 0.6),
            Self::new_directional(Vec3::ONE, 1.0, Vec3::new(-1.0, -2.0, -1.5)),
        ]
    }
}
