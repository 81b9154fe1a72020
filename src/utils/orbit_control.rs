use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::scene::transform::Transform;

const PHI_EPS: f32 = 0.0001;

/// Orbit camera around a target point.
///
/// Input arrives as deltas (`rotate`, `zoom`, `pan`) from whatever host
/// surface owns the pointer; [`OrbitControls::update`] applies them with
/// optional damping and writes the resulting pose into a [`Transform`].
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub damping_factor: f32,
    pub enable_damping: bool,
    pub min_distance: f32,
    pub max_distance: f32,

    pub target: Vec3,
    pub radius: f32,
    /// Azimuth around +Y, measured from +Z.
    pub theta: f32,
    /// Polar angle from +Y.
    pub phi: f32,

    rotate_delta: Vec2,
    pan_delta: Vec3,
    zoom_steps: f32,
}

impl OrbitControls {
    #[must_use]
    pub fn new(target: Vec3, radius: f32) -> Self {
        Self {
            rotate_speed: 1.0,
            zoom_speed: 0.05,
            pan_speed: 1.0,
            damping_factor: 0.05,
            enable_damping: true,
            min_distance: 0.001,
            max_distance: 1000.0,
            target,
            radius,
            theta: 0.0,
            phi: PI / 2.0,
            rotate_delta: Vec2::ZERO,
            pan_delta: Vec3::ZERO,
            zoom_steps: 0.0,
        }
    }

    /// Controls looking at `target` from `position`.
    #[must_use]
    pub fn from_position(position: Vec3, target: Vec3) -> Self {
        let mut controls = Self::new(target, 1.0);
        controls.set_position(position);
        controls
    }

    /// Moves the orbit centre, keeping the current spherical offset.
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.pan_delta = Vec3::ZERO;
    }

    /// Re-derives radius and angles so the camera sits at `position`.
    pub fn set_position(&mut self, position: Vec3) {
        let offset = position - self.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }
        // Keep the fitted distance reachable.
        self.max_distance = self.max_distance.max(radius * 2.0);
        self.radius = radius;
        self.theta = offset.x.atan2(offset.z);
        self.phi = (offset.y / radius).clamp(-1.0, 1.0).acos().clamp(PHI_EPS, PI - PHI_EPS);
        self.rotate_delta = Vec2::ZERO;
        self.zoom_steps = 0.0;
    }

    /// Queues a rotation in radians (azimuth, polar).
    pub fn rotate(&mut self, delta: Vec2) {
        self.rotate_delta -= delta * self.rotate_speed;
    }

    /// Queues zoom steps; positive values dolly in.
    pub fn zoom(&mut self, steps: f32) {
        self.zoom_steps += steps;
    }

    /// Queues a screen-space pan, in fractions of the view height.
    pub fn pan(&mut self, delta: Vec2, fov: f32) {
        let view_height = 2.0 * self.radius * (fov / 2.0).tan();
        let forward = -self.offset_direction();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        self.pan_delta += (right * -delta.x + up * delta.y) * view_height * self.pan_speed;
    }

    fn offset_direction(&self) -> Vec3 {
        Vec3::new(
            self.phi.sin() * self.theta.sin(),
            self.phi.cos(),
            self.phi.sin() * self.theta.cos(),
        )
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.target + self.offset_direction() * self.radius
    }

    /// Applies queued input and writes the camera pose into `transform`.
    pub fn update(&mut self, transform: &mut Transform, dt: f32) {
        let (rotate, pan) = if self.enable_damping {
            // Exponential decay normalised to 60 fps.
            let retention = (1.0 - self.damping_factor).powf(dt * 60.0);
            let applied = (self.rotate_delta * (1.0 - retention), self.pan_delta * (1.0 - retention));
            self.rotate_delta *= retention;
            self.pan_delta *= retention;
            applied
        } else {
            let applied = (self.rotate_delta, self.pan_delta);
            self.rotate_delta = Vec2::ZERO;
            self.pan_delta = Vec3::ZERO;
            applied
        };

        self.theta += rotate.x;
        self.phi = (self.phi + rotate.y).clamp(PHI_EPS, PI - PHI_EPS);
        self.target += pan;

        if self.zoom_steps != 0.0 {
            let scale = (1.0 - self.zoom_speed).powf(self.zoom_steps.abs());
            if self.zoom_steps > 0.0 {
                self.radius *= scale;
            } else {
                self.radius /= scale;
            }
            self.zoom_steps = 0.0;
        }
        self.radius = self.radius.clamp(self.min_distance, self.max_distance);

        transform.position = self.position();
        transform.look_at(self.target, Vec3::Y);
    }
}
