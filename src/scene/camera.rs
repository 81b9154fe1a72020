use glam::{Affine3A, Mat4, Vec3};

/// Perspective camera. The pose lives in a separate [`Transform`].
///
/// [`Transform`]: crate::scene::Transform
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,

    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
    pub(crate) view_projection_matrix: Mat4,
}

impl PerspectiveCamera {
    /// `fov_degrees` is the vertical field of view.
    #[must_use]
    pub fn new(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    #[must_use]
    pub fn fov_degrees(&self) -> f32 {
        self.fov.to_degrees()
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
            self.update_projection_matrix();
        }
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
    }

    /// View matrix = inverse of the camera's world matrix.
    pub fn update_view_projection(&mut self, world: &Affine3A) {
        self.view_matrix = Mat4::from(*world).inverse();
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
    }

    /// Distance at which a sphere-ish object of extent `max_dim` fills the
    /// vertical field of view.
    #[must_use]
    pub fn fit_distance(&self, max_dim: f32) -> f32 {
        max_dim / (2.0 * (self.fov / 2.0).tan())
    }

    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[must_use]
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    #[must_use]
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection_matrix
    }

    /// Projects a world-space point to normalized device coordinates.
    #[must_use]
    pub fn project(&self, point: Vec3) -> Vec3 {
        self.view_projection_matrix.project_point3(point)
    }
}
