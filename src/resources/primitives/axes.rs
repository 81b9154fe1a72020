use glam::{Vec3, Vec4};

use crate::resources::geometry::{Geometry, PrimitiveTopology};

/// Three unit-colored line segments along +X (red), +Y (green) and +Z (blue).
#[must_use]
pub fn create_axes(size: f32) -> Geometry {
    let positions = [
        Vec3::ZERO,
        Vec3::X * size,
        Vec3::ZERO,
        Vec3::Y * size,
        Vec3::ZERO,
        Vec3::Z * size,
    ];
    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    let green = Vec4::new(0.0, 1.0, 0.0, 1.0);
    let blue = Vec4::new(0.0, 0.0, 1.0, 1.0);
    let colors = [red, red, green, green, blue, blue];

    let mut geometry = Geometry::from_positions(&positions);
    geometry.name = "AxesHelper".to_string();
    geometry.topology = PrimitiveTopology::LineList;
    geometry.set_colors(&colors);
    geometry.compute_bounding_volume();
    geometry
}
