use glam::{Vec3, Vec4};

use crate::resources::geometry::{Geometry, PrimitiveTopology};
use crate::resources::material::rgb_from_hex;

pub struct GridOptions {
    pub size: f32,
    pub divisions: u32,
    pub center_color: u32,
    pub line_color: u32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            size: 10.0,
            divisions: 10,
            center_color: 0x0044_4444,
            line_color: 0x0088_8888,
        }
    }
}

/// Square line grid on the XZ plane, centred on the origin.
#[must_use]
pub fn create_grid(options: &GridOptions) -> Geometry {
    let divisions = options.divisions.max(1);
    let step = options.size / divisions as f32;
    let half = options.size / 2.0;
    let center = divisions / 2;

    let center_color = rgb_from_hex(options.center_color).extend(1.0);
    let line_color = rgb_from_hex(options.line_color).extend(1.0);

    let mut positions = Vec::with_capacity((divisions as usize + 1) * 4);
    let mut colors: Vec<Vec4> = Vec::with_capacity(positions.capacity());

    for i in 0..=divisions {
        let k = -half + i as f32 * step;
        positions.extend_from_slice(&[
            Vec3::new(-half, 0.0, k),
            Vec3::new(half, 0.0, k),
            Vec3::new(k, 0.0, -half),
            Vec3::new(k, 0.0, half),
        ]);
        let color = if i == center { center_color } else { line_color };
        colors.extend_from_slice(&[color; 4]);
    }

    let mut geometry = Geometry::from_positions(&positions);
    geometry.name = "GridHelper".to_string();
    geometry.topology = PrimitiveTopology::LineList;
    geometry.set_colors(&colors);
    geometry.compute_bounding_volume();
    geometry
}
