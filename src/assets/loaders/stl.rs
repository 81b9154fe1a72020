use std::io::Cursor;

use glam::Vec3;

use crate::assets::loaders::{DecodeContext, root_name};
use crate::assets::prefab::Prefab;
use crate::errors::DecodeError;
use crate::resources::{Geometry, Material};

const FALLBACK_SPECULAR: u32 = 0x0011_1111;

/// STL decoder (ASCII and binary). Output is a non-indexed triangle soup.
#[derive(Debug, Clone, Copy, Default)]
pub struct StlLoader;

impl StlLoader {
    pub fn decode(&self, bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<Prefab, DecodeError> {
        let mesh = stl_io::read_stl(&mut Cursor::new(bytes)).map_err(DecodeError::Stl)?;

        let mut positions = Vec::with_capacity(mesh.faces.len() * 3);
        for face in &mesh.faces {
            for &index in &face.vertices {
                let v = mesh.vertices.get(index).ok_or_else(|| {
                    DecodeError::Malformed(format!("STL face references missing vertex {index}"))
                })?;
                positions.push(Vec3::new(v[0], v[1], v[2]));
            }
        }

        let mut geometry = Geometry::from_positions(&positions);
        geometry.name = "stl".to_string();
        geometry.compute_vertex_normals();

        let mut prefab = Prefab::new(root_name(ctx.locator));
        let material = prefab.assets.materials.add(Material::fallback(FALLBACK_SPECULAR));
        prefab.add_mesh_node(Prefab::ROOT, "stl", geometry, material);
        log::debug!("STL: {} triangles", mesh.faces.len());
        Ok(prefab)
    }
}
