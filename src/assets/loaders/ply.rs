//! Stanford PLY decoder (ASCII and binary).

use std::io::Cursor;

use glam::{Vec3, Vec4};
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};
use smallvec::SmallVec;

use crate::assets::loaders::{DecodeContext, root_name};
use crate::assets::prefab::Prefab;
use crate::errors::DecodeError;
use crate::resources::material::rgb_from_hex;
use crate::resources::{Geometry, Material, PrimitiveTopology};

const FALLBACK_SPECULAR: u32 = 0x0011_1111;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlyLoader;

impl PlyLoader {
    pub fn decode(&self, bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<Prefab, DecodeError> {
        let parser = Parser::<DefaultElement>::new();
        let ply = parser
            .read_ply(&mut Cursor::new(bytes))
            .map_err(DecodeError::Ply)?;

        let vertices = ply
            .payload
            .get("vertex")
            .ok_or_else(|| DecodeError::Malformed("PLY has no `vertex` element".to_string()))?;

        let mut positions = Vec::with_capacity(vertices.len());
        let mut colors = Vec::with_capacity(vertices.len());
        for (i, vertex) in vertices.iter().enumerate() {
            let coord = |key: &str| {
                vertex
                    .get(key)
                    .and_then(scalar)
                    .map(|v| v as f32)
                    .ok_or_else(|| DecodeError::Malformed(format!("PLY vertex {i} has no numeric `{key}`")))
            };
            positions.push(Vec3::new(coord("x")?, coord("y")?, coord("z")?));

            if let (Some(r), Some(g), Some(b)) = (
                vertex.get("red").and_then(channel),
                vertex.get("green").and_then(channel),
                vertex.get("blue").and_then(channel),
            ) {
                colors.push(Vec4::new(r, g, b, 1.0));
            }
        }

        let mut indices: Vec<u32> = Vec::new();
        if let Some(faces) = ply.payload.get("face") {
            for face in faces {
                let Some(list) = face.get("vertex_indices").or_else(|| face.get("vertex_index")) else {
                    continue;
                };
                let polygon = index_list(list);
                for k in 1..polygon.len().saturating_sub(1) {
                    indices.extend_from_slice(&[polygon[0], polygon[k], polygon[k + 1]]);
                }
            }
        }

        let vertex_count = positions.len();
        let mut geometry = Geometry::from_positions(&positions);
        geometry.name = "ply".to_string();
        if indices.is_empty() {
            geometry.topology = PrimitiveTopology::PointList;
        } else {
            if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(DecodeError::Malformed(format!(
                    "PLY face references vertex {bad}, only {vertex_count} vertices"
                )));
            }
            geometry.set_indices(&indices);
        }
        geometry.compute_vertex_normals();

        let has_colors = !colors.is_empty() && colors.len() == vertex_count;
        let material = if has_colors {
            geometry.set_colors(&colors);
            Material::new_phong(Vec4::ONE, rgb_from_hex(FALLBACK_SPECULAR), 30.0)
                .with_name("vertex_colors")
                .with_vertex_colors(true)
        } else {
            Material::fallback(FALLBACK_SPECULAR)
        };

        let mut prefab = Prefab::new(root_name(ctx.locator));
        let material = prefab.assets.materials.add(material);
        prefab.add_mesh_node(Prefab::ROOT, "ply", geometry, material);
        log::debug!(
            "PLY: {vertex_count} vertices, {} triangles, colors: {has_colors}",
            indices.len() / 3
        );
        Ok(prefab)
    }
}

fn scalar(property: &Property) -> Option<f64> {
    Some(match *property {
        Property::Char(v) => f64::from(v),
        Property::UChar(v) => f64::from(v),
        Property::Short(v) => f64::from(v),
        Property::UShort(v) => f64::from(v),
        Property::Int(v) => f64::from(v),
        Property::UInt(v) => f64::from(v),
        Property::Float(v) => f64::from(v),
        Property::Double(v) => v,
        _ => return None,
    })
}

/// Colour channel in `[0, 1]`: integer channels are 8-bit, floats as-is.
fn channel(property: &Property) -> Option<f32> {
    match *property {
        Property::UChar(v) => Some(f32::from(v) / 255.0),
        Property::Float(v) => Some(v),
        Property::Double(v) => Some(v as f32),
        ref other => scalar(other).map(|v| (v / 255.0) as f32),
    }
}

/// Polygon corner indices; most faces are triangles or quads.
fn index_list(property: &Property) -> SmallVec<[u32; 8]> {
    match property {
        Property::ListChar(v) => v.iter().map(|&i| i as u32).collect(),
        Property::ListUChar(v) => v.iter().map(|&i| u32::from(i)).collect(),
        Property::ListShort(v) => v.iter().map(|&i| i as u32).collect(),
        Property::ListUShort(v) => v.iter().map(|&i| u32::from(i)).collect(),
        Property::ListInt(v) => v.iter().map(|&i| i as u32).collect(),
        Property::ListUInt(v) => v.iter().copied().collect(),
        _ => SmallVec::new(),
    }
}
