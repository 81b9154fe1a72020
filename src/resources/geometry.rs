use std::sync::Arc;

use glam::{Affine3A, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// Well-known attribute names.
pub mod attr {
    pub const POSITION: &str = "position";
    pub const NORMAL: &str = "normal";
    pub const UV: &str = "uv";
    pub const COLOR: &str = "color";
}

/// Element layout of an [`Attribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
}

impl VertexFormat {
    #[must_use]
    pub const fn size(self) -> u64 {
        match self {
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Uint32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    LineList,
    PointList,
}

/// CPU-side vertex data plus the metadata needed to read it back.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub data: Arc<Vec<u8>>,
    pub format: VertexFormat,
    pub count: u32,
    pub stride: u64,
}

impl Attribute {
    /// Creates a planar (non-interleaved) attribute from typed elements.
    pub fn new_planar<T: bytemuck::Pod>(data: &[T], format: VertexFormat) -> Self {
        Self {
            data: Arc::new(bytemuck::cast_slice(data).to_vec()),
            format,
            count: data.len() as u32,
            stride: std::mem::size_of::<T>() as u64,
        }
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Reads element `i` without alignment requirements on the backing bytes.
    pub fn read<T: bytemuck::Pod>(&self, i: u32) -> Option<T> {
        let size = std::mem::size_of::<T>();
        let start = (i as usize).checked_mul(self.stride as usize)?;
        let bytes = self.data.get(start..start + size)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn read_vec2(&self, i: u32) -> Option<Vec2> {
        if self.format != VertexFormat::Float32x2 {
            return None;
        }
        self.read::<[f32; 2]>(i).map(Vec2::from_array)
    }

    pub fn read_vec3(&self, i: u32) -> Option<Vec3> {
        if self.format != VertexFormat::Float32x3 {
            return None;
        }
        self.read::<[f32; 3]>(i).map(Vec3::from_array)
    }

    pub fn read_vec4(&self, i: u32) -> Option<Vec4> {
        if self.format != VertexFormat::Float32x4 {
            return None;
        }
        self.read::<[f32; 4]>(i).map(Vec4::from_array)
    }
}

// ============================================================================
// Bounding volumes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Tight box around `points`, `None` when the iterator is empty.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest extent along any axis.
    #[must_use]
    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Axis-aligned box enclosing the eight transformed corners.
    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for corner in corners {
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

// ============================================================================
// Geometry
// ============================================================================

#[derive(Debug, Clone)]
pub struct Geometry {
    pub uuid: Uuid,
    pub name: String,
    pub topology: PrimitiveTopology,

    attributes: FxHashMap<String, Attribute>,
    index_attribute: Option<Attribute>,

    bounding_box: Option<BoundingBox>,
    bounding_sphere: Option<BoundingSphere>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            topology: PrimitiveTopology::TriangleList,
            attributes: FxHashMap::default(),
            index_attribute: None,
            bounding_box: None,
            bounding_sphere: None,
        }
    }

    /// Shorthand for a geometry with a position attribute.
    #[must_use]
    pub fn from_positions(positions: &[Vec3]) -> Self {
        let mut geometry = Self::new();
        geometry.set_positions(positions);
        geometry
    }

    pub fn attributes(&self) -> &FxHashMap<String, Attribute> {
        &self.attributes
    }

    pub fn set_attribute(&mut self, name: &str, attribute: Attribute) {
        if name == attr::POSITION {
            self.bounding_box = None;
            self.bounding_sphere = None;
        }
        self.attributes.insert(name.to_string(), attribute);
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn set_positions(&mut self, positions: &[Vec3]) {
        self.set_attribute(attr::POSITION, Attribute::new_planar(positions, VertexFormat::Float32x3));
    }

    pub fn set_normals(&mut self, normals: &[Vec3]) {
        self.set_attribute(attr::NORMAL, Attribute::new_planar(normals, VertexFormat::Float32x3));
    }

    pub fn set_uvs(&mut self, uvs: &[Vec2]) {
        self.set_attribute(attr::UV, Attribute::new_planar(uvs, VertexFormat::Float32x2));
    }

    pub fn set_colors(&mut self, colors: &[Vec4]) {
        self.set_attribute(attr::COLOR, Attribute::new_planar(colors, VertexFormat::Float32x4));
    }

    pub fn set_indices(&mut self, indices: &[u32]) {
        self.index_attribute = Some(Attribute::new_planar(indices, VertexFormat::Uint32));
    }

    pub fn index_attribute(&self) -> Option<&Attribute> {
        self.index_attribute.as_ref()
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.attributes.get(attr::POSITION).map_or(0, |a| a.count)
    }

    /// Decoded index list, `None` for non-indexed geometry.
    #[must_use]
    pub fn indices(&self) -> Option<Vec<u32>> {
        let index = self.index_attribute.as_ref()?;
        Some((0..index.count).filter_map(|i| index.read::<u32>(i)).collect())
    }

    #[must_use]
    pub fn positions(&self) -> Vec<Vec3> {
        self.read_vec3_attribute(attr::POSITION)
    }

    #[must_use]
    pub fn normals(&self) -> Option<Vec<Vec3>> {
        self.has_attribute(attr::NORMAL)
            .then(|| self.read_vec3_attribute(attr::NORMAL))
    }

    fn read_vec3_attribute(&self, name: &str) -> Vec<Vec3> {
        self.attributes.get(name).map_or_else(Vec::new, |a| {
            (0..a.count).filter_map(|i| a.read_vec3(i)).collect()
        })
    }

    /// Approximate resident size of the attribute and index data.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        let attrs: usize = self.attributes.values().map(Attribute::byte_len).sum();
        attrs + self.index_attribute.as_ref().map_or(0, Attribute::byte_len)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box
    }

    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        self.bounding_sphere
    }

    /// Area-weighted smooth normals. Non-indexed geometry is read as a
    /// triangle soup. Points face away from their centroid (+Y when they
    /// sit on it). Line geometry is left untouched.
    pub fn compute_vertex_normals(&mut self) {
        match self.topology {
            PrimitiveTopology::TriangleList => {}
            PrimitiveTopology::PointList => return self.compute_point_normals(),
            PrimitiveTopology::LineList => return,
        }
        let positions = self.positions();
        if positions.is_empty() {
            return;
        }

        let count = positions.len();
        let mut normals = vec![Vec3::ZERO; count];
        let mut accumulate = |i0: usize, i1: usize, i2: usize| {
            if i0 >= count || i1 >= count || i2 >= count {
                return;
            }
            let (v0, v1, v2) = (positions[i0], positions[i1], positions[i2]);
            // Cross-product magnitude is twice the area, so larger faces weigh more.
            let face_normal = (v1 - v0).cross(v2 - v0);
            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        };

        match self.indices() {
            Some(indices) => {
                for tri in indices.chunks_exact(3) {
                    accumulate(tri[0] as usize, tri[1] as usize, tri[2] as usize);
                }
            }
            None => {
                for i in (0..count.saturating_sub(2)).step_by(3) {
                    accumulate(i, i + 1, i + 2);
                }
            }
        }

        for n in &mut normals {
            *n = n.normalize_or_zero();
        }
        self.set_normals(&normals);
    }

    fn compute_point_normals(&mut self) {
        let positions = self.positions();
        if positions.is_empty() {
            return;
        }
        let centroid = positions.iter().copied().sum::<Vec3>() / positions.len() as f32;
        let normals: Vec<Vec3> = positions
            .iter()
            .map(|&p| (p - centroid).try_normalize().unwrap_or(Vec3::Y))
            .collect();
        self.set_normals(&normals);
    }

    /// Computes the AABB and a bounding sphere centred on it.
    pub fn compute_bounding_volume(&mut self) {
        let positions = self.positions();
        let Some(bbox) = BoundingBox::from_points(positions.iter().copied()) else {
            self.bounding_box = None;
            self.bounding_sphere = None;
            return;
        };

        let center = bbox.center();
        let radius_sq = positions
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0_f32, f32::max);

        self.bounding_box = Some(bbox);
        self.bounding_sphere = Some(BoundingSphere {
            center,
            radius: radius_sq.sqrt(),
        });
    }
}
