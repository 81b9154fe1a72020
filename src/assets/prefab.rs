use glam::Affine3A;
use rustc_hash::FxHashSet;

use crate::animation::clip::AnimationClip;
use crate::assets::storage::AssetStore;
use crate::resources::{BoundingBox, Geometry, MaterialHandle, Mesh, Side};
use crate::scene::transform::Transform;

/// Prefab node: plain data, hierarchy expressed as indices into `Prefab::nodes`.
#[derive(Debug, Clone, Default)]
pub struct PrefabNode {
    pub name: String,
    pub transform: Transform,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub mesh: Option<Mesh>,
}

impl PrefabNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }
}

/// Decoder output: a detached node tree plus the resources it references.
///
/// A prefab has exactly one root (index [`Prefab::ROOT`]). Nodes are
/// appended after their parent, so index order is a valid top-down
/// traversal. It holds no scene handles; [`Scene::instantiate`] moves it
/// into a live scene.
///
/// [`Scene::instantiate`]: crate::scene::Scene::instantiate
#[derive(Debug, Clone)]
pub struct Prefab {
    pub nodes: Vec<PrefabNode>,
    pub assets: AssetStore,
    pub animations: Vec<AnimationClip>,
}

impl Prefab {
    pub const ROOT: usize = 0;

    #[must_use]
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![PrefabNode::new(root_name)],
            assets: AssetStore::new(),
            animations: Vec::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &PrefabNode {
        &self.nodes[Self::ROOT]
    }

    pub fn root_mut(&mut self) -> &mut PrefabNode {
        &mut self.nodes[Self::ROOT]
    }

    /// Appends `node` under `parent` and returns its index.
    ///
    /// An out-of-range parent attaches to the root instead.
    pub fn add_node(&mut self, parent: usize, mut node: PrefabNode) -> usize {
        let parent = if parent < self.nodes.len() {
            parent
        } else {
            log::warn!("Prefab parent index {parent} out of range, attaching to root");
            Self::ROOT
        };
        let index = self.nodes.len();
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent].children.push(index);
        index
    }

    /// Registers `geometry` and adds a mesh node for it under `parent`.
    pub fn add_mesh_node(
        &mut self,
        parent: usize,
        name: &str,
        geometry: Geometry,
        material: MaterialHandle,
    ) -> usize {
        let geometry = self.assets.geometries.add(geometry);
        let mesh = Mesh::new(geometry, material).with_name(name);
        self.add_node(parent, PrefabNode::new(name).with_mesh(mesh))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.mesh.is_some()).count()
    }

    /// True when nothing in the tree can be drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mesh_count() == 0
    }

    /// World matrix of every node, indexed like `nodes`.
    #[must_use]
    pub fn world_matrices(&self) -> Vec<Affine3A> {
        let mut world = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let local = node.transform.compose();
            let matrix = match node.parent {
                Some(p) if p < world.len() => world[p] * local,
                _ => local,
            };
            world.push(matrix);
        }
        world
    }

    /// World-space AABB of all mesh geometry below the root.
    #[must_use]
    pub fn compute_bounding_box(&self) -> Option<BoundingBox> {
        let world = self.world_matrices();
        self.nodes
            .iter()
            .zip(&world)
            .filter_map(|(node, matrix)| {
                let mesh = node.mesh.as_ref()?;
                let geometry = self.assets.geometries.get(mesh.geometry)?;
                let local = geometry
                    .bounding_box()
                    .or_else(|| BoundingBox::from_points(geometry.positions()))?;
                Some(local.transform(matrix))
            })
            .reduce(|a, b| a.union(&b))
    }

    /// Releases resources no mesh of the tree references, such as unused
    /// MTL materials or images only an unsupported slot samples.
    pub fn prune_unused_assets(&mut self) -> usize {
        let meshes = self.nodes.iter().filter_map(|n| n.mesh.as_ref());
        let geometries: FxHashSet<_> = meshes.clone().map(|m| m.geometry).collect();
        let materials: FxHashSet<_> = meshes.map(|m| m.material).collect();
        self.assets.retain_used(&geometries, &materials)
    }

    /// Normalises decoder output for display.
    ///
    /// Every material becomes double-sided; every mesh casts and receives
    /// shadows; geometry without normals gets computed ones; bounding
    /// volumes are refreshed.
    pub fn prepare_for_display(&mut self) {
        for (_, material) in self.assets.materials.iter_mut() {
            material.side = Side::Double;
        }
        for node in &mut self.nodes {
            if let Some(mesh) = node.mesh.as_mut() {
                mesh.cast_shadows = true;
                mesh.receive_shadows = true;
            }
        }
        for (_, geometry) in self.assets.geometries.iter_mut() {
            if geometry.normals().is_none() {
                geometry.compute_vertex_normals();
            }
            geometry.compute_bounding_volume();
        }
    }
}
