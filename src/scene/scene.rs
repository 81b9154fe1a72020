use glam::Affine3A;
use slotmap::SlotMap;

use crate::assets::prefab::Prefab;
use crate::assets::storage::AssetStore;
use crate::resources::{BoundingBox, Mesh};
use crate::scene::node::Node;
use crate::scene::{MeshKey, NodeHandle};

/// Arena-backed scene graph.
///
/// Nodes and mesh components live in slot maps; geometry, materials and
/// textures live in [`AssetStore`] pools owned by the scene. Removing an
/// entry invalidates its handle, so stale references resolve to `None`.
#[derive(Debug, Default)]
pub struct Scene {
    pub(crate) nodes: SlotMap<NodeHandle, Node>,
    pub(crate) meshes: SlotMap<MeshKey, Mesh>,
    pub assets: AssetStore,
    pub(crate) root_nodes: Vec<NodeHandle>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    pub fn add_node(&mut self, node: Node) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.root_nodes.push(handle);
        handle
    }

    pub fn create_node_with_name(&mut self, name: &str) -> NodeHandle {
        self.add_node(Node::new(name))
    }

    pub fn add_to_parent(&mut self, mut child: Node, parent: NodeHandle) -> NodeHandle {
        if !self.nodes.contains_key(parent) {
            log::warn!("Parent node not found, adding `{}` as a root node", child.name);
            return self.add_node(child);
        }
        child.parent = Some(parent);
        let handle = self.nodes.insert(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(handle);
        }
        handle
    }

    /// Adds a node carrying `mesh` under `parent` (or as a root).
    pub fn add_mesh(&mut self, mesh: Mesh, parent: Option<NodeHandle>) -> NodeHandle {
        let mut node = Node::new(&mesh.name);
        node.mesh = Some(self.meshes.insert(mesh));
        match parent {
            Some(parent) => self.add_to_parent(node, parent),
            None => self.add_node(node),
        }
    }

    /// Re-parents `child` under `parent`, detaching it from its old parent.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) {
        if child == parent {
            log::warn!("Cannot attach a node to itself");
            return;
        }
        if !self.nodes.contains_key(child) || !self.nodes.contains_key(parent) {
            log::warn!("Attach ignored: node not found");
            return;
        }

        self.detach(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
            c.transform.mark_dirty();
        }
    }

    /// Unlinks `node` from its parent (or the root list) without removing it.
    pub(crate) fn detach(&mut self, node: NodeHandle) {
        let parent = self.nodes.get(node).and_then(|n| n.parent);
        match parent {
            Some(p) => {
                if let Some(parent) = self.nodes.get_mut(p) {
                    parent.children.retain(|&c| c != node);
                }
            }
            None => self.root_nodes.retain(|&r| r != node),
        }
        if let Some(n) = self.nodes.get_mut(node) {
            n.parent = None;
        }
    }

    #[must_use]
    pub fn get_node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn get_node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn get_mesh(&self, key: MeshKey) -> Option<&Mesh> {
        self.meshes.get(key)
    }

    #[must_use]
    pub fn root_nodes(&self) -> &[NodeHandle] {
        &self.root_nodes
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshKey, &Mesh)> {
        self.meshes.iter()
    }

    /// First node named `name` in the subtree of `root`, depth first.
    #[must_use]
    pub fn find_node_by_name(&self, root: NodeHandle, name: &str) -> Option<NodeHandle> {
        self.subtree(root)
            .into_iter()
            .find(|&h| self.nodes.get(h).is_some_and(|n| n.name == name))
    }

    /// `root` and all its descendants, parents before children.
    #[must_use]
    pub fn subtree(&self, root: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            out.push(handle);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    // ========================================================================
    // Prefab instantiation
    // ========================================================================

    /// Moves a prefab into the scene as a new root node and returns it.
    ///
    /// The prefab's resources are transferred into the scene's pools; mesh
    /// components are rewritten to the new handles. Resources no mesh
    /// references are dropped first, so disposing the returned subtree
    /// releases everything the prefab brought in.
    pub fn instantiate(&mut self, mut prefab: Prefab) -> NodeHandle {
        let pruned = prefab.prune_unused_assets();
        if pruned > 0 {
            log::debug!("Dropped {pruned} unreferenced resources from `{}`", prefab.root().name);
        }
        let Prefab { nodes, assets, .. } = prefab;
        let remap = self.assets.absorb(assets);

        let mut handles: Vec<NodeHandle> = Vec::with_capacity(nodes.len());
        for prefab_node in nodes {
            let mut node = Node::new(&prefab_node.name);
            node.transform = prefab_node.transform;
            node.transform.mark_dirty();

            if let Some(mut mesh) = prefab_node.mesh {
                match (
                    remap.geometries.get(&mesh.geometry),
                    remap.materials.get(&mesh.material),
                ) {
                    (Some(&geometry), Some(&material)) => {
                        mesh.geometry = geometry;
                        mesh.material = material;
                        node.mesh = Some(self.meshes.insert(mesh));
                    }
                    _ => log::warn!("Mesh `{}` references missing resources, skipped", mesh.name),
                }
            }

            let parent = prefab_node.parent.and_then(|p| handles.get(p).copied());
            let handle = match parent {
                Some(parent) => self.add_to_parent(node, parent),
                None => self.add_node(node),
            };
            handles.push(handle);
        }

        handles
            .first()
            .copied()
            .unwrap_or_else(|| self.create_node_with_name("Prefab"))
    }

    // ========================================================================
    // Matrix update pipeline
    // ========================================================================

    /// Recomputes world matrices for the whole graph, top down.
    pub fn update_matrix_world(&mut self) {
        let roots = self.root_nodes.clone();
        for root in roots {
            self.update_subtree_with_parent(root, Affine3A::IDENTITY);
        }
    }

    /// Recomputes world matrices below `root`, starting from its parent's
    /// current world matrix.
    pub fn update_subtree(&mut self, root: NodeHandle) {
        let parent_world = self
            .nodes
            .get(root)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes.get(p))
            .map_or(Affine3A::IDENTITY, |p| *p.transform.world_matrix());
        self.update_subtree_with_parent(root, parent_world);
    }

    fn update_subtree_with_parent(&mut self, root: NodeHandle, parent_world: Affine3A) {
        // Iterative to stay safe on deep hierarchies.
        let mut stack = vec![(root, parent_world)];
        while let Some((handle, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(handle) else {
                continue;
            };
            node.transform.update_local_matrix();
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(world);
            stack.extend(node.children.iter().map(|&c| (c, world)));
        }
    }

    /// World-space AABB of all meshes in the subtree of `root`.
    ///
    /// Uses the cached world matrices; call [`Scene::update_subtree`] first.
    #[must_use]
    pub fn world_bounding_box(&self, root: NodeHandle) -> Option<BoundingBox> {
        self.subtree(root)
            .into_iter()
            .filter_map(|handle| {
                let node = self.nodes.get(handle)?;
                let mesh = self.meshes.get(node.mesh?)?;
                let geometry = self.assets.geometries.get(mesh.geometry)?;
                let local = geometry.bounding_box()?;
                Some(local.transform(node.transform.world_matrix()))
            })
            .reduce(|a, b| a.union(&b))
    }
}
