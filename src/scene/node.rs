use crate::scene::transform::Transform;
use crate::scene::{MeshKey, NodeHandle};

/// A scene graph node.
///
/// Nodes only hold hierarchy links, the transform and an optional mesh
/// component key; resources live in the scene's asset pools. The parent
/// link is a plain handle, so it never keeps the parent alive.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,
    pub visible: bool,

    pub(crate) mesh: Option<MeshKey>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new("")
    }
}

impl Node {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            visible: true,
            mesh: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn mesh(&self) -> Option<MeshKey> {
        self.mesh
    }
}
