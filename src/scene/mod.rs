//! Scene graph
//!
//! - Node: hierarchy links, transform and mesh component key
//! - Transform: TRS with cached local/world matrices
//! - Scene: slot-map arena plus the resource pools it owns
//! - PerspectiveCamera / Light: viewing and lighting state of the viewer

pub mod camera;
pub mod light;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod transform;

pub use camera::PerspectiveCamera;
pub use light::{Light, LightKind};
pub use node::Node;
pub use scene::Scene;
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeHandle;
    pub struct MeshKey;
}
