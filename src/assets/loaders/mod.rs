//! Per-format decoders.
//!
//! Every decoder turns raw bytes into a [`Prefab`] with exactly one root
//! and finishes with [`Prefab::prepare_for_display`]. [`Decoder`] is the
//! tagged union the dispatcher selects from.

pub mod fbx;
pub mod gltf;
pub mod obj;
pub mod ply;
pub mod stl;

use std::sync::{Arc, OnceLock};

use glam::{Vec2, Vec3, Vec4};

use crate::assets::ModelFormat;
use crate::assets::io::Transport;
use crate::assets::locator::Locator;
use crate::assets::prefab::Prefab;
use crate::config::LoaderConfig;
use crate::errors::DecodeError;

pub use self::fbx::FbxLoader;
pub use self::gltf::GltfLoader;
pub use self::obj::ObjLoader;
pub use self::ply::PlyLoader;
pub use self::stl::StlLoader;

/// Everything a decoder may need besides the primary bytes.
pub struct DecodeContext<'a> {
    pub transport: &'a Transport,
    /// Locator of the primary file; sibling resources resolve against it.
    pub locator: &'a Locator,
    pub config: &'a LoaderConfig,
    pub draco: Option<&'a DracoModule>,
    /// OBJ only: material library to use instead of the same-basename `.mtl`.
    pub material_override: Option<&'a Locator>,
}

/// One decoder per format family.
pub enum Decoder {
    Gltf(GltfLoader),
    Obj(ObjLoader),
    Fbx(FbxLoader),
    Ply(PlyLoader),
    Stl(StlLoader),
}

impl Decoder {
    #[must_use]
    pub fn for_format(format: ModelFormat) -> Self {
        match format {
            ModelFormat::Gltf | ModelFormat::Glb => Self::Gltf(GltfLoader),
            ModelFormat::Obj => Self::Obj(ObjLoader),
            ModelFormat::Fbx => Self::Fbx(FbxLoader),
            ModelFormat::Ply => Self::Ply(PlyLoader),
            ModelFormat::Stl => Self::Stl(StlLoader),
        }
    }

    pub async fn decode(&self, bytes: Vec<u8>, ctx: &DecodeContext<'_>) -> Result<Prefab, DecodeError> {
        let mut prefab = match self {
            Self::Gltf(loader) => loader.decode(&bytes, ctx).await?,
            Self::Obj(loader) => loader.decode(&bytes, ctx).await?,
            Self::Fbx(loader) => loader.decode(&bytes, ctx)?,
            Self::Ply(loader) => loader.decode(&bytes, ctx)?,
            Self::Stl(loader) => loader.decode(&bytes, ctx)?,
        };
        prefab.prepare_for_display();
        Ok(prefab)
    }
}

/// Name for the root node, taken from the locator's file name.
pub(crate) fn root_name(locator: &Locator) -> String {
    locator
        .file_name()
        .map_or_else(|| "Model".to_string(), |name| {
            name.rsplit_once('.').map_or(name.clone(), |(stem, _)| stem.to_string())
        })
}

// ============================================================================
// Draco
// ============================================================================

/// Geometry produced by a Draco decoder.
#[derive(Debug, Clone, Default)]
pub struct DracoMesh {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    pub colors: Option<Vec<Vec4>>,
    pub indices: Vec<u32>,
}

/// External decoder for `KHR_draco_mesh_compression` primitives.
pub trait DracoDecoder: Send + Sync {
    /// Loads the decoder from the assets found at `decoder_path`.
    /// Called once, before the first decode.
    fn initialize(&self, decoder_path: &str) -> Result<(), String> {
        let _ = decoder_path;
        Ok(())
    }

    /// Decodes one compressed buffer view. `attributes` maps glTF semantic
    /// names (`"POSITION"`, `"NORMAL"`, ...) to Draco attribute ids.
    fn decode(&self, data: &[u8], attributes: &[(String, u32)]) -> Result<DracoMesh, String>;
}

/// A registered Draco decoder, initialised lazily on first use.
pub struct DracoModule {
    decoder: Arc<dyn DracoDecoder>,
    ready: OnceLock<Result<(), String>>,
}

impl DracoModule {
    #[must_use]
    pub fn new(decoder: Arc<dyn DracoDecoder>) -> Self {
        Self {
            decoder,
            ready: OnceLock::new(),
        }
    }

    pub fn decode(
        &self,
        decoder_path: &str,
        data: &[u8],
        attributes: &[(String, u32)],
    ) -> Result<DracoMesh, DecodeError> {
        self.ready
            .get_or_init(|| {
                log::info!("Initialising Draco decoder from `{decoder_path}`");
                self.decoder.initialize(decoder_path)
            })
            .clone()
            .map_err(DecodeError::Draco)?;
        self.decoder.decode(data, attributes).map_err(DecodeError::Draco)
    }
}
