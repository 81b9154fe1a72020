use std::sync::Arc;

use crate::animation::AnimationClip;
use crate::assets::ModelFormat;
use crate::assets::io::{MemoryStore, ProgressFn, ProgressReporter, Transport};
use crate::assets::loaders::{DecodeContext, Decoder, DracoDecoder, DracoModule};
use crate::assets::locator::Locator;
use crate::assets::prefab::Prefab;
use crate::config::LoaderConfig;
use crate::errors::{DecodeError, Error, Result};
use crate::normalize::{Normalization, normalize};
use crate::resources::Texture;

pub type ProgressCallback = Box<dyn FnMut(f32) + Send>;
pub type ErrorCallback = Box<dyn FnMut(&Error) + Send>;

/// One model load: where to read it from and how to report on it.
pub struct LoadRequest {
    pub locator: Locator,
    /// Format tag overriding the locator's extension (`"glb"`, `"stl"`, ...).
    pub explicit_type: Option<String>,
    /// OBJ only: material library to use instead of the same-basename `.mtl`.
    pub material_library: Option<Locator>,
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
}

impl LoadRequest {
    #[must_use]
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            explicit_type: None,
            material_library: None,
            on_progress: None,
            on_error: None,
        }
    }

    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self::new(Locator::parse(source)?))
    }

    #[must_use]
    pub fn with_type(mut self, tag: impl Into<String>) -> Self {
        self.explicit_type = Some(tag.into());
        self
    }

    #[must_use]
    pub fn with_material_library(mut self, locator: Locator) -> Self {
        self.material_library = Some(locator);
        self
    }

    /// Download progress in `[0, 1]`; only called when the total is known.
    #[must_use]
    pub fn on_progress(mut self, callback: impl FnMut(f32) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Called once with the failure before `load` returns it.
    #[must_use]
    pub fn on_error(mut self, callback: impl FnMut(&Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadRequest")
            .field("locator", &self.locator)
            .field("explicit_type", &self.explicit_type)
            .field("material_library", &self.material_library)
            .finish_non_exhaustive()
    }
}

/// A decoded, normalised model ready to be instantiated.
#[derive(Debug)]
pub struct LoadResult {
    pub format: ModelFormat,
    pub prefab: Prefab,
    /// Clips in file order; empty for formats without animation.
    pub animations: Vec<AnimationClip>,
    pub normalization: Normalization,
}

/// Picks a decoder from the request and runs the shared load pipeline:
/// resolve the format, fetch, decode, normalise.
///
/// Nothing is cached between calls.
pub struct FormatDispatcher {
    config: LoaderConfig,
    transport: Transport,
    draco: Option<DracoModule>,
}

impl FormatDispatcher {
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        let transport = Transport::new(&config);
        Self::with_transport(config, transport)
    }

    #[must_use]
    pub fn with_transport(config: LoaderConfig, transport: Transport) -> Self {
        Self {
            config,
            transport,
            draco: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        self.transport.memory()
    }

    /// Registers the decoder for `KHR_draco_mesh_compression` primitives.
    /// It is initialised on first use with `draco_decoder_path`.
    pub fn set_draco_decoder(&mut self, decoder: Arc<dyn DracoDecoder>) {
        self.draco = Some(DracoModule::new(decoder));
    }

    pub async fn load(&self, request: LoadRequest) -> Result<LoadResult> {
        let LoadRequest {
            locator,
            explicit_type,
            material_library,
            mut on_progress,
            mut on_error,
        } = request;

        let mut progress = ProgressReporter::new(on_progress.as_mut().map(|cb| &mut **cb as &mut ProgressFn));
        let result = self
            .load_inner(&locator, explicit_type.as_deref(), material_library.as_ref(), &mut progress)
            .await;

        if let Err(e) = &result {
            log::error!("Failed to load `{locator}`: {e}");
            if let Some(callback) = on_error.as_mut() {
                callback(e);
            }
        }
        result
    }

    async fn load_inner(
        &self,
        locator: &Locator,
        explicit_type: Option<&str>,
        material_library: Option<&Locator>,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<LoadResult> {
        let format = ModelFormat::resolve(locator, explicit_type)?;
        let failure = |cause: DecodeError| Error::DecodeFailure { format, cause };

        let bytes = self
            .transport
            .fetch(locator, progress)
            .await
            .map_err(|e| failure(e.into()))?;
        log::debug!("Fetched `{locator}` ({} bytes) as {format}", bytes.len());

        // Let the host tick frames between the download and the decode.
        tokio::task::yield_now().await;

        let ctx = DecodeContext {
            transport: &self.transport,
            locator,
            config: &self.config,
            draco: self.draco.as_ref(),
            material_override: material_library,
        };
        let mut prefab = Decoder::for_format(format)
            .decode(bytes, &ctx)
            .await
            .map_err(failure)?;

        if prefab.is_empty() {
            return Err(Error::EmptyScene(format));
        }
        let normalization = normalize(&mut prefab).ok_or(Error::EmptyScene(format))?;
        let animations = std::mem::take(&mut prefab.animations);

        log::info!(
            "Loaded {format} model `{locator}`: {} nodes, {} meshes, {} animations, size {:?}",
            prefab.node_count(),
            prefab.mesh_count(),
            animations.len(),
            normalization.original_size,
        );

        Ok(LoadResult {
            format,
            prefab,
            animations,
            normalization,
        })
    }

    /// Fetches and decodes a standalone image.
    pub async fn load_texture(&self, locator: &Locator) -> Result<Texture> {
        let bytes = self.transport.fetch_quiet(locator).await?;
        let name = locator.file_name().unwrap_or_else(|| locator.to_string());
        Ok(Texture::from_encoded(name, &bytes)?.with_source(locator.to_string()))
    }
}
