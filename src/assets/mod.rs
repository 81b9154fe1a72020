//! Model loading: locators and byte transport, format dispatch, the
//! per-format decoders and their common [`Prefab`] output.

pub mod dispatcher;
pub mod format;
pub mod io;
pub mod loaders;
pub mod locator;
pub mod prefab;
pub mod storage;

pub use dispatcher::{FormatDispatcher, LoadRequest, LoadResult};
pub use format::ModelFormat;
pub use io::{MemoryStore, ProgressReporter, Transport};
pub use loaders::{DracoDecoder, DracoMesh};
pub use locator::Locator;
pub use prefab::{Prefab, PrefabNode};
pub use storage::{AssetRemap, AssetStorage, AssetStore};
