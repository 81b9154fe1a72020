//! Byte transport for asset locators.
//!
//! Each locator scheme has its own reader; [`Transport`] routes a
//! [`Locator`] to the matching one. Readers report download progress
//! through a [`ProgressReporter`] only when the total size is known.

use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(feature = "http")]
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::io::AsyncReadExt;

use crate::assets::locator::{BLOB_SCHEME, Locator};
use crate::config::LoaderConfig;
use crate::errors::TransportError;

// ============================================================================
// Progress
// ============================================================================

pub type ProgressFn = dyn FnMut(f32) + Send;

/// Forwards `loaded / total` to a callback, monotonically and within `[0, 1]`.
pub struct ProgressReporter<'a> {
    callback: Option<&'a mut ProgressFn>,
    last: Option<f32>,
}

impl<'a> ProgressReporter<'a> {
    #[must_use]
    pub fn new(callback: Option<&'a mut ProgressFn>) -> Self {
        Self { callback, last: None }
    }

    #[must_use]
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Reports progress; a missing or zero `total` emits nothing.
    pub fn report(&mut self, loaded: u64, total: Option<u64>) {
        let Some(total) = total.filter(|&t| t > 0) else {
            return;
        };
        let fraction = (loaded as f64 / total as f64).clamp(0.0, 1.0) as f32;
        if self.last.is_some_and(|last| fraction <= last) {
            return;
        }
        self.last = Some(fraction);
        if let Some(callback) = self.callback.as_mut() {
            callback(fraction);
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<f32> {
        self.last
    }
}

// ============================================================================
// Readers
// ============================================================================

/// Asynchronous byte source for one locator scheme.
pub trait AssetReader {
    fn read_bytes(
        &self,
        locator: &Locator,
        progress: &mut ProgressReporter<'_>,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, TransportError>>;
}

/// Local filesystem reader; streams in chunks so progress is incremental.
pub struct FileAssetReader {
    root_path: PathBuf,
    chunk_size: usize,
}

impl FileAssetReader {
    pub fn new(root: impl AsRef<Path>, chunk_size: usize) -> Self {
        Self {
            root_path: root.as_ref().to_path_buf(),
            chunk_size: chunk_size.max(1),
        }
    }

    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_path.join(path)
        }
    }
}

impl AssetReader for FileAssetReader {
    async fn read_bytes(
        &self,
        locator: &Locator,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Vec<u8>, TransportError> {
        let Locator::File(path) = locator else {
            return Err(TransportError::InvalidLocator(locator.to_string()));
        };
        let path = self.resolve(path);
        let io_err = |source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::NotFound {
                TransportError::NotFound(path.display().to_string())
            } else {
                TransportError::Io {
                    locator: path.display().to_string(),
                    source,
                }
            }
        };

        let mut file = tokio::fs::File::open(&path).await.map_err(io_err)?;
        let total = file.metadata().await.map_err(io_err)?.len();

        let mut data = Vec::with_capacity(total as usize);
        let mut chunk = vec![0_u8; self.chunk_size];
        progress.report(0, Some(total));
        loop {
            let n = file.read(&mut chunk).await.map_err(io_err)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
            progress.report(data.len() as u64, Some(total));
        }
        Ok(data)
    }
}

/// Shared registry of in-memory assets, addressed by `mem://` keys or
/// generated `blob:` handles.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<FxHashMap<String, Arc<[u8]>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` under `locator` (a `mem://` or `blob:` string).
    pub fn insert(&self, locator: &str, bytes: impl Into<Vec<u8>>) -> Result<Locator, TransportError> {
        let parsed = Locator::parse(locator)?;
        if !matches!(parsed, Locator::Memory(_) | Locator::Blob(_)) {
            return Err(TransportError::InvalidLocator(format!(
                "`{locator}` is not an in-memory locator"
            )));
        }
        let bytes: Vec<u8> = bytes.into();
        self.entries.write().insert(parsed.to_string(), Arc::from(bytes));
        Ok(parsed)
    }

    /// Registers `bytes` under a fresh `blob:` handle, like an object URL.
    pub fn create_blob(&self, bytes: impl Into<Vec<u8>>) -> Locator {
        let handle = format!("{BLOB_SCHEME}curio/{}", uuid::Uuid::new_v4());
        let bytes: Vec<u8> = bytes.into();
        self.entries.write().insert(handle.clone(), Arc::from(bytes));
        Locator::Blob(handle)
    }

    pub fn remove(&self, locator: &Locator) -> bool {
        self.entries.write().remove(&locator.to_string()).is_some()
    }

    #[must_use]
    pub fn contains(&self, locator: &Locator) -> bool {
        self.entries.read().contains_key(&locator.to_string())
    }

    #[must_use]
    pub fn get(&self, locator: &Locator) -> Option<Arc<[u8]>> {
        self.entries.read().get(&locator.to_string()).cloned()
    }
}

impl AssetReader for MemoryStore {
    async fn read_bytes(
        &self,
        locator: &Locator,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Vec<u8>, TransportError> {
        let bytes = self
            .get(locator)
            .ok_or_else(|| TransportError::NotFound(locator.to_string()))?;
        let total = bytes.len() as u64;
        progress.report(total, Some(total));
        Ok(bytes.to_vec())
    }
}

/// HTTP reader backed by `ehttp`.
#[cfg(feature = "http")]
pub struct HttpAssetReader {
    timeout: Duration,
}

#[cfg(feature = "http")]
impl HttpAssetReader {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[cfg(feature = "http")]
impl AssetReader for HttpAssetReader {
    async fn read_bytes(
        &self,
        locator: &Locator,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Vec<u8>, TransportError> {
        let Locator::Http(url) = locator else {
            return Err(TransportError::InvalidLocator(locator.to_string()));
        };
        let request = ehttp::Request::get(url.as_str());
        let response = tokio::time::timeout(self.timeout, ehttp::fetch_async(request))
            .await
            .map_err(|_| TransportError::Network {
                url: url.clone(),
                message: format!("timed out after {:?}", self.timeout),
            })?
            .map_err(|message| TransportError::Network {
                url: url.clone(),
                message,
            })?;

        if !response.ok {
            return Err(if response.status == 404 {
                TransportError::NotFound(url.clone())
            } else {
                TransportError::HttpStatus {
                    status: response.status,
                    url: url.clone(),
                }
            });
        }

        let total = response
            .headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        progress.report(response.bytes.len() as u64, total);
        Ok(response.bytes)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Routes locators to the reader for their scheme.
#[derive(Clone)]
pub struct Transport {
    files: Arc<FileAssetReader>,
    memory: MemoryStore,
    #[cfg(feature = "http")]
    http: Arc<HttpAssetReader>,
}

impl Transport {
    #[must_use]
    pub fn new(config: &LoaderConfig) -> Self {
        Self::with_memory(config, MemoryStore::new())
    }

    #[must_use]
    pub fn with_memory(config: &LoaderConfig, memory: MemoryStore) -> Self {
        Self {
            files: Arc::new(FileAssetReader::new(&config.asset_root, config.read_chunk_size)),
            memory,
            #[cfg(feature = "http")]
            http: Arc::new(HttpAssetReader::new(Duration::from_secs(config.http_timeout_secs.max(1)))),
        }
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub async fn fetch(
        &self,
        locator: &Locator,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Vec<u8>, TransportError> {
        match locator {
            Locator::File(_) => self.files.read_bytes(locator, progress).await,
            Locator::Memory(_) | Locator::Blob(_) => self.memory.read_bytes(locator, progress).await,
            #[cfg(feature = "http")]
            Locator::Http(_) => self.http.read_bytes(locator, progress).await,
            #[cfg(not(feature = "http"))]
            Locator::Http(_) => Err(TransportError::FeatureNotEnabled {
                scheme: "http",
                feature: "http",
            }),
        }
    }

    /// Fetch without progress reporting, for secondary resources.
    pub async fn fetch_quiet(&self, locator: &Locator) -> Result<Vec<u8>, TransportError> {
        self.fetch(locator, &mut ProgressReporter::silent()).await
    }
}
