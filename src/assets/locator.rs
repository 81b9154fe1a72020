use std::borrow::Cow;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::errors::TransportError;

pub const MEMORY_SCHEME: &str = "mem://";
pub const BLOB_SCHEME: &str = "blob:";

/// Where an asset's bytes come from.
///
/// - `File`: local path, relative paths resolve against the loader's asset root
/// - `Http`: absolute `http(s)` URL
/// - `Memory`: `mem://` key into the shared [`MemoryStore`](super::io::MemoryStore)
/// - `Blob`: ephemeral in-memory handle; never carries a usable extension
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    File(PathBuf),
    Http(String),
    Memory(String),
    Blob(String),
}

impl Locator {
    pub fn parse(source: &str) -> Result<Self, TransportError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(TransportError::InvalidLocator("empty locator".to_string()));
        }

        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Http(source.to_string()))
        } else if let Some(key) = source.strip_prefix(MEMORY_SCHEME) {
            Ok(Self::Memory(normalize_key(key)))
        } else if lower.starts_with(BLOB_SCHEME) {
            Ok(Self::Blob(source.to_string()))
        } else if let Some(path) = source.strip_prefix("file://") {
            Ok(Self::File(PathBuf::from(path)))
        } else {
            Ok(Self::File(PathBuf::from(source)))
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Http(_) => "http",
            Self::Memory(_) => "mem",
            Self::Blob(_) => "blob",
        }
    }

    /// Path part with query string and fragment removed.
    fn path_part(&self) -> Option<String> {
        match self {
            Self::File(path) => Some(path.to_string_lossy().replace('\\', "/")),
            Self::Http(url) => {
                let without_scheme = url.split_once("://").map_or(url.as_str(), |(_, rest)| rest);
                let path = without_scheme.find('/').map_or("", |i| &without_scheme[i..]);
                Some(strip_suffixes(path).to_string())
            }
            Self::Memory(key) => Some(strip_suffixes(key).to_string()),
            Self::Blob(_) => None,
        }
    }

    /// Last path segment, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        let path = self.path_part()?;
        path.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string)
    }

    /// Lower-cased trailing extension of the last path segment.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Same location with the extension of the last segment replaced.
    ///
    /// `None` when the locator has no extension to replace.
    #[must_use]
    pub fn with_extension(&self, ext: &str) -> Option<Self> {
        self.extension()?;
        match self {
            Self::File(path) => Some(Self::File(path.with_extension(ext))),
            Self::Http(url) => Some(Self::Http(replace_extension(url, ext))),
            Self::Memory(key) => Some(Self::Memory(replace_extension(key, ext))),
            Self::Blob(_) => None,
        }
    }

    /// Resolves `relative` against this locator's directory.
    ///
    /// Absolute references (URLs and other schemes) are returned as-is.
    pub fn join(&self, relative: &str) -> Result<Self, TransportError> {
        let candidate = Self::parse(relative)?;
        if !matches!(candidate, Self::File(_)) {
            return Ok(candidate);
        }
        let relative = percent_decode_str(relative)
            .decode_utf8()
            .map_or_else(|_| relative.to_string(), Cow::into_owned);

        match self {
            Self::File(path) => {
                let rel = Path::new(&relative);
                if rel.is_absolute() {
                    return Ok(Self::File(rel.to_path_buf()));
                }
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                Ok(Self::File(clean_path(&base.join(rel))))
            }
            Self::Http(url) => join_url(url, &relative).map(Self::Http),
            Self::Memory(key) => {
                let dir = key.rsplit_once('/').map_or("", |(dir, _)| dir);
                let joined = if dir.is_empty() { relative } else { format!("{dir}/{relative}") };
                Ok(Self::Memory(normalize_key(&joined)))
            }
            Self::Blob(blob) => Err(TransportError::InvalidLocator(format!(
                "cannot resolve `{relative}` relative to ephemeral handle `{blob}`"
            ))),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Http(url) | Self::Blob(url) => f.write_str(url),
            Self::Memory(key) => write!(f, "{MEMORY_SCHEME}{key}"),
        }
    }
}

impl std::str::FromStr for Locator {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn strip_suffixes(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn replace_extension(source: &str, ext: &str) -> String {
    let end = source.find(['?', '#']).unwrap_or(source.len());
    let (path, suffix) = source.split_at(end);
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        Some(dot) => format!("{}.{ext}{suffix}", &path[..segment_start + dot]),
        None => source.to_string(),
    }
}

/// Collapses `.` and `..` segments of a `/`-separated key.
fn normalize_key(key: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in key.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(feature = "http")]
fn join_url(base: &str, relative: &str) -> Result<String, TransportError> {
    let base = url::Url::parse(base).map_err(|e| TransportError::InvalidLocator(format!("{base}: {e}")))?;
    base.join(relative)
        .map(String::from)
        .map_err(|e| TransportError::InvalidLocator(format!("{relative}: {e}")))
}

#[cfg(not(feature = "http"))]
fn join_url(base: &str, relative: &str) -> Result<String, TransportError> {
    let path_end = base.find(['?', '#']).unwrap_or(base.len());
    let dir_end = base[..path_end].rfind('/').map_or(path_end, |i| i + 1);
    Ok(format!("{}{relative}", &base[..dir_end]))
}
