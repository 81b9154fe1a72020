use std::fmt;

use crate::assets::locator::Locator;
use crate::errors::{Error, Result};

/// Model container formats the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Gltf,
    Glb,
    Obj,
    Fbx,
    Ply,
    Stl,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 6] = [Self::Gltf, Self::Glb, Self::Obj, Self::Fbx, Self::Ply, Self::Stl];

    /// Case-insensitive lookup from a tag such as `"glb"` or `".STL"`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(tag))
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gltf => "gltf",
            Self::Glb => "glb",
            Self::Obj => "obj",
            Self::Fbx => "fbx",
            Self::Ply => "ply",
            Self::Stl => "stl",
        }
    }

    /// Picks the format for a load request.
    ///
    /// An explicit type wins over the locator's extension. An unknown tag
    /// from either source is [`Error::UnsupportedFormat`]; no tag at all is
    /// [`Error::AmbiguousSource`].
    pub fn resolve(locator: &Locator, explicit_type: Option<&str>) -> Result<Self> {
        if let Some(tag) = explicit_type.map(str::trim).filter(|t| !t.is_empty()) {
            return Self::from_tag(tag).ok_or_else(|| Error::UnsupportedFormat(tag.to_string()));
        }
        match locator.extension() {
            Some(ext) => Self::from_tag(&ext).ok_or(Error::UnsupportedFormat(ext)),
            None => {
                log::warn!("No file extension on `{locator}`; an explicit type is required");
                Err(Error::AmbiguousSource(locator.to_string()))
            }
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
