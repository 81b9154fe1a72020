//! Unified error types for the loading pipeline and the viewer session.
//!
//! [`Error`] is the public taxonomy every entry point returns. Decoder and
//! transport failures carry their own enums ([`DecodeError`],
//! [`TransportError`]) so the dispatcher can wrap them in
//! [`Error::DecodeFailure`] without losing the source chain.

use thiserror::Error;

use crate::assets::ModelFormat;

/// Top-level error returned by the dispatcher and the viewer session.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Format resolution
    // ========================================================================
    /// The explicit type or the locator's extension names no known format.
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),

    /// The locator carries no extension and no explicit type was given.
    #[error("Cannot infer a model format from `{0}`; pass an explicit type")]
    AmbiguousSource(String),

    // ========================================================================
    // Decoding
    // ========================================================================
    /// A decoder (or the transport feeding it) failed.
    #[error("Failed to decode {format} model: {cause}")]
    DecodeFailure {
        format: ModelFormat,
        #[source]
        cause: DecodeError,
    },

    /// The asset decoded but contains nothing that can be displayed.
    #[error("Decoded {0} model contains no renderable content")]
    EmptyScene(ModelFormat),

    /// A standalone resource fetch failed (textures and other non-model resources).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A standalone image could not be decoded.
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    // ========================================================================
    // Viewer
    // ========================================================================
    /// The session was closed; no further operations are valid.
    #[error("Viewer session is closed")]
    SessionClosed,

    /// The render surface rejected a frame.
    #[error("Render surface error: {0}")]
    Surface(String),

    // ========================================================================
    // Configuration & generic
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cause of an [`Error::DecodeFailure`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("glTF parse error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("OBJ parse error: {0}")]
    Obj(#[from] tobj::LoadError),

    #[error("FBX parse error: {0}")]
    Fbx(String),

    #[error("PLY parse error: {0}")]
    Ply(#[source] std::io::Error),

    #[error("STL parse error: {0}")]
    Stl(#[source] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Draco decode error: {0}")]
    Draco(String),

    #[error("Malformed asset: {0}")]
    Malformed(String),
}

/// Failure while fetching bytes for a locator.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("IO error reading {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The locator needs a transport compiled out of this build.
    #[error("`{scheme}` locators need the `{feature}` feature")]
    FeatureNotEnabled {
        scheme: &'static str,
        feature: &'static str,
    },

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),
}

/// Alias for `Result<T, curio::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
