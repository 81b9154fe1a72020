use uuid::Uuid;

/// Decoded RGBA8 image ready for upload by a render surface.
#[derive(Debug, Clone)]
pub struct Texture {
    pub uuid: Uuid,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub data: Vec<u8>,
    /// Locator the image was read from, if any.
    pub source: Option<String>,
}

impl Texture {
    #[must_use]
    pub fn new_rgba8(name: impl Into<String>, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            width,
            height,
            data,
            source: None,
        }
    }

    /// Decodes PNG or JPEG bytes (format sniffed from the content).
    pub fn from_encoded(name: impl Into<String>, bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self::new_rgba8(name, width, height, rgba.into_raw()))
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}
