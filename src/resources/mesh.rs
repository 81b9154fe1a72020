use super::{GeometryHandle, MaterialHandle};

/// Renderable pairing of one geometry with one material.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,

    pub geometry: GeometryHandle,
    pub material: MaterialHandle,

    pub visible: bool,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
}

impl Mesh {
    #[must_use]
    pub fn new(geometry: GeometryHandle, material: MaterialHandle) -> Self {
        Self {
            name: "Mesh".to_string(),
            geometry,
            material,
            visible: true,
            cast_shadows: false,
            receive_shadows: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
