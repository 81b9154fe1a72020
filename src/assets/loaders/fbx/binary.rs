//! Binary FBX node tree.
//!
//! Records are parsed by `fbxcel` into an arena-backed tree; [`FbxNode`]
//! is a cheap borrowed handle into it. Walking the tree never recurses,
//! so nesting depth is bounded by memory only.

use std::io::Cursor;

use fbxcel::low::v7400::AttributeValue;
use fbxcel::tree::any::AnyTree;
use fbxcel::tree::v7400::{NodeHandle, Tree};

pub const MAGIC: &[u8] = b"Kaydara FBX Binary  \0";

/// Separates an object's name from its class in name properties.
pub const NAME_CLASS_SEPARATOR: &str = "\u{0}\u{1}";

/// Typed accessors over FBX record attributes.
pub trait AttributeExt {
    fn int(&self) -> Option<i64>;
    fn float(&self) -> Option<f64>;
    fn text(&self) -> Option<&str>;
    /// Numeric array widened to `f64`.
    fn floats(&self) -> Option<Vec<f64>>;
    fn ints(&self) -> Option<Vec<i64>>;
}

impl AttributeExt for AttributeValue {
    fn int(&self) -> Option<i64> {
        match *self {
            Self::I16(v) => Some(i64::from(v)),
            Self::I32(v) => Some(i64::from(v)),
            Self::I64(v) => Some(v),
            Self::Bool(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    fn float(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(f64::from(v)),
            Self::F64(v) => Some(v),
            Self::I16(v) => Some(f64::from(v)),
            Self::I32(v) => Some(f64::from(v)),
            Self::I64(v) => Some(v as f64),
            _ => None,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn floats(&self) -> Option<Vec<f64>> {
        match self {
            Self::ArrF64(v) => Some(v.clone()),
            Self::ArrF32(v) => Some(v.iter().copied().map(f64::from).collect()),
            Self::ArrI32(v) => Some(v.iter().copied().map(f64::from).collect()),
            Self::ArrI64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    fn ints(&self) -> Option<Vec<i64>> {
        match self {
            Self::ArrI64(v) => Some(v.clone()),
            Self::ArrI32(v) => Some(v.iter().copied().map(i64::from).collect()),
            _ => None,
        }
    }
}

/// One record of the tree.
#[derive(Clone, Copy)]
pub struct FbxNode<'a>(NodeHandle<'a>);

impl<'a> FbxNode<'a> {
    #[must_use]
    pub fn name(self) -> &'a str {
        self.0.name()
    }

    pub fn children(self) -> impl Iterator<Item = FbxNode<'a>> + 'a {
        self.0.children().map(FbxNode)
    }

    pub fn children_named(self, name: &'a str) -> impl Iterator<Item = FbxNode<'a>> + 'a {
        self.children().filter(move |c| c.name() == name)
    }

    #[must_use]
    pub fn child(self, name: &str) -> Option<FbxNode<'a>> {
        self.children().find(|c| c.name() == name)
    }

    #[must_use]
    pub fn property(self, index: usize) -> Option<&'a AttributeValue> {
        self.0.attributes().get(index)
    }

    /// First property of the named child, e.g. `Vertices` or `KeyTime`.
    #[must_use]
    pub fn child_value(self, name: &str) -> Option<&'a AttributeValue> {
        self.child(name)?.property(0)
    }

    /// Object id: first property of records under `Objects`.
    #[must_use]
    pub fn id(self) -> Option<i64> {
        self.property(0)?.int()
    }

    /// Object name with the `\0\x01Class` suffix stripped.
    #[must_use]
    pub fn object_name(self) -> &'a str {
        self.property(1)
            .and_then(AttributeExt::text)
            .map_or("", |s| s.split(NAME_CLASS_SEPARATOR).next().unwrap_or(s))
    }
}

pub struct FbxDocument {
    tree: Tree,
}

impl FbxDocument {
    #[must_use]
    pub fn node(&self, name: &str) -> Option<FbxNode<'_>> {
        FbxNode(self.tree.root()).child(name)
    }
}

#[must_use]
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

pub fn parse(bytes: &[u8]) -> Result<FbxDocument, String> {
    if !is_binary(bytes) {
        return Err("missing binary FBX header".to_string());
    }
    match AnyTree::from_seekable_reader(Cursor::new(bytes)).map_err(|e| e.to_string())? {
        AnyTree::V7400(version, tree, _footer) => {
            log::debug!("FBX version {version:?}");
            Ok(FbxDocument { tree })
        }
        #[allow(unreachable_patterns)]
        _ => Err("unsupported FBX version".to_string()),
    }
}
