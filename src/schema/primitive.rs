//! Primitive Registry
//!
//! Built-in scalars plus caller-registered custom scalars. Each carries a
//! `can_be_key` flag consulted for primary keys and map keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CompileError, Result};

/// Scalar kind of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Bool,
    String,
    /// Caller-registered scalar with opaque representation
    Custom,
}

impl PrimitiveKind {
    /// All built-in kinds, in registration order
    pub const BUILTIN: [PrimitiveKind; 12] = [
        PrimitiveKind::UInt8,
        PrimitiveKind::UInt16,
        PrimitiveKind::UInt32,
        PrimitiveKind::UInt64,
        PrimitiveKind::Int8,
        PrimitiveKind::Int16,
        PrimitiveKind::Int32,
        PrimitiveKind::Int64,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::Bool,
        PrimitiveKind::String,
    ];

    /// Default schema-language spelling
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Custom => "custom",
        }
    }

    pub fn is_integer(&self) -> bool {
        self.integer_range().is_some()
    }

    /// Inclusive representable range for integer kinds
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        match self {
            Self::UInt8 => Some((0, u8::MAX as i128)),
            Self::UInt16 => Some((0, u16::MAX as i128)),
            Self::UInt32 => Some((0, u32::MAX as i128)),
            Self::UInt64 => Some((0, u64::MAX as i128)),
            Self::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
            Self::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
            Self::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
            Self::Int64 => Some((i64::MIN as i128, i64::MAX as i128)),
            _ => None,
        }
    }
}

/// A scalar data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Primitive {
    pub name: String,
    pub namespace: String,
    pub kind: PrimitiveKind,
    pub can_be_key: bool,
}

impl Primitive {
    /// Built-in primitives are always key-capable
    pub fn builtin(name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            kind,
            can_be_key: true,
        }
    }

    pub fn custom(name: impl Into<String>, namespace: impl Into<String>, can_be_key: bool) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind: PrimitiveKind::Custom,
            can_be_key,
        }
    }
}

/// Handle into the [`PrimitiveRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId(pub(crate) usize);

/// Name-indexed registry of primitives
#[derive(Debug, Clone, Default)]
pub struct PrimitiveRegistry {
    primitives: Vec<Primitive>,
    by_name: HashMap<String, PrimitiveId>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the twelve built-ins under their default names
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in PrimitiveKind::BUILTIN {
            debug_assert!(registry.lookup(kind.default_name()).is_none());
            registry.push(Primitive::builtin(kind.default_name(), kind));
        }
        registry
    }

    pub fn register(&mut self, primitive: Primitive) -> Result<PrimitiveId> {
        if self.by_name.contains_key(&primitive.name) {
            return Err(CompileError::DuplicatePrimitive {
                name: primitive.name,
            });
        }

        Ok(self.push(primitive))
    }

    fn push(&mut self, primitive: Primitive) -> PrimitiveId {
        let id = PrimitiveId(self.primitives.len());
        self.by_name.insert(primitive.name.clone(), id);
        self.primitives.push(primitive);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<PrimitiveId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: PrimitiveId) -> &Primitive {
        &self.primitives[id.0]
    }

    /// Find the first primitive of a given kind
    pub fn by_kind(&self, kind: PrimitiveKind) -> Option<PrimitiveId> {
        self.primitives
            .iter()
            .position(|p| p.kind == kind)
            .map(PrimitiveId)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.primitives.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}
