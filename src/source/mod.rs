//! Schema Sources
//!
//! The compiler never inspects the textual syntax of a schema file. It talks to
//! a [`SourceReader`], which answers two questions about a [`SourceId`]:
//! which other sources it imports, and (on demand) its full declaration list.
//!
//! Declarations are format-agnostic serde structs; the bundled readers load
//! them from memory ([`MemorySource`]) or from JSON files ([`DirectorySource`]).

pub mod directory;

pub use directory::DirectorySource;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{CompileError, Result};

/// Opaque address of one schema source (e.g. a logical path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Reads schema sources on behalf of the compiler
pub trait SourceReader {
    /// Sources directly imported by `id`, in declaration order
    fn imports(&self, id: &SourceId) -> Result<Vec<SourceId>>;

    /// Full declaration list of `id`
    fn read(&self, id: &SourceId) -> Result<SchemaDecl>;
}

// =============================================================================
// Declaration Model
// =============================================================================

/// One schema source as declared by its author
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDecl {
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub imports: Vec<ImportDecl>,
    #[serde(default)]
    pub metadata: Vec<MetadataDecl>,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
}

/// `import` clause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDecl {
    pub source: SourceId,
    /// Defaults to the imported schema's declared name
    #[serde(default)]
    pub alias: Option<String>,
}

/// Ordered key/value annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDecl {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// A user-defined type declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDecl {
    Entity(CompositeDecl),
    Struct(CompositeDecl),
    Interface(InterfaceDecl),
    Enum(EnumDecl),
}

impl TypeDecl {
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeDecl::Entity(d) | TypeDecl::Struct(d) => d.name.as_deref(),
            TypeDecl::Interface(d) => d.name.as_deref(),
            TypeDecl::Enum(d) => d.name.as_deref(),
        }
    }
}

/// Entity or struct declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositeDecl {
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Base type (same kind)
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    #[serde(default)]
    pub metadata: Vec<MetadataDecl>,
}

/// Interface declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Extended interfaces
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    #[serde(default)]
    pub metadata: Vec<MetadataDecl>,
}

/// Enum declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Integer primitive; falls back to the configured default
    #[serde(default)]
    pub underlying: Option<String>,
    #[serde(default)]
    pub elements: Vec<EnumElementDecl>,
    #[serde(default)]
    pub metadata: Vec<MetadataDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumElementDecl {
    pub name: Option<String>,
    pub value: Option<EnumValueDecl>,
    #[serde(default)]
    pub metadata: Vec<MetadataDecl>,
}

/// Enum values may be written as JSON integers or as decimal strings
/// (the latter covers the full `uint64` range).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValueDecl {
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

impl EnumValueDecl {
    pub fn to_i128(&self) -> Option<i128> {
        match self {
            EnumValueDecl::Signed(v) => Some(i128::from(*v)),
            EnumValueDecl::Unsigned(v) => Some(i128::from(*v)),
            EnumValueDecl::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for EnumValueDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumValueDecl::Signed(v) => write!(f, "{}", v),
            EnumValueDecl::Unsigned(v) => write!(f, "{}", v),
            EnumValueDecl::Text(s) => f.write_str(s),
        }
    }
}

/// Role a property plays on its owning type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyRole {
    #[default]
    Plain,
    PrimaryKey,
    ForeignKey,
}

impl PropertyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyRole::Plain => "plain",
            PropertyRole::PrimaryKey => "primary_key",
            PropertyRole::ForeignKey => "foreign_key",
        }
    }
}

/// Property declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_expr: Option<String>,
    #[serde(default)]
    pub role: PropertyRole,
    /// Key type for the long `Map` form
    #[serde(default)]
    pub key: Option<String>,
    /// Value type for the long container forms
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataDecl>,
}

impl PropertyDecl {
    /// Shorthand used by tests and embedders
    pub fn new(name: &str, type_expr: &str, role: PropertyRole) -> Self {
        Self {
            name: Some(name.to_string()),
            type_expr: Some(type_expr.to_string()),
            role,
            ..Default::default()
        }
    }
}

// =============================================================================
// In-memory reader
// =============================================================================

/// Sources held in memory, keyed by id
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sources: HashMap<SourceId, SchemaDecl>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<SourceId>, decl: SchemaDecl) {
        self.sources.insert(id.into(), decl);
    }

    pub fn with(mut self, id: impl Into<SourceId>, decl: SchemaDecl) -> Self {
        self.insert(id, decl);
        self
    }

    /// Parse a JSON document into a declaration and add it
    pub fn insert_json(&mut self, id: impl Into<SourceId>, json: &str) -> Result<()> {
        let id = id.into();
        let decl = serde_json::from_str(json).map_err(|error| CompileError::Json {
            unit: id.clone(),
            error,
        })?;
        self.sources.insert(id, decl);
        Ok(())
    }

    fn get(&self, id: &SourceId) -> Result<&SchemaDecl> {
        self.sources
            .get(id)
            .ok_or_else(|| CompileError::SourceNotFound { unit: id.clone() })
    }
}

impl SourceReader for MemorySource {
    fn imports(&self, id: &SourceId) -> Result<Vec<SourceId>> {
        Ok(self.get(id)?.imports.iter().map(|i| i.source.clone()).collect())
    }

    fn read(&self, id: &SourceId) -> Result<SchemaDecl> {
        self.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declarations() {
        let json = r#"{
            "name": "Main",
            "namespace": "Game.Data",
            "imports": [{ "source": "Shared" }],
            "types": [
                {
                    "kind": "entity",
                    "name": "City",
                    "properties": [
                        { "name": "id", "type": "int32", "role": "primary_key" },
                        { "name": "country", "type": "Shared.Country", "role": "foreign_key" }
                    ]
                },
                {
                    "kind": "enum",
                    "name": "Size",
                    "underlying": "uint64",
                    "elements": [
                        { "name": "Small", "value": 1 },
                        { "name": "Huge", "value": "18446744073709551615" }
                    ]
                }
            ]
        }"#;

        let mut source = MemorySource::new();
        source.insert_json("Main", json).unwrap();

        let imports = source.imports(&SourceId::new("Main")).unwrap();
        assert_eq!(imports, vec![SourceId::new("Shared")]);

        let decl = source.read(&SourceId::new("Main")).unwrap();
        assert_eq!(decl.types.len(), 2);
        match &decl.types[0] {
            TypeDecl::Entity(entity) => {
                assert_eq!(entity.properties[0].role, PropertyRole::PrimaryKey);
                assert_eq!(entity.properties[1].role, PropertyRole::ForeignKey);
            }
            other => panic!("Expected entity, got {:?}", other),
        }
        match &decl.types[1] {
            TypeDecl::Enum(e) => {
                assert_eq!(e.elements[0].value.as_ref().unwrap().to_i128(), Some(1));
                assert_eq!(
                    e.elements[1].value.as_ref().unwrap().to_i128(),
                    Some(u64::MAX as i128)
                );
            }
            other => panic!("Expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_source() {
        let source = MemorySource::new();
        let err = source.imports(&SourceId::new("Nope")).unwrap_err();
        assert!(matches!(err, CompileError::SourceNotFound { .. }));
    }
}
