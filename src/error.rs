//! Error types for the schema compiler

use std::path::PathBuf;

use thiserror::Error;

use crate::source::SourceId;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Compiler phase that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    /// Locating or reading a schema source
    Source,
    /// Malformed declarations found while declaring a unit
    Structural,
    /// A deferred binding could not be satisfied during fixup
    Resolution,
    /// Import graph or context registration failure
    Graph,
    /// Backend failure for a single emitted unit
    Generation,
    /// Configuration could not be loaded
    Config,
}

/// Where a usage of a key-capable type was required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    MapKey,
    PrimaryKey,
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyUsage::MapKey => write!(f, "map key"),
            KeyUsage::PrimaryKey => write!(f, "primary key component"),
        }
    }
}

/// Schema compiler errors
#[derive(Error, Debug)]
pub enum CompileError {
    // === Source ===
    #[error("Schema source not found: {unit}")]
    SourceNotFound { unit: SourceId },

    #[error("Failed to read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Invalid schema source {unit}: {error}")]
    Json {
        unit: SourceId,
        #[source]
        error: serde_json::Error,
    },

    // === Structural ===
    #[error("{unit}: invalid {what} identifier '{name}'")]
    InvalidIdentifier {
        unit: SourceId,
        what: &'static str,
        name: String,
    },

    #[error("{unit}: '{owner}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        unit: SourceId,
        owner: String,
        attribute: &'static str,
    },

    #[error("{unit}: duplicate type name '{type_name}'")]
    DuplicateType { unit: SourceId, type_name: String },

    #[error("{unit}: duplicate property '{property}' declared on '{type_name}'")]
    DuplicateProperty {
        unit: SourceId,
        type_name: String,
        property: String,
    },

    #[error("{unit}: duplicate import alias '{alias}'")]
    DuplicateImportAlias { unit: SourceId, alias: String },

    #[error("{unit}: entity '{type_name}' declares {count} primary key components (expected 1 to 7)")]
    PrimaryKeyArity {
        unit: SourceId,
        type_name: String,
        count: usize,
    },

    #[error("{unit}: derived entity '{type_name}' must not declare primary key component '{property}'")]
    DerivedEntityPrimaryKey {
        unit: SourceId,
        type_name: String,
        property: String,
    },

    #[error("{unit}: primary key component '{property}' declared on non-entity '{type_name}'")]
    MisplacedPrimaryKey {
        unit: SourceId,
        type_name: String,
        property: String,
    },

    #[error("{unit}: malformed type '{expr}' on {type_name}.{property}: {reason}")]
    MalformedTypeExpr {
        unit: SourceId,
        type_name: String,
        property: String,
        expr: String,
        reason: String,
    },

    #[error("{unit}: enum '{type_name}' cannot use '{underlying}' as underlying type (integer primitive required)")]
    InvalidEnumUnderlying {
        unit: SourceId,
        type_name: String,
        underlying: String,
    },

    #[error("{unit}: value {value} of {type_name}.{element} is outside [{min}, {max}]")]
    EnumValueOutOfRange {
        unit: SourceId,
        type_name: String,
        element: String,
        value: i128,
        min: i128,
        max: i128,
    },

    #[error("{unit}: invalid value '{value}' for {type_name}.{element}")]
    InvalidEnumValue {
        unit: SourceId,
        type_name: String,
        element: String,
        value: String,
    },

    #[error("{unit}: duplicate element '{element}' in enum '{type_name}'")]
    DuplicateEnumElement {
        unit: SourceId,
        type_name: String,
        element: String,
    },

    // === Resolution ===
    #[error("{unit}: unknown import alias '{alias}' referenced from '{owner}'")]
    UnknownImportAlias {
        unit: SourceId,
        owner: String,
        alias: String,
    },

    #[error("{unit}: cannot resolve type '{reference}' referenced from '{owner}'{}", suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnresolvedType {
        unit: SourceId,
        owner: String,
        reference: String,
        suggestion: Option<String>,
    },

    #[error("{unit}: '{reference}' referenced from '{owner}' is {found}, expected {expected}")]
    KindMismatch {
        unit: SourceId,
        owner: String,
        reference: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{unit}: {type_name}.{property} has role {role} but its type '{reference}' is {found}")]
    RoleMismatch {
        unit: SourceId,
        type_name: String,
        property: String,
        role: &'static str,
        reference: String,
        found: &'static str,
    },

    #[error("{unit}: {type_name}.{property} uses '{found}' as {usage}, which is not key-capable")]
    KeyNotCapable {
        unit: SourceId,
        type_name: String,
        property: String,
        found: String,
        usage: KeyUsage,
    },

    #[error("{unit}: {type_name}.{property} cannot have type void")]
    VoidProperty {
        unit: SourceId,
        type_name: String,
        property: String,
    },

    #[error("{unit}: property name '{property}' collides on '{type_name}' after interface flattening")]
    PropertyCollision {
        unit: SourceId,
        type_name: String,
        property: String,
    },

    #[error("{unit}: inheritance cycle through '{type_name}'")]
    InheritanceCycle { unit: SourceId, type_name: String },

    // === Graph ===
    #[error("Schema sources have a circular import: {}", members.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" -> "))]
    ImportCycle { members: Vec<SourceId> },

    #[error("Schema name '{name}' registered by both {first} and {second}")]
    DuplicateSchemaName {
        name: String,
        first: SourceId,
        second: SourceId,
    },

    #[error("Schema {unit} is already registered")]
    DuplicateSchemaSource { unit: SourceId },

    #[error("Primitive type '{name}' is already registered")]
    DuplicatePrimitive { name: String },

    // === Generation ===
    #[error("{unit}: failed to generate '{type_name}': {message}")]
    Generation {
        unit: SourceId,
        type_name: String,
        message: String,
    },

    // === Config ===
    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl CompileError {
    /// The compiler phase this error belongs to
    pub fn phase(&self) -> ErrorPhase {
        match self {
            Self::SourceNotFound { .. } | Self::Io { .. } | Self::Json { .. } => ErrorPhase::Source,

            Self::InvalidIdentifier { .. }
            | Self::MissingAttribute { .. }
            | Self::DuplicateType { .. }
            | Self::DuplicateProperty { .. }
            | Self::DuplicateImportAlias { .. }
            | Self::PrimaryKeyArity { .. }
            | Self::DerivedEntityPrimaryKey { .. }
            | Self::MisplacedPrimaryKey { .. }
            | Self::MalformedTypeExpr { .. }
            | Self::InvalidEnumUnderlying { .. }
            | Self::EnumValueOutOfRange { .. }
            | Self::InvalidEnumValue { .. }
            | Self::DuplicateEnumElement { .. } => ErrorPhase::Structural,

            Self::UnknownImportAlias { .. }
            | Self::UnresolvedType { .. }
            | Self::KindMismatch { .. }
            | Self::RoleMismatch { .. }
            | Self::KeyNotCapable { .. }
            | Self::VoidProperty { .. }
            | Self::PropertyCollision { .. }
            | Self::InheritanceCycle { .. } => ErrorPhase::Resolution,

            Self::ImportCycle { .. }
            | Self::DuplicateSchemaName { .. }
            | Self::DuplicateSchemaSource { .. }
            | Self::DuplicatePrimitive { .. } => ErrorPhase::Graph,

            Self::Generation { .. } => ErrorPhase::Generation,

            Self::Config(_) => ErrorPhase::Config,
        }
    }
}
