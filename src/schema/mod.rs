//! Schema Data Model
//!
//! Schemas own their user-defined types in a per-schema arena (`Vec`); every
//! cross-reference is a handle ([`TypeRef`] = schema key + index) rather than
//! an owning pointer, so base chains, interface graphs and entity-to-entity
//! foreign keys can form cycles freely.
//!
//! References made at declaration time are [`Binding`]s, resolved once by the
//! fixup pass.

pub mod binding;
pub mod container;
pub mod key;
pub mod primitive;

pub use binding::Binding;
pub use container::{ContainerCatalog, ContainerShape, GenericContainer, InstancedContainer, TypeExpr, TypePath};
pub use key::{KeyComponent, KeyError, KeyValue, PrimaryKey, PrimaryKeyLayout};
pub use primitive::{Primitive, PrimitiveId, PrimitiveKind, PrimitiveRegistry};

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::source::{MetadataDecl, PropertyRole, SourceId};

/// Name of the void type; reserved in every schema
pub const VOID_NAME: &str = "void";

/// Hard ceiling on primary key components
pub const MAX_PRIMARY_KEY_ARITY: usize = 7;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap());

pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER.is_match(text)
}

/// Dot-separated identifiers, or empty
pub fn is_namespace(text: &str) -> bool {
    text.is_empty() || NAMESPACE.is_match(text)
}

// =============================================================================
// Handles
// =============================================================================

/// Index of a schema in the compilation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaKey(pub(crate) usize);

impl SchemaKey {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a user-defined type: owning schema + arena index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    pub schema: SchemaKey,
    pub index: usize,
}

impl TypeRef {
    pub fn new(schema: SchemaKey, index: usize) -> Self {
        Self { schema, index }
    }
}

/// Handle to a property declared directly on a composite type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    pub owner: TypeRef,
    pub index: usize,
}

// =============================================================================
// DataType
// =============================================================================

/// Concrete kind of a user-defined type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Entity,
    Struct,
    Interface,
    Enum,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Entity => "entity",
            TypeKind::Struct => "struct",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
        }
    }

    /// Same wording as [`DataType::kind_name`]
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeKind::Entity => "an entity",
            TypeKind::Struct => "a struct",
            TypeKind::Interface => "an interface",
            TypeKind::Enum => "an enum",
        }
    }

    /// Wrap a handle into the matching [`DataType`] variant
    pub fn data_type(&self, r: TypeRef) -> DataType {
        match self {
            TypeKind::Entity => DataType::Entity(r),
            TypeKind::Struct => DataType::Struct(r),
            TypeKind::Interface => DataType::Interface(r),
            TypeKind::Enum => DataType::Enum(r),
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every type a property, base clause or interface clause can refer to
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Primitive(PrimitiveId),
    GenericContainer(ContainerShape),
    InstancedContainer(Box<InstancedContainer>),
    Void,
    Entity(TypeRef),
    Struct(TypeRef),
    Interface(TypeRef),
    Enum(TypeRef),
}

impl DataType {
    /// Human-readable kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            DataType::Primitive(_) => "a primitive",
            DataType::GenericContainer(_) => "a generic container",
            DataType::InstancedContainer(_) => "a container",
            DataType::Void => "void",
            DataType::Entity(_) => "an entity",
            DataType::Struct(_) => "a struct",
            DataType::Interface(_) => "an interface",
            DataType::Enum(_) => "an enum",
        }
    }

    pub fn user_defined(&self) -> Option<TypeRef> {
        match self {
            DataType::Entity(r) | DataType::Struct(r) | DataType::Interface(r) | DataType::Enum(r) => Some(*r),
            DataType::Primitive(_)
            | DataType::GenericContainer(_)
            | DataType::InstancedContainer(_)
            | DataType::Void => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, DataType::Entity(_))
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Ordered key/value annotations, opaque to the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[MetadataDecl]> for Metadata {
    fn from(decls: &[MetadataDecl]) -> Self {
        Self(decls.iter().map(|d| (d.key.clone(), d.value.clone())).collect())
    }
}

// =============================================================================
// User-defined types
// =============================================================================

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub role: PropertyRole,
    pub ty: Binding<TypeExpr, DataType>,
    pub default_value: Option<String>,
    pub metadata: Metadata,
}

impl Property {
    /// Resolved type; only valid after fixup
    pub fn data_type(&self) -> &DataType {
        self.ty.get()
    }
}

/// Shared shape of entities, structs and interfaces
#[derive(Debug, Clone)]
pub struct CompositeType {
    pub is_abstract: bool,
    /// Single-inheritance base (never set on interfaces)
    pub base: Binding<Option<TypePath>, Option<TypeRef>>,
    /// Directly implemented interfaces; for an interface, the ones it extends
    pub interfaces: Binding<Vec<TypePath>, Vec<TypeRef>>,
    /// Declared directly on this type
    pub properties: Vec<Property>,
}

impl CompositeType {
    pub fn base_type(&self) -> Option<TypeRef> {
        *self.base.get()
    }

    pub fn interface_refs(&self) -> &[TypeRef] {
        self.interfaces.get()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumElement {
    pub name: String,
    pub value: i128,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub underlying: PrimitiveId,
    pub elements: Vec<EnumElement>,
}

#[derive(Debug, Clone)]
pub enum TypeBody {
    Composite(CompositeType),
    Enum(EnumType),
}

#[derive(Debug, Clone)]
pub struct UserDefinedType {
    pub name: String,
    pub namespace: String,
    pub kind: TypeKind,
    /// Owning schema (non-owning back reference)
    pub schema: SchemaKey,
    pub body: TypeBody,
    pub metadata: Metadata,
}

impl UserDefinedType {
    pub fn as_composite(&self) -> Option<&CompositeType> {
        match &self.body {
            TypeBody::Composite(c) => Some(c),
            TypeBody::Enum(_) => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut CompositeType> {
        match &mut self.body {
            TypeBody::Composite(c) => Some(c),
            TypeBody::Enum(_) => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match &self.body {
            TypeBody::Enum(e) => Some(e),
            TypeBody::Composite(_) => None,
        }
    }

    /// `Namespace.Name`, or just the name in the global namespace
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Properties declared directly on this type (empty for enums)
    pub fn properties(&self) -> &[Property] {
        self.as_composite().map(|c| c.properties.as_slice()).unwrap_or(&[])
    }
}

// =============================================================================
// Schema
// =============================================================================

/// One compiled schema source
#[derive(Debug, Clone)]
pub struct Schema {
    pub key: SchemaKey,
    pub source: SourceId,
    pub name: String,
    pub namespace: String,
    /// Import alias -> imported schema, in declaration order
    pub imports: Vec<(String, SchemaKey)>,
    /// Declaration order preserved
    pub types: Vec<UserDefinedType>,
    pub metadata: Metadata,
    type_index: HashMap<String, usize>,
    effective: HashMap<usize, Vec<PropertyRef>>,
    key_owner: HashMap<usize, TypeRef>,
    key_layouts: HashMap<usize, PrimaryKeyLayout>,
}

impl Schema {
    pub fn new(key: SchemaKey, source: SourceId, name: String, namespace: String) -> Self {
        Self {
            key,
            source,
            name,
            namespace,
            imports: Vec::new(),
            types: Vec::new(),
            metadata: Metadata::default(),
            type_index: HashMap::new(),
            effective: HashMap::new(),
            key_owner: HashMap::new(),
            key_layouts: HashMap::new(),
        }
    }

    /// Append a type, returning its handle. Name uniqueness is the caller's
    /// responsibility (see [`Schema::type_index`]).
    pub fn push_type(&mut self, ty: UserDefinedType) -> TypeRef {
        let index = self.types.len();
        self.type_index.insert(ty.name.clone(), index);
        self.types.push(ty);
        TypeRef::new(self.key, index)
    }

    pub fn type_index(&self, name: &str) -> Option<usize> {
        self.type_index.get(name).copied()
    }

    pub fn find_type(&self, name: &str) -> Option<&UserDefinedType> {
        self.type_index(name).map(|i| &self.types[i])
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name.as_str())
    }

    pub fn import(&self, alias: &str) -> Option<SchemaKey> {
        self.imports.iter().find(|(a, _)| a == alias).map(|(_, k)| *k)
    }

    /// Number of bindings still awaiting fixup
    pub fn unresolved_count(&self) -> usize {
        self.types
            .iter()
            .filter_map(|t| t.as_composite())
            .map(|c| {
                usize::from(!c.base.is_resolved())
                    + usize::from(!c.interfaces.is_resolved())
                    + c.properties.iter().filter(|p| !p.ty.is_resolved()).count()
            })
            .sum()
    }

    /// Flattened property list of a composite type (inherited + own)
    pub fn effective_properties(&self, index: usize) -> &[PropertyRef] {
        self.effective.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Root entity whose key this entity uses (itself for a root entity)
    pub fn key_owner(&self, index: usize) -> Option<TypeRef> {
        self.key_owner.get(&index).copied()
    }

    /// Key layout declared by a root entity of this schema
    pub fn key_layout(&self, index: usize) -> Option<&PrimaryKeyLayout> {
        self.key_layouts.get(&index)
    }

    pub(crate) fn set_effective(&mut self, index: usize, properties: Vec<PropertyRef>) {
        self.effective.insert(index, properties);
    }

    pub(crate) fn set_key_owner(&mut self, index: usize, owner: TypeRef) {
        self.key_owner.insert(index, owner);
    }

    pub(crate) fn set_key_layout(&mut self, index: usize, layout: PrimaryKeyLayout) {
        self.key_layouts.insert(index, layout);
    }
}
