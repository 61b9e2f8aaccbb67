//! Generic Container Catalog
//!
//! Four parametric shapes (list, set, map, optional) and the compact
//! notation used to spell container-typed properties:
//!
//! ```text
//! Employee[]        List<Employee>
//! Tag{}             Set<Tag>
//! string->int32     Map<string, int32>
//! Geo.Country?      Optional<Geo.Country>
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{is_identifier, DataType, PrimitiveId};

/// Shape of a generic container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerShape {
    List,
    Set,
    Map,
    Optional,
}

impl ContainerShape {
    pub const ALL: [ContainerShape; 4] = [
        ContainerShape::List,
        ContainerShape::Set,
        ContainerShape::Map,
        ContainerShape::Optional,
    ];

    pub fn default_name(&self) -> &'static str {
        match self {
            Self::List => "List",
            Self::Set => "Set",
            Self::Map => "Map",
            Self::Optional => "Optional",
        }
    }

    pub fn has_key(&self) -> bool {
        matches!(self, Self::Map)
    }
}

/// An uninstantiated container shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericContainer {
    pub name: String,
    pub shape: ContainerShape,
}

impl GenericContainer {
    pub fn new(name: impl Into<String>, shape: ContainerShape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Produce a concrete container. `key` is only meaningful for maps and is
    /// dropped for every other shape.
    pub fn instantiate(&self, key: Option<PrimitiveId>, value: DataType) -> InstancedContainer {
        InstancedContainer {
            shape: self.shape,
            key_type: if self.shape.has_key() { key } else { None },
            value_type: value,
        }
    }
}

/// A container with concrete key/value types
#[derive(Debug, Clone, PartialEq)]
pub struct InstancedContainer {
    pub shape: ContainerShape,
    /// Present only for [`ContainerShape::Map`]
    pub key_type: Option<PrimitiveId>,
    pub value_type: DataType,
}

/// The four container shapes under their configured names
#[derive(Debug, Clone)]
pub struct ContainerCatalog {
    containers: [GenericContainer; 4],
}

impl Default for ContainerCatalog {
    fn default() -> Self {
        Self::new(
            ContainerShape::List.default_name(),
            ContainerShape::Set.default_name(),
            ContainerShape::Map.default_name(),
            ContainerShape::Optional.default_name(),
        )
    }
}

impl ContainerCatalog {
    pub fn new(list: &str, set: &str, map: &str, optional: &str) -> Self {
        Self {
            containers: [
                GenericContainer::new(list, ContainerShape::List),
                GenericContainer::new(set, ContainerShape::Set),
                GenericContainer::new(map, ContainerShape::Map),
                GenericContainer::new(optional, ContainerShape::Optional),
            ],
        }
    }

    pub fn get(&self, shape: ContainerShape) -> &GenericContainer {
        match shape {
            ContainerShape::List => &self.containers[0],
            ContainerShape::Set => &self.containers[1],
            ContainerShape::Map => &self.containers[2],
            ContainerShape::Optional => &self.containers[3],
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&GenericContainer> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.containers.iter().map(|c| c.name.as_str())
    }
}

// =============================================================================
// Type expressions
// =============================================================================

/// `Name` or `Alias.Name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypePath {
    pub alias: Option<String>,
    pub name: String,
}

impl TypePath {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let segments: Vec<&str> = text.split('.').collect();

        match segments.as_slice() {
            [name] if is_identifier(name) => Ok(Self::local(*name)),
            [alias, name] if is_identifier(alias) && is_identifier(name) => Ok(Self {
                alias: Some(alias.to_string()),
                name: name.to_string(),
            }),
            _ if text.ends_with("[]") || text.ends_with("{}") || text.ends_with('?') || text.contains("->") => {
                Err("nested containers are not supported".to_string())
            }
            _ => Err(format!("'{}' is not a type name", text)),
        }
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}.{}", alias, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A parsed, still unresolved property type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Named(TypePath),
    Container {
        shape: ContainerShape,
        key: Option<TypePath>,
        value: TypePath,
    },
}

impl TypeExpr {
    /// Parse a property type.
    ///
    /// `key` and `value` are the separate attributes used by the long form
    /// (`type: "Map", key: "string", value: "int32"`).
    pub fn parse(
        text: &str,
        key: Option<&str>,
        value: Option<&str>,
        catalog: &ContainerCatalog,
    ) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("type is empty".to_string());
        }

        if let Some(container) = catalog.by_name(text) {
            return Self::parse_long_form(container.shape, key, value);
        }

        if key.is_some() || value.is_some() {
            return Err("key/value attributes are only valid with a container type".to_string());
        }

        if let Some(inner) = text.strip_suffix("[]") {
            return Ok(Self::container(ContainerShape::List, None, TypePath::parse(inner)?));
        }
        if let Some(inner) = text.strip_suffix("{}") {
            return Ok(Self::container(ContainerShape::Set, None, TypePath::parse(inner)?));
        }
        if let Some(inner) = text.strip_suffix('?') {
            return Ok(Self::container(ContainerShape::Optional, None, TypePath::parse(inner)?));
        }
        if text.contains("->") {
            let parts: Vec<&str> = text.split("->").collect();
            if parts.len() != 2 {
                return Err("map notation takes exactly one '->'".to_string());
            }
            return Ok(Self::container(
                ContainerShape::Map,
                Some(TypePath::parse(parts[0])?),
                TypePath::parse(parts[1])?,
            ));
        }

        Ok(TypeExpr::Named(TypePath::parse(text)?))
    }

    fn parse_long_form(shape: ContainerShape, key: Option<&str>, value: Option<&str>) -> Result<Self, String> {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => TypePath::parse(v)?,
            _ => return Err("container is missing its value type".to_string()),
        };

        let key = match (shape.has_key(), key.map(str::trim)) {
            (true, Some(k)) if !k.is_empty() => Some(TypePath::parse(k)?),
            (true, _) => return Err("map is missing its key type".to_string()),
            (false, Some(_)) => return Err("only maps take a key type".to_string()),
            (false, None) => None,
        };

        Ok(Self::container(shape, key, value))
    }

    fn container(shape: ContainerShape, key: Option<TypePath>, value: TypePath) -> Self {
        TypeExpr::Container { shape, key, value }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(path) => write!(f, "{}", path),
            TypeExpr::Container { shape, key, value } => match (shape, key) {
                (ContainerShape::List, _) => write!(f, "{}[]", value),
                (ContainerShape::Set, _) => write!(f, "{}{{}}", value),
                (ContainerShape::Optional, _) => write!(f, "{}?", value),
                (ContainerShape::Map, Some(key)) => write!(f, "{}->{}", key, value),
                (ContainerShape::Map, None) => write!(f, "?->{}", value),
            },
        }
    }
}
