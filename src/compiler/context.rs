//! Compilation Context
//!
//! Append-only registry of primitives, container shapes and published
//! schemas. Schemas are addressed by [`SchemaKey`] (arena index) and looked
//! up by source id or declared name.

use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, Result};
use crate::schema::{
    ContainerCatalog, ContainerShape, DataType, PrimaryKeyLayout, Primitive, PrimitiveId, PrimitiveRegistry, Property, PropertyRef,
    Schema, SchemaKey, TypeRef, UserDefinedType, VOID_NAME,
};
use crate::source::SourceId;

#[derive(Debug, Clone)]
pub struct CompilationContext {
    primitives: PrimitiveRegistry,
    containers: ContainerCatalog,
    default_enum_underlying: Option<PrimitiveId>,
    schemas: Vec<Schema>,
    by_source: HashMap<SourceId, SchemaKey>,
    by_name: HashMap<String, SchemaKey>,
    reserved: HashSet<String>,
}

impl CompilationContext {
    pub fn new(
        primitives: PrimitiveRegistry,
        containers: ContainerCatalog,
        default_enum_underlying: Option<PrimitiveId>,
    ) -> Self {
        let mut reserved: HashSet<String> = primitives.names().map(str::to_string).collect();
        reserved.extend(containers.names().map(str::to_string));
        reserved.insert(VOID_NAME.to_string());

        Self {
            primitives,
            containers,
            default_enum_underlying,
            schemas: Vec::new(),
            by_source: HashMap::new(),
            by_name: HashMap::new(),
            reserved,
        }
    }

    pub fn primitives(&self) -> &PrimitiveRegistry {
        &self.primitives
    }

    pub fn primitive(&self, id: PrimitiveId) -> &Primitive {
        self.primitives.get(id)
    }

    pub fn containers(&self) -> &ContainerCatalog {
        &self.containers
    }

    pub fn default_enum_underlying(&self) -> Option<PrimitiveId> {
        self.default_enum_underlying
    }

    /// `void` and every primitive and container name
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Key the next registered schema will receive
    pub fn next_key(&self) -> SchemaKey {
        SchemaKey(self.schemas.len())
    }

    /// Publish a fixed-up schema under its source id and name
    pub fn register(&mut self, schema: Schema) -> Result<SchemaKey> {
        if self.by_source.contains_key(&schema.source) {
            return Err(CompileError::DuplicateSchemaSource {
                unit: schema.source.clone(),
            });
        }
        if let Some(&existing) = self.by_name.get(&schema.name) {
            return Err(CompileError::DuplicateSchemaName {
                name: schema.name.clone(),
                first: self.schemas[existing.0].source.clone(),
                second: schema.source.clone(),
            });
        }

        let key = self.next_key();
        debug_assert_eq!(schema.key, key, "schema declared against a stale key");
        self.by_source.insert(schema.source.clone(), key);
        self.by_name.insert(schema.name.clone(), key);
        self.schemas.push(schema);
        Ok(key)
    }

    /// Drop every schema registered at or after `len`
    pub(crate) fn truncate(&mut self, len: usize) {
        for schema in self.schemas.drain(len..) {
            self.by_source.remove(&schema.source);
            self.by_name.remove(&schema.name);
        }
    }

    pub fn schema(&self, key: SchemaKey) -> &Schema {
        &self.schemas[key.0]
    }

    pub fn schema_by_source(&self, source: &SourceId) -> Option<&Schema> {
        self.by_source.get(source).map(|k| self.schema(*k))
    }

    pub fn schema_by_name(&self, name: &str) -> Option<&Schema> {
        self.by_name.get(name).map(|k| self.schema(*k))
    }

    /// Published schemas in registration (dependency) order
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn user_type(&self, r: TypeRef) -> &UserDefinedType {
        &self.schema(r.schema).types[r.index]
    }

    pub fn property(&self, r: PropertyRef) -> &Property {
        &self.user_type(r.owner).properties()[r.index]
    }

    /// Flattened properties of a composite type
    pub fn effective_properties(&self, r: TypeRef) -> Vec<&Property> {
        self.schema(r.schema)
            .effective_properties(r.index)
            .iter()
            .map(|p| self.property(*p))
            .collect()
    }

    /// Key layout of an entity, following derived entities to their root
    pub fn primary_key(&self, r: TypeRef) -> Option<&PrimaryKeyLayout> {
        let owner = self.schema(r.schema).key_owner(r.index)?;
        self.schema(owner.schema).key_layout(owner.index)
    }

    pub fn type_name(&self, ty: &DataType) -> String {
        Scope::published(self).type_name(ty)
    }
}

/// Read access to every declared type: published schemas plus, while a unit
/// is being compiled, that unit's own schema.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub context: &'a CompilationContext,
    current: Option<&'a Schema>,
}

impl<'a> Scope<'a> {
    pub fn new(context: &'a CompilationContext, current: &'a Schema) -> Self {
        Self {
            context,
            current: Some(current),
        }
    }

    pub fn published(context: &'a CompilationContext) -> Self {
        Self { context, current: None }
    }

    /// The unit being compiled, if any
    pub fn current(&self) -> Option<&'a Schema> {
        self.current
    }

    pub fn schema(&self, key: SchemaKey) -> &'a Schema {
        match self.current {
            Some(current) if current.key == key => current,
            _ => self.context.schema(key),
        }
    }

    pub fn user_type(&self, r: TypeRef) -> &'a UserDefinedType {
        &self.schema(r.schema).types[r.index]
    }

    pub fn property(&self, r: PropertyRef) -> &'a Property {
        &self.user_type(r.owner).properties()[r.index]
    }

    /// Display form of a resolved type, in compact container notation
    pub fn type_name(&self, ty: &DataType) -> String {
        match ty {
            DataType::Primitive(id) => self.context.primitive(*id).name.clone(),
            DataType::GenericContainer(shape) => self.context.containers().get(*shape).name.clone(),
            DataType::InstancedContainer(c) => {
                let value = self.type_name(&c.value_type);
                match (c.shape, c.key_type) {
                    (ContainerShape::List, _) => format!("{}[]", value),
                    (ContainerShape::Set, _) => format!("{}{{}}", value),
                    (ContainerShape::Optional, _) => format!("{}?", value),
                    (ContainerShape::Map, key) => {
                        let key = key.map(|k| self.context.primitive(k).name.clone()).unwrap_or_default();
                        format!("{}->{}", key, value)
                    }
                }
            }
            DataType::Void => VOID_NAME.to_string(),
            DataType::Entity(r) | DataType::Struct(r) | DataType::Interface(r) | DataType::Enum(r) => {
                self.user_type(*r).name.clone()
            }
        }
    }
}
