//! Rust Code Emitter
//!
//! Generated code for schema `Foo` is meant to live in a module named
//! `foo`; references into imported schemas go through `super::<module>`.
//!
//! Mapping:
//! - entity / struct: `pub struct` over the effective properties
//! - entity: additionally a `<Name>Key` tuple alias and a `key()` accessor
//! - interface: `pub trait` with one getter per own property
//! - enum: fieldless `#[repr(<int>)]` enum
//! - schema: `<Name>Registry` with one map per concrete entity
//!
//! Foreign keys are stored as the target's key tuple, not the target itself.

use std::collections::HashSet;

use crate::config::CodegenConfig;
use crate::error::{CompileError, Result};
use crate::schema::{
    ContainerShape, DataType, Primitive, PrimitiveKind, Property, Schema, TypeKind, TypeRef,
    UserDefinedType,
};
use crate::source::PropertyRole;

use super::names::{field_ident, module_ident, type_ident};
use super::{Backend, Emitted, SchemaView};

type GenResult<T> = std::result::Result<T, String>;

/// Reference backend emitting plain Rust declarations
#[derive(Debug, Clone)]
pub struct RustBackend {
    derives: Vec<String>,
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::from_config(&CodegenConfig::default())
    }
}

impl RustBackend {
    /// `derives` are applied to generated structs
    pub fn new(derives: Vec<String>) -> Self {
        Self { derives }
    }

    pub fn from_config(config: &CodegenConfig) -> Self {
        Self::new(config.derives.clone())
    }
}

impl Backend for RustBackend {
    fn language(&self) -> &str {
        "rust"
    }

    fn file_extension(&self) -> &str {
        "rs"
    }

    fn emit_type(&self, view: &SchemaView<'_>, ty: TypeRef) -> Result<Emitted> {
        let declared = view.user_type(ty);
        let emitter = Emitter::new(self, view);
        let outcome = match declared.kind {
            TypeKind::Entity | TypeKind::Struct => emitter.composite(ty, declared),
            TypeKind::Interface => emitter.interface(ty, declared),
            TypeKind::Enum => emitter.enumeration(declared),
        };
        outcome.map_err(|message| CompileError::Generation {
            unit: view.schema().source.clone(),
            type_name: declared.name.clone(),
            message,
        })
    }

    fn emit_schema(&self, view: &SchemaView<'_>) -> Result<Option<Emitted>> {
        Emitter::new(self, view)
            .registry()
            .map_err(|message| CompileError::Generation {
                unit: view.schema().source.clone(),
                type_name: format!("{}Registry", view.name()),
                message,
            })
    }
}

// =============================================================================
// Emitter
// =============================================================================

struct Emitter<'b, 'a> {
    backend: &'b RustBackend,
    view: &'b SchemaView<'a>,
}

impl<'b, 'a> Emitter<'b, 'a> {
    fn new(backend: &'b RustBackend, view: &'b SchemaView<'a>) -> Self {
        Self { backend, view }
    }

    fn header(&self, out: &mut String, ty: &UserDefinedType) {
        out.push_str(&format!("// Generated by schemac from schema `{}`. Do not edit.\n", self.view.name()));
        out.push('\n');
        out.push_str(&format!("/// {} `{}`\n", capitalize(ty.kind.as_str()), ty.full_name()));
        for (key, value) in ty.metadata.iter() {
            out.push_str("///\n");
            out.push_str(&format!("/// `{}`: {}\n", key, value));
        }
    }

    // =========================================================================
    // Structs
    // =========================================================================

    fn composite(&self, r: TypeRef, ty: &UserDefinedType) -> GenResult<Emitted> {
        let name = type_ident(&ty.name)?;
        let properties = self.view.effective_properties(r);
        let mut out = String::new();
        let mut emitted = Emitted::default();

        self.header(&mut out, ty);
        let composite = ty.as_composite().ok_or("composite type without a composite body")?;
        if let Some(base) = composite.base_type() {
            out.push_str("///\n");
            out.push_str(&format!("/// Extends `{}`.\n", self.view.user_type(base).full_name()));
        }
        if composite.is_abstract {
            emitted.info("abstract type emitted as a concrete struct");
        }
        if !self.backend.derives.is_empty() {
            out.push_str(&format!("#[derive({})]\n", self.backend.derives.join(", ")));
        }
        out.push_str(&format!("pub struct {} {{\n", name));

        let mut seen = HashSet::new();
        for property in &properties {
            let field = field_ident(&property.name)?;
            if !seen.insert(field.clone()) {
                return Err(format!(
                    "property '{}' maps to field '{}', which is already taken",
                    property.name, field
                ));
            }
            let rust_type = self.property_type(r, property, &mut emitted)?;
            for line in property_doc(property) {
                out.push_str(&format!("    /// {}\n", line));
            }
            out.push_str(&format!("    pub {}: {},\n", field, rust_type));
        }
        out.push_str("}\n");

        if ty.kind == TypeKind::Entity {
            self.entity_key(&mut out, r, ty, &name, &mut emitted)?;
        }

        for interface in self.implemented_interfaces(r) {
            self.interface_impl(&mut out, r, interface, &name, &mut emitted)?;
        }

        emitted.code = out;
        Ok(emitted)
    }

    fn entity_key(
        &self,
        out: &mut String,
        r: TypeRef,
        ty: &UserDefinedType,
        name: &str,
        emitted: &mut Emitted,
    ) -> GenResult<()> {
        let layout = self
            .view
            .primary_key(r)
            .ok_or_else(|| format!("entity '{}' has no primary key", ty.name))?;

        let mut types = Vec::new();
        let mut fields = Vec::new();
        for component in &layout.components {
            if !is_hashable(component.kind) {
                emitted.warning(format!(
                    "key component '{}' is floating point; the key tuple is not hashable",
                    component.name
                ));
            }
            let component_type = self.primitive_type(self.view.context().primitive(component.primitive))?;
            types.push(component_type);
            fields.push(format!("self.{}.clone()", field_ident(&component.name)?));
        }

        out.push('\n');
        out.push_str(&format!("/// Primary key of [`{}`]\n", name));
        out.push_str(&format!("pub type {}Key = {};\n", ty.name, tuple(&types)));
        out.push('\n');
        out.push_str(&format!("impl {} {{\n", name));
        out.push_str(&format!("    pub fn key(&self) -> {}Key {{\n", ty.name));
        out.push_str(&format!("        {}\n", tuple(&fields)));
        out.push_str("    }\n");
        out.push_str("}\n");
        Ok(())
    }

    /// Interfaces of `r` and its base chain, with everything they extend
    fn implemented_interfaces(&self, r: TypeRef) -> Vec<TypeRef> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(r);
        while let Some(c) = current {
            let Some(composite) = self.view.user_type(c).as_composite() else { break };
            for interface in composite.interface_refs() {
                self.collect_interface(*interface, &mut seen, &mut order);
            }
            current = composite.base_type();
        }
        order
    }

    fn collect_interface(&self, r: TypeRef, seen: &mut HashSet<TypeRef>, order: &mut Vec<TypeRef>) {
        if !seen.insert(r) {
            return;
        }
        if let Some(composite) = self.view.user_type(r).as_composite() {
            for parent in composite.interface_refs() {
                self.collect_interface(*parent, seen, order);
            }
        }
        order.push(r);
    }

    fn interface_impl(
        &self,
        out: &mut String,
        owner: TypeRef,
        interface: TypeRef,
        name: &str,
        emitted: &mut Emitted,
    ) -> GenResult<()> {
        let trait_ty = self.view.user_type(interface);
        let trait_path = self.path_to(interface, &type_ident(&trait_ty.name)?)?;

        out.push('\n');
        out.push_str(&format!("impl {} for {} {{\n", trait_path, name));
        for property in trait_ty.properties() {
            let field = field_ident(&property.name)?;
            let rust_type = self.property_type(owner, property, emitted)?;
            out.push_str(&format!("    fn {}(&self) -> &{} {{\n", field, rust_type));
            out.push_str(&format!("        &self.{}\n", field));
            out.push_str("    }\n");
        }
        out.push_str("}\n");
        Ok(())
    }

    // =========================================================================
    // Traits
    // =========================================================================

    fn interface(&self, r: TypeRef, ty: &UserDefinedType) -> GenResult<Emitted> {
        let name = type_ident(&ty.name)?;
        let composite = ty.as_composite().ok_or("interface without a composite body")?;
        let mut out = String::new();
        let mut emitted = Emitted::default();

        self.header(&mut out, ty);
        let supertraits = composite
            .interface_refs()
            .iter()
            .map(|p| self.path_to(*p, &type_ident(&self.view.user_type(*p).name)?))
            .collect::<GenResult<Vec<_>>>()?;
        if supertraits.is_empty() {
            out.push_str(&format!("pub trait {} {{\n", name));
        } else {
            out.push_str(&format!("pub trait {}: {} {{\n", name, supertraits.join(" + ")));
        }
        for property in &composite.properties {
            for line in property_doc(property) {
                out.push_str(&format!("    /// {}\n", line));
            }
            let rust_type = self.property_type(r, property, &mut emitted)?;
            out.push_str(&format!("    fn {}(&self) -> &{};\n", field_ident(&property.name)?, rust_type));
        }
        out.push_str("}\n");

        emitted.code = out;
        Ok(emitted)
    }

    // =========================================================================
    // Enums
    // =========================================================================

    fn enumeration(&self, ty: &UserDefinedType) -> GenResult<Emitted> {
        let name = type_ident(&ty.name)?;
        let body = ty.as_enum().ok_or("enum without an enum body")?;
        let repr = int_type(self.view.context().primitive(body.underlying).kind)
            .ok_or("enum underlying type is not an integer")?;
        let mut out = String::new();
        let mut emitted = Emitted::default();

        let mut values = HashSet::new();
        for element in &body.elements {
            if !values.insert(element.value) {
                return Err(format!(
                    "element '{}' repeats value {}; Rust discriminants must be distinct",
                    element.name, element.value
                ));
            }
        }

        self.header(&mut out, ty);
        out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]\n");
        if body.elements.is_empty() {
            emitted.warning("enum has no elements and cannot carry a repr");
        } else {
            out.push_str(&format!("#[repr({})]\n", repr));
        }
        out.push_str(&format!("pub enum {} {{\n", name));
        for element in &body.elements {
            for (key, value) in element.metadata.iter() {
                out.push_str(&format!("    /// `{}`: {}\n", key, value));
            }
            out.push_str(&format!("    {} = {},\n", type_ident(&element.name)?, element.value));
        }
        out.push_str("}\n");

        if !body.elements.is_empty() {
            out.push('\n');
            out.push_str(&format!("impl {} {{\n", name));
            out.push_str(&format!("    pub const fn value(self) -> {} {{\n", repr));
            out.push_str(&format!("        self as {}\n", repr));
            out.push_str("    }\n");
            out.push_str("}\n");
        }

        emitted.code = out;
        Ok(emitted)
    }

    // =========================================================================
    // Registry
    // =========================================================================

    fn registry(&self) -> GenResult<Option<Emitted>> {
        let schema = self.view.schema();
        let entities: Vec<(TypeRef, &UserDefinedType)> =
            self.view.types().filter(|(_, t)| is_concrete_entity(t)).collect();
        let imports: Vec<(&str, &Schema)> = self
            .view
            .imports()
            .filter(|(_, s)| self.has_registry(s))
            .collect();

        if entities.is_empty() && imports.is_empty() {
            return Ok(None);
        }

        let name = type_ident(&format!("{}Registry", schema.name))?;
        let mut out = String::new();
        let mut emitted = Emitted::default();
        let mut seen = HashSet::new();
        let mut claim = |field: &str| {
            if seen.insert(field.to_string()) {
                Ok(())
            } else {
                Err(format!("registry field '{}' is declared twice", field))
            }
        };

        out.push_str(&format!("// Generated by schemac from schema `{}`. Do not edit.\n", schema.name));
        out.push('\n');
        out.push_str(&format!("/// Repositories for the entities of schema `{}`\n", schema.name));
        out.push_str("#[derive(Default)]\n");
        out.push_str(&format!("pub struct {} {{\n", name));
        for (r, entity) in &entities {
            let field = field_ident(&entity.name)?;
            claim(&field)?;
            if self.key_has_float(*r) {
                emitted.warning(format!("'{}' is keyed by a floating point value", entity.name));
            }
            out.push_str(&format!(
                "    pub {}: std::collections::HashMap<{}Key, {}>,\n",
                field,
                entity.name,
                type_ident(&entity.name)?
            ));
        }
        for (alias, imported) in &imports {
            let field = field_ident(alias)?;
            claim(&field)?;
            out.push_str(&format!(
                "    pub {}: super::{}::{}Registry,\n",
                field,
                module_ident(&imported.name)?,
                imported.name
            ));
        }
        out.push_str("}\n");

        if !entities.is_empty() {
            out.push('\n');
            out.push_str(&format!("impl {} {{\n", name));
            for (i, (_, entity)) in entities.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                let entity_name = type_ident(&entity.name)?;
                let field = field_ident(&entity.name)?;
                out.push_str(&format!(
                    "    pub fn insert_{}(&mut self, value: {}) -> Option<{}> {{\n",
                    field.trim_start_matches("r#"),
                    entity_name,
                    entity_name
                ));
                out.push_str(&format!("        self.{}.insert(value.key(), value)\n", field));
                out.push_str("    }\n");
            }
            out.push_str("}\n");
        }

        emitted.code = out;
        Ok(Some(emitted))
    }

    fn has_registry(&self, schema: &Schema) -> bool {
        schema.types.iter().any(is_concrete_entity)
            || schema
                .imports
                .iter()
                .filter(|(_, key)| *key != schema.key)
                .any(|(_, key)| self.has_registry(self.view.context().schema(*key)))
    }

    fn key_has_float(&self, r: TypeRef) -> bool {
        self.view.primary_key(r).is_some_and(|layout| {
            layout.components.iter().any(|c| !is_hashable(c.kind))
        })
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn property_type(&self, owner: TypeRef, property: &Property, emitted: &mut Emitted) -> GenResult<String> {
        match property.data_type() {
            DataType::InstancedContainer(c) => {
                let value = self.leaf_type(owner, property, &c.value_type, c.shape == ContainerShape::Optional)?;
                match c.shape {
                    ContainerShape::List => Ok(format!("Vec<{}>", value)),
                    ContainerShape::Optional => Ok(format!("Option<{}>", value)),
                    ContainerShape::Set => {
                        if matches!(&c.value_type, DataType::Primitive(id) if !is_hashable(self.view.context().primitive(*id).kind))
                        {
                            emitted.warning(format!("set '{}' holds floating point values", property.name));
                        }
                        Ok(format!("std::collections::HashSet<{}>", value))
                    }
                    ContainerShape::Map => {
                        let key_id = c.key_type.ok_or_else(|| format!("map '{}' has no key type", property.name))?;
                        let key = self.view.context().primitive(key_id);
                        if !is_hashable(key.kind) {
                            emitted.warning(format!("map '{}' is keyed by a floating point value", property.name));
                        }
                        Ok(format!("std::collections::HashMap<{}, {}>", self.primitive_type(key)?, value))
                    }
                }
            }
            other => self.leaf_type(owner, property, other, true),
        }
    }

    /// `inline`: the value is stored in place (direct or optional), so a
    /// reference that leads back to the owner must be boxed
    fn leaf_type(&self, owner: TypeRef, property: &Property, ty: &DataType, inline: bool) -> GenResult<String> {
        match ty {
            DataType::Primitive(id) => self.primitive_type(self.view.context().primitive(*id)),
            DataType::Entity(r) if property.role == PropertyRole::ForeignKey => {
                self.path_to(*r, &format!("{}Key", self.view.user_type(*r).name))
            }
            DataType::Struct(r) | DataType::Enum(r) | DataType::Entity(r) => {
                let path = self.path_to(*r, &type_ident(&self.view.user_type(*r).name)?)?;
                if inline && (*r == owner || self.inlines(*r, owner)) {
                    Ok(format!("Box<{}>", path))
                } else {
                    Ok(path)
                }
            }
            DataType::Interface(r) => Err(format!(
                "property '{}' is typed by interface '{}', which has no concrete Rust representation",
                property.name,
                self.view.user_type(*r).name
            )),
            DataType::Void | DataType::GenericContainer(_) | DataType::InstancedContainer(_) => Err(format!(
                "property '{}' has unsupported type '{}'",
                property.name,
                self.view.type_name(ty)
            )),
        }
    }

    /// Whether `from` stores `to` in place, directly or through other inline fields
    fn inlines(&self, from: TypeRef, to: TypeRef) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            for property in self.view.effective_properties(current) {
                if let Some(next) = inline_target(property) {
                    if next == to {
                        return true;
                    }
                    stack.push(next);
                }
            }
        }
        false
    }

    fn primitive_type(&self, primitive: &Primitive) -> GenResult<String> {
        if let Some(ty) = int_type(primitive.kind) {
            return Ok(ty.to_string());
        }
        let ty = match primitive.kind {
            PrimitiveKind::Float => "f32",
            PrimitiveKind::Double => "f64",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::String => "String",
            _ => {
                let name = type_ident(&primitive.name)?;
                if primitive.namespace.is_empty() {
                    return Ok(name);
                }
                let mut path = primitive
                    .namespace
                    .split('.')
                    .map(field_ident)
                    .collect::<GenResult<Vec<_>>>()?;
                path.push(name);
                return Ok(path.join("::"));
            }
        };
        Ok(ty.to_string())
    }

    /// `ident` as seen from the schema being generated
    fn path_to(&self, r: TypeRef, ident: &str) -> GenResult<String> {
        if r.schema == self.view.schema().key {
            Ok(ident.to_string())
        } else {
            let schema = self.view.context().schema(r.schema);
            Ok(format!("super::{}::{}", module_ident(&schema.name)?, ident))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn int_type(kind: PrimitiveKind) -> Option<&'static str> {
    match kind {
        PrimitiveKind::UInt8 => Some("u8"),
        PrimitiveKind::UInt16 => Some("u16"),
        PrimitiveKind::UInt32 => Some("u32"),
        PrimitiveKind::UInt64 => Some("u64"),
        PrimitiveKind::Int8 => Some("i8"),
        PrimitiveKind::Int16 => Some("i16"),
        PrimitiveKind::Int32 => Some("i32"),
        PrimitiveKind::Int64 => Some("i64"),
        _ => None,
    }
}

fn is_hashable(kind: PrimitiveKind) -> bool {
    !matches!(kind, PrimitiveKind::Float | PrimitiveKind::Double)
}

fn is_concrete_entity(ty: &UserDefinedType) -> bool {
    ty.kind == TypeKind::Entity && ty.as_composite().is_some_and(|c| !c.is_abstract)
}

/// Composite stored in place by `property`; foreign keys hold only a key tuple
fn inline_target(property: &Property) -> Option<TypeRef> {
    let leaf = match property.data_type() {
        DataType::InstancedContainer(c) if c.shape == ContainerShape::Optional => &c.value_type,
        other => other,
    };
    match leaf {
        DataType::Struct(r) => Some(*r),
        DataType::Entity(r) if property.role != PropertyRole::ForeignKey => Some(*r),
        _ => None,
    }
}

fn tuple(items: &[String]) -> String {
    if items.len() == 1 {
        format!("({},)", items[0])
    } else {
        format!("({})", items.join(", "))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn property_doc(property: &Property) -> Vec<String> {
    let mut lines = Vec::new();
    match property.role {
        PropertyRole::PrimaryKey => lines.push("Primary key component.".to_string()),
        PropertyRole::ForeignKey => lines.push("Foreign key.".to_string()),
        PropertyRole::Plain => {}
    }
    if let Some(default) = &property.default_value {
        lines.push(format!("Default: `{}`.", default));
    }
    for (key, value) in property.metadata.iter() {
        lines.push(format!("`{}`: {}", key, value));
    }
    lines
}
