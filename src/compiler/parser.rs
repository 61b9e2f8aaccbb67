//! Schema Parser
//!
//! Declaration pass: turns one source's declarations into a [`Schema`] whose
//! cross-references are all still [`Binding::Unresolved`]. Everything that can
//! be checked without looking at other types (identifiers, duplicates, key
//! arity, enum ranges, type notation) is checked here.

use std::collections::HashSet;

use super::context::CompilationContext;
use crate::error::{CompileError, Result};
use crate::schema::{
    is_identifier, is_namespace, Binding, CompositeType, EnumElement, EnumType, Metadata, Property, Schema, TypeBody,
    TypeExpr, TypeKind, TypePath, UserDefinedType, MAX_PRIMARY_KEY_ARITY,
};
use crate::source::{
    CompositeDecl, EnumDecl, InterfaceDecl, PropertyDecl, PropertyRole, SchemaDecl, SourceId, TypeDecl,
};

/// Declare every type of `decl` against the next free schema key.
///
/// Imports must already be published in `context`; the sequencer guarantees it.
pub fn declare(context: &CompilationContext, unit: &SourceId, decl: &SchemaDecl) -> Result<Schema> {
    Declarer { context, unit }.schema(decl)
}

struct Declarer<'a> {
    context: &'a CompilationContext,
    unit: &'a SourceId,
}

impl Declarer<'_> {
    fn schema(&self, decl: &SchemaDecl) -> Result<Schema> {
        let name = self.identifier(decl.name.as_deref(), "schema", self.unit.as_str())?;
        let namespace = self.namespace(decl.namespace.as_deref())?;

        let mut schema = Schema::new(self.context.next_key(), self.unit.clone(), name, namespace);
        schema.metadata = Metadata::from(decl.metadata.as_slice());

        for import in &decl.imports {
            let (alias, key) = if &import.source == self.unit {
                (import.alias.clone().unwrap_or_else(|| schema.name.clone()), schema.key)
            } else {
                let target = self
                    .context
                    .schema_by_source(&import.source)
                    .ok_or_else(|| CompileError::SourceNotFound {
                        unit: import.source.clone(),
                    })?;
                (import.alias.clone().unwrap_or_else(|| target.name.clone()), target.key)
            };

            let alias = self.identifier(Some(&alias), "import alias", &alias)?;
            if schema.import(&alias).is_some() {
                return Err(CompileError::DuplicateImportAlias {
                    unit: self.unit.clone(),
                    alias,
                });
            }
            schema.imports.push((alias, key));
        }

        for (position, ty) in decl.types.iter().enumerate() {
            let owner = format!("type #{}", position + 1);
            let name = self.identifier(ty.name(), "type", &owner)?;
            if schema.type_index(&name).is_some() {
                return Err(CompileError::DuplicateType {
                    unit: self.unit.clone(),
                    type_name: name,
                });
            }

            let declared = match ty {
                TypeDecl::Entity(d) => self.composite(&schema, name, TypeKind::Entity, d)?,
                TypeDecl::Struct(d) => self.composite(&schema, name, TypeKind::Struct, d)?,
                TypeDecl::Interface(d) => self.interface(&schema, name, d)?,
                TypeDecl::Enum(d) => self.enumeration(&schema, name, d)?,
            };
            schema.push_type(declared);
        }

        Ok(schema)
    }

    fn composite(&self, schema: &Schema, name: String, kind: TypeKind, decl: &CompositeDecl) -> Result<UserDefinedType> {
        let base = decl
            .extends
            .as_deref()
            .map(|text| self.type_path(&name, "extends", text))
            .transpose()?;
        let interfaces = decl
            .implements
            .iter()
            .map(|text| self.type_path(&name, "implements", text))
            .collect::<Result<Vec<_>>>()?;
        let properties = self.properties(&name, &decl.properties)?;

        let key_components: Vec<&Property> = properties
            .iter()
            .filter(|p| p.role == PropertyRole::PrimaryKey)
            .collect();

        match (kind, base.is_some(), key_components.first()) {
            (TypeKind::Entity, true, Some(component)) => {
                return Err(CompileError::DerivedEntityPrimaryKey {
                    unit: self.unit.clone(),
                    type_name: name,
                    property: component.name.clone(),
                });
            }
            (TypeKind::Entity, false, _) => {
                if key_components.is_empty() || key_components.len() > MAX_PRIMARY_KEY_ARITY {
                    return Err(CompileError::PrimaryKeyArity {
                        unit: self.unit.clone(),
                        type_name: name,
                        count: key_components.len(),
                    });
                }
            }
            (TypeKind::Entity, true, None) => {}
            (_, _, Some(component)) => {
                return Err(CompileError::MisplacedPrimaryKey {
                    unit: self.unit.clone(),
                    type_name: name,
                    property: component.name.clone(),
                });
            }
            (_, _, None) => {}
        }

        Ok(UserDefinedType {
            namespace: self.type_namespace(schema, decl.namespace.as_deref())?,
            name,
            kind,
            schema: schema.key,
            body: TypeBody::Composite(CompositeType {
                is_abstract: decl.is_abstract,
                base: Binding::unresolved(base),
                interfaces: Binding::unresolved(interfaces),
                properties,
            }),
            metadata: Metadata::from(decl.metadata.as_slice()),
        })
    }

    fn interface(&self, schema: &Schema, name: String, decl: &InterfaceDecl) -> Result<UserDefinedType> {
        let extends = decl
            .extends
            .iter()
            .map(|text| self.type_path(&name, "extends", text))
            .collect::<Result<Vec<_>>>()?;
        let properties = self.properties(&name, &decl.properties)?;

        if let Some(component) = properties.iter().find(|p| p.role == PropertyRole::PrimaryKey) {
            return Err(CompileError::MisplacedPrimaryKey {
                unit: self.unit.clone(),
                type_name: name,
                property: component.name.clone(),
            });
        }

        Ok(UserDefinedType {
            namespace: self.type_namespace(schema, decl.namespace.as_deref())?,
            name,
            kind: TypeKind::Interface,
            schema: schema.key,
            body: TypeBody::Composite(CompositeType {
                is_abstract: true,
                base: Binding::unresolved(None),
                interfaces: Binding::unresolved(extends),
                properties,
            }),
            metadata: Metadata::from(decl.metadata.as_slice()),
        })
    }

    fn enumeration(&self, schema: &Schema, name: String, decl: &EnumDecl) -> Result<UserDefinedType> {
        let primitives = self.context.primitives();
        let underlying = match decl.underlying.as_deref() {
            Some(text) => primitives.lookup(text.trim()),
            None => self.context.default_enum_underlying(),
        };

        let (underlying, (min, max)) = match underlying.map(|id| (id, primitives.get(id).kind.integer_range())) {
            Some((id, Some(range))) => (id, range),
            _ => {
                return Err(CompileError::InvalidEnumUnderlying {
                    unit: self.unit.clone(),
                    type_name: name,
                    underlying: decl.underlying.clone().unwrap_or_default(),
                })
            }
        };

        let mut elements: Vec<EnumElement> = Vec::with_capacity(decl.elements.len());
        for (position, element) in decl.elements.iter().enumerate() {
            let owner = format!("{}.element #{}", name, position + 1);
            let element_name = self.identifier(element.name.as_deref(), "enum element", &owner)?;
            if elements.iter().any(|e| e.name == element_name) {
                return Err(CompileError::DuplicateEnumElement {
                    unit: self.unit.clone(),
                    type_name: name,
                    element: element_name,
                });
            }

            let raw = element.value.as_ref().ok_or_else(|| CompileError::MissingAttribute {
                unit: self.unit.clone(),
                owner: format!("{}.{}", name, element_name),
                attribute: "value",
            })?;
            let value = raw.to_i128().ok_or_else(|| CompileError::InvalidEnumValue {
                unit: self.unit.clone(),
                type_name: name.clone(),
                element: element_name.clone(),
                value: raw.to_string(),
            })?;
            if value < min || value > max {
                return Err(CompileError::EnumValueOutOfRange {
                    unit: self.unit.clone(),
                    type_name: name,
                    element: element_name,
                    value,
                    min,
                    max,
                });
            }

            elements.push(EnumElement {
                name: element_name,
                value,
                metadata: Metadata::from(element.metadata.as_slice()),
            });
        }

        Ok(UserDefinedType {
            namespace: self.type_namespace(schema, decl.namespace.as_deref())?,
            name,
            kind: TypeKind::Enum,
            schema: schema.key,
            body: TypeBody::Enum(EnumType { underlying, elements }),
            metadata: Metadata::from(decl.metadata.as_slice()),
        })
    }

    fn properties(&self, type_name: &str, decls: &[PropertyDecl]) -> Result<Vec<Property>> {
        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(decls.len());

        for (position, decl) in decls.iter().enumerate() {
            let owner = format!("{}.property #{}", type_name, position + 1);
            let name = self.identifier(decl.name.as_deref(), "property", &owner)?;
            if !seen.insert(name.clone()) {
                return Err(CompileError::DuplicateProperty {
                    unit: self.unit.clone(),
                    type_name: type_name.to_string(),
                    property: name,
                });
            }

            let text = decl.type_expr.as_deref().ok_or_else(|| CompileError::MissingAttribute {
                unit: self.unit.clone(),
                owner: format!("{}.{}", type_name, name),
                attribute: "type",
            })?;
            let expr = TypeExpr::parse(text, decl.key.as_deref(), decl.value.as_deref(), self.context.containers())
                .map_err(|reason| self.malformed(type_name, &name, text, reason))?;

            properties.push(Property {
                name,
                role: decl.role,
                ty: Binding::unresolved(expr),
                default_value: decl.default.clone(),
                metadata: Metadata::from(decl.metadata.as_slice()),
            });
        }

        Ok(properties)
    }

    fn type_path(&self, type_name: &str, clause: &str, text: &str) -> Result<TypePath> {
        TypePath::parse(text).map_err(|reason| self.malformed(type_name, clause, text, reason))
    }

    fn malformed(&self, type_name: &str, property: &str, expr: &str, reason: String) -> CompileError {
        CompileError::MalformedTypeExpr {
            unit: self.unit.clone(),
            type_name: type_name.to_string(),
            property: property.to_string(),
            expr: expr.to_string(),
            reason,
        }
    }

    /// Validate a required identifier
    fn identifier(&self, name: Option<&str>, what: &'static str, owner: &str) -> Result<String> {
        let name = name.map(str::trim).ok_or_else(|| CompileError::MissingAttribute {
            unit: self.unit.clone(),
            owner: owner.to_string(),
            attribute: "name",
        })?;

        if !is_identifier(name) || self.context.is_reserved(name) {
            return Err(CompileError::InvalidIdentifier {
                unit: self.unit.clone(),
                what,
                name: name.to_string(),
            });
        }
        Ok(name.to_string())
    }

    fn namespace(&self, namespace: Option<&str>) -> Result<String> {
        let namespace = namespace.map(str::trim).unwrap_or_default();
        let reserved = namespace.split('.').any(|segment| self.context.is_reserved(segment));
        if !is_namespace(namespace) || reserved {
            return Err(CompileError::InvalidIdentifier {
                unit: self.unit.clone(),
                what: "namespace",
                name: namespace.to_string(),
            });
        }
        Ok(namespace.to_string())
    }

    /// A type's namespace defaults to its schema's
    fn type_namespace(&self, schema: &Schema, namespace: Option<&str>) -> Result<String> {
        match namespace {
            Some(ns) if !ns.trim().is_empty() => self.namespace(Some(ns)),
            _ => Ok(schema.namespace.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ContainerCatalog, ContainerShape, PrimitiveRegistry};
    use crate::source::{EnumElementDecl, EnumValueDecl, ImportDecl};
    use rstest::rstest;

    fn context() -> CompilationContext {
        let primitives = PrimitiveRegistry::with_builtins();
        let int32 = primitives.lookup("int32");
        CompilationContext::new(primitives, ContainerCatalog::default(), int32)
    }

    fn entity(name: &str, properties: Vec<PropertyDecl>) -> TypeDecl {
        TypeDecl::Entity(CompositeDecl {
            name: Some(name.into()),
            properties,
            ..Default::default()
        })
    }

    fn schema_with(types: Vec<TypeDecl>) -> SchemaDecl {
        SchemaDecl {
            name: Some("Main".into()),
            namespace: Some("Game.Data".into()),
            types,
            ..Default::default()
        }
    }

    fn pk(name: &str) -> PropertyDecl {
        PropertyDecl::new(name, "int32", PropertyRole::PrimaryKey)
    }

    fn declare_main(decl: &SchemaDecl) -> Result<Schema> {
        declare(&context(), &SourceId::new("Main"), decl)
    }

    #[test]
    fn test_declares_unresolved() {
        let decl = schema_with(vec![
            entity(
                "City",
                vec![pk("id"), PropertyDecl::new("tags", "string{}", PropertyRole::Plain)],
            ),
            TypeDecl::Struct(CompositeDecl {
                name: Some("Point".into()),
                namespace: Some("Geo".into()),
                extends: Some("Base".into()),
                ..Default::default()
            }),
        ]);

        let schema = declare_main(&decl).unwrap();
        assert_eq!(schema.types.len(), 2);
        assert_eq!(schema.types[0].namespace, "Game.Data");
        assert_eq!(schema.types[1].namespace, "Geo");
        // City: base + interfaces + 2 properties; Point: base + interfaces
        assert_eq!(schema.unresolved_count(), 6);

        let tags = &schema.types[0].properties()[1];
        assert!(matches!(
            tags.ty.reference(),
            Some(TypeExpr::Container { shape: ContainerShape::Set, .. })
        ));
    }

    #[rstest]
    #[case(1, true)]
    #[case(7, true)]
    #[case(8, false)]
    #[case(0, false)]
    fn test_primary_key_arity(#[case] count: usize, #[case] ok: bool) {
        let properties = (0..count).map(|i| pk(&format!("k{}", i))).collect();
        let result = declare_main(&schema_with(vec![entity("Wide", properties)]));
        match result {
            Ok(_) => assert!(ok),
            Err(CompileError::PrimaryKeyArity { count: found, .. }) => {
                assert!(!ok);
                assert_eq!(found, count);
            }
            Err(other) => panic!("Unexpected error: {}", other),
        }
    }

    #[test]
    fn test_derived_entity_primary_key_rejected() {
        let decl = schema_with(vec![TypeDecl::Entity(CompositeDecl {
            name: Some("Capital".into()),
            extends: Some("City".into()),
            properties: vec![pk("id")],
            ..Default::default()
        })]);
        assert!(matches!(
            declare_main(&decl),
            Err(CompileError::DerivedEntityPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_misplaced_primary_key() {
        let decl = schema_with(vec![TypeDecl::Struct(CompositeDecl {
            name: Some("Point".into()),
            properties: vec![pk("x")],
            ..Default::default()
        })]);
        assert!(matches!(
            declare_main(&decl),
            Err(CompileError::MisplacedPrimaryKey { .. })
        ));
    }

    #[rstest]
    #[case("9City")]
    #[case("string")]
    #[case("void")]
    #[case("List")]
    fn test_invalid_type_names(#[case] name: &str) {
        let decl = schema_with(vec![entity(name, vec![pk("id")])]);
        assert!(matches!(
            declare_main(&decl),
            Err(CompileError::InvalidIdentifier { what: "type", .. })
        ));
    }

    #[test]
    fn test_duplicates() {
        let decl = schema_with(vec![entity("City", vec![pk("id")]), entity("City", vec![pk("id")])]);
        assert!(matches!(declare_main(&decl), Err(CompileError::DuplicateType { .. })));

        let decl = schema_with(vec![entity("City", vec![pk("id"), pk("id")])]);
        assert!(matches!(declare_main(&decl), Err(CompileError::DuplicateProperty { .. })));
    }

    #[test]
    fn test_missing_type_attribute() {
        let mut property = pk("id");
        property.type_expr = None;
        let decl = schema_with(vec![entity("City", vec![property])]);
        assert!(matches!(
            declare_main(&decl),
            Err(CompileError::MissingAttribute { attribute: "type", .. })
        ));
    }

    #[test]
    fn test_malformed_type() {
        let decl = schema_with(vec![entity(
            "City",
            vec![pk("id"), PropertyDecl::new("grid", "int32[][]", PropertyRole::Plain)],
        )]);
        assert!(matches!(
            declare_main(&decl),
            Err(CompileError::MalformedTypeExpr { .. })
        ));
    }

    fn enum_decl(underlying: Option<&str>, values: &[(&str, EnumValueDecl)]) -> SchemaDecl {
        schema_with(vec![TypeDecl::Enum(EnumDecl {
            name: Some("Size".into()),
            underlying: underlying.map(str::to_string),
            elements: values
                .iter()
                .map(|(n, v)| EnumElementDecl {
                    name: Some(n.to_string()),
                    value: Some(v.clone()),
                    metadata: Vec::new(),
                })
                .collect(),
            ..Default::default()
        })])
    }

    #[test]
    fn test_enum_values() {
        let schema = declare_main(&enum_decl(
            Some("uint8"),
            &[("Small", EnumValueDecl::Signed(0)), ("Large", EnumValueDecl::Text("255".into()))],
        ))
        .unwrap();
        let e = schema.types[0].as_enum().unwrap();
        assert_eq!(e.elements[1].value, 255);

        let err = declare_main(&enum_decl(Some("uint8"), &[("Huge", EnumValueDecl::Signed(256))])).unwrap_err();
        assert!(matches!(err, CompileError::EnumValueOutOfRange { max: 255, .. }));

        let err = declare_main(&enum_decl(None, &[("Neg", EnumValueDecl::Text("abc".into()))])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEnumValue { .. }));

        let err = declare_main(&enum_decl(
            None,
            &[("A", EnumValueDecl::Signed(1)), ("A", EnumValueDecl::Signed(2))],
        ))
        .unwrap_err();
        assert!(matches!(err, CompileError::DuplicateEnumElement { .. }));

        let err = declare_main(&enum_decl(Some("string"), &[])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEnumUnderlying { .. }));
    }

    #[test]
    fn test_self_import_aliases_own_schema() {
        let mut decl = schema_with(vec![]);
        decl.imports.push(ImportDecl {
            source: SourceId::new("Main"),
            alias: None,
        });
        let schema = declare_main(&decl).unwrap();
        assert_eq!(schema.import("Main"), Some(schema.key));
    }

    #[test]
    fn test_unpublished_import_fails() {
        let mut decl = schema_with(vec![]);
        decl.imports.push(ImportDecl {
            source: SourceId::new("Shared"),
            alias: None,
        });
        assert!(matches!(
            declare_main(&decl),
            Err(CompileError::SourceNotFound { .. })
        ));
    }
}
