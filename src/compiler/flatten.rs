//! Interface Flattening & Primary-Key Derivation
//!
//! Runs over a fixed-up schema before it is published:
//!
//! 1. reject cycles in base chains and interface extension
//! 2. compute each composite type's effective property list
//! 3. derive the key layout of every root entity; derived entities point at
//!    their root's layout

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

use super::context::{CompilationContext, Scope};
use crate::error::{CompileError, KeyUsage, Result};
use crate::schema::{
    DataType, KeyComponent, PrimaryKeyLayout, PropertyRef, Schema, SchemaKey, TypeKind, TypeRef,
};
use crate::source::{PropertyRole, SourceId};

/// Flatten properties and derive keys for every type of `schema`
pub fn finalize(context: &CompilationContext, schema: &mut Schema) -> Result<()> {
    check_inheritance(schema)?;

    let (effective, owners, layouts) = {
        let scope = Scope::new(context, schema);
        let mut flattener = Flattener {
            scope,
            unit: &schema.source,
            memo: HashMap::new(),
        };

        let mut effective = Vec::new();
        let mut owners = Vec::new();
        let mut layouts = Vec::new();

        for (index, ty) in schema.types.iter().enumerate() {
            if ty.as_composite().is_none() {
                continue;
            }
            let r = TypeRef::new(schema.key, index);
            effective.push((index, flattener.effective(r)?));

            if ty.kind == TypeKind::Entity {
                let root = root_of(&scope, r);
                owners.push((index, root));
                if root == r {
                    layouts.push((index, derive_key(&scope, &schema.source, r)?));
                }
            }
        }

        (effective, owners, layouts)
    };

    for (index, properties) in effective {
        schema.set_effective(index, properties);
    }
    for (index, owner) in owners {
        schema.set_key_owner(index, owner);
    }
    for (index, layout) in layouts {
        schema.set_key_layout(index, layout);
    }
    Ok(())
}

/// Cycles can only close inside the schema being compiled: anything it
/// references elsewhere is already published and acyclic.
fn check_inheritance(schema: &Schema) -> Result<()> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(schema.types.len(), schema.types.len());
    let nodes: Vec<_> = (0..schema.types.len()).map(|i| graph.add_node(i)).collect();

    for (index, ty) in schema.types.iter().enumerate() {
        let Some(composite) = ty.as_composite() else {
            continue;
        };
        let supertypes = composite.base_type().into_iter().chain(composite.interface_refs().iter().copied());
        for target in supertypes.filter(|t| t.schema == schema.key) {
            graph.add_edge(nodes[index], nodes[target.index], ());
        }
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| CompileError::InheritanceCycle {
        unit: schema.source.clone(),
        type_name: schema.types[graph[cycle.node_id()]].name.clone(),
    })
}

fn root_of(scope: &Scope<'_>, mut r: TypeRef) -> TypeRef {
    while let Some(base) = scope.user_type(r).as_composite().and_then(|c| c.base_type()) {
        r = base;
    }
    r
}

struct Flattener<'a> {
    scope: Scope<'a>,
    unit: &'a SourceId,
    memo: HashMap<TypeRef, Vec<PropertyRef>>,
}

impl Flattener<'_> {
    /// Base chain's properties, then properties of interfaces new to this
    /// type (post-order, each interface once), then own properties.
    fn effective(&mut self, r: TypeRef) -> Result<Vec<PropertyRef>> {
        if let Some(done) = self.memo.get(&r) {
            return Ok(done.clone());
        }
        if Some(r.schema) != self.current_key() {
            return Ok(self.scope.schema(r.schema).effective_properties(r.index).to_vec());
        }

        let ty = self.scope.user_type(r);
        let Some(composite) = ty.as_composite() else {
            return Ok(Vec::new());
        };

        let mut properties = Vec::new();
        let mut seen = HashSet::new();

        if let Some(base) = composite.base_type() {
            properties.extend(self.effective(base)?);
            let mut chain = Some(base);
            while let Some(current) = chain {
                let base_type = self.scope.user_type(current).as_composite();
                for &iface in base_type.map(|c| c.interface_refs()).unwrap_or(&[]) {
                    expand(&self.scope, iface, &mut seen, &mut Vec::new());
                }
                chain = base_type.and_then(|c| c.base_type());
            }
        }

        let mut added = Vec::new();
        for &iface in composite.interface_refs() {
            expand(&self.scope, iface, &mut seen, &mut added);
        }
        for iface in added {
            properties.extend(own_properties(&self.scope, iface));
        }
        properties.extend(own_properties(&self.scope, r));

        let mut names = HashSet::new();
        for p in &properties {
            let property = self.scope.property(*p);
            if !names.insert(property.name.as_str()) {
                return Err(CompileError::PropertyCollision {
                    unit: self.unit.clone(),
                    type_name: ty.name.clone(),
                    property: property.name.clone(),
                });
            }
        }

        self.memo.insert(r, properties.clone());
        Ok(properties)
    }

    fn current_key(&self) -> Option<SchemaKey> {
        self.scope.current().map(|s| s.key)
    }
}

/// Post-order: extended interfaces before the interface itself
fn expand(scope: &Scope<'_>, iface: TypeRef, seen: &mut HashSet<TypeRef>, result: &mut Vec<TypeRef>) {
    if !seen.insert(iface) {
        return;
    }
    if let Some(composite) = scope.user_type(iface).as_composite() {
        for &parent in composite.interface_refs() {
            expand(scope, parent, seen, result);
        }
    }
    result.push(iface);
}

fn own_properties(scope: &Scope<'_>, r: TypeRef) -> impl Iterator<Item = PropertyRef> {
    let count = scope.user_type(r).properties().len();
    (0..count).map(move |index| PropertyRef { owner: r, index })
}

fn derive_key(scope: &Scope<'_>, unit: &SourceId, entity: TypeRef) -> Result<PrimaryKeyLayout> {
    let ty = scope.user_type(entity);
    let mut components = Vec::new();

    for (index, property) in ty.properties().iter().enumerate() {
        if property.role != PropertyRole::PrimaryKey {
            continue;
        }

        let primitive = match property.data_type() {
            DataType::Primitive(id) => Some((*id, scope.context.primitive(*id)))
                .filter(|(_, primitive)| primitive.can_be_key),
            _ => None,
        };

        let (id, primitive) = primitive.ok_or_else(|| CompileError::KeyNotCapable {
            unit: unit.clone(),
            type_name: ty.name.clone(),
            property: property.name.clone(),
            found: scope.type_name(property.data_type()),
            usage: KeyUsage::PrimaryKey,
        })?;

        components.push(KeyComponent {
            property: PropertyRef { owner: entity, index },
            name: property.name.clone(),
            primitive: id,
            kind: primitive.kind,
        });
    }

    Ok(PrimaryKeyLayout { entity, components })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::fixup::fixup;
    use crate::compiler::parser::declare;
    use crate::schema::{ContainerCatalog, Primitive, PrimitiveKind, PrimitiveRegistry};
    use crate::source::{CompositeDecl, EnumDecl, EnumElementDecl, EnumValueDecl, InterfaceDecl, PropertyDecl, SchemaDecl, TypeDecl};

    fn context() -> CompilationContext {
        let mut primitives = PrimitiveRegistry::with_builtins();
        primitives.register(Primitive::custom("Vector3", "Math", false)).unwrap();
        primitives.register(Primitive::custom("Guid", "System", true)).unwrap();
        CompilationContext::new(primitives, ContainerCatalog::default(), None)
    }

    fn compile(context: &CompilationContext, types: Vec<TypeDecl>) -> Result<Schema> {
        let decl = SchemaDecl {
            name: Some("Main".into()),
            types,
            ..Default::default()
        };
        let mut schema = declare(context, &SourceId::new("Main"), &decl)?;
        fixup(context, &mut schema)?;
        finalize(context, &mut schema)?;
        Ok(schema)
    }

    fn interface(name: &str, extends: &[&str], properties: &[&str]) -> TypeDecl {
        TypeDecl::Interface(InterfaceDecl {
            name: Some(name.into()),
            extends: extends.iter().map(|s| s.to_string()).collect(),
            properties: properties
                .iter()
                .map(|p| PropertyDecl::new(p, "string", PropertyRole::Plain))
                .collect(),
            ..Default::default()
        })
    }

    fn structure(name: &str, extends: Option<&str>, implements: &[&str], properties: &[&str]) -> TypeDecl {
        TypeDecl::Struct(CompositeDecl {
            name: Some(name.into()),
            extends: extends.map(str::to_string),
            implements: implements.iter().map(|s| s.to_string()).collect(),
            properties: properties
                .iter()
                .map(|p| PropertyDecl::new(p, "int32", PropertyRole::Plain))
                .collect(),
            ..Default::default()
        })
    }

    fn effective_names(context: &CompilationContext, schema: &Schema, type_name: &str) -> Vec<String> {
        let index = schema.type_index(type_name).unwrap();
        let scope = Scope::new(context, schema);
        schema
            .effective_properties(index)
            .iter()
            .map(|p| scope.property(*p).name.clone())
            .collect()
    }

    #[test]
    fn test_diamond_dedup() {
        let ctx = context();
        let schema = compile(
            &ctx,
            vec![
                interface("IShared", &[], &["x"]),
                interface("IA", &["IShared"], &["a"]),
                interface("IB", &["IShared"], &["b"]),
                structure("T", None, &["IA", "IB"], &["own"]),
            ],
        )
        .unwrap();

        assert_eq!(effective_names(&ctx, &schema, "T"), vec!["x", "a", "b", "own"]);
        assert_eq!(effective_names(&ctx, &schema, "IA"), vec!["x", "a"]);
    }

    #[test]
    fn test_collision() {
        let ctx = context();
        let err = compile(
            &ctx,
            vec![
                interface("IA", &[], &["y"]),
                interface("IB", &[], &["y"]),
                structure("T", None, &["IA", "IB"], &[]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::PropertyCollision { ref property, .. } if property == "y"));
    }

    #[test]
    fn test_base_chain_first_and_inherited_interfaces_skipped() {
        let ctx = context();
        let schema = compile(
            &ctx,
            vec![
                interface("INamed", &[], &["name"]),
                interface("ITagged", &["INamed"], &["tag"]),
                structure("Base", None, &["INamed"], &["base_field"]),
                structure("Derived", Some("Base"), &["ITagged", "INamed"], &["own"]),
            ],
        )
        .unwrap();

        assert_eq!(
            effective_names(&ctx, &schema, "Derived"),
            vec!["name", "base_field", "tag", "own"]
        );
    }

    #[test]
    fn test_own_property_shadowing_interface_collides() {
        let ctx = context();
        let err = compile(
            &ctx,
            vec![interface("INamed", &[], &["name"]), structure("T", None, &["INamed"], &["name"])],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::PropertyCollision { .. }));
    }

    #[test]
    fn test_inheritance_cycle() {
        let ctx = context();
        let err = compile(
            &ctx,
            vec![structure("A", Some("B"), &[], &[]), structure("B", Some("A"), &[], &[])],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InheritanceCycle { .. }));

        let err = compile(&ctx, vec![interface("ILoop", &["ILoop"], &[])]).unwrap_err();
        assert!(matches!(err, CompileError::InheritanceCycle { ref type_name, .. } if type_name == "ILoop"));
    }

    fn entity(name: &str, extends: Option<&str>, properties: Vec<PropertyDecl>) -> TypeDecl {
        TypeDecl::Entity(CompositeDecl {
            name: Some(name.into()),
            extends: extends.map(str::to_string),
            properties,
            ..Default::default()
        })
    }

    #[test]
    fn test_key_layout_and_inheritance() {
        let ctx = context();
        let schema = compile(
            &ctx,
            vec![
                entity(
                    "City",
                    None,
                    vec![
                        PropertyDecl::new("region", "uint8", PropertyRole::PrimaryKey),
                        PropertyDecl::new("label", "string", PropertyRole::Plain),
                        PropertyDecl::new("id", "Guid", PropertyRole::PrimaryKey),
                    ],
                ),
                entity("Capital", Some("City"), vec![PropertyDecl::new("motto", "string", PropertyRole::Plain)]),
            ],
        )
        .unwrap();

        let city = TypeRef::new(schema.key, 0);
        let layout = schema.key_layout(0).unwrap();
        assert_eq!(layout.arity(), 2);
        assert_eq!(layout.components[0].name, "region");
        assert_eq!(layout.components[0].kind, PrimitiveKind::UInt8);
        assert_eq!(layout.components[1].kind, PrimitiveKind::Custom);
        assert_eq!(layout.components[1].property, PropertyRef { owner: city, index: 2 });

        assert_eq!(schema.key_owner(1), Some(city));
        assert!(schema.key_layout(1).is_none());
        assert_eq!(effective_names(&ctx, &schema, "Capital"), vec!["region", "label", "id", "motto"]);
    }

    #[test]
    fn test_key_capability() {
        let ctx = context();
        for ty in ["Vector3", "int32[]", "Point", "Side"] {
            let err = compile(
                &ctx,
                vec![
                    structure("Point", None, &[], &[]),
                    TypeDecl::Enum(EnumDecl {
                        name: Some("Side".into()),
                        underlying: Some("uint8".into()),
                        elements: vec![EnumElementDecl {
                            name: Some("Left".into()),
                            value: Some(EnumValueDecl::Signed(1)),
                            metadata: Vec::new(),
                        }],
                        ..Default::default()
                    }),
                    entity("Cell", None, vec![PropertyDecl::new("pos", ty, PropertyRole::PrimaryKey)]),
                ],
            )
            .unwrap_err();
            assert!(
                matches!(err, CompileError::KeyNotCapable { usage: KeyUsage::PrimaryKey, .. }),
                "{ty}: {err}"
            );
        }
    }
}
