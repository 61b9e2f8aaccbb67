//! Dependency Fixup Pass
//!
//! Forces every deferred binding of a freshly declared schema. Runs once all
//! of the schema's own types are declared and every imported schema is
//! published, so each lookup either succeeds or is a genuine user error.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::collections::HashMap;
use tracing::debug;

use super::context::CompilationContext;
use crate::error::{CompileError, KeyUsage, Result};
use crate::schema::{
    DataType, PrimitiveId, Schema, SchemaKey, TypeExpr, TypeKind, TypePath, TypeRef, UserDefinedType, VOID_NAME,
};
use crate::source::{PropertyRole, SourceId};

/// Resolve every binding of `schema`, in declaration order
pub fn fixup(context: &CompilationContext, schema: &mut Schema) -> Result<()> {
    let pending = schema.unresolved_count();
    let resolver = Resolver {
        context,
        unit: schema.source.clone(),
        key: schema.key,
        local: schema
            .types
            .iter()
            .enumerate()
            .map(|(index, t)| (t.name.clone(), (index, t.kind)))
            .collect(),
        imports: schema.imports.clone(),
    };

    for ty in schema.types.iter_mut() {
        resolver.resolve_type(ty)?;
    }

    debug!(unit = %schema.source, resolved = pending, "Fixed up bindings");
    Ok(())
}

struct Resolver<'a> {
    context: &'a CompilationContext,
    unit: SourceId,
    key: SchemaKey,
    /// Own types by name; the schema itself is borrowed mutably during fixup
    local: HashMap<String, (usize, TypeKind)>,
    imports: Vec<(String, SchemaKey)>,
}

impl Resolver<'_> {
    fn resolve_type(&self, ty: &mut UserDefinedType) -> Result<()> {
        let kind = ty.kind;
        let name = ty.name.clone();
        let Some(composite) = ty.as_composite_mut() else {
            return Ok(());
        };

        composite.base.resolve_with(|path| {
            path.as_ref()
                .map(|path| self.resolve_user_type(&name, path, kind))
                .transpose()
        })?;

        composite.interfaces.resolve_with(|paths| {
            paths
                .iter()
                .map(|path| self.resolve_user_type(&name, path, TypeKind::Interface))
                .collect::<Result<Vec<_>>>()
        })?;

        for property in composite.properties.iter_mut() {
            let owner = format!("{}.{}", name, property.name);
            let role = property.role;
            let property_name = property.name.clone();
            property
                .ty
                .resolve_with(|expr| self.resolve_property(&name, &property_name, &owner, role, expr))?;
        }

        Ok(())
    }

    /// Base and interface clauses must name a user-defined type of `expected` kind
    fn resolve_user_type(&self, owner: &str, path: &TypePath, expected: TypeKind) -> Result<TypeRef> {
        let resolved = self.resolve_path(owner, path)?;
        match resolved.user_defined() {
            Some(r) if expected.data_type(r) == resolved => Ok(r),
            _ => Err(CompileError::KindMismatch {
                unit: self.unit.clone(),
                owner: owner.to_string(),
                reference: path.to_string(),
                expected: expected.kind_name(),
                found: resolved.kind_name(),
            }),
        }
    }

    fn resolve_property(
        &self,
        type_name: &str,
        property: &str,
        owner: &str,
        role: PropertyRole,
        expr: &TypeExpr,
    ) -> Result<DataType> {
        match expr {
            TypeExpr::Named(path) => self.resolve_leaf(type_name, property, owner, role, path),
            TypeExpr::Container { shape, key, value } => {
                let key = match key {
                    Some(path) => Some(self.resolve_map_key(type_name, property, owner, path)?),
                    None => None,
                };
                let value = self.resolve_leaf(type_name, property, owner, role, value)?;
                let container = self.context.containers().get(*shape).instantiate(key, value);
                Ok(DataType::InstancedContainer(Box::new(container)))
            }
        }
    }

    /// A non-key type position; checks void and role/type agreement
    fn resolve_leaf(
        &self,
        type_name: &str,
        property: &str,
        owner: &str,
        role: PropertyRole,
        path: &TypePath,
    ) -> Result<DataType> {
        let resolved = self.resolve_path(owner, path)?;

        if resolved == DataType::Void {
            return Err(CompileError::VoidProperty {
                unit: self.unit.clone(),
                type_name: type_name.to_string(),
                property: property.to_string(),
            });
        }

        let agrees = match role {
            PropertyRole::ForeignKey => resolved.is_entity(),
            PropertyRole::Plain | PropertyRole::PrimaryKey => !resolved.is_entity(),
        };
        if !agrees {
            return Err(CompileError::RoleMismatch {
                unit: self.unit.clone(),
                type_name: type_name.to_string(),
                property: property.to_string(),
                role: role.as_str(),
                reference: path.to_string(),
                found: resolved.kind_name(),
            });
        }

        Ok(resolved)
    }

    fn resolve_map_key(
        &self,
        type_name: &str,
        property: &str,
        owner: &str,
        path: &TypePath,
    ) -> Result<PrimitiveId> {
        match self.resolve_path(owner, path)? {
            DataType::Primitive(id) if self.context.primitive(id).can_be_key => Ok(id),
            _ => Err(CompileError::KeyNotCapable {
                unit: self.unit.clone(),
                type_name: type_name.to_string(),
                property: property.to_string(),
                found: path.to_string(),
                usage: KeyUsage::MapKey,
            }),
        }
    }

    /// Look a name up: aliased names in the imported schema, bare names in
    /// this schema, then among primitives, then `void`.
    fn resolve_path(&self, owner: &str, path: &TypePath) -> Result<DataType> {
        if let Some(alias) = &path.alias {
            let target = self
                .imports
                .iter()
                .find(|(a, _)| a == alias)
                .map(|(_, k)| *k)
                .ok_or_else(|| CompileError::UnknownImportAlias {
                    unit: self.unit.clone(),
                    owner: owner.to_string(),
                    alias: alias.clone(),
                })?;

            if target == self.key {
                return self.resolve_local(owner, path);
            }

            let schema = self.context.schema(target);
            return match schema.type_index(&path.name) {
                Some(index) => {
                    let kind = schema.types[index].kind;
                    Ok(kind.data_type(TypeRef::new(target, index)))
                }
                None => Err(self.unresolved(owner, path, schema.type_names())),
            };
        }

        self.resolve_local(owner, path)
    }

    fn resolve_local(&self, owner: &str, path: &TypePath) -> Result<DataType> {
        if let Some(&(index, kind)) = self.local.get(&path.name) {
            return Ok(kind.data_type(TypeRef::new(self.key, index)));
        }

        if path.alias.is_none() {
            if let Some(id) = self.context.primitives().lookup(&path.name) {
                return Ok(DataType::Primitive(id));
            }
            if path.name == VOID_NAME {
                return Ok(DataType::Void);
            }
        }

        let candidates = self
            .local
            .keys()
            .map(String::as_str)
            .chain(self.context.primitives().names());
        Err(self.unresolved(owner, path, candidates))
    }

    fn unresolved<'n>(&self, owner: &str, path: &TypePath, candidates: impl Iterator<Item = &'n str>) -> CompileError {
        CompileError::UnresolvedType {
            unit: self.unit.clone(),
            owner: owner.to_string(),
            reference: path.to_string(),
            suggestion: suggest(&path.name, candidates),
        }
    }
}

/// Closest known name to a misspelled reference
fn suggest<'n>(name: &str, candidates: impl Iterator<Item = &'n str>) -> Option<String> {
    let matcher = SkimMatcherV2::default();
    let mut best: Option<(i64, &str)> = None;

    for candidate in candidates {
        if let Some(score) = matcher.fuzzy_match(candidate, name) {
            // Ties go to the alphabetically first candidate
            let better = match best {
                None => true,
                Some((s, c)) => score > s || (score == s && candidate < c),
            };
            if better {
                best = Some((score, candidate));
            }
        }
    }

    best.map(|(_, c)| c.to_string())
}
