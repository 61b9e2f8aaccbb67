//! Schema Compiler
//!
//! Drives a compilation:
//!
//! ```text
//! discover -> sequence -> for each unit: declare -> fixup -> finalize -> publish
//! ```
//!
//! A failure anywhere rolls the context back to its state before the call;
//! no partially compiled schema is ever visible.

pub mod context;
pub mod fixup;
pub mod flatten;
pub mod parser;

pub use context::{CompilationContext, Scope};

use tracing::{debug, info};

use crate::codegen::{self, Backend, CompileReport};
use crate::config::TypesConfig;
use crate::error::{CompileError, Result};
use crate::graph::{self, ImportGraph};
use crate::schema::{ContainerCatalog, ContainerShape, Primitive, PrimitiveKind, PrimitiveRegistry, Schema};
use crate::source::{SourceId, SourceReader};

/// Progress notifications from [`Compiler::load_with`]
#[derive(Debug)]
pub enum UnitEvent<'a> {
    /// Declaration done; fixup of this unit is about to run
    FixupStarted(&'a SourceId),
    /// Unit fully resolved and registered in the context
    Published(&'a Schema),
}

/// Builds a [`Compiler`] with custom primitive and container names
#[derive(Debug, Clone, Default)]
pub struct CompilerBuilder {
    primitive_names: Vec<(PrimitiveKind, String)>,
    custom: Vec<Primitive>,
    containers: Option<ContainerCatalog>,
    default_enum_underlying: Option<String>,
}

impl CompilerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename a built-in primitive
    pub fn primitive_name(mut self, kind: PrimitiveKind, name: impl Into<String>) -> Self {
        self.primitive_names.retain(|(k, _)| *k != kind);
        self.primitive_names.push((kind, name.into()));
        self
    }

    /// Register an additional scalar type
    pub fn custom_primitive(mut self, primitive: Primitive) -> Self {
        self.custom.push(primitive);
        self
    }

    pub fn containers(mut self, catalog: ContainerCatalog) -> Self {
        self.containers = Some(catalog);
        self
    }

    /// Underlying type of enums that do not declare one
    pub fn default_enum_underlying(mut self, name: impl Into<String>) -> Self {
        self.default_enum_underlying = Some(name.into());
        self
    }

    /// Apply the `[types]` configuration section
    pub fn with_types(mut self, types: &TypesConfig) -> Self {
        for kind in PrimitiveKind::BUILTIN {
            if let Some(name) = types.primitive_name(kind) {
                self = self.primitive_name(kind, name);
            }
        }
        for custom in &types.custom {
            self = self.custom_primitive(Primitive::custom(&custom.name, &custom.namespace, custom.can_be_key));
        }
        self = self.containers(ContainerCatalog::new(
            types.container_name(ContainerShape::List),
            types.container_name(ContainerShape::Set),
            types.container_name(ContainerShape::Map),
            types.container_name(ContainerShape::Optional),
        ));
        if let Some(name) = &types.default_enum_underlying {
            self = self.default_enum_underlying(name.clone());
        }
        self
    }

    pub fn build(self) -> Result<Compiler> {
        let mut primitives = PrimitiveRegistry::new();
        for kind in PrimitiveKind::BUILTIN {
            let name = self
                .primitive_names
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, n)| n.clone())
                .unwrap_or_else(|| kind.default_name().to_string());
            primitives.register(Primitive::builtin(name, kind))?;
        }
        for primitive in self.custom {
            primitives.register(primitive)?;
        }

        let default_enum_underlying = match &self.default_enum_underlying {
            Some(name) => Some(primitives.lookup(name).ok_or_else(|| {
                CompileError::Config(config_crate::ConfigError::Message(format!(
                    "default enum underlying type '{}' is not a registered primitive",
                    name
                )))
            })?),
            None => primitives.by_kind(PrimitiveKind::Int32),
        };

        let containers = self.containers.unwrap_or_default();
        Ok(Compiler {
            context: CompilationContext::new(primitives, containers, default_enum_underlying),
        })
    }
}

/// Multi-unit schema compiler
#[derive(Debug, Clone)]
pub struct Compiler {
    context: CompilationContext,
}

impl Default for Compiler {
    fn default() -> Self {
        let primitives = PrimitiveRegistry::with_builtins();
        let int32 = primitives.by_kind(PrimitiveKind::Int32);
        Self {
            context: CompilationContext::new(primitives, ContainerCatalog::default(), int32),
        }
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::new()
    }

    pub fn context(&self) -> &CompilationContext {
        &self.context
    }

    /// Compile `roots` and everything they import.
    ///
    /// Returns the units in compile order. Units already published by an
    /// earlier call are reused, not recompiled.
    pub fn load<R: SourceReader + ?Sized>(&mut self, reader: &R, roots: &[SourceId]) -> Result<Vec<SourceId>> {
        self.load_with(reader, roots, |_| {})
    }

    /// [`Compiler::load`], reporting each unit's progress to `observer`
    pub fn load_with<R, F>(&mut self, reader: &R, roots: &[SourceId], mut observer: F) -> Result<Vec<SourceId>>
    where
        R: SourceReader + ?Sized,
        F: FnMut(UnitEvent<'_>),
    {
        let import_graph = graph::discover(reader, roots)?;
        let order = import_graph.sequence()?;
        info!(units = order.len(), imports = import_graph.import_count(), "Sequenced compilation units");

        let checkpoint = self.context.schemas().len();
        let result = self.compile_units(reader, &order, &mut observer);
        if result.is_err() {
            self.context.truncate(checkpoint);
        }
        result.map(|_| order)
    }

    fn compile_units<R, F>(&mut self, reader: &R, order: &[SourceId], observer: &mut F) -> Result<()>
    where
        R: SourceReader + ?Sized,
        F: FnMut(UnitEvent<'_>),
    {
        for unit in order {
            if self.context.schema_by_source(unit).is_some() {
                debug!(unit = %unit, "Unit already compiled");
                continue;
            }

            let decl = reader.read(unit)?;
            let mut schema = parser::declare(&self.context, unit, &decl)?;

            observer(UnitEvent::FixupStarted(unit));
            fixup::fixup(&self.context, &mut schema)?;
            flatten::finalize(&self.context, &mut schema)?;

            let type_count = schema.types.len();
            let key = self.context.register(schema)?;
            info!(unit = %unit, schema = %self.context.schema(key).name, types = type_count, "Compiled unit");
            observer(UnitEvent::Published(self.context.schema(key)));
        }
        Ok(())
    }

    /// Import graph of `roots` without compiling anything
    pub fn import_graph<R: SourceReader + ?Sized>(&self, reader: &R, roots: &[SourceId]) -> Result<ImportGraph> {
        graph::discover(reader, roots)
    }

    /// Run `backend` over every published schema
    pub fn emit(&self, backend: &dyn Backend) -> CompileReport {
        let units: Vec<SourceId> = self.context.schemas().iter().map(|s| s.source.clone()).collect();
        self.emit_units(backend, &units)
    }

    /// Run `backend` over the given published units, in dependency order
    pub fn emit_units(&self, backend: &dyn Backend, units: &[SourceId]) -> CompileReport {
        codegen::emit(&self.context, backend, units)
    }
}
