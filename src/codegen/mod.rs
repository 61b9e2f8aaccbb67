//! Code Generation
//!
//! Backends turn finalized schemas into target-language source.
//!
//! Architecture:
//! - SchemaView: read-only projection of one published schema
//! - Backend: language-specific emitter, one call per type plus one per schema
//! - CompileReport: per-unit results with severities
//!
//! Generation failures are per unit: a type that fails to emit is reported at
//! error severity and its siblings still generate.

pub mod names;
pub mod rust;

pub use rust::RustBackend;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compiler::{CompilationContext, Scope};
use crate::error::{CompileError, Result};
use crate::schema::{DataType, PrimaryKeyLayout, Property, Schema, TypeRef, UserDefinedType};
use crate::source::SourceId;

// =============================================================================
// Backend
// =============================================================================

/// A target-language emitter
pub trait Backend {
    /// Display name of the target language
    fn language(&self) -> &str;

    /// Extension of generated files, without the dot
    fn file_extension(&self) -> &str;

    /// Emit one user-defined type
    fn emit_type(&self, view: &SchemaView<'_>, ty: TypeRef) -> Result<Emitted>;

    /// Emit the schema-level aggregate, if the schema needs one
    fn emit_schema(&self, view: &SchemaView<'_>) -> Result<Option<Emitted>>;
}

/// Generated code plus any diagnostics the backend wants surfaced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emitted {
    pub code: String,
    pub notes: Vec<(Severity, String)>,
}

impl Emitted {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            notes: Vec::new(),
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.notes.push((Severity::Info, message.into()));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.notes.push((Severity::Warning, message.into()));
    }

    /// Highest severity among the notes
    pub fn severity(&self) -> Severity {
        self.notes.iter().map(|(s, _)| *s).max().unwrap_or(Severity::Success)
    }
}

// =============================================================================
// SchemaView
// =============================================================================

/// Read-only view of one published schema and everything it can see
#[derive(Clone, Copy)]
pub struct SchemaView<'a> {
    context: &'a CompilationContext,
    schema: &'a Schema,
}

impl<'a> SchemaView<'a> {
    pub fn new(context: &'a CompilationContext, schema: &'a Schema) -> Self {
        Self { context, schema }
    }

    pub fn context(&self) -> &'a CompilationContext {
        self.context
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn name(&self) -> &'a str {
        &self.schema.name
    }

    pub fn namespace(&self) -> &'a str {
        &self.schema.namespace
    }

    /// Types of this schema in declaration order
    pub fn types(&self) -> impl Iterator<Item = (TypeRef, &'a UserDefinedType)> + 'a {
        let schema = self.schema;
        schema
            .types
            .iter()
            .enumerate()
            .map(move |(i, t)| (TypeRef::new(schema.key, i), t))
    }

    /// Any published type, including imported ones
    pub fn user_type(&self, r: TypeRef) -> &'a UserDefinedType {
        self.context.user_type(r)
    }

    pub fn effective_properties(&self, r: TypeRef) -> Vec<&'a Property> {
        self.context.effective_properties(r)
    }

    pub fn primary_key(&self, r: TypeRef) -> Option<&'a PrimaryKeyLayout> {
        self.context.primary_key(r)
    }

    /// Imported schemas by alias, in declaration order
    pub fn imports(&self) -> impl Iterator<Item = (&'a str, &'a Schema)> + 'a {
        let context = self.context;
        let schema = self.schema;
        schema
            .imports
            .iter()
            .filter(move |(_, key)| *key != schema.key)
            .map(move |(alias, key)| (alias.as_str(), context.schema(*key)))
    }

    pub fn type_name(&self, ty: &DataType) -> String {
        Scope::published(self.context).type_name(ty)
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome level of one compilation unit result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// Routing information for a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultProperties {
    /// `entity`, `struct`, `interface`, `enum`, or `schema` for the aggregate
    pub kind: String,
    pub schema_name: String,
    pub type_name: String,
    pub namespace: String,
}

/// One unit of generated output
#[derive(Debug, Clone, Serialize)]
pub struct CompilationUnitResult {
    pub severity: Severity,
    pub message: String,
    pub properties: ResultProperties,
    /// Absent when generation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CompilationUnitResult {
    /// File name without extension: `Schema.Type`, or `Schema` for the aggregate
    pub fn file_stem(&self) -> String {
        if self.is_aggregate() {
            self.properties.schema_name.clone()
        } else {
            format!("{}.{}", self.properties.schema_name, self.properties.type_name)
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.properties.kind == "schema"
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }
}

/// Every result of one emission run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileReport {
    pub language: String,
    pub results: Vec<CompilationUnitResult>,
}

impl CompileReport {
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(CompilationUnitResult::is_error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.results.iter().filter(|r| r.severity == severity).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &CompilationUnitResult> {
        self.results.iter().filter(|r| r.is_error())
    }

    /// Write every result that carries code into `dir`, one file each.
    ///
    /// An existing `dir` is recreated, or rejected when `require_empty` is set.
    pub fn write(&self, dir: &Path, extension: &str, require_empty: bool) -> Result<Vec<PathBuf>> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |error| CompileError::Io { path, error }
        };

        if dir.exists() {
            if require_empty {
                return Err(CompileError::Io {
                    path: dir.to_path_buf(),
                    error: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "output directory already exists"),
                });
            }
            fs::remove_dir_all(dir).map_err(io(dir))?;
        }
        fs::create_dir_all(dir).map_err(io(dir))?;

        let mut written = Vec::new();
        for result in &self.results {
            let Some(code) = &result.code else { continue };
            let path = dir.join(format!("{}.{}", result.file_stem(), extension));
            fs::write(&path, code).map_err(io(&path))?;
            debug!(path = %path.display(), "Wrote generated file");
            written.push(path);
        }
        Ok(written)
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} results ({} success, {} info, {} warning, {} error)",
            self.language,
            self.results.len(),
            self.count(Severity::Success),
            self.count(Severity::Info),
            self.count(Severity::Warning),
            self.count(Severity::Error),
        )?;
        for result in self.results.iter().filter(|r| r.severity > Severity::Success) {
            writeln!(f, "  [{}] {}: {}", result.severity, result.file_stem(), result.message)?;
        }
        Ok(())
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Run `backend` over the given published units, in order.
///
/// Units that are not published are skipped.
pub fn emit(context: &CompilationContext, backend: &dyn Backend, units: &[SourceId]) -> CompileReport {
    let mut report = CompileReport {
        language: backend.language().to_string(),
        results: Vec::new(),
    };

    for unit in units {
        let Some(schema) = context.schema_by_source(unit) else {
            warn!(unit = %unit, "Skipping unit that was never compiled");
            continue;
        };
        let view = SchemaView::new(context, schema);

        for (r, ty) in view.types() {
            let properties = ResultProperties {
                kind: ty.kind.as_str().to_string(),
                schema_name: schema.name.clone(),
                type_name: ty.name.clone(),
                namespace: ty.namespace.clone(),
            };
            let result = into_result(backend.emit_type(&view, r), properties, || {
                format!("Generated {} {}", ty.kind, ty.full_name())
            });
            report.results.push(result);
        }

        let properties = ResultProperties {
            kind: "schema".to_string(),
            schema_name: schema.name.clone(),
            type_name: schema.name.clone(),
            namespace: schema.namespace.clone(),
        };
        match backend.emit_schema(&view) {
            Ok(None) => {}
            Ok(Some(emitted)) => report.results.push(into_result(Ok(emitted), properties, || {
                format!("Generated aggregate for schema {}", schema.name)
            })),
            Err(e) => report.results.push(into_result(Err(e), properties, String::new)),
        }
    }

    info!(
        language = backend.language(),
        results = report.results.len(),
        errors = report.count(Severity::Error),
        "Generation finished"
    );
    report
}

fn into_result(
    outcome: Result<Emitted>,
    properties: ResultProperties,
    success_message: impl FnOnce() -> String,
) -> CompilationUnitResult {
    match outcome {
        Ok(emitted) => {
            let severity = emitted.severity();
            let mut message = success_message();
            for (_, note) in &emitted.notes {
                message.push_str("; ");
                message.push_str(note);
            }
            CompilationUnitResult {
                severity,
                message,
                properties,
                code: Some(emitted.code),
            }
        }
        Err(e) => {
            warn!(schema = %properties.schema_name, ty = %properties.type_name, error = %e, "Generation failed");
            CompilationUnitResult {
                severity: Severity::Error,
                message: e.to_string(),
                properties,
                code: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::source::{CompositeDecl, MemorySource, PropertyDecl, PropertyRole, SchemaDecl, TypeDecl};
    use tempfile::TempDir;

    /// Fails on any type named `Broken`
    struct PickyBackend;

    impl Backend for PickyBackend {
        fn language(&self) -> &str {
            "picky"
        }

        fn file_extension(&self) -> &str {
            "txt"
        }

        fn emit_type(&self, view: &SchemaView<'_>, ty: TypeRef) -> Result<Emitted> {
            let t = view.user_type(ty);
            if t.name == "Broken" {
                return Err(CompileError::Generation {
                    unit: view.schema().source.clone(),
                    type_name: t.name.clone(),
                    message: "refused".into(),
                });
            }
            let mut emitted = Emitted::new(format!("{} {}", t.kind, t.name));
            if t.name == "Odd" {
                emitted.warning("odd name");
            }
            Ok(emitted)
        }

        fn emit_schema(&self, view: &SchemaView<'_>) -> Result<Option<Emitted>> {
            Ok(Some(Emitted::new(format!("schema {}", view.name()))))
        }
    }

    fn compiled() -> Compiler {
        let struct_decl = |name: &str| {
            TypeDecl::Struct(CompositeDecl {
                name: Some(name.into()),
                properties: vec![PropertyDecl::new("v", "int32", PropertyRole::Plain)],
                ..Default::default()
            })
        };
        let reader = MemorySource::new().with(
            "Main",
            SchemaDecl {
                name: Some("Main".into()),
                types: vec![struct_decl("Fine"), struct_decl("Broken"), struct_decl("Odd")],
                ..Default::default()
            },
        );
        let mut compiler = Compiler::new();
        compiler.load(&reader, &[SourceId::from("Main")]).unwrap();
        compiler
    }

    #[test]
    fn test_failures_are_per_unit() {
        let compiler = compiled();
        let report = compiler.emit(&PickyBackend);

        assert_eq!(report.results.len(), 4);
        assert!(report.has_errors());
        assert_eq!(report.count(Severity::Success), 2);
        assert_eq!(report.count(Severity::Warning), 1);
        assert_eq!(report.count(Severity::Error), 1);

        let broken = report.errors().next().unwrap();
        assert_eq!(broken.properties.type_name, "Broken");
        assert!(broken.code.is_none());

        let summary = report.to_string();
        assert!(summary.contains("4 results"));
        assert!(summary.contains("[error] Main.Broken"));
    }

    #[test]
    fn test_write_skips_failed_units() {
        let compiler = compiled();
        let report = compiler.emit(&PickyBackend);
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");

        let written = report.write(&out, "txt", false).unwrap();
        assert_eq!(written.len(), 3);
        assert!(out.join("Main.Fine.txt").exists());
        assert!(out.join("Main.txt").exists());
        assert!(!out.join("Main.Broken.txt").exists());

        let err = report.write(&out, "txt", true).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Success);

        let mut emitted = Emitted::new("");
        assert_eq!(emitted.severity(), Severity::Success);
        emitted.info("note");
        emitted.warning("careful");
        assert_eq!(emitted.severity(), Severity::Warning);
    }
}
