//! Data Registry Schema Compiler
//!
//! Compiles a set of interdependent schema sources into one resolved,
//! acyclic type graph, then hands the result to a code generation backend.
//!
//! ## Features
//!
//! - **Import Discovery**: Transitive closure of a root set, each unit loaded once
//! - **Dependency Sequencing**: Units compile strictly after everything they import
//! - **Lazy Bindings**: Forward and cross-unit references resolved in a fixup pass
//! - **Flattening**: Interface properties merged into every implementing type
//! - **Primary Keys**: Derived per entity family, 1 to 7 components
//! - **Pluggable Backends**: Per-type results with severities; Rust backend included
//!
//! ## Architecture
//!
//! ```text
//! SourceReader ──> graph::discover ──> ImportGraph::sequence
//!                                            │
//!            ┌───────────────────────────────┘
//!            ▼
//!   compiler::parser (declare) ──> compiler::fixup ──> compiler::flatten
//!            │                                              │
//!            └────────────> CompilationContext <────────────┘
//!                                   │
//!                                   ▼
//!                       codegen::Backend ──> CompileReport
//! ```

pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod schema;
pub mod source;

pub use codegen::{Backend, CompilationUnitResult, CompileReport, RustBackend, SchemaView, Severity};
pub use compiler::{CompilationContext, Compiler, CompilerBuilder, UnitEvent};
pub use config::CompilerConfig;
pub use error::{CompileError, ErrorPhase, Result};
pub use graph::ImportGraph;
pub use schema::{DataType, PrimaryKey, PrimaryKeyLayout, Schema, TypeKind, TypeRef};
pub use source::{DirectorySource, MemorySource, SchemaDecl, SourceId, SourceReader};
