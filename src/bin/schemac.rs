//! Schema Compiler CLI
//!
//! Compiles schema sources and writes one generated file per result.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use datareg_compiler::{Backend, Compiler, CompilerConfig, DirectorySource, RustBackend, SourceId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemac")]
#[command(about = "Compile data registry schemas")]
struct Cli {
    /// Explicit config file, layered over schemac.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Root source ids, separated by ';'
    #[arg(short, long)]
    sources: String,

    /// Search directory (repeatable); replaces [sources].dirs
    #[arg(short, long = "dir")]
    dirs: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and generate code
    Compile {
        #[command(flatten)]
        input: SourceArgs,

        /// Output directory; overrides [output].dir
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Compile and report without writing anything
    Check {
        #[command(flatten)]
        input: SourceArgs,
    },

    /// Print the import graph in DOT format
    Graph {
        #[command(flatten)]
        input: SourceArgs,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether the run succeeded without error-severity results
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = CompilerConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Compile { input, out } => {
            let (reader, roots) = open_sources(&config, &input)?;
            let mut compiler = build_compiler(&config)?;
            let order = compiler.load(&reader, &roots)?;
            println!("✅ Compiled {} unit(s)", order.len());

            let backend = RustBackend::from_config(&config.codegen);
            let units = emitted_units(&config, &order, &roots);
            let report = compiler.emit_units(&backend, &units);
            print!("{}", report);

            let out_dir = out.unwrap_or_else(|| config.output.dir.clone());
            let written = report.write(&out_dir, backend.file_extension(), config.output.require_empty)?;
            info!(files = written.len(), dir = %out_dir.display(), "Wrote generated code");
            println!("📁 Wrote {} file(s) to {}", written.len(), out_dir.display());

            if report.has_errors() {
                println!("❌ Generation finished with errors");
                return Ok(false);
            }
            Ok(true)
        }

        Commands::Check { input } => {
            let (reader, roots) = open_sources(&config, &input)?;
            let mut compiler = build_compiler(&config)?;
            let order = compiler.load(&reader, &roots)?;

            for unit in &order {
                if let Some(schema) = compiler.context().schema_by_source(unit) {
                    println!("  {} ({}): {} type(s)", unit, schema.name, schema.types.len());
                }
            }

            let report = compiler.emit_units(&RustBackend::from_config(&config.codegen), &order);
            print!("{}", report);
            if report.has_errors() {
                println!("❌ Check failed");
                return Ok(false);
            }
            println!("✅ {} unit(s) OK", order.len());
            Ok(true)
        }

        Commands::Graph { input, output } => {
            let (reader, roots) = open_sources(&config, &input)?;
            let graph = build_compiler(&config)?.import_graph(&reader, &roots)?;
            let dot = graph.to_dot();

            match output {
                Some(path) => {
                    std::fs::write(&path, &dot).with_context(|| format!("failed to write {}", path.display()))?;
                    println!("✅ Exported DOT to: {}", path.display());
                }
                None => print!("{}", dot),
            }
            Ok(true)
        }
    }
}

fn open_sources(config: &CompilerConfig, input: &SourceArgs) -> anyhow::Result<(DirectorySource, Vec<SourceId>)> {
    let roots: Vec<SourceId> = input
        .sources
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SourceId::new)
        .collect();
    if roots.is_empty() {
        anyhow::bail!("no source ids given");
    }

    let dirs = if input.dirs.is_empty() {
        config.sources.dirs.clone()
    } else {
        input.dirs.clone()
    };
    Ok((DirectorySource::new(dirs, config.sources.extension.clone()), roots))
}

fn build_compiler(config: &CompilerConfig) -> anyhow::Result<Compiler> {
    Ok(Compiler::builder().with_types(&config.types).build()?)
}

/// Everything in compile order, or just the roots when imports are not emitted
fn emitted_units(config: &CompilerConfig, order: &[SourceId], roots: &[SourceId]) -> Vec<SourceId> {
    if config.output.emit_imported {
        order.to_vec()
    } else {
        order.iter().filter(|u| roots.contains(u)).cloned().collect()
    }
}
