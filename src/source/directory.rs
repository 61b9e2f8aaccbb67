//! Directory-backed schema sources
//!
//! A source id is a `/`-separated path relative to a search directory,
//! without the extension: `shared/Geo` names `<dir>/shared/Geo.<extension>`.
//! The first directory holding the file wins. Lookup and [`DirectorySource::available`]
//! use the same id form, so one file never answers to two ids.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::{ImportDecl, SchemaDecl, SourceId, SourceReader};
use crate::error::{CompileError, Result};

/// Only the `imports` field; import discovery must not parse type declarations.
#[derive(Debug, Deserialize)]
struct ImportsOnly {
    #[serde(default)]
    imports: Vec<ImportDecl>,
}

/// Reads `<id>.<extension>` JSON files from a list of search directories
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dirs: Vec<PathBuf>,
    extension: String,
}

impl DirectorySource {
    pub fn new(dirs: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dirs,
            extension: extension.into(),
        }
    }

    /// Find the file backing `id`
    pub fn locate(&self, id: &SourceId) -> Result<PathBuf> {
        let relative = format!("{}.{}", id.as_str(), self.extension);

        self.dirs
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|path| path.is_file())
            .ok_or_else(|| CompileError::SourceNotFound { unit: id.clone() })
    }

    fn load(&self, id: &SourceId) -> Result<(PathBuf, String)> {
        let path = self.locate(id)?;
        let content = fs::read_to_string(&path).map_err(|error| CompileError::Io {
            path: path.clone(),
            error,
        })?;
        Ok((path, content))
    }

    /// Every source id available under the search directories
    pub fn available(&self) -> Vec<SourceId> {
        let suffix = format!(".{}", self.extension);
        let mut ids = Vec::new();

        for dir in &self.dirs {
            for entry in WalkDir::new(dir).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(id) = source_id_for(dir, entry.path(), &suffix) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }

        ids
    }
}

fn source_id_for(dir: &Path, path: &Path, suffix: &str) -> Option<SourceId> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name.strip_suffix(suffix)?;
    let parent = path.parent()?.strip_prefix(dir).ok()?;
    if parent.as_os_str().is_empty() {
        Some(SourceId::new(stem))
    } else {
        let parent = parent.to_string_lossy().replace('\\', "/");
        Some(SourceId::new(format!("{}/{}", parent, stem)))
    }
}

impl SourceReader for DirectorySource {
    fn imports(&self, id: &SourceId) -> Result<Vec<SourceId>> {
        let (path, content) = self.load(id)?;
        debug!(source = %id, path = %path.display(), "Reading imports");

        let parsed: ImportsOnly = serde_json::from_str(&content).map_err(|error| CompileError::Json {
            unit: id.clone(),
            error,
        })?;
        Ok(parsed.imports.into_iter().map(|i| i.source).collect())
    }

    fn read(&self, id: &SourceId) -> Result<SchemaDecl> {
        let (_, content) = self.load(id)?;
        serde_json::from_str(&content).map_err(|error| CompileError::Json {
            unit: id.clone(),
            error,
        })
    }
}
