//! Configuration for the schema compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schemac.toml)
//! - Environment variables (SCHEMAC__*)
//!
//! ## Example config file (schemac.toml):
//! ```toml
//! [sources]
//! dirs = ["schemas", "vendor/schemas"]
//! extension = "schema.json"
//!
//! [types]
//! default_enum_underlying = "int32"
//!
//! [types.primitives]
//! int32 = "int"
//!
//! [types.containers]
//! map = "Dictionary"
//!
//! [[types.custom]]
//! name = "Guid"
//! namespace = "System"
//! can_be_key = true
//!
//! [output]
//! dir = "generated"
//! require_empty = false
//!
//! [codegen]
//! derives = ["Debug", "Clone", "PartialEq"]
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::schema::{ContainerShape, PrimitiveKind};

/// Main configuration for the compiler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Where schema sources are searched
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Primitive, container and custom type names
    #[serde(default)]
    pub types: TypesConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Rust backend settings
    #[serde(default)]
    pub codegen: CodegenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Search directories, first match wins
    #[serde(default)]
    pub dirs: Vec<PathBuf>,

    /// File name suffix after the source id
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypesConfig {
    #[serde(default)]
    pub primitives: PrimitiveNames,

    #[serde(default)]
    pub containers: ContainerNames,

    /// Underlying type of enums that declare none (int32 when unset)
    #[serde(default)]
    pub default_enum_underlying: Option<String>,

    /// Caller-registered scalars
    #[serde(default)]
    pub custom: Vec<CustomPrimitive>,
}

/// Schema-language names of the built-in primitives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimitiveNames {
    pub uint8: String,
    pub uint16: String,
    pub uint32: String,
    pub uint64: String,
    pub int8: String,
    pub int16: String,
    pub int32: String,
    pub int64: String,
    pub float: String,
    pub double: String,
    pub bool: String,
    pub string: String,
}

/// Schema-language names of the container shapes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerNames {
    pub list: String,
    pub set: String,
    pub map: String,
    pub optional: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPrimitive {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub can_be_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory generated files are written to
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Refuse to write into an existing directory instead of recreating it
    #[serde(default)]
    pub require_empty: bool,

    /// Also write results for imported (non-root) schemas
    #[serde(default = "default_true")]
    pub emit_imported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Derives added to generated structs
    #[serde(default = "default_derives")]
    pub derives: Vec<String>,
}

// Default value functions
fn default_extension() -> String {
    "schema.json".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_true() -> bool {
    true
}

fn default_derives() -> Vec<String> {
    vec!["Debug".to_string(), "Clone".to_string(), "PartialEq".to_string()]
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            dirs: vec![PathBuf::from(".")],
            extension: default_extension(),
        }
    }
}

impl Default for PrimitiveNames {
    fn default() -> Self {
        let name = |kind: PrimitiveKind| kind.default_name().to_string();
        Self {
            uint8: name(PrimitiveKind::UInt8),
            uint16: name(PrimitiveKind::UInt16),
            uint32: name(PrimitiveKind::UInt32),
            uint64: name(PrimitiveKind::UInt64),
            int8: name(PrimitiveKind::Int8),
            int16: name(PrimitiveKind::Int16),
            int32: name(PrimitiveKind::Int32),
            int64: name(PrimitiveKind::Int64),
            float: name(PrimitiveKind::Float),
            double: name(PrimitiveKind::Double),
            bool: name(PrimitiveKind::Bool),
            string: name(PrimitiveKind::String),
        }
    }
}

impl Default for ContainerNames {
    fn default() -> Self {
        Self {
            list: ContainerShape::List.default_name().to_string(),
            set: ContainerShape::Set.default_name().to_string(),
            map: ContainerShape::Map.default_name().to_string(),
            optional: ContainerShape::Optional.default_name().to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            require_empty: false,
            emit_imported: true,
        }
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            derives: default_derives(),
        }
    }
}

impl TypesConfig {
    /// Configured name of a built-in primitive (`None` for custom kinds)
    pub fn primitive_name(&self, kind: PrimitiveKind) -> Option<&str> {
        let names = &self.primitives;
        let name = match kind {
            PrimitiveKind::UInt8 => &names.uint8,
            PrimitiveKind::UInt16 => &names.uint16,
            PrimitiveKind::UInt32 => &names.uint32,
            PrimitiveKind::UInt64 => &names.uint64,
            PrimitiveKind::Int8 => &names.int8,
            PrimitiveKind::Int16 => &names.int16,
            PrimitiveKind::Int32 => &names.int32,
            PrimitiveKind::Int64 => &names.int64,
            PrimitiveKind::Float => &names.float,
            PrimitiveKind::Double => &names.double,
            PrimitiveKind::Bool => &names.bool,
            PrimitiveKind::String => &names.string,
            PrimitiveKind::Custom => return None,
        };
        Some(name.as_str())
    }

    pub fn container_name(&self, shape: ContainerShape) -> &str {
        let names = &self.containers;
        match shape {
            ContainerShape::List => &names.list,
            ContainerShape::Set => &names.set,
            ContainerShape::Map => &names.map,
            ContainerShape::Optional => &names.optional,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["schemac.toml", ".schemac.toml", "config/schemac.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from the platform config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "datareg", "schemac") {
            let user_config = config_dir.config_dir().join("schemac.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Load from environment variables (SCHEMAC__*)
        builder = builder.add_source(
            Environment::with_prefix("SCHEMAC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
