use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Where schemas are looked up and how loudly loading is logged.
///
/// Values come from built-in defaults, then an optional `gbschema.toml`
/// (or an explicitly given file), then `GBSCHEMA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Folder bare schema names are resolved against.
    pub schema_dir: PathBuf,
    /// File extension appended to bare schema names.
    pub extension: String,
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_dir: PathBuf::from("."),
            extension: "gbs".into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub const FILE: &'static str = "gbschema.toml";

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(Self::FILE).required(false),
        };
        let settings = Config::builder()
            .set_default("schema_dir", ".")?
            .set_default("extension", "gbs")?
            .set_default("log_filter", "info")?
            .add_source(file)
            .add_source(Environment::with_prefix("GBSCHEMA"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// The file a bare schema name refers to.
    pub fn schema_path(&self, name: &str) -> PathBuf {
        self.schema_dir.join(format!("{name}.{}", self.extension))
    }
}
