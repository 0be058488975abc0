use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const IN_MEMORY: &str = ":memory:";

/// Settings for a Sabres database, usually read from a `sabres.yaml` file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SabresConfig {
    /// Path to the SQLite file, or `:memory:`.
    pub database: String,
    /// Enforce `REFERENCES` clauses on pointer columns.
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
    /// Table holding the persisted class schemas.
    pub metadata_table: String,
}

impl Default for SabresConfig {
    fn default() -> Self {
        SabresConfig {
            database: "sabres.db".to_string(),
            foreign_keys: true,
            busy_timeout_ms: 5000,
            metadata_table: "_sabres_schema".to_string(),
        }
    }
}

impl SabresConfig {
    pub fn in_memory() -> Self {
        SabresConfig {
            database: IN_MEMORY.to_string(),
            ..Default::default()
        }
    }

    pub fn with_database(path: impl AsRef<Path>) -> Self {
        SabresConfig {
            database: path.as_ref().to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    /// Parse a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: SabresConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        if self.is_in_memory() {
            None
        } else {
            Some(PathBuf::from(&self.database))
        }
    }
}
