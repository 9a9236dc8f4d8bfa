//! Store configuration
//!
//! Options are read from a TOML file (or string) and can be overridden by
//! environment variables:
//!
//! - `DOCQL_SCHEMA` - database schema holding the document tables
//! - `DOCQL_LOG_COMMANDS` - trace-log every generated command (`true`/`false`)

use crate::error::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable names
pub const ENV_SCHEMA: &str = "DOCQL_SCHEMA";
pub const ENV_LOG_COMMANDS: &str = "DOCQL_LOG_COMMANDS";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

/// How enum members are written into the JSON payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnumStorage {
    #[default]
    AsString,
    AsInteger,
}

/// Options shared by every query compiled against a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Schema holding the `mt_doc_*` tables
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    #[serde(default)]
    pub enum_storage: EnumStorage,
    /// Emit generated command text at trace level
    #[serde(default)]
    pub log_commands: bool,
}

fn default_schema_name() -> String {
    "public".to_string()
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            schema_name: default_schema_name(),
            enum_storage: EnumStorage::default(),
            log_commands: false,
        }
    }
}

impl StoreOptions {
    pub fn from_toml_str(text: &str) -> DbResult<Self> {
        let options: StoreOptions = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a file, then apply environment overrides
    pub fn load(path: &Path) -> DbResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut options = Self::from_toml_str(&text)?;
        options.apply_env_overrides();
        options.validate()?;
        tracing::debug!("Loaded store options from {}", path.display());
        Ok(options)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(schema) = std::env::var(ENV_SCHEMA) {
            if !schema.trim().is_empty() {
                self.schema_name = schema.trim().to_string();
            }
        }

        if let Ok(flag) = std::env::var(ENV_LOG_COMMANDS) {
            match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => self.log_commands = true,
                "0" | "false" | "no" => self.log_commands = false,
                other => tracing::warn!("Ignoring invalid {} value '{}'", ENV_LOG_COMMANDS, other),
            }
        }
    }

    fn validate(&self) -> DbResult<()> {
        if !IDENTIFIER.is_match(&self.schema_name) {
            return Err(DbError::ConfigError(format!(
                "schema_name '{}' is not a valid identifier",
                self.schema_name
            )));
        }
        Ok(())
    }

    /// Fully qualified table name for a document alias
    pub fn table_name(&self, alias: &str) -> String {
        format!("{}.mt_doc_{}", self.schema_name, alias)
    }
}
