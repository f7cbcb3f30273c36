use crate::constants::{CollectionJoins, SoftDeletes};
use crate::error::{FindError, Result};
use crate::query_builder::Dialect;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default result-size ceiling for [`crate::database::FindExecutor`].
pub const DEFAULT_MAX_ROWS: u32 = 50_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    pub dialect: Dialect,
    pub prune_joins: bool,
    pub soft_deletes: SoftDeletes,
    pub collection_joins: CollectionJoins,
    pub max_rows: u32,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            prune_joins: true,
            soft_deletes: SoftDeletes::default(),
            collection_joins: CollectionJoins::default(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl FinderConfig {
    /// Defaults overridden by `ORM_FIND_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dialect) = std::env::var("ORM_FIND_DIALECT") {
            config.dialect = parse_enum("dialect", &dialect)?;
        }

        if let Ok(prune) = std::env::var("ORM_FIND_PRUNE_JOINS") {
            config.prune_joins = prune.parse().map_err(|e| {
                FindError::Configuration(format!("Invalid prune_joins: {e}"))
            })?;
        }

        if let Ok(soft_deletes) = std::env::var("ORM_FIND_SOFT_DELETES") {
            config.soft_deletes = parse_enum("soft_deletes", &soft_deletes)?;
        }

        if let Ok(collection_joins) = std::env::var("ORM_FIND_COLLECTION_JOINS") {
            config.collection_joins = parse_enum("collection_joins", &collection_joins)?;
        }

        if let Ok(max_rows) = std::env::var("ORM_FIND_MAX_ROWS") {
            config.max_rows = max_rows.parse().map_err(|e| {
                FindError::Configuration(format!("Invalid max_rows: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, an optional YAML/TOML file at `path`, then `ORM_FIND__*` variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let defaults = config::Config::try_from(&Self::default()).map_err(config_error)?;
        let config: Self = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("ORM_FIND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(config_error)?;

        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "Loaded finder configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rows == 0 {
            return Err(FindError::Configuration(
                "max_rows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_enum<T: DeserializeOwned>(name: &str, raw: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .map_err(|_| FindError::Configuration(format!("Invalid {name}: {raw}")))
}

fn config_error(error: config::ConfigError) -> FindError {
    FindError::Configuration(error.to_string())
}
