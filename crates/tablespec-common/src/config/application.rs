use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::CommonResult;

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub spec: SpecConfig,
    pub diff: DiffConfig,
    pub upsert: UpsertConfig,
}

impl AppConfig {
    /// Loads the configuration from the built-in defaults,
    /// overridden by `TABLESPEC__`-prefixed environment variables.
    /// A double underscore separates nested keys,
    /// e.g. `TABLESPEC__DIFF__ALLOW_DROP_COLUMNS=true`.
    pub fn load() -> CommonResult<Self> {
        Ok(Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Env::prefixed("TABLESPEC__").map(|p| p.as_str().replace("__", ".").into()))
            .extract()?)
    }

    /// Loads the built-in defaults only, ignoring the environment.
    pub fn from_defaults() -> CommonResult<Self> {
        Ok(Figment::from(Toml::string(DEFAULT_CONFIG)).extract()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecConfig {
    /// Store-managed table properties that are stripped on every construction.
    pub blanked_property_keys: Vec<String>,
    /// The scheme given to locations that do not carry one.
    pub default_filesystem_scheme: String,
    /// Locations under this prefix belong to managed tables.
    pub managed_location_prefix: String,
    pub min_reader_version: u32,
    pub min_writer_version: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiffConfig {
    pub allow_drop_columns: bool,
    pub allow_unset_properties: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertConfig {
    pub staging_database: String,
    pub staging_view_prefix: String,
}
