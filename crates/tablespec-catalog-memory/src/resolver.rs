use std::collections::HashMap;

use dashmap::DashMap;
use figment::providers::{Format, Toml};
use figment::Figment;
use log::debug;
use serde::Deserialize;
use tablespec_catalog::error::{CatalogError, CatalogResult};
use tablespec_catalog::provider::{ResolvedDetails, Resolver};
use tablespec_catalog::utils::substitute_placeholders;
use tablespec_common::error::CommonError;

const PATH_SUFFIX: &str = "_path";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResolverDocument {
    values: HashMap<String, String>,
    tables: HashMap<String, ResolvedDetails>,
}

/// An in-memory resolver.
///
/// Plain values are used to substitute `{key}` placeholders in registered names
/// and paths. Every registered table additionally contributes its substituted
/// name under its id and its substituted path under `<id>_path`.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    values: DashMap<String, String>,
    entries: DashMap<String, ResolvedDetails>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads values and tables from a TOML document:
    ///
    /// ```toml
    /// [values]
    /// ID = "_dev"
    ///
    /// [tables.Orders]
    /// name = "sales{ID}.orders"
    /// path = "/mnt/sales{ID}/orders"
    /// schema = "id bigint, amount double"
    /// ```
    pub fn from_toml(text: &str) -> CatalogResult<Self> {
        let document: ResolverDocument = Figment::from(Toml::string(text))
            .extract()
            .map_err(CommonError::from)?;
        let resolver = Self::new();
        for (key, value) in document.values {
            resolver.set_value(key, value);
        }
        for (id, details) in document.tables {
            resolver.register(id, details);
        }
        Ok(resolver)
    }

    pub fn set_value(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn register(&self, id: impl Into<String>, details: ResolvedDetails) {
        self.entries.insert(id.into(), details);
    }

    fn values(&self) -> HashMap<String, String> {
        self.values
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect()
    }

    fn substitute(details: &ResolvedDetails, values: &HashMap<String, String>) -> CatalogResult<ResolvedDetails> {
        let mut details = details.clone();
        details.name = details
            .name
            .map(|n| substitute_placeholders(&n, values))
            .transpose()?;
        details.path = details
            .path
            .map(|p| substitute_placeholders(&p, values))
            .transpose()?;
        Ok(details)
    }
}

impl Resolver for MemoryResolver {
    fn resolve(&self, id: &str) -> CatalogResult<ResolvedDetails> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| CatalogError::SpecNotFound(id.to_string()))?;
        Self::substitute(entry.value(), &self.values())
    }

    fn all_details(&self) -> CatalogResult<HashMap<String, String>> {
        let values = self.values();
        let mut details = values.clone();
        for item in self.entries.iter() {
            let id = item.key();
            match Self::substitute(item.value(), &values) {
                Ok(resolved) => {
                    if let Some(name) = resolved.name {
                        details.insert(id.clone(), name);
                    }
                    if let Some(path) = resolved.path {
                        details.insert(format!("{id}{PATH_SUFFIX}"), path);
                    }
                }
                Err(e) => debug!("skipping unresolvable entry {id}: {e}"),
            }
        }
        Ok(details)
    }
}
