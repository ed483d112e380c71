use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tablespec_common::spec::{parse_schema, Schema};

use crate::error::{CatalogError, CatalogResult};

/// A schema given either as a column list (`id bigint, name string`)
/// or in structured form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaDefinition {
    Sql(String),
    Structured(Schema),
}

impl SchemaDefinition {
    pub fn to_schema(&self) -> CatalogResult<Schema> {
        match self {
            SchemaDefinition::Sql(sql) => Ok(parse_schema(sql)?),
            SchemaDefinition::Structured(schema) => Ok(schema.clone()),
        }
    }
}

/// Everything the resolver knows about a registered id.
/// Values are returned with placeholders already substituted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvedDetails {
    pub name: Option<String>,
    pub path: Option<String>,
    pub format: Option<String>,
    pub options: BTreeMap<String, String>,
    pub partitioned_by: Vec<String>,
    pub schema: Option<SchemaDefinition>,
    pub tblproperties: BTreeMap<String, String>,
    pub dbproperties: BTreeMap<String, String>,
    pub comment: Option<String>,
    /// Free-form properties such as stream settings.
    pub properties: BTreeMap<String, String>,
}

/// Maps symbolic ids to table details and substitutes `{key}` placeholders.
pub trait Resolver: Send + Sync {
    /// Resolves a registered id.
    /// Fails with [`CatalogError::SpecNotFound`] if the id is unknown.
    fn resolve(&self, id: &str) -> CatalogResult<ResolvedDetails>;

    /// Returns the full placeholder mapping, including one entry per registered
    /// table name and one `<id>_path` entry per registered location.
    fn all_details(&self) -> CatalogResult<HashMap<String, String>>;

    fn property(&self, id: &str, key: &str) -> CatalogResult<Option<String>> {
        Ok(self.resolve(id)?.properties.get(key).cloned())
    }

    fn require_property(&self, id: &str, key: &str) -> CatalogResult<String> {
        self.property(id, key)?
            .ok_or_else(|| CatalogError::NoSuchValue(format!("{id}.{key}")))
    }
}
