use std::collections::BTreeMap;

use tablespec_common::config::SpecConfig;

use crate::error::{CatalogError, CatalogResult};
use crate::provider::{Resolver, TableStore};
use crate::statement::{CreateDatabaseStatement, Statement};
use crate::utils::{has_placeholders, normalize_location, substitute_placeholders};

/// The desired or actual definition of a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSpecification {
    name: String,
    comment: Option<String>,
    location: Option<String>,
    dbproperties: BTreeMap<String, String>,
}

impl DatabaseSpecification {
    pub fn try_new(
        name: impl Into<String>,
        comment: Option<String>,
        location: Option<String>,
        dbproperties: BTreeMap<String, String>,
        config: &SpecConfig,
    ) -> CatalogResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(CatalogError::invalid("database name must not be empty"));
        }
        let name = if has_placeholders(&name) {
            name
        } else {
            name.to_lowercase()
        };
        let location = match location.filter(|l| !l.trim().is_empty()) {
            Some(l) if has_placeholders(&l) => Some(l),
            Some(l) => Some(normalize_location(l.trim(), &config.default_filesystem_scheme)?),
            None => None,
        };
        Ok(Self {
            name,
            comment: comment.filter(|c| !c.trim().is_empty()),
            location,
            dbproperties,
        })
    }

    pub fn from_id(resolver: &dyn Resolver, id: &str, config: &SpecConfig) -> CatalogResult<Self> {
        let details = resolver.resolve(id)?;
        let name = details
            .name
            .ok_or_else(|| CatalogError::invalid(format!("no database name registered for {id}")))?;
        Self::try_new(
            name,
            details.comment,
            details.path,
            details.dbproperties,
            config,
        )
    }

    pub fn from_store(store: &dyn TableStore, name: &str, config: &SpecConfig) -> CatalogResult<Self> {
        let description = store.describe_database(name)?;
        Self::try_new(
            description.name,
            description.comment,
            description.location,
            description.properties,
            config,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn dbproperties(&self) -> &BTreeMap<String, String> {
        &self.dbproperties
    }

    pub fn fully_substituted(&self, resolver: &dyn Resolver, config: &SpecConfig) -> CatalogResult<Self> {
        let details = resolver.all_details()?;
        Self::try_new(
            substitute_placeholders(&self.name, &details)?,
            self.comment.clone(),
            self.location
                .as_deref()
                .map(|l| substitute_placeholders(l, &details))
                .transpose()?,
            self.dbproperties.clone(),
            config,
        )
    }

    pub fn to_create_statement(&self) -> Statement {
        Statement::CreateDatabase(CreateDatabaseStatement {
            database: self.name.clone(),
            comment: self.comment.clone(),
            location: self.location.clone(),
            properties: self.dbproperties.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tablespec_common::config::AppConfig;

    use super::*;

    #[test]
    fn test_create_database_text() {
        let config = AppConfig::from_defaults().unwrap().spec;
        let spec = DatabaseSpecification::try_new(
            "Sales",
            Some("all sales data".to_string()),
            Some("/mnt/sales".to_string()),
            BTreeMap::from([("owner".to_string(), "finance".to_string())]),
            &config,
        )
        .unwrap();
        assert_eq!(spec.name(), "sales");
        assert_eq!(
            spec.to_create_statement().to_string(),
            "CREATE SCHEMA IF NOT EXISTS sales\n  \
             COMMENT 'all sales data'\n  \
             LOCATION 'dbfs:/mnt/sales'\n  \
             WITH DBPROPERTIES ('owner' = 'finance')"
        );
    }

    #[test]
    fn test_empty_database_name() {
        let config = AppConfig::from_defaults().unwrap().spec;
        assert!(DatabaseSpecification::try_new(" ", None, None, BTreeMap::new(), &config).is_err());
    }
}
