use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use tablespec_common::config::SpecConfig;
use tablespec_common::spec::Schema;

use crate::error::{CatalogError, CatalogResult};
use crate::name::TableName;
use crate::normalize::normalize_schema;
use crate::provider::{DescribeRow, Resolver, TableStore};
use crate::statement::{CreateTableStatement, Statement};
use crate::utils::{
    anonymous_identifier, has_placeholders, normalize_location, parse_anonymous_identifier,
    substitute_placeholders,
};

pub const DELTA_FORMAT: &str = "delta";

const PARTITIONING_SECTION: &str = "# Partitioning";
const PARTITION_ROW_PREFIX: &str = "Part ";

/// Table properties that carry meaning for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownProperty {
    MinReaderVersion,
    MinWriterVersion,
    ColumnMappingMode,
}

impl WellKnownProperty {
    pub const fn key(&self) -> &'static str {
        match self {
            WellKnownProperty::MinReaderVersion => "delta.minReaderVersion",
            WellKnownProperty::MinWriterVersion => "delta.minWriterVersion",
            WellKnownProperty::ColumnMappingMode => "delta.columnMapping.mode",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [
            WellKnownProperty::MinReaderVersion,
            WellKnownProperty::MinWriterVersion,
            WellKnownProperty::ColumnMappingMode,
        ]
        .into_iter()
        .find(|p| p.key() == key)
    }

    /// Protocol versions can only be raised and are never unset.
    pub fn is_protocol_version(&self) -> bool {
        matches!(
            self,
            WellKnownProperty::MinReaderVersion | WellKnownProperty::MinWriterVersion
        )
    }
}

/// The plain fields of a [`TableSpecification`], used to construct or rebuild one.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpecParts {
    pub name: Option<String>,
    pub schema: Schema,
    pub format: String,
    pub options: BTreeMap<String, String>,
    pub partitioned_by: Vec<String>,
    pub tblproperties: BTreeMap<String, String>,
    pub location: Option<String>,
    pub comment: Option<String>,
}

impl Default for TableSpecParts {
    fn default() -> Self {
        Self {
            name: None,
            schema: Schema::default(),
            format: DELTA_FORMAT.to_string(),
            options: BTreeMap::new(),
            partitioned_by: vec![],
            tblproperties: BTreeMap::new(),
            location: None,
            comment: None,
        }
    }
}

/// The desired or actual definition of a Delta table.
///
/// A specification is immutable and always valid: every constructor
/// normalizes the name and location and enforces the invariants.
/// Derived specifications are created with [`TableSpecification::rebuild`].
#[derive(Debug, Clone)]
pub struct TableSpecification {
    name: Option<String>,
    schema: Schema,
    format: String,
    options: BTreeMap<String, String>,
    partitioned_by: Vec<String>,
    tblproperties: BTreeMap<String, String>,
    location: Option<String>,
    comment: Option<String>,
    config: SpecConfig,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TableSpecification {
    pub fn try_new(parts: TableSpecParts, config: &SpecConfig) -> CatalogResult<Self> {
        let TableSpecParts {
            name,
            schema,
            format,
            options,
            partitioned_by,
            mut tblproperties,
            location,
            comment,
        } = parts;

        let mut name = non_empty(name).map(|n| n.trim().to_string());
        let mut location = non_empty(location);
        if let Some(anonymous) = name.as_deref().and_then(parse_anonymous_identifier) {
            if location.as_deref().is_some_and(|l| l != anonymous) {
                return Err(CatalogError::invalid(format!(
                    "name addresses location '{anonymous}' but the location is set to a different value"
                )));
            }
            name = None;
            location = Some(anonymous);
        }
        let name = match name {
            Some(n) if has_placeholders(&n) => Some(n),
            Some(n) => {
                let n = n.to_lowercase();
                TableName::parse(&n)?;
                Some(n)
            }
            None => None,
        };

        let format = format.trim().to_lowercase();
        if format != DELTA_FORMAT {
            return Err(CatalogError::invalid(format!(
                "table format must be '{DELTA_FORMAT}', got '{format}'"
            )));
        }

        let location = match location {
            Some(l) if has_placeholders(&l) => Some(l),
            Some(l) => {
                let l = normalize_location(l.trim(), &config.default_filesystem_scheme)?;
                // checked after normalization, so a bare warehouse path counts as managed
                if name.is_some() && l.starts_with(&config.managed_location_prefix) {
                    debug!("dropping managed location {l} of table {name:?}");
                    None
                } else {
                    Some(l)
                }
            }
            None => None,
        };

        for column in &partitioned_by {
            if schema.field(column).is_none() {
                return Err(CatalogError::invalid(format!(
                    "partition column '{column}' is not in the schema"
                )));
            }
        }

        for key in &config.blanked_property_keys {
            tblproperties.remove(key);
        }

        Ok(Self {
            name,
            schema,
            format,
            options,
            partitioned_by,
            tblproperties,
            location,
            comment: non_empty(comment),
            config: config.clone(),
        })
    }

    /// Looks up a symbolic id in the resolver.
    pub fn from_id(resolver: &dyn Resolver, id: &str, config: &SpecConfig) -> CatalogResult<Self> {
        let details = resolver.resolve(id)?;
        let schema = match &details.schema {
            Some(schema) => schema.to_schema()?,
            None => Schema::default(),
        };
        Self::try_new(
            TableSpecParts {
                name: details.name,
                schema,
                format: details.format.unwrap_or_else(|| DELTA_FORMAT.to_string()),
                options: details.options,
                partitioned_by: details.partitioned_by,
                tblproperties: details.tblproperties,
                location: details.path,
                comment: details.comment,
            },
            config,
        )
    }

    /// Reads the specification of a live table from the store.
    /// The identifier is a table name or ``delta.`<location>` ``.
    pub fn from_store(
        store: &dyn TableStore,
        identifier: &str,
        config: &SpecConfig,
    ) -> CatalogResult<Self> {
        let description = store.describe_table(identifier)?;
        let partitioned_by = partitioning_from_rows(&description.rows)?;
        let detail = description.detail;
        let mut tblproperties = detail.properties;
        if let Some(version) = detail.min_reader_version {
            tblproperties.insert(
                WellKnownProperty::MinReaderVersion.key().to_string(),
                version.to_string(),
            );
        }
        if let Some(version) = detail.min_writer_version {
            tblproperties.insert(
                WellKnownProperty::MinWriterVersion.key().to_string(),
                version.to_string(),
            );
        }
        let name = match parse_anonymous_identifier(identifier) {
            Some(_) => None,
            None => Some(identifier.to_string()),
        };
        Self::try_new(
            TableSpecParts {
                name,
                schema: description.schema,
                format: detail.format,
                options: BTreeMap::new(),
                partitioned_by,
                tblproperties,
                location: detail.location,
                comment: detail.comment,
            },
            config,
        )
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn partitioned_by(&self) -> &[String] {
        &self.partitioned_by
    }

    pub fn tblproperties(&self) -> &BTreeMap<String, String> {
        &self.tblproperties
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn config(&self) -> &SpecConfig {
        &self.config
    }

    pub fn to_parts(&self) -> TableSpecParts {
        TableSpecParts {
            name: self.name.clone(),
            schema: self.schema.clone(),
            format: self.format.clone(),
            options: self.options.clone(),
            partitioned_by: self.partitioned_by.clone(),
            tblproperties: self.tblproperties.clone(),
            location: self.location.clone(),
            comment: self.comment.clone(),
        }
    }

    /// Creates a modified copy. The copy goes through full validation.
    pub fn rebuild(&self, f: impl FnOnce(&mut TableSpecParts)) -> CatalogResult<Self> {
        let mut parts = self.to_parts();
        f(&mut parts);
        Self::try_new(parts, &self.config)
    }

    /// The copy that is compared during reconciliation.
    pub fn normalized(&self) -> Self {
        Self {
            schema: normalize_schema(&self.schema),
            ..self.clone()
        }
    }

    /// The identifier used in statements, without placeholder substitution.
    pub fn identifier(&self) -> CatalogResult<String> {
        match (&self.name, &self.location) {
            (Some(name), _) => Ok(name.clone()),
            (None, Some(location)) => Ok(anonymous_identifier(location)),
            (None, None) => Err(CatalogError::TableSpecNotReadable(
                "the specification has neither a name nor a location".to_string(),
            )),
        }
    }

    /// The identifier to read or write data with, with placeholders substituted.
    pub fn data_identifier(&self, resolver: &dyn Resolver) -> CatalogResult<String> {
        let details = resolver.all_details()?;
        match (&self.name, &self.location) {
            (Some(name), _) => substitute_placeholders(name, &details),
            (None, Some(location)) => Ok(anonymous_identifier(&substitute_placeholders(
                location, &details,
            )?)),
            (None, None) => Err(CatalogError::TableSpecNotReadable(
                "the specification has neither a name nor a location".to_string(),
            )),
        }
    }

    /// Substitutes every placeholder in the name and location.
    pub fn fully_substituted(&self, resolver: &dyn Resolver) -> CatalogResult<Self> {
        let details = resolver.all_details()?;
        let name = self
            .name
            .as_deref()
            .map(|n| substitute_placeholders(n, &details))
            .transpose()?;
        let location = self
            .location
            .as_deref()
            .map(|l| substitute_placeholders(l, &details))
            .transpose()?;
        self.rebuild(|parts| {
            parts.name = name;
            parts.location = location;
        })
    }

    /// Like [`TableSpecification::fully_substituted`] but with the name replaced.
    /// The new name is taken as is, only the location is substituted.
    /// A `None` name yields a specification addressed by location only.
    pub fn fully_substituted_as(
        &self,
        resolver: &dyn Resolver,
        name: Option<String>,
    ) -> CatalogResult<Self> {
        let details = resolver.all_details()?;
        let location = self
            .location
            .as_deref()
            .map(|l| substitute_placeholders(l, &details))
            .transpose()?;
        self.rebuild(|parts| {
            parts.name = name;
            parts.location = location;
        })
    }

    /// Adds the recommended table properties: minimum reader and writer protocol
    /// versions and column mapping by name. Values that are already set win.
    pub fn with_good_defaults(&self) -> CatalogResult<Self> {
        let defaults = [
            (
                WellKnownProperty::MinReaderVersion,
                self.config.min_reader_version.to_string(),
            ),
            (
                WellKnownProperty::MinWriterVersion,
                self.config.min_writer_version.to_string(),
            ),
            (WellKnownProperty::ColumnMappingMode, "name".to_string()),
        ];
        self.rebuild(|parts| {
            for (property, value) in defaults {
                match parts.tblproperties.get(property.key()) {
                    Some(existing) if *existing != value => warn!(
                        "keeping table property {} = {existing} instead of the recommended {value}",
                        property.key()
                    ),
                    Some(_) => {}
                    None => {
                        parts
                            .tblproperties
                            .insert(property.key().to_string(), value);
                    }
                }
            }
        })
    }

    pub fn to_create_statement(&self) -> CatalogResult<Statement> {
        Ok(Statement::CreateTable(CreateTableStatement {
            table: self.identifier()?,
            schema: self.schema.clone(),
            format: self.format.clone(),
            options: self.options.clone(),
            partitioned_by: self.partitioned_by.clone(),
            location: self.location.clone(),
            comment: self.comment.clone(),
            properties: self.tblproperties.clone(),
        }))
    }
}

/// Recovers the partition columns from the `# Partitioning` section
/// of the `DESCRIBE TABLE` output, ordered by partition index.
pub fn partitioning_from_rows(rows: &[DescribeRow]) -> CatalogResult<Vec<String>> {
    let mut partitions = vec![];
    let mut in_section = false;
    for row in rows {
        let col_name = row.col_name.trim();
        if col_name == PARTITIONING_SECTION {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if col_name.starts_with('#') {
            break;
        }
        if let Some(index) = col_name.strip_prefix(PARTITION_ROW_PREFIX) {
            let index = index.trim().parse::<usize>().map_err(|e| {
                CatalogError::Store(format!("invalid partitioning row '{col_name}': {e}"))
            })?;
            partitions.push((index, row.data_type.trim().to_string()));
        }
    }
    partitions.sort();
    Ok(partitions.into_iter().map(|(_, column)| column).collect())
}

impl PartialEq for TableSpecification {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && normalize_schema(&self.schema) == normalize_schema(&other.schema)
            && self.format == other.format
            && self.options == other.options
            && self.partitioned_by == other.partitioned_by
            && self.tblproperties == other.tblproperties
            && self.location == other.location
            && self.comment == other.comment
    }
}

impl fmt::Display for TableSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self
            .schema
            .fields
            .iter()
            .map(|field| format!("{} {}", field.name, field.data_type))
            .collect::<Vec<_>>();
        write!(f, "TableSpecification(")?;
        if let Some(name) = &self.name {
            write!(f, "name={name}, ")?;
        }
        write!(f, "schema=<{}>", columns.join(", "))?;
        if !self.partitioned_by.is_empty() {
            write!(f, ", partitioned_by=[{}]", self.partitioned_by.join(", "))?;
        }
        if let Some(location) = &self.location {
            write!(f, ", location={location}")?;
        }
        if let Some(comment) = &self.comment {
            write!(f, ", comment={comment:?}")?;
        }
        if !self.tblproperties.is_empty() {
            let properties = self
                .tblproperties
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>();
            write!(f, ", tblproperties={{{}}}", properties.join(", "))?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tablespec_common::config::AppConfig;
    use tablespec_common::spec::{parse_schema, DataType, Field};

    use super::*;

    fn config() -> SpecConfig {
        AppConfig::from_defaults().unwrap().spec
    }

    fn parts(name: &str) -> TableSpecParts {
        TableSpecParts {
            name: Some(name.to_string()),
            schema: parse_schema("id bigint, region string, amount double").unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_name_is_lowercased() {
        let spec = TableSpecification::try_new(parts("Sales.Orders"), &config()).unwrap();
        assert_eq!(spec.name(), Some("sales.orders"));
    }

    #[test]
    fn test_placeholder_name_is_preserved() {
        let spec = TableSpecification::try_new(parts("Sales{ID}.Orders"), &config()).unwrap();
        assert_eq!(spec.name(), Some("Sales{ID}.Orders"));
    }

    #[test]
    fn test_invalid_name() {
        let result = TableSpecification::try_new(parts("a.b.c.d"), &config());
        assert!(matches!(result, Err(CatalogError::SpecValidation(_))));
    }

    #[test]
    fn test_format_must_be_delta() {
        let result = TableSpecification::try_new(
            TableSpecParts {
                format: "parquet".to_string(),
                ..parts("t")
            },
            &config(),
        );
        assert!(matches!(result, Err(CatalogError::SpecValidation(_))));
        let spec = TableSpecification::try_new(
            TableSpecParts {
                format: "DELTA".to_string(),
                ..parts("t")
            },
            &config(),
        )
        .unwrap();
        assert_eq!(spec.format(), "delta");
    }

    #[test]
    fn test_location_normalization() {
        let spec = TableSpecification::try_new(
            TableSpecParts {
                location: Some("/mnt/sales/orders".to_string()),
                ..parts("sales.orders")
            },
            &config(),
        )
        .unwrap();
        assert_eq!(spec.location(), Some("dbfs:/mnt/sales/orders"));

        let managed = TableSpecification::try_new(
            TableSpecParts {
                location: Some("dbfs:/user/hive/warehouse/sales.db/orders".to_string()),
                ..parts("sales.orders")
            },
            &config(),
        )
        .unwrap();
        assert_eq!(managed.location(), None);

        let bare_managed = TableSpecification::try_new(
            TableSpecParts {
                location: Some("/user/hive/warehouse/sales.db/orders".to_string()),
                ..parts("sales.orders")
            },
            &config(),
        )
        .unwrap();
        assert_eq!(bare_managed.location(), None);

        let anonymous = TableSpecification::try_new(
            TableSpecParts {
                name: None,
                location: Some("/user/hive/warehouse/sales.db/orders".to_string()),
                ..parts("t")
            },
            &config(),
        )
        .unwrap();
        assert_eq!(
            anonymous.location(),
            Some("dbfs:/user/hive/warehouse/sales.db/orders")
        );
    }

    #[test]
    fn test_anonymous_name_becomes_location() {
        let spec = TableSpecification::try_new(
            TableSpecParts {
                name: Some("delta.`/tmp/orders`".to_string()),
                ..parts("t")
            },
            &config(),
        )
        .unwrap();
        assert_eq!(spec.name(), None);
        assert_eq!(spec.location(), Some("dbfs:/tmp/orders"));
        assert_eq!(spec.identifier().unwrap(), "delta.`dbfs:/tmp/orders`");
    }

    #[test]
    fn test_partition_columns_must_exist() {
        let result = TableSpecification::try_new(
            TableSpecParts {
                partitioned_by: vec!["missing".to_string()],
                ..parts("t")
            },
            &config(),
        );
        assert!(matches!(result, Err(CatalogError::SpecValidation(_))));
    }

    #[test]
    fn test_blanked_properties_are_removed() {
        let spec = TableSpecification::try_new(
            TableSpecParts {
                tblproperties: BTreeMap::from([
                    ("delta.appendOnly".to_string(), "true".to_string()),
                    ("delta.columnMapping.maxColumnId".to_string(), "4".to_string()),
                ]),
                ..parts("t")
            },
            &config(),
        )
        .unwrap();
        assert_eq!(
            spec.tblproperties().keys().collect::<Vec<_>>(),
            vec!["delta.appendOnly"]
        );
    }

    #[test]
    fn test_equality_uses_normalized_schema() {
        let a = TableSpecification::try_new(parts("t"), &config()).unwrap();
        let b = a
            .rebuild(|p| {
                p.schema = Schema::new(vec![
                    Field::new("id", DataType::Long, false),
                    Field::new("region", DataType::String, true).with_comment(""),
                    Field::new("amount", DataType::Double, true),
                ])
            })
            .unwrap();
        assert_eq!(a, b);
        let c = a.rebuild(|p| p.comment = Some("changed".to_string())).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_with_good_defaults() {
        let spec = TableSpecification::try_new(
            TableSpecParts {
                tblproperties: BTreeMap::from([(
                    "delta.minWriterVersion".to_string(),
                    "7".to_string(),
                )]),
                ..parts("t")
            },
            &config(),
        )
        .unwrap()
        .with_good_defaults()
        .unwrap();
        let properties = spec.tblproperties();
        assert_eq!(properties["delta.minReaderVersion"], "2");
        assert_eq!(properties["delta.minWriterVersion"], "7");
        assert_eq!(properties["delta.columnMapping.mode"], "name");
    }

    #[test]
    fn test_rebuild_validates() {
        let spec = TableSpecification::try_new(parts("t"), &config()).unwrap();
        assert!(spec
            .rebuild(|p| p.partitioned_by = vec!["nope".to_string()])
            .is_err());
        let renamed = spec.rebuild(|p| p.name = Some("Other".to_string())).unwrap();
        assert_eq!(renamed.name(), Some("other"));
    }

    #[test]
    fn test_not_readable_without_name_or_location() {
        let spec = TableSpecification::try_new(
            TableSpecParts {
                name: None,
                ..parts("t")
            },
            &config(),
        )
        .unwrap();
        assert!(matches!(
            spec.to_create_statement(),
            Err(CatalogError::TableSpecNotReadable(_))
        ));
    }

    #[test]
    fn test_partitioning_from_rows() {
        let rows = vec![
            DescribeRow::new("id", "bigint"),
            DescribeRow::new("region", "string"),
            DescribeRow::new("", ""),
            DescribeRow::new("# Partitioning", ""),
            DescribeRow::new("Part 1", "day"),
            DescribeRow::new("Part 0", "region"),
        ];
        assert_eq!(partitioning_from_rows(&rows).unwrap(), vec!["region", "day"]);
        assert!(partitioning_from_rows(&rows[..2]).unwrap().is_empty());
    }
}
