use std::collections::BTreeMap;
use std::fmt;

use tablespec_common::spec::{Field, Schema};

use crate::utils::{quote_name_if_needed, quote_names_if_needed, quote_string_literal};

/// A statement the table store can execute.
///
/// The [`fmt::Display`] implementation renders the SQL text of the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateTable(CreateTableStatement),
    CreateDatabase(CreateDatabaseStatement),
    /// Registers an existing Delta location under a table name.
    RegisterTable { table: String, location: String },
    AlterTable {
        table: String,
        action: AlterTableAction,
    },
    Merge(MergeStatement),
    TruncateTable { table: String },
    DropTable { table: String, if_exists: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableStatement {
    pub table: String,
    pub schema: Schema,
    pub format: String,
    pub options: BTreeMap<String, String>,
    pub partitioned_by: Vec<String>,
    pub location: Option<String>,
    pub comment: Option<String>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDatabaseStatement {
    pub database: String,
    pub comment: Option<String>,
    pub location: Option<String>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterTableAction {
    AddColumn(Field),
    DropColumn(String),
    AlterColumnComment { column: String, comment: String },
    AlterColumnSetDefault { column: String, expression: String },
    AlterColumnDropDefault { column: String },
    SetProperty { key: String, value: String },
    UnsetProperty { key: String },
    SetComment(String),
}

/// Merges a source into a target on equality of the join columns.
/// Matched rows get all update columns overwritten,
/// unmatched rows are inserted with all insert columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStatement {
    pub target: String,
    pub source: String,
    pub join_columns: Vec<String>,
    pub update_columns: Vec<String>,
    pub insert_columns: Vec<String>,
}

pub const MERGE_TARGET_ALIAS: &str = "target";
pub const MERGE_SOURCE_ALIAS: &str = "source";

/// Renders `name type [NOT NULL] [DEFAULT expr] [COMMENT '...']`.
pub fn column_definition(field: &Field) -> String {
    let mut definition = format!("{} {}", quote_name_if_needed(&field.name), field.data_type);
    if !field.nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(expression) = field.default_expression() {
        definition.push_str(&format!(" DEFAULT {expression}"));
    }
    if let Some(comment) = field.comment() {
        definition.push_str(&format!(" COMMENT {}", quote_string_literal(comment)));
    }
    definition
}

fn key_values(values: &BTreeMap<String, String>) -> Vec<String> {
    values
        .iter()
        .map(|(k, v)| format!("{} = {}", quote_string_literal(k), quote_string_literal(v)))
        .collect()
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::CreateTable(create) => write!(f, "{create}"),
            Statement::CreateDatabase(create) => write!(f, "{create}"),
            Statement::RegisterTable { table, location } => write!(
                f,
                "CREATE TABLE IF NOT EXISTS {table} USING DELTA LOCATION {}",
                quote_string_literal(location)
            ),
            Statement::AlterTable { table, action } => write!(f, "ALTER TABLE {table} {action}"),
            Statement::Merge(merge) => write!(f, "{merge}"),
            Statement::TruncateTable { table } => write!(f, "TRUNCATE TABLE {table}"),
            Statement::DropTable { table, if_exists } => {
                if *if_exists {
                    write!(f, "DROP TABLE IF EXISTS {table}")
                } else {
                    write!(f, "DROP TABLE {table}")
                }
            }
        }
    }
}

impl fmt::Display for CreateTableStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE TABLE {}", self.table)?;
        if !self.schema.is_empty() {
            let columns = self
                .schema
                .fields
                .iter()
                .map(|field| format!("  {}", column_definition(field)))
                .collect::<Vec<_>>();
            write!(f, "\n(\n{}\n)", columns.join(",\n"))?;
        }
        write!(f, "\nUSING {}", self.format.to_uppercase())?;
        if !self.options.is_empty() {
            write!(f, "\nOPTIONS ({})", key_values(&self.options).join(", "))?;
        }
        if !self.partitioned_by.is_empty() {
            write!(
                f,
                "\nPARTITIONED BY ({})",
                quote_names_if_needed(&self.partitioned_by)
            )?;
        }
        if let Some(location) = &self.location {
            write!(f, "\nLOCATION {}", quote_string_literal(location))?;
        }
        if let Some(comment) = &self.comment {
            write!(f, "\nCOMMENT {}", quote_string_literal(comment))?;
        }
        if !self.properties.is_empty() {
            let properties = key_values(&self.properties)
                .into_iter()
                .map(|p| format!("  {p}"))
                .collect::<Vec<_>>();
            write!(f, "\nTBLPROPERTIES (\n{}\n)", properties.join(",\n"))?;
        }
        Ok(())
    }
}

impl fmt::Display for CreateDatabaseStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE SCHEMA IF NOT EXISTS {}", self.database)?;
        if let Some(comment) = &self.comment {
            write!(f, "\n  COMMENT {}", quote_string_literal(comment))?;
        }
        if let Some(location) = &self.location {
            write!(f, "\n  LOCATION {}", quote_string_literal(location))?;
        }
        if !self.properties.is_empty() {
            write!(
                f,
                "\n  WITH DBPROPERTIES ({})",
                key_values(&self.properties).join(", ")
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for AlterTableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlterTableAction::AddColumn(field) => {
                write!(f, "ADD COLUMN {}", column_definition(field))
            }
            AlterTableAction::DropColumn(column) => {
                write!(f, "DROP COLUMN {}", quote_name_if_needed(column))
            }
            AlterTableAction::AlterColumnComment { column, comment } => write!(
                f,
                "ALTER COLUMN {} COMMENT {}",
                quote_name_if_needed(column),
                quote_string_literal(comment)
            ),
            AlterTableAction::AlterColumnSetDefault { column, expression } => write!(
                f,
                "ALTER COLUMN {} SET DEFAULT {expression}",
                quote_name_if_needed(column)
            ),
            AlterTableAction::AlterColumnDropDefault { column } => write!(
                f,
                "ALTER COLUMN {} DROP DEFAULT",
                quote_name_if_needed(column)
            ),
            AlterTableAction::SetProperty { key, value } => write!(
                f,
                "SET TBLPROPERTIES ({} = {})",
                quote_string_literal(key),
                quote_string_literal(value)
            ),
            AlterTableAction::UnsetProperty { key } => {
                write!(f, "UNSET TBLPROPERTIES ({})", quote_string_literal(key))
            }
            AlterTableAction::SetComment(comment) => {
                write!(f, "SET COMMENT {}", quote_string_literal(comment))
            }
        }
    }
}

impl fmt::Display for MergeStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = |alias: &str, name: &str| format!("{alias}.{}", quote_name_if_needed(name));
        let condition = self
            .join_columns
            .iter()
            .map(|c| {
                format!(
                    "({} = {})",
                    column(MERGE_SOURCE_ALIAS, c),
                    column(MERGE_TARGET_ALIAS, c)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        write!(
            f,
            "MERGE INTO {} AS {MERGE_TARGET_ALIAS}\nUSING {} AS {MERGE_SOURCE_ALIAS}\nON {condition}",
            self.target, self.source
        )?;
        if !self.update_columns.is_empty() {
            let assignments = self
                .update_columns
                .iter()
                .map(|c| {
                    format!(
                        "{} = {}",
                        column(MERGE_TARGET_ALIAS, c),
                        column(MERGE_SOURCE_ALIAS, c)
                    )
                })
                .collect::<Vec<_>>();
            write!(
                f,
                "\nWHEN MATCHED THEN UPDATE SET {}",
                assignments.join(", ")
            )?;
        }
        let values = self
            .insert_columns
            .iter()
            .map(|c| column(MERGE_SOURCE_ALIAS, c))
            .collect::<Vec<_>>();
        write!(
            f,
            "\nWHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            quote_names_if_needed(&self.insert_columns),
            values.join(", ")
        )
    }
}
