use std::cmp::Ordering;

use log::{debug, warn};
use tablespec_common::config::DiffConfig;
use tablespec_common::spec::Field;

use crate::error::{CatalogError, CatalogResult};
use crate::normalize::{normalize_schema, unsupported_metadata};
use crate::provider::TableStore;
use crate::statement::{AlterTableAction, Statement};
use crate::table_spec::{TableSpecification, WellKnownProperty};

/// Controls which destructive statements the differ may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffPolicy {
    pub allow_drop_columns: bool,
    pub allow_unset_properties: bool,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            allow_drop_columns: false,
            allow_unset_properties: true,
        }
    }
}

impl From<&DiffConfig> for DiffPolicy {
    fn from(config: &DiffConfig) -> Self {
        Self {
            allow_drop_columns: config.allow_drop_columns,
            allow_unset_properties: config.allow_unset_properties,
        }
    }
}

/// Schema actions sort by column name, then by this rank.
fn schema_action_rank(action: &AlterTableAction) -> u8 {
    match action {
        AlterTableAction::DropColumn(_) => 0,
        AlterTableAction::AddColumn(_) => 1,
        AlterTableAction::AlterColumnComment { .. } => 2,
        AlterTableAction::AlterColumnSetDefault { .. }
        | AlterTableAction::AlterColumnDropDefault { .. } => 3,
        _ => 4,
    }
}

/// Computes the statements that turn `actual` into `desired`.
///
/// Statements are ordered schema first, then table properties, then the table
/// comment, and within each group by column name or property key.
/// Differences that no `ALTER TABLE` can express are reported together
/// in one [`CatalogError::Irreconcilable`].
pub fn diff(
    desired: &TableSpecification,
    actual: &TableSpecification,
    policy: DiffPolicy,
) -> CatalogResult<Vec<Statement>> {
    let table = actual.identifier()?;
    let mut reasons = vec![];

    if desired.name() != actual.name() {
        reasons.push(format!(
            "name differs: desired {:?}, actual {:?}",
            desired.name(),
            actual.name()
        ));
    }
    if desired.location() != actual.location() {
        reasons.push(format!(
            "location differs: desired {:?}, actual {:?}",
            desired.location(),
            actual.location()
        ));
    }
    if desired.format() != actual.format() {
        reasons.push(format!(
            "format differs: desired {}, actual {}",
            desired.format(),
            actual.format()
        ));
    }
    if desired.partitioned_by() != actual.partitioned_by() {
        reasons.push(format!(
            "partitioning differs: desired [{}], actual [{}]",
            desired.partitioned_by().join(", "),
            actual.partitioned_by().join(", ")
        ));
    }

    let schema_actions = diff_schema(desired, actual, policy, &mut reasons);
    let property_actions = diff_properties(desired, actual, policy, &mut reasons);

    if !reasons.is_empty() {
        return Err(CatalogError::irreconcilable(table, reasons));
    }

    let mut actions = schema_actions;
    actions.extend(property_actions);
    if desired.comment() != actual.comment() {
        actions.push(AlterTableAction::SetComment(
            desired.comment().unwrap_or_default().to_string(),
        ));
    }
    Ok(actions
        .into_iter()
        .map(|action| Statement::AlterTable {
            table: table.clone(),
            action,
        })
        .collect())
}

fn diff_schema(
    desired: &TableSpecification,
    actual: &TableSpecification,
    policy: DiffPolicy,
    reasons: &mut Vec<String>,
) -> Vec<AlterTableAction> {
    for (side, spec) in [("desired", desired), ("actual", actual)] {
        for entry in unsupported_metadata(spec.schema()) {
            warn!(
                "{side} column {} has metadata {} that cannot be altered",
                entry.path, entry.key
            );
        }
    }
    let desired_schema = normalize_schema(desired.schema());
    let actual_schema = normalize_schema(actual.schema());
    let mut actions: Vec<(String, AlterTableAction)> = vec![];

    for field in desired_schema.fields.iter() {
        match actual_schema.field(&field.name) {
            None => actions.push((
                field.name.clone(),
                AlterTableAction::AddColumn(field.as_ref().clone()),
            )),
            Some(existing) if existing.data_type != field.data_type => reasons.push(format!(
                "column {} changes type from {} to {}",
                field.name, existing.data_type, field.data_type
            )),
            Some(existing) => {
                for action in diff_column(field, existing) {
                    actions.push((field.name.clone(), action));
                }
                if field.metadata != existing.metadata {
                    debug!("column {} differs in metadata beyond comment and default", field.name);
                }
            }
        }
    }
    for field in actual_schema.fields.iter() {
        if desired_schema.field(&field.name).is_some() {
            continue;
        }
        if policy.allow_drop_columns {
            actions.push((
                field.name.clone(),
                AlterTableAction::DropColumn(field.name.clone()),
            ));
        } else {
            warn!(
                "column {} exists in the table but not in the specification, and dropping columns is not allowed",
                field.name
            );
        }
    }

    actions.sort_by(|(a_name, a), (b_name, b)| {
        a_name
            .cmp(b_name)
            .then_with(|| schema_action_rank(a).cmp(&schema_action_rank(b)))
    });
    actions.into_iter().map(|(_, action)| action).collect()
}

fn diff_column(desired: &Field, actual: &Field) -> Vec<AlterTableAction> {
    let mut actions = vec![];
    if desired.comment() != actual.comment() {
        actions.push(AlterTableAction::AlterColumnComment {
            column: desired.name.clone(),
            comment: desired.comment().unwrap_or_default().to_string(),
        });
    }
    match (desired.default_expression(), actual.default_expression()) {
        (Some(d), a) if Some(d) != a => actions.push(AlterTableAction::AlterColumnSetDefault {
            column: desired.name.clone(),
            expression: d.to_string(),
        }),
        (None, Some(_)) => actions.push(AlterTableAction::AlterColumnDropDefault {
            column: desired.name.clone(),
        }),
        _ => {}
    }
    actions
}

fn compare_versions(desired: &str, actual: &str) -> Option<Ordering> {
    let desired = desired.trim().parse::<u32>().ok()?;
    let actual = actual.trim().parse::<u32>().ok()?;
    Some(desired.cmp(&actual))
}

fn diff_properties(
    desired: &TableSpecification,
    actual: &TableSpecification,
    policy: DiffPolicy,
    reasons: &mut Vec<String>,
) -> Vec<AlterTableAction> {
    let desired_properties = desired.tblproperties();
    let actual_properties = actual.tblproperties();
    let mut actions: Vec<(String, AlterTableAction)> = vec![];

    for (key, value) in desired_properties {
        let existing = actual_properties.get(key);
        if existing == Some(value) {
            continue;
        }
        let protocol = WellKnownProperty::from_key(key).is_some_and(|p| p.is_protocol_version());
        if let (true, Some(existing)) = (protocol, existing) {
            match compare_versions(value, existing) {
                Some(Ordering::Less) => {
                    reasons.push(format!(
                        "table property {key} cannot be lowered from {existing} to {value}"
                    ));
                    continue;
                }
                Some(Ordering::Equal) => continue,
                _ => {}
            }
        }
        actions.push((
            key.clone(),
            AlterTableAction::SetProperty {
                key: key.clone(),
                value: value.clone(),
            },
        ));
    }
    for key in actual_properties.keys() {
        if desired_properties.contains_key(key) {
            continue;
        }
        if WellKnownProperty::from_key(key).is_some_and(|p| p.is_protocol_version()) {
            continue;
        }
        if policy.allow_unset_properties {
            actions.push((
                key.clone(),
                AlterTableAction::UnsetProperty { key: key.clone() },
            ));
        } else {
            debug!("keeping table property {key} that is not in the specification");
        }
    }

    actions.sort_by(|(a, _), (b, _)| a.cmp(b));
    actions.into_iter().map(|(_, action)| action).collect()
}

/// Reads the live table and diffs the specification against it.
/// Returns `None` when the table does not exist yet.
pub fn diff_with_store(
    desired: &TableSpecification,
    store: &dyn TableStore,
    policy: DiffPolicy,
) -> CatalogResult<Option<Vec<Statement>>> {
    let identifier = desired.identifier()?;
    if !store.table_exists(&identifier)? {
        return Ok(None);
    }
    let actual = TableSpecification::from_store(store, &identifier, desired.config())?;
    diff(desired, &actual, policy).map(Some)
}
