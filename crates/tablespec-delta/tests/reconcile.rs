#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use tablespec_catalog::diff::{diff, diff_with_store, DiffPolicy};
use tablespec_catalog::error::CatalogError;
use tablespec_catalog::provider::{ResolvedDetails, Resolver, SchemaDefinition, TableStore};
use tablespec_catalog::table_spec::{TableSpecParts, TableSpecification};
use tablespec_catalog_memory::{MemoryResolver, MemoryTableStore};
use tablespec_common::config::{AppConfig, SpecConfig};
use tablespec_common::spec::parse_schema;

fn config() -> SpecConfig {
    AppConfig::from_defaults().unwrap().spec
}

fn orders(schema: &str) -> TableSpecification {
    TableSpecification::try_new(
        TableSpecParts {
            name: Some("sales.orders".to_string()),
            schema: parse_schema(schema).unwrap(),
            partitioned_by: vec!["region".to_string()],
            location: Some("/mnt/sales/orders".to_string()),
            comment: Some("all orders".to_string()),
            tblproperties: BTreeMap::from([("owner".to_string(), "finance".to_string())]),
            ..Default::default()
        },
        &config(),
    )
    .unwrap()
    .with_good_defaults()
    .unwrap()
}

fn store_with_database() -> MemoryTableStore {
    let store = MemoryTableStore::new();
    let database = tablespec_catalog::database_spec::DatabaseSpecification::try_new(
        "sales",
        None,
        None,
        BTreeMap::new(),
        &config(),
    )
    .unwrap();
    store.execute(&database.to_create_statement()).unwrap();
    store
}

#[test]
fn test_create_statement_round_trip() {
    let store = store_with_database();
    let spec = orders("id bigint NOT NULL COMMENT 'order id', region string, amount decimal(12,2)");
    store.execute(&spec.to_create_statement().unwrap()).unwrap();
    let actual = TableSpecification::from_store(&store, "sales.orders", &config()).unwrap();
    assert_eq!(actual, spec);
    assert_eq!(actual.partitioned_by(), ["region".to_string()]);
    assert_eq!(actual.location(), Some("dbfs:/mnt/sales/orders"));
}

#[test]
fn test_managed_table_round_trip() {
    let store = store_with_database();
    let spec = orders("id bigint, region string")
        .rebuild(|p| p.location = None)
        .unwrap();
    store.execute(&spec.to_create_statement().unwrap()).unwrap();
    let actual = TableSpecification::from_store(&store, "sales.orders", &config()).unwrap();
    assert_eq!(actual.location(), None);
    assert_eq!(actual, spec);
}

#[test]
fn test_diff_against_store_is_idempotent() {
    let store = store_with_database();
    let spec = orders("id bigint, region string");
    assert_eq!(
        diff_with_store(&spec, &store, DiffPolicy::default()).unwrap(),
        None
    );
    store.execute(&spec.to_create_statement().unwrap()).unwrap();
    assert_eq!(
        diff_with_store(&spec, &store, DiffPolicy::default()).unwrap(),
        Some(vec![])
    );
}

#[test]
fn test_applied_diff_converges() {
    let store = store_with_database();
    let deployed = orders("id bigint, region string, legacy string");
    store.execute(&deployed.to_create_statement().unwrap()).unwrap();

    let desired = orders("id bigint COMMENT 'order id', region string, zone string, amount double")
        .rebuild(|p| {
            p.tblproperties.insert("delta.appendOnly".to_string(), "false".to_string());
            p.tblproperties.remove("owner");
            p.comment = Some("orders by region".to_string());
        })
        .unwrap();
    let policy = DiffPolicy {
        allow_drop_columns: true,
        allow_unset_properties: true,
    };
    let statements = diff_with_store(&desired, &store, policy).unwrap().unwrap();
    let texts = statements.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert_eq!(
        texts,
        vec![
            "ALTER TABLE sales.orders ADD COLUMN amount double",
            "ALTER TABLE sales.orders ALTER COLUMN id COMMENT 'order id'",
            "ALTER TABLE sales.orders DROP COLUMN legacy",
            "ALTER TABLE sales.orders ADD COLUMN zone string",
            "ALTER TABLE sales.orders SET TBLPROPERTIES ('delta.appendOnly' = 'false')",
            "ALTER TABLE sales.orders UNSET TBLPROPERTIES ('owner')",
            "ALTER TABLE sales.orders SET COMMENT 'orders by region'",
        ]
    );
    for statement in &statements {
        store.execute(statement).unwrap();
    }
    assert_eq!(
        diff_with_store(&desired, &store, policy).unwrap(),
        Some(vec![])
    );
}

#[test]
fn test_partition_change_is_rejected() {
    let store = store_with_database();
    let deployed = orders("id bigint, region string");
    store.execute(&deployed.to_create_statement().unwrap()).unwrap();
    let desired = deployed
        .rebuild(|p| p.partitioned_by = vec!["id".to_string()])
        .unwrap();
    let result = diff_with_store(&desired, &store, DiffPolicy::default());
    assert!(matches!(result, Err(CatalogError::Irreconcilable { .. })));
}

#[test]
fn test_blanked_properties_never_resurface() {
    let store = store_with_database();
    let spec = orders("id bigint, region string");
    store.execute(&spec.to_create_statement().unwrap()).unwrap();
    store
        .execute(&tablespec_catalog::statement::Statement::AlterTable {
            table: "sales.orders".to_string(),
            action: tablespec_catalog::statement::AlterTableAction::SetProperty {
                key: "delta.columnMapping.maxColumnId".to_string(),
                value: "3".to_string(),
            },
        })
        .unwrap();
    let actual = TableSpecification::from_store(&store, "sales.orders", &config()).unwrap();
    assert!(!actual
        .tblproperties()
        .contains_key("delta.columnMapping.maxColumnId"));
    assert!(diff(&spec, &actual, DiffPolicy::default()).unwrap().is_empty());
}

#[test]
fn test_spec_from_resolver() {
    let resolver = MemoryResolver::new();
    resolver.set_value("ENV", "_dev");
    resolver.register(
        "Orders",
        ResolvedDetails {
            name: Some("Sales{ENV}.Orders".to_string()),
            path: Some("/mnt/sales{ENV}/orders".to_string()),
            schema: Some(SchemaDefinition::Sql("id bigint, region string".to_string())),
            partitioned_by: vec!["region".to_string()],
            ..Default::default()
        },
    );
    let spec = TableSpecification::from_id(&resolver, "Orders", &config()).unwrap();
    assert_eq!(spec.name(), Some("sales_dev.orders"));
    assert_eq!(spec.location(), Some("dbfs:/mnt/sales_dev/orders"));
    assert!(matches!(
        TableSpecification::from_id(&resolver, "Missing", &config()),
        Err(CatalogError::SpecNotFound(_))
    ));

    let template = TableSpecification::try_new(
        TableSpecParts {
            name: Some("sales{ENV}.orders".to_string()),
            schema: parse_schema("id bigint").unwrap(),
            location: Some("{Orders_path}_copy".to_string()),
            ..Default::default()
        },
        &config(),
    )
    .unwrap();
    assert_eq!(template.name(), Some("sales{ENV}.orders"));
    assert_eq!(template.data_identifier(&resolver).unwrap(), "sales_dev.orders");
    let substituted = template.fully_substituted(&resolver).unwrap();
    assert_eq!(substituted.name(), Some("sales_dev.orders"));
    assert_eq!(
        substituted.location(),
        Some("dbfs:/mnt/sales_dev/orders_copy")
    );
    let anonymous = template.fully_substituted_as(&resolver, None).unwrap();
    assert_eq!(
        anonymous.data_identifier(&resolver).unwrap(),
        "delta.`dbfs:/mnt/sales_dev/orders_copy`"
    );
    // the replacement name is kept as given
    let renamed = template
        .fully_substituted_as(&resolver, Some("archive{ENV}.orders".to_string()))
        .unwrap();
    assert_eq!(renamed.name(), Some("archive{ENV}.orders"));
    assert_eq!(
        renamed.location(),
        Some("dbfs:/mnt/sales_dev/orders_copy")
    );
    assert!(resolver.all_details().unwrap().contains_key("Orders_path"));
}
