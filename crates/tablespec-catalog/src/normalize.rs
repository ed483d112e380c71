use tablespec_common::spec::{DataType, Field, FieldMetadataKey, Schema};

/// Brings a schema into the canonical form used for comparison.
///
/// All fields, array elements and map values become nullable.
/// Blank comments are removed. Of the default value facets only the
/// current default expression is kept. The remaining metadata is sorted by key.
pub fn normalize_schema(schema: &Schema) -> Schema {
    Schema::new(
        schema
            .fields
            .iter()
            .map(|f| normalize_field(f))
            .collect::<Vec<_>>(),
    )
}

pub fn normalize_field(field: &Field) -> Field {
    let mut metadata = field
        .metadata
        .iter()
        .filter(|(key, value)| match key.as_str() {
            FieldMetadataKey::COMMENT => !value.trim().is_empty(),
            FieldMetadataKey::EXISTS_DEFAULT | FieldMetadataKey::DEFAULT => false,
            _ => true,
        })
        .cloned()
        .collect::<Vec<_>>();
    metadata.sort();
    metadata.dedup_by(|a, b| a.0 == b.0);
    Field {
        name: field.name.clone(),
        data_type: normalize_data_type(&field.data_type),
        nullable: true,
        metadata,
    }
}

pub fn normalize_data_type(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Array { element_type, .. } => DataType::Array {
            element_type: Box::new(normalize_data_type(element_type)),
            contains_null: true,
        },
        DataType::Map {
            key_type,
            value_type,
            ..
        } => DataType::Map {
            key_type: Box::new(normalize_data_type(key_type)),
            value_type: Box::new(normalize_data_type(value_type)),
            value_contains_null: true,
        },
        DataType::Struct { fields } => DataType::Struct {
            fields: fields.iter().map(|f| normalize_field(f)).collect(),
        },
        other => other.clone(),
    }
}

/// A metadata entry the differ cannot act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedMetadata {
    /// The dotted path of the field, e.g. `address.city`.
    pub path: String,
    pub key: String,
}

/// Lists the metadata keys that survive normalization but are neither
/// comments nor default expressions. Such entries are compared but never altered.
pub fn unsupported_metadata(schema: &Schema) -> Vec<UnsupportedMetadata> {
    let mut result = vec![];
    for field in schema.fields.iter() {
        collect_unsupported_metadata(field, "", &mut result);
    }
    result
}

fn collect_unsupported_metadata(field: &Field, prefix: &str, result: &mut Vec<UnsupportedMetadata>) {
    let path = if prefix.is_empty() {
        field.name.clone()
    } else {
        format!("{prefix}.{}", field.name)
    };
    for (key, _) in &normalize_field(field).metadata {
        if key != FieldMetadataKey::COMMENT && key != FieldMetadataKey::CURRENT_DEFAULT {
            result.push(UnsupportedMetadata {
                path: path.clone(),
                key: key.clone(),
            });
        }
    }
    collect_nested(&field.data_type, &path, result);
}

fn collect_nested(data_type: &DataType, path: &str, result: &mut Vec<UnsupportedMetadata>) {
    match data_type {
        DataType::Struct { fields } => {
            for f in fields.iter() {
                collect_unsupported_metadata(f, path, result);
            }
        }
        DataType::Array { element_type, .. } => collect_nested(element_type, path, result),
        DataType::Map {
            key_type,
            value_type,
            ..
        } => {
            collect_nested(key_type, path, result);
            collect_nested(value_type, path, result);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_nullability() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Long, false),
            Field::new(
                "tags",
                DataType::Array {
                    element_type: Box::new(DataType::String),
                    contains_null: false,
                },
                false,
            ),
            Field::new(
                "inner",
                DataType::struct_of(vec![Field::new(
                    "scores",
                    DataType::Map {
                        key_type: Box::new(DataType::String),
                        value_type: Box::new(DataType::Integer),
                        value_contains_null: false,
                    },
                    false,
                )]),
                false,
            ),
        ]);
        let expected = Schema::new(vec![
            Field::new("id", DataType::Long, true),
            Field::new("tags", DataType::array(DataType::String), true),
            Field::new(
                "inner",
                DataType::struct_of(vec![Field::new(
                    "scores",
                    DataType::map(DataType::String, DataType::Integer),
                    true,
                )]),
                true,
            ),
        ]);
        assert_eq!(normalize_schema(&schema), expected);
    }

    #[test]
    fn test_normalize_metadata() {
        let field = Field::new("c", DataType::String, true)
            .with_metadata("zeta", "1")
            .with_comment("   ")
            .with_metadata(FieldMetadataKey::EXISTS_DEFAULT, "'x'")
            .with_metadata(FieldMetadataKey::DEFAULT, "'x'")
            .with_default("'x'");
        let normalized = normalize_field(&field);
        assert_eq!(
            normalized.metadata,
            vec![
                ("CURRENT_DEFAULT".to_string(), "'x'".to_string()),
                ("zeta".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(normalized.comment(), None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let schema = Schema::new(vec![Field::new("c", DataType::String, false)
            .with_comment("kept")
            .with_metadata("delta.columnMapping.id", "3")]);
        let once = normalize_schema(&schema);
        assert_eq!(normalize_schema(&once), once);
    }

    #[test]
    fn test_unsupported_metadata() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::String, true).with_comment("fine"),
            Field::new(
                "b",
                DataType::struct_of(vec![Field::new("c", DataType::String, true)
                    .with_metadata("delta.columnMapping.id", "7")]),
                true,
            ),
        ]);
        assert_eq!(
            unsupported_metadata(&schema),
            vec![UnsupportedMetadata {
                path: "b.c".to_string(),
                key: "delta.columnMapping.id".to_string(),
            }]
        );
    }
}
