use std::collections::HashMap;
use std::sync::Arc;

use datafusion::arrow::datatypes as adt;

use crate::error::{CommonError, CommonResult};
use crate::spec::data_type::{DataType, Field, Fields, Schema};

const ARROW_LIST_FIELD_NAME: &str = "element";
const ARROW_MAP_ENTRIES_FIELD_NAME: &str = "entries";
const ARROW_MAP_KEY_FIELD_NAME: &str = "key";
const ARROW_MAP_VALUE_FIELD_NAME: &str = "value";
const ARROW_TIMESTAMP_TIME_ZONE: &str = "UTC";

impl DataType {
    pub fn to_arrow(&self) -> adt::DataType {
        match self {
            DataType::Null => adt::DataType::Null,
            DataType::Boolean => adt::DataType::Boolean,
            DataType::Byte => adt::DataType::Int8,
            DataType::Short => adt::DataType::Int16,
            DataType::Integer => adt::DataType::Int32,
            DataType::Long => adt::DataType::Int64,
            DataType::Float => adt::DataType::Float32,
            DataType::Double => adt::DataType::Float64,
            DataType::Decimal { precision, scale } => adt::DataType::Decimal128(*precision, *scale),
            DataType::String => adt::DataType::Utf8,
            DataType::Binary => adt::DataType::Binary,
            DataType::Date => adt::DataType::Date32,
            DataType::Timestamp => adt::DataType::Timestamp(
                adt::TimeUnit::Microsecond,
                Some(ARROW_TIMESTAMP_TIME_ZONE.into()),
            ),
            DataType::TimestampNtz => adt::DataType::Timestamp(adt::TimeUnit::Microsecond, None),
            DataType::Array {
                element_type,
                contains_null,
            } => adt::DataType::List(Arc::new(adt::Field::new(
                ARROW_LIST_FIELD_NAME,
                element_type.to_arrow(),
                *contains_null,
            ))),
            DataType::Map {
                key_type,
                value_type,
                value_contains_null,
            } => {
                let entries = adt::Field::new(
                    ARROW_MAP_ENTRIES_FIELD_NAME,
                    adt::DataType::Struct(adt::Fields::from(vec![
                        adt::Field::new(ARROW_MAP_KEY_FIELD_NAME, key_type.to_arrow(), false),
                        adt::Field::new(
                            ARROW_MAP_VALUE_FIELD_NAME,
                            value_type.to_arrow(),
                            *value_contains_null,
                        ),
                    ])),
                    false,
                );
                adt::DataType::Map(Arc::new(entries), false)
            }
            DataType::Struct { fields } => adt::DataType::Struct(
                fields
                    .iter()
                    .map(|f| f.to_arrow())
                    .collect::<Vec<_>>()
                    .into(),
            ),
        }
    }
}

impl TryFrom<&adt::DataType> for DataType {
    type Error = CommonError;

    fn try_from(data_type: &adt::DataType) -> CommonResult<Self> {
        match data_type {
            adt::DataType::Null => Ok(DataType::Null),
            adt::DataType::Boolean => Ok(DataType::Boolean),
            adt::DataType::Int8 => Ok(DataType::Byte),
            adt::DataType::Int16 | adt::DataType::UInt8 => Ok(DataType::Short),
            adt::DataType::Int32 | adt::DataType::UInt16 => Ok(DataType::Integer),
            adt::DataType::Int64 | adt::DataType::UInt32 => Ok(DataType::Long),
            adt::DataType::UInt64 => Ok(DataType::Decimal {
                precision: 20,
                scale: 0,
            }),
            adt::DataType::Float16 | adt::DataType::Float32 => Ok(DataType::Float),
            adt::DataType::Float64 => Ok(DataType::Double),
            adt::DataType::Decimal128(precision, scale)
            | adt::DataType::Decimal256(precision, scale) => Ok(DataType::Decimal {
                precision: *precision,
                scale: *scale,
            }),
            adt::DataType::Utf8 | adt::DataType::LargeUtf8 | adt::DataType::Utf8View => {
                Ok(DataType::String)
            }
            adt::DataType::Binary
            | adt::DataType::LargeBinary
            | adt::DataType::BinaryView
            | adt::DataType::FixedSizeBinary(_) => Ok(DataType::Binary),
            adt::DataType::Date32 | adt::DataType::Date64 => Ok(DataType::Date),
            adt::DataType::Timestamp(_, Some(_)) => Ok(DataType::Timestamp),
            adt::DataType::Timestamp(_, None) => Ok(DataType::TimestampNtz),
            adt::DataType::List(field)
            | adt::DataType::LargeList(field)
            | adt::DataType::FixedSizeList(field, _) => Ok(DataType::Array {
                element_type: Box::new(DataType::try_from(field.data_type())?),
                contains_null: field.is_nullable(),
            }),
            adt::DataType::Map(entries, _) => match entries.data_type() {
                adt::DataType::Struct(fields) if fields.len() == 2 => Ok(DataType::Map {
                    key_type: Box::new(DataType::try_from(fields[0].data_type())?),
                    value_type: Box::new(DataType::try_from(fields[1].data_type())?),
                    value_contains_null: fields[1].is_nullable(),
                }),
                _ => Err(CommonError::invalid(
                    "map type must have key and value fields",
                )),
            },
            adt::DataType::Struct(fields) => Ok(DataType::Struct {
                fields: fields
                    .iter()
                    .map(|f| Field::try_from(f.as_ref()))
                    .collect::<CommonResult<Vec<_>>>()?
                    .into(),
            }),
            adt::DataType::Dictionary(_, value_type) => DataType::try_from(value_type.as_ref()),
            other => Err(CommonError::unsupported(format!(
                "arrow data type {other:?} has no table column equivalent"
            ))),
        }
    }
}

impl Field {
    pub fn to_arrow(&self) -> adt::Field {
        let metadata: HashMap<String, String> = self.metadata.iter().cloned().collect();
        adt::Field::new(&self.name, self.data_type.to_arrow(), self.nullable).with_metadata(metadata)
    }
}

impl TryFrom<&adt::Field> for Field {
    type Error = CommonError;

    fn try_from(field: &adt::Field) -> CommonResult<Self> {
        let mut metadata: Vec<(String, String)> = field
            .metadata()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        metadata.sort();
        Ok(Field {
            name: field.name().clone(),
            data_type: DataType::try_from(field.data_type())?,
            nullable: field.is_nullable(),
            metadata,
        })
    }
}

impl Schema {
    pub fn to_arrow(&self) -> adt::Schema {
        adt::Schema::new(self.fields.iter().map(|f| f.to_arrow()).collect::<Vec<_>>())
    }
}

impl TryFrom<&adt::Schema> for Schema {
    type Error = CommonError;

    fn try_from(schema: &adt::Schema) -> CommonResult<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| Field::try_from(f.as_ref()))
            .collect::<CommonResult<Vec<_>>>()?;
        Ok(Schema {
            fields: Fields::from(fields),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_arrow_roundtrip() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Long, false),
            Field::new("price", DataType::Decimal { precision: 12, scale: 2 }, true)
                .with_comment("unit price"),
            Field::new("seen", DataType::Timestamp, true),
            Field::new("tags", DataType::array(DataType::String), true),
            Field::new(
                "attributes",
                DataType::map(DataType::String, DataType::Integer),
                true,
            ),
            Field::new(
                "address",
                DataType::struct_of(vec![Field::new("city", DataType::String, true)]),
                true,
            ),
        ]);
        let arrow = schema.to_arrow();
        assert_eq!(
            arrow.field_with_name("id").unwrap().data_type(),
            &adt::DataType::Int64
        );
        assert_eq!(
            arrow
                .field_with_name("price")
                .unwrap()
                .metadata()
                .get("comment"),
            Some(&"unit price".to_string())
        );
        assert_eq!(Schema::try_from(&arrow).unwrap(), schema);
    }

    #[test]
    fn test_arrow_lenient_types() {
        assert_eq!(
            DataType::try_from(&adt::DataType::LargeUtf8).unwrap(),
            DataType::String
        );
        assert_eq!(
            DataType::try_from(&adt::DataType::Timestamp(adt::TimeUnit::Nanosecond, None))
                .unwrap(),
            DataType::TimestampNtz
        );
        assert!(DataType::try_from(&adt::DataType::Duration(adt::TimeUnit::Second)).is_err());
    }
}
