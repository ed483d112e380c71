use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Table column types as understood by the table store.
///
/// The set of types follows the Spark SQL type system, which is what Delta tables
/// persist in their schema. Nested types are expressed recursively so that
/// comparison and normalization are structural.
///
/// Reference: https://spark.apache.org/docs/3.5.3/sql-ref-datatypes.html#supported-data-types
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DataType {
    Null,
    Boolean,
    /// A signed 8-bit integer (`tinyint`).
    Byte,
    /// A signed 16-bit integer (`smallint`).
    Short,
    /// A signed 32-bit integer (`int`).
    Integer,
    /// A signed 64-bit integer (`bigint`).
    Long,
    Float,
    Double,
    Decimal {
        precision: u8,
        scale: i8,
    },
    String,
    Binary,
    Date,
    /// A timestamp with the session time zone.
    Timestamp,
    /// A timestamp without time zone.
    TimestampNtz,
    Array {
        element_type: Box<DataType>,
        contains_null: bool,
    },
    Map {
        key_type: Box<DataType>,
        value_type: Box<DataType>,
        value_contains_null: bool,
    },
    Struct {
        fields: Fields,
    },
}

impl DataType {
    pub fn array(element_type: DataType) -> Self {
        DataType::Array {
            element_type: Box::new(element_type),
            contains_null: true,
        }
    }

    pub fn map(key_type: DataType, value_type: DataType) -> Self {
        DataType::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
            value_contains_null: true,
        }
    }

    pub fn struct_of(fields: impl Into<Fields>) -> Self {
        DataType::Struct {
            fields: fields.into(),
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            DataType::Array { .. } | DataType::Map { .. } | DataType::Struct { .. }
        )
    }
}

/// Well-known per-field metadata keys reported by the table store.
pub struct FieldMetadataKey;

impl FieldMetadataKey {
    pub const COMMENT: &'static str = "comment";
    /// The default expression exactly as written in the column definition.
    pub const CURRENT_DEFAULT: &'static str = "CURRENT_DEFAULT";
    /// The value the default expression evaluated to when the column was added.
    pub const EXISTS_DEFAULT: &'static str = "EXISTS_DEFAULT";
    /// A canonicalized form of the default expression.
    pub const DEFAULT: &'static str = "default";
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub metadata: Vec<(String, String)>,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            metadata: vec![],
        }
    }

    /// Sets a metadata entry, replacing an existing entry with the same key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.metadata.push((key, value)),
        }
        self
    }

    pub fn with_comment(self, comment: impl Into<String>) -> Self {
        self.with_metadata(FieldMetadataKey::COMMENT, comment)
    }

    pub fn with_default(self, expression: impl Into<String>) -> Self {
        self.with_metadata(FieldMetadataKey::CURRENT_DEFAULT, expression)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn comment(&self) -> Option<&str> {
        self.metadata_value(FieldMetadataKey::COMMENT)
    }

    pub fn default_expression(&self) -> Option<&str> {
        self.metadata_value(FieldMetadataKey::CURRENT_DEFAULT)
    }
}

/// A reference counted [`Field`].
pub type FieldRef = Arc<Field>;

/// A cheaply cloneable, owned slice of [`FieldRef`].
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fields(Arc<[FieldRef]>);

impl Fields {
    pub fn empty() -> Self {
        Self(Arc::new([]))
    }

    pub fn find(&self, name: &str) -> Option<&FieldRef> {
        self.0.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.name.as_str()).collect()
    }
}

impl Default for Fields {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Field> for Fields {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        iter.into_iter().map(Arc::new).collect()
    }
}

impl FromIterator<FieldRef> for Fields {
    fn from_iter<T: IntoIterator<Item = FieldRef>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Field>> for Fields {
    fn from(fields: Vec<Field>) -> Self {
        fields.into_iter().collect()
    }
}

impl From<Vec<FieldRef>> for Fields {
    fn from(fields: Vec<FieldRef>) -> Self {
        Self(fields.into())
    }
}

impl Deref for Fields {
    type Target = [FieldRef];

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a FieldRef;
    type IntoIter = std::slice::Iter<'a, FieldRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Fields,
}

impl Schema {
    pub fn new(fields: impl Into<Fields>) -> Self {
        Self {
            fields: fields.into(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldRef> {
        self.fields.find(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.names()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Vec<Field>> for Schema {
    fn from(fields: Vec<Field>) -> Self {
        Schema::new(fields)
    }
}
