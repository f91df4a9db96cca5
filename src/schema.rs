//! Column schema declarations
//!
//! A `SchemaSpec` is the declared shape of a dataset: named, typed columns.
//! Stage plans chain these declarations at compile time; the executor checks
//! the real Arrow schema of every stage output against them at run time.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::fmt;
use std::sync::Arc;

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl ColumnSpec {
    /// Non-nullable column of `data_type`.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }

    /// Mark the column nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// UTF-8 string column.
    #[must_use]
    pub fn utf8(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Utf8)
    }

    /// List-of-strings column (ground truths, retrieved ids).
    #[must_use]
    pub fn string_list(name: impl Into<String>) -> Self {
        Self::new(name, list_of(DataType::Utf8))
    }

    /// List-of-float64 column (retrieval scores).
    #[must_use]
    pub fn float_list(name: impl Into<String>) -> Self {
        Self::new(name, list_of(DataType::Float64))
    }

    /// Float64 column.
    #[must_use]
    pub fn float64(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Float64)
    }

    /// UInt32 column.
    #[must_use]
    pub fn uint32(name: impl Into<String>) -> Self {
        Self::new(name, DataType::UInt32)
    }

    /// UInt64 column.
    #[must_use]
    pub fn uint64(name: impl Into<String>) -> Self {
        Self::new(name, DataType::UInt64)
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type.
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Whether nulls are allowed.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Same name and logically equal type (nested field names ignored).
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.name == other.name && self.data_type.equals_datatype(&other.data_type)
    }

    /// Arrow field for this column.
    #[must_use]
    pub fn to_field(&self) -> Field {
        Field::new(&self.name, self.data_type.clone(), self.nullable)
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data_type {
            DataType::List(inner) => write!(f, "{}: List({})", self.name, inner.data_type()),
            other => write!(f, "{}: {other}", self.name),
        }
    }
}

/// Arrow list type whose items are nullable `item` values.
#[must_use]
pub fn list_of(item: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", item, true)))
}

/// Declared set of columns, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaSpec {
    columns: Vec<ColumnSpec>,
}

impl SchemaSpec {
    /// Build from columns.
    #[must_use]
    pub const fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Read the declaration off an Arrow schema.
    #[must_use]
    pub fn from_arrow(schema: &Schema) -> Self {
        Self {
            columns: schema
                .fields()
                .iter()
                .map(|field| ColumnSpec {
                    name: field.name().clone(),
                    data_type: field.data_type().clone(),
                    nullable: field.is_nullable(),
                })
                .collect(),
        }
    }

    /// Arrow schema with the declared fields.
    #[must_use]
    pub fn to_arrow(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns.iter().map(ColumnSpec::to_field).collect::<Vec<_>>(),
        ))
    }

    /// Declared columns.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Column names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(ColumnSpec::name).collect()
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column with this name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Number of declared columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no column is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Required columns of `self` that `available` lacks or types differently.
    #[must_use]
    pub fn missing_from(&self, available: &Self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|required| {
                !available
                    .column(&required.name)
                    .is_some_and(|found| found.matches(required))
            })
            .map(ToString::to_string)
            .collect()
    }

    /// Whether `available` provides every column of `self`.
    #[must_use]
    pub fn is_satisfied_by(&self, available: &Self) -> bool {
        self.missing_from(available).is_empty()
    }

    /// Columns of `self` followed by those of `other`; `other` wins on name clashes.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut columns: Vec<ColumnSpec> = self
            .columns
            .iter()
            .map(|c| other.column(&c.name).unwrap_or(c).clone())
            .collect();
        for column in &other.columns {
            if !self.contains(&column.name) {
                columns.push(column.clone());
            }
        }
        Self { columns }
    }

    /// Same column set (names and types), ignoring order and nullability.
    #[must_use]
    pub fn same_columns(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_satisfied_by(other) && other.is_satisfied_by(self)
    }
}

impl fmt::Display for SchemaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.columns.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(", "))
    }
}
