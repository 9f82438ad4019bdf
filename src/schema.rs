//! Schema and value model consumed by [`crate::record`] and the B+Tree.
//!
//! Out of scope per the spec (an external collaborator: "schema model" and
//! "value model" are both named as interfaces the core consumes, not things
//! it owns) — kept intentionally thin. Column order, nullability, and
//! primitive types all come from here.

use std::cmp::Ordering;
use std::fmt;

/// A primitive column type. Widths are fixed except `Varchar`, whose `usize`
/// is the declared maximum length (used only for validation, not for the
/// on-disk width, since varlen columns are length-prefixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    BigInt,
    Boolean,
    DateTime,
    Decimal,
    Varchar(usize),
}

impl ColumnType {
    /// Fixed on-disk width in bytes, or `None` for varlen types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ColumnType::Int => Some(4),
            ColumnType::BigInt => Some(8),
            ColumnType::Boolean => Some(1),
            ColumnType::DateTime => Some(8),
            // 16-byte scaled integer: see SPEC_FULL.md Open Question C.2.
            ColumnType::Decimal => Some(16),
            ColumnType::Varchar(_) => None,
        }
    }

    pub fn is_fixed_width(&self) -> bool {
        self.fixed_width().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// Table schema: declared column order plus which column(s) form the
/// primary key, in the order they compose the key.
#[derive(Debug, Clone)]
pub struct Schema {
    pub columns: Vec<Column>,
    pub primary_key: Vec<usize>,
}

impl Schema {
    pub fn new(columns: Vec<Column>, primary_key: Vec<usize>) -> Self {
        assert!(!primary_key.is_empty(), "schema must declare a primary key");
        for &idx in &primary_key {
            assert!(idx < columns.len(), "primary key column index out of range");
            assert!(
                !columns[idx].nullable,
                "primary key column {:?} must be NOT NULL",
                columns[idx].name
            );
        }
        Self {
            columns,
            primary_key,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn key_of(&self, values: &[Value]) -> Key {
        Key(self.primary_key.iter().map(|&i| values[i].clone()).collect())
    }

    /// A schema over just the primary-key columns, in key order, for
    /// encoding/decoding a [`Key`] with [`crate::record::RecordSerializer`]
    /// the same way a full row is encoded.
    pub fn key_schema(&self) -> Schema {
        let columns = self
            .primary_key
            .iter()
            .map(|&i| self.columns[i].clone())
            .collect();
        Schema {
            columns,
            primary_key: (0..self.primary_key.len()).collect(),
        }
    }
}

/// A typed scalar value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i32),
    BigInt(i64),
    Boolean(bool),
    /// Implementation-defined "binary" form; i64 here is the round-trip
    /// representation the spec leaves open (see spec.md §4.1).
    DateTime(i64),
    /// 16-byte scaled integer: mantissa in `i128`, scale carried by the
    /// schema/application layer, not on the wire.
    Decimal(i128),
    Varchar(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Int(a), Int(b)) => a.cmp(b),
            (BigInt(a), BigInt(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Decimal(a), Decimal(b)) => a.cmp(b),
            (Varchar(a), Varchar(b)) => a.cmp(b),
            // Columns within one key are homogeneously typed; cross-variant
            // comparison only happens if a caller mixes schemas, which is a
            // programming error we still resolve deterministically.
            _ => self.discriminant().cmp(&other.discriminant()),
        }
    }
}

impl Value {
    fn discriminant(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) => 1,
            Value::BigInt(_) => 2,
            Value::Boolean(_) => 3,
            Value::DateTime(_) => 4,
            Value::Decimal(_) => 5,
            Value::Varchar(_) => 6,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Varchar(v) => write!(f, "{v:?}"),
        }
    }
}

/// An ordered tuple of typed values forming a primary key, total-ordered by
/// column-wise comparison in primary-key-declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key(pub Vec<Value>);

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// An ordered sequence of typed values matching the table's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn key(&self, schema: &Schema) -> Key {
        schema.key_of(&self.values)
    }
}
