//! Record serialization: turns a [`Record`] into the bytes stored in a
//! slotted page's heap, and back. Layout per spec.md §4.2:
//!
//! ```text
//! [ null bitmap (ceil(n_cols/8) bytes) ]
//! [ fixed-width columns, in schema order, NULL columns contribute no bytes ]
//! [ varlen columns, in schema order: u32 length prefix + bytes each, NULL
//!   columns contribute no bytes (not even a length prefix) ]
//! ```
//!
//! A NULL column's position is recovered from the bitmap alone, not from its
//! payload: decode consults bit `i` before deciding whether to read (and
//! advance past) column `i`'s bytes at all.

use bit_vec::BitVec;

use crate::error::{StorageError, StorageResult};
use crate::schema::{ColumnType, Record, Schema, Value};

pub struct RecordSerializer;

impl RecordSerializer {
    fn bitmap_bytes(schema: &Schema) -> usize {
        (schema.column_count() + 7) / 8
    }

    pub fn encode(schema: &Schema, record: &Record) -> StorageResult<Vec<u8>> {
        assert_eq!(
            record.values.len(),
            schema.column_count(),
            "record arity must match schema"
        );

        let mut nulls = BitVec::from_elem(schema.column_count(), false);
        let mut fixed = Vec::new();
        let mut varlen = Vec::new();

        for (i, (column, value)) in schema.columns.iter().zip(&record.values).enumerate() {
            if value.is_null() {
                if !column.nullable {
                    return Err(StorageError::Corrupt(format!(
                        "column {:?} is NOT NULL but value is NULL",
                        column.name
                    )));
                }
                nulls.set(i, true);
                continue;
            }

            match column.column_type.fixed_width() {
                Some(width) => {
                    let bytes = Self::encode_fixed(&column.column_type, value, width)?;
                    fixed.extend_from_slice(&bytes);
                }
                None => {
                    let bytes = Self::encode_varlen(value)?;
                    varlen.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    varlen.extend_from_slice(&bytes);
                }
            }
        }

        let bitmap = nulls.to_bytes();
        debug_assert_eq!(bitmap.len(), Self::bitmap_bytes(schema));
        let mut out = Vec::with_capacity(bitmap.len() + fixed.len() + varlen.len());
        out.extend_from_slice(&bitmap);
        out.extend_from_slice(&fixed);
        out.extend_from_slice(&varlen);
        Ok(out)
    }

    fn encode_fixed(column_type: &ColumnType, value: &Value, width: usize) -> StorageResult<Vec<u8>> {
        let bytes = match (column_type, value) {
            (ColumnType::Int, Value::Int(v)) => v.to_le_bytes().to_vec(),
            (ColumnType::BigInt, Value::BigInt(v)) => v.to_le_bytes().to_vec(),
            (ColumnType::Boolean, Value::Boolean(v)) => vec![*v as u8],
            (ColumnType::DateTime, Value::DateTime(v)) => v.to_le_bytes().to_vec(),
            (ColumnType::Decimal, Value::Decimal(v)) => v.to_le_bytes().to_vec(),
            _ => {
                return Err(StorageError::Corrupt(format!(
                    "value {value:?} does not match column type {column_type:?}"
                )))
            }
        };
        debug_assert_eq!(bytes.len(), width);
        Ok(bytes)
    }

    fn encode_varlen(value: &Value) -> StorageResult<Vec<u8>> {
        match value {
            Value::Varchar(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(StorageError::Corrupt(format!(
                "value {value:?} is not a varlen type"
            ))),
        }
    }

    pub fn decode(schema: &Schema, bytes: &[u8]) -> StorageResult<Record> {
        let bitmap_len = Self::bitmap_bytes(schema);
        if bytes.len() < bitmap_len {
            return Err(StorageError::Corrupt(
                "record shorter than its null bitmap".into(),
            ));
        }
        let nulls = BitVec::from_bytes(&bytes[..bitmap_len]);
        let mut cursor = bitmap_len;
        let mut fixed_values = Vec::with_capacity(schema.column_count());

        for (i, column) in schema.columns.iter().enumerate() {
            if nulls[i] {
                continue;
            }
            if let Some(width) = column.column_type.fixed_width() {
                let end = cursor + width;
                let slice = bytes.get(cursor..end).ok_or_else(|| {
                    StorageError::Corrupt(format!("truncated fixed column {:?}", column.name))
                })?;
                fixed_values.push((i, Self::decode_fixed(&column.column_type, slice)?));
                cursor = end;
            }
        }

        let mut values = vec![Value::Null; schema.column_count()];
        for (i, value) in fixed_values {
            values[i] = value;
        }

        for (i, column) in schema.columns.iter().enumerate() {
            if column.column_type.fixed_width().is_some() {
                continue;
            }
            if nulls[i] {
                continue;
            }
            let len_end = cursor + 4;
            let len_bytes = bytes.get(cursor..len_end).ok_or_else(|| {
                StorageError::Corrupt(format!("truncated varlen length for {:?}", column.name))
            })?;
            let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
            cursor = len_end;
            let data_end = cursor + len;
            let data = bytes.get(cursor..data_end).ok_or_else(|| {
                StorageError::Corrupt(format!("truncated varlen data for {:?}", column.name))
            })?;
            cursor = data_end;
            values[i] = Value::Varchar(String::from_utf8_lossy(data).into_owned());
        }

        Ok(Record::new(values))
    }

    fn decode_fixed(column_type: &ColumnType, bytes: &[u8]) -> StorageResult<Value> {
        Ok(match column_type {
            ColumnType::Int => Value::Int(i32::from_le_bytes(bytes.try_into().unwrap())),
            ColumnType::BigInt => Value::BigInt(i64::from_le_bytes(bytes.try_into().unwrap())),
            ColumnType::Boolean => Value::Boolean(bytes[0] != 0),
            ColumnType::DateTime => Value::DateTime(i64::from_le_bytes(bytes.try_into().unwrap())),
            ColumnType::Decimal => Value::Decimal(i128::from_le_bytes(bytes.try_into().unwrap())),
            ColumnType::Varchar(_) => unreachable!("varchar is not fixed-width"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn schema() -> Schema {
        Schema::new(
            vec![
                Column::new("id", ColumnType::Int, false),
                Column::new("nickname", ColumnType::Varchar(64), true),
                Column::new("balance", ColumnType::Decimal, true),
            ],
            vec![0],
        )
    }

    #[test]
    fn round_trips_with_all_columns_present() {
        let schema = schema();
        let record = Record::new(vec![
            Value::Int(42),
            Value::Varchar("ferris".into()),
            Value::Decimal(12345),
        ]);
        let bytes = RecordSerializer::encode(&schema, &record).unwrap();
        let decoded = RecordSerializer::decode(&schema, &bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trips_with_nulls() {
        let schema = schema();
        let record = Record::new(vec![Value::Int(7), Value::Null, Value::Null]);
        let bytes = RecordSerializer::encode(&schema, &record).unwrap();
        let decoded = RecordSerializer::decode(&schema, &bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn null_columns_occupy_no_payload_bytes() {
        let schema = schema();
        let bitmap_len = RecordSerializer::bitmap_bytes(&schema);

        let all_null_but_id = Record::new(vec![Value::Int(1), Value::Null, Value::Null]);
        let bytes = RecordSerializer::encode(&schema, &all_null_but_id).unwrap();
        // Only the bitmap plus the one live fixed column (`id`, 4 bytes):
        // no zero-padding for `balance`, no length prefix for `nickname`.
        assert_eq!(bytes.len(), bitmap_len + 4);

        let all_present = Record::new(vec![
            Value::Int(1),
            Value::Varchar("x".into()),
            Value::Decimal(1),
        ]);
        let present_bytes = RecordSerializer::encode(&schema, &all_present).unwrap();
        assert!(bytes.len() < present_bytes.len());
    }

    #[test]
    fn rejects_null_in_not_null_column() {
        let schema = schema();
        let record = Record::new(vec![Value::Null, Value::Null, Value::Null]);
        assert!(RecordSerializer::encode(&schema, &record).is_err());
    }
}
