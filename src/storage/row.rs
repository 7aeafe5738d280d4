//! Packs and unpacks tuples of [`ColumnValue`]s against a [`Schema`],
//! positionally — there is no per-column header on disk, so the
//! schema is the only thing that makes the bytes meaningful.

use crate::errors::{err, Error, Result};
use crate::storage::catalog::Schema;
use crate::storage::column::{ColumnType, ColumnValue};

pub fn serialize(schema: &Schema, values: &[ColumnValue]) -> Result<Vec<u8>> {
    if values.len() != schema.columns.len() {
        return Err(Error::ValueCountMismatch {
            expected: schema.columns.len(),
            got: values.len(),
        });
    }
    let mut out = vec![0u8; schema.row_size];
    let mut offset = 0;
    for (col, value) in schema.columns.iter().zip(values) {
        let width = col.col_type.fixed_size();
        let slot = &mut out[offset..offset + width];
        match (col.col_type, value) {
            (ColumnType::Int32, ColumnValue::Int32(v)) => {
                slot.copy_from_slice(&v.to_le_bytes());
            }
            (ColumnType::Text(_), ColumnValue::Text(bytes)) => {
                let len = bytes.len().min(width.saturating_sub(1));
                slot[..len].copy_from_slice(&bytes[..len]);
                slot[len] = 0; // always NUL-terminated within its slot
            }
            _ => {
                return Err(err!(
                    Codec,
                    "column {} expects {} but got a different value type",
                    col.name,
                    col.col_type
                ))
            }
        }
        offset += width;
    }
    Ok(out)
}

pub fn deserialize(schema: &Schema, src: &[u8]) -> Result<Vec<ColumnValue>> {
    if src.len() != schema.row_size {
        return Err(err!(
            Codec,
            "row buffer length {} does not match schema row_size {}",
            src.len(),
            schema.row_size
        ));
    }
    let mut values = Vec::with_capacity(schema.columns.len());
    let mut offset = 0;
    for col in schema.columns.iter() {
        let width = col.col_type.fixed_size();
        let slot = &src[offset..offset + width];
        let value = match col.col_type {
            ColumnType::Int32 => ColumnValue::Int32(i32::from_le_bytes(slot.try_into().unwrap())),
            ColumnType::Text(_) => {
                let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
                ColumnValue::Text(slot[..end].to_vec())
            }
        };
        values.push(value);
        offset += width;
    }
    Ok(values)
}
