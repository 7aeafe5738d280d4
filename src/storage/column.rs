use std::fmt;

/// The only two column types a row may contain. `Text(size)` is the
/// declared width of the fixed slot, NUL-padded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int32,
    Text(u16),
}

impl ColumnType {
    pub fn fixed_size(&self) -> usize {
        match self {
            ColumnType::Int32 => 4,
            ColumnType::Text(size) => *size as usize,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int32 => write!(f, "INT32"),
            ColumnType::Text(size) => write!(f, "TEXT({})", size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Int32(i32),
    Text(Vec<u8>),
}

impl ColumnValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::Int32(_) => ColumnType::Int32,
            ColumnValue::Text(bytes) => ColumnType::Text(bytes.len() as u16),
        }
    }

    /// Interprets this value as the primary-key column: must be an
    /// `Int32` and must be positive.
    pub fn as_primary_key(&self) -> Option<u32> {
        match self {
            ColumnValue::Int32(v) if *v > 0 => Some(*v as u32),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Int32(v) => write!(f, "{}", v),
            ColumnValue::Text(bytes) => {
                let trimmed = bytes.split(|&b| b == 0).next().unwrap_or(&[]);
                write!(f, "{}", String::from_utf8_lossy(trimmed))
            }
        }
    }
}
