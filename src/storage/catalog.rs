//! Page 0: the fixed-capacity, fixed-layout table catalog.
//!
//! The catalog is encoded as plain fixed-width fields directly into
//! page 0's byte buffer (no `bincode` framing here — the point of a
//! catalog page is that its layout never changes shape), and mirrored
//! in a `heapless::Vec` of parsed [`Schema`] records for fast lookups
//! without re-parsing bytes on every access.

use heapless::Vec as HVec;

use crate::errors::{err, Error, Result};
use crate::pager::{Page, PAGE_SIZE};
use crate::storage::column::ColumnType;

pub const MAX_TABLES: usize = 10;
pub const MAX_COLUMNS: usize = 8;
pub const TABLE_NAME_LEN: usize = 32;
pub const COLUMN_NAME_LEN: usize = 32;

const COLUMN_RECORD_SIZE: usize = COLUMN_NAME_LEN + 1 + 4; // name + type tag + size
const SCHEMA_RECORD_SIZE: usize =
    TABLE_NAME_LEN + 4 + MAX_COLUMNS * COLUMN_RECORD_SIZE + 4 + 4 + 4 + 4 + 1;
const CATALOG_HEADER_SIZE: usize = 8; // num_tables + next_free_page

const _: () = assert!(CATALOG_HEADER_SIZE + MAX_TABLES * SCHEMA_RECORD_SIZE <= PAGE_SIZE);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub col_type: ColumnType,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub columns: HVec<Column, MAX_COLUMNS>,
    pub pk_column: Option<usize>,
    pub row_size: usize,
    pub root_page_num: u32,
    pub next_rowid: u32,
}

impl Schema {
    fn encode(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), SCHEMA_RECORD_SIZE);
        let mut off = 0;
        write_str(&mut out[off..off + TABLE_NAME_LEN], &self.name);
        off += TABLE_NAME_LEN;
        out[off..off + 4].copy_from_slice(&(self.columns.len() as u32).to_ne_bytes());
        off += 4;
        for i in 0..MAX_COLUMNS {
            let rec = &mut out[off..off + COLUMN_RECORD_SIZE];
            if let Some(col) = self.columns.get(i) {
                write_str(&mut rec[0..COLUMN_NAME_LEN], &col.name);
                match col.col_type {
                    ColumnType::Int32 => {
                        rec[COLUMN_NAME_LEN] = 0;
                        rec[COLUMN_NAME_LEN + 1..COLUMN_NAME_LEN + 5].copy_from_slice(&0u32.to_ne_bytes());
                    }
                    ColumnType::Text(size) => {
                        rec[COLUMN_NAME_LEN] = 1;
                        rec[COLUMN_NAME_LEN + 1..COLUMN_NAME_LEN + 5]
                            .copy_from_slice(&(size as u32).to_ne_bytes());
                    }
                }
            } else {
                rec.fill(0);
            }
            off += COLUMN_RECORD_SIZE;
        }
        let pk = self.pk_column.map(|i| i as i32).unwrap_or(-1);
        out[off..off + 4].copy_from_slice(&pk.to_ne_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&(self.row_size as u32).to_ne_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.root_page_num.to_ne_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.next_rowid.to_ne_bytes());
        off += 4;
        out[off] = 1; // in_use
    }

    fn decode(buf: &[u8]) -> Result<Option<Schema>> {
        debug_assert_eq!(buf.len(), SCHEMA_RECORD_SIZE);
        if buf[SCHEMA_RECORD_SIZE - 1] == 0 {
            return Ok(None);
        }
        let mut off = 0;
        let name = read_str(&buf[off..off + TABLE_NAME_LEN]);
        off += TABLE_NAME_LEN;
        let num_columns = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let mut columns = HVec::new();
        for i in 0..MAX_COLUMNS {
            let rec = &buf[off..off + COLUMN_RECORD_SIZE];
            if i < num_columns {
                let cname = read_str(&rec[0..COLUMN_NAME_LEN]);
                let tag = rec[COLUMN_NAME_LEN];
                let size = u32::from_ne_bytes(
                    rec[COLUMN_NAME_LEN + 1..COLUMN_NAME_LEN + 5].try_into().unwrap(),
                );
                let col_type = match tag {
                    0 => ColumnType::Int32,
                    1 => ColumnType::Text(size as u16),
                    other => return Err(err!(Codec, "invalid column type tag: {}", other)),
                };
                columns
                    .push(Column { name: cname, col_type })
                    .map_err(|_| err!(Codec, "catalog record names more columns than MAX_COLUMNS"))?;
            }
            off += COLUMN_RECORD_SIZE;
        }
        let pk_raw = i32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let row_size = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let root_page_num = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let next_rowid = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());

        Ok(Some(Schema {
            name,
            columns,
            pk_column: if pk_raw >= 0 { Some(pk_raw as usize) } else { None },
            row_size,
            root_page_num,
            next_rowid,
        }))
    }
}

fn write_str(dest: &mut [u8], s: &str) {
    dest.fill(0);
    let bytes = s.as_bytes();
    let len = bytes.len().min(dest.len() - 1);
    dest[..len].copy_from_slice(&bytes[..len]);
}

fn read_str(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

/// In-memory view of page 0, synced back to the page buffer on every
/// mutation so `Pager::flush`/`close` persists it without extra work.
pub struct Catalog {
    tables: HVec<Schema, MAX_TABLES>,
    pub next_free_page: u32,
}

impl Catalog {
    pub fn empty() -> Self {
        Catalog {
            tables: HVec::new(),
            next_free_page: 1,
        }
    }

    pub fn load(page: &Page) -> Result<Self> {
        let num_tables = u32::from_ne_bytes(page[0..4].try_into().unwrap()) as usize;
        let next_free_page = u32::from_ne_bytes(page[4..8].try_into().unwrap());
        let mut tables = HVec::new();
        for i in 0..MAX_TABLES {
            let off = CATALOG_HEADER_SIZE + i * SCHEMA_RECORD_SIZE;
            if let Some(schema) = Schema::decode(&page[off..off + SCHEMA_RECORD_SIZE])? {
                tables
                    .push(schema)
                    .map_err(|_| err!(Codec, "catalog page names more tables than MAX_TABLES"))?;
            }
        }
        if tables.len() != num_tables {
            tracing::warn!(
                recorded = num_tables,
                found = tables.len(),
                "catalog table count header disagrees with in-use slots"
            );
        }
        Ok(Catalog {
            tables,
            next_free_page: if next_free_page == 0 { 1 } else { next_free_page },
        })
    }

    pub fn save(&self, page: &mut Page) {
        page[0..4].copy_from_slice(&(self.tables.len() as u32).to_ne_bytes());
        page[4..8].copy_from_slice(&self.next_free_page.to_ne_bytes());
        for i in 0..MAX_TABLES {
            let off = CATALOG_HEADER_SIZE + i * SCHEMA_RECORD_SIZE;
            let rec = &mut page[off..off + SCHEMA_RECORD_SIZE];
            if let Some(schema) = self.tables.get(i) {
                schema.encode(rec);
            } else {
                rec.fill(0);
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<&Schema> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Schema> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn list(&self) -> impl Iterator<Item = &Schema> {
        self.tables.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    pub fn is_full(&self) -> bool {
        self.tables.len() >= MAX_TABLES
    }

    /// Registers a new table whose root page has already been
    /// allocated and initialized as an empty leaf.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: HVec<Column, MAX_COLUMNS>,
        root_page_num: u32,
    ) -> Result<()> {
        if self.contains(name) {
            return Err(Error::TableExists(name.to_string()));
        }
        if self.tables.len() >= MAX_TABLES {
            return Err(Error::TableCatalogFull);
        }
        let row_size: usize = columns.iter().map(|c| c.col_type.fixed_size()).sum();
        let schema = Schema {
            name: name.to_string(),
            columns,
            pk_column: None,
            row_size,
            root_page_num,
            next_rowid: 1,
        };
        self.tables
            .push(schema)
            .map_err(|_| Error::TableCatalogFull)?;
        tracing::info!(table = name, root_page_num, "created table");
        Ok(())
    }

    /// Explicitly marks `pk_column` (validating it is the sole,
    /// positive-valued `Int32` column) after a table has been created.
    pub fn set_primary_key(&mut self, table: &str, column_index: usize) -> Result<()> {
        let schema = self.get_mut(table)?;
        if schema.pk_column.is_some() {
            return Err(err!(
                SchemaConstraint,
                "table {} already has a primary key",
                table
            ));
        }
        let col = schema
            .columns
            .get(column_index)
            .ok_or(Error::ColumnOutOfBounds(column_index))?;
        if col.col_type != ColumnType::Int32 {
            return Err(err!(
                SchemaConstraint,
                "primary key column {} must be int32",
                col.name
            ));
        }
        schema.pk_column = Some(column_index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_columns() -> HVec<Column, MAX_COLUMNS> {
        let mut cols = HVec::new();
        cols.push(Column {
            name: "id".into(),
            col_type: ColumnType::Int32,
        })
        .unwrap();
        cols.push(Column {
            name: "name".into(),
            col_type: ColumnType::Text(16),
        })
        .unwrap();
        cols
    }

    #[test]
    fn round_trips_through_page_bytes() {
        let mut catalog = Catalog::empty();
        catalog.create_table("users", users_columns(), 1).unwrap();
        catalog.set_primary_key("users", 0).unwrap();

        let mut page = [0u8; PAGE_SIZE];
        catalog.save(&mut page);
        let reloaded = Catalog::load(&page).unwrap();

        let schema = reloaded.get("users").unwrap();
        assert_eq!(schema.row_size, 20);
        assert_eq!(schema.pk_column, Some(0));
        assert_eq!(schema.root_page_num, 1);
        assert_eq!(schema.columns.len(), 2);
    }

    #[test]
    fn duplicate_table_name_rejected() {
        let mut catalog = Catalog::empty();
        catalog.create_table("users", users_columns(), 1).unwrap();
        let err = catalog.create_table("users", users_columns(), 2).unwrap_err();
        assert!(matches!(err, Error::TableExists(_)));
    }

    #[test]
    fn catalog_full_past_max_tables() {
        let mut catalog = Catalog::empty();
        for i in 0..MAX_TABLES {
            catalog
                .create_table(&format!("t{}", i), users_columns(), i as u32)
                .unwrap();
        }
        let err = catalog
            .create_table("overflow", users_columns(), 99)
            .unwrap_err();
        assert!(matches!(err, Error::TableCatalogFull));
    }
}
