//! Catalog capacity: creating more than `MAX_TABLES` tables fails with
//! `TableCatalogFull` rather than corrupting page 0.

use embedded_btree_db::storage::catalog::{Column, MAX_COLUMNS, MAX_TABLES};
use embedded_btree_db::{ColumnType, Database, Error};
use heapless::Vec as HVec;

fn columns() -> HVec<Column, MAX_COLUMNS> {
    let mut cols = HVec::new();
    cols.push(Column {
        name: "id".into(),
        col_type: ColumnType::Int32,
    })
    .unwrap();
    cols
}

#[test]
fn catalog_rejects_creation_past_max_tables() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path().join("catalog.db"), None).unwrap();

    for i in 0..MAX_TABLES {
        db.create_table(&format!("t{}", i), columns(), Some(0)).unwrap();
    }

    let err = db.create_table("overflow", columns(), Some(0)).unwrap_err();
    assert!(matches!(err, Error::TableCatalogFull));
    assert_eq!(db.tables().count(), MAX_TABLES);
}
