//! S6 — persistence. After closing and reopening a database, every
//! table and row survives.

use embedded_btree_db::storage::catalog::{Column, MAX_COLUMNS};
use embedded_btree_db::{ColumnType, ColumnValue, Database};
use heapless::Vec as HVec;

fn columns() -> HVec<Column, MAX_COLUMNS> {
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
fn reopen_preserves_tables_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");

    {
        let mut db = Database::open(&path, None).unwrap();
        db.create_table("users", columns(), Some(0)).unwrap();
        db.insert_row(
            "users",
            vec![ColumnValue::Int32(1), ColumnValue::Text(b"a".to_vec())],
        )
        .unwrap();
        db.close().unwrap();
    }

    let mut db = Database::open(&path, None).unwrap();
    assert_eq!(db.tables().collect::<Vec<_>>(), vec!["users"]);
    let row = db.find_row("users", 1).unwrap().unwrap();
    assert_eq!(row[1], ColumnValue::Text(b"a".to_vec()));
}
