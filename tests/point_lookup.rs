//! S1 — point insert and lookup.

use embedded_btree_db::storage::catalog::{Column, MAX_COLUMNS};
use embedded_btree_db::{ColumnType, ColumnValue, Database};
use heapless::Vec as HVec;

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
fn point_insert_and_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path().join("users.db"), None).unwrap();
    db.create_table("users", users_columns(), Some(0)).unwrap();

    db.insert_row(
        "users",
        vec![ColumnValue::Int32(1), ColumnValue::Text(b"a".to_vec())],
    )
    .unwrap();
    db.insert_row(
        "users",
        vec![ColumnValue::Int32(2), ColumnValue::Text(b"b".to_vec())],
    )
    .unwrap();

    let row1 = db.find_row("users", 1).unwrap().unwrap();
    assert_eq!(row1[1], ColumnValue::Text(b"a".to_vec()));

    let row2 = db.find_row("users", 2).unwrap().unwrap();
    assert_eq!(row2[1], ColumnValue::Text(b"b".to_vec()));

    assert!(db.find_row("users", 3).unwrap().is_none());
}
