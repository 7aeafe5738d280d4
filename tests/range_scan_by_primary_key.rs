//! S5 — range scan by primary key. After a bulk ascending insert,
//! `scan_range` between two keys returns exactly that subset.

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
fn range_scan_returns_exact_subset() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path().join("range.db"), None).unwrap();
    db.create_table("t", columns(), Some(0)).unwrap();

    for k in 1..=100u32 {
        db.insert_row(
            "t",
            vec![ColumnValue::Int32(k as i32), ColumnValue::Text(format!("u{}", k).into_bytes())],
        )
        .unwrap();
    }

    let rows = db.scan_range("t", 10, 15).unwrap();
    let keys: Vec<u32> = rows.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![10, 11, 12, 13, 14, 15]);
}
