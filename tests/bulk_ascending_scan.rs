//! S3 — ascending bulk insert. Inserting keys `1..100` and walking the
//! leaf chain left-to-right yields exactly `1..100`.

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
fn ascending_bulk_insert_scans_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::open(dir.path().join("bulk.db"), None).unwrap();
    db.create_table("t", columns(), Some(0)).unwrap();

    for k in 1..=100u32 {
        db.insert_row(
            "t",
            vec![ColumnValue::Int32(k as i32), ColumnValue::Text(format!("u{}", k).into_bytes())],
        )
        .unwrap();
    }

    let rows = db.scan_range("t", 1, 100).unwrap();
    let keys: Vec<u32> = rows.iter().map(|(k, _)| *k).collect();
    let expected: Vec<u32> = (1..=100).collect();
    assert_eq!(keys, expected);
}
