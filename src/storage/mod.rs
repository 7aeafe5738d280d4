pub mod btree;
pub mod catalog;
pub mod column;
pub mod cursor;
pub mod engine;
pub mod row;

pub use catalog::{Catalog, Column, Schema};
pub use column::{ColumnType, ColumnValue};
pub use engine::Database;
