//! Plain line-oriented command surface over [`Database`]: no raw-mode
//! terminal handling, no history — just `stdin().lines()` in, `println!`
//! out.

use std::io::{self, BufRead, Write};

use heapless::Vec as HVec;

use embedded_btree_db::storage::catalog::{Column, MAX_COLUMNS};
use embedded_btree_db::{ColumnType, ColumnValue, Database, Error, Result};

const BANNER: &str = r#"Type "create table", "insert", "select", ".tables", ".btree NAME", ".exit"."#;

pub fn run(db: &mut Database) -> Result<()> {
    println!("{}", BANNER);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ".exit" {
            break;
        }
        match dispatch(db, line, &mut lines) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                eprintln!("fatal: {}", e);
                return Err(e);
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

fn dispatch(
    db: &mut Database,
    line: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<()> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some(".tables") => {
            for name in db.tables() {
                println!("{}", name);
            }
            Ok(())
        }
        Some(".btree") => {
            let table = words
                .next()
                .ok_or_else(|| Error::SchemaConstraint(".btree requires a table name".into()))?;
            print!("{}", db.dump_tree(table)?);
            Ok(())
        }
        Some("create") if words.clone().next() == Some("table") => {
            words.next(); // consume "table"
            create_table(db, words, lines)
        }
        Some("insert") => insert(db, words),
        Some("select") => select(db, line),
        _ => {
            println!("unrecognized command: {}", line);
            Ok(())
        }
    }
}

fn create_table<'a>(
    db: &mut Database,
    mut words: impl Iterator<Item = &'a str>,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<()> {
    let name = words
        .next()
        .ok_or_else(|| Error::SchemaConstraint("create table requires a name".into()))?;
    let n_cols: usize = words
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::SchemaConstraint("create table requires a column count".into()))?;

    let mut columns: HVec<Column, MAX_COLUMNS> = HVec::new();
    let mut pk_column = None;
    for i in 0..n_cols {
        let spec = lines
            .next()
            .ok_or_else(|| Error::SchemaConstraint("unexpected end of input reading columns".into()))??;
        let mut parts = spec.split_whitespace();
        let cname = parts
            .next()
            .ok_or_else(|| Error::SchemaConstraint("empty column spec".into()))?;
        let ctype = parts
            .next()
            .ok_or_else(|| Error::SchemaConstraint("column spec missing a type".into()))?;
        let col_type = match ctype.to_ascii_uppercase().as_str() {
            "INT32" | "INT" => ColumnType::Int32,
            "TEXT" => {
                let size: u16 = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::SchemaConstraint("text column requires a size".into()))?;
                ColumnType::Text(size)
            }
            other => return Err(Error::SchemaConstraint(format!("unknown column type: {}", other))),
        };
        if parts.any(|w| w.eq_ignore_ascii_case("primary") || w.eq_ignore_ascii_case("key")) {
            pk_column = Some(i);
        }
        columns
            .push(Column {
                name: cname.to_string(),
                col_type,
            })
            .map_err(|_| Error::SchemaConstraint("too many columns".into()))?;
    }

    db.create_table(name, columns, pk_column)?;
    println!("table {} created", name);
    Ok(())
}

fn insert<'a>(db: &mut Database, mut words: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut table = words
        .next()
        .ok_or_else(|| Error::SchemaConstraint("insert requires a table name".into()))?;
    if table == "into" {
        table = words
            .next()
            .ok_or_else(|| Error::SchemaConstraint("insert into requires a table name".into()))?;
    }
    let raw: Vec<&str> = words.filter(|w| !w.eq_ignore_ascii_case("values")).collect();

    let schema = db.schema(table)?.clone();
    if raw.len() != schema.columns.len() {
        return Err(Error::ValueCountMismatch {
            expected: schema.columns.len(),
            got: raw.len(),
        });
    }
    let mut values = Vec::with_capacity(raw.len());
    for (col, v) in schema.columns.iter().zip(raw) {
        let value = match col.col_type {
            ColumnType::Int32 => ColumnValue::Int32(
                v.parse()
                    .map_err(|_| Error::SchemaConstraint(format!("{} is not a valid int32", v)))?,
            ),
            ColumnType::Text(_) => ColumnValue::Text(v.as_bytes().to_vec()),
        };
        values.push(value);
    }
    let key = db.insert_row(table, values)?;
    println!("inserted row with key {}", key);
    Ok(())
}

/// Parses `select (*|col...) from TABLE [where col OP val [and val2]]`
/// where `OP` is one of `=`, `>`, `<`, `>=`, `<=`, `between`.
fn select(db: &mut Database, line: &str) -> Result<()> {
    let rest = line
        .strip_prefix("select")
        .ok_or_else(|| Error::SchemaConstraint("malformed select".into()))?
        .trim();
    let (_projection, rest) = rest
        .split_once("from")
        .ok_or_else(|| Error::SchemaConstraint("select requires FROM".into()))?;
    let rest = rest.trim();
    let (table, predicate) = match rest.split_once("where") {
        Some((t, w)) => (t.trim(), Some(w.trim())),
        None => (rest, None),
    };

    let schema = db.schema(table)?.clone();
    let (lo, hi) = match predicate {
        None => (1u32, u32::MAX),
        Some(pred) => parse_predicate(pred)?,
    };

    let rows = db.scan_range(table, lo, hi)?;
    for (key, values) in &rows {
        let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        println!("{}: {}", key, rendered.join(", "));
    }
    println!("{} row(s) in set, schema {}", rows.len(), schema.name);
    Ok(())
}

fn parse_predicate(pred: &str) -> Result<(u32, u32)> {
    let mut parts = pred.split_whitespace();
    let _col = parts
        .next()
        .ok_or_else(|| Error::SchemaConstraint("empty where clause".into()))?;
    let op = parts
        .next()
        .ok_or_else(|| Error::SchemaConstraint("where clause missing operator".into()))?;
    let v1: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::SchemaConstraint("where clause missing value".into()))?;
    match op {
        "=" => Ok((v1, v1)),
        ">" => Ok((v1.saturating_add(1), u32::MAX)),
        "<" => Ok((1, v1.saturating_sub(1))),
        ">=" => Ok((v1, u32::MAX)),
        "<=" => Ok((1, v1)),
        "between" => {
            parts.next(); // "and"
            let v2: u32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::SchemaConstraint("between requires two values".into()))?;
            Ok((v1, v2))
        }
        other => Err(Error::SchemaConstraint(format!("unsupported operator: {}", other))),
    }
}
