mod repl;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use embedded_btree_db::Database;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "embedded-btree-db", version = VERSION, about = "Embedded paged B+ tree storage engine.")]
struct Cli {
    /// Path to the database file, or a bare name resolved under the OS
    /// data directory.
    database: String,

    /// Enable the write-ahead log (a `<database>.wal` sidecar file).
    #[arg(long, env = "EMBEDDED_BTREE_DB_WAL", default_value_t = false)]
    wal: bool,
}

fn resolve_path(name: &str) -> PathBuf {
    let raw = PathBuf::from(name);
    if raw.components().count() > 1 || raw.is_absolute() {
        return raw;
    }
    match dirs::data_dir() {
        Some(mut dir) => {
            dir.push("embedded-btree-db");
            std::fs::create_dir_all(&dir).ok();
            dir.push(name);
            dir
        }
        None => raw,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let path = resolve_path(&cli.database);
    let wal_path = cli.wal.then(|| {
        let mut p = path.clone();
        let mut file_name = p.file_name().unwrap_or_default().to_os_string();
        file_name.push(".wal");
        p.set_file_name(file_name);
        p
    });

    let mut db = match Database::open(&path, wal_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("fatal: failed to open {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    // `repl::run` only ever returns `Err` for a `Fatal` error (it has
    // already printed it); anything else is reported inline and the
    // loop continues. On that path the engine makes no promise about
    // the state of pages it was mutating, so the handle is abandoned
    // rather than closed — a mid-split page must never reach disk.
    match repl::run(&mut db) {
        Ok(()) => match db.close() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("fatal: failed to close database: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(_) => {
            db.abandon();
            ExitCode::FAILURE
        }
    }
}
