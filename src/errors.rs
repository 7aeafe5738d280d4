use std::fmt;

/// Every error the engine can surface at its public boundary.
///
/// `Fatal` is the only kind the caller should not try to recover from:
/// once raised, the engine makes no promise about the state of pages it
/// was mutating. Everything else leaves the engine unchanged.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    DuplicateKey(u32),
    TableNotFound(String),
    TableExists(String),
    TableCatalogFull,
    ColumnOutOfBounds(usize),
    SchemaConstraint(String),
    ValueCountMismatch { expected: usize, got: usize },
    Codec(String),
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::DuplicateKey(k) => write!(f, "duplicate key: {}", k),
            Error::TableNotFound(name) => write!(f, "no such table: {}", name),
            Error::TableExists(name) => write!(f, "table already exists: {}", name),
            Error::TableCatalogFull => write!(f, "catalog is full"),
            Error::ColumnOutOfBounds(i) => write!(f, "column index out of bounds: {}", i),
            Error::SchemaConstraint(msg) => write!(f, "schema constraint violated: {}", msg),
            Error::ValueCountMismatch { expected, got } => {
                write!(f, "expected {} values, got {}", expected, got)
            }
            Error::Codec(msg) => write!(f, "codec error: {}", msg),
            Error::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_) | Error::Io(_))
    }
}

/// Builds an `Error` variant from a format string, the way call sites
/// across the engine construct one without repeating `.to_string()`.
macro_rules! err {
    (Fatal, $($arg:tt)*) => {
        $crate::errors::Error::Fatal(format!($($arg)*))
    };
    (Codec, $($arg:tt)*) => {
        $crate::errors::Error::Codec(format!($($arg)*))
    };
    (SchemaConstraint, $($arg:tt)*) => {
        $crate::errors::Error::SchemaConstraint(format!($($arg)*))
    };
}

pub(crate) use err;

pub type Result<T> = std::result::Result<T, Error>;
