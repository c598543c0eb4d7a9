use camino::Utf8PathBuf;
use thiserror::Error;

use crate::row::ConversionError;

#[derive(Error, Debug)]
pub enum SsTableError {
    #[error("No column named {column} in {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Column {column} is declared twice in {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Column {column} of {table} is not an index column")]
    NotIndexed { table: String, column: String },

    #[error("Input file not found: {0}")]
    InputNotFound(Utf8PathBuf),

    #[error("Unable to open input file {path}: {source}")]
    InputOpen {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern {pattern}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("Undecodable bytes in {path} at line {line}")]
    InvalidEncoding { path: Utf8PathBuf, line: usize },

    #[error("Conversion of column {column} failed: {source}")]
    Conversion {
        column: String,
        #[source]
        source: ConversionError,
    },

    #[error("Column {column} produced a value that cannot be written unquoted: {value:?}")]
    UnencodableCell { column: String, value: String },

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Table file {0} has no header line")]
    MissingHeader(Utf8PathBuf),

    #[error("Header of {path} does not match the schema: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        path: Utf8PathBuf,
        expected: String,
        found: String,
    },

    #[error("Corrupt row in {path} at byte {offset}: {reason}")]
    CorruptRow {
        path: Utf8PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("Row of {table} has {found} fields for {expected} columns")]
    RowWidth {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("Cannot read {value:?} as {column_type} for column {column}")]
    Decode {
        column: String,
        column_type: &'static str,
        value: String,
    },

    #[error("Error while reading csv table: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Index store {0} is locked by another writer")]
    IndexLocked(Utf8PathBuf),

    #[error("Index store error: {0}")]
    IndexStore(#[from] redb::Error),

    #[error("Index channel error: {0}")]
    IndexTransport(String),
}

impl SsTableError {
    /// Errors the indexer recovers from by waiting and trying again.
    pub fn is_contention(&self) -> bool {
        matches!(self, SsTableError::IndexLocked(_))
    }
}

impl From<bincode::Error> for SsTableError {
    fn from(err: bincode::Error) -> Self {
        SsTableError::IndexTransport(err.to_string())
    }
}

macro_rules! impl_from_redb {
    ($($err:ty),*) => {
        $(
            impl From<$err> for SsTableError {
                fn from(err: $err) -> Self {
                    SsTableError::IndexStore(err.into())
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);
