//! # Memory-mapped random-access table
//!
//! [`OpenedTable`] maps a built output file read-only and answers lookups by
//! key through its sidecar index.
//!
//! Opening
//! -----------------
//! 1. The header line must equal the schema's column names.
//! 2. If `<path>.sidecar` exists it is loaded.
//! 3. Otherwise, when [`OpenOptions::rebuild_index`] is set, the file is
//!    scanned once, every row's index cells are recorded at the row's byte
//!    offset, the sidecar is persisted and then loaded.
//!
//! Rows are decoded lazily, one line at a time, with the declared column
//! types. A `\N` token decodes to [`Cell::Null`](crate::schema::Cell::Null)
//! whatever the column type.
//!
//! Resources
//! -----------------
//! The map and the file handle are owned by the table and released when it is
//! dropped, map first.
use std::sync::Arc;

use ahash::RandomState;
use camino::Utf8Path;
use smallvec::SmallVec;
use std::collections::HashSet;

use super::{Lookup, MappedFile, Row, RowLookup, TableKind};
use crate::constants::{sidecar_path, ByteOffset, NULL_SENTINEL};
use crate::index::redb_store::{RedbIndexStore, SidecarIndex};
use crate::index::{IndexColumn, IndexReport, IndexSettings, Indexer};
use crate::observability::{log_debug, log_info, log_warn};
use crate::schema::ColumnSet;
use crate::ssfiletable_errors::SsTableError;

type Tokens<'a> = SmallVec<[&'a str; 32]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Rebuild and persist the sidecar when none exists.
    pub rebuild_index: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            rebuild_index: true,
        }
    }
}

impl OpenOptions {
    pub fn rebuild_index(mut self, rebuild: bool) -> Self {
        self.rebuild_index = rebuild;
        self
    }
}

pub struct OpenedTable {
    index: Option<SidecarIndex>,
    file: MappedFile,
    columns: Arc<ColumnSet>,
    index_columns: Vec<IndexColumn>,
    data_start: usize,
}

impl OpenedTable {
    /// Open the output file of a table of kind `kind`.
    ///
    /// Return
    /// ----------
    /// * [`SsTableError::InputNotFound`] if `path` does not exist.
    /// * [`SsTableError::MissingHeader`] / [`SsTableError::HeaderMismatch`]
    ///   if the file was not written for this schema.
    pub fn open<T: TableKind + ?Sized>(
        kind: &T,
        path: &Utf8Path,
        options: OpenOptions,
    ) -> Result<Self, SsTableError> {
        let file = MappedFile::open(path)?;
        let columns = kind.columns().clone();
        let data_start = check_header(&file, &columns)?;

        let mut table = OpenedTable {
            index: None,
            file,
            columns,
            index_columns: kind.index_columns().to_vec(),
            data_start,
        };

        let sidecar = sidecar_path(path);
        if sidecar.exists() {
            table.index = Some(SidecarIndex::load(&sidecar)?);
        } else if options.rebuild_index && !table.index_columns.is_empty() {
            let report = table.rebuild_index()?;
            if !report.abandoned {
                table.index = Some(SidecarIndex::load(&sidecar)?);
            }
        }

        log_debug!(
            component = "opened_table",
            event = "opened",
            table = table.columns.table_name(),
            path = %path,
            indexed = table.index.is_some(),
        );
        Ok(table)
    }

    pub fn path(&self) -> &Utf8Path {
        self.file.path()
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    fn rebuild_index(&self) -> Result<IndexReport, SsTableError> {
        let sidecar = sidecar_path(self.path());
        let store = RedbIndexStore::create(&sidecar, &self.index_columns)?;
        let mut indexer = Indexer::new(
            Box::new(store),
            &self.columns,
            &self.index_columns,
            IndexSettings::default(),
        )?;

        let fed = self.raw_lines().try_for_each(|(offset, bytes)| {
            let tokens = self.tokens(offset, bytes)?;
            indexer.insert_row(offset, |pos| tokens.get(pos).copied())
        });

        let report = match fed {
            Ok(()) => indexer.finish()?,
            Err(e) => {
                indexer.discard();
                return Err(e);
            }
        };
        log_info!(
            component = "opened_table",
            event = "index_rebuilt",
            path = %sidecar,
            rows = report.rows,
            entries = report.entries,
            abandoned = report.abandoned,
        );
        Ok(report)
    }

    fn is_indexed(&self, column: &str) -> bool {
        self.index_columns.iter().any(|c| c.name == column)
    }

    /// `(offset, line without terminator)` of every data row.
    fn raw_lines(&self) -> impl Iterator<Item = (ByteOffset, &[u8])> + '_ {
        let data = self.file.bytes();
        let mut pos = self.data_start;
        std::iter::from_fn(move || {
            if pos >= data.len() {
                return None;
            }
            let rest = &data[pos..];
            let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
            let start = pos;
            pos += end + 1;
            Some((start as ByteOffset, &rest[..end]))
        })
    }

    fn tokens<'a>(&self, offset: ByteOffset, bytes: &'a [u8]) -> Result<Tokens<'a>, SsTableError> {
        let corrupt = |reason: String| SsTableError::CorruptRow {
            path: self.path().to_owned(),
            offset,
            reason,
        };
        let text = std::str::from_utf8(bytes).map_err(|e| corrupt(e.to_string()))?;
        let text = text.strip_suffix('\r').unwrap_or(text);
        let tokens: Tokens<'a> = text.split(',').collect();
        if tokens.len() != self.columns.len() {
            return Err(corrupt(format!(
                "{} fields for {} columns",
                tokens.len(),
                self.columns.len()
            )));
        }
        Ok(tokens)
    }

    /// Raw bytes of the row starting at `offset`, without terminator.
    pub fn raw_line_at(&self, offset: ByteOffset) -> Result<&[u8], SsTableError> {
        let data = self.file.bytes();
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start < self.data_start || start >= data.len() {
            return Err(SsTableError::CorruptRow {
                path: self.path().to_owned(),
                offset,
                reason: "locator outside of the data section".into(),
            });
        }
        let rest = &data[start..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        Ok(&rest[..end])
    }

    /// Decode the row starting at `offset`.
    pub fn read_row_at(&self, offset: ByteOffset) -> Result<Row, SsTableError> {
        let bytes = self.raw_line_at(offset)?;
        Row::decode(&self.columns, self.tokens(offset, bytes)?)
    }

    /// Locators recorded for `value` in the index of `column`.
    pub fn locator(&self, column: &str, value: &str) -> Option<&[ByteOffset]> {
        self.index.as_ref()?.locate(column, value)
    }

    /// Every row from the start of data. Each call starts over.
    pub fn iter(&self) -> impl Iterator<Item = Result<Row, SsTableError>> + '_ {
        self.raw_lines()
            .map(move |(offset, bytes)| Row::decode(&self.columns, self.tokens(offset, bytes)?))
    }

    fn scan(&self, position: usize, value: &str) -> Result<Lookup, SsTableError> {
        log_warn!(
            component = "opened_table",
            event = "full_scan",
            path = %self.path(),
            column = %self.columns.columns()[position].name,
        );
        let mut rows = Vec::new();
        for (offset, bytes) in self.raw_lines() {
            let tokens = self.tokens(offset, bytes)?;
            if tokens[position] == value {
                rows.push(Row::decode(&self.columns, tokens)?);
            }
        }
        Ok(if rows.is_empty() {
            Lookup::NoMatch
        } else {
            Lookup::Found(rows)
        })
    }
}

impl RowLookup for OpenedTable {
    fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    fn get_by_index(&self, column: &str, value: &str) -> Result<Lookup, SsTableError> {
        let position = self.columns.require(column)?;
        if value == NULL_SENTINEL {
            return Ok(Lookup::NoMatch);
        }

        match &self.index {
            Some(index) if self.is_indexed(column) => match index.locate(column, value) {
                None => Ok(Lookup::NoMatch),
                Some(offsets) => offsets
                    .iter()
                    .map(|&offset| self.read_row_at(offset))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Lookup::Found),
            },
            _ => self.scan(position, value),
        }
    }

    fn index_keys(&self, column: &str) -> Result<Vec<String>, SsTableError> {
        let position = self.columns.require(column)?;
        if let Some(index) = self.index.as_ref().filter(|_| self.is_indexed(column)) {
            return Ok(index.keys(column).map(str::to_string).collect());
        }

        let mut seen: HashSet<String, RandomState> = HashSet::default();
        let mut keys = Vec::new();
        for (offset, bytes) in self.raw_lines() {
            let value = self.tokens(offset, bytes)?[position];
            if value != NULL_SENTINEL && seen.insert(value.to_string()) {
                keys.push(value.to_string());
            }
        }
        Ok(keys)
    }
}

/// Check the header line and return the offset of the first data row.
fn check_header(file: &MappedFile, columns: &ColumnSet) -> Result<usize, SsTableError> {
    let data = file.bytes();
    if data.is_empty() {
        return Err(SsTableError::MissingHeader(file.path().to_owned()));
    }
    let end = data.iter().position(|&b| b == b'\n').unwrap_or(data.len());
    let found = String::from_utf8_lossy(&data[..end]);
    let found = found.strip_suffix('\r').unwrap_or(&*found);
    let expected = columns.header();
    if found != expected {
        return Err(SsTableError::HeaderMismatch {
            path: file.path().to_owned(),
            expected,
            found: found.to_string(),
        });
    }
    Ok((end + 1).min(data.len()))
}
