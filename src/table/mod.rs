//! # File tables
//!
//! A file table is a schema, a set of index columns and an output file, either
//! being built or opened for lookups.
//!
//! Capabilities
//! -----------------
//! * [`TableKind`]: schema, index columns and preferred storage mode of a kind
//!   of table. Every table kind implements it.
//! * [`LineTable`]: a [`TableKind`] built from raw text lines, which adds the
//!   row interpretation strategy. [`DelimitedTable`] is the general
//!   implementation used by the catalog.
//! * [`RowLookup`]: key lookups on a built table, answered by the
//!   memory-mapped [`OpenedTable`] or the fully loaded [`InMemoryTable`].
//!
//! Building goes through [`FileConverter`]; opening through
//! [`OpenedTable::open`], [`InMemoryTable::open`] or [`open_for_lookup`].
//!
//! See also
//! ------------
//! * [`crate::catalogs`] – The concrete table kinds.
pub mod converter;
pub mod in_memory;
pub mod mapped;
pub mod opened;
pub mod writer;

use std::sync::Arc;

use camino::Utf8Path;
use smallvec::SmallVec;

use crate::index::IndexColumn;
use crate::row::{InputRow, RowInterpreter};
use crate::schema::{Cell, ColumnSet, TableSchema, Value};
use crate::ssfiletable_errors::SsTableError;

pub use converter::{
    ConversionReport, ConvertParams, ConvertParamsBuilder, FileConverter, IndexTarget, InputSource,
};
pub use in_memory::InMemoryTable;
pub use mapped::MappedFile;
pub use opened::{OpenOptions, OpenedTable};
pub use writer::TableWriter;

/// How a built table is best opened for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Memory-mapped, rows decoded on demand.
    Mapped,
    /// Loaded whole into memory.
    InMemory,
}

pub trait TableKind {
    /// Input row type the conversion functions read.
    type Input;

    fn schema(&self) -> &TableSchema<Self::Input>;

    fn index_columns(&self) -> &[IndexColumn];

    fn storage(&self) -> StorageMode {
        StorageMode::Mapped
    }

    fn name(&self) -> &str {
        self.schema().name()
    }

    fn columns(&self) -> &Arc<ColumnSet> {
        self.schema().columns()
    }
}

/// A table kind converted from text lines.
pub trait LineTable: TableKind<Input = InputRow> {
    fn interpreter(&self) -> &dyn RowInterpreter;
}

/// A [`LineTable`] assembled from its parts.
pub struct DelimitedTable<I: RowInterpreter> {
    schema: TableSchema<InputRow>,
    interpreter: I,
    index_columns: Vec<IndexColumn>,
    storage: StorageMode,
}

impl<I: RowInterpreter> DelimitedTable<I> {
    /// Return
    /// ----------
    /// * [`SsTableError::UnknownColumn`] if an index column is not in the schema.
    pub fn new(
        schema: TableSchema<InputRow>,
        interpreter: I,
        index_columns: Vec<IndexColumn>,
        storage: StorageMode,
    ) -> Result<Self, SsTableError> {
        for column in &index_columns {
            schema.columns().require(&column.name)?;
        }
        Ok(DelimitedTable {
            schema,
            interpreter,
            index_columns,
            storage,
        })
    }
}

impl<I: RowInterpreter> TableKind for DelimitedTable<I> {
    type Input = InputRow;

    fn schema(&self) -> &TableSchema<InputRow> {
        &self.schema
    }

    fn index_columns(&self) -> &[IndexColumn] {
        &self.index_columns
    }

    fn storage(&self) -> StorageMode {
        self.storage
    }
}

impl<I: RowInterpreter> LineTable for DelimitedTable<I> {
    fn interpreter(&self) -> &dyn RowInterpreter {
        &self.interpreter
    }
}

/// A decoded row of a built table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnSet>,
    cells: Vec<Cell<Value>>,
}

impl Row {
    pub fn new(columns: Arc<ColumnSet>, cells: Vec<Cell<Value>>) -> Self {
        Row { columns, cells }
    }

    /// Decode the raw tokens of one output line.
    ///
    /// Return
    /// ----------
    /// * [`SsTableError::RowWidth`] unless there is exactly one token per column.
    /// * [`SsTableError::Decode`] for a token that does not fit its column type.
    pub fn decode<'a>(
        columns: &Arc<ColumnSet>,
        tokens: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, SsTableError> {
        let tokens: SmallVec<[&str; 32]> = tokens.into_iter().collect();
        if tokens.len() != columns.len() {
            return Err(SsTableError::RowWidth {
                table: columns.table_name().to_string(),
                expected: columns.len(),
                found: tokens.len(),
            });
        }
        let cells = tokens
            .iter()
            .enumerate()
            .map(|(pos, raw)| columns.decode_cell(pos, raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Row::new(columns.clone(), cells))
    }

    pub fn get(&self, column: &str) -> Option<&Cell<Value>> {
        self.columns.position(column).and_then(|p| self.cells.get(p))
    }

    pub fn cells(&self) -> &[Cell<Value>] {
        &self.cells
    }

    pub fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }
}

/// Outcome of a key lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The key is not present.
    NoMatch,
    /// Rows holding the key, in output order.
    Found(Vec<Row>),
}

impl Lookup {
    pub fn is_match(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Matching rows; empty on [`Lookup::NoMatch`].
    pub fn rows(&self) -> &[Row] {
        match self {
            Lookup::NoMatch => &[],
            Lookup::Found(rows) => rows,
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows().first()
    }
}

/// Key lookups over a built table.
pub trait RowLookup {
    fn columns(&self) -> &Arc<ColumnSet>;

    /// Rows whose `column` holds the raw token `value`.
    ///
    /// Index columns are answered from the index when one is loaded; any
    /// other column falls back to a full scan.
    fn get_by_index(&self, column: &str, value: &str) -> Result<Lookup, SsTableError>;

    /// Distinct values of an index column.
    fn index_keys(&self, column: &str) -> Result<Vec<String>, SsTableError>;
}

/// Either storage of a table opened for lookups.
pub enum AnyTable {
    Mapped(OpenedTable),
    InMemory(InMemoryTable),
}

impl RowLookup for AnyTable {
    fn columns(&self) -> &Arc<ColumnSet> {
        match self {
            AnyTable::Mapped(t) => t.columns(),
            AnyTable::InMemory(t) => t.columns(),
        }
    }

    fn get_by_index(&self, column: &str, value: &str) -> Result<Lookup, SsTableError> {
        match self {
            AnyTable::Mapped(t) => t.get_by_index(column, value),
            AnyTable::InMemory(t) => t.get_by_index(column, value),
        }
    }

    fn index_keys(&self, column: &str) -> Result<Vec<String>, SsTableError> {
        match self {
            AnyTable::Mapped(t) => t.index_keys(column),
            AnyTable::InMemory(t) => t.index_keys(column),
        }
    }
}

/// Open `path` in the storage mode `kind` prefers.
pub fn open_for_lookup<T: TableKind + ?Sized>(
    kind: &T,
    path: &Utf8Path,
    options: OpenOptions,
) -> Result<AnyTable, SsTableError> {
    Ok(match kind.storage() {
        StorageMode::Mapped => AnyTable::Mapped(OpenedTable::open(kind, path, options)?),
        StorageMode::InMemory => AnyTable::InMemory(InMemoryTable::open(kind, path)?),
    })
}

#[cfg(test)]
mod table_test {
    use super::*;
    use crate::schema::ColumnType;

    fn columns() -> Arc<ColumnSet> {
        Arc::new(
            ColumnSet::new("T", &[("id", ColumnType::Int), ("ra", ColumnType::Float)]).unwrap(),
        )
    }

    #[test]
    fn test_decode_row() {
        let row = Row::decode(&columns(), ["7", "\\N"]).unwrap();
        assert_eq!(row.get("id"), Some(&Cell::Value(Value::Int(7))));
        assert_eq!(row.get("ra"), Some(&Cell::Null));
    }

    #[test]
    fn test_decode_rejects_wrong_width() {
        for tokens in [vec!["7"], vec!["7", "1.5", "extra"]] {
            assert!(matches!(
                Row::decode(&columns(), tokens),
                Err(SsTableError::RowWidth { expected: 2, .. })
            ));
        }
        assert!(matches!(
            columns().decode_cell(2, "1"),
            Err(SsTableError::RowWidth { .. })
        ));
    }
}
