//! Whole-file table for the smaller catalogs.
//!
//! The file is parsed once with `csv` (quoting disabled, the format never
//! quotes) and every row is decoded up front. Index columns are indexed in a
//! hash map keyed by the raw token, following the column's cardinality.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;

use super::{Lookup, Row, RowLookup, TableKind};
use crate::constants::{ColumnName, NULL_SENTINEL};
use crate::index::Cardinality;
use crate::observability::log_debug;
use crate::schema::{Cell, ColumnSet};
use crate::ssfiletable_errors::SsTableError;

type Positions = HashMap<String, Vec<usize>, RandomState>;

pub struct InMemoryTable {
    path: Utf8PathBuf,
    columns: Arc<ColumnSet>,
    rows: Vec<Row>,
    index: HashMap<ColumnName, Positions, RandomState>,
}

impl InMemoryTable {
    pub fn open<T: TableKind + ?Sized>(kind: &T, path: &Utf8Path) -> Result<Self, SsTableError> {
        if !path.exists() {
            return Err(SsTableError::InputNotFound(path.to_owned()));
        }
        let columns = kind.columns().clone();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .quoting(false)
            .from_path(path)?;

        let found = reader.headers()?.iter().join(",");
        let expected = columns.header();
        if found != expected {
            return Err(SsTableError::HeaderMismatch {
                path: path.to_owned(),
                expected,
                found,
            });
        }

        let indexed = kind
            .index_columns()
            .iter()
            .map(|c| Ok((c.name.clone(), columns.require(&c.name)?, c.cardinality)))
            .collect::<Result<Vec<_>, SsTableError>>()?;

        let mut index: HashMap<ColumnName, Positions, RandomState> = HashMap::default();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row_pos = rows.len();
            for (name, pos, cardinality) in &indexed {
                let Some(raw) = record.get(*pos).filter(|raw| *raw != NULL_SENTINEL) else {
                    continue;
                };
                let slots = index
                    .entry(name.clone())
                    .or_default()
                    .entry(raw.to_string())
                    .or_default();
                if *cardinality == Cardinality::Multi || slots.is_empty() {
                    slots.push(row_pos);
                }
            }
            rows.push(Row::decode(&columns, record.iter())?);
        }

        log_debug!(
            component = "in_memory_table",
            event = "loaded",
            path = %path,
            rows = rows.len(),
        );
        Ok(InMemoryTable {
            path: path.to_owned(),
            columns,
            rows,
            index,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowLookup for InMemoryTable {
    fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    fn get_by_index(&self, column: &str, value: &str) -> Result<Lookup, SsTableError> {
        let position = self.columns.require(column)?;
        if value == NULL_SENTINEL {
            return Ok(Lookup::NoMatch);
        }

        if let Some(values) = self.index.get(column) {
            return Ok(match values.get(value) {
                None => Lookup::NoMatch,
                Some(slots) => Lookup::Found(slots.iter().map(|&i| self.rows[i].clone()).collect()),
            });
        }

        let Ok(wanted) = self.columns.decode_cell(position, value) else {
            return Ok(Lookup::NoMatch);
        };
        let rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| row.cells()[position] == wanted)
            .cloned()
            .collect();
        Ok(if rows.is_empty() {
            Lookup::NoMatch
        } else {
            Lookup::Found(rows)
        })
    }

    fn index_keys(&self, column: &str) -> Result<Vec<String>, SsTableError> {
        let position = self.columns.require(column)?;
        if let Some(values) = self.index.get(column) {
            return Ok(values.keys().cloned().collect());
        }
        let mut seen: HashSet<String, RandomState> = HashSet::default();
        Ok(self
            .rows
            .iter()
            .filter_map(|row| match &row.cells()[position] {
                Cell::Null => None,
                Cell::Value(v) => Some(v.to_string()),
            })
            .filter(|v| seen.insert(v.clone()))
            .collect())
    }
}
