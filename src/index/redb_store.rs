//! Sidecar index stored as an embedded `redb` database.
//!
//! One table, `locators`, maps `column \0 value` to the little-endian `u64`
//! byte offsets of the rows holding that value. The database is written to
//! `<sidecar>.partial` and renamed to the sidecar path once complete.
//! [`IndexSink::publish`] copies the staging database to the sidecar path
//! through a `.snapshot` file, so a reader never sees a half-copied index.
//!
//! The writer opens the database for each batch, so two writers on the same
//! store contend on the file lock; that surfaces as
//! [`SsTableError::IndexLocked`] and is retried by the
//! [`Indexer`](super::Indexer).
use std::collections::HashMap;
use std::fs;

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use redb::{Database, DatabaseError, ReadableTable, TableDefinition};

use super::{Cardinality, IndexColumn, IndexEntry, IndexSink};
use crate::constants::{staging_path, ByteOffset, ColumnName};
use crate::observability::{log_debug, log_info, log_warn};
use crate::ssfiletable_errors::SsTableError;

const LOCATORS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("locators");

fn encode_key(column: &str, value: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(column.len() + value.len() + 1);
    key.extend_from_slice(column.as_bytes());
    key.push(0);
    key.extend_from_slice(value.as_bytes());
    key
}

fn decode_key(key: &[u8]) -> Option<(&str, &str)> {
    let split = key.iter().position(|&b| b == 0)?;
    let column = std::str::from_utf8(&key[..split]).ok()?;
    let value = std::str::from_utf8(&key[split + 1..]).ok()?;
    Some((column, value))
}

fn encode_offsets(offsets: &[ByteOffset]) -> Vec<u8> {
    let mut out = Vec::with_capacity(offsets.len() * 8);
    for &o in offsets {
        out.extend_from_slice(&o.to_le_bytes());
    }
    out
}

fn decode_offsets(data: &[u8]) -> Vec<ByteOffset> {
    data.chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            u64::from_le_bytes(bytes)
        })
        .collect()
}

fn map_open_error(path: &Utf8Path, err: DatabaseError) -> SsTableError {
    match err {
        DatabaseError::DatabaseAlreadyOpen => SsTableError::IndexLocked(path.to_owned()),
        other => other.into(),
    }
}

/// Batched writer of a sidecar. See the module docs.
pub struct RedbIndexStore {
    staging: Utf8PathBuf,
    target: Utf8PathBuf,
    cardinality: HashMap<ColumnName, Cardinality, RandomState>,
}

impl RedbIndexStore {
    /// Start a new store that will be published at `target`.
    ///
    /// A leftover staging file from an interrupted build is replaced. The
    /// `locators` table is created right away so that an index without any
    /// entry still opens.
    pub fn create(target: &Utf8Path, index_columns: &[IndexColumn]) -> Result<Self, SsTableError> {
        let staging = staging_path(target);
        if staging.exists() {
            fs::remove_file(&staging)?;
        }

        let store = RedbIndexStore {
            staging,
            target: target.to_owned(),
            cardinality: index_columns
                .iter()
                .map(|c| (c.name.clone(), c.cardinality))
                .collect(),
        };

        let db = store.open()?;
        let txn = db.begin_write()?;
        txn.open_table(LOCATORS)?;
        txn.commit()?;
        Ok(store)
    }

    pub fn target(&self) -> &Utf8Path {
        &self.target
    }

    fn open(&self) -> Result<Database, SsTableError> {
        Database::create(self.staging.as_std_path()).map_err(|e| map_open_error(&self.staging, e))
    }
}

impl IndexSink for RedbIndexStore {
    fn write_batch(&mut self, batch: &[IndexEntry]) -> Result<(), SsTableError> {
        let db = self.open()?;
        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(LOCATORS)?;
            for entry in batch {
                let key = encode_key(&entry.column, &entry.value);
                let mut offsets = table
                    .get(key.as_slice())?
                    .map(|guard| decode_offsets(guard.value()))
                    .unwrap_or_default();

                let cardinality = self
                    .cardinality
                    .get(&entry.column)
                    .copied()
                    .unwrap_or(Cardinality::Multi);

                match cardinality {
                    Cardinality::Unique if !offsets.is_empty() => {
                        if offsets[0] != entry.offset {
                            log_warn!(
                                component = "sidecar",
                                event = "duplicate_unique_key",
                                column = %entry.column,
                                value = %entry.value,
                                kept = offsets[0],
                                ignored = entry.offset,
                            );
                        }
                        continue;
                    }
                    _ if offsets.contains(&entry.offset) => continue,
                    _ => offsets.push(entry.offset),
                }
                table.insert(key.as_slice(), encode_offsets(&offsets).as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn publish(&mut self) -> Result<(), SsTableError> {
        let snapshot = Utf8PathBuf::from(format!("{}.snapshot", self.target));
        fs::copy(&self.staging, &snapshot)?;
        if let Err(e) = fs::rename(&snapshot, &self.target) {
            let _ = fs::remove_file(&snapshot);
            return Err(e.into());
        }
        log_info!(component = "sidecar", event = "snapshot_published", path = %self.target);
        Ok(())
    }

    fn close(self: Box<Self>, complete: bool) -> Result<(), SsTableError> {
        if complete {
            fs::rename(&self.staging, &self.target)?;
            log_info!(component = "sidecar", event = "published", path = %self.target);
        } else {
            match fs::remove_file(&self.staging) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            log_debug!(component = "sidecar", event = "staging_removed", path = %self.staging);
        }
        Ok(())
    }
}

/// A published sidecar, loaded into memory.
#[derive(Debug, Default)]
pub struct SidecarIndex {
    columns: HashMap<ColumnName, HashMap<String, Vec<ByteOffset>, RandomState>, RandomState>,
}

impl SidecarIndex {
    pub fn load(path: &Utf8Path) -> Result<Self, SsTableError> {
        let db = Database::open(path.as_std_path()).map_err(|e| map_open_error(path, e))?;
        let txn = db.begin_read()?;
        let table = txn.open_table(LOCATORS)?;

        let mut index = SidecarIndex::default();
        let mut keys = 0usize;
        for item in table.iter()? {
            let (key, value) = item?;
            let Some((column, cell)) = decode_key(key.value()) else {
                return Err(SsTableError::CorruptRow {
                    path: path.to_owned(),
                    offset: 0,
                    reason: "undecodable sidecar key".into(),
                });
            };
            index
                .columns
                .entry(column.to_string())
                .or_default()
                .insert(cell.to_string(), decode_offsets(value.value()));
            keys += 1;
        }

        log_debug!(component = "sidecar", event = "loaded", path = %path, keys);
        Ok(index)
    }

    /// Offsets recorded for `value` in `column`, in insertion order.
    pub fn locate(&self, column: &str, value: &str) -> Option<&[ByteOffset]> {
        self.columns
            .get(column)?
            .get(value)
            .map(|offsets| offsets.as_slice())
    }

    /// Distinct values recorded for `column`, in no particular order.
    pub fn keys(&self, column: &str) -> impl Iterator<Item = &str> {
        self.columns
            .get(column)
            .into_iter()
            .flat_map(|values| values.keys().map(|k| k.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
