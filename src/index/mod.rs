//! # Batched indexing of output rows
//!
//! The [`Indexer`] sits beside the writer of an output file. For every row it
//! records `(column, value, byte offset)` entries for the designated index
//! columns and persists them in batches through an [`IndexSink`]:
//!
//! * [`redb_store::RedbIndexStore`] writes an embedded `redb` database that
//!   becomes `<output>.sidecar` once complete (in-process mode).
//! * [`remote::RemoteIndexSink`] ships the batches to an
//!   [`remote::IndexServer`] over a local TCP stream (delegated mode).
//!
//! Pass-through
//! -----------------
//! [`Indexer::pass_through`] wraps the cell iterator of one row and yields
//! every cell unchanged and in order. Indexing is a side channel: it never
//! filters, alters, or reorders the primary output stream.
//!
//! Batching and shutdown
//! -----------------
//! A batch is flushed when `batch_size` rows have been inserted. The trailing
//! partial batch is flushed by [`Indexer::finish`], or by `Drop` when the
//! indexer goes out of scope without being finished. [`Indexer::discard`]
//! closes the sink without flushing and without publishing a sidecar.
//!
//! Contention
//! -----------------
//! A sink error for which [`SsTableError::is_contention`] holds is retried
//! after a fixed sleep, up to `max_retries` times. When retries run out the
//! index is abandoned: pending and later entries are dropped and no sidecar is
//! published. The output file is never affected. Any other sink error is
//! returned to the caller and marks the indexer as failed: the batch it held
//! is lost, so the sink is closed without publishing, whether by
//! [`Indexer::finish`] or by `Drop`.
//!
//! Checkpoints
//! -----------------
//! [`Indexer::checkpoint`] flushes and asks the sink to publish what it holds
//! so far while staying open. The index server uses it after every client
//! that closes cleanly.
pub mod redb_store;
pub mod remote;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::{
    ByteOffset, ColumnName, DEFAULT_INDEX_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL,
    NULL_SENTINEL,
};
use crate::observability::{log_debug, log_error, log_warn};
use crate::schema::{Cell, ColumnSet};
use crate::ssfiletable_errors::SsTableError;

/// Whether a key may map to one row or to many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// One locator per key. A later row with the same key is ignored.
    Unique,
    /// An append-only list of locators, in insertion order.
    Multi,
}

/// A column indexed when building or opening a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: ColumnName,
    pub cardinality: Cardinality,
}

impl IndexColumn {
    pub fn unique(name: &str) -> Self {
        IndexColumn {
            name: name.to_string(),
            cardinality: Cardinality::Unique,
        }
    }

    pub fn multi(name: &str) -> Self {
        IndexColumn {
            name: name.to_string(),
            cardinality: Cardinality::Multi,
        }
    }
}

/// One `(key, locator)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub column: ColumnName,
    pub value: String,
    pub offset: ByteOffset,
}

/// Persistence backend of an [`Indexer`].
pub trait IndexSink: Send {
    /// Persist one batch. May be called with an empty batch.
    fn write_batch(&mut self, batch: &[IndexEntry]) -> Result<(), SsTableError>;

    /// Make every batch written so far visible at the published location and
    /// keep accepting batches. Backends with nothing to publish ignore it.
    fn publish(&mut self) -> Result<(), SsTableError> {
        Ok(())
    }

    /// Release the backend. `complete` is false when the index must not be
    /// published.
    fn close(self: Box<Self>, complete: bool) -> Result<(), SsTableError>;
}

/// Fixed-interval retry on index contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            interval: DEFAULT_RETRY_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSettings {
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            batch_size: DEFAULT_INDEX_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Summary of a finished index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub rows: u64,
    pub entries: u64,
    pub flushes: usize,
    pub abandoned: bool,
}

pub struct Indexer {
    sink: Option<Box<dyn IndexSink>>,
    /// `(cell position, column name)` of each index column.
    positions: Vec<(usize, ColumnName)>,
    pending: Vec<IndexEntry>,
    pending_rows: usize,
    settings: IndexSettings,
    rows: u64,
    entries: u64,
    flushes: usize,
    abandoned: bool,
    /// Set once the sink rejected a batch with a non-contention error.
    failed: bool,
}

impl Indexer {
    /// Index `index_columns` of rows laid out as `columns`.
    ///
    /// Return
    /// ----------
    /// * [`SsTableError::UnknownColumn`] if an index column is not part of `columns`.
    /// * [`SsTableError::InvalidParameter`] for a zero batch size.
    pub fn new(
        sink: Box<dyn IndexSink>,
        columns: &ColumnSet,
        index_columns: &[IndexColumn],
        settings: IndexSettings,
    ) -> Result<Self, SsTableError> {
        let positions = index_columns
            .iter()
            .map(|c| Ok((columns.require(&c.name)?, c.name.clone())))
            .collect::<Result<Vec<_>, SsTableError>>()?;
        let mut indexer = Self::for_entries(sink, settings)?;
        indexer.positions = positions;
        Ok(indexer)
    }

    /// An indexer fed with ready-made entries through [`Self::insert_entry`].
    pub fn for_entries(
        sink: Box<dyn IndexSink>,
        settings: IndexSettings,
    ) -> Result<Self, SsTableError> {
        if settings.batch_size == 0 {
            return Err(SsTableError::InvalidParameter(
                "index batch size must be > 0".into(),
            ));
        }
        Ok(Indexer {
            sink: Some(sink),
            positions: Vec::new(),
            pending: Vec::with_capacity(settings.batch_size),
            pending_rows: 0,
            settings,
            rows: 0,
            entries: 0,
            flushes: 0,
            abandoned: false,
            failed: false,
        })
    }

    pub fn positions(&self) -> impl Iterator<Item = (usize, &str)> {
        self.positions.iter().map(|(p, n)| (*p, n.as_str()))
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn publishable(&self) -> bool {
        !self.abandoned && !self.failed
    }

    /// Wrap the cells of the row starting at `offset`.
    ///
    /// The row is recorded once `cells` is exhausted. Should recording fail,
    /// the wrapper yields one extra `Err` item after the last cell.
    pub fn pass_through<I>(&mut self, offset: ByteOffset, cells: I) -> PassThrough<'_, I>
    where
        I: Iterator<Item = Result<Cell<String>, SsTableError>>,
    {
        PassThrough {
            indexer: self,
            offset,
            cells,
            position: 0,
            keys: SmallVec::new(),
            recorded: false,
        }
    }

    /// Record the index cells of one row. Null keys are skipped.
    ///
    /// Arguments
    /// -----------------
    /// * `offset`: byte offset of the row in the output file.
    /// * `cell_at`: the raw token of the row at a given cell position.
    pub fn insert_row<'c, F>(&mut self, offset: ByteOffset, mut cell_at: F) -> Result<(), SsTableError>
    where
        F: FnMut(usize) -> Option<&'c str>,
    {
        let keys: SmallVec<[(usize, String); 2]> = self
            .positions
            .iter()
            .enumerate()
            .filter_map(|(slot, (pos, _))| cell_at(*pos).map(|v| (slot, v.to_string())))
            .collect();
        self.record(offset, keys)
    }

    /// Queue one entry. On the server side each entry counts as one row
    /// towards the batch size.
    pub fn insert_entry(&mut self, entry: IndexEntry) -> Result<(), SsTableError> {
        self.rows += 1;
        if !self.abandoned && entry.value != NULL_SENTINEL {
            self.entries += 1;
            self.pending.push(entry);
        }
        self.end_row()
    }

    fn record(
        &mut self,
        offset: ByteOffset,
        keys: SmallVec<[(usize, String); 2]>,
    ) -> Result<(), SsTableError> {
        self.rows += 1;
        if !self.abandoned {
            for (slot, value) in keys {
                if value == NULL_SENTINEL {
                    continue;
                }
                self.entries += 1;
                self.pending.push(IndexEntry {
                    column: self.positions[slot].1.clone(),
                    value,
                    offset,
                });
            }
        }
        self.end_row()
    }

    fn end_row(&mut self) -> Result<(), SsTableError> {
        self.pending_rows += 1;
        if self.pending_rows >= self.settings.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SsTableError> {
        if self.pending_rows == 0 {
            return Ok(());
        }
        self.pending_rows = 0;
        if !self.publishable() {
            self.pending.clear();
            return Ok(());
        }
        let Some(sink) = self.sink.as_mut() else {
            self.pending.clear();
            return Ok(());
        };

        let retry = self.settings.retry;
        let mut attempt = 0;
        loop {
            match sink.write_batch(&self.pending) {
                Ok(()) => break,
                Err(e) if e.is_contention() && attempt < retry.max_retries => {
                    attempt += 1;
                    log_debug!(
                        component = "indexer",
                        event = "contention_retry",
                        attempt,
                        error = %e,
                    );
                    std::thread::sleep(retry.interval);
                }
                Err(e) if e.is_contention() => {
                    log_warn!(
                        component = "indexer",
                        event = "index_abandoned",
                        attempts = attempt + 1,
                        error = %e,
                    );
                    self.abandoned = true;
                    self.pending.clear();
                    return Ok(());
                }
                Err(e) => {
                    log_error!(
                        component = "indexer",
                        event = "flush_failed",
                        entries = self.pending.len(),
                        error = %e,
                    );
                    self.failed = true;
                    self.pending.clear();
                    return Err(e);
                }
            }
        }

        self.flushes += 1;
        log_debug!(
            component = "indexer",
            event = "flush",
            entries = self.pending.len(),
            flushes = self.flushes,
        );
        self.pending.clear();
        Ok(())
    }

    fn report(&self) -> IndexReport {
        IndexReport {
            rows: self.rows,
            entries: self.entries,
            flushes: self.flushes,
            abandoned: self.abandoned,
        }
    }

    /// Flush pending entries and publish everything the sink holds so far.
    ///
    /// Return
    /// ----------
    /// * `false` when the index was abandoned or has failed, in which case
    ///   nothing is published.
    pub fn checkpoint(&mut self) -> Result<bool, SsTableError> {
        self.flush()?;
        if !self.publishable() {
            return Ok(false);
        }
        match self.sink.as_mut() {
            Some(sink) => {
                sink.publish()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flush the remainder and close the sink, publishing the index unless it
    /// was abandoned or a batch was lost.
    pub fn finish(mut self) -> Result<IndexReport, SsTableError> {
        let flushed = self.flush();
        let closed = match self.sink.take() {
            Some(sink) => sink.close(flushed.is_ok() && self.publishable()),
            None => Ok(()),
        };
        flushed?;
        closed?;
        Ok(self.report())
    }

    /// Close the sink without flushing; nothing is published.
    pub fn discard(mut self) -> IndexReport {
        self.pending.clear();
        self.pending_rows = 0;
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.close(false) {
                log_error!(component = "indexer", event = "discard_failed", error = %e);
            }
        }
        IndexReport {
            abandoned: true,
            ..self.report()
        }
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        if self.sink.is_none() {
            return;
        }
        let flushed = self.flush();
        if let Err(e) = &flushed {
            log_error!(component = "indexer", event = "final_flush_failed", error = %e);
        }
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.close(flushed.is_ok() && self.publishable()) {
                log_error!(component = "indexer", event = "close_failed", error = %e);
            }
        }
    }
}

/// Cells of one row on their way to the writer. See [`Indexer::pass_through`].
pub struct PassThrough<'a, I> {
    indexer: &'a mut Indexer,
    offset: ByteOffset,
    cells: I,
    position: usize,
    keys: SmallVec<[(usize, String); 2]>,
    recorded: bool,
}

impl<I> Iterator for PassThrough<'_, I>
where
    I: Iterator<Item = Result<Cell<String>, SsTableError>>,
{
    type Item = Result<Cell<String>, SsTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cells.next() {
            Some(Ok(cell)) => {
                if let Cell::Value(v) = &cell {
                    if let Some(slot) = self
                        .indexer
                        .positions
                        .iter()
                        .position(|(p, _)| *p == self.position)
                    {
                        self.keys.push((slot, v.clone()));
                    }
                }
                self.position += 1;
                Some(Ok(cell))
            }
            Some(Err(e)) => Some(Err(e)),
            None if self.recorded => None,
            None => {
                self.recorded = true;
                let keys = std::mem::take(&mut self.keys);
                self.indexer.record(self.offset, keys).err().map(Err)
            }
        }
    }
}
