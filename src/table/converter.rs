//! # File converter
//!
//! [`FileConverter::run`] turns one input source into one output file:
//!
//! 1. Resolve the source. A single path must exist. A glob is enumerated in
//!    the order the `glob` crate yields; a glob matching nothing produces a
//!    header-only output.
//! 2. Memory-map every input read-only and chain their lines.
//! 3. Window, interpret and convert the lines with the table's registry.
//! 4. Write the rows through a [`TableWriter`], feeding each row through the
//!    [`Indexer`] when indexing is requested.
//! 5. On success, publish the output and then the sidecar. On any error, drop
//!    the staged output and the staged index.
//!
//! ## Parameters
//! -----------------
//! [`ConvertParams`] is built with [`ConvertParams::builder`] and validated by
//! [`ConvertParamsBuilder::build`].
//!
//! ```rust, no_run
//! use ssfiletable::catalogs::dia_source;
//! use ssfiletable::table::{ConvertParams, FileConverter, InputSource};
//!
//! let table = dia_source::table()?;
//! let params = ConvertParams::builder()
//!     .skip_rows(1)
//!     .do_index(true)
//!     .build()?;
//! let report = FileConverter::new(
//!     &table,
//!     InputSource::Path("night_0001.txt".into()),
//!     "dia_source.csv",
//!     params,
//! )
//! .run()?;
//! println!("{} rows", report.rows_written);
//! # Ok::<(), ssfiletable::SsTableError>(())
//! ```
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use super::{LineTable, MappedFile, TableWriter};
use crate::constants::{
    sidecar_path, ColumnName, DEFAULT_INDEX_BATCH_SIZE, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_INTERVAL,
};
use crate::index::redb_store::RedbIndexStore;
use crate::index::remote::RemoteIndexSink;
use crate::index::{IndexColumn, IndexReport, IndexSettings, IndexSink, Indexer, RetryPolicy};
use crate::observability::{log_info, log_warn};
use crate::progress::RowProgress;
use crate::row::{LazyRow, RowBuilder, RowWindow};
use crate::schema::ColumnSet;
use crate::ssfiletable_errors::SsTableError;

/// Where the index entries of a conversion go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexTarget {
    /// Write `<output>.sidecar` from this process.
    InProcess,
    /// Push entries to an [`IndexServer`](crate::index::remote::IndexServer) at this endpoint.
    Delegated(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertParams {
    /// Input rows dropped before conversion starts.
    pub skip_rows: usize,
    /// Maximum number of rows converted after the skipped ones.
    pub stop_after: Option<usize>,
    /// Restrict conversion to these columns; the others are written as null.
    pub columns: Option<Vec<ColumnName>>,
    /// Index the table's index columns while writing.
    pub do_index: bool,
    pub index_target: IndexTarget,
    pub index_batch_size: usize,
    pub retry_interval: Duration,
    pub max_retries: u32,
}

impl Default for ConvertParams {
    fn default() -> Self {
        ConvertParams {
            skip_rows: 0,
            stop_after: None,
            columns: None,
            do_index: false,
            index_target: IndexTarget::InProcess,
            index_batch_size: DEFAULT_INDEX_BATCH_SIZE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ConvertParams {
    pub fn builder() -> ConvertParamsBuilder {
        ConvertParamsBuilder::new()
    }

    pub fn window(&self) -> RowWindow {
        RowWindow::new(self.skip_rows, self.stop_after)
    }

    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            batch_size: self.index_batch_size,
            retry: RetryPolicy {
                interval: self.retry_interval,
                max_retries: self.max_retries,
            },
        }
    }
}

/// Builder for [`ConvertParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ConvertParamsBuilder {
    params: ConvertParams,
}

impl ConvertParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_rows(mut self, v: usize) -> Self {
        self.params.skip_rows = v;
        self
    }
    pub fn stop_after(mut self, v: usize) -> Self {
        self.params.stop_after = Some(v);
        self
    }
    pub fn columns<S: Into<ColumnName>>(mut self, v: impl IntoIterator<Item = S>) -> Self {
        self.params.columns = Some(v.into_iter().map(Into::into).collect());
        self
    }
    pub fn do_index(mut self, v: bool) -> Self {
        self.params.do_index = v;
        self
    }
    pub fn delegated(mut self, endpoint: &str) -> Self {
        self.params.index_target = IndexTarget::Delegated(endpoint.to_string());
        self
    }
    pub fn index_batch_size(mut self, v: usize) -> Self {
        self.params.index_batch_size = v;
        self
    }
    pub fn retry_interval(mut self, v: Duration) -> Self {
        self.params.retry_interval = v;
        self
    }
    pub fn max_retries(mut self, v: u32) -> Self {
        self.params.max_retries = v;
        self
    }

    /// Validate and return the parameters.
    ///
    /// Return
    /// ----------
    /// * [`SsTableError::InvalidParameter`] for a zero batch size or an empty
    ///   delegated endpoint.
    pub fn build(self) -> Result<ConvertParams, SsTableError> {
        let p = &self.params;
        if p.index_batch_size == 0 {
            return Err(SsTableError::InvalidParameter(
                "index_batch_size must be > 0".into(),
            ));
        }
        if matches!(&p.index_target, IndexTarget::Delegated(e) if e.trim().is_empty()) {
            return Err(SsTableError::InvalidParameter(
                "delegated index endpoint must not be empty".into(),
            ));
        }
        Ok(self.params)
    }
}

/// Input of a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Path(Utf8PathBuf),
    Glob(String),
}

impl InputSource {
    /// A glob if `pattern` holds a glob metacharacter, a plain path otherwise.
    pub fn parse(pattern: &str) -> Self {
        if pattern.contains(['*', '?', '[']) {
            InputSource::Glob(pattern.to_string())
        } else {
            InputSource::Path(pattern.into())
        }
    }

    /// The files to read, in reading order.
    pub fn resolve(&self) -> Result<Vec<Utf8PathBuf>, SsTableError> {
        match self {
            InputSource::Path(path) => {
                if !path.exists() {
                    return Err(SsTableError::InputNotFound(path.clone()));
                }
                Ok(vec![path.clone()])
            }
            InputSource::Glob(pattern) => {
                let entries = glob::glob(pattern).map_err(|e| SsTableError::InvalidGlob {
                    pattern: pattern.clone(),
                    reason: e.msg.to_string(),
                })?;

                let mut paths = Vec::new();
                for entry in entries {
                    let path = entry.map_err(|e| {
                        let path = e.path().display().to_string();
                        SsTableError::InputOpen {
                            path: path.into(),
                            source: e.into_error(),
                        }
                    })?;
                    if !path.is_file() {
                        continue;
                    }
                    let path = Utf8PathBuf::from_path_buf(path)
                        .map_err(|p| SsTableError::NonUtf8Path(p.display().to_string()))?;
                    paths.push(path);
                }

                if paths.is_empty() {
                    log_warn!(component = "converter", event = "empty_glob", pattern = %pattern);
                }
                Ok(paths)
            }
        }
    }
}

/// What a conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub output: Utf8PathBuf,
    pub inputs: usize,
    pub rows_written: u64,
    /// Present when indexing was requested and the table has index columns.
    pub index: Option<IndexReport>,
    /// The sidecar written by this process, if any.
    pub sidecar: Option<Utf8PathBuf>,
}

/// Converts one input source of a [`LineTable`] into an output file.
pub struct FileConverter<'t, T: LineTable + ?Sized> {
    table: &'t T,
    input: InputSource,
    output: Utf8PathBuf,
    params: ConvertParams,
}

impl<'t, T: LineTable + ?Sized> FileConverter<'t, T> {
    pub fn new(
        table: &'t T,
        input: InputSource,
        output: impl Into<Utf8PathBuf>,
        params: ConvertParams,
    ) -> Self {
        FileConverter {
            table,
            input,
            output: output.into(),
            params,
        }
    }

    pub fn run(&self) -> Result<ConversionReport, SsTableError> {
        let paths = self.input.resolve()?;
        let inputs = paths
            .iter()
            .map(|p| MappedFile::open(p))
            .collect::<Result<Vec<_>, _>>()?;

        log_info!(
            component = "converter",
            event = "conversion_started",
            table = self.table.name(),
            inputs = inputs.len(),
            output = %self.output,
        );

        let registry = self.table.schema().resolve(self.params.columns.as_deref());
        let builder = RowBuilder::new(registry, self.params.window());
        let lines = inputs.iter().flat_map(|input| input.lines());
        let rows = builder.build_lines(self.table.interpreter(), lines);

        let mut report = write_table(
            self.table.columns(),
            self.table.index_columns(),
            rows,
            &self.output,
            &self.params,
        )?;
        report.inputs = inputs.len();
        Ok(report)
    }
}

/// Write `rows` to `output`, indexing them as `params` requests.
///
/// Shared by every table builder, so output publication, index publication
/// and cleanup on error behave the same for all of them.
pub(crate) fn write_table<R, I>(
    columns: &Arc<ColumnSet>,
    index_columns: &[IndexColumn],
    rows: I,
    output: &Utf8Path,
    params: &ConvertParams,
) -> Result<ConversionReport, SsTableError>
where
    I: Iterator<Item = Result<LazyRow<R>, SsTableError>>,
{
    let mut writer = TableWriter::create(output, columns.clone())?;
    let mut indexer = if params.do_index && !index_columns.is_empty() {
        Some(open_indexer(output, columns, index_columns, params)?)
    } else {
        None
    };

    let progress = RowProgress::new(columns.table_name());
    let pumped = pump(rows, &mut writer, &mut indexer, &progress);
    progress.finish();

    let committed = pumped.and_then(|()| {
        let rows = writer.rows();
        writer.commit().map(|path| (path, rows))
    });
    let (output, rows_written) = match committed {
        Ok(done) => done,
        Err(e) => {
            if let Some(indexer) = indexer {
                indexer.discard();
            }
            return Err(e);
        }
    };

    let index = indexer.map(Indexer::finish).transpose()?;
    let sidecar = match (&index, &params.index_target) {
        (Some(report), IndexTarget::InProcess) if !report.abandoned => Some(sidecar_path(&output)),
        _ => None,
    };

    log_info!(
        component = "converter",
        event = "conversion_finished",
        output = %output,
        rows = rows_written,
        indexed = sidecar.is_some(),
    );
    Ok(ConversionReport {
        output,
        inputs: 0,
        rows_written,
        index,
        sidecar,
    })
}

fn pump<R, I>(
    rows: I,
    writer: &mut TableWriter,
    indexer: &mut Option<Indexer>,
    progress: &RowProgress,
) -> Result<(), SsTableError>
where
    I: Iterator<Item = Result<LazyRow<R>, SsTableError>>,
{
    for row in rows {
        let row = row?;
        match indexer.as_mut() {
            Some(indexer) => {
                let offset = writer.next_offset();
                writer.write_row(indexer.pass_through(offset, row))?
            }
            None => writer.write_row(row)?,
        };
        progress.inc();
    }
    Ok(())
}

fn open_indexer(
    output: &Utf8Path,
    columns: &ColumnSet,
    index_columns: &[IndexColumn],
    params: &ConvertParams,
) -> Result<Indexer, SsTableError> {
    let sink: Box<dyn IndexSink> = match &params.index_target {
        IndexTarget::InProcess => Box::new(RedbIndexStore::create(
            &sidecar_path(output),
            index_columns,
        )?),
        IndexTarget::Delegated(endpoint) => Box::new(RemoteIndexSink::connect(endpoint)?),
    };
    Indexer::new(sink, columns, index_columns, params.index_settings())
}
