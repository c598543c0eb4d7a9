//! Output file writer.
//!
//! Rows are written unquoted, comma-separated and `\n`-terminated to
//! `<output>.partial`, which is renamed to `<output>` by
//! [`TableWriter::commit`]. A writer dropped before commit removes its
//! staging file, so a failed run never leaves a file that looks complete.
//!
//! The writer tracks the byte offset of every row it writes; these offsets
//! are the locators recorded by the indexer.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::constants::{sidecar_path, staging_path, ByteOffset, NULL_SENTINEL};
use crate::observability::{log_info, log_warn};
use crate::schema::{Cell, ColumnSet};
use crate::ssfiletable_errors::SsTableError;

pub struct TableWriter {
    out: Option<BufWriter<File>>,
    target: Utf8PathBuf,
    staging: Utf8PathBuf,
    columns: Arc<ColumnSet>,
    line: String,
    offset: ByteOffset,
    rows: u64,
}

impl TableWriter {
    /// Start writing `target` and emit its header line.
    ///
    /// A sidecar left next to `target` by an earlier run no longer describes
    /// the new file and is removed.
    pub fn create(target: &Utf8Path, columns: Arc<ColumnSet>) -> Result<Self, SsTableError> {
        let stale = sidecar_path(target);
        if stale.exists() {
            fs::remove_file(&stale)?;
            log_info!(component = "writer", event = "stale_sidecar_removed", path = %stale);
        }

        let staging = staging_path(target);
        let mut out = BufWriter::new(File::create(&staging)?);
        let header = columns.header();
        out.write_all(header.as_bytes())?;
        out.write_all(b"\n")?;

        Ok(TableWriter {
            out: Some(out),
            target: target.to_owned(),
            staging,
            columns,
            line: String::new(),
            offset: header.len() as ByteOffset + 1,
            rows: 0,
        })
    }

    /// Offset the next row will start at.
    pub fn next_offset(&self) -> ByteOffset {
        self.offset
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Write one row and return its starting offset.
    ///
    /// The first `Err` pulled from `cells` is returned as is. A cell holding a
    /// separator or a line break cannot be written unquoted and is an
    /// [`SsTableError::UnencodableCell`].
    pub fn write_row<I>(&mut self, cells: I) -> Result<ByteOffset, SsTableError>
    where
        I: Iterator<Item = Result<Cell<String>, SsTableError>>,
    {
        self.line.clear();
        let mut count = 0;
        for cell in cells {
            let cell = cell?;
            if count > 0 {
                self.line.push(',');
            }
            match &cell {
                Cell::Null => self.line.push_str(NULL_SENTINEL),
                Cell::Value(v) if v.contains([',', '\n', '\r']) => {
                    return Err(SsTableError::UnencodableCell {
                        column: self
                            .columns
                            .columns()
                            .get(count)
                            .map(|c| c.name.clone())
                            .unwrap_or_default(),
                        value: v.clone(),
                    });
                }
                Cell::Value(v) => self.line.push_str(v),
            }
            count += 1;
        }

        if count != self.columns.len() {
            return Err(SsTableError::CorruptRow {
                path: self.target.clone(),
                offset: self.offset,
                reason: format!("{count} cells for {} columns", self.columns.len()),
            });
        }

        self.line.push('\n');
        let Some(out) = self.out.as_mut() else {
            return Err(SsTableError::InvalidParameter(
                "write after commit".into(),
            ));
        };
        out.write_all(self.line.as_bytes())?;

        let start = self.offset;
        self.offset += self.line.len() as ByteOffset;
        self.rows += 1;
        Ok(start)
    }

    /// Flush and move the file to its final path.
    ///
    /// On failure the staging file is removed and nothing is left at either
    /// path.
    pub fn commit(mut self) -> Result<Utf8PathBuf, SsTableError> {
        let Some(out) = self.out.take() else {
            return Ok(self.target.clone());
        };
        let moved = out
            .into_inner()
            .map_err(|e| SsTableError::IoError(e.into_error()))
            .and_then(|file| Ok(file.sync_all()?))
            .and_then(|()| Ok(fs::rename(&self.staging, &self.target)?));
        if let Err(e) = moved {
            self.discard_staging();
            return Err(e);
        }
        Ok(self.target.clone())
    }

    fn discard_staging(&self) {
        if fs::remove_file(&self.staging).is_ok() {
            log_warn!(
                component = "writer",
                event = "output_discarded",
                path = %self.target,
                rows = self.rows,
            );
        }
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        // `out` is only taken by commit
        if self.out.take().is_some() {
            self.discard_staging();
        }
    }
}

#[cfg(test)]
mod writer_test {
    use super::*;
    use crate::schema::ColumnType;

    fn columns() -> Arc<ColumnSet> {
        Arc::new(
            ColumnSet::new("T", &[("id", ColumnType::Int), ("ra", ColumnType::Float)]).unwrap(),
        )
    }

    fn cells(values: &[Option<&str>]) -> impl Iterator<Item = Result<Cell<String>, SsTableError>> {
        values
            .iter()
            .map(|v| Ok(Cell::from(v.map(|s| s.to_string()))))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_offsets_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = Utf8PathBuf::from_path_buf(dir.path().join("out.csv")).unwrap();

        let mut writer = TableWriter::create(&target, columns()).unwrap();
        assert_eq!(writer.next_offset(), 6);
        assert_eq!(writer.write_row(cells(&[Some("1"), Some("50.0")])).unwrap(), 6);
        assert_eq!(writer.write_row(cells(&[Some("2"), None])).unwrap(), 13);
        assert!(!target.exists());
        writer.commit().unwrap();

        let text = std::fs::read_to_string(&target).unwrap();
        assert_eq!(text, "id,ra\n1,50.0\n2,\\N\n");
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_dropped_writer_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = Utf8PathBuf::from_path_buf(dir.path().join("out.csv")).unwrap();
        {
            let mut writer = TableWriter::create(&target, columns()).unwrap();
            let err = writer
                .write_row(cells(&[Some("1"), Some("5,0")]))
                .unwrap_err();
            assert!(matches!(err, SsTableError::UnencodableCell { ref column, .. } if column == "ra"));
        }
        assert!(!target.exists());
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn test_stale_sidecar_removed() {
        let dir = tempfile::tempdir().unwrap();
        let target = Utf8PathBuf::from_path_buf(dir.path().join("out.csv")).unwrap();
        std::fs::write(sidecar_path(&target), b"old").unwrap();
        let writer = TableWriter::create(&target, columns()).unwrap();
        assert!(!sidecar_path(&target).exists());
        writer.commit().unwrap();
    }

    #[test]
    fn test_failed_commit_removes_staging() {
        let dir = tempfile::tempdir().unwrap();
        let target = Utf8PathBuf::from_path_buf(dir.path().join("out.csv")).unwrap();
        // a non-empty directory cannot be replaced by a file
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let mut writer = TableWriter::create(&target, columns()).unwrap();
        writer.write_row(cells(&[Some("1"), Some("50.0")])).unwrap();
        assert!(staging_path(&target).exists());
        assert!(writer.commit().is_err());
        assert!(!staging_path(&target).exists());
        assert!(target.join("keep").exists());
    }
}
