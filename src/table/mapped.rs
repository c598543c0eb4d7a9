use std::fs::File;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use memmap2::Mmap;

use crate::row::MappedLines;
use crate::ssfiletable_errors::SsTableError;

/// A read-only memory map over a file.
///
/// The map is declared before the file so it is released first. An empty file
/// has no map and reads as an empty slice.
pub struct MappedFile {
    mmap: Option<Mmap>,
    _file: File,
    path: Utf8PathBuf,
}

impl MappedFile {
    /// Map `path`. A missing file is [`SsTableError::InputNotFound`].
    pub fn open(path: &Utf8Path) -> Result<Self, SsTableError> {
        let open_error = |source: std::io::Error| match source.kind() {
            ErrorKind::NotFound => SsTableError::InputNotFound(path.to_owned()),
            _ => SsTableError::InputOpen {
                path: path.to_owned(),
                source,
            },
        };

        let file = File::open(path).map_err(open_error)?;
        let len = file.metadata().map_err(open_error)?.len();
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: the map is read-only; the crate never writes to a file it has mapped.
            Some(unsafe { Mmap::map(&file) }.map_err(open_error)?)
        };

        Ok(MappedFile {
            mmap,
            _file: file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn lines(&self) -> MappedLines<'_> {
        MappedLines::new(&self.path, self.bytes())
    }
}
