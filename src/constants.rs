//! # Constants and type definitions for ssfiletable
//!
//! Literals shared by the writer, the reader and the indexer, plus the few
//! type aliases that keep signatures readable.
//!
//! ## Overview
//!
//! - The null sentinel written for missing cells
//! - Sidecar and staging file suffixes
//! - Indexer defaults (batch size, retry cadence, delegated endpoint)

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

// -------------------------------------------------------------------------------------------------
// On-disk format
// -------------------------------------------------------------------------------------------------

/// Literal token written for a null cell.
pub const NULL_SENTINEL: &str = "\\N";

/// Field separator of output files.
pub const FIELD_SEPARATOR: u8 = b',';

/// Separator between the elements of a `sequence-of-float` cell.
///
/// Must differ from [`FIELD_SEPARATOR`] since output fields are never quoted.
pub const SEQUENCE_SEPARATOR: char = ';';

/// Suffix appended to an output filename to locate its index.
pub const SIDECAR_SUFFIX: &str = ".sidecar";

/// Suffix of files still being written. They are renamed on success.
pub const STAGING_SUFFIX: &str = ".partial";

// -------------------------------------------------------------------------------------------------
// Indexer defaults
// -------------------------------------------------------------------------------------------------

/// Rows accumulated before the indexer writes to its store.
pub const DEFAULT_INDEX_BATCH_SIZE: usize = 5000;

/// Fixed sleep between two attempts when the index store is busy.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Attempts made on a busy index store before the index is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 200;

/// Local endpoint of the delegated index server.
pub const DEFAULT_INDEX_ENDPOINT: &str = "127.0.0.1:8391";

/// The index server reports progress every time this many entries arrive.
pub const SERVER_PROGRESS_EVERY: u64 = 100_000;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Name of an output column
pub type ColumnName = String;

/// Name of a field of the input layout
pub type FieldName = String;

/// Byte offset of the first byte of a row in an output file
pub type ByteOffset = u64;

/// Path of the sidecar index belonging to `output`.
pub fn sidecar_path(output: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{output}{SIDECAR_SUFFIX}"))
}

/// Path used while `target` is still being written.
pub fn staging_path(target: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{target}{STAGING_SUFFIX}"))
}

#[cfg(test)]
mod constants_test {
    use super::*;

    #[test]
    fn test_sidecar_is_appended() {
        let out = Utf8Path::new("/data/dia_source.csv");
        assert_eq!(sidecar_path(out).as_str(), "/data/dia_source.csv.sidecar");
        assert_eq!(
            staging_path(&sidecar_path(out)).as_str(),
            "/data/dia_source.csv.sidecar.partial"
        );
    }
}
