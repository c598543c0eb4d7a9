//! # Survey table catalog
//!
//! The concrete table kinds of the solar-system survey pipeline. Each module
//! declares its output schema, its input layout and the conversions registered
//! for it, and exposes a `table()` constructor returning the assembled kind.
//!
//! | Module                  | Input                     | Index columns                            | Storage   |
//! |-------------------------|---------------------------|------------------------------------------|-----------|
//! | [`dia_source`]          | whitespace, glued fields  | `diaSourceId` (unique), `ssObjectId`     | mapped    |
//! | [`ss_source`]           | comma                     | `ssObjectId`                             | mapped    |
//! | [`mpcorb`]              | comma                     | `mpcDesignation`, `ssObjectId` (unique)  | in-memory |
//! | [`mpcorb_desig_map`]    | comma                     | none                                     | in-memory |
//! | [`ss_object`]           | join of the above         | `ssObjectId` (unique)                    | in-memory |
//!
//! Columns without a registered conversion are written as `\N`.
//!
//! Identifiers
//! -----------------
//! `ssObjectId` and `diaSourceId` come from [`object_id_hash`], which reduces
//! a SHA-256 digest. Catalogs produced by tools hashing with SHA-1 carry
//! different ids for the same objects, so their tables cannot be joined with
//! ours on these columns.
pub mod dia_source;
pub mod mpcorb;
pub mod mpcorb_desig_map;
pub mod ss_object;
pub mod ss_source;

use sha2::{Digest, Sha256};

use crate::row::{ConversionError, InputRow};
use crate::schema::Cell;

/// Placeholder object ids of the simulation that do not name an object.
const PLACEHOLDER_OBJECT_IDS: [&str; 2] = ["FD", "NS"];

/// Integer identifier derived from a simulation object id.
///
/// The SHA-256 digest of `value`, read as a big-endian integer, modulo
/// `i64::MAX`. Collisions are possible but not expected at survey scale.
/// Ids are not interchangeable with SHA-1 based ids, see the module docs.
pub fn object_id_hash(value: &str) -> i64 {
    let modulus = i64::MAX as u128;
    let reduced = Sha256::digest(value.as_bytes())
        .iter()
        .fold(0u128, |acc, &byte| ((acc << 8) | byte as u128) % modulus);
    reduced as i64
}

/// `ssObjectId` of a detection: hash of `ObjID`, null for placeholders.
pub(crate) fn ss_object_id(row: &InputRow) -> Result<Cell<String>, ConversionError> {
    let id = row.non_empty("ObjID")?;
    if PLACEHOLDER_OBJECT_IDS.contains(&id) {
        return Ok(Cell::Null);
    }
    Ok(Cell::from(object_id_hash(id).to_string()))
}

/// `diaSourceId` of a detection: hash of `ObjID`, RA and Dec concatenated.
pub(crate) fn dia_source_id(row: &InputRow) -> Result<Cell<String>, ConversionError> {
    let key = format!(
        "{}{}{}",
        row.field("ObjID")?,
        row.field("AstRA(deg)")?,
        row.field("AstDec(deg)")?
    );
    Ok(Cell::from(object_id_hash(&key).to_string()))
}

/// Conversion copying input field `field` unchanged; empty gives null.
pub(crate) fn copy_field(
    field: &'static str,
) -> impl Fn(&InputRow) -> Result<Cell<String>, ConversionError> + Send + Sync + 'static {
    move |row: &InputRow| Ok(Cell::from(row.non_empty(field)?))
}

/// Conversion writing the same literal for every row.
pub(crate) fn constant(
    value: &'static str,
) -> impl Fn(&InputRow) -> Result<Cell<String>, ConversionError> + Send + Sync + 'static {
    move |_: &InputRow| Ok(Cell::from(value))
}
