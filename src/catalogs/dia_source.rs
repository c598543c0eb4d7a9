//! DIASource: one row per detection of a solar-system object.
//!
//! The input is the whitespace-separated detection list of the survey
//! simulator. In some files the `Filtermag` and `V(H=0)` columns are printed
//! back to back; the interpreter splits them at [`FILTERMAG_WIDTH`].
//!
//! This is the largest table of the survey, so it is always opened
//! memory-mapped.
use super::{copy_field, dia_source_id, ss_object_id};
use crate::index::IndexColumn;
use crate::row::{DelimitedInterpreter, Delimiter, GluedField, InputRow};
use crate::schema::{ColumnType, TableSchema};
use crate::ssfiletable_errors::SsTableError;
use crate::table::{DelimitedTable, StorageMode};

pub const TABLE_NAME: &str = "DIASource";

pub type DiaSourceTable = DelimitedTable<DelimitedInterpreter>;

pub const COLUMNS: [(&str, ColumnType); 21] = [
    ("diaSourceId", ColumnType::Int),
    ("ccdVisitId", ColumnType::Int),
    ("diaObjectId", ColumnType::Int),
    ("ssObjectId", ColumnType::Int),
    ("parentDiaSourceId", ColumnType::Int),
    ("prv_procOrder", ColumnType::Int),
    ("ssObjectReassocTime", ColumnType::Int),
    ("midPointTai", ColumnType::Float),
    ("ra", ColumnType::Float),
    ("raSigma", ColumnType::Float),
    ("decl", ColumnType::Float),
    ("filter", ColumnType::Str),
    ("mag", ColumnType::Float),
    ("declSigma", ColumnType::Float),
    ("ra_decl_Cov", ColumnType::Float),
    ("x", ColumnType::Float),
    ("xSigma", ColumnType::Float),
    ("y", ColumnType::Float),
    ("ySigma", ColumnType::Float),
    ("x_y_Cov", ColumnType::Float),
    ("snr", ColumnType::Float),
];

pub const INPUT_FIELDS: [&str; 17] = [
    "ObjID",
    "observationId",
    "FieldMJD",
    "AstRange(km)",
    "AstRangeRate(km/s)",
    "AstRA(deg)",
    "AstRARate(deg/day)",
    "AstDec(deg)",
    "AstDecRate(deg/day)",
    "Ast-Sun(J2000x)(km)",
    "Ast-Sun(J2000y)(km)",
    "Ast-Sun(J2000z)(km)",
    "Sun-Ast-Obs(deg)",
    "V",
    "Filtermag",
    "V(H=0)",
    "Filter",
];

/// Printed width of `Filtermag` when glued to `V(H=0)`.
pub const FILTERMAG_WIDTH: usize = 6;

pub fn schema() -> Result<TableSchema<InputRow>, SsTableError> {
    TableSchema::builder(TABLE_NAME, &COLUMNS)?
        .register("ssObjectId", ss_object_id)?
        .register("diaSourceId", dia_source_id)?
        .register("ccdVisitId", copy_field("observationId"))?
        .register("ra", copy_field("AstRA(deg)"))?
        .register("decl", copy_field("AstDec(deg)"))?
        .register("mag", copy_field("Filtermag"))?
        .register("midPointTai", copy_field("FieldMJD"))?
        .register("filter", copy_field("Filter"))
        .map(|b| b.build())
}

pub fn interpreter() -> DelimitedInterpreter {
    DelimitedInterpreter::new(&INPUT_FIELDS, Delimiter::Whitespace).with_glued_field(GluedField {
        index: 14,
        width: FILTERMAG_WIDTH,
    })
}

pub fn table() -> Result<DiaSourceTable, SsTableError> {
    DelimitedTable::new(
        schema()?,
        interpreter(),
        vec![IndexColumn::unique("diaSourceId"), IndexColumn::multi("ssObjectId")],
        StorageMode::Mapped,
    )
}
