//! SSSource: per-detection quantities computed for known solar-system objects.
//!
//! Comma-separated input. The ecliptic and galactic coordinate columns have
//! no conversion here and are written as null.
use super::{constant, copy_field, dia_source_id, ss_object_id};
use crate::index::IndexColumn;
use crate::row::{ConversionError, DelimitedInterpreter, Delimiter, InputRow};
use crate::schema::{Cell, ColumnType, TableSchema};
use crate::ssfiletable_errors::SsTableError;
use crate::table::{DelimitedTable, StorageMode};

pub const TABLE_NAME: &str = "SSSource";

pub type SsSourceTable = DelimitedTable<DelimitedInterpreter>;

/// Milliarcseconds to degrees.
pub const MAS_TO_DEG: f64 = 2.777_777_777_777_8e-7;

pub const COLUMNS: [(&str, ColumnType); 19] = [
    ("ssObjectId", ColumnType::Int),
    ("diaSourceId", ColumnType::Int),
    ("eclipticLambda", ColumnType::Float),
    ("eclipticBeta", ColumnType::Float),
    ("galacticL", ColumnType::Float),
    ("galacticB", ColumnType::Float),
    ("phaseAngle", ColumnType::Float),
    ("heliocentricDist", ColumnType::Float),
    ("topocentricDist", ColumnType::Float),
    ("predictedMagnitude", ColumnType::Float),
    ("predictedMagnitudeSigma", ColumnType::Float),
    ("residualRa", ColumnType::Float),
    ("residualDec", ColumnType::Float),
    ("predictedRaSigma", ColumnType::Float),
    ("predictedDecSigma", ColumnType::Float),
    ("predictedRaDecCov", ColumnType::Float),
    ("heliocentricX", ColumnType::Float),
    ("heliocentricY", ColumnType::Float),
    ("heliocentricZ", ColumnType::Float),
];

pub const INPUT_FIELDS: [&str; 20] = [
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
    "AstRASigma(mas)",
    "AstDecSigma(mas)",
    "PhotometricSigma(mag)",
];

/// Norm of the heliocentric position; null if any component is empty.
fn heliocentric_dist(row: &InputRow) -> Result<Cell<String>, ConversionError> {
    let x = row.parse_f64("Ast-Sun(J2000x)(km)")?;
    let y = row.parse_f64("Ast-Sun(J2000y)(km)")?;
    let z = row.parse_f64("Ast-Sun(J2000z)(km)")?;
    Ok(Cell::from((x * x + y * y + z * z).sqrt().to_string()))
}

fn mas_to_deg(
    field: &'static str,
) -> impl Fn(&InputRow) -> Result<Cell<String>, ConversionError> + Send + Sync + 'static {
    move |row: &InputRow| Ok(Cell::from((row.parse_f64(field)? * MAS_TO_DEG).to_string()))
}

pub fn schema() -> Result<TableSchema<InputRow>, SsTableError> {
    TableSchema::builder(TABLE_NAME, &COLUMNS)?
        .register("ssObjectId", ss_object_id)?
        .register("diaSourceId", dia_source_id)?
        .register("phaseAngle", copy_field("Sun-Ast-Obs(deg)"))?
        .register("heliocentricDist", heliocentric_dist)?
        .register("topocentricDist", copy_field("AstRange(km)"))?
        .register("predictedMagnitude", copy_field("V"))?
        .register("predictedMagnitudeSigma", copy_field("PhotometricSigma(mag)"))?
        .register("residualRa", constant("0"))?
        .register("residualDec", constant("0"))?
        .register("predictedRaSigma", mas_to_deg("AstRASigma(mas)"))?
        .register("predictedDecSigma", mas_to_deg("AstDecSigma(mas)"))?
        .register("heliocentricX", copy_field("Ast-Sun(J2000x)(km)"))?
        .register("heliocentricY", copy_field("Ast-Sun(J2000y)(km)"))?
        .register("heliocentricZ", copy_field("Ast-Sun(J2000z)(km)"))
        .map(|b| b.build())
}

pub fn interpreter() -> DelimitedInterpreter {
    DelimitedInterpreter::new(&INPUT_FIELDS, Delimiter::Comma)
}

pub fn table() -> Result<SsSourceTable, SsTableError> {
    DelimitedTable::new(
        schema()?,
        interpreter(),
        vec![IndexColumn::multi("ssObjectId")],
        StorageMode::Mapped,
    )
}
