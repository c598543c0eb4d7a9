//! MPCORB: orbital elements of every simulated object, one row per object.
//!
//! The input is the cometary-element orbit file of the simulation. Only the
//! elements that map one-to-one onto MPCORB columns are converted; the mean
//! anomaly, the semi-major axis and the observation statistics are left null.
//!
//! The table is small and joined against for every object, so it is loaded
//! into memory when opened.
use super::{constant, copy_field, object_id_hash};
use crate::index::IndexColumn;
use crate::row::{ConversionError, DelimitedInterpreter, Delimiter, InputRow};
use crate::schema::{Cell, ColumnType, TableSchema};
use crate::ssfiletable_errors::SsTableError;
use crate::table::{DelimitedTable, StorageMode};

pub const TABLE_NAME: &str = "MPCORB";

pub type MpcOrbTable = DelimitedTable<DelimitedInterpreter>;

/// Slope parameter assumed for every simulated object.
pub const DEFAULT_SLOPE_G: &str = "0.15";

pub const COLUMNS: [(&str, ColumnType); 28] = [
    ("mpcDesignation", ColumnType::Str),
    ("mpcNumber", ColumnType::Int),
    ("ssObjectId", ColumnType::Int),
    ("mpcH", ColumnType::Float),
    ("mpcG", ColumnType::Float),
    ("epoch", ColumnType::Float),
    ("M", ColumnType::Float),
    ("peri", ColumnType::Float),
    ("node", ColumnType::Float),
    ("incl", ColumnType::Float),
    ("e", ColumnType::Float),
    ("n", ColumnType::Float),
    ("a", ColumnType::Float),
    ("uncertaintyParameter", ColumnType::Str),
    ("reference", ColumnType::Str),
    ("nobs", ColumnType::Int),
    ("nopp", ColumnType::Int),
    ("arc", ColumnType::Float),
    ("arcStart", ColumnType::Timestamp),
    ("arcEnd", ColumnType::Timestamp),
    ("rms", ColumnType::Float),
    ("pertsShort", ColumnType::Str),
    ("pertsLong", ColumnType::Str),
    ("computer", ColumnType::Str),
    ("flags", ColumnType::Int),
    ("fullDesignation", ColumnType::Str),
    ("lastIncludedObservation", ColumnType::Float),
    ("covariance", ColumnType::FloatSeq),
];

pub const INPUT_FIELDS: [&str; 14] = [
    "S3MID", "FORMAT", "q", "e", "i", "Omega", "argperi", "t_p", "H", "t_0", "INDEX", "N_PAR",
    "MOID", "COMPCODE",
];

/// `ssObjectId` of an orbit: hash of its designation.
fn designation_hash(row: &InputRow) -> Result<Cell<String>, ConversionError> {
    Ok(Cell::from(object_id_hash(row.non_empty("S3MID")?).to_string()))
}

pub fn schema() -> Result<TableSchema<InputRow>, SsTableError> {
    TableSchema::builder(TABLE_NAME, &COLUMNS)?
        .register("mpcDesignation", copy_field("S3MID"))?
        .register("ssObjectId", designation_hash)?
        .register("mpcH", copy_field("H"))?
        .register("mpcG", constant(DEFAULT_SLOPE_G))?
        .register("epoch", copy_field("t_0"))?
        .register("peri", copy_field("argperi"))?
        .register("node", copy_field("Omega"))?
        .register("incl", copy_field("i"))?
        .register("e", copy_field("e"))
        .map(|b| b.build())
}

pub fn interpreter() -> DelimitedInterpreter {
    DelimitedInterpreter::new(&INPUT_FIELDS, Delimiter::Comma)
}

pub fn table() -> Result<MpcOrbTable, SsTableError> {
    DelimitedTable::new(
        schema()?,
        interpreter(),
        vec![
            IndexColumn::unique("mpcDesignation"),
            IndexColumn::unique("ssObjectId"),
        ],
        StorageMode::InMemory,
    )
}

#[cfg(test)]
mod mpcorb_test {
    use super::*;
    use crate::row::RowInterpreter;
    use crate::table::TableKind;

    #[test]
    fn test_orbit_row() {
        let table = table().unwrap();
        assert_eq!(table.storage(), StorageMode::InMemory);

        let registry = table.schema().resolve(None);
        let row = interpreter().interpret(
            "S1000000a,COM,2.1,0.12,5.5,80.1,150.2,59000.5,17.3,59853.0,1,6,0.01,MPCORB".into(),
        );
        let cells: Vec<_> = (0..registry.len())
            .map(|i| registry.convert(i, &row).unwrap())
            .collect();
        let cell = |name: &str| cells[table.columns().position(name).unwrap()].clone();

        assert_eq!(cell("mpcDesignation"), Cell::from("S1000000a"));
        assert_eq!(
            cell("ssObjectId"),
            Cell::from(object_id_hash("S1000000a").to_string())
        );
        assert_eq!(cell("mpcH"), Cell::from("17.3"));
        assert_eq!(cell("mpcG"), Cell::from("0.15"));
        assert_eq!(cell("epoch"), Cell::from("59853.0"));
        assert_eq!(cell("peri"), Cell::from("150.2"));
        assert_eq!(cell("node"), Cell::from("80.1"));
        assert_eq!(cell("incl"), Cell::from("5.5"));
        assert_eq!(cell("e"), Cell::from("0.12"));
        assert_eq!(cell("covariance"), Cell::Null);
        assert_eq!(cell("a"), Cell::Null);
    }
}
