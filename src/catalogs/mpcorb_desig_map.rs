//! MPCORBDESIGMAP: alternative designations of the MPCORB objects.
//!
//! The input already carries the output columns, so every column is a plain
//! copy of the input field of the same name.
use super::copy_field;
use crate::row::{DelimitedInterpreter, Delimiter, InputRow};
use crate::schema::{ColumnType, TableSchema};
use crate::ssfiletable_errors::SsTableError;
use crate::table::{DelimitedTable, StorageMode};

pub const TABLE_NAME: &str = "MPCORBDESIGMAP";

pub type MpcOrbDesigMapTable = DelimitedTable<DelimitedInterpreter>;

pub const COLUMNS: [(&str, ColumnType); 4] = [
    ("mpcDesignation", ColumnType::Str),
    ("mpcNumber", ColumnType::Int),
    ("otherDesignation", ColumnType::Str),
    ("ssObjectId", ColumnType::Int),
];

pub fn schema() -> Result<TableSchema<InputRow>, SsTableError> {
    COLUMNS
        .iter()
        .try_fold(
            TableSchema::builder(TABLE_NAME, &COLUMNS)?,
            |builder, &(name, _)| builder.register(name, copy_field(name)),
        )
        .map(|b| b.build())
}

pub fn interpreter() -> DelimitedInterpreter {
    let fields: Vec<&str> = COLUMNS.iter().map(|(name, _)| *name).collect();
    DelimitedInterpreter::new(&fields, Delimiter::Comma)
}

pub fn table() -> Result<MpcOrbDesigMapTable, SsTableError> {
    DelimitedTable::new(schema()?, interpreter(), Vec::new(), StorageMode::InMemory)
}
