//! Input rows, their interpretation, and the streaming row builder.
pub mod input_row;
pub mod interpreter;
pub mod row_builder;

pub use input_row::{ConversionError, InputRow, InputSchema};
pub use interpreter::{DelimitedInterpreter, Delimiter, GluedField, RowInterpreter};
pub use row_builder::{
    build_rows, LazyRow, LineRows, MappedLines, RowBuilder, RowWindow, SourceLine,
};
