//! # Table schemas and conversion registries
//!
//! A [`TableSchema`] is the ordered list of typed output columns of one table
//! kind together with its **registry**: a map from column name to the
//! conversion function computing that column from one input row.
//!
//! ## Registration
//! -----------------
//! Registries are filled through a [`SchemaBuilder`] and frozen by
//! [`SchemaBuilder::build`]. Because a [`TableSchema`] can only be obtained from
//! a finished builder, every registration is applied before the first row of
//! the table is processed.
//!
//! * Registering a column that the schema does not declare is a configuration
//!   error ([`SsTableError::UnknownColumn`]).
//! * Registering the same column twice keeps the **last** function; catalog
//!   modules rely on it to replace placeholder conversions.
//! * A column without a function always produces the null sentinel.
//!
//! ## Resolution
//! -----------------
//! [`TableSchema::resolve`] turns the registry into a [`ResolvedRegistry`]:
//! one slot per column, in schema order, optionally restricted to a subset of
//! columns. Columns outside the subset, or unknown to the registry, resolve to
//! the null-producing slot.
//!
//! ## Example
//! -----------------
//! ```rust
//! use ssfiletable::row::InputRow;
//! use ssfiletable::schema::{Cell, ColumnType, TableSchema};
//!
//! let schema = TableSchema::<InputRow>::builder(
//!     "Tiny",
//!     &[("id", ColumnType::Int), ("ra", ColumnType::Float)],
//! )
//! .unwrap()
//! .register("ra", |row: &InputRow| Ok(Cell::from(row.field("AstRA(deg)")?)))
//! .unwrap()
//! .build();
//!
//! assert!(schema.is_registered("ra"));
//! assert!(!schema.is_registered("id"));
//! ```
pub mod cell;

use std::sync::Arc;

use ahash::RandomState;
use std::collections::HashMap;

pub use cell::{Cell, ColumnType, Value};

use crate::constants::{ColumnName, NULL_SENTINEL};
use crate::observability::log_warn;
use crate::row::ConversionError;
use crate::ssfiletable_errors::SsTableError;

/// A pluggable conversion from one input row to one output cell.
pub type ConversionFn<R> = Arc<dyn Fn(&R) -> Result<Cell<String>, ConversionError> + Send + Sync>;

/// Name and declared type of an output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: ColumnName,
    pub column_type: ColumnType,
}

/// The ordered columns of a table, with a name → position lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSet {
    table: String,
    columns: Vec<ColumnDef>,
    positions: HashMap<ColumnName, usize, RandomState>,
}

impl ColumnSet {
    /// Declare the columns of `table`, in on-disk order.
    ///
    /// Return
    /// ----------
    /// * [`SsTableError::DuplicateColumn`] if a name appears twice.
    pub fn new(table: &str, defs: &[(&str, ColumnType)]) -> Result<Self, SsTableError> {
        let mut positions = HashMap::with_capacity_and_hasher(defs.len(), RandomState::default());
        let mut columns = Vec::with_capacity(defs.len());

        for (pos, (name, column_type)) in defs.iter().enumerate() {
            if positions.insert(name.to_string(), pos).is_some() {
                return Err(SsTableError::DuplicateColumn {
                    table: table.to_string(),
                    column: name.to_string(),
                });
            }
            columns.push(ColumnDef {
                name: name.to_string(),
                column_type: *column_type,
            });
        }

        Ok(ColumnSet {
            table: table.to_string(),
            columns,
            positions,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Position of `name`, or a configuration error naming the table.
    pub fn require(&self, name: &str) -> Result<usize, SsTableError> {
        self.position(name)
            .ok_or_else(|| SsTableError::UnknownColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }

    /// The header line of an output file, without terminator.
    pub fn header(&self) -> String {
        self.names().collect::<Vec<_>>().join(",")
    }

    /// Cast the raw token of the column at `position`.
    ///
    /// The null sentinel decodes to [`Cell::Null`] whatever the column type.
    pub fn decode_cell(&self, position: usize, raw: &str) -> Result<Cell<Value>, SsTableError> {
        let Some(column) = self.columns.get(position) else {
            return Err(SsTableError::RowWidth {
                table: self.table_name().to_string(),
                expected: self.len(),
                found: position + 1,
            });
        };
        if raw == NULL_SENTINEL {
            return Ok(Cell::Null);
        }
        column
            .column_type
            .decode(raw)
            .map(Cell::Value)
            .ok_or_else(|| SsTableError::Decode {
                column: column.name.clone(),
                column_type: column.column_type.name(),
                value: raw.to_string(),
            })
    }
}

/// Columns of one table kind plus the conversion registered for each column.
///
/// `R` is the input row type the conversions read from.
pub struct TableSchema<R> {
    columns: Arc<ColumnSet>,
    registry: HashMap<ColumnName, ConversionFn<R>, RandomState>,
}

impl<R> TableSchema<R> {
    /// Start declaring a schema. See [`SchemaBuilder`].
    pub fn builder(
        table: &str,
        defs: &[(&str, ColumnType)],
    ) -> Result<SchemaBuilder<R>, SsTableError> {
        Ok(SchemaBuilder {
            columns: ColumnSet::new(table, defs)?,
            registry: HashMap::default(),
        })
    }

    pub fn name(&self) -> &str {
        self.columns.table_name()
    }

    pub fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    pub fn is_registered(&self, column: &str) -> bool {
        self.registry.contains_key(column)
    }

    /// One conversion slot per column, in schema order.
    ///
    /// Arguments
    /// -----------------
    /// * `subset`: when given, only these columns keep their conversion; every
    ///   other column resolves to the null slot. Names the schema does not
    ///   declare are ignored with a warning.
    pub fn resolve(&self, subset: Option<&[ColumnName]>) -> ResolvedRegistry<R> {
        if let Some(subset) = subset {
            for name in subset.iter().filter(|n| self.columns.position(n).is_none()) {
                log_warn!(
                    component = "schema",
                    event = "unknown_subset_column",
                    table = self.name(),
                    column = %name,
                );
            }
        }

        let slots = self
            .columns
            .names()
            .map(|name| {
                let selected = subset.map_or(true, |s| s.iter().any(|c| c == name));
                if selected {
                    self.registry.get(name).cloned()
                } else {
                    None
                }
            })
            .collect();

        ResolvedRegistry {
            columns: self.columns.clone(),
            slots,
        }
    }
}

/// Fluent registration of conversion functions, frozen by [`Self::build`].
pub struct SchemaBuilder<R> {
    columns: ColumnSet,
    registry: HashMap<ColumnName, ConversionFn<R>, RandomState>,
}

impl<R> SchemaBuilder<R> {
    /// Bind `function` to `column`. A later registration for the same column wins.
    pub fn register<F>(self, column: &str, function: F) -> Result<Self, SsTableError>
    where
        F: Fn(&R) -> Result<Cell<String>, ConversionError> + Send + Sync + 'static,
    {
        self.register_shared(&[column], Arc::new(function))
    }

    /// Bind one function to several columns.
    pub fn register_shared(
        mut self,
        columns: &[&str],
        function: ConversionFn<R>,
    ) -> Result<Self, SsTableError> {
        for column in columns {
            self.columns.require(column)?;
            self.registry.insert(column.to_string(), function.clone());
        }
        Ok(self)
    }

    pub fn build(self) -> TableSchema<R> {
        TableSchema {
            columns: Arc::new(self.columns),
            registry: self.registry,
        }
    }
}

/// The registry laid out by column position, ready for the row builder.
pub struct ResolvedRegistry<R> {
    columns: Arc<ColumnSet>,
    slots: Vec<Option<ConversionFn<R>>>,
}

impl<R> ResolvedRegistry<R> {
    pub fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Compute the cell of the column at `position` for `row`.
    ///
    /// A missing slot, a missing or empty input field, or a returned `\N`
    /// all give [`Cell::Null`]. Any other conversion failure is an error
    /// naming the column.
    pub fn convert(&self, position: usize, row: &R) -> Result<Cell<String>, SsTableError> {
        let Some(function) = &self.slots[position] else {
            return Ok(Cell::Null);
        };

        match function(row) {
            Ok(Cell::Value(v)) if v == NULL_SENTINEL => Ok(Cell::Null),
            Ok(cell) => Ok(cell),
            Err(e) if e.yields_null() => Ok(Cell::Null),
            Err(e) => Err(SsTableError::Conversion {
                column: self.columns.columns()[position].name.clone(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod schema_test {
    use super::*;

    type Row = Vec<(&'static str, &'static str)>;

    fn lookup<'a>(row: &'a Row, key: &str) -> Result<&'a str, ConversionError> {
        row.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| ConversionError::MissingField(key.to_string()))
    }

    fn defs() -> Vec<(&'static str, ColumnType)> {
        vec![
            ("id", ColumnType::Int),
            ("ra", ColumnType::Float),
            ("decl", ColumnType::Float),
        ]
    }

    #[test]
    fn test_register_unknown_column_fails() {
        let result = TableSchema::<Row>::builder("T", &defs())
            .unwrap()
            .register("dec", |_| Ok(Cell::Null));
        assert!(matches!(
            result,
            Err(SsTableError::UnknownColumn { ref column, .. }) if column == "dec"
        ));
    }

    #[test]
    fn test_duplicate_declaration_fails() {
        let result = TableSchema::<Row>::builder(
            "T",
            &[("id", ColumnType::Int), ("id", ColumnType::Float)],
        );
        assert!(matches!(result, Err(SsTableError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_last_registration_wins() {
        let schema = TableSchema::<Row>::builder("T", &defs())
            .unwrap()
            .register("ra", |_| Ok(Cell::from("placeholder")))
            .unwrap()
            .register("ra", |row| Ok(Cell::from(lookup(row, "AstRA(deg)")?)))
            .unwrap()
            .build();

        let row: Row = vec![("AstRA(deg)", "50.0")];
        let registry = schema.resolve(None);
        assert_eq!(registry.convert(1, &row).unwrap(), Cell::from("50.0"));
    }

    #[test]
    fn test_resolve_keeps_schema_order_and_nulls() {
        let schema = TableSchema::<Row>::builder("T", &defs())
            .unwrap()
            .register("decl", |row| Ok(Cell::from(lookup(row, "AstDec(deg)")?)))
            .unwrap()
            .register("ra", |row| Ok(Cell::from(lookup(row, "AstRA(deg)")?)))
            .unwrap()
            .build();

        let row: Row = vec![("AstRA(deg)", "10.5"), ("AstDec(deg)", "-3.25")];
        let registry = schema.resolve(None);
        let cells: Vec<_> = (0..registry.len())
            .map(|i| registry.convert(i, &row).unwrap())
            .collect();
        assert_eq!(
            cells,
            vec![Cell::Null, Cell::from("10.5"), Cell::from("-3.25")]
        );

        let subset = registry_subset(&schema, &["decl", "nope"]);
        let cells: Vec<_> = (0..subset.len())
            .map(|i| subset.convert(i, &row).unwrap())
            .collect();
        assert_eq!(cells, vec![Cell::Null, Cell::Null, Cell::from("-3.25")]);
    }

    fn registry_subset(schema: &TableSchema<Row>, names: &[&str]) -> ResolvedRegistry<Row> {
        let names: Vec<ColumnName> = names.iter().map(|s| s.to_string()).collect();
        schema.resolve(Some(&names))
    }

    #[test]
    fn test_missing_field_is_null_malformed_is_error() {
        let schema = TableSchema::<Row>::builder("T", &defs())
            .unwrap()
            .register("ra", |row| Ok(Cell::from(lookup(row, "AstRA(deg)")?)))
            .unwrap()
            .register("decl", |row| {
                let raw = lookup(row, "AstDec(deg)")?;
                raw.parse::<f64>()
                    .map_err(|e| ConversionError::Malformed {
                        field: "AstDec(deg)".into(),
                        value: raw.into(),
                        reason: e.to_string(),
                    })
                    .map(|v| Cell::from(format!("{v}")))
            })
            .unwrap()
            .build();

        let registry = schema.resolve(None);
        let row: Row = vec![("AstDec(deg)", "abc")];
        assert_eq!(registry.convert(1, &row).unwrap(), Cell::Null);
        assert!(matches!(
            registry.convert(2, &row),
            Err(SsTableError::Conversion { ref column, .. }) if column == "decl"
        ));
    }

    #[test]
    fn test_decode_cell_null_sentinel() {
        let columns = ColumnSet::new("T", &defs()).unwrap();
        assert_eq!(columns.decode_cell(2, "\\N").unwrap(), Cell::Null);
        assert_eq!(
            columns.decode_cell(0, "17").unwrap(),
            Cell::Value(Value::Int(17))
        );
        assert!(matches!(
            columns.decode_cell(0, "x"),
            Err(SsTableError::Decode { .. })
        ));
        assert_eq!(columns.header(), "id,ra,decl");
    }
}
