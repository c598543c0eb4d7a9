//! # SSObject: one row per solar-system object
//!
//! SSObject is not converted from a text file. Each of its rows is the join of
//! every DIASource detection of one object with the object's MPCORB orbit, and
//! the conversions read that join.
//!
//! ## Join
//! -----------------
//! [`SsObjectBuilder::run`]:
//!
//! 1. Opens every DIASource output matching the input source as an
//!    [`OpenedTable`], rebuilding missing sidecars.
//! 2. Opens the MPCORB output in its preferred storage mode.
//! 3. Collects the distinct `ssObjectId` keys of all DIASource indexes, sorted
//!    numerically, and applies the `skip_rows` / `stop_after` window to them.
//! 4. For each key, gathers the detections of every file in file order, then
//!    looks the key up in MPCORB. A missing orbit leaves the orbit columns null.
//! 5. Writes the rows with the same writer and optional indexing as
//!    [`FileConverter`](crate::table::FileConverter).
//!
//! See also
//! ------------
//! * [`crate::catalogs::dia_source`] – The detections joined here.
//! * [`crate::catalogs::mpcorb`] – The orbit catalog joined here.
use std::collections::HashSet;
use std::sync::Arc;

use ahash::RandomState;
use camino::Utf8PathBuf;

use crate::index::IndexColumn;
use crate::observability::log_info;
use crate::row::{ConversionError, RowBuilder, RowWindow};
use crate::schema::{Cell, ColumnType, ConversionFn, TableSchema, Value};
use crate::ssfiletable_errors::SsTableError;
use crate::table::converter::write_table;
use crate::table::{
    open_for_lookup, ConversionReport, ConvertParams, InputSource, Lookup, OpenOptions,
    OpenedTable, Row, RowLookup, StorageMode, TableKind,
};

pub const TABLE_NAME: &str = "SSObject";

/// Join key shared by SSObject, DIASource and MPCORB.
pub const OBJECT_KEY: &str = "ssObjectId";

pub const COLUMNS: [(&str, ColumnType); 56] = [
    ("ssObjectId", ColumnType::Int),
    ("discoverySubmissionDate", ColumnType::Float),
    ("firstObservationDate", ColumnType::Float),
    ("arc", ColumnType::Float),
    ("numObs", ColumnType::Int),
    ("lcPeriodic", ColumnType::Str),
    ("MOID", ColumnType::Float),
    ("MOIDTrueAnomaly", ColumnType::Float),
    ("MOIDEclipticLongitude", ColumnType::Float),
    ("MOIDDeltaV", ColumnType::Float),
    ("uH", ColumnType::Float),
    ("uG12", ColumnType::Float),
    ("uHErr", ColumnType::Float),
    ("uG12Err", ColumnType::Float),
    ("uH_uG12_Cov", ColumnType::Float),
    ("uChi2", ColumnType::Float),
    ("uNdata", ColumnType::Int),
    ("gH", ColumnType::Float),
    ("gG12", ColumnType::Float),
    ("gHErr", ColumnType::Float),
    ("gG12Err", ColumnType::Float),
    ("gH_gG12_Cov", ColumnType::Float),
    ("gChi2", ColumnType::Float),
    ("gNdata", ColumnType::Int),
    ("rH", ColumnType::Float),
    ("rG12", ColumnType::Float),
    ("rHErr", ColumnType::Float),
    ("rG12Err", ColumnType::Float),
    ("rH_rG12_Cov", ColumnType::Float),
    ("rChi2", ColumnType::Float),
    ("rNdata", ColumnType::Int),
    ("iH", ColumnType::Float),
    ("iG12", ColumnType::Float),
    ("iHErr", ColumnType::Float),
    ("iG12Err", ColumnType::Float),
    ("iH_iG12_Cov", ColumnType::Float),
    ("iChi2", ColumnType::Float),
    ("iNdata", ColumnType::Int),
    ("zH", ColumnType::Float),
    ("zG12", ColumnType::Float),
    ("zHErr", ColumnType::Float),
    ("zG12Err", ColumnType::Float),
    ("zH_zG12_Cov", ColumnType::Float),
    ("zChi2", ColumnType::Float),
    ("zNdata", ColumnType::Int),
    ("yH", ColumnType::Float),
    ("yG12", ColumnType::Float),
    ("yHErr", ColumnType::Float),
    ("yG12Err", ColumnType::Float),
    ("yH_yG12_Cov", ColumnType::Float),
    ("yChi2", ColumnType::Float),
    ("yNdata", ColumnType::Int),
    ("maxExtendedness", ColumnType::Float),
    ("minExtendedness", ColumnType::Float),
    ("medianExtendedness", ColumnType::Float),
    ("flags", ColumnType::Int),
];

/// Absolute magnitude columns, all taken from the orbit's `mpcH`.
pub const BAND_H_COLUMNS: [&str; 6] = ["uH", "gH", "rH", "iH", "zH", "yH"];

/// The joined input of one SSObject row.
#[derive(Debug, Clone)]
pub struct SsObjectRow {
    pub ss_object_id: String,
    /// DIASource rows of the object, in file then row order.
    pub detections: Vec<Row>,
    /// MPCORB lookup of the object.
    pub orbit: Lookup,
}

fn object_id(row: &SsObjectRow) -> Result<Cell<String>, ConversionError> {
    Ok(Cell::from(row.ss_object_id.as_str()))
}

fn num_obs(row: &SsObjectRow) -> Result<Cell<String>, ConversionError> {
    Ok(Cell::from(row.detections.len().to_string()))
}

/// Time span of the detections; null if any detection has no epoch.
fn arc(row: &SsObjectRow) -> Result<Cell<String>, ConversionError> {
    let epochs: Option<Vec<f64>> = row
        .detections
        .iter()
        .map(|d| d.get("midPointTai").and_then(Cell::value).and_then(Value::as_f64))
        .collect();
    let Some(epochs) = epochs.filter(|e| !e.is_empty()) else {
        return Ok(Cell::Null);
    };
    let (min, max) = epochs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
            (lo.min(t), hi.max(t))
        });
    Ok(Cell::from((max - min).to_string()))
}

fn orbit_h(row: &SsObjectRow) -> Result<Cell<String>, ConversionError> {
    let h = row
        .orbit
        .first()
        .and_then(|orbit| orbit.get("mpcH"))
        .and_then(Cell::value);
    Ok(Cell::from(h.map(Value::to_string)))
}

pub fn schema() -> Result<TableSchema<SsObjectRow>, SsTableError> {
    let h: ConversionFn<SsObjectRow> = Arc::new(orbit_h);
    TableSchema::builder(TABLE_NAME, &COLUMNS)?
        .register(OBJECT_KEY, object_id)?
        .register("numObs", num_obs)?
        .register("arc", arc)?
        .register_shared(&BAND_H_COLUMNS, h)
        .map(|b| b.build())
}

pub struct SsObjectTable {
    schema: TableSchema<SsObjectRow>,
    index_columns: Vec<IndexColumn>,
}

impl TableKind for SsObjectTable {
    type Input = SsObjectRow;

    fn schema(&self) -> &TableSchema<SsObjectRow> {
        &self.schema
    }

    fn index_columns(&self) -> &[IndexColumn] {
        &self.index_columns
    }

    fn storage(&self) -> StorageMode {
        StorageMode::InMemory
    }
}

pub fn table() -> Result<SsObjectTable, SsTableError> {
    Ok(SsObjectTable {
        schema: schema()?,
        index_columns: vec![IndexColumn::unique(OBJECT_KEY)],
    })
}

/// Builds the SSObject output from built DIASource and MPCORB outputs.
pub struct SsObjectBuilder<'t, D: TableKind + ?Sized, M: TableKind + ?Sized> {
    table: &'t SsObjectTable,
    dia_source: &'t D,
    mpcorb: &'t M,
    detections: InputSource,
    orbits: Utf8PathBuf,
    output: Utf8PathBuf,
    params: ConvertParams,
}

impl<'t, D: TableKind + ?Sized, M: TableKind + ?Sized> SsObjectBuilder<'t, D, M> {
    /// Arguments
    /// -----------------
    /// * `detections`: the built DIASource output(s).
    /// * `orbits`: the built MPCORB output.
    /// * `params`: its window applies to the sorted object keys.
    pub fn new(
        table: &'t SsObjectTable,
        dia_source: &'t D,
        mpcorb: &'t M,
        detections: InputSource,
        orbits: impl Into<Utf8PathBuf>,
        output: impl Into<Utf8PathBuf>,
        params: ConvertParams,
    ) -> Self {
        SsObjectBuilder {
            table,
            dia_source,
            mpcorb,
            detections,
            orbits: orbits.into(),
            output: output.into(),
            params,
        }
    }

    pub fn run(&self) -> Result<ConversionReport, SsTableError> {
        let sources = self
            .detections
            .resolve()?
            .iter()
            .map(|path| OpenedTable::open(self.dia_source, path, OpenOptions::default()))
            .collect::<Result<Vec<_>, _>>()?;
        let orbits = open_for_lookup(self.mpcorb, &self.orbits, OpenOptions::default())?;

        let keys = object_keys(&sources)?;
        log_info!(
            component = "ss_object",
            event = "join_started",
            sources = sources.len(),
            objects = keys.len(),
            output = %self.output,
        );

        let joined = self
            .params
            .window()
            .apply(keys.into_iter())
            .map(|key| join(&sources, &orbits, key));

        let registry = self.table.schema().resolve(self.params.columns.as_deref());
        let rows = RowBuilder::new(registry, RowWindow::default()).build(joined);
        let mut report = write_table(
            self.table.columns(),
            self.table.index_columns(),
            rows,
            &self.output,
            &self.params,
        )?;
        report.inputs = sources.len() + 1;
        Ok(report)
    }
}

/// Distinct object keys of all sources: integers ascending, then the rest.
fn object_keys(sources: &[OpenedTable]) -> Result<Vec<String>, SsTableError> {
    let mut seen: HashSet<String, RandomState> = HashSet::default();
    for source in sources {
        seen.extend(source.index_keys(OBJECT_KEY)?);
    }
    let mut keys: Vec<String> = seen.into_iter().collect();
    keys.sort_by_cached_key(|k| (k.parse::<i64>().map_err(|_| ()), k.clone()));
    Ok(keys)
}

fn join(
    sources: &[OpenedTable],
    orbits: &dyn RowLookup,
    key: String,
) -> Result<SsObjectRow, SsTableError> {
    let mut detections = Vec::new();
    for source in sources {
        if let Lookup::Found(rows) = source.get_by_index(OBJECT_KEY, &key)? {
            detections.extend(rows);
        }
    }
    let orbit = orbits.get_by_index(OBJECT_KEY, &key)?;
    Ok(SsObjectRow {
        ss_object_id: key,
        detections,
        orbit,
    })
}
