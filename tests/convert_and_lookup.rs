mod common;

use std::fs;

use approx::assert_relative_eq;
use common::{dia_file, dia_line, key, orbit_file, orbit_line, Workspace};
use ssfiletable::catalogs::{dia_source, mpcorb, ss_source};
use ssfiletable::constants::{sidecar_path, staging_path};
use ssfiletable::schema::{Cell, Value};
use ssfiletable::table::{
    open_for_lookup, AnyTable, ConvertParams, FileConverter, InputSource, Lookup, OpenOptions,
    OpenedTable, RowLookup,
};
use ssfiletable::SsTableError;

fn convert_dia(ws: &Workspace, input: &str, output: &str, params: ConvertParams) -> Result<u64, SsTableError> {
    let table = dia_source::table()?;
    let report = FileConverter::new(
        &table,
        InputSource::parse(ws.path(input).as_str()),
        ws.path(output),
        params,
    )
    .run()?;
    Ok(report.rows_written)
}

fn indexed() -> ConvertParams {
    ConvertParams::builder().skip_rows(1).do_index(true).build().unwrap()
}

fn ra(row: &ssfiletable::table::Row) -> f64 {
    row.get("ra").and_then(Cell::value).and_then(Value::as_f64).unwrap()
}

#[test]
fn test_convert_then_lookup_multi_rows_in_order() {
    let ws = Workspace::new();
    ws.write(
        "night.txt",
        &dia_file(&[
            dia_line("S1", 1, "59853.1", "10.5", "-3.25", "r"),
            dia_line("S2", 1, "59853.1", "11.0", "-2.0", "g"),
            dia_line("S1", 2, "59854.1", "10.75", "-3.5", "i"),
        ]),
    );

    let rows = convert_dia(&ws, "night.txt", "dia.csv", indexed()).unwrap();
    assert_eq!(rows, 3);
    assert!(sidecar_path(&ws.path("dia.csv")).exists());
    assert!(!staging_path(&ws.path("dia.csv")).exists());

    let kind = dia_source::table().unwrap();
    let table = OpenedTable::open(&kind, &ws.path("dia.csv"), OpenOptions::default()).unwrap();
    assert!(table.has_index());

    let Lookup::Found(found) = table.get_by_index("ssObjectId", &key("S1")).unwrap() else {
        panic!("S1 not found");
    };
    assert_eq!(found.len(), 2);
    assert_relative_eq!(ra(&found[0]), 10.5);
    assert_relative_eq!(ra(&found[1]), 10.75);

    assert_eq!(
        table.get_by_index("ssObjectId", &key("S3")).unwrap(),
        Lookup::NoMatch
    );
    assert_eq!(table.iter().count(), 3);
}

#[test]
fn test_locators_point_at_the_exact_row_bytes() {
    let ws = Workspace::new();
    ws.write(
        "night.txt",
        &dia_file(&[
            dia_line("S1", 1, "59853.1", "10.5", "-3.25", "r"),
            dia_line("S2", 1, "59853.1", "11.0", "-2.0", "g"),
        ]),
    );
    convert_dia(&ws, "night.txt", "dia.csv", indexed()).unwrap();

    let written = ws.read("dia.csv");
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);

    let kind = dia_source::table().unwrap();
    let table = OpenedTable::open(&kind, &ws.path("dia.csv"), OpenOptions::default()).unwrap();
    for (object, line) in [("S1", lines[1]), ("S2", lines[2])] {
        let offsets = table.locator("ssObjectId", &key(object)).unwrap();
        assert_eq!(offsets.len(), 1);
        assert_eq!(table.raw_line_at(offsets[0]).unwrap(), line.as_bytes());
    }
    assert_eq!(
        table.locator("ssObjectId", &key("S1")).unwrap()[0] as usize,
        lines[0].len() + 1
    );
}

#[test]
fn test_rebuilt_index_matches_the_written_one() {
    let ws = Workspace::new();
    ws.write(
        "night.txt",
        &dia_file(&[
            dia_line("S1", 1, "59853.1", "10.5", "-3.25", "r"),
            dia_line("S2", 1, "59853.1", "11.0", "-2.0", "g"),
            dia_line("S1", 2, "59854.1", "10.75", "-3.5", "i"),
        ]),
    );
    convert_dia(&ws, "night.txt", "dia.csv", indexed()).unwrap();

    let kind = dia_source::table().unwrap();
    let output = ws.path("dia.csv");
    let snapshot = |table: &OpenedTable| {
        let mut keys = table.index_keys("ssObjectId").unwrap();
        keys.sort();
        keys.into_iter()
            .map(|k| (k.clone(), table.locator("ssObjectId", &k).unwrap().to_vec()))
            .collect::<Vec<_>>()
    };

    let written = {
        let table = OpenedTable::open(&kind, &output, OpenOptions::default()).unwrap();
        snapshot(&table)
    };
    fs::remove_file(sidecar_path(&output)).unwrap();

    let unindexed = OpenedTable::open(&kind, &output, OpenOptions::default().rebuild_index(false)).unwrap();
    assert!(!unindexed.has_index());
    assert!(!sidecar_path(&output).exists());
    assert_eq!(
        unindexed.get_by_index("ssObjectId", &key("S1")).unwrap().rows().len(),
        2
    );
    drop(unindexed);

    let rebuilt = OpenedTable::open(&kind, &output, OpenOptions::default()).unwrap();
    assert!(rebuilt.has_index());
    assert!(sidecar_path(&output).exists());
    assert_eq!(snapshot(&rebuilt), written);
}

#[test]
fn test_window_and_newline_sentinel() {
    let ws = Workspace::new();
    let lines: Vec<String> = (0..5)
        .map(|i| dia_line(&format!("S{i}"), i, "59853.1", "10.5", "-3.25", "r"))
        .collect();
    ws.write("night.txt", &dia_file(&lines));

    let params = ConvertParams::builder().skip_rows(2).stop_after(2).build().unwrap();
    assert_eq!(convert_dia(&ws, "night.txt", "window.csv", params).unwrap(), 2);
    let written = ws.read("window.csv");
    assert!(written.lines().nth(1).unwrap().contains(&key("S1")));

    let mut content = dia_file(&lines[..2]);
    content.push('\n');
    content.push_str(&lines[2]);
    content.push('\n');
    ws.write("stopped.txt", &content);
    assert_eq!(
        convert_dia(&ws, "stopped.txt", "stopped.csv", ConvertParams::builder().skip_rows(1).build().unwrap()).unwrap(),
        2
    );
}

#[test]
fn test_empty_glob_writes_a_header_only_output() {
    let ws = Workspace::new();
    let table = dia_source::table().unwrap();
    let report = FileConverter::new(
        &table,
        InputSource::Glob(format!("{}/night_*.txt", ws.root())),
        ws.path("empty.csv"),
        indexed(),
    )
    .run()
    .unwrap();

    assert_eq!(report.inputs, 0);
    assert_eq!(report.rows_written, 0);
    assert_eq!(ws.read("empty.csv"), format!("{}\n", dia_source::COLUMNS.map(|(c, _)| c).join(",")));

    let opened = OpenedTable::open(&table, &ws.path("empty.csv"), OpenOptions::default()).unwrap();
    assert!(opened.index_keys("ssObjectId").unwrap().is_empty());
    assert_eq!(opened.iter().count(), 0);
}

#[test]
fn test_glob_chains_files_in_order() {
    let ws = Workspace::new();
    ws.write("night_1.txt", &format!("{}\n", dia_line("S1", 1, "59853.1", "10.5", "-3.25", "r")));
    ws.write("night_2.txt", &format!("{}\n", dia_line("S1", 2, "59854.1", "10.75", "-3.5", "r")));

    let table = dia_source::table().unwrap();
    let params = ConvertParams::builder().do_index(true).build().unwrap();
    let report = FileConverter::new(
        &table,
        InputSource::Glob(format!("{}/night_*.txt", ws.root())),
        ws.path("dia.csv"),
        params,
    )
    .run()
    .unwrap();
    assert_eq!(report.inputs, 2);
    assert_eq!(report.rows_written, 2);

    let opened = OpenedTable::open(&table, &ws.path("dia.csv"), OpenOptions::default()).unwrap();
    let rows = opened.get_by_index("ssObjectId", &key("S1")).unwrap();
    let visits: Vec<_> = rows
        .rows()
        .iter()
        .map(|r| r.get("ccdVisitId").cloned().unwrap())
        .collect();
    assert_eq!(visits, vec![Cell::Value(Value::Int(1)), Cell::Value(Value::Int(2))]);
}

#[test]
fn test_nulls_are_written_and_not_indexed() {
    let ws = Workspace::new();
    let short = "S1 1 59853.1 1.5e8 3.2 10.5 0.1 -3.25 0.2 1e8 2e8 3e8 12.3 21.5 20.871 19.012";
    ws.write(
        "night.txt",
        &dia_file(&[short.to_string(), dia_line("NS", 2, "59853.1", "11.0", "-2.0", "g")]),
    );
    convert_dia(&ws, "night.txt", "dia.csv", indexed()).unwrap();

    let kind = dia_source::table().unwrap();
    let table = OpenedTable::open(&kind, &ws.path("dia.csv"), OpenOptions::default()).unwrap();
    let rows: Vec<_> = table.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows[0].get("filter"), Some(&Cell::Null));
    assert_eq!(rows[0].get("snr"), Some(&Cell::Null));
    assert_eq!(rows[1].get("ssObjectId"), Some(&Cell::Null));

    assert_eq!(table.index_keys("ssObjectId").unwrap(), vec![key("S1")]);
    assert_eq!(table.get_by_index("ssObjectId", "\\N").unwrap(), Lookup::NoMatch);
}

#[test]
fn test_column_subset_converts_only_ra() {
    let ws = Workspace::new();
    ws.write(
        "night.txt",
        &dia_file(&[dia_line("S1", 1, "59853.1", "10.5", "-3.25", "r")]),
    );
    let params = ConvertParams::builder().skip_rows(1).columns(["ra"]).build().unwrap();
    convert_dia(&ws, "night.txt", "ra.csv", params).unwrap();

    let kind = dia_source::table().unwrap();
    let table = OpenedTable::open(
        &kind,
        &ws.path("ra.csv"),
        OpenOptions::default().rebuild_index(false),
    )
    .unwrap();
    assert!(!table.has_index());
    let row = table.iter().next().unwrap().unwrap();
    assert_relative_eq!(ra(&row), 10.5);
    assert_eq!(row.get("decl"), Some(&Cell::Null));
    assert_eq!(row.get("ssObjectId"), Some(&Cell::Null));
}

#[test]
fn test_missing_input_path_is_fatal() {
    let ws = Workspace::new();
    let err = convert_dia(&ws, "missing.txt", "dia.csv", indexed()).unwrap_err();
    assert!(matches!(err, SsTableError::InputNotFound(_)));
    assert!(!ws.path("dia.csv").exists());
}

#[test]
fn test_malformed_value_aborts_without_outputs() {
    let ws = Workspace::new();
    ws.write(
        "sources.csv",
        "S1,7,59853.98,1.5e8,3.2,50.0,0.1,-12.5,0.2,3,4,12,12.3,21.5,20.8,19.0,r,1,1,0.02\n\
         S2,8,59853.98,1.5e8,3.2,50.0,0.1,-12.5,0.2,3,oops,12,12.3,21.5,20.8,19.0,r,1,1,0.02\n",
    );
    let table = ss_source::table().unwrap();
    let err = FileConverter::new(
        &table,
        InputSource::Path(ws.path("sources.csv")),
        ws.path("ss_source.csv"),
        ConvertParams::builder().do_index(true).build().unwrap(),
    )
    .run()
    .unwrap_err();

    assert!(matches!(
        err,
        SsTableError::Conversion { ref column, .. } if column == "heliocentricDist"
    ));
    let output = ws.path("ss_source.csv");
    assert!(!output.exists());
    assert!(!staging_path(&output).exists());
    assert!(!sidecar_path(&output).exists());
    assert!(!staging_path(&sidecar_path(&output)).exists());
}

#[test]
fn test_unique_key_keeps_the_first_row() {
    let ws = Workspace::new();
    ws.write(
        "night.txt",
        &dia_file(&[
            dia_line("S1", 1, "59853.1", "10.5", "-3.25", "r"),
            dia_line("S1", 2, "59854.1", "10.5", "-3.25", "g"),
        ]),
    );
    convert_dia(&ws, "night.txt", "dia.csv", indexed()).unwrap();

    let kind = dia_source::table().unwrap();
    let table = OpenedTable::open(&kind, &ws.path("dia.csv"), OpenOptions::default()).unwrap();
    let first = table.iter().next().unwrap().unwrap();
    let id = first.get("diaSourceId").unwrap().to_string();

    let found = table.get_by_index("diaSourceId", &id).unwrap();
    assert_eq!(found.rows().len(), 1);
    assert_eq!(found.first(), Some(&first));
    assert_eq!(table.get_by_index("ssObjectId", &key("S1")).unwrap().rows().len(), 2);
}

#[test]
fn test_in_memory_orbit_lookup() {
    let ws = Workspace::new();
    ws.write(
        "orbits.csv",
        &orbit_file(&[orbit_line("S1", "17.25"), orbit_line("S2", "18.5")]),
    );
    let kind = mpcorb::table().unwrap();
    FileConverter::new(
        &kind,
        InputSource::Path(ws.path("orbits.csv")),
        ws.path("mpcorb.csv"),
        ConvertParams::builder().skip_rows(1).build().unwrap(),
    )
    .run()
    .unwrap();

    let table = open_for_lookup(&kind, &ws.path("mpcorb.csv"), OpenOptions::default()).unwrap();
    assert!(matches!(table, AnyTable::InMemory(_)));

    let found = table.get_by_index("mpcDesignation", "S2").unwrap();
    let h = found.first().and_then(|r| r.get("mpcH")).cloned();
    assert_eq!(h, Some(Cell::Value(Value::Float(18.5))));
    assert_eq!(
        table.get_by_index("ssObjectId", &key("S1")).unwrap().rows().len(),
        1
    );
    assert_eq!(table.get_by_index("mpcDesignation", "S9").unwrap(), Lookup::NoMatch);

    let err = OpenedTable::open(&dia_source::table().unwrap(), &ws.path("mpcorb.csv"), OpenOptions::default());
    assert!(matches!(err, Err(SsTableError::HeaderMismatch { .. })));
}
