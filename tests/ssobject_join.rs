mod common;

use common::{dia_file, dia_line, key, orbit_file, orbit_line, Workspace};
use ssfiletable::catalogs::{dia_source, mpcorb, ss_object};
use ssfiletable::constants::sidecar_path;
use ssfiletable::schema::{Cell, Value};
use ssfiletable::table::{
    ConvertParams, FileConverter, InMemoryTable, InputSource, Lookup, Row, RowLookup,
};

/// Two nights of detections and an orbit file covering S1 and S2 only.
fn survey(ws: &Workspace) {
    let dia = dia_source::table().unwrap();
    let nights = [
        vec![
            dia_line("S1", 1, "59850.25", "10.5", "-3.25", "r"),
            dia_line("S3", 1, "59850.25", "20.5", "4.0", "g"),
            dia_line("S2", 1, "59850.25", "11.0", "-2.0", "g"),
        ],
        vec![
            dia_line("S1", 2, "59853.5", "10.75", "-3.5", "i"),
            dia_line("S1", 3, "59860", "11.5", "-3.75", "z"),
        ],
    ];
    for (n, lines) in nights.iter().enumerate() {
        ws.write(&format!("night_{n}.txt"), &dia_file(lines));
        FileConverter::new(
            &dia,
            InputSource::Path(ws.path(&format!("night_{n}.txt"))),
            ws.path(&format!("dia_{n}.csv")),
            ConvertParams::builder().skip_rows(1).do_index(true).build().unwrap(),
        )
        .run()
        .unwrap();
    }

    ws.write(
        "orbits.txt",
        &orbit_file(&[orbit_line("S1", "17.25"), orbit_line("S2", "18.5")]),
    );
    FileConverter::new(
        &mpcorb::table().unwrap(),
        InputSource::Path(ws.path("orbits.txt")),
        ws.path("mpcorb.csv"),
        ConvertParams::builder().skip_rows(1).build().unwrap(),
    )
    .run()
    .unwrap();
}

fn build(ws: &Workspace, output: &str, params: ConvertParams) -> InMemoryTable {
    let table = ss_object::table().unwrap();
    let dia = dia_source::table().unwrap();
    let orbits = mpcorb::table().unwrap();
    let report = ss_object::SsObjectBuilder::new(
        &table,
        &dia,
        &orbits,
        InputSource::Glob(format!("{}/dia_*.csv", ws.root())),
        ws.path("mpcorb.csv"),
        ws.path(output),
        params,
    )
    .run()
    .unwrap();
    assert_eq!(report.inputs, 3);
    InMemoryTable::open(&table, &ws.path(output)).unwrap()
}

fn int(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Cell::value).and_then(Value::as_i64)
}

fn float(row: &Row, column: &str) -> Option<f64> {
    row.get(column).and_then(Cell::value).and_then(Value::as_f64)
}

fn sorted_keys(objects: &[&str]) -> Vec<i64> {
    let mut keys: Vec<i64> = objects.iter().map(|o| key(o).parse().unwrap()).collect();
    keys.sort();
    keys
}

#[test]
fn test_join_one_row_per_object() {
    let ws = Workspace::new();
    survey(&ws);
    let objects = build(
        &ws,
        "ss_object.csv",
        ConvertParams::builder().do_index(true).build().unwrap(),
    );

    assert_eq!(objects.len(), 3);
    let ids: Vec<i64> = objects.iter().map(|r| int(r, "ssObjectId").unwrap()).collect();
    assert_eq!(ids, sorted_keys(&["S1", "S2", "S3"]));
    assert!(sidecar_path(&ws.path("ss_object.csv")).exists());

    let Lookup::Found(s1) = objects.get_by_index("ssObjectId", &key("S1")).unwrap() else {
        panic!("S1 missing");
    };
    assert_eq!(int(&s1[0], "numObs"), Some(3));
    assert_eq!(float(&s1[0], "arc"), Some(9.75));
    for band in ss_object::BAND_H_COLUMNS {
        assert_eq!(float(&s1[0], band), Some(17.25));
    }

    let s3 = objects.get_by_index("ssObjectId", &key("S3")).unwrap();
    let s3 = s3.first().unwrap();
    assert_eq!(int(s3, "numObs"), Some(1));
    assert_eq!(float(s3, "arc"), Some(0.0));
    assert_eq!(s3.get("uH"), Some(&Cell::Null));
}

#[test]
fn test_window_applies_to_object_keys() {
    let ws = Workspace::new();
    survey(&ws);
    let objects = build(
        &ws,
        "window.csv",
        ConvertParams::builder().skip_rows(1).stop_after(1).build().unwrap(),
    );

    assert_eq!(objects.len(), 1);
    let expected = sorted_keys(&["S1", "S2", "S3"])[1];
    assert_eq!(int(&objects.rows()[0], "ssObjectId"), Some(expected));
    assert!(!sidecar_path(&ws.path("window.csv")).exists());
}
