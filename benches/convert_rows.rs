use camino::Utf8Path;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use ssfiletable::catalogs::dia_source;
use ssfiletable::row::{build_rows, MappedLines, RowWindow};
use ssfiletable::table::{ConvertParams, FileConverter, InputSource, LineTable, TableKind};

const ROWS: usize = 10_000;

/// A detection file of `ROWS` lines, every 17th object seen twice.
fn detections() -> String {
    (0..ROWS)
        .map(|i| {
            format!(
                "S{:07} {} {:.5} 1.5e8 3.2 {:.6} 0.1 {:.6} 0.2 1e8 2e8 3e8 12.3 21.5 20.871 19.012 r\n",
                i % (ROWS - ROWS / 17),
                i,
                59853.0 + i as f64 * 1e-4,
                (i as f64 * 0.017) % 360.0,
                (i as f64 * 0.011) % 90.0 - 45.0,
            )
        })
        .collect()
}

fn bench_row_pipeline(c: &mut Criterion) {
    let table = dia_source::table().unwrap();
    let data = detections();
    let source = Utf8Path::new("bench.txt");

    c.bench_function("convert_rows/dia_source_cells", |b| {
        b.iter(|| {
            let registry = table.schema().resolve(None);
            let lines = MappedLines::new(source, data.as_bytes());
            let mut cells = 0usize;
            for row in build_rows(table.interpreter(), registry, lines, RowWindow::default()) {
                for cell in row.unwrap() {
                    black_box(cell.unwrap());
                    cells += 1;
                }
            }
            cells
        })
    });
}

fn bench_convert_with_index(c: &mut Criterion) {
    let table = dia_source::table().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap();
    let input = root.join("night.txt");
    std::fs::write(&input, detections()).unwrap();

    c.bench_function("convert_rows/dia_source_file_indexed", |b| {
        b.iter_batched(
            || ConvertParams::builder().do_index(true).build().unwrap(),
            |params| {
                FileConverter::new(
                    &table,
                    InputSource::Path(input.clone()),
                    root.join("dia.csv"),
                    params,
                )
                .run()
                .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_row_pipeline, bench_convert_with_index);
criterion_main!(benches);
