use calcgraph_common::CellAddress;
use calcgraph_eval::engine::{Engine, EvalConfig, RawCellContent};
use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

/// Column A holds numbers, column B a running total over a growing range.
fn running_totals(n: u32) -> Vec<Vec<RawCellContent>> {
    (1..=n)
        .map(|row| {
            vec![
                RawCellContent::Number(f64::from(row)),
                RawCellContent::Text(format!("=SUM(A1:A{row})")),
            ]
        })
        .collect()
}

/// Each cell of column A reads the one above it.
fn chain(n: u32) -> Vec<Vec<RawCellContent>> {
    let mut rows = vec![vec![RawCellContent::Number(1.0)]];
    rows.extend((2..=n).map(|row| vec![RawCellContent::Text(format!("=A{}+1", row - 1))]));
    rows
}

fn bench_recalc(c: &mut Criterion) {
    let mut group = c.benchmark_group("Recalc");
    let sizes = [1000u32, 5000];

    for n in sizes.iter() {
        // Cold build: parse, wire the graph, evaluate everything.
        group.bench_with_input(BenchmarkId::new("Build/RunningTotals", n), n, |b, &n| {
            b.iter(|| Engine::build_from_array(black_box(running_totals(n)), EvalConfig::default()))
        });

        // One edit at the top dirties every total; smaller ranges are reused.
        group.bench_with_input(BenchmarkId::new("Edit/RunningTotals", n), n, |b, &n| {
            b.iter_batched(
                || Engine::build_from_array(running_totals(n), EvalConfig::default()).unwrap(),
                |mut engine| {
                    let a1 = CellAddress::new(0, 0, 0);
                    engine.set_cell_contents(a1, black_box(42)).unwrap()
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("Edit/Chain", n), n, |b, &n| {
            b.iter_batched(
                || Engine::build_from_array(chain(n), EvalConfig::default()).unwrap(),
                |mut engine| {
                    let a1 = CellAddress::new(0, 0, 0);
                    engine.set_cell_contents(a1, black_box(7)).unwrap()
                },
                BatchSize::LargeInput,
            )
        });

        // Structural edit that rewrites every formula below it.
        group.bench_with_input(BenchmarkId::new("InsertRows/Chain", n), n, |b, &n| {
            b.iter_batched(
                || Engine::build_from_array(chain(n), EvalConfig::default()).unwrap(),
                |mut engine| engine.insert_rows(0, black_box(1), 1).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_recalc);
criterion_main!(benches);
