//! Formulas over ranges: shared range vertices and cached aggregates.
use super::common::*;
use calcgraph_common::LiteralValue;

#[test]
fn test_sum_follows_cells_in_the_range() {
    let (mut engine, s) = build(&[&["1", "=SUM(A1:A3)"], &["2"], &[""]]);
    assert_eq!(number(&engine, s, "B1"), 3.0);

    engine.set_cell_contents(addr(s, "A3"), 4).unwrap();
    assert_eq!(number(&engine, s, "B1"), 7.0);
    engine.set_cell_contents(addr(s, "A1"), "").unwrap();
    assert_eq!(number(&engine, s, "B1"), 6.0);
    engine.set_cell_contents(addr(s, "A2"), "=A3*2").unwrap();
    assert_eq!(number(&engine, s, "B1"), 12.0);
}

#[test]
fn test_formulas_share_one_range_vertex() {
    let (mut engine, s) = build(&[
        &["1", "=SUM(A1:A2)", "=MAX(A1:A2)"],
        &["5", "=SUM(A1:A2)*2"],
    ]);
    assert_eq!(engine.graph().ranges.len(), 1);
    assert_eq!(number(&engine, s, "C1"), 5.0);
    assert_eq!(number(&engine, s, "B2"), 12.0);

    engine.set_cell_contents(addr(s, "A2"), 7).unwrap();
    assert_eq!(number(&engine, s, "B1"), 8.0);
    assert_eq!(number(&engine, s, "C1"), 7.0);
    assert_eq!(number(&engine, s, "B2"), 16.0);

    for cell in ["B1", "C1", "B2"] {
        engine.set_cell_contents(addr(s, cell), 0).unwrap();
    }
    assert!(engine.graph().ranges.is_empty(), "unread ranges are collected");
    assert_graph_consistent(&engine);
}

#[test]
fn test_growing_ranges_reuse_smaller_ones() {
    let (mut engine, s) = build(&[
        &["1", "=SUM(A1:A1)"],
        &["2", "=SUM(A1:A2)"],
        &["3", "=SUM(A1:A3)"],
        &["4", "=SUM(A1:A4)"],
    ]);
    assert_eq!(number(&engine, s, "B4"), 10.0);

    engine.set_cell_contents(addr(s, "A1"), 10).unwrap();
    assert_eq!(number(&engine, s, "B1"), 10.0);
    assert_eq!(number(&engine, s, "B2"), 12.0);
    assert_eq!(number(&engine, s, "B3"), 15.0);
    assert_eq!(number(&engine, s, "B4"), 19.0);

    engine.set_cell_contents(addr(s, "A4"), "x").unwrap();
    assert_eq!(number(&engine, s, "B3"), 15.0);
    assert_eq!(number(&engine, s, "B4"), 15.0);

    // dropping a link in the chain keeps the longer sums right
    engine.set_cell_contents(addr(s, "B2"), "").unwrap();
    engine.set_cell_contents(addr(s, "A2"), 100).unwrap();
    assert_eq!(number(&engine, s, "B3"), 113.0);
    assert_eq!(number(&engine, s, "B4"), 113.0);
    assert_graph_consistent(&engine);
}

#[test]
fn test_whole_column_ranges_see_new_cells() {
    let (mut engine, s) = build(&[&["1", "=SUM(A:A)"]]);
    assert_eq!(number(&engine, s, "B1"), 1.0);
    engine.set_cell_contents(addr(s, "A500"), 2).unwrap();
    assert_eq!(number(&engine, s, "B1"), 3.0);
    engine.insert_rows(s, 0, 3).unwrap();
    engine.set_cell_contents(addr(s, "A1"), 4).unwrap();
    assert_eq!(number(&engine, s, "B4"), 7.0);
}

#[test]
fn test_errors_inside_a_range_propagate() {
    let (mut engine, s) = build(&[&["1", "=SUM(A1:A2)"], &["=1/0"]]);
    assert!(is_error(&engine, s, "B1", "#DIV/0!"));
    engine.set_cell_contents(addr(s, "A2"), 1).unwrap();
    assert_eq!(value(&engine, s, "B1"), LiteralValue::Number(2.0));
}

#[test]
fn test_range_on_another_sheet() {
    let (mut engine, s) = build(&[&["=SUM(Data!A1:B2)"]]);
    assert!(is_error(&engine, s, "A1", "#REF!"));
    let data = engine.add_sheet("Data").unwrap();
    engine
        .set_range_contents(addr(data, "A1"), raw_rows(&[&["1", "2"], &["3", "4"]]))
        .unwrap();
    assert_eq!(number(&engine, s, "A1"), 10.0);
    engine.remove_columns(data, 1, 1).unwrap();
    assert_eq!(formula(&engine, s, "A1").as_deref(), Some("=SUM(Data!A1:A2)"));
    assert_eq!(number(&engine, s, "A1"), 4.0);
}
