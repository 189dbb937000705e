//! Array formulas spilling over a fixed footprint.
use super::common::*;
use crate::engine::{CellType, EditorError, Engine};
use calcgraph_common::{LiteralValue, SheetId};

fn transposed() -> (Engine, SheetId) {
    build(&[
        &["1", "2", "3", "=SUM(A2:A4)"],
        &["{=TRANSPOSE(A1:C1)}", "=A3*10"],
    ])
}

#[test]
fn test_array_formula_fills_its_footprint() {
    let (engine, s) = transposed();
    assert_eq!(number(&engine, s, "A2"), 1.0);
    assert_eq!(number(&engine, s, "A3"), 2.0);
    assert_eq!(number(&engine, s, "A4"), 3.0);
    assert_eq!(number(&engine, s, "B2"), 20.0);
    assert_eq!(number(&engine, s, "D1"), 6.0);

    assert_eq!(engine.get_cell_type(&addr(s, "A2")).unwrap(), CellType::ArrayFormula);
    assert_eq!(engine.get_cell_type(&addr(s, "A3")).unwrap(), CellType::Array);
    assert!(engine.is_cell_part_of_array(&addr(s, "A4")));
    assert!(!engine.is_cell_part_of_array(&addr(s, "A5")));
    assert_eq!(
        formula(&engine, s, "A2").as_deref(),
        Some("{=TRANSPOSE(A1:C1)}")
    );
    assert_eq!(formula(&engine, s, "A3"), None);
}

#[test]
fn test_array_follows_its_inputs() {
    let (mut engine, s) = transposed();
    let changes = engine.set_cell_contents(addr(s, "B1"), 5).unwrap();
    assert_eq!(number(&engine, s, "A3"), 5.0);
    assert_eq!(number(&engine, s, "B2"), 50.0);
    assert_eq!(number(&engine, s, "D1"), 9.0);
    let changed: Vec<_> = changed_cells(&changes).into_iter().map(|(a, _)| a).collect();
    assert_eq!(
        changed,
        vec![addr(s, "B1"), addr(s, "D1"), addr(s, "B2"), addr(s, "A3")]
    );
}

#[test]
fn test_writing_inside_the_footprint_fails() {
    let (mut engine, s) = transposed();
    assert_eq!(
        engine.set_cell_contents(addr(s, "A3"), 9),
        Err(EditorError::TargetLocationHasArray)
    );
    assert_eq!(
        engine.set_cell_contents(addr(s, "A1"), "{=TRANSPOSE(F1:H1)}"),
        Err(EditorError::TargetLocationHasArray),
        "a new footprint may not overlap an existing array"
    );
    assert_eq!(number(&engine, s, "A1"), 1.0);
    assert!(!engine.can_undo());
}

#[test]
fn test_overwriting_the_anchor_removes_the_array() {
    let (mut engine, s) = transposed();
    engine.set_cell_contents(addr(s, "A2"), 7).unwrap();
    assert_eq!(value(&engine, s, "A3"), LiteralValue::Empty);
    assert!(!engine.is_cell_part_of_array(&addr(s, "A4")));
    assert_eq!(number(&engine, s, "D1"), 7.0);
    engine.set_cell_contents(addr(s, "A3"), 1).unwrap();

    engine.undo().unwrap();
    engine.undo().unwrap();
    assert_eq!(number(&engine, s, "A3"), 2.0);
    assert_eq!(number(&engine, s, "D1"), 6.0);
    assert_graph_consistent(&engine);
}

#[test]
fn test_insert_strictly_inside_an_array_is_a_split() {
    let (mut engine, s) = transposed();
    assert_eq!(engine.insert_rows(s, 2, 1), Err(EditorError::ArraySplit));
    assert_eq!(engine.insert_rows(s, 3, 1), Err(EditorError::ArraySplit));

    // above the anchor and below the last row are fine
    engine.insert_rows(s, 4, 1).unwrap();
    engine.insert_rows(s, 1, 1).unwrap();
    assert_eq!(number(&engine, s, "A5"), 3.0);
    assert_eq!(formula(&engine, s, "A3").as_deref(), Some("{=TRANSPOSE(A1:C1)}"));
}

#[test]
fn test_removing_part_of_an_array_shrinks_it() {
    let (mut engine, s) = build(&[
        &["1", "2", "3"],
        &["{=TRANSPOSE(A1:C1)}", "=SUM(A2:A4)"],
    ]);
    assert_eq!(number(&engine, s, "B2"), 6.0);
    engine.remove_rows(s, 3, 1).unwrap();

    assert!(engine.is_cell_part_of_array(&addr(s, "A3")));
    assert!(!engine.is_cell_part_of_array(&addr(s, "A4")));
    assert_eq!(number(&engine, s, "A3"), 2.0);
    assert_eq!(formula(&engine, s, "B2").as_deref(), Some("=SUM(A2:A3)"));
    assert_eq!(number(&engine, s, "B2"), 3.0);

    engine.undo().unwrap();
    assert_eq!(number(&engine, s, "A4"), 3.0);
    assert_eq!(number(&engine, s, "B2"), 6.0);
}

#[test]
fn test_arrays_cannot_be_moved() {
    let (mut engine, s) = transposed();
    assert_eq!(
        engine.move_rows(s, 2, 1, 6),
        Err(EditorError::SourceLocationHasArray)
    );
    assert_eq!(
        engine.move_cells(range(s, "A3:A3"), addr(s, "F1")),
        Err(EditorError::SourceLocationHasArray)
    );
    assert_eq!(
        engine.move_cells(range(s, "A1:A1"), addr(s, "A4")),
        Err(EditorError::TargetLocationHasArray)
    );
}

#[test]
fn test_error_results_fill_the_footprint() {
    let (engine, s) = build(&[&["0", "1"], &["{=1/A1:B1}"]]);
    assert!(is_error(&engine, s, "A2", "#DIV/0!"));
    assert_eq!(number(&engine, s, "B2"), 1.0);
}
