//! Inserting, removing and moving rows.
use super::common::*;
use crate::engine::EditorError;
use calcgraph_common::LiteralValue;

#[test]
fn test_insert_rows_shifts_cells_and_references() {
    let (mut engine, s) = build(&[&["1"], &["2"], &["=A1+A2"]]);
    engine.insert_rows(s, 1, 2).unwrap();

    assert_eq!(number(&engine, s, "A1"), 1.0);
    assert_eq!(value(&engine, s, "A2"), LiteralValue::Empty);
    assert_eq!(number(&engine, s, "A4"), 2.0);
    assert_eq!(formula(&engine, s, "A5").as_deref(), Some("=A1+A4"));
    assert_eq!(number(&engine, s, "A5"), 3.0);
}

#[test]
fn test_insert_rows_inside_a_range_expands_it() {
    let (mut engine, s) = build(&[&["1", "=SUM(A1:A3)"], &["2"], &["3"]]);
    engine.insert_rows(s, 1, 1).unwrap();
    assert_eq!(formula(&engine, s, "B1").as_deref(), Some("=SUM(A1:A4)"));

    engine.set_cell_contents(addr(s, "A2"), 10).unwrap();
    assert_eq!(number(&engine, s, "B1"), 16.0);
}

#[test]
fn test_insert_rows_below_a_range_leaves_it() {
    let (mut engine, s) = build(&[&["1", "=SUM(A1:A2)"], &["2"]]);
    engine.insert_rows(s, 2, 1).unwrap();
    assert_eq!(formula(&engine, s, "B1").as_deref(), Some("=SUM(A1:A2)"));
}

#[test]
fn test_remove_rows_turns_references_into_ref_errors() {
    let (mut engine, s) = build(&[&["1"], &["2"], &["=A2*10"], &["=A1"]]);
    engine.remove_rows(s, 1, 1).unwrap();

    assert_eq!(formula(&engine, s, "A2").as_deref(), Some("=#REF!*10"));
    assert!(is_error(&engine, s, "A2", "#REF!"));
    assert_eq!(formula(&engine, s, "A3").as_deref(), Some("=A1"));
    assert_eq!(number(&engine, s, "A3"), 1.0);
    assert_graph_consistent(&engine);
}

#[test]
fn test_remove_rows_shrinks_ranges() {
    let (mut engine, s) = build(&[&["1", "=SUM(A1:A4)"], &["2"], &["3"], &["4"]]);
    assert_eq!(number(&engine, s, "B1"), 10.0);
    engine.remove_rows(s, 1, 2).unwrap();
    assert_eq!(formula(&engine, s, "B1").as_deref(), Some("=SUM(A1:A2)"));
    assert_eq!(number(&engine, s, "B1"), 5.0);
}

#[test]
fn test_removing_the_whole_range_destroys_it() {
    let (mut engine, s) = build(&[&["=SUM(A2:A3)"], &["1"], &["2"]]);
    engine.remove_rows(s, 1, 2).unwrap();
    assert!(is_error(&engine, s, "A1", "#REF!"));
    assert_graph_consistent(&engine);
}

#[test]
fn test_whole_column_ranges_survive_row_edits() {
    let (mut engine, s) = build(&[&["1", "=SUM(A:A)"], &["2"], &["3"]]);
    assert_eq!(number(&engine, s, "B1"), 6.0);
    engine.remove_rows(s, 1, 1).unwrap();
    assert_eq!(formula(&engine, s, "B1").as_deref(), Some("=SUM(A:A)"));
    assert_eq!(number(&engine, s, "B1"), 4.0);
    engine.insert_rows(s, 0, 1).unwrap();
    engine.set_cell_contents(addr(s, "A1"), 5).unwrap();
    assert_eq!(number(&engine, s, "B2"), 9.0);
}

#[test]
fn test_move_rows_reorders_and_keeps_references() {
    let (mut engine, s) = build(&[&["a"], &["b"], &["c"], &["=A1"]]);
    engine.move_rows(s, 0, 1, 3).unwrap();

    assert_eq!(value(&engine, s, "A1"), LiteralValue::Text("b".into()));
    assert_eq!(value(&engine, s, "A2"), LiteralValue::Text("c".into()));
    assert_eq!(value(&engine, s, "A3"), LiteralValue::Text("a".into()));
    assert_eq!(formula(&engine, s, "A4").as_deref(), Some("=A3"));
    assert_eq!(value(&engine, s, "A4"), LiteralValue::Text("a".into()));
}

#[test]
fn test_move_rows_is_one_undo_step() {
    let (mut engine, s) = build(&[&["a"], &["b"], &["c"]]);
    engine.move_rows(s, 2, 1, 0).unwrap();
    assert_eq!(value(&engine, s, "A1"), LiteralValue::Text("c".into()));
    engine.undo().unwrap();
    assert_eq!(value(&engine, s, "A1"), LiteralValue::Text("a".into()));
    assert_eq!(value(&engine, s, "A3"), LiteralValue::Text("c".into()));
    assert!(!engine.can_undo());
}

#[test]
fn test_invalid_row_edits_fail_without_changes() {
    let (mut engine, s) = build(&[&["1"], &["=A1"]]);
    let before = engine.get_all_sheets_serialized();

    assert!(matches!(
        engine.insert_rows(s, 0, 0),
        Err(EditorError::InvalidArguments(_))
    ));
    assert_eq!(engine.insert_rows(s, 0, 40_000), Err(EditorError::SheetSizeLimitExceeded));
    assert_eq!(engine.insert_rows(99, 0, 1), Err(EditorError::NoSheetWithId(99)));
    assert!(engine.move_rows(s, 0, 1, 1).is_err());

    assert_eq!(engine.get_all_sheets_serialized(), before);
    assert!(!engine.can_undo());
}

#[test]
fn test_rows_outside_the_sheet_are_refused() {
    let (mut engine, s) = build(&[&["1"], &["2"], &["=SUM(A1:A2)"]]);
    let before = shape(&engine);

    assert!(matches!(
        engine.remove_rows(s, u32::MAX - 1, 5),
        Err(EditorError::InvalidArguments(_))
    ));
    assert!(matches!(
        engine.remove_rows(s, 39_999, 2),
        Err(EditorError::InvalidArguments(_))
    ));
    assert!(matches!(
        engine.move_rows(s, u32::MAX - 1, 5, 0),
        Err(EditorError::InvalidArguments(_))
    ));
    assert!(matches!(
        engine.move_rows(s, 0, 1, u32::MAX),
        Err(EditorError::InvalidArguments(_))
    ));
    assert_eq!(
        engine.insert_rows(s, u32::MAX, 1),
        Err(EditorError::SheetSizeLimitExceeded)
    );

    assert_eq!(shape(&engine), before);
    assert!(!engine.can_undo());
    engine.remove_rows(s, 39_999, 1).unwrap();
    assert_eq!(number(&engine, s, "A3"), 3.0);
}

#[test]
fn test_move_cells_outside_the_sheet_is_refused() {
    let (mut engine, s) = build(&[&["1"], &["2"], &["3"], &["=A1+A3"]]);
    let before = shape(&engine);

    let far = calcgraph_common::CellAddress::new(s, u32::MAX - 1, 0);
    assert!(matches!(
        engine.move_cells(range(s, "A1:A3"), far),
        Err(EditorError::InvalidArguments(_))
    ));
    assert!(matches!(
        engine.move_cells(range(s, "A1:A3"), addr(s, "B39999")),
        Err(EditorError::InvalidArguments(_))
    ));
    let whole = calcgraph_common::RangeAddress::whole_columns(s, 0, 0);
    assert!(matches!(
        engine.move_cells(whole, addr(s, "B1")),
        Err(EditorError::InvalidArguments(_))
    ));

    assert_eq!(shape(&engine), before);
    engine.move_cells(range(s, "A1:A3"), addr(s, "B39998")).unwrap();
    assert_eq!(formula(&engine, s, "A4").as_deref(), Some("=B39998+B40000"));
    assert_eq!(number(&engine, s, "A4"), 4.0);
}
