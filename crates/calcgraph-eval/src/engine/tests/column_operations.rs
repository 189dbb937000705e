//! Inserting, removing and moving columns.
use super::common::*;
use crate::engine::EditorError;
use calcgraph_common::LiteralValue;

#[test]
fn test_insert_columns_shifts_cells_and_references() {
    let (mut engine, s) = build(&[&["1", "2", "=A1+B1"]]);
    engine.insert_columns(s, 1, 1).unwrap();

    assert_eq!(value(&engine, s, "B1"), LiteralValue::Empty);
    assert_eq!(number(&engine, s, "C1"), 2.0);
    assert_eq!(formula(&engine, s, "D1").as_deref(), Some("=A1+C1"));
    assert_eq!(number(&engine, s, "D1"), 3.0);
}

#[test]
fn test_absolute_references_move_with_their_cells() {
    let (mut engine, s) = build(&[&["4", "=$A$1*2"]]);
    engine.insert_columns(s, 0, 2).unwrap();
    assert_eq!(formula(&engine, s, "D1").as_deref(), Some("=$C$1*2"));
    assert_eq!(number(&engine, s, "D1"), 8.0);
}

#[test]
fn test_remove_columns_turns_references_into_ref_errors() {
    let (mut engine, s) = build(&[&["1", "2", "=B1", "=A1"]]);
    engine.remove_columns(s, 1, 1).unwrap();

    assert!(is_error(&engine, s, "B1", "#REF!"));
    assert_eq!(formula(&engine, s, "C1").as_deref(), Some("=A1"));
    assert_eq!(number(&engine, s, "C1"), 1.0);
    assert_graph_consistent(&engine);
}

#[test]
fn test_remove_columns_shrinks_row_ranges() {
    let (mut engine, s) = build(&[&["1", "2", "3", "4"], &["=SUM(A1:D1)"]]);
    engine.remove_columns(s, 2, 1).unwrap();
    assert_eq!(formula(&engine, s, "A2").as_deref(), Some("=SUM(A1:C1)"));
    assert_eq!(number(&engine, s, "A2"), 7.0);
}

#[test]
fn test_move_columns_reorders() {
    let (mut engine, s) = build(&[&["a", "b", "c"], &["=C1&A1"]]);
    engine.move_columns(s, 2, 1, 0).unwrap();

    assert_eq!(value(&engine, s, "A1"), LiteralValue::Text("c".into()));
    assert_eq!(value(&engine, s, "B1"), LiteralValue::Text("a".into()));
    assert_eq!(formula(&engine, s, "B2").as_deref(), Some("=A1&B1"));
    assert_eq!(value(&engine, s, "B2"), LiteralValue::Text("ca".into()));
}

#[test]
fn test_column_limit_is_enforced() {
    let (mut engine, s) = build(&[&["1", "2"]]);
    assert_eq!(
        engine.insert_columns(s, 0, 18_277),
        Err(EditorError::SheetSizeLimitExceeded)
    );
    engine.insert_columns(s, 0, 18_276).unwrap();
    assert_eq!(number(&engine, s, "ZZZ1"), 2.0);
}
