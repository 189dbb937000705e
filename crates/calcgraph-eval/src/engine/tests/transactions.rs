//! Batches: one undo step, atomic on failure.
use super::common::*;
use crate::engine::{EditorError, EvalConfig};
use calcgraph_common::LiteralValue;

#[test]
fn test_batch_is_undone_as_one_step() {
    let (mut engine, s) = build(&[&["1", "=A1+B2"]]);
    let changes = engine
        .batch(|e| {
            e.set_cell_contents(addr(s, "A1"), 10)?;
            e.insert_rows(s, 0, 1)?;
            e.set_cell_contents(addr(s, "B3"), 5)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(number(&engine, s, "B2"), 15.0);
    assert!(
        changed_cells(&changes).contains(&(addr(s, "B2"), LiteralValue::Number(15.0)))
    );

    engine.undo().unwrap();
    assert_eq!(number(&engine, s, "A1"), 1.0);
    assert_eq!(formula(&engine, s, "B1").as_deref(), Some("=A1+B2"));
    assert_eq!(number(&engine, s, "B1"), 1.0);
    assert_eq!(value(&engine, s, "B3"), LiteralValue::Empty);
    assert!(!engine.can_undo());

    engine.redo().unwrap();
    assert_eq!(number(&engine, s, "B2"), 15.0);
}

#[test]
fn test_values_are_refused_inside_a_batch() {
    let (mut engine, s) = build(&[&["1"]]);
    engine
        .batch(|e| {
            e.set_cell_contents(addr(s, "A1"), 2)?;
            assert_eq!(
                e.get_cell_value(&addr(s, "A1")),
                Err(EditorError::EvaluationSuspended)
            );
            Ok(())
        })
        .unwrap();
    assert_eq!(number(&engine, s, "A1"), 2.0);
}

#[test]
fn test_failed_batch_rolls_everything_back() {
    let (mut engine, s) = build(&[&["1", "=A1*2"]]);
    engine.set_cell_contents(addr(s, "C1"), 3).unwrap();
    engine.undo().unwrap();
    let before = engine.get_all_sheets_serialized();

    let result = engine.batch(|e| {
        e.set_cell_contents(addr(s, "A1"), 7)?;
        e.insert_columns(s, 0, 1)?;
        e.remove_sheet(42)?;
        Ok(())
    });
    assert_eq!(result, Err(EditorError::NoSheetWithId(42)));

    assert_eq!(engine.get_all_sheets_serialized(), before);
    assert_eq!(number(&engine, s, "B1"), 2.0);
    assert!(!engine.can_undo());
    assert!(engine.can_redo(), "a failed batch must not clear redo");
    assert!(!engine.is_evaluation_suspended());
    assert_graph_consistent(&engine);
}

#[test]
fn test_nested_batches_join_the_outer_one() {
    let (mut engine, s) = build(&[&["1"]]);
    engine
        .batch(|e| {
            e.set_cell_contents(addr(s, "A1"), 2)?;
            e.batch(|inner| {
                inner.set_cell_contents(addr(s, "A2"), 3)?;
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
    engine.undo().unwrap();
    assert_eq!(number(&engine, s, "A1"), 1.0);
    assert_eq!(value(&engine, s, "A2"), LiteralValue::Empty);
    assert!(!engine.can_undo());
}

#[test]
fn test_suspended_edits_are_reported_on_resume() {
    let (mut engine, s) = build(&[&["1", "=A1+1"]]);
    engine.suspend_evaluation();
    engine.set_cell_contents(addr(s, "A1"), 5).unwrap();
    engine.set_cell_contents(addr(s, "A1"), 6).unwrap();
    let changes = engine.resume_evaluation();
    assert_eq!(
        changed_cells(&changes),
        vec![
            (addr(s, "A1"), LiteralValue::Number(6.0)),
            (addr(s, "B1"), LiteralValue::Number(7.0)),
        ]
    );
    assert_eq!(changes[0].old_value, LiteralValue::Number(1.0));
}

#[test]
fn test_redo_of_a_batch_is_all_or_nothing() {
    let (mut engine, s) = build(&[&["1"], &["2"], &["3"]]);
    engine
        .batch(|e| {
            e.set_cell_contents(addr(s, "B1"), 9)?;
            e.insert_rows(s, 0, 2)?;
            Ok(())
        })
        .unwrap();
    engine.undo().unwrap();
    let undone = shape(&engine);

    let tight = EvalConfig {
        max_rows: 4,
        ..engine.config().clone()
    };
    engine.update_config(tight).unwrap();
    assert_eq!(engine.redo(), Err(EditorError::SheetSizeLimitExceeded));
    assert_eq!(shape(&engine), undone);
    assert_eq!(value(&engine, s, "B1"), LiteralValue::Empty);
    assert!(engine.can_redo());

    engine.update_config(EvalConfig::default()).unwrap();
    engine.redo().unwrap();
    assert_eq!(number(&engine, s, "B3"), 9.0);
    assert_eq!(number(&engine, s, "A5"), 3.0);
}
