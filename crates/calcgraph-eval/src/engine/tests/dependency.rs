//! Incremental recalculation and the change list.
use super::common::*;
use crate::engine::{CellType, ChangeAddress, Engine, EvalConfig, RawCellContent};
use calcgraph_common::LiteralValue;

#[test]
fn test_chain_recalculates_after_edit() {
    let (mut engine, s) = build(&[&["1", "=A1*2", "=B1+A1"]]);
    assert_eq!(number(&engine, s, "C1"), 3.0);

    let changes = engine.set_cell_contents(addr(s, "A1"), 5).unwrap();
    assert_eq!(number(&engine, s, "B1"), 10.0);
    assert_eq!(number(&engine, s, "C1"), 15.0);
    assert_eq!(
        changed_cells(&changes),
        vec![
            (addr(s, "A1"), LiteralValue::Number(5.0)),
            (addr(s, "B1"), LiteralValue::Number(10.0)),
            (addr(s, "C1"), LiteralValue::Number(15.0)),
        ]
    );
}

#[test]
fn test_unchanged_values_are_not_reported() {
    let (mut engine, s) = build(&[&["1", "=IF(A1>0,1,0)", "=B1*10"]]);
    let changes = engine.set_cell_contents(addr(s, "A1"), 2).unwrap();
    let cells = changed_cells(&changes);
    assert_eq!(cells, vec![(addr(s, "A1"), LiteralValue::Number(2.0))]);
}

#[test]
fn test_change_reports_old_value() {
    let (mut engine, s) = build(&[&["1", "=A1+1"]]);
    let changes = engine.set_cell_contents(addr(s, "A1"), 4).unwrap();
    let b1 = changes
        .iter()
        .find(|c| c.address == ChangeAddress::Cell(addr(s, "B1")))
        .unwrap();
    assert_eq!(b1.old_value, LiteralValue::Number(2.0));
    assert_eq!(b1.new_value, LiteralValue::Number(5.0));
}

#[test]
fn test_formula_replaced_by_value_drops_its_edges() {
    let (mut engine, s) = build(&[&["1", "=A1+1"]]);
    let before = engine.graph().edge_count();
    engine.set_cell_contents(addr(s, "B1"), "7").unwrap();
    assert!(engine.graph().edge_count() < before);
    engine.set_cell_contents(addr(s, "A1"), 9).unwrap();
    assert_eq!(number(&engine, s, "B1"), 7.0);
    assert_graph_consistent(&engine);
}

#[test]
fn test_reference_to_empty_cell() {
    let (mut engine, s) = build(&[&["=C1", "=C1+1"]]);
    assert_eq!(value(&engine, s, "A1"), LiteralValue::Empty);
    assert_eq!(number(&engine, s, "B1"), 1.0);
    engine.set_cell_contents(addr(s, "C2"), "=D2").unwrap();
    assert_eq!(value(&engine, s, "C2"), LiteralValue::Empty);
    engine.set_cell_contents(addr(s, "D2"), "x").unwrap();
    assert_eq!(value(&engine, s, "C2"), LiteralValue::Text("x".into()));
}

#[test]
fn test_null_to_zero() {
    let config = EvalConfig {
        evaluate_null_to_zero: true,
        ..EvalConfig::default()
    };
    let (engine, s) = build_with(&[&["=B1"]], config);
    assert_eq!(value(&engine, s, "A1"), LiteralValue::Number(0.0));
}

#[test]
fn test_errors_are_values() {
    let (mut engine, s) = build(&[&["=1/0", "=A1+1", "=IFERROR(B1,42)", "=FOO(1)"]]);
    assert!(is_error(&engine, s, "A1", "#DIV/0!"));
    assert!(is_error(&engine, s, "B1", "#DIV/0!"));
    assert_eq!(number(&engine, s, "C1"), 42.0);
    assert!(is_error(&engine, s, "D1", "#NAME?"));

    engine.set_cell_contents(addr(s, "E1"), "=1+").unwrap();
    assert!(is_error(&engine, s, "E1", "#ERROR!"));
    assert_eq!(formula(&engine, s, "E1").as_deref(), Some("=1+"));
}

#[test]
fn test_range_values_and_cell_type() {
    let (engine, s) = build(&[&["1", "2"], &["=A1+B1", ""]]);
    let values = engine.get_range_values(&range(s, "A1:B2")).unwrap();
    assert_eq!(values[1][0], LiteralValue::Number(3.0));
    assert_eq!(values[1][1], LiteralValue::Empty);
    assert_eq!(engine.get_cell_type(&addr(s, "A2")).unwrap(), CellType::Formula);
    assert_eq!(engine.get_cell_type(&addr(s, "A1")).unwrap(), CellType::Value);
    assert_eq!(engine.get_cell_type(&addr(s, "B2")).unwrap(), CellType::Empty);
}

#[test]
fn test_precedents_and_dependents() {
    let (engine, s) = build(&[&["1", "2", "=SUM(A1:B1)", "=C1*2"]]);
    assert_eq!(
        engine.get_cell_precedents(&addr(s, "C1")),
        vec![addr(s, "A1"), addr(s, "B1")]
    );
    assert_eq!(
        engine.get_cell_dependents(&addr(s, "A1")),
        vec![addr(s, "C1")]
    );
}

#[test]
fn test_calculate_formula_does_not_store() {
    let (engine, s) = build(&[&["2", "3"]]);
    assert_eq!(
        engine.calculate_formula("=A1*B1", s).unwrap(),
        LiteralValue::Number(6.0)
    );
    assert!(engine.calculate_formula("A1*B1", s).is_err());
    assert_eq!(
        engine.get_cell_serialized(&addr(s, "C1")).unwrap(),
        RawCellContent::Empty
    );
}

#[test]
fn test_empty_engine_has_no_sheets() {
    let engine = Engine::default();
    assert_eq!(engine.count_sheets(), 0);
    assert!(engine.get_all_sheets_serialized().is_empty());
}
