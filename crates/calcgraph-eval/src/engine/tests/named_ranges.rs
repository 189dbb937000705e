//! Workbook and sheet scoped named expressions.
use super::common::*;
use crate::engine::{ChangeAddress, EditorError, NameScope, RawCellContent};
use calcgraph_common::LiteralValue;

#[test]
fn test_workbook_name_feeds_formulas() {
    let (mut engine, s) = build(&[&["4", "=Rate*10"]]);
    assert!(is_error(&engine, s, "B1", "#NAME?"));

    let changes = engine
        .add_named_expression("Rate", "=Sheet1!$A$1/2", None)
        .unwrap();
    assert_eq!(number(&engine, s, "B1"), 20.0);
    assert!(changes.iter().any(|c| matches!(
        &c.address,
        ChangeAddress::Named { name, scope: NameScope::Workbook } if name == "Rate"
    )));
    assert_eq!(
        engine.get_named_expression_value("rate", None).unwrap(),
        LiteralValue::Number(2.0)
    );

    engine.set_cell_contents(addr(s, "A1"), 8).unwrap();
    assert_eq!(number(&engine, s, "B1"), 40.0);
}

#[test]
fn test_sheet_scope_shadows_workbook_scope() {
    let (mut engine, s) = build(&[&["=Tax"]]);
    let other = engine.add_sheet("Other").unwrap();
    engine
        .set_cell_contents(addr(other, "A1"), "=Tax")
        .unwrap();
    engine.add_named_expression("Tax", 0.2, None).unwrap();
    engine.add_named_expression("Tax", 0.5, Some(other)).unwrap();

    assert_eq!(number(&engine, s, "A1"), 0.2);
    assert_eq!(number(&engine, other, "A1"), 0.5);

    engine.remove_named_expression("Tax", Some(other)).unwrap();
    assert_eq!(number(&engine, other, "A1"), 0.2);
    engine.undo().unwrap();
    assert_eq!(number(&engine, other, "A1"), 0.5);
}

#[test]
fn test_names_reject_relative_references_and_arrays() {
    let (mut engine, _) = build(&[&["1"]]);
    assert_eq!(
        engine.add_named_expression("Cell", "=Sheet1!A1", None),
        Err(EditorError::NoRelativeAddressesAllowed)
    );
    assert_eq!(
        engine.add_named_expression("Arr", "{=TRANSPOSE(Sheet1!$A$1:$B$1)}", None),
        Err(EditorError::ArrayFormulaInNamedExpression)
    );
    assert!(!engine.can_undo());
}

#[test]
fn test_invalid_and_duplicate_names() {
    let (mut engine, s) = build(&[&["1"]]);
    for bad in ["A1", "1st", "TRUE", "R1C1", "with space"] {
        assert_eq!(
            engine.add_named_expression(bad, 1, None),
            Err(EditorError::NamedExpressionNameIsInvalid(bad.to_string()))
        );
    }
    engine.add_named_expression("Total", 1, None).unwrap();
    assert_eq!(
        engine.add_named_expression("TOTAL", 2, None),
        Err(EditorError::NamedExpressionNameIsAlreadyTaken("TOTAL".into()))
    );
    // the same name in a sheet scope is a different expression
    engine.add_named_expression("Total", 2, Some(s)).unwrap();
    assert_eq!(
        engine.get_named_expression_value("Total", Some(s)).unwrap(),
        LiteralValue::Number(2.0)
    );
    assert_eq!(
        engine.remove_named_expression("Missing", None),
        Err(EditorError::NamedExpressionDoesNotExist("Missing".into()))
    );
}

#[test]
fn test_change_named_expression_with_undo() {
    let (mut engine, s) = build(&[&["=Growth+1"]]);
    engine.add_named_expression("Growth", 1, None).unwrap();
    engine.change_named_expression("Growth", "=2*3", None).unwrap();
    assert_eq!(number(&engine, s, "A1"), 7.0);
    assert_eq!(
        engine.get_named_expression_formula("Growth", None).unwrap(),
        RawCellContent::Text("=2*3".into())
    );

    engine.undo().unwrap();
    assert_eq!(number(&engine, s, "A1"), 2.0);
    engine.undo().unwrap();
    assert!(is_error(&engine, s, "A1", "#NAME?"));
    engine.redo().unwrap();
    assert_eq!(number(&engine, s, "A1"), 2.0);
}

#[test]
fn test_removed_name_reads_as_name_error() {
    let (mut engine, s) = build(&[&["=Limit"]]);
    engine.add_named_expression("Limit", 9, None).unwrap();
    assert_eq!(number(&engine, s, "A1"), 9.0);
    engine.remove_named_expression("Limit", None).unwrap();
    assert!(is_error(&engine, s, "A1", "#NAME?"));
    assert_eq!(
        engine.get_named_expression_value("Limit", None),
        Err(EditorError::NamedExpressionDoesNotExist("Limit".into()))
    );
    assert_graph_consistent(&engine);
}

#[test]
fn test_list_named_expressions_per_scope() {
    let (mut engine, s) = build(&[&["1"]]);
    engine.add_named_expression("beta", 1, None).unwrap();
    engine.add_named_expression("Alpha", 1, None).unwrap();
    engine.add_named_expression("Local", 1, Some(s)).unwrap();
    assert_eq!(engine.list_named_expressions(None), vec!["Alpha", "beta"]);
    assert_eq!(engine.list_named_expressions(Some(s)), vec!["Local"]);
}

#[test]
fn test_remove_sheet_drops_its_names_and_undo_restores_them() {
    let (mut engine, s) = build(&[&["=Local"]]);
    let other = engine.add_sheet("Other").unwrap();
    engine.set_cell_contents(addr(other, "A1"), 3).unwrap();
    engine
        .add_named_expression("Local", "=Other!$A$1*2", Some(other))
        .unwrap();
    engine.set_cell_contents(addr(other, "B1"), "=Local").unwrap();
    assert_eq!(number(&engine, other, "B1"), 6.0);
    assert!(is_error(&engine, s, "A1", "#NAME?"));

    engine.remove_sheet(other).unwrap();
    assert!(engine.list_named_expressions(Some(other)).is_empty());
    assert_graph_consistent(&engine);

    engine.undo().unwrap();
    assert_eq!(engine.list_named_expressions(Some(other)), vec!["Local"]);
    assert_eq!(
        engine.get_named_expression_value("Local", Some(other)).unwrap(),
        LiteralValue::Number(6.0)
    );
    assert_eq!(number(&engine, other, "B1"), 6.0);
}

#[test]
fn test_name_in_sheet_scope_requires_the_sheet() {
    let (mut engine, _) = build(&[&["1"]]);
    assert_eq!(
        engine.add_named_expression("Local", 1, Some(99)),
        Err(EditorError::NoSheetWithId(99))
    );
}
