//! Fixed-pass relaxation of cycles when circular references are allowed.
use super::common::*;
use crate::engine::{EvalConfig, VertexFlags};

#[test]
fn test_two_cell_cycle_relaxes_to_fixed_pass_values() {
    let (engine, s) = build_with(&[&["=B1+1", "=A1+1"]], circular_config());
    assert_eq!(number(&engine, s, "A1"), 200.0);
    assert_eq!(number(&engine, s, "B1"), 199.0);
}

#[test]
fn test_three_cell_cycle_relaxes_to_fixed_pass_values() {
    let (engine, s) = build_with(&[&["=B1+1", "=C1+1", "=A1+1"]], circular_config());
    assert_eq!(number(&engine, s, "A1"), 300.0);
    assert_eq!(number(&engine, s, "B1"), 299.0);
    assert_eq!(number(&engine, s, "C1"), 298.0);
}

#[test]
fn test_self_reference_converges() {
    let (engine, s) = build_with(&[&["=A1*0.9+10"]], circular_config());
    let a1 = number(&engine, s, "A1");
    assert!((a1 - 99.99734386).abs() < 1e-6, "A1 = {a1}");
    let id = engine.graph().vertex_at(&addr(s, "A1")).unwrap();
    assert!(engine.graph().vertex(id).unwrap().flags().contains(VertexFlags::ITERATED));
}

#[test]
fn test_relaxation_resumes_from_last_values() {
    let (mut engine, s) = build_with(&[&["=A1*0.9+B1", "10"]], circular_config());
    let first = number(&engine, s, "A1");
    engine.set_cell_contents(addr(s, "B1"), "10").unwrap();
    let second = number(&engine, s, "A1");
    assert!(second > first);
    assert!(second <= 100.0);
}

#[test]
fn test_iteration_count_and_seed_are_configurable() {
    let config = EvalConfig {
        circular_iterations: 3,
        circular_initial_value: 5.0,
        ..circular_config()
    };
    let (engine, s) = build_with(&[&["=A1+1"]], config);
    assert_eq!(number(&engine, s, "A1"), 8.0);
}

#[test]
fn test_toggling_circular_references_reevaluates() {
    let (mut engine, s) = build(&[&["=B1+1", "=A1+1", "=A1"]]);
    assert!(is_error(&engine, s, "C1", "#CYCLE!"));

    let changes = engine.update_config(circular_config()).unwrap();
    assert_eq!(number(&engine, s, "A1"), 200.0);
    assert_eq!(number(&engine, s, "C1"), 200.0);
    assert!(changed_cells(&changes).contains(&(addr(s, "C1"), 200.0.into())));

    engine.update_config(EvalConfig::default()).unwrap();
    assert!(is_error(&engine, s, "A1", "#CYCLE!"));
}
