//! Cycles without circular references enabled.
use super::common::*;
use crate::engine::{ScheduleStep, Scheduler, VertexFlags};
use calcgraph_common::LiteralValue;

#[test]
fn test_two_cell_cycle_reads_cycle_error() {
    let (engine, s) = build(&[&["=B1", "=A1"]]);
    assert!(is_error(&engine, s, "A1", "#CYCLE!"));
    assert!(is_error(&engine, s, "B1", "#CYCLE!"));
}

#[test]
fn test_self_reference_is_a_cycle() {
    let (engine, s) = build(&[&["=A1+1"]]);
    assert!(is_error(&engine, s, "A1", "#CYCLE!"));
    let id = engine.graph().vertex_at(&addr(s, "A1")).unwrap();
    let flags = engine.graph().vertex(id).unwrap().flags();
    assert!(flags.contains(VertexFlags::CYCLIC));
}

#[test]
fn test_cycle_error_reaches_dependents_only() {
    let (engine, s) = build(&[&["=B1", "=A1", "=A1*2", "7", "=D1+1"]]);
    assert!(is_error(&engine, s, "C1", "#CYCLE!"));
    assert_eq!(number(&engine, s, "E1"), 8.0);
}

#[test]
fn test_breaking_the_cycle_recovers_values() {
    let (mut engine, s) = build(&[&["=B1", "=A1", "=A1+1"]]);
    assert!(is_error(&engine, s, "C1", "#CYCLE!"));

    engine.set_cell_contents(addr(s, "B1"), "5").unwrap();
    assert_eq!(number(&engine, s, "A1"), 5.0);
    assert_eq!(number(&engine, s, "C1"), 6.0);
    let id = engine.graph().vertex_at(&addr(s, "A1")).unwrap();
    assert!(engine.graph().vertex(id).unwrap().flags().is_empty());
}

#[test]
fn test_cycle_through_a_range() {
    let (engine, s) = build(&[&["1"], &["2"], &["=SUM(A1:A3)"]]);
    assert!(is_error(&engine, s, "A3", "#CYCLE!"));
    assert_eq!(value(&engine, s, "A1"), LiteralValue::Number(1.0));
}

#[test]
fn test_scheduler_groups_cycle_members() {
    let (engine, s) = build(&[&["=B1", "=C1", "=A1", "=A1+1"]]);
    let graph = engine.graph();
    let roots: Vec<_> = ["A1", "D1"]
        .iter()
        .map(|a| graph.vertex_at(&addr(s, a)).unwrap())
        .collect();
    let schedule = Scheduler::new(&graph.graph).create_schedule(&roots);
    let cycles: Vec<&[_]> = schedule.cycles().collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), 3);
    let d1 = graph.vertex_at(&addr(s, "D1")).unwrap();
    assert_eq!(schedule.steps.last(), Some(&ScheduleStep::Single(d1)));
}
