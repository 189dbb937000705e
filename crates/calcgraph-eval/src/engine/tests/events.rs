//! Listeners hear about sheets, names and recalculated values.
use super::common::*;
use crate::engine::{ChangeAddress, Engine, EngineEvent};
use calcgraph_common::LiteralValue;
use std::sync::{Arc, Mutex};

type Heard = Arc<Mutex<Vec<EngineEvent>>>;

fn listen(engine: &mut Engine) -> Heard {
    let heard: Heard = Arc::default();
    let sink = heard.clone();
    engine.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    heard
}

fn drain(heard: &Heard) -> Vec<EngineEvent> {
    std::mem::take(&mut *heard.lock().unwrap())
}

fn values_updated(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::ValuesUpdated { .. }))
        .count()
}

#[test]
fn test_sheet_events() {
    let (mut engine, s) = build(&[&["=Data!A1*2"]]);
    let heard = listen(&mut engine);

    let data = engine.add_sheet("Data").unwrap();
    let events = drain(&heard);
    assert_eq!(
        events.last(),
        Some(&EngineEvent::SheetAdded {
            name: "Data".into()
        })
    );
    assert_eq!(number(&engine, s, "A1"), 0.0);

    engine.rename_sheet(data, "Input").unwrap();
    assert_eq!(
        drain(&heard),
        vec![EngineEvent::SheetRenamed {
            old_name: "Data".into(),
            new_name: "Input".into(),
        }]
    );
    engine.rename_sheet(data, "Input").unwrap();
    assert!(drain(&heard).is_empty(), "same name is not a rename");

    engine.set_cell_contents(addr(data, "A1"), 4).unwrap();
    let events = drain(&heard);
    assert!(matches!(
        events.as_slice(),
        [EngineEvent::ValuesUpdated { changes }] if changes.len() == 2
    ));

    engine.remove_sheet(data).unwrap();
    let events = drain(&heard);
    let Some(EngineEvent::SheetRemoved { name, changes }) = events.last() else {
        panic!("expected a removal, got {events:?}");
    };
    assert_eq!(name, "Input");
    assert!(changes.iter().any(|c| {
        c.address == ChangeAddress::Cell(addr(s, "A1"))
            && matches!(&c.new_value, LiteralValue::Error(e) if e.kind.code() == "#REF!")
    }));
}

#[test]
fn test_named_expression_events() {
    let (mut engine, s) = build(&[&["=Rate*10"]]);
    let heard = listen(&mut engine);

    engine.add_named_expression("Rate", 0.5, None).unwrap();
    let events = drain(&heard);
    assert_eq!(values_updated(&events), 1);
    let Some(EngineEvent::NamedExpressionAdded { name, changes }) = events.last() else {
        panic!("expected an added name, got {events:?}");
    };
    assert_eq!(name, "Rate");
    assert!(changes.iter().any(|c| {
        c.address == ChangeAddress::Cell(addr(s, "A1")) && c.new_value == LiteralValue::Number(5.0)
    }));

    engine.remove_named_expression("Rate", None).unwrap();
    let events = drain(&heard);
    assert!(matches!(
        events.last(),
        Some(EngineEvent::NamedExpressionRemoved { name, .. }) if name == "Rate"
    ));
    assert!(is_error(&engine, s, "A1", "#NAME?"));

    assert!(engine.remove_named_expression("Rate", None).is_err());
    assert!(drain(&heard).is_empty(), "refused calls stay silent");
}

#[test]
fn test_values_updated_once_per_batch_and_after_resume() {
    let (mut engine, s) = build(&[&["1", "=A1*2"]]);
    let heard = listen(&mut engine);

    engine
        .batch(|e| {
            e.set_cell_contents(addr(s, "A1"), 2)?;
            e.set_cell_contents(addr(s, "A1"), 3)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(values_updated(&drain(&heard)), 1);

    engine.suspend_evaluation();
    engine.set_cell_contents(addr(s, "A1"), 4).unwrap();
    assert!(drain(&heard).is_empty());
    engine.resume_evaluation();
    let events = drain(&heard);
    assert!(matches!(
        events.as_slice(),
        [EngineEvent::ValuesUpdated { changes }] if changes.len() == 2
    ));

    engine.set_cell_contents(addr(s, "A1"), 4).unwrap();
    assert!(drain(&heard).is_empty(), "nothing changed");
}

#[test]
fn test_removed_listener_is_not_called() {
    let (mut engine, s) = build(&[&["1"]]);
    let heard: Heard = Arc::default();
    let sink = heard.clone();
    let id = engine.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    assert!(engine.off_event(id));
    assert!(!engine.off_event(id));

    engine.set_cell_contents(addr(s, "A1"), 2).unwrap();
    engine.add_sheet("Other").unwrap();
    assert!(drain(&heard).is_empty());
}
