//! Notifications sent to listeners registered on the engine.

use crate::engine::changes::CellValueChange;

/// Something that happened to the workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SheetAdded {
        name: String,
    },
    /// `changes` are the values that changed because the sheet went away.
    SheetRemoved {
        name: String,
        changes: Vec<CellValueChange>,
    },
    SheetRenamed {
        old_name: String,
        new_name: String,
    },
    NamedExpressionAdded {
        name: String,
        changes: Vec<CellValueChange>,
    },
    NamedExpressionRemoved {
        name: String,
        changes: Vec<CellValueChange>,
    },
    /// Sent after every recalculation that changed at least one value.
    ValuesUpdated {
        changes: Vec<CellValueChange>,
    },
}

/// Handle returned by [`Listeners::add`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&EngineEvent) + Send + 'static>;

#[derive(Default)]
pub struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: impl FnMut(&EngineEvent) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    /// Unregister `id`. Returns whether it was registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(l, _)| *l != id);
        self.entries.len() != before
    }

    /// Call every listener, oldest first.
    pub fn emit(&mut self, event: &EngineEvent) {
        tracing::trace!(?event, listeners = self.entries.len(), "emit");
        for (_, listener) in self.entries.iter_mut() {
            listener(event);
        }
    }
}
