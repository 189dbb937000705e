//! Undo/redo stacks over [`UndoEntry`] records.
use super::change_log::UndoEntry;
use super::vertex_editor::{EditorError, SheetLimits, VertexEditor};
use crate::engine::graph::DependencyGraph;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct UndoEngine {
    undo_stack: VecDeque<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    limit: usize,
    /// Entries collected by an open batch.
    pending: Option<Vec<UndoEntry>>,
    depth: usize,
}

impl Default for UndoEngine {
    fn default() -> Self {
        Self::new(20)
    }
}

impl UndoEngine {
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            limit,
            pending: None,
            depth: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Change the stack depth, dropping the oldest entries beyond it.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.trim();
    }

    fn trim(&mut self) {
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
    }

    /// Record a completed operation. Outside a batch this also
    /// invalidates everything that could be redone.
    pub fn push(&mut self, entry: UndoEntry) {
        if let Some(pending) = self.pending.as_mut() {
            pending.push(entry);
            return;
        }
        self.redo_stack.clear();
        self.push_undo(entry);
    }

    fn push_undo(&mut self, entry: UndoEntry) {
        if self.limit == 0 {
            return;
        }
        self.undo_stack.push_back(entry);
        self.trim();
    }

    pub fn is_batching(&self) -> bool {
        self.pending.is_some()
    }

    /// Start collecting entries. Nested batches join the outermost one.
    pub fn begin_batch(&mut self) {
        self.depth += 1;
        if self.pending.is_none() {
            self.pending = Some(Vec::new());
        }
    }

    /// Close a batch level. Closing the outermost level pushes the
    /// collected entries as one.
    pub fn commit_batch(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return;
        }
        if let Some(entries) = self.pending.take() {
            if !entries.is_empty() {
                self.push(UndoEntry::Batch(entries));
            }
        }
    }

    /// Abandon the open batch entirely and hand back what it collected,
    /// oldest first, so the caller can roll it back. The redo stack is
    /// left alone.
    pub fn abort_batch(&mut self) -> Vec<UndoEntry> {
        self.depth = 0;
        self.pending.take().unwrap_or_default()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// The entry the next [`undo`](Self::undo) would invert.
    pub fn peek_undo(&self) -> Option<&UndoEntry> {
        self.undo_stack.back()
    }

    pub fn peek_redo(&self) -> Option<&UndoEntry> {
        self.redo_stack.last()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear_undo_stack(&mut self) {
        self.undo_stack.clear();
    }

    pub fn clear_redo_stack(&mut self) {
        self.redo_stack.clear();
    }

    /// Invert the most recent entry and move it to the redo stack.
    pub fn undo(&mut self, graph: &mut DependencyGraph) -> Result<UndoEntry, EditorError> {
        if self.is_batching() {
            return Err(EditorError::InvalidArguments(
                "undo is not allowed inside a batch".into(),
            ));
        }
        let entry = self.undo_stack.pop_back().ok_or(EditorError::NoOperationToUndo)?;
        let _span = tracing::debug_span!("undo", entry = entry.label()).entered();
        VertexEditor::new(graph).apply_inverse(&entry);
        self.redo_stack.push(entry.clone());
        Ok(entry)
    }

    /// Perform the most recently undone entry again. The fresh record
    /// goes back on the undo stack; the rest of the redo stack survives.
    pub fn redo(
        &mut self,
        graph: &mut DependencyGraph,
        limits: SheetLimits,
    ) -> Result<UndoEntry, EditorError> {
        if self.is_batching() {
            return Err(EditorError::InvalidArguments(
                "redo is not allowed inside a batch".into(),
            ));
        }
        let entry = self.redo_stack.pop().ok_or(EditorError::NoOperationToRedo)?;
        let _span = tracing::debug_span!("redo", entry = entry.label()).entered();
        match VertexEditor::new(graph).with_limits(limits).replay(&entry) {
            Ok(fresh) => {
                self.push_undo(fresh.clone());
                Ok(fresh)
            }
            Err(e) => {
                self.redo_stack.push(entry);
                Err(e)
            }
        }
    }
}
