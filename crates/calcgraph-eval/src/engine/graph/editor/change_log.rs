//! Undo records.
//!
//! Every mutating engine call produces one [`UndoEntry`]: plain data
//! describing what happened plus the content it destroyed, enough to
//! invert the call against the graph it left behind.

use crate::engine::graph::snapshot::CellSnapshot;
use crate::engine::named_range::NameScope;
use calcgraph_common::{CellAddress, RangeAddress, SheetId};

/// One cell overwritten by a content edit.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChange {
    pub address: CellAddress,
    pub old: CellSnapshot,
    pub new: CellSnapshot,
}

/// Where a rewritten formula lived before the edit.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaTarget {
    Cell(CellAddress),
    Named { name: String, scope: NameScope },
}

/// A formula as it read before a structural edit rewrote its references.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRestore {
    pub target: FormulaTarget,
    pub snapshot: CellSnapshot,
}

/// What a structural transform destroyed or rewrote. Addresses are the
/// ones in effect before the transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformRecord {
    pub rewritten: Vec<FormulaRestore>,
    pub removed: Vec<(CellAddress, CellSnapshot)>,
}

impl TransformRecord {
    pub fn is_empty(&self) -> bool {
        self.rewritten.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoEntry {
    /// Cell edits, pastes of copied cells and sheet clears. Applied in
    /// order, inverted in reverse.
    SetContents(Vec<ContentChange>),
    InsertRows {
        sheet: SheetId,
        at: u32,
        count: u32,
        record: TransformRecord,
    },
    RemoveRows {
        sheet: SheetId,
        start: u32,
        count: u32,
        record: TransformRecord,
    },
    InsertColumns {
        sheet: SheetId,
        at: u32,
        count: u32,
        record: TransformRecord,
    },
    RemoveColumns {
        sheet: SheetId,
        start: u32,
        count: u32,
        record: TransformRecord,
    },
    /// `record.removed` holds the cells overwritten at the destination.
    MoveCells {
        source: RangeAddress,
        target: CellAddress,
        record: TransformRecord,
    },
    AddSheet {
        sheet: SheetId,
        name: String,
        position: usize,
    },
    RemoveSheet {
        sheet: SheetId,
        name: String,
        position: usize,
        contents: Vec<(CellAddress, CellSnapshot)>,
        /// Expressions scoped to the sheet, removed with it.
        names: Vec<(String, CellSnapshot)>,
        record: TransformRecord,
    },
    RenameSheet {
        sheet: SheetId,
        old_name: String,
        new_name: String,
        record: TransformRecord,
    },
    AddNamedExpression {
        name: String,
        scope: NameScope,
        content: CellSnapshot,
    },
    RemoveNamedExpression {
        name: String,
        scope: NameScope,
        content: CellSnapshot,
    },
    ChangeNamedExpression {
        name: String,
        scope: NameScope,
        old: CellSnapshot,
        new: CellSnapshot,
    },
    /// Several entries undone as one, in reverse order. Row and column
    /// moves are recorded this way too.
    Batch(Vec<UndoEntry>),
}

impl UndoEntry {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            UndoEntry::SetContents(_) => "set_contents",
            UndoEntry::InsertRows { .. } => "insert_rows",
            UndoEntry::RemoveRows { .. } => "remove_rows",
            UndoEntry::InsertColumns { .. } => "insert_columns",
            UndoEntry::RemoveColumns { .. } => "remove_columns",
            UndoEntry::MoveCells { .. } => "move_cells",
            UndoEntry::AddSheet { .. } => "add_sheet",
            UndoEntry::RemoveSheet { .. } => "remove_sheet",
            UndoEntry::RenameSheet { .. } => "rename_sheet",
            UndoEntry::AddNamedExpression { .. } => "add_named_expression",
            UndoEntry::RemoveNamedExpression { .. } => "remove_named_expression",
            UndoEntry::ChangeNamedExpression { .. } => "change_named_expression",
            UndoEntry::Batch(_) => "batch",
        }
    }

    /// Number of leaf entries, counting through batches.
    pub fn len(&self) -> usize {
        match self {
            UndoEntry::Batch(entries) => entries.iter().map(UndoEntry::len).sum(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cells whose content this entry wrote or destroyed. Undoing or
    /// replaying the entry may change the value at each of them.
    pub fn touched_cells(&self) -> Vec<CellAddress> {
        let mut out = Vec::new();
        self.collect_touched(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_touched(&self, out: &mut Vec<CellAddress>) {
        match self {
            UndoEntry::SetContents(changes) => out.extend(changes.iter().map(|c| c.address)),
            UndoEntry::InsertRows { record, .. }
            | UndoEntry::RemoveRows { record, .. }
            | UndoEntry::InsertColumns { record, .. }
            | UndoEntry::RemoveColumns { record, .. }
            | UndoEntry::MoveCells { record, .. }
            | UndoEntry::RenameSheet { record, .. } => {
                out.extend(record.removed.iter().map(|(address, _)| *address));
            }
            UndoEntry::RemoveSheet {
                contents, record, ..
            } => {
                out.extend(contents.iter().map(|(address, _)| *address));
                out.extend(record.removed.iter().map(|(address, _)| *address));
            }
            UndoEntry::Batch(entries) => {
                for entry in entries {
                    entry.collect_touched(out);
                }
            }
            UndoEntry::AddSheet { .. }
            | UndoEntry::AddNamedExpression { .. }
            | UndoEntry::RemoveNamedExpression { .. }
            | UndoEntry::ChangeNamedExpression { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_len_counts_leaves() {
        let leaf = UndoEntry::SetContents(Vec::new());
        let nested = UndoEntry::Batch(vec![
            leaf.clone(),
            UndoEntry::Batch(vec![leaf.clone(), leaf.clone()]),
            UndoEntry::Batch(Vec::new()),
        ]);
        assert_eq!(nested.len(), 3);
        assert!(UndoEntry::Batch(Vec::new()).is_empty());
        assert_eq!(nested.label(), "batch");
    }
}
