use super::change_log::{ContentChange, FormulaRestore, FormulaTarget, TransformRecord, UndoEntry};
use super::reference_adjuster::{ReferenceAdjuster, Relocation, StructuralTransform};
use crate::engine::graph::DependencyGraph;
use crate::engine::graph::snapshot::CellSnapshot;
use crate::engine::named_range::NameScope;
use crate::engine::vertex::{Formula, Vertex, VertexId};
use calcgraph_common::{CellAddress, RangeAddress, SheetId};
use calcgraph_parse::ASTNode;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

/// Why an edit was refused. A refused edit leaves the workbook and the
/// undo history untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("there is no sheet with id {0}")]
    NoSheetWithId(SheetId),
    #[error("there is no sheet named '{0}'")]
    NoSheetWithName(String),
    #[error("sheet name '{0}' is already taken")]
    SheetNameAlreadyTaken(String),
    #[error("sheet size limit exceeded")]
    SheetSizeLimitExceeded,
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("'{0}' is not a formula")]
    NotAFormula(String),
    #[error("rows or columns cannot be inserted or removed through an array")]
    ArraySplit,
    #[error("cells containing an array cannot be moved or copied")]
    SourceLocationHasArray,
    #[error("part of an array cannot be overwritten")]
    TargetLocationHasArray,
    #[error("name '{0}' is already taken")]
    NamedExpressionNameIsAlreadyTaken(String),
    #[error("'{0}' is not a valid name")]
    NamedExpressionNameIsInvalid(String),
    #[error("named expression '{0}' does not exist")]
    NamedExpressionDoesNotExist(String),
    #[error("relative addresses are not allowed in named expressions")]
    NoRelativeAddressesAllowed,
    #[error("array formulas are not allowed in named expressions")]
    ArrayFormulaInNamedExpression,
    #[error("there is no operation to undo")]
    NoOperationToUndo,
    #[error("there is no operation to redo")]
    NoOperationToRedo,
    #[error("there is nothing to paste")]
    NothingToPaste,
    #[error("computations are suspended")]
    EvaluationSuspended,
}

/// Largest sheet the editor will grow to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLimits {
    pub max_rows: u32,
    pub max_columns: u32,
}

impl Default for SheetLimits {
    fn default() -> Self {
        Self {
            max_rows: 40_000,
            max_columns: 18_278,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Rows,
    Columns,
}

impl Axis {
    fn span(self, r: &RangeAddress) -> (u32, u32) {
        match self {
            Axis::Rows => (r.start_row, r.end_row),
            Axis::Columns => (r.start_col, r.end_col),
        }
    }

    fn limit(self, limits: SheetLimits) -> u32 {
        match self {
            Axis::Rows => limits.max_rows,
            Axis::Columns => limits.max_columns,
        }
    }

    fn insert(self, sheet: SheetId, at: u32, count: u32) -> StructuralTransform {
        match self {
            Axis::Rows => StructuralTransform::InsertRows { sheet, at, count },
            Axis::Columns => StructuralTransform::InsertColumns { sheet, at, count },
        }
    }

    fn remove(self, sheet: SheetId, start: u32, count: u32) -> StructuralTransform {
        match self {
            Axis::Rows => StructuralTransform::RemoveRows { sheet, start, count },
            Axis::Columns => StructuralTransform::RemoveColumns { sheet, start, count },
        }
    }

    fn lines(self, sheet: SheetId, start: u32, end: u32) -> RangeAddress {
        match self {
            Axis::Rows => RangeAddress::whole_rows(sheet, start, end),
            Axis::Columns => RangeAddress::whole_columns(sheet, start, end),
        }
    }

    fn origin(self, sheet: SheetId, at: u32) -> CellAddress {
        match self {
            Axis::Rows => CellAddress::new(sheet, at, 0),
            Axis::Columns => CellAddress::new(sheet, 0, at),
        }
    }
}

fn array_footprint(anchor: CellAddress, height: u32, width: u32) -> RangeAddress {
    RangeAddress::new(
        anchor.sheet,
        anchor.row,
        anchor.col,
        anchor.row.saturating_add(height.max(1) - 1),
        anchor.col.saturating_add(width.max(1) - 1),
    )
}

/// Whether `count` lines starting at `start` stay below `limit`.
fn fits(start: u32, count: u32, limit: u32) -> bool {
    start.checked_add(count).is_some_and(|end| end <= limit)
}

/// Sheets whose cells change position under `transform`.
fn positional_sheets(transform: &StructuralTransform) -> Vec<SheetId> {
    match transform {
        StructuralTransform::InsertRows { sheet, .. }
        | StructuralTransform::RemoveRows { sheet, .. }
        | StructuralTransform::InsertColumns { sheet, .. }
        | StructuralTransform::RemoveColumns { sheet, .. } => vec![*sheet],
        StructuralTransform::MoveCells { source, target } if source.sheet == target.sheet => {
            vec![source.sheet]
        }
        StructuralTransform::MoveCells { source, target } => vec![source.sheet, target.sheet],
        StructuralTransform::RemoveSheet { .. } | StructuralTransform::RenameSheet { .. } => {
            Vec::new()
        }
    }
}

/// Exclusive access to the dependency graph for every edit that must be
/// undoable. Each public operation validates first, mutates second, and
/// returns the [`UndoEntry`] that inverts it.
pub struct VertexEditor<'g> {
    graph: &'g mut DependencyGraph,
    limits: SheetLimits,
}

impl<'g> VertexEditor<'g> {
    pub fn new(graph: &'g mut DependencyGraph) -> Self {
        Self {
            graph,
            limits: SheetLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: SheetLimits) -> Self {
        self.limits = limits;
        self
    }

    fn ensure_sheet(&self, sheet: SheetId) -> Result<(), EditorError> {
        if self.graph.sheets.contains(sheet) {
            Ok(())
        } else {
            Err(EditorError::NoSheetWithId(sheet))
        }
    }

    fn ensure_in_limits(&self, addr: &CellAddress) -> Result<(), EditorError> {
        if addr.row >= self.limits.max_rows || addr.col >= self.limits.max_columns {
            Err(EditorError::SheetSizeLimitExceeded)
        } else {
            Ok(())
        }
    }

    /* ───────────────────────── contents ───────────────────────── */

    /// Write `contents` in order. Every address is checked before the
    /// first write.
    pub fn set_contents(
        &mut self,
        contents: Vec<(CellAddress, CellSnapshot)>,
    ) -> Result<UndoEntry, EditorError> {
        let written: FxHashSet<CellAddress> = contents.iter().map(|(a, _)| *a).collect();
        for (addr, snapshot) in &contents {
            self.ensure_sheet(addr.sheet)?;
            self.ensure_in_limits(addr)?;
            if let Some((footprint, _)) = self.graph.arrays.containing(addr) {
                if footprint.start() != *addr && !written.contains(&footprint.start()) {
                    return Err(EditorError::TargetLocationHasArray);
                }
            }
            if let CellSnapshot::ArrayFormula { height, width, .. } = snapshot {
                let footprint = array_footprint(*addr, *height, *width);
                self.ensure_in_limits(&footprint.end())?;
                for (other, _) in self.graph.arrays.overlapping(&footprint) {
                    if !written.contains(&other.start()) {
                        return Err(EditorError::TargetLocationHasArray);
                    }
                }
            }
        }

        let mut changes = Vec::with_capacity(contents.len());
        for (addr, new) in contents {
            if let CellSnapshot::ArrayFormula { height, width, .. } = &new {
                let footprint = array_footprint(addr, *height, *width);
                for cell in footprint.cells().filter(|c| *c != addr) {
                    let old = self.graph.snapshot_cell(&cell);
                    if !old.is_empty() {
                        self.graph.restore_cell(cell, &CellSnapshot::Empty);
                        changes.push(ContentChange {
                            address: cell,
                            old,
                            new: CellSnapshot::Empty,
                        });
                    }
                }
            }
            let old = self.graph.snapshot_cell(&addr);
            self.graph.restore_cell(addr, &new);
            changes.push(ContentChange {
                address: addr,
                old,
                new,
            });
        }
        Ok(UndoEntry::SetContents(changes))
    }

    /// Non-empty contents of a sheet in row-major order.
    pub fn sheet_contents(&self, sheet: SheetId) -> Vec<(CellAddress, CellSnapshot)> {
        let mut entries = self.graph.addresses.entries_in_sheet(sheet);
        entries.sort();
        entries
            .into_iter()
            .map(|(addr, _)| (addr, self.graph.snapshot_cell(&addr)))
            .filter(|(_, s)| !s.is_empty())
            .collect()
    }

    pub fn clear_sheet(&mut self, sheet: SheetId) -> Result<UndoEntry, EditorError> {
        self.ensure_sheet(sheet)?;
        let cleared = self
            .sheet_contents(sheet)
            .into_iter()
            .map(|(addr, _)| (addr, CellSnapshot::Empty))
            .collect();
        self.set_contents(cleared)
    }

    /* ───────────────────────── rows and columns ───────────────────────── */

    fn check_insert(&self, axis: Axis, sheet: SheetId, at: u32, count: u32) -> Result<(), EditorError> {
        self.ensure_sheet(sheet)?;
        if count == 0 {
            return Err(EditorError::InvalidArguments("count must be positive".into()));
        }
        let (height, width) = self.graph.addresses.sheet_extent(sheet);
        let used = match axis {
            Axis::Rows => height,
            Axis::Columns => width,
        };
        let limit = axis.limit(self.limits);
        if at > limit || u64::from(used) + u64::from(count) > u64::from(limit) {
            return Err(EditorError::SheetSizeLimitExceeded);
        }
        let splits = self.graph.arrays.in_sheet(sheet).iter().any(|(fp, _)| {
            let (start, end) = axis.span(fp);
            start < at && at <= end
        });
        if splits {
            return Err(EditorError::ArraySplit);
        }
        Ok(())
    }

    fn check_remove(&self, axis: Axis, sheet: SheetId, start: u32, count: u32) -> Result<(), EditorError> {
        self.ensure_sheet(sheet)?;
        if count == 0 {
            return Err(EditorError::InvalidArguments("count must be positive".into()));
        }
        if !fits(start, count, axis.limit(self.limits)) {
            return Err(EditorError::InvalidArguments(format!(
                "cannot remove {count} lines from {start}: outside the sheet"
            )));
        }
        Ok(())
    }

    pub fn insert_rows(&mut self, sheet: SheetId, at: u32, count: u32) -> Result<UndoEntry, EditorError> {
        self.check_insert(Axis::Rows, sheet, at, count)?;
        let record = self.apply_transform(&Axis::Rows.insert(sheet, at, count));
        Ok(UndoEntry::InsertRows {
            sheet,
            at,
            count,
            record,
        })
    }

    pub fn remove_rows(&mut self, sheet: SheetId, start: u32, count: u32) -> Result<UndoEntry, EditorError> {
        self.check_remove(Axis::Rows, sheet, start, count)?;
        let record = self.apply_transform(&Axis::Rows.remove(sheet, start, count));
        Ok(UndoEntry::RemoveRows {
            sheet,
            start,
            count,
            record,
        })
    }

    pub fn insert_columns(
        &mut self,
        sheet: SheetId,
        at: u32,
        count: u32,
    ) -> Result<UndoEntry, EditorError> {
        self.check_insert(Axis::Columns, sheet, at, count)?;
        let record = self.apply_transform(&Axis::Columns.insert(sheet, at, count));
        Ok(UndoEntry::InsertColumns {
            sheet,
            at,
            count,
            record,
        })
    }

    pub fn remove_columns(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
    ) -> Result<UndoEntry, EditorError> {
        self.check_remove(Axis::Columns, sheet, start, count)?;
        let record = self.apply_transform(&Axis::Columns.remove(sheet, start, count));
        Ok(UndoEntry::RemoveColumns {
            sheet,
            start,
            count,
            record,
        })
    }

    /// Move `count` lines starting at `start` so they land before line
    /// `target` (counted before the move).
    fn move_lines(
        &mut self,
        axis: Axis,
        sheet: SheetId,
        start: u32,
        count: u32,
        target: u32,
    ) -> Result<UndoEntry, EditorError> {
        self.ensure_sheet(sheet)?;
        let limit = axis.limit(self.limits);
        if count == 0
            || !fits(start, count, limit)
            || target > limit
            || (target >= start && target - start <= count)
        {
            return Err(EditorError::InvalidArguments(format!(
                "cannot move {count} lines from {start} to {target}"
            )));
        }
        self.check_insert(axis, sheet, target, count)?;
        let source = axis.lines(sheet, start, start + count - 1);
        if !self.graph.arrays.overlapping(&source).is_empty() {
            return Err(EditorError::SourceLocationHasArray);
        }
        // Source lines past the target shift by `count` once it is inserted.
        let shifted = if target < start { start.checked_add(count) } else { Some(start) };
        let (start, end) = shifted
            .and_then(|s| Some((s, s.checked_add(count - 1)?)))
            .ok_or(EditorError::SheetSizeLimitExceeded)?;

        let inserted = self.apply_transform(&axis.insert(sheet, target, count));
        let source = axis.lines(sheet, start, end);
        let destination = axis.origin(sheet, target);
        let moved = self.apply_transform(&StructuralTransform::MoveCells {
            source,
            target: destination,
        });
        let removed = self.apply_transform(&axis.remove(sheet, start, count));

        let (first, last) = match axis {
            Axis::Rows => (
                UndoEntry::InsertRows {
                    sheet,
                    at: target,
                    count,
                    record: inserted,
                },
                UndoEntry::RemoveRows {
                    sheet,
                    start,
                    count,
                    record: removed,
                },
            ),
            Axis::Columns => (
                UndoEntry::InsertColumns {
                    sheet,
                    at: target,
                    count,
                    record: inserted,
                },
                UndoEntry::RemoveColumns {
                    sheet,
                    start,
                    count,
                    record: removed,
                },
            ),
        };
        Ok(UndoEntry::Batch(vec![
            first,
            UndoEntry::MoveCells {
                source,
                target: destination,
                record: moved,
            },
            last,
        ]))
    }

    pub fn move_rows(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
        target: u32,
    ) -> Result<UndoEntry, EditorError> {
        self.move_lines(Axis::Rows, sheet, start, count, target)
    }

    pub fn move_columns(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
        target: u32,
    ) -> Result<UndoEntry, EditorError> {
        self.move_lines(Axis::Columns, sheet, start, count, target)
    }

    /// Cut `source` and drop it at `target`, overwriting whatever is
    /// there. References into the source follow the cells; references
    /// into the overwritten block become `#REF!`.
    pub fn move_cells(
        &mut self,
        source: RangeAddress,
        target: CellAddress,
    ) -> Result<UndoEntry, EditorError> {
        self.ensure_sheet(source.sheet)?;
        self.ensure_sheet(target.sheet)?;
        let (Some(height), Some(width)) = (source.height(), source.width()) else {
            return Err(EditorError::InvalidArguments(
                "only a bounded block of cells can be moved".into(),
            ));
        };
        self.ensure_in_limits(&source.end())?;
        let transform = StructuralTransform::MoveCells { source, target };
        let destination = transform
            .move_destination()
            .ok_or_else(|| EditorError::InvalidArguments("not a move".into()))?;
        let in_bounds = fits(target.row, height, self.limits.max_rows)
            && fits(target.col, width, self.limits.max_columns);
        if !in_bounds {
            return Err(EditorError::InvalidArguments(format!(
                "target {} is out of bounds",
                target.to_a1()
            )));
        }
        if !self.graph.arrays.overlapping(&source).is_empty() {
            return Err(EditorError::SourceLocationHasArray);
        }
        if !self.graph.arrays.overlapping(&destination).is_empty() {
            return Err(EditorError::TargetLocationHasArray);
        }
        let record = self.apply_transform(&transform);
        Ok(UndoEntry::MoveCells {
            source,
            target,
            record,
        })
    }

    /* ───────────────────────── sheets ───────────────────────── */

    pub fn add_sheet(&mut self, name: &str) -> Result<(SheetId, UndoEntry), EditorError> {
        if name.trim().is_empty() {
            return Err(EditorError::InvalidArguments("sheet name is empty".into()));
        }
        let id = self
            .graph
            .add_sheet(name)
            .ok_or_else(|| EditorError::SheetNameAlreadyTaken(name.to_string()))?;
        let position = self.graph.sheets.position(id).unwrap_or_default();
        Ok((
            id,
            UndoEntry::AddSheet {
                sheet: id,
                name: name.to_string(),
                position,
            },
        ))
    }

    /// Remove a sheet with its cells and sheet-scoped names. References
    /// to it elsewhere become `#REF!`.
    pub fn remove_sheet(&mut self, sheet: SheetId) -> Result<UndoEntry, EditorError> {
        let name = self
            .graph
            .sheets
            .name(sheet)
            .ok_or(EditorError::NoSheetWithId(sheet))?
            .to_string();
        let position = self.graph.sheets.position(sheet).unwrap_or_default();
        let contents = self.sheet_contents(sheet);
        let mut names: Vec<(String, CellSnapshot)> = self
            .graph
            .names
            .in_sheet_scope(sheet)
            .into_iter()
            .filter(|e| e.added)
            .map(|e| (e.name.clone(), self.graph.snapshot_cell(&e.address)))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        let record = self.apply_transform(&StructuralTransform::RemoveSheet { sheet });
        Ok(UndoEntry::RemoveSheet {
            sheet,
            name,
            position,
            contents,
            names,
            record,
        })
    }

    pub fn rename_sheet(&mut self, sheet: SheetId, new_name: &str) -> Result<UndoEntry, EditorError> {
        let old_name = self
            .graph
            .sheets
            .name(sheet)
            .ok_or(EditorError::NoSheetWithId(sheet))?
            .to_string();
        if new_name.trim().is_empty() {
            return Err(EditorError::InvalidArguments("sheet name is empty".into()));
        }
        if self.graph.sheets.id_for(new_name).is_some_and(|other| other != sheet) {
            return Err(EditorError::SheetNameAlreadyTaken(new_name.to_string()));
        }
        let record = self.apply_transform(&StructuralTransform::RenameSheet {
            sheet,
            new_name: new_name.to_string(),
        });
        Ok(UndoEntry::RenameSheet {
            sheet,
            old_name,
            new_name: new_name.to_string(),
            record,
        })
    }

    /* ───────────────────────── names ───────────────────────── */

    pub fn add_named_expression(
        &mut self,
        name: &str,
        scope: NameScope,
        content: CellSnapshot,
    ) -> Result<UndoEntry, EditorError> {
        if let Some(sheet) = scope.sheet() {
            self.ensure_sheet(sheet)?;
        }
        if !self.graph.names.is_name_available(name, scope) {
            return Err(EditorError::NamedExpressionNameIsAlreadyTaken(name.to_string()));
        }
        self.define_name(name, scope, &content);
        Ok(UndoEntry::AddNamedExpression {
            name: name.to_string(),
            scope,
            content,
        })
    }

    pub fn remove_named_expression(
        &mut self,
        name: &str,
        scope: NameScope,
    ) -> Result<UndoEntry, EditorError> {
        let stored = self
            .graph
            .names
            .named_expression_in_scope(name, scope)
            .map(|e| e.name.clone())
            .ok_or_else(|| EditorError::NamedExpressionDoesNotExist(name.to_string()))?;
        let content = self.undefine_name(&stored, scope).unwrap_or_default();
        Ok(UndoEntry::RemoveNamedExpression {
            name: stored,
            scope,
            content,
        })
    }

    pub fn change_named_expression(
        &mut self,
        name: &str,
        scope: NameScope,
        content: CellSnapshot,
    ) -> Result<UndoEntry, EditorError> {
        let (stored, address) = self
            .graph
            .names
            .named_expression_in_scope(name, scope)
            .map(|e| (e.name.clone(), e.address))
            .ok_or_else(|| EditorError::NamedExpressionDoesNotExist(name.to_string()))?;
        let old = self.graph.snapshot_cell(&address);
        self.graph.restore_cell(address, &content);
        Ok(UndoEntry::ChangeNamedExpression {
            name: stored,
            scope,
            old,
            new: content,
        })
    }

    fn define_name(&mut self, name: &str, scope: NameScope, content: &CellSnapshot) {
        let address = self.graph.names.add(name, scope);
        self.graph.restore_cell(address, content);
        self.graph.rebind_name_readers(name, scope);
    }

    /// Take a name out of use. Readers of a workbook name keep pointing
    /// at its placeholder; readers of a sheet name fall back to the
    /// workbook one.
    fn undefine_name(&mut self, name: &str, scope: NameScope) -> Option<CellSnapshot> {
        let address = self.graph.names.named_expression_in_scope(name, scope)?.address;
        let content = self.graph.snapshot_cell(&address);
        self.graph.names.demote(name, scope);
        self.graph.set_cell_empty(address);
        if scope.sheet().is_some() {
            self.graph.rebind_name_readers(name, scope);
        }
        if self.graph.vertex_at(&address).is_none() {
            self.graph.names.forget(name, scope);
        }
        Some(content)
    }

    fn set_name_content(&mut self, name: &str, scope: NameScope, content: &CellSnapshot) {
        if let Some(address) = self.graph.names.get(name, scope).map(|e| e.address) {
            self.graph.restore_cell(address, content);
        }
    }

    /* ───────────────────────── history ───────────────────────── */

    /// Undo `entry` against the state it produced. Never fails: the
    /// state is trusted to be the one the entry left behind.
    pub(crate) fn apply_inverse(&mut self, entry: &UndoEntry) {
        match entry {
            UndoEntry::SetContents(changes) => {
                for change in changes.iter().rev() {
                    self.graph.restore_cell(change.address, &change.old);
                }
            }
            UndoEntry::InsertRows {
                sheet,
                at,
                count,
                record,
            } => {
                self.apply_transform(&Axis::Rows.remove(*sheet, *at, *count));
                self.restore_record(record);
            }
            UndoEntry::RemoveRows {
                sheet,
                start,
                count,
                record,
            } => {
                self.apply_transform(&Axis::Rows.insert(*sheet, *start, *count));
                self.restore_record(record);
            }
            UndoEntry::InsertColumns {
                sheet,
                at,
                count,
                record,
            } => {
                self.apply_transform(&Axis::Columns.remove(*sheet, *at, *count));
                self.restore_record(record);
            }
            UndoEntry::RemoveColumns {
                sheet,
                start,
                count,
                record,
            } => {
                self.apply_transform(&Axis::Columns.insert(*sheet, *start, *count));
                self.restore_record(record);
            }
            UndoEntry::MoveCells {
                source,
                target,
                record,
            } => {
                let forward = StructuralTransform::MoveCells {
                    source: *source,
                    target: *target,
                };
                if let Some(destination) = forward.move_destination() {
                    self.apply_transform(&StructuralTransform::MoveCells {
                        source: destination,
                        target: source.start(),
                    });
                }
                self.restore_record(record);
            }
            UndoEntry::AddSheet { sheet, .. } => {
                self.graph.sheets.remove(*sheet);
                self.graph.drop_sheet_vertices(*sheet);
            }
            UndoEntry::RemoveSheet {
                sheet,
                name,
                position,
                contents,
                names,
                record,
            } => {
                self.graph.restore_sheet(name, *sheet, *position);
                for (n, content) in names {
                    self.define_name(n, NameScope::Sheet(*sheet), content);
                }
                for (addr, snapshot) in contents {
                    self.graph.restore_cell(*addr, snapshot);
                }
                self.restore_record(record);
            }
            UndoEntry::RenameSheet {
                sheet,
                old_name,
                record,
                ..
            } => {
                self.apply_transform(&StructuralTransform::RenameSheet {
                    sheet: *sheet,
                    new_name: old_name.clone(),
                });
                self.restore_record(record);
            }
            UndoEntry::AddNamedExpression { name, scope, .. } => {
                self.undefine_name(name, *scope);
            }
            UndoEntry::RemoveNamedExpression {
                name,
                scope,
                content,
            } => self.define_name(name, *scope, content),
            UndoEntry::ChangeNamedExpression {
                name, scope, old, ..
            } => self.set_name_content(name, *scope, old),
            UndoEntry::Batch(entries) => {
                for entry in entries.iter().rev() {
                    self.apply_inverse(entry);
                }
            }
        }
    }

    /// Perform `entry` again after it was undone, returning a fresh
    /// record of it. A batch that fails part way is rolled back.
    pub(crate) fn replay(&mut self, entry: &UndoEntry) -> Result<UndoEntry, EditorError> {
        match entry {
            UndoEntry::SetContents(changes) => {
                for change in changes {
                    self.graph.restore_cell(change.address, &change.new);
                }
                Ok(entry.clone())
            }
            UndoEntry::InsertRows {
                sheet, at, count, ..
            } => self.insert_rows(*sheet, *at, *count),
            UndoEntry::RemoveRows {
                sheet,
                start,
                count,
                ..
            } => self.remove_rows(*sheet, *start, *count),
            UndoEntry::InsertColumns {
                sheet, at, count, ..
            } => self.insert_columns(*sheet, *at, *count),
            UndoEntry::RemoveColumns {
                sheet,
                start,
                count,
                ..
            } => self.remove_columns(*sheet, *start, *count),
            UndoEntry::MoveCells { source, target, .. } => {
                let record = self.apply_transform(&StructuralTransform::MoveCells {
                    source: *source,
                    target: *target,
                });
                Ok(UndoEntry::MoveCells {
                    source: *source,
                    target: *target,
                    record,
                })
            }
            UndoEntry::AddSheet {
                sheet,
                name,
                position,
            } => {
                self.graph
                    .restore_sheet(name, *sheet, *position)
                    .ok_or_else(|| EditorError::SheetNameAlreadyTaken(name.clone()))?;
                Ok(entry.clone())
            }
            UndoEntry::RemoveSheet { sheet, .. } => self.remove_sheet(*sheet),
            UndoEntry::RenameSheet {
                sheet, new_name, ..
            } => self.rename_sheet(*sheet, new_name),
            UndoEntry::AddNamedExpression {
                name,
                scope,
                content,
            } => {
                self.define_name(name, *scope, content);
                Ok(entry.clone())
            }
            UndoEntry::RemoveNamedExpression { name, scope, .. } => {
                self.undefine_name(name, *scope);
                Ok(entry.clone())
            }
            UndoEntry::ChangeNamedExpression {
                name, scope, new, ..
            } => {
                self.set_name_content(name, *scope, new);
                Ok(entry.clone())
            }
            UndoEntry::Batch(entries) => {
                let mut done = Vec::with_capacity(entries.len());
                for entry in entries {
                    match self.replay(entry) {
                        Ok(fresh) => done.push(fresh),
                        Err(e) => {
                            for fresh in done.iter().rev() {
                                self.apply_inverse(fresh);
                            }
                            return Err(e);
                        }
                    }
                }
                Ok(UndoEntry::Batch(done))
            }
        }
    }

    fn restore_record(&mut self, record: &TransformRecord) {
        for (addr, snapshot) in &record.removed {
            self.graph.restore_cell(*addr, snapshot);
        }
        for restore in &record.rewritten {
            let address = match &restore.target {
                FormulaTarget::Cell(addr) => Some(*addr),
                FormulaTarget::Named { name, scope } => {
                    self.graph.names.get(name, *scope).map(|e| e.address)
                }
            };
            if let Some(address) = address {
                self.graph.restore_cell(address, &restore.snapshot);
            }
        }
    }

    /* ───────────────────────── transforms ───────────────────────── */

    /// Apply `transform` to cell positions, formula references and range
    /// vertices. Nothing is validated here; undo relies on that.
    pub(crate) fn apply_transform(&mut self, transform: &StructuralTransform) -> TransformRecord {
        let _span = tracing::debug_span!("apply_transform", ?transform).entered();
        let (rewritten, rewrites) = self.plan_rewrites(transform);
        let mut record = TransformRecord {
            rewritten,
            removed: Vec::new(),
        };
        let mut rebind: Vec<VertexId> = Vec::new();
        let mut garbage: Vec<VertexId> = Vec::new();
        let sheets = positional_sheets(transform);

        match transform {
            StructuralTransform::RenameSheet { sheet, new_name } => {
                self.graph.sheets.rename(*sheet, new_name);
            }
            StructuralTransform::RemoveSheet { .. } => {}
            _ => self.remap_cells(transform, &sheets, &mut record, &mut rebind, &mut garbage),
        }

        for (id, ast) in rewrites {
            match self.graph.graph.get_mut(id) {
                Some(Vertex::Formula(f)) => f.formula = Formula::Parsed(ast),
                Some(Vertex::Array(a)) => a.ast = ast,
                _ => continue,
            }
            rebind.push(id);
        }

        match transform {
            StructuralTransform::RemoveSheet { sheet } => {
                self.graph.sheets.remove(*sheet);
                self.graph.drop_sheet_vertices(*sheet);
            }
            StructuralTransform::RenameSheet { new_name, .. } => {
                self.graph.resolve_pending_sheet(new_name);
            }
            _ => self.remap_ranges(transform, &sheets, &mut rebind, &mut garbage),
        }

        rebind.sort();
        rebind.dedup();
        for id in rebind {
            if self.graph.graph.contains(id) {
                self.graph.rebind(id);
            }
        }
        self.graph.collect_garbage(garbage);
        tracing::debug!(
            rewritten = record.rewritten.len(),
            removed = record.removed.len(),
            "transform applied"
        );
        record
    }

    fn formula_target(&self, address: CellAddress) -> FormulaTarget {
        match self.graph.names.by_address(&address) {
            Some(entry) if address.is_named_expression() => FormulaTarget::Named {
                name: entry.name.clone(),
                scope: entry.scope,
            },
            _ => FormulaTarget::Cell(address),
        }
    }

    /// New ASTs for every surviving formula whose references change,
    /// with snapshots of what they were.
    fn plan_rewrites(
        &self,
        transform: &StructuralTransform,
    ) -> (Vec<FormulaRestore>, Vec<(VertexId, Arc<ASTNode>)>) {
        let graph = &*self.graph;
        let adjuster = ReferenceAdjuster::new(&graph.sheets);
        let mut restores = Vec::new();
        let mut rewrites = Vec::new();
        for (id, vertex) in graph.graph.iter() {
            let (ast, address, host) = match vertex {
                Vertex::Formula(f) => match f.ast() {
                    Some(ast) => (ast, f.address, f.host_sheet),
                    None => continue,
                },
                Vertex::Array(a) => (&a.ast, a.anchor, a.anchor.sheet),
                _ => continue,
            };
            let new_host = if address.is_named_expression() {
                if matches!(transform, StructuralTransform::RemoveSheet { sheet } if *sheet == host) {
                    continue;
                }
                host
            } else {
                match transform.transform_cell(address) {
                    Relocation::Destroyed => continue,
                    Relocation::Moved(to) => to.sheet,
                    Relocation::Unchanged => host,
                }
            };
            if let Some(new_ast) = adjuster.adjust_ast(ast, transform, host, new_host) {
                restores.push(FormulaRestore {
                    target: self.formula_target(address),
                    snapshot: graph.snapshot_cell(&address),
                });
                rewrites.push((id, Arc::new(new_ast)));
            }
        }
        (restores, rewrites)
    }

    /// Drop a vertex whose cell no longer exists. Its readers are queued
    /// for rebinding.
    fn destroy_vertex(&mut self, id: VertexId, rebind: &mut Vec<VertexId>, garbage: &mut Vec<VertexId>) {
        rebind.extend(self.graph.graph.dependents(id));
        garbage.extend(self.graph.detach(id));
        self.graph.graph.remove_node(id);
        self.graph.dirty.remove(&id);
    }

    fn remap_cells(
        &mut self,
        transform: &StructuralTransform,
        sheets: &[SheetId],
        record: &mut TransformRecord,
        rebind: &mut Vec<VertexId>,
        garbage: &mut Vec<VertexId>,
    ) {
        let mut placed_arrays = Vec::new();
        for &sheet in sheets {
            for (footprint, id) in self.graph.arrays.in_sheet(sheet) {
                let relocation = match transform.transform_range(footprint) {
                    Relocation::Unchanged => continue,
                    Relocation::Moved(fp) => Some(fp),
                    Relocation::Destroyed => None,
                };
                let anchor = footprint.start();
                let snapshot = self.graph.snapshot_cell(&anchor);
                self.graph.arrays.remove(&anchor);
                for cell in footprint.cells() {
                    self.graph.addresses.remove(&cell);
                }
                match relocation {
                    Some(fp) => {
                        let resized = fp.height() != footprint.height() || fp.width() != footprint.width();
                        let target = FormulaTarget::Cell(anchor);
                        if resized && !record.rewritten.iter().any(|r| r.target == target) {
                            record.rewritten.push(FormulaRestore { target, snapshot });
                        }
                        placed_arrays.push((fp, id, resized));
                    }
                    None => {
                        record.removed.push((anchor, snapshot));
                        self.destroy_vertex(id, rebind, garbage);
                    }
                }
            }
        }

        let mut placed = Vec::new();
        for &sheet in sheets {
            let mut entries = self.graph.addresses.entries_in_sheet(sheet);
            entries.sort();
            for (addr, id) in entries {
                if matches!(self.graph.graph.get(id), Some(Vertex::Array(_))) {
                    continue;
                }
                match transform.transform_cell(addr) {
                    Relocation::Unchanged => {}
                    Relocation::Moved(to) => {
                        self.graph.addresses.remove(&addr);
                        placed.push((to, id));
                    }
                    Relocation::Destroyed => {
                        let snapshot = self.graph.snapshot_cell(&addr);
                        if !snapshot.is_empty() {
                            record.removed.push((addr, snapshot));
                        }
                        self.graph.addresses.remove(&addr);
                        self.destroy_vertex(id, rebind, garbage);
                    }
                }
            }
        }

        for (to, id) in placed {
            self.graph.addresses.set(to, id);
            match self.graph.graph.get_mut(id) {
                Some(Vertex::Empty(a)) => *a = to,
                Some(Vertex::Value(c)) => c.address = to,
                Some(Vertex::Formula(f)) => {
                    f.address = to;
                    if f.host_sheet != to.sheet {
                        f.host_sheet = to.sheet;
                        rebind.push(id);
                    }
                }
                _ => {}
            }
        }
        // Partially removed arrays shrink and are recomputed.
        for (footprint, id, resized) in placed_arrays {
            for cell in footprint.cells() {
                self.graph.addresses.set(cell, id);
            }
            self.graph.arrays.insert(footprint, id);
            if let Some(Vertex::Array(a)) = self.graph.graph.get_mut(id) {
                a.anchor = footprint.start();
                if resized {
                    a.height = footprint.height().unwrap_or(a.height);
                    a.width = footprint.width().unwrap_or(a.width);
                    a.values = None;
                    rebind.push(id);
                }
            }
        }
    }

    /// Re-key range vertices of the touched sheets. Ranges that collapse
    /// onto the same rectangle are merged; every survivor is relinked.
    fn remap_ranges(
        &mut self,
        transform: &StructuralTransform,
        sheets: &[SheetId],
        rebind: &mut Vec<VertexId>,
        garbage: &mut Vec<VertexId>,
    ) {
        let mut entries = Vec::new();
        for &sheet in sheets {
            entries.extend(self.graph.ranges.in_sheet(sheet));
        }
        entries.sort();
        for (range, _) in &entries {
            self.graph.ranges.remove(range);
        }
        let mut survivors = Vec::new();
        for (range, id) in entries {
            let Some(moved) = transform.transform_range(range).resolve(range) else {
                self.destroy_vertex(id, rebind, garbage);
                continue;
            };
            match self.graph.ranges.get(&moved) {
                Some(existing) => {
                    let readers: Vec<VertexId> = self.graph.graph.dependents(id).collect();
                    for reader in readers {
                        self.graph.graph.add_edge(existing, reader);
                    }
                    garbage.extend(self.graph.detach(id));
                    self.graph.graph.remove_node(id);
                    self.graph.dirty.remove(&id);
                }
                None => {
                    if let Some(Vertex::Range(r)) = self.graph.graph.get_mut(id) {
                        r.range = moved;
                        r.clear_cache();
                    }
                    self.graph.ranges.insert(moved, id);
                    survivors.push(id);
                }
            }
        }
        for id in survivors {
            if self.graph.graph.contains(id) {
                self.graph.relink_range(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcgraph_common::LiteralValue;
    use calcgraph_parse::parse;

    fn workbook() -> (DependencyGraph, SheetId) {
        let mut g = DependencyGraph::default();
        let s = g.add_sheet("Sheet1").unwrap();
        (g, s)
    }

    fn value(n: f64) -> CellSnapshot {
        CellSnapshot::Value {
            value: LiteralValue::Number(n),
            raw: n.into(),
        }
    }

    fn formula(text: &str) -> CellSnapshot {
        CellSnapshot::Formula(Arc::new(parse(text).unwrap()))
    }

    fn put(g: &mut DependencyGraph, s: SheetId, a1: &str, content: CellSnapshot) {
        let addr = CellAddress::parse_a1(s, a1).unwrap();
        VertexEditor::new(g).set_contents(vec![(addr, content)]).unwrap();
    }

    fn text_at(g: &DependencyGraph, s: SheetId, a1: &str) -> String {
        let addr = CellAddress::parse_a1(s, a1).unwrap();
        match g.snapshot_cell(&addr).to_raw() {
            crate::engine::content::RawCellContent::Text(t) => t,
            crate::engine::content::RawCellContent::Number(n) => n.to_string(),
            other => format!("{other:?}"),
        }
    }

    #[test]
    fn insert_rows_moves_cells_and_references() {
        let (mut g, s) = workbook();
        put(&mut g, s, "A2", value(5.0));
        put(&mut g, s, "B1", formula("=A2*2"));
        put(&mut g, s, "C1", formula("=SUM(A1:A3)"));

        let entry = VertexEditor::new(&mut g).insert_rows(s, 1, 2).unwrap();
        assert_eq!(text_at(&g, s, "A4"), "5");
        assert_eq!(text_at(&g, s, "B1"), "=A4*2");
        assert_eq!(text_at(&g, s, "C1"), "=SUM(A1:A5)");
        assert!(g.vertex_at(&CellAddress::new(s, 1, 0)).is_none());
        assert!(g.check_edges());

        VertexEditor::new(&mut g).apply_inverse(&entry);
        assert_eq!(text_at(&g, s, "A2"), "5");
        assert_eq!(text_at(&g, s, "B1"), "=A2*2");
        assert_eq!(text_at(&g, s, "C1"), "=SUM(A1:A3)");
    }

    #[test]
    fn remove_rows_records_removed_cells() {
        let (mut g, s) = workbook();
        put(&mut g, s, "A1", value(1.0));
        put(&mut g, s, "A2", value(2.0));
        put(&mut g, s, "A3", value(3.0));
        put(&mut g, s, "B1", formula("=A2+A3"));

        let entry = VertexEditor::new(&mut g).remove_rows(s, 1, 1).unwrap();
        assert_eq!(text_at(&g, s, "B1"), "=#REF!+A2");
        assert_eq!(text_at(&g, s, "A2"), "3");
        match &entry {
            UndoEntry::RemoveRows { record, .. } => {
                assert_eq!(record.removed.len(), 1);
                assert_eq!(record.rewritten.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        VertexEditor::new(&mut g).apply_inverse(&entry);
        assert_eq!(text_at(&g, s, "A2"), "2");
        assert_eq!(text_at(&g, s, "A3"), "3");
        assert_eq!(text_at(&g, s, "B1"), "=A2+A3");
        assert!(g.check_edges());
    }

    #[test]
    fn arrays_block_splitting_edits() {
        let (mut g, s) = workbook();
        let ast = Arc::new(parse("={1;2;3}").unwrap());
        put(
            &mut g,
            s,
            "B2",
            CellSnapshot::ArrayFormula {
                ast,
                height: 3,
                width: 1,
            },
        );
        let mut editor = VertexEditor::new(&mut g);
        assert_eq!(editor.insert_rows(s, 2, 1), Err(EditorError::ArraySplit));
        assert_eq!(
            editor.set_contents(vec![(CellAddress::new(s, 2, 1), value(1.0))]),
            Err(EditorError::TargetLocationHasArray)
        );
        assert!(editor.insert_rows(s, 1, 1).is_ok());
        assert!(g.arrays.get(&CellAddress::new(s, 2, 1)).is_some());
    }

    #[test]
    fn removing_part_of_an_array_shrinks_it() {
        let (mut g, s) = workbook();
        let ast = Arc::new(parse("={1;2;3}").unwrap());
        let anchor = CellAddress::new(s, 1, 1);
        put(
            &mut g,
            s,
            "B2",
            CellSnapshot::ArrayFormula {
                ast,
                height: 3,
                width: 1,
            },
        );
        let entry = VertexEditor::new(&mut g).remove_rows(s, 3, 1).unwrap();
        let (footprint, _) = g.arrays.get(&anchor).unwrap();
        assert_eq!(footprint.height(), Some(2));
        assert!(g.vertex_at(&CellAddress::new(s, 3, 1)).is_none());

        VertexEditor::new(&mut g).apply_inverse(&entry);
        let (footprint, _) = g.arrays.get(&anchor).unwrap();
        assert_eq!(footprint.height(), Some(3));
        assert_eq!(g.arrays.len(), 1);
    }

    #[test]
    fn move_cells_overwrites_destination() {
        let (mut g, s) = workbook();
        put(&mut g, s, "A1", value(1.0));
        put(&mut g, s, "C1", value(9.0));
        put(&mut g, s, "D1", formula("=A1+C1"));

        let source = RangeAddress::single(CellAddress::parse_a1(s, "A1").unwrap());
        let target = CellAddress::parse_a1(s, "C1").unwrap();
        let entry = VertexEditor::new(&mut g).move_cells(source, target).unwrap();
        assert_eq!(text_at(&g, s, "C1"), "1");
        assert_eq!(text_at(&g, s, "D1"), "=C1+#REF!");

        VertexEditor::new(&mut g).apply_inverse(&entry);
        assert_eq!(text_at(&g, s, "A1"), "1");
        assert_eq!(text_at(&g, s, "C1"), "9");
        assert_eq!(text_at(&g, s, "D1"), "=A1+C1");
    }

    #[test]
    fn move_rows_is_insert_move_remove() {
        let (mut g, s) = workbook();
        for (i, a1) in ["A1", "A2", "A3"].iter().enumerate() {
            put(&mut g, s, a1, value(i as f64 + 1.0));
        }
        let entry = VertexEditor::new(&mut g).move_rows(s, 0, 1, 3).unwrap();
        assert_eq!(entry.len(), 3);
        assert_eq!(text_at(&g, s, "A1"), "2");
        assert_eq!(text_at(&g, s, "A2"), "3");
        assert_eq!(text_at(&g, s, "A3"), "1");

        assert!(matches!(
            VertexEditor::new(&mut g).move_rows(s, 0, 2, 1),
            Err(EditorError::InvalidArguments(_))
        ));
    }

    #[test]
    fn removed_sheet_comes_back_with_its_names() {
        let (mut g, s) = workbook();
        let data = g.add_sheet("Data").unwrap();
        put(&mut g, data, "A1", value(4.0));
        put(&mut g, s, "A1", formula("=Data!A1+Local"));
        VertexEditor::new(&mut g)
            .add_named_expression("Local", NameScope::Sheet(data), value(1.0))
            .unwrap();

        let entry = VertexEditor::new(&mut g).remove_sheet(data).unwrap();
        assert_eq!(text_at(&g, s, "A1"), "=#REF!+Local");
        assert!(g.names.named_expression_in_scope("Local", NameScope::Sheet(data)).is_none());

        VertexEditor::new(&mut g).apply_inverse(&entry);
        assert_eq!(g.sheet_id("data"), Some(data));
        assert_eq!(text_at(&g, s, "A1"), "=Data!A1+Local");
        assert!(g.names.named_expression_in_scope("Local", NameScope::Sheet(data)).is_some());
        assert!(g.check_edges());
    }

    #[test]
    fn rename_rewrites_qualified_references() {
        let (mut g, s) = workbook();
        let data = g.add_sheet("Data").unwrap();
        put(&mut g, s, "A1", formula("=Data!B2"));
        let entry = VertexEditor::new(&mut g).rename_sheet(data, "Inputs").unwrap();
        assert_eq!(text_at(&g, s, "A1"), "=Inputs!B2");
        assert_eq!(
            VertexEditor::new(&mut g).rename_sheet(data, "sheet1"),
            Err(EditorError::SheetNameAlreadyTaken("sheet1".into()))
        );
        VertexEditor::new(&mut g).apply_inverse(&entry);
        assert_eq!(text_at(&g, s, "A1"), "=Data!B2");
    }

    #[test]
    fn sheet_names_shadow_workbook_names() {
        let (mut g, s) = workbook();
        let reader = CellAddress::parse_a1(s, "A1").unwrap();
        put(&mut g, s, "A1", formula("=Rate"));
        let mut editor = VertexEditor::new(&mut g);
        editor
            .add_named_expression("Rate", NameScope::Workbook, value(1.0))
            .unwrap();
        let local = editor
            .add_named_expression("rate", NameScope::Sheet(s), value(2.0))
            .unwrap();
        let id = g.vertex_at(&reader).unwrap();
        let bound = g.dependencies(id);
        let sheet_entry = g.names.get("Rate", NameScope::Sheet(s)).unwrap().address;
        assert_eq!(bound, vec![g.vertex_at(&sheet_entry).unwrap()]);

        VertexEditor::new(&mut g).apply_inverse(&local);
        let workbook_entry = g.names.get("Rate", NameScope::Workbook).unwrap().address;
        assert_eq!(g.dependencies(id), vec![g.vertex_at(&workbook_entry).unwrap()]);
        assert!(g.names.get("Rate", NameScope::Sheet(s)).is_none());
    }
}
