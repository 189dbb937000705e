use crate::engine::changes::{CellValueChange, ChangeAddress, ChangeList};
use crate::engine::clipboard::Clipboard;
use crate::engine::events::{EngineEvent, ListenerId, Listeners};
use crate::engine::content::{ParsedContent, RawCellContent, parse_content};
use crate::engine::graph::DependencyGraph;
use crate::engine::graph::editor::{EditorError, UndoEngine, UndoEntry, VertexEditor};
use crate::engine::graph::snapshot::CellSnapshot;
use crate::engine::named_range::{NameScope, is_name_valid};
use crate::engine::scheduler::{ScheduleStep, Scheduler};
use crate::engine::vertex::{Vertex, VertexFlags, VertexId};
use crate::engine::EvalConfig;
use crate::interpreter::StandardEvaluator;
use crate::traits::{EvaluationContext, FormulaEvaluator};
use calcgraph_common::{
    CellAddress, ExcelError, ExcelErrorKind, LiteralValue, RangeAddress, SheetId,
};
use calcgraph_parse::ReferenceType;
use std::sync::Arc;

/// What a cell holds, as opposed to what it evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Empty,
    Value,
    Formula,
    /// Top-left cell of an array formula.
    ArrayFormula,
    /// Any other cell covered by an array formula.
    Array,
}

/// Read view of the graph for one formula evaluation.
struct GraphContext<'a> {
    graph: &'a DependencyGraph,
    host: SheetId,
    cell: CellAddress,
}

impl<'a> GraphContext<'a> {
    fn new(graph: &'a DependencyGraph, host: SheetId, cell: CellAddress) -> Self {
        Self { graph, host, cell }
    }

    fn range_vertex<T>(
        &self,
        range: &RangeAddress,
        f: impl FnOnce(&crate::engine::vertex::RangeVertex) -> T,
    ) -> Option<T> {
        let id = self.graph.ranges.get(range)?;
        match self.graph.graph.get(id)? {
            Vertex::Range(r) => Some(f(r)),
            _ => None,
        }
    }
}

impl EvaluationContext for GraphContext<'_> {
    fn resolve_cell(&self, address: &CellAddress) -> LiteralValue {
        self.graph.value_at(address)
    }

    fn resolve_range(&self, range: &RangeAddress) -> Vec<Vec<LiteralValue>> {
        let Some(clipped) = self.graph.addresses.clip(range) else {
            return Vec::new();
        };
        (clipped.start_row..=clipped.end_row)
            .map(|row| {
                (clipped.start_col..=clipped.end_col)
                    .map(|col| self.graph.value_at(&CellAddress::new(clipped.sheet, row, col)))
                    .collect()
            })
            .collect()
    }

    fn resolve_name(&self, name: &str) -> LiteralValue {
        match self
            .graph
            .names
            .named_expression_for_scope(name, Some(self.host))
            .filter(|e| e.added)
        {
            Some(entry) => self.graph.value_at(&entry.address),
            None => LiteralValue::Error(
                ExcelError::new_name().with_message(format!("name '{name}' is not defined")),
            ),
        }
    }

    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.graph.sheet_id(name)
    }

    fn host_sheet(&self) -> SheetId {
        self.host
    }

    fn current_cell(&self) -> CellAddress {
        self.cell
    }

    fn cached_aggregate(&self, range: &RangeAddress, key: &str) -> Option<LiteralValue> {
        self.range_vertex(range, |r| r.cached(key)).flatten()
    }

    fn store_aggregate(&self, range: &RangeAddress, key: &str, value: LiteralValue) {
        self.range_vertex(range, |r| r.store(key, value));
    }

    fn smaller_range(&self, range: &RangeAddress) -> Option<RangeAddress> {
        self.graph.ranges.find_smaller_range(range).map(|(r, _)| r)
    }
}

/// Shape an array formula's result to its footprint. Single rows and
/// columns are broadcast; cells the result does not cover read `#N/A`.
fn fit_array(value: LiteralValue, height: u32, width: u32, null_to_zero: bool) -> Vec<Vec<LiteralValue>> {
    let fill = |v: LiteralValue| {
        if null_to_zero && v.is_empty() {
            LiteralValue::Number(0.0)
        } else {
            v
        }
    };
    let (height, width) = (height as usize, width as usize);
    match value {
        LiteralValue::Array(rows) => {
            let rows_in = rows.len();
            let cols_in = rows.first().map_or(0, Vec::len);
            (0..height)
                .map(|i| {
                    (0..width)
                        .map(|j| {
                            let si = if rows_in == 1 { 0 } else { i };
                            let sj = if cols_in == 1 { 0 } else { j };
                            rows.get(si)
                                .and_then(|r| r.get(sj))
                                .cloned()
                                .map(fill)
                                .unwrap_or_else(|| LiteralValue::Error(ExcelError::new_na()))
                        })
                        .collect()
                })
                .collect()
        }
        scalar => vec![vec![fill(scalar); width]; height],
    }
}

fn is_relative(reference: &ReferenceType) -> bool {
    match reference {
        ReferenceType::Cell { anchor, .. } => !anchor.row_abs || !anchor.col_abs,
        ReferenceType::Range {
            start_row,
            start_col,
            end_row,
            end_col,
            start_anchor,
            end_anchor,
            ..
        } => {
            (start_row.is_some() && !start_anchor.row_abs)
                || (start_col.is_some() && !start_anchor.col_abs)
                || (end_row.is_some() && !end_anchor.row_abs)
                || (end_col.is_some() && !end_anchor.col_abs)
        }
        ReferenceType::NamedRange(_) => false,
    }
}

/// A workbook with incremental recalculation, structural editing,
/// clipboard and undo/redo.
///
/// Every mutating call returns the values that changed because of it.
/// While evaluation is suspended, changes accumulate and are returned
/// by [`Engine::resume_evaluation`].
pub struct Engine {
    graph: DependencyGraph,
    config: EvalConfig,
    evaluator: Box<dyn FormulaEvaluator>,
    undo: UndoEngine,
    clipboard: Option<Clipboard>,
    changes: ChangeList,
    listeners: Listeners,
    suspended: bool,
    generation: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sheets", &self.graph.sheets.names())
            .field("vertices", &self.graph.vertex_count())
            .field("suspended", &self.suspended)
            .finish()
    }
}

impl Engine {
    pub fn new(config: EvalConfig) -> Self {
        Self::with_evaluator(config, Box::new(StandardEvaluator))
    }

    pub fn with_evaluator(config: EvalConfig, evaluator: Box<dyn FormulaEvaluator>) -> Self {
        Self {
            graph: DependencyGraph::new(config.address_storage),
            undo: UndoEngine::new(config.undo_limit),
            config,
            evaluator,
            clipboard: None,
            changes: ChangeList::new(),
            listeners: Listeners::new(),
            suspended: false,
            generation: 0,
        }
    }

    /// Cold build from named sheets of raw contents. Nothing goes on
    /// the undo stack.
    pub fn build_from_sheets(
        sheets: Vec<(String, Vec<Vec<RawCellContent>>)>,
        config: EvalConfig,
    ) -> Result<Self, EditorError> {
        config.validate()?;
        let mut engine = Self::new(config);
        let _span = tracing::info_span!("build_from_sheets", sheets = sheets.len()).entered();
        for (name, rows) in sheets {
            if name.trim().is_empty() {
                return Err(EditorError::InvalidArguments("sheet name is empty".into()));
            }
            let filled = rows.iter().flatten().filter(|c| !c.is_empty()).count();
            let height = rows.len() as u32;
            let width = rows.iter().map(Vec::len).max().unwrap_or(0) as u32;
            let sheet = engine
                .graph
                .add_sheet_with_shape(&name, filled, height, width)
                .ok_or_else(|| EditorError::SheetNameAlreadyTaken(name.clone()))?;
            let contents = engine.parse_block(CellAddress::new(sheet, 0, 0), rows)?;
            engine.editor().set_contents(contents)?;
        }
        engine.recalculate();
        engine.changes.clear();
        Ok(engine)
    }

    /// Cold build of a single sheet named `Sheet1`.
    pub fn build_from_array(
        rows: Vec<Vec<RawCellContent>>,
        config: EvalConfig,
    ) -> Result<Self, EditorError> {
        Self::build_from_sheets(vec![("Sheet1".to_string(), rows)], config)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Swap the configuration. The undo limit applies immediately; a
    /// different storage policy rebuilds the address maps; formulas are
    /// re-evaluated when evaluation settings changed.
    pub fn update_config(&mut self, config: EvalConfig) -> Result<Vec<CellValueChange>, EditorError> {
        config.validate()?;
        let storage_changed = config.address_storage != self.config.address_storage;
        let evaluation_changed = config.allow_circular_references
            != self.config.allow_circular_references
            || config.circular_iterations != self.config.circular_iterations
            || config.circular_initial_value != self.config.circular_initial_value
            || config.evaluate_null_to_zero != self.config.evaluate_null_to_zero;
        self.undo.set_limit(config.undo_limit);
        self.config = config;
        if storage_changed {
            self.graph.addresses.rebuild(self.config.address_storage);
        }
        if evaluation_changed {
            for id in self.graph.formula_vertices() {
                self.set_flags(id, VertexFlags::empty());
                self.graph.mark_dirty(id);
            }
        }
        Ok(self.flush())
    }

    fn editor(&mut self) -> VertexEditor<'_> {
        let limits = self.config.limits();
        VertexEditor::new(&mut self.graph).with_limits(limits)
    }

    /* ───────────────────────── recalculation ───────────────────────── */

    fn recalculate(&mut self) {
        if !self.graph.has_dirty() {
            return;
        }
        let dirty = self.graph.take_dirty();
        if dirty.is_empty() {
            return;
        }
        let _span = tracing::info_span!("recalculate", dirty = dirty.len()).entered();
        self.generation += 1;
        let schedule = Scheduler::new(&self.graph.graph).create_schedule(&dirty);
        tracing::debug!(steps = schedule.len(), "schedule built");
        for step in schedule.steps {
            match step {
                ScheduleStep::Single(id) => {
                    self.evaluate_vertex(id);
                    self.set_flags(id, VertexFlags::empty());
                }
                ScheduleStep::Cycle(members) => self.evaluate_cycle(&members),
            }
        }
    }

    fn flush(&mut self) -> Vec<CellValueChange> {
        if self.suspended {
            return Vec::new();
        }
        self.recalculate();
        let changes = self.changes.drain();
        if !changes.is_empty() {
            self.listeners.emit(&EngineEvent::ValuesUpdated {
                changes: changes.clone(),
            });
        }
        changes
    }

    fn commit(&mut self, entry: UndoEntry) -> Vec<CellValueChange> {
        tracing::debug!(entry = entry.label(), "commit");
        let noop = matches!(&entry, UndoEntry::SetContents(c) if c.is_empty());
        if !noop {
            self.undo.push(entry);
        }
        self.flush()
    }

    fn set_flags(&mut self, id: VertexId, flags: VertexFlags) {
        if let Some(f) = self.graph.graph.get_mut(id).and_then(Vertex::flags_mut) {
            *f = flags;
        }
    }

    fn finish_value(&self, value: LiteralValue, keep_arrays: bool) -> LiteralValue {
        let value = if keep_arrays {
            value
        } else {
            value.coerce_to_single_value()
        };
        match value {
            LiteralValue::Empty if self.config.evaluate_null_to_zero => LiteralValue::Number(0.0),
            other => other,
        }
    }

    fn evaluate_vertex(&mut self, id: VertexId) {
        let Some(vertex) = self.graph.graph.get(id) else {
            return;
        };
        match vertex {
            Vertex::Range(range) => range.clear_cache(),
            Vertex::Formula(cell) => {
                let Some(ast) = cell.ast().cloned() else {
                    return;
                };
                let named = cell.address.is_named_expression();
                let ctx = GraphContext::new(&self.graph, cell.host_sheet, cell.address);
                let value = self.evaluator.evaluate(&ast, &ctx);
                let value = self.finish_value(value, named);
                self.store_formula_value(id, value);
            }
            Vertex::Array(array) => {
                let (anchor, height, width) = (array.anchor, array.height, array.width);
                let ast = array.ast.clone();
                let ctx = GraphContext::new(&self.graph, anchor.sheet, anchor);
                let value = self.evaluator.evaluate(&ast, &ctx);
                let grid = fit_array(value, height, width, self.config.evaluate_null_to_zero);
                self.store_array_values(id, grid);
            }
            Vertex::Empty(_) | Vertex::Value(_) => {}
        }
    }

    /// Evaluate a strongly connected component. Without circular
    /// references every member reads `#CYCLE!`; with them the members
    /// are relaxed for a fixed number of passes in the given order.
    fn evaluate_cycle(&mut self, members: &[VertexId]) {
        let _span = tracing::debug_span!("cycle", size = members.len()).entered();
        if !self.config.allow_circular_references {
            for &id in members {
                match self.graph.graph.get(id) {
                    Some(Vertex::Range(range)) => range.clear_cache(),
                    Some(Vertex::Formula(_)) => {
                        self.store_formula_value(id, LiteralValue::Error(ExcelError::new_cycle()));
                    }
                    Some(Vertex::Array(array)) => {
                        let grid = fit_array(
                            LiteralValue::Error(ExcelError::new_cycle()),
                            array.height,
                            array.width,
                            false,
                        );
                        self.store_array_values(id, grid);
                    }
                    _ => {}
                }
                self.set_flags(id, VertexFlags::CYCLIC);
            }
            return;
        }

        let seed = LiteralValue::Number(self.config.circular_initial_value);
        for &id in members {
            let Some(vertex) = self.graph.graph.get(id) else {
                continue;
            };
            if vertex.flags().contains(VertexFlags::ITERATED) {
                continue;
            }
            match vertex {
                Vertex::Formula(_) => self.store_formula_value(id, seed.clone()),
                Vertex::Array(array) => {
                    let grid = fit_array(seed.clone(), array.height, array.width, false);
                    self.store_array_values(id, grid);
                }
                _ => {}
            }
        }
        for _ in 0..self.config.circular_iterations {
            for &id in members {
                self.evaluate_vertex(id);
            }
        }
        for &id in members {
            self.set_flags(id, VertexFlags::ITERATED);
        }
    }

    fn store_formula_value(&mut self, id: VertexId, value: LiteralValue) {
        let Some(Vertex::Formula(cell)) = self.graph.graph.get_mut(id) else {
            return;
        };
        let old = cell.value.replace(value.clone()).unwrap_or_default();
        cell.generation = self.generation;
        let address = cell.address;
        if old != value {
            self.record_at(address, old, value);
        }
    }

    fn store_array_values(&mut self, id: VertexId, grid: Vec<Vec<LiteralValue>>) {
        let Some(Vertex::Array(array)) = self.graph.graph.get_mut(id) else {
            return;
        };
        let old = array.values.replace(grid.clone());
        array.generation = self.generation;
        let anchor = array.anchor;
        for (i, row) in grid.into_iter().enumerate() {
            for (j, new) in row.into_iter().enumerate() {
                let prev = old
                    .as_ref()
                    .and_then(|g| g.get(i))
                    .and_then(|r| r.get(j))
                    .cloned()
                    .unwrap_or_default();
                if prev == new {
                    continue;
                }
                if let Some(address) = anchor.offset(i as i64, j as i64) {
                    self.changes.record(ChangeAddress::Cell(address), prev, new);
                }
            }
        }
    }

    fn record_at(&mut self, address: CellAddress, old: LiteralValue, new: LiteralValue) {
        let key = if address.is_named_expression() {
            match self.graph.names.by_address(&address) {
                Some(entry) if entry.added => ChangeAddress::Named {
                    name: entry.name.clone(),
                    scope: entry.scope,
                },
                _ => return,
            }
        } else {
            ChangeAddress::Cell(address)
        };
        self.changes.record(key, old, new);
    }

    /// Run `f` and record the value at each of `cells` before and after.
    fn track<T>(
        &mut self,
        cells: &[CellAddress],
        f: impl FnOnce(&mut Self) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        let before: Vec<LiteralValue> = cells.iter().map(|a| self.graph.value_at(a)).collect();
        let out = f(self)?;
        for (address, old) in cells.iter().zip(before) {
            let new = self.graph.value_at(address);
            self.changes.record(ChangeAddress::Cell(*address), old, new);
        }
        Ok(out)
    }

    /* ───────────────────────── evaluation control ───────────────────────── */

    /// Stop recalculating after edits. Values read while suspended are
    /// refused.
    pub fn suspend_evaluation(&mut self) {
        self.suspended = true;
    }

    /// Recalculate everything edited since the suspension.
    pub fn resume_evaluation(&mut self) -> Vec<CellValueChange> {
        self.suspended = false;
        self.flush()
    }

    pub fn is_evaluation_suspended(&self) -> bool {
        self.suspended
    }

    /* ───────────────────────── events ───────────────────────── */

    /// Register `listener` for every [`EngineEvent`] from now on.
    pub fn on_event(&mut self, listener: impl FnMut(&EngineEvent) + Send + 'static) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn off_event(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Run `f` as one undoable step. When `f` fails, everything it did
    /// is rolled back and its error returned. Batches nest; an inner
    /// batch joins the outer one.
    pub fn batch<F>(&mut self, f: F) -> Result<Vec<CellValueChange>, EditorError>
    where
        F: FnOnce(&mut Engine) -> Result<(), EditorError>,
    {
        if self.undo.is_batching() {
            f(self)?;
            return Ok(Vec::new());
        }
        let _span = tracing::debug_span!("batch").entered();
        let was_suspended = self.suspended;
        self.suspended = true;
        self.undo.begin_batch();
        let result = f(self);
        self.suspended = was_suspended;
        match result {
            Ok(()) => {
                self.undo.commit_batch();
                Ok(self.flush())
            }
            Err(e) => {
                let entries = self.undo.abort_batch();
                tracing::debug!(entries = entries.len(), error = %e, "rolling back batch");
                let mut cells: Vec<CellAddress> =
                    entries.iter().flat_map(UndoEntry::touched_cells).collect();
                cells.sort_unstable();
                cells.dedup();
                self.track(&cells, |engine| {
                    let mut editor = engine.editor();
                    for entry in entries.iter().rev() {
                        editor.apply_inverse(entry);
                    }
                    Ok(())
                })?;
                if !self.suspended {
                    self.recalculate();
                    self.changes.clear();
                }
                Err(e)
            }
        }
    }

    /* ───────────────────────── sheets ───────────────────────── */

    fn ensure_sheet(&self, sheet: SheetId) -> Result<(), EditorError> {
        if self.graph.sheets.contains(sheet) {
            Ok(())
        } else {
            Err(EditorError::NoSheetWithId(sheet))
        }
    }

    fn ensure_readable(&self, sheet: SheetId) -> Result<(), EditorError> {
        if self.suspended {
            return Err(EditorError::EvaluationSuspended);
        }
        self.ensure_sheet(sheet)
    }

    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.graph.sheet_id(name)
    }

    pub fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.graph.sheets.name(sheet)
    }

    /// Names in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.graph.sheets.names()
    }

    pub fn count_sheets(&self) -> usize {
        self.graph.sheets.len()
    }

    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId, EditorError> {
        let (sheet, entry) = self.editor().add_sheet(name)?;
        self.commit(entry);
        self.listeners.emit(&EngineEvent::SheetAdded {
            name: name.to_string(),
        });
        Ok(sheet)
    }

    pub fn remove_sheet(&mut self, sheet: SheetId) -> Result<Vec<CellValueChange>, EditorError> {
        self.ensure_sheet(sheet)?;
        let name = self.sheet_name(sheet).unwrap_or_default().to_string();
        let cells = self.occupied_cells(sheet);
        let entry = self.track(&cells, |engine| engine.editor().remove_sheet(sheet))?;
        self.abort_cut();
        let changes = self.commit(entry);
        self.listeners.emit(&EngineEvent::SheetRemoved {
            name,
            changes: changes.clone(),
        });
        Ok(changes)
    }

    pub fn rename_sheet(&mut self, sheet: SheetId, name: &str) -> Result<Vec<CellValueChange>, EditorError> {
        let old_name = self
            .sheet_name(sheet)
            .ok_or(EditorError::NoSheetWithId(sheet))?
            .to_string();
        let entry = self.editor().rename_sheet(sheet, name)?;
        let changes = self.commit(entry);
        if old_name != name {
            self.listeners.emit(&EngineEvent::SheetRenamed {
                old_name,
                new_name: name.to_string(),
            });
        }
        Ok(changes)
    }

    /// Empty every cell of `sheet`.
    pub fn clear_sheet(&mut self, sheet: SheetId) -> Result<Vec<CellValueChange>, EditorError> {
        self.ensure_sheet(sheet)?;
        let cells = self.occupied_cells(sheet);
        let entry = self.track(&cells, |engine| engine.editor().clear_sheet(sheet))?;
        self.abort_cut();
        Ok(self.commit(entry))
    }

    /// Replace the whole content of `sheet`. Undone as one step.
    pub fn set_sheet_content(
        &mut self,
        sheet: SheetId,
        rows: Vec<Vec<RawCellContent>>,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        self.ensure_sheet(sheet)?;
        self.batch(|engine| {
            engine.clear_sheet(sheet)?;
            engine.set_range_contents(CellAddress::new(sheet, 0, 0), rows)?;
            Ok(())
        })
    }

    /// (height, width) of the smallest block holding every non-empty
    /// cell of `sheet`.
    pub fn get_sheet_dimensions(&self, sheet: SheetId) -> Result<(u32, u32), EditorError> {
        let rows = self.get_sheet_serialized(sheet)?;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Ok((rows.len() as u32, width as u32))
    }

    fn occupied_cells(&self, sheet: SheetId) -> Vec<CellAddress> {
        let mut cells: Vec<CellAddress> = self
            .graph
            .addresses
            .entries_in_sheet(sheet)
            .into_iter()
            .map(|(address, _)| address)
            .collect();
        cells.sort_unstable();
        cells
    }

    /* ───────────────────────── contents ───────────────────────── */

    fn snapshot_for(&self, address: CellAddress, raw: RawCellContent) -> CellSnapshot {
        match parse_content(&raw, &self.config.date_formats) {
            ParsedContent::Empty => CellSnapshot::Empty,
            ParsedContent::Value(value) => CellSnapshot::Value { value, raw },
            ParsedContent::Formula(ast) => CellSnapshot::Formula(Arc::new(ast)),
            ParsedContent::ArrayFormula(ast) => {
                let ctx = GraphContext::new(&self.graph, address.sheet, address);
                let (height, width) = self.evaluator.array_shape(&ast, &ctx);
                CellSnapshot::ArrayFormula {
                    ast: Arc::new(ast),
                    height: height.max(1),
                    width: width.max(1),
                }
            }
            ParsedContent::Invalid { text, error } => CellSnapshot::Invalid { text, error },
        }
    }

    fn parse_block(
        &self,
        top_left: CellAddress,
        rows: Vec<Vec<RawCellContent>>,
    ) -> Result<Vec<(CellAddress, CellSnapshot)>, EditorError> {
        let mut contents = Vec::new();
        for (i, row) in rows.into_iter().enumerate() {
            for (j, raw) in row.into_iter().enumerate() {
                let address = top_left
                    .offset(i as i64, j as i64)
                    .ok_or_else(|| EditorError::InvalidAddress(format!("{top_left:?}+({i},{j})")))?;
                contents.push((address, self.snapshot_for(address, raw)));
            }
        }
        Ok(contents)
    }

    /// Cells whose value a content write may change: the written cells,
    /// arrays they overlap, and the footprint of new arrays.
    fn written_cells(&self, contents: &[(CellAddress, CellSnapshot)]) -> Vec<CellAddress> {
        let mut cells = Vec::new();
        for (address, snapshot) in contents {
            cells.push(*address);
            if let Some((footprint, _)) = self.graph.arrays.containing(address) {
                cells.extend(footprint.cells());
            }
            if let CellSnapshot::ArrayFormula { height, width, .. } = snapshot {
                let footprint = RangeAddress::new(
                    address.sheet,
                    address.row,
                    address.col,
                    address.row.saturating_add(height.saturating_sub(1)),
                    address.col.saturating_add(width.saturating_sub(1)),
                );
                cells.extend(footprint.cells());
            }
        }
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    fn apply_contents(
        &mut self,
        contents: Vec<(CellAddress, CellSnapshot)>,
    ) -> Result<UndoEntry, EditorError> {
        let cells = self.written_cells(&contents);
        self.track(&cells, |engine| engine.editor().set_contents(contents))
    }

    pub fn set_cell_contents(
        &mut self,
        address: CellAddress,
        content: impl Into<RawCellContent>,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        self.set_range_contents(address, vec![vec![content.into()]])
    }

    /// Write a block of raw contents with its top-left corner at
    /// `top_left`. Nothing is written unless every cell can be.
    pub fn set_range_contents(
        &mut self,
        top_left: CellAddress,
        rows: Vec<Vec<RawCellContent>>,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        self.ensure_sheet(top_left.sheet)?;
        let contents = self.parse_block(top_left, rows)?;
        let entry = self.apply_contents(contents)?;
        self.abort_cut();
        Ok(self.commit(entry))
    }

    pub fn get_cell_value(&self, address: &CellAddress) -> Result<LiteralValue, EditorError> {
        self.ensure_readable(address.sheet)?;
        Ok(self.graph.value_at(address))
    }

    /// Formula text of the cell, or `None` when it holds no formula.
    /// Array anchors read `{=...}`.
    pub fn get_cell_formula(&self, address: &CellAddress) -> Result<Option<String>, EditorError> {
        self.ensure_sheet(address.sheet)?;
        let snapshot = self.graph.snapshot_cell(address);
        Ok(match snapshot {
            CellSnapshot::Formula(_)
            | CellSnapshot::ArrayFormula { .. }
            | CellSnapshot::Invalid { .. } => match snapshot.to_raw() {
                RawCellContent::Text(text) => Some(text),
                _ => None,
            },
            CellSnapshot::Empty | CellSnapshot::Value { .. } => None,
        })
    }

    /// Content of the cell as it would be typed back in.
    pub fn get_cell_serialized(&self, address: &CellAddress) -> Result<RawCellContent, EditorError> {
        self.ensure_sheet(address.sheet)?;
        Ok(self.graph.snapshot_cell(address).to_raw())
    }

    pub fn get_cell_type(&self, address: &CellAddress) -> Result<CellType, EditorError> {
        self.ensure_sheet(address.sheet)?;
        let vertex = self.graph.vertex_at(address).and_then(|id| self.graph.vertex(id));
        Ok(match vertex {
            None | Some(Vertex::Empty(_)) | Some(Vertex::Range(_)) => CellType::Empty,
            Some(Vertex::Value(_)) => CellType::Value,
            Some(Vertex::Formula(_)) => CellType::Formula,
            Some(Vertex::Array(array)) if array.anchor == *address => CellType::ArrayFormula,
            Some(Vertex::Array(_)) => CellType::Array,
        })
    }

    pub fn is_cell_part_of_array(&self, address: &CellAddress) -> bool {
        self.graph.arrays.containing(address).is_some()
    }

    /// Values of a finite range, row-major.
    pub fn get_range_values(&self, range: &RangeAddress) -> Result<Vec<Vec<LiteralValue>>, EditorError> {
        self.ensure_readable(range.sheet)?;
        if !range.is_finite() {
            return Err(EditorError::InvalidArguments("range must be finite".into()));
        }
        Ok(self.range_values(range))
    }

    fn range_values(&self, range: &RangeAddress) -> Vec<Vec<LiteralValue>> {
        (range.start_row..=range.end_row)
            .map(|row| {
                (range.start_col..=range.end_col)
                    .map(|col| self.graph.value_at(&CellAddress::new(range.sheet, row, col)))
                    .collect()
            })
            .collect()
    }

    /// Values of every used cell of `sheet`, trimmed to the last row and
    /// column holding a non-empty value.
    pub fn get_sheet_values(&self, sheet: SheetId) -> Result<Vec<Vec<LiteralValue>>, EditorError> {
        self.ensure_readable(sheet)?;
        let mut rows: Vec<Vec<LiteralValue>> = Vec::new();
        for address in self.occupied_cells(sheet) {
            let value = self.graph.value_at(&address);
            if value.is_empty() {
                continue;
            }
            let (r, c) = (address.row as usize, address.col as usize);
            if rows.len() <= r {
                rows.resize_with(r + 1, Vec::new);
            }
            if rows[r].len() <= c {
                rows[r].resize(c + 1, LiteralValue::Empty);
            }
            rows[r][c] = value;
        }
        Ok(rows)
    }

    pub fn get_all_sheets_values(&self) -> Result<Vec<(String, Vec<Vec<LiteralValue>>)>, EditorError> {
        self.graph
            .sheets
            .ids()
            .into_iter()
            .map(|id| {
                let name = self.sheet_name(id).unwrap_or_default().to_string();
                Ok((name, self.get_sheet_values(id)?))
            })
            .collect()
    }

    /// Raw contents of `sheet`, enough to rebuild it.
    pub fn get_sheet_serialized(&self, sheet: SheetId) -> Result<Vec<Vec<RawCellContent>>, EditorError> {
        self.ensure_sheet(sheet)?;
        Ok(self.graph.serialize_sheet(sheet))
    }

    pub fn get_all_sheets_serialized(&self) -> Vec<(String, Vec<Vec<RawCellContent>>)> {
        self.graph
            .sheets
            .ids()
            .into_iter()
            .map(|id| {
                let name = self.sheet_name(id).unwrap_or_default().to_string();
                (name, self.graph.serialize_sheet(id))
            })
            .collect()
    }

    /// Evaluate `formula` as if it sat in `sheet` without storing it.
    pub fn calculate_formula(&self, formula: &str, sheet: SheetId) -> Result<LiteralValue, EditorError> {
        self.ensure_readable(sheet)?;
        let raw = RawCellContent::Text(formula.to_string());
        let ast = match parse_content(&raw, &self.config.date_formats) {
            ParsedContent::Formula(ast) => ast,
            ParsedContent::Invalid { error, .. } if formula.starts_with('=') => {
                return Ok(LiteralValue::Error(
                    ExcelError::new(ExcelErrorKind::Error).with_message(error),
                ));
            }
            _ => return Err(EditorError::NotAFormula(formula.to_string())),
        };
        let ctx = GraphContext::new(&self.graph, sheet, CellAddress::new(sheet, 0, 0));
        Ok(self.finish_value(self.evaluator.evaluate(&ast, &ctx), true))
    }

    /// Rebuild the graph from the serialized workbook and evaluate every
    /// formula from scratch. Clears the undo and redo stacks and the
    /// clipboard.
    pub fn rebuild_and_recalculate(&mut self) -> Result<(), EditorError> {
        let _span = tracing::info_span!("rebuild_and_recalculate").entered();
        let mut sheets = Vec::new();
        for (position, id) in self.graph.sheets.ids().into_iter().enumerate() {
            let name = self.sheet_name(id).unwrap_or_default().to_string();
            let contents = VertexEditor::new(&mut self.graph).sheet_contents(id);
            sheets.push((name, id, position, contents));
        }
        let names: Vec<(String, NameScope, CellSnapshot)> = self
            .graph
            .names
            .list(None)
            .into_iter()
            .map(|e| (e.name.clone(), e.scope, self.graph.snapshot_cell(&e.address)))
            .collect();

        let mut graph = DependencyGraph::new(self.config.address_storage);
        for (name, id, position, _) in &sheets {
            graph
                .restore_sheet(name, *id, *position)
                .ok_or_else(|| EditorError::SheetNameAlreadyTaken(name.clone()))?;
        }
        {
            let mut editor = VertexEditor::new(&mut graph).with_limits(self.config.limits());
            for (name, scope, content) in names {
                editor.add_named_expression(&name, scope, content)?;
            }
            for (_, _, _, contents) in sheets {
                editor.set_contents(contents)?;
            }
        }
        for id in graph.formula_vertices() {
            graph.mark_dirty(id);
        }
        self.graph = graph;
        self.undo.clear_undo_stack();
        self.undo.clear_redo_stack();
        self.clipboard = None;
        self.changes.clear();
        self.recalculate();
        self.changes.clear();
        Ok(())
    }

    /* ───────────────────────── structure ───────────────────────── */

    fn commit_structural(&mut self, entry: UndoEntry) -> Vec<CellValueChange> {
        self.abort_cut();
        self.commit(entry)
    }

    pub fn insert_rows(&mut self, sheet: SheetId, at: u32, count: u32) -> Result<Vec<CellValueChange>, EditorError> {
        let entry = self.editor().insert_rows(sheet, at, count)?;
        Ok(self.commit_structural(entry))
    }

    pub fn remove_rows(&mut self, sheet: SheetId, start: u32, count: u32) -> Result<Vec<CellValueChange>, EditorError> {
        let entry = self.editor().remove_rows(sheet, start, count)?;
        Ok(self.commit_structural(entry))
    }

    pub fn insert_columns(&mut self, sheet: SheetId, at: u32, count: u32) -> Result<Vec<CellValueChange>, EditorError> {
        let entry = self.editor().insert_columns(sheet, at, count)?;
        Ok(self.commit_structural(entry))
    }

    pub fn remove_columns(&mut self, sheet: SheetId, start: u32, count: u32) -> Result<Vec<CellValueChange>, EditorError> {
        let entry = self.editor().remove_columns(sheet, start, count)?;
        Ok(self.commit_structural(entry))
    }

    /// Move `count` rows starting at `start` so that they land before
    /// row `target` of the original layout.
    pub fn move_rows(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
        target: u32,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        let entry = self.editor().move_rows(sheet, start, count, target)?;
        Ok(self.commit_structural(entry))
    }

    pub fn move_columns(
        &mut self,
        sheet: SheetId,
        start: u32,
        count: u32,
        target: u32,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        let entry = self.editor().move_columns(sheet, start, count, target)?;
        Ok(self.commit_structural(entry))
    }

    /// Move a block of cells. References to the block follow it; the
    /// destination's previous content is lost.
    pub fn move_cells(
        &mut self,
        source: RangeAddress,
        target: CellAddress,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        let entry = self.editor().move_cells(source, target)?;
        Ok(self.commit_structural(entry))
    }

    /* ───────────────────────── clipboard ───────────────────────── */

    fn abort_cut(&mut self) {
        if self.clipboard.as_ref().is_some_and(Clipboard::is_cut) {
            tracing::debug!("pending cut aborted");
            self.clipboard = None;
        }
    }

    /// Remember `source` for a later paste and return its values.
    pub fn copy(&mut self, source: RangeAddress) -> Result<Vec<Vec<LiteralValue>>, EditorError> {
        let clipboard = Clipboard::copy(&self.graph, source)?;
        let values = self.range_values(&source);
        self.clipboard = Some(clipboard);
        Ok(values)
    }

    /// Mark `source` to be moved by the next paste.
    pub fn cut(&mut self, source: RangeAddress) -> Result<Vec<Vec<LiteralValue>>, EditorError> {
        let clipboard = Clipboard::cut(&self.graph, source)?;
        let values = self.range_values(&source);
        self.clipboard = Some(clipboard);
        Ok(values)
    }

    pub fn paste(&mut self, target: CellAddress) -> Result<Vec<CellValueChange>, EditorError> {
        let (source, cut) = match &self.clipboard {
            Some(clipboard) => (clipboard.source, clipboard.is_cut()),
            None => return Err(EditorError::NothingToPaste),
        };
        self.ensure_sheet(target.sheet)?;
        if cut {
            let entry = self.editor().move_cells(source, target)?;
            self.clipboard = None;
            return Ok(self.commit(entry));
        }
        let contents = self
            .clipboard
            .as_ref()
            .map(|c| c.paste_content(&self.graph, target))
            .unwrap_or_default();
        let entry = self.apply_contents(contents)?;
        Ok(self.commit(entry))
    }

    pub fn is_clipboard_empty(&self) -> bool {
        self.clipboard.is_none()
    }

    pub fn clear_clipboard(&mut self) {
        self.clipboard = None;
    }

    /* ───────────────────────── undo / redo ───────────────────────── */

    pub fn undo(&mut self) -> Result<Vec<CellValueChange>, EditorError> {
        let cells = self
            .undo
            .peek_undo()
            .map(UndoEntry::touched_cells)
            .unwrap_or_default();
        self.track(&cells, |engine| engine.undo.undo(&mut engine.graph))?;
        self.abort_cut();
        Ok(self.flush())
    }

    pub fn redo(&mut self) -> Result<Vec<CellValueChange>, EditorError> {
        let cells = self
            .undo
            .peek_redo()
            .map(UndoEntry::touched_cells)
            .unwrap_or_default();
        let limits = self.config.limits();
        self.track(&cells, |engine| engine.undo.redo(&mut engine.graph, limits))?;
        self.abort_cut();
        Ok(self.flush())
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn clear_undo_stack(&mut self) {
        self.undo.clear_undo_stack();
    }

    pub fn clear_redo_stack(&mut self) {
        self.undo.clear_redo_stack();
    }

    /* ───────────────────────── named expressions ───────────────────────── */

    fn named_content(&self, raw: RawCellContent) -> Result<CellSnapshot, EditorError> {
        match parse_content(&raw, &self.config.date_formats) {
            ParsedContent::ArrayFormula(_) => Err(EditorError::ArrayFormulaInNamedExpression),
            ParsedContent::Formula(ast) => {
                if ast.references().into_iter().any(is_relative) {
                    return Err(EditorError::NoRelativeAddressesAllowed);
                }
                Ok(CellSnapshot::Formula(Arc::new(ast)))
            }
            ParsedContent::Value(value) => Ok(CellSnapshot::Value { value, raw }),
            ParsedContent::Empty => Ok(CellSnapshot::Empty),
            ParsedContent::Invalid { text, error } => Ok(CellSnapshot::Invalid { text, error }),
        }
    }

    /// Define `name` in the workbook (`scope == None`) or in one sheet.
    /// Formulas may only use absolute references.
    pub fn add_named_expression(
        &mut self,
        name: &str,
        expression: impl Into<RawCellContent>,
        scope: Option<SheetId>,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        if !is_name_valid(name) {
            return Err(EditorError::NamedExpressionNameIsInvalid(name.to_string()));
        }
        let content = self.named_content(expression.into())?;
        let entry = self
            .editor()
            .add_named_expression(name, NameScope::from_sheet(scope), content)?;
        let changes = self.commit(entry);
        self.listeners.emit(&EngineEvent::NamedExpressionAdded {
            name: name.to_string(),
            changes: changes.clone(),
        });
        Ok(changes)
    }

    pub fn change_named_expression(
        &mut self,
        name: &str,
        expression: impl Into<RawCellContent>,
        scope: Option<SheetId>,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        let content = self.named_content(expression.into())?;
        let entry = self
            .editor()
            .change_named_expression(name, NameScope::from_sheet(scope), content)?;
        Ok(self.commit(entry))
    }

    pub fn remove_named_expression(
        &mut self,
        name: &str,
        scope: Option<SheetId>,
    ) -> Result<Vec<CellValueChange>, EditorError> {
        let scope = NameScope::from_sheet(scope);
        let display = self
            .graph
            .names
            .named_expression_in_scope(name, scope)
            .map_or_else(|| name.to_string(), |e| e.name.clone());
        let entry = self.editor().remove_named_expression(name, scope)?;
        let changes = self.commit(entry);
        self.listeners.emit(&EngineEvent::NamedExpressionRemoved {
            name: display,
            changes: changes.clone(),
        });
        Ok(changes)
    }

    pub fn get_named_expression_value(
        &self,
        name: &str,
        scope: Option<SheetId>,
    ) -> Result<LiteralValue, EditorError> {
        if self.suspended {
            return Err(EditorError::EvaluationSuspended);
        }
        let entry = self
            .graph
            .names
            .named_expression_in_scope(name, NameScope::from_sheet(scope))
            .ok_or_else(|| EditorError::NamedExpressionDoesNotExist(name.to_string()))?;
        Ok(self.graph.value_at(&entry.address))
    }

    /// Serialized content of a named expression.
    pub fn get_named_expression_formula(
        &self,
        name: &str,
        scope: Option<SheetId>,
    ) -> Result<RawCellContent, EditorError> {
        let entry = self
            .graph
            .names
            .named_expression_in_scope(name, NameScope::from_sheet(scope))
            .ok_or_else(|| EditorError::NamedExpressionDoesNotExist(name.to_string()))?;
        Ok(self.graph.snapshot_cell(&entry.address).to_raw())
    }

    /// Names defined in exactly the given scope, sorted.
    pub fn list_named_expressions(&self, scope: Option<SheetId>) -> Vec<String> {
        self.graph
            .names
            .list(Some(NameScope::from_sheet(scope)))
            .into_iter()
            .map(|e| e.name.clone())
            .collect()
    }

    /* ───────────────────────── inspection ───────────────────────── */

    /// Cells whose formulas read `address` directly.
    pub fn get_cell_dependents(&self, address: &CellAddress) -> Vec<CellAddress> {
        let Some(id) = self.graph.vertex_at(address) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack = vec![id];
        let mut seen = rustc_hash::FxHashSet::default();
        while let Some(v) = stack.pop() {
            for d in self.graph.dependents(v) {
                if !seen.insert(d) {
                    continue;
                }
                match self.graph.vertex(d) {
                    Some(Vertex::Range(_)) => stack.push(d),
                    Some(vertex) => out.extend(vertex.address()),
                    None => {}
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Cells a formula at `address` reads directly, ranges expanded.
    pub fn get_cell_precedents(&self, address: &CellAddress) -> Vec<CellAddress> {
        let Some(id) = self.graph.vertex_at(address) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for d in self.graph.dependencies(id) {
            match self.graph.vertex(d) {
                Some(Vertex::Range(r)) => {
                    if let Some(clipped) = self.graph.addresses.clip(&r.range) {
                        out.extend(clipped.cells());
                    }
                }
                Some(vertex) => out.extend(vertex.address()),
                None => {}
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcgraph_parse::{ASTNode, parse};

    fn refs(text: &str) -> Vec<bool> {
        let ast: ASTNode = parse(text).unwrap();
        ast.references().into_iter().map(is_relative).collect()
    }

    #[test]
    fn relative_reference_detection() {
        assert_eq!(refs("=$A$1+A1+$A1+A$1"), vec![false, true, true, true]);
        assert_eq!(refs("=SUM($A$1:$B$2)"), vec![false]);
        assert_eq!(refs("=SUM($A:$A)"), vec![false]);
        assert_eq!(refs("=SUM(A:A)"), vec![true]);
    }

    #[test]
    fn fit_array_broadcasts_and_pads() {
        let row = LiteralValue::Array(vec![vec![LiteralValue::Number(1.0), LiteralValue::Number(2.0)]]);
        let grid = fit_array(row, 2, 3, false);
        assert_eq!(grid[1][1], LiteralValue::Number(2.0));
        assert!(grid[0][2].is_error());
        let grid = fit_array(LiteralValue::Empty, 1, 2, true);
        assert_eq!(grid, vec![vec![LiteralValue::Number(0.0); 2]]);
    }

    #[test]
    fn suspended_engine_refuses_reads() {
        let mut engine = Engine::default();
        let s = engine.add_sheet("Sheet1").unwrap();
        let a1 = CellAddress::new(s, 0, 0);
        engine.suspend_evaluation();
        assert!(engine.set_cell_contents(a1, "=1+1").unwrap().is_empty());
        assert_eq!(engine.get_cell_value(&a1), Err(EditorError::EvaluationSuspended));
        assert_eq!(engine.get_cell_formula(&a1).unwrap().as_deref(), Some("=1+1"));
        let changes = engine.resume_evaluation();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_value, LiteralValue::Number(2.0));
    }
}
