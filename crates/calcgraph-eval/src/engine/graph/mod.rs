use crate::engine::address_mapping::{AddressMapping, AddressStoragePolicy};
use crate::engine::array_mapping::ArrayMapping;
use crate::engine::content::RawCellContent;
use crate::engine::digraph::Graph;
use crate::engine::named_range::{NameScope, NamedExpressions};
use crate::engine::range_mapping::RangeMapping;
use crate::engine::sheet_registry::SheetRegistry;
use crate::engine::vertex::{
    ArrayVertex, Formula, FormulaCell, RangeVertex, ValueCell, Vertex, VertexId, VertexKind,
};
use crate::reference::{ResolvedReference, resolve_reference};
use calcgraph_common::{CellAddress, LiteralValue, NAMED_EXPRESSION_SHEET, RangeAddress, SheetId};
use calcgraph_parse::ASTNode;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod editor;
pub mod snapshot;

/// The workbook as a graph: cell, array, range and named-expression
/// vertices joined by "is read by" edges, plus the lookup tables that
/// find them.
///
/// Invariants kept by every mutation here:
/// - at most one vertex per address; footprint cells of an array map
///   to the array vertex itself
/// - a formula's in-edges are exactly the vertices its AST references
/// - an empty vertex exists only while it has edges; a range vertex
///   only while something reads it
#[derive(Debug)]
pub struct DependencyGraph {
    pub(crate) graph: Graph<Vertex>,
    pub(crate) addresses: AddressMapping,
    pub(crate) ranges: RangeMapping,
    pub(crate) arrays: ArrayMapping,
    pub(crate) sheets: SheetRegistry,
    pub(crate) names: NamedExpressions,
    dirty: FxHashSet<VertexId>,
    /// Formulas mentioning a sheet that does not exist, by lowercase name.
    unresolved: FxHashMap<String, FxHashSet<VertexId>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new(AddressStoragePolicy::default())
    }
}

impl DependencyGraph {
    pub fn new(policy: AddressStoragePolicy) -> Self {
        let mut addresses = AddressMapping::new(policy);
        addresses.add_sheet(NAMED_EXPRESSION_SHEET, 0, 0, 0);
        Self {
            graph: Graph::new(),
            addresses,
            ranges: RangeMapping::new(),
            arrays: ArrayMapping::new(),
            sheets: SheetRegistry::new(),
            names: NamedExpressions::new(),
            dirty: FxHashSet::default(),
            unresolved: FxHashMap::default(),
        }
    }

    /* ───────────────────────── lookups ───────────────────────── */

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.graph.get(id)
    }

    pub fn vertex_at(&self, addr: &CellAddress) -> Option<VertexId> {
        self.addresses.get(addr)
    }

    pub fn value_at(&self, addr: &CellAddress) -> LiteralValue {
        self.vertex_at(addr)
            .and_then(|id| self.graph.get(id))
            .map_or(LiteralValue::Empty, |v| v.value_at(addr))
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of vertices of each kind.
    pub fn census(&self) -> BTreeMap<VertexKind, usize> {
        let mut counts = BTreeMap::new();
        for (_, vertex) in self.graph.iter() {
            *counts.entry(vertex.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn dependents(&self, id: VertexId) -> Vec<VertexId> {
        self.graph.dependents(id).collect()
    }

    pub fn dependencies(&self, id: VertexId) -> Vec<VertexId> {
        self.graph.dependencies(id).collect()
    }

    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheets.id_for(name)
    }

    /// Sheet against which unqualified references at `addr` resolve.
    pub(crate) fn host_sheet_for(&self, addr: &CellAddress) -> SheetId {
        if addr.is_named_expression() {
            self.names
                .by_address(addr)
                .and_then(|e| e.scope.sheet())
                .unwrap_or(NAMED_EXPRESSION_SHEET)
        } else {
            addr.sheet
        }
    }

    /// Address of the named expression `name` as seen from `host_sheet`,
    /// creating a workbook placeholder when it is unknown.
    fn name_address(&mut self, name: &str, host_sheet: SheetId) -> CellAddress {
        match self.names.named_expression_for_scope(name, Some(host_sheet)) {
            Some(entry) => entry.address,
            None => self.names.placeholder(name),
        }
    }

    /* ───────────────────────── vertices ───────────────────────── */

    /// Register a cell vertex at its address and wire it into every
    /// range that covers it.
    fn insert_cell_vertex(&mut self, vertex: Vertex) -> VertexId {
        let addr = vertex.address();
        let id = self.graph.add_node(vertex);
        if let Some(addr) = addr {
            self.addresses.set(addr, id);
            for range in self.ranges_reading_cell(&addr) {
                self.graph.add_edge(id, range);
            }
        }
        id
    }

    /// Range vertices that read the cell at `addr` directly. A range
    /// built on a one-row-shorter range reads only its own last row.
    fn ranges_reading_cell(&self, addr: &CellAddress) -> Vec<VertexId> {
        self.ranges
            .intersecting(&RangeAddress::single(*addr))
            .into_iter()
            .filter(|(range, _)| {
                addr.row == range.end_row || self.ranges.find_smaller_range(range).is_none()
            })
            .map(|(_, id)| id)
            .collect()
    }

    /// Whether anything other than a range vertex reads `id`.
    fn read_by_formula(&self, id: VertexId) -> bool {
        self.graph
            .dependents(id)
            .any(|d| !matches!(self.graph.get(d), Some(Vertex::Range(_))))
    }

    pub(crate) fn get_or_create_cell(&mut self, addr: CellAddress) -> VertexId {
        match self.addresses.get(&addr) {
            Some(id) => id,
            None => self.insert_cell_vertex(Vertex::Empty(addr)),
        }
    }

    pub(crate) fn get_or_create_range(&mut self, range: RangeAddress) -> VertexId {
        if let Some(id) = self.ranges.get(&range) {
            return id;
        }
        let id = self.graph.add_node(Vertex::Range(RangeVertex::new(range)));
        self.ranges.insert(range, id);
        self.link_range(id, range);
        if range.is_finite() {
            let larger = RangeAddress {
                end_row: range.end_row.saturating_add(1),
                ..range
            };
            if let Some(larger) = self.ranges.get(&larger) {
                self.relink_range(larger);
            }
        }
        id
    }

    /// In-edges of a range vertex. A finite range with a registered
    /// range one row shorter reads that range plus its own last row;
    /// anything else reads every materialized cell it covers.
    fn link_range(&mut self, id: VertexId, range: RangeAddress) {
        let cells = match self.ranges.find_smaller_range(&range) {
            Some((_, smaller)) => {
                self.graph.add_edge(smaller, id);
                let last_row = RangeAddress {
                    start_row: range.end_row,
                    ..range
                };
                self.addresses.entries_in_range(&last_row)
            }
            None => self.addresses.entries_in_range(&range),
        };
        for (_, cell) in cells {
            self.graph.add_edge(cell, id);
        }
    }

    /// Drop and rebuild the in-edges of a range vertex after the cells
    /// or ranges around it changed.
    pub(crate) fn relink_range(&mut self, id: VertexId) {
        let Some(Vertex::Range(r)) = self.graph.get(id) else {
            return;
        };
        let range = r.range;
        let old = self.detach(id);
        self.link_range(id, range);
        self.mark_dirty(id);
        self.collect_garbage(old);
    }

    /// Remove every in-edge of `id` and return the former precedents.
    fn detach(&mut self, id: VertexId) -> Vec<VertexId> {
        let deps: Vec<VertexId> = self.graph.dependencies(id).collect();
        for dep in &deps {
            self.graph.remove_edge(*dep, id);
        }
        for waiting in self.unresolved.values_mut() {
            waiting.remove(&id);
        }
        self.unresolved.retain(|_, w| !w.is_empty());
        deps
    }

    /// Wire the references of `ast` into `id`. References to unknown
    /// sheets are remembered so the formula can be rebound once the
    /// sheet appears.
    fn attach(&mut self, id: VertexId, ast: &ASTNode, host_sheet: SheetId) {
        for reference in ast.references() {
            let resolved = resolve_reference(reference, host_sheet, |name| self.sheets.id_for(name));
            let dep = match resolved {
                Ok(ResolvedReference::Cell(addr)) => self.get_or_create_cell(addr),
                Ok(ResolvedReference::Range(range)) => self.get_or_create_range(range),
                Ok(ResolvedReference::Named(name)) => {
                    let addr = self.name_address(&name, host_sheet);
                    self.get_or_create_cell(addr)
                }
                Err(sheet) => {
                    self.unresolved
                        .entry(sheet.to_lowercase())
                        .or_default()
                        .insert(id);
                    continue;
                }
            };
            self.graph.add_edge(dep, id);
        }
    }

    /// Re-resolve the references of a formula or array vertex.
    pub(crate) fn rebind(&mut self, id: VertexId) {
        let (ast, host) = match self.graph.get(id) {
            Some(Vertex::Formula(f)) => (f.ast().cloned(), f.host_sheet),
            Some(Vertex::Array(a)) => (Some(a.ast.clone()), a.anchor.sheet),
            Some(Vertex::Range(_)) => return self.relink_range(id),
            _ => return,
        };
        let old = self.detach(id);
        if let Some(ast) = ast {
            self.attach(id, &ast, host);
        }
        self.mark_dirty(id);
        self.collect_garbage(old);
    }

    /// Remove vertices that no longer carry content or readers: empty
    /// cells and ranges that only ranges read, and named-expression
    /// placeholders nobody mentions. Removal cascades; a range that was
    /// built on a removed range is relinked to its cells.
    pub(crate) fn collect_garbage(&mut self, candidates: Vec<VertexId>) {
        let mut work = candidates;
        while let Some(id) = work.pop() {
            let Some(vertex) = self.graph.get(id) else {
                continue;
            };
            match vertex {
                Vertex::Empty(addr) => {
                    let addr = *addr;
                    if self.graph.in_degree(id) > 0 || self.read_by_formula(id) {
                        continue;
                    }
                    self.addresses.remove(&addr);
                    self.graph.remove_node(id);
                    self.dirty.remove(&id);
                    if addr.is_named_expression() {
                        if let Some(entry) = self.names.by_address(&addr).filter(|e| !e.added) {
                            let (name, scope) = (entry.name.clone(), entry.scope);
                            self.names.forget(&name, scope);
                        }
                    }
                }
                Vertex::Range(r) => {
                    let range = r.range;
                    if self.read_by_formula(id) {
                        continue;
                    }
                    let larger: Vec<VertexId> = self.graph.dependents(id).collect();
                    work.extend(self.graph.dependencies(id));
                    self.ranges.remove(&range);
                    self.graph.remove_node(id);
                    self.dirty.remove(&id);
                    for larger in larger {
                        let Some(Vertex::Range(l)) = self.graph.get(larger) else {
                            continue;
                        };
                        let l = l.range;
                        work.extend(self.detach(larger));
                        self.link_range(larger, l);
                        self.mark_dirty(larger);
                        work.push(larger);
                    }
                }
                _ => {}
            }
        }
    }

    /// Remove the vertex at `addr` outright, handing its dependents to
    /// the caller.
    fn take_vertex(&mut self, addr: &CellAddress) -> Option<(Vertex, Vec<VertexId>)> {
        let id = self.addresses.remove(addr)?;
        let dependents: Vec<VertexId> = self.graph.dependents(id).collect();
        let old = self.detach(id);
        let vertex = self.graph.remove_node(id)?;
        self.dirty.remove(&id);
        self.collect_garbage(old);
        Some((vertex, dependents))
    }

    /* ───────────────────────── content ───────────────────────── */

    pub fn set_cell_value(
        &mut self,
        addr: CellAddress,
        value: LiteralValue,
        raw: RawCellContent,
    ) -> VertexId {
        let content = Vertex::Value(ValueCell {
            address: addr,
            value,
            raw,
        });
        let (id, old) = self.replace_content(addr, content);
        self.mark_dirty(id);
        self.collect_garbage(old);
        id
    }

    pub fn set_cell_formula(&mut self, addr: CellAddress, formula: Formula) -> VertexId {
        let host = self.host_sheet_for(&addr);
        let ast = match &formula {
            Formula::Parsed(ast) => Some(ast.clone()),
            Formula::Unparsed { .. } => None,
        };
        let (id, old) = self.replace_content(addr, Vertex::Formula(FormulaCell::new(addr, host, formula)));
        if let Some(ast) = ast {
            self.attach(id, &ast, host);
        }
        self.mark_dirty(id);
        self.collect_garbage(old);
        id
    }

    /// Clear a cell. The vertex stays as an empty placeholder while
    /// anything still reads it.
    pub fn set_cell_empty(&mut self, addr: CellAddress) {
        let Some(id) = self.addresses.get(&addr) else {
            return;
        };
        let (id, mut old) = self.replace_content(addr, Vertex::Empty(addr));
        self.mark_dirty(id);
        for dep in self.graph.dependents(id).collect::<Vec<_>>() {
            self.mark_dirty(dep);
        }
        old.push(id);
        self.collect_garbage(old);
    }

    /// Swap the vertex data at `addr`, keeping its identity and
    /// dependents. Returns the vertex and its former precedents, which
    /// the caller hands to [`Self::collect_garbage`] once new edges are in.
    fn replace_content(&mut self, addr: CellAddress, content: Vertex) -> (VertexId, Vec<VertexId>) {
        match self.addresses.get(&addr) {
            Some(id) => {
                let old = self.detach(id);
                if let Some(slot) = self.graph.get_mut(id) {
                    *slot = content;
                }
                (id, old)
            }
            None => (self.insert_cell_vertex(content), Vec::new()),
        }
    }

    /// Install an array formula over `height` x `width` cells anchored at
    /// `anchor`. Whatever occupied the footprint is replaced; its
    /// dependents now read the array.
    pub fn set_array_formula(
        &mut self,
        anchor: CellAddress,
        ast: Arc<ASTNode>,
        height: u32,
        width: u32,
    ) -> VertexId {
        let array = ArrayVertex::new(anchor, height.max(1), width.max(1), ast.clone());
        let footprint = array.footprint();
        let id = self.graph.add_node(Vertex::Array(array));
        for addr in footprint.cells().collect::<Vec<_>>() {
            if let Some((_, dependents)) = self.take_vertex(&addr) {
                for dep in dependents {
                    if self.graph.contains(dep) {
                        self.graph.add_edge(id, dep);
                        self.mark_dirty(dep);
                    }
                }
            }
            self.addresses.set(addr, id);
        }
        self.arrays.insert(footprint, id);
        for (_, range) in self.ranges.intersecting(&footprint) {
            self.relink_range(range);
        }
        self.attach(id, &ast, anchor.sheet);
        self.mark_dirty(id);
        id
    }

    /// Remove the array anchored at `anchor`. Formulas that read its
    /// cells are rebound to plain (empty) cells.
    pub fn remove_array(&mut self, anchor: &CellAddress) -> Option<ArrayVertex> {
        let (footprint, id) = self.arrays.remove(anchor)?;
        let dependents: Vec<VertexId> = self.graph.dependents(id).collect();
        let old = self.detach(id);
        for addr in footprint.cells() {
            self.addresses.remove(&addr);
        }
        let vertex = self.graph.remove_node(id);
        self.dirty.remove(&id);
        for dep in dependents {
            self.rebind(dep);
        }
        self.collect_garbage(old);
        match vertex {
            Some(Vertex::Array(a)) => Some(a),
            _ => None,
        }
    }

    /* ───────────────────────── sheets ───────────────────────── */

    /// Register a sheet and rebind formulas that were waiting for it.
    pub fn add_sheet(&mut self, name: &str) -> Option<SheetId> {
        self.add_sheet_with_shape(name, 0, 0, 0)
    }

    /// Like [`Self::add_sheet`], with the expected fill so the address
    /// storage can be picked up front.
    pub fn add_sheet_with_shape(
        &mut self,
        name: &str,
        filled: usize,
        height: u32,
        width: u32,
    ) -> Option<SheetId> {
        let id = self.sheets.add(name)?;
        self.addresses.add_sheet(id, filled, height, width);
        self.resolve_pending_sheet(name);
        Some(id)
    }

    /// Re-register a removed sheet under its old id and position.
    pub(crate) fn restore_sheet(&mut self, name: &str, id: SheetId, position: usize) -> Option<()> {
        self.sheets.insert_at(name, id, position)?;
        self.addresses.add_sheet(id, 0, 0, 0);
        self.resolve_pending_sheet(name);
        Some(())
    }

    pub(crate) fn resolve_pending_sheet(&mut self, name: &str) {
        let Some(waiting) = self.unresolved.remove(&name.to_lowercase()) else {
            return;
        };
        let mut waiting: Vec<VertexId> = waiting.into_iter().collect();
        waiting.sort();
        for id in waiting {
            self.rebind(id);
        }
    }

    /// Drop every vertex of `sheet` and its sheet-scoped names. Formulas
    /// elsewhere are expected to have been rewritten already; anything
    /// that still reads the sheet is rebound.
    pub(crate) fn drop_sheet_vertices(&mut self, sheet: SheetId) {
        for (footprint, _) in self.arrays.in_sheet(sheet) {
            self.remove_array(&footprint.start());
        }
        let mut readers = Vec::new();
        for (addr, _) in self.addresses.entries_in_sheet(sheet) {
            if let Some((_, dependents)) = self.take_vertex(&addr) {
                readers.extend(dependents);
            }
        }
        for (_, id) in self.ranges.in_sheet(sheet) {
            readers.extend(self.graph.dependents(id));
        }
        for entry in self.names.in_sheet_scope(sheet) {
            if let Some((_, dependents)) = self.take_vertex(&entry.address) {
                readers.extend(dependents);
            }
            self.names.forget(&entry.name, entry.scope);
        }
        readers.sort();
        readers.dedup();
        for id in readers {
            if self.graph.contains(id) {
                self.rebind(id);
            }
        }
        for (_, id) in self.ranges.in_sheet(sheet) {
            self.collect_garbage(vec![id]);
        }
        self.addresses.remove_sheet(sheet);
    }

    /* ───────────────────────── names ───────────────────────── */

    /// Rebind formulas hosted on `sheet` (or everywhere for a workbook
    /// name) that mention `name`, after a definition appeared or went
    /// away and shadowing changed.
    pub(crate) fn rebind_name_readers(&mut self, name: &str, scope: NameScope) {
        let mut readers: Vec<VertexId> = self
            .graph
            .iter()
            .filter(|(_, v)| {
                let (ast, host) = match v {
                    Vertex::Formula(f) => (f.ast(), f.host_sheet),
                    Vertex::Array(a) => (Some(&a.ast), a.anchor.sheet),
                    _ => return false,
                };
                scope.sheet().is_none_or(|s| s == host)
                    && ast.is_some_and(|ast| mentions_name(ast, name))
            })
            .map(|(id, _)| id)
            .collect();
        readers.sort();
        for id in readers {
            self.rebind(id);
        }
    }

    /* ───────────────────────── dirt ───────────────────────── */

    pub fn mark_dirty(&mut self, id: VertexId) {
        self.dirty.insert(id);
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain the dirty set, dropping vertices removed since they were
    /// marked.
    pub fn take_dirty(&mut self) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = self
            .dirty
            .drain()
            .filter(|id| self.graph.contains(*id))
            .collect();
        out.sort();
        out
    }

    /// Every formula and array vertex.
    pub fn formula_vertices(&self) -> Vec<VertexId> {
        let mut ids: Vec<VertexId> = self
            .graph
            .iter()
            .filter(|(_, v)| v.is_formula())
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Every edge points at live vertices on both ends.
    pub fn check_edges(&self) -> bool {
        self.graph.iter().all(|(id, _)| {
            self.graph.dependents(id).all(|d| self.graph.contains(d))
                && self.graph.dependencies(id).all(|d| self.graph.contains(d))
        })
    }
}

fn mentions_name(ast: &ASTNode, name: &str) -> bool {
    ast.references().iter().any(|r| {
        matches!(r, calcgraph_parse::ReferenceType::NamedRange(n) if n.eq_ignore_ascii_case(name))
    })
}
