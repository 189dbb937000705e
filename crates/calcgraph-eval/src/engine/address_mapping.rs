//! Cell address to vertex lookup, stored per sheet either densely or
//! sparsely.

use crate::engine::vertex::VertexId;
use calcgraph_common::{CellAddress, RangeAddress, SheetId, UNBOUNDED};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// How each sheet's address storage is chosen.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddressStoragePolicy {
    AlwaysDense,
    AlwaysSparse,
    /// Dense when the filled share of the used rectangle reaches the
    /// threshold, sparse otherwise.
    Threshold(f64),
}

impl Default for AddressStoragePolicy {
    fn default() -> Self {
        AddressStoragePolicy::Threshold(0.8)
    }
}

impl AddressStoragePolicy {
    /// Whether a sheet with `filled` cells inside a `height` x `width`
    /// used rectangle should be stored densely.
    pub fn prefers_dense(&self, filled: usize, height: u32, width: u32) -> bool {
        match *self {
            AddressStoragePolicy::AlwaysDense => true,
            AddressStoragePolicy::AlwaysSparse => false,
            AddressStoragePolicy::Threshold(threshold) => {
                let area = height as f64 * width as f64;
                area > 0.0 && filled as f64 / area >= threshold
            }
        }
    }
}

/// Storage for one sheet.
pub trait AddressStorage: Debug {
    fn get(&self, row: u32, col: u32) -> Option<VertexId>;
    fn set(&mut self, row: u32, col: u32, id: VertexId);
    fn remove(&mut self, row: u32, col: u32) -> Option<VertexId>;
    /// Every entry in row-major order.
    fn entries(&self) -> Vec<(u32, u32, VertexId)>;
    fn len(&self) -> usize;
    /// Rows and columns spanned by the stored entries.
    fn extent(&self) -> (u32, u32);
    fn is_dense(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct DenseStorage {
    rows: Vec<Vec<Option<VertexId>>>,
    count: usize,
}

impl AddressStorage for DenseStorage {
    fn get(&self, row: u32, col: u32) -> Option<VertexId> {
        self.rows
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
            .copied()
            .flatten()
    }

    fn set(&mut self, row: u32, col: u32, id: VertexId) {
        let (r, c) = (row as usize, col as usize);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let line = &mut self.rows[r];
        if line.len() <= c {
            line.resize(c + 1, None);
        }
        if line[c].replace(id).is_none() {
            self.count += 1;
        }
    }

    fn remove(&mut self, row: u32, col: u32) -> Option<VertexId> {
        let removed = self
            .rows
            .get_mut(row as usize)
            .and_then(|r| r.get_mut(col as usize))
            .and_then(|slot| slot.take());
        if removed.is_some() {
            self.count -= 1;
        }
        removed
    }

    fn entries(&self) -> Vec<(u32, u32, VertexId)> {
        let mut out = Vec::with_capacity(self.count);
        for (r, line) in self.rows.iter().enumerate() {
            for (c, slot) in line.iter().enumerate() {
                if let Some(id) = slot {
                    out.push((r as u32, c as u32, *id));
                }
            }
        }
        out
    }

    fn len(&self) -> usize {
        self.count
    }

    fn extent(&self) -> (u32, u32) {
        let mut height = 0;
        let mut width = 0;
        for (r, line) in self.rows.iter().enumerate() {
            if let Some(last) = line.iter().rposition(|s| s.is_some()) {
                height = r as u32 + 1;
                width = width.max(last as u32 + 1);
            }
        }
        (height, width)
    }

    fn is_dense(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct SparseStorage {
    cells: BTreeMap<(u32, u32), VertexId>,
}

impl AddressStorage for SparseStorage {
    fn get(&self, row: u32, col: u32) -> Option<VertexId> {
        self.cells.get(&(row, col)).copied()
    }

    fn set(&mut self, row: u32, col: u32, id: VertexId) {
        self.cells.insert((row, col), id);
    }

    fn remove(&mut self, row: u32, col: u32) -> Option<VertexId> {
        self.cells.remove(&(row, col))
    }

    fn entries(&self) -> Vec<(u32, u32, VertexId)> {
        self.cells.iter().map(|(&(r, c), &id)| (r, c, id)).collect()
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn extent(&self) -> (u32, u32) {
        let height = self.cells.keys().next_back().map_or(0, |(r, _)| r + 1);
        let width = self.cells.keys().map(|(_, c)| c + 1).max().unwrap_or(0);
        (height, width)
    }

    fn is_dense(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct AddressMapping {
    sheets: FxHashMap<SheetId, Box<dyn AddressStorage>>,
    policy: AddressStoragePolicy,
}

fn new_storage(dense: bool) -> Box<dyn AddressStorage> {
    if dense {
        Box::new(DenseStorage::default())
    } else {
        Box::new(SparseStorage::default())
    }
}

impl AddressMapping {
    pub fn new(policy: AddressStoragePolicy) -> Self {
        Self {
            sheets: FxHashMap::default(),
            policy,
        }
    }

    pub fn policy(&self) -> AddressStoragePolicy {
        self.policy
    }

    /// Register a sheet, choosing its storage from the expected fill.
    pub fn add_sheet(&mut self, sheet: SheetId, filled: usize, height: u32, width: u32) {
        let dense = self.policy.prefers_dense(filled, height, width);
        self.sheets.entry(sheet).or_insert_with(|| new_storage(dense));
    }

    pub fn remove_sheet(&mut self, sheet: SheetId) -> Vec<(CellAddress, VertexId)> {
        let entries = self.entries_in_sheet(sheet);
        self.sheets.remove(&sheet);
        entries
    }

    pub fn has_sheet(&self, sheet: SheetId) -> bool {
        self.sheets.contains_key(&sheet)
    }

    pub fn is_dense(&self, sheet: SheetId) -> Option<bool> {
        self.sheets.get(&sheet).map(|s| s.is_dense())
    }

    pub fn get(&self, addr: &CellAddress) -> Option<VertexId> {
        self.sheets.get(&addr.sheet)?.get(addr.row, addr.col)
    }

    pub fn set(&mut self, addr: CellAddress, id: VertexId) {
        let policy = self.policy;
        self.sheets
            .entry(addr.sheet)
            .or_insert_with(|| new_storage(policy.prefers_dense(0, 0, 0)))
            .set(addr.row, addr.col, id);
    }

    pub fn remove(&mut self, addr: &CellAddress) -> Option<VertexId> {
        self.sheets.get_mut(&addr.sheet)?.remove(addr.row, addr.col)
    }

    pub fn entries_in_sheet(&self, sheet: SheetId) -> Vec<(CellAddress, VertexId)> {
        self.sheets.get(&sheet).map_or_else(Vec::new, |s| {
            s.entries()
                .into_iter()
                .map(|(r, c, id)| (CellAddress::new(sheet, r, c), id))
                .collect()
        })
    }

    pub fn entries_in_range(&self, range: &RangeAddress) -> Vec<(CellAddress, VertexId)> {
        let Some(storage) = self.sheets.get(&range.sheet) else {
            return Vec::new();
        };
        let (height, width) = storage.extent();
        let rows = u64::from(range.end_row.min(height.saturating_sub(1)))
            .saturating_sub(u64::from(range.start_row))
            + 1;
        let cols = u64::from(range.end_col.min(width.saturating_sub(1)))
            .saturating_sub(u64::from(range.start_col))
            + 1;
        if range.is_finite() && rows * cols < storage.len() as u64 {
            range
                .cells()
                .filter_map(|a| storage.get(a.row, a.col).map(|id| (a, id)))
                .collect()
        } else {
            storage
                .entries()
                .into_iter()
                .map(|(r, c, id)| (CellAddress::new(range.sheet, r, c), id))
                .filter(|(a, _)| range.contains(a))
                .collect()
        }
    }

    /// Used (rows, cols) of a sheet.
    pub fn sheet_extent(&self, sheet: SheetId) -> (u32, u32) {
        self.sheets.get(&sheet).map_or((0, 0), |s| s.extent())
    }

    /// Clip open bounds of `range` to the used extent of its sheet.
    /// Returns `None` when nothing of the range is in use.
    pub fn clip(&self, range: &RangeAddress) -> Option<RangeAddress> {
        if range.is_finite() {
            return Some(*range);
        }
        let (height, width) = self.sheet_extent(range.sheet);
        let end_row = if range.end_row == UNBOUNDED {
            height.checked_sub(1)?
        } else {
            range.end_row
        };
        let end_col = if range.end_col == UNBOUNDED {
            width.checked_sub(1)?
        } else {
            range.end_col
        };
        if end_row < range.start_row || end_col < range.start_col {
            return None;
        }
        Some(RangeAddress {
            end_row,
            end_col,
            ..*range
        })
    }

    /// Rebuild every sheet's storage under `policy`.
    pub fn rebuild(&mut self, policy: AddressStoragePolicy) {
        self.policy = policy;
        let sheets: Vec<SheetId> = self.sheets.keys().copied().collect();
        for sheet in sheets {
            let Some(old) = self.sheets.remove(&sheet) else {
                continue;
            };
            let (height, width) = old.extent();
            let mut fresh = new_storage(policy.prefers_dense(old.len(), height, width));
            for (r, c, id) in old.entries() {
                fresh.set(r, c, id);
            }
            self.sheets.insert(sheet, fresh);
        }
    }

    pub fn len(&self) -> usize {
        self.sheets.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
