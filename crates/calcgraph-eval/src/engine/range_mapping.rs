use crate::engine::vertex::VertexId;
use calcgraph_common::{CellAddress, RangeAddress, SheetId};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Range vertices by the range they cover.
#[derive(Debug, Default)]
pub struct RangeMapping {
    by_sheet: FxHashMap<SheetId, BTreeMap<RangeAddress, VertexId>>,
}

impl RangeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, range: &RangeAddress) -> Option<VertexId> {
        self.by_sheet.get(&range.sheet)?.get(range).copied()
    }

    pub fn insert(&mut self, range: RangeAddress, id: VertexId) {
        self.by_sheet.entry(range.sheet).or_default().insert(range, id);
    }

    pub fn remove(&mut self, range: &RangeAddress) -> Option<VertexId> {
        let ranges = self.by_sheet.get_mut(&range.sheet)?;
        let id = ranges.remove(range);
        if ranges.is_empty() {
            self.by_sheet.remove(&range.sheet);
        }
        id
    }

    pub fn in_sheet(&self, sheet: SheetId) -> Vec<(RangeAddress, VertexId)> {
        self.by_sheet
            .get(&sheet)
            .map(|m| m.iter().map(|(r, id)| (*r, *id)).collect())
            .unwrap_or_default()
    }

    pub fn containing(&self, addr: &CellAddress) -> Vec<VertexId> {
        self.by_sheet
            .get(&addr.sheet)
            .map(|m| {
                m.iter()
                    .filter(|(r, _)| r.contains(addr))
                    .map(|(_, id)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn intersecting(&self, range: &RangeAddress) -> Vec<(RangeAddress, VertexId)> {
        self.by_sheet
            .get(&range.sheet)
            .map(|m| {
                m.iter()
                    .filter(|(r, _)| r.intersects(range))
                    .map(|(r, id)| (*r, *id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The registered range one row shorter than `range` with the same
    /// top-left corner and columns.
    pub fn find_smaller_range(&self, range: &RangeAddress) -> Option<(RangeAddress, VertexId)> {
        if !range.is_finite() || range.end_row == range.start_row {
            return None;
        }
        let smaller = RangeAddress {
            end_row: range.end_row - 1,
            ..*range
        };
        self.get(&smaller).map(|id| (smaller, id))
    }

    pub fn remove_sheet(&mut self, sheet: SheetId) -> Vec<(RangeAddress, VertexId)> {
        self.by_sheet
            .remove(&sheet)
            .map(|m| m.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_sheet.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sheet.is_empty()
    }
}
