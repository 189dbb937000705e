use crate::engine::vertex::VertexId;
use calcgraph_common::{CellAddress, RangeAddress, SheetId};
use std::collections::BTreeMap;

/// Array formulas by anchor, with their footprints.
#[derive(Debug, Default)]
pub struct ArrayMapping {
    arrays: BTreeMap<CellAddress, (RangeAddress, VertexId)>,
}

impl ArrayMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, footprint: RangeAddress, id: VertexId) {
        self.arrays.insert(footprint.start(), (footprint, id));
    }

    pub fn remove(&mut self, anchor: &CellAddress) -> Option<(RangeAddress, VertexId)> {
        self.arrays.remove(anchor)
    }

    pub fn get(&self, anchor: &CellAddress) -> Option<(RangeAddress, VertexId)> {
        self.arrays.get(anchor).copied()
    }

    /// The array whose footprint covers `addr`.
    pub fn containing(&self, addr: &CellAddress) -> Option<(RangeAddress, VertexId)> {
        self.arrays
            .range(..=*addr)
            .rev()
            .take_while(|(anchor, _)| anchor.sheet == addr.sheet)
            .map(|(_, v)| *v)
            .find(|(footprint, _)| footprint.contains(addr))
    }

    pub fn overlapping(&self, range: &RangeAddress) -> Vec<(RangeAddress, VertexId)> {
        self.arrays
            .values()
            .filter(|(footprint, _)| footprint.intersects(range))
            .copied()
            .collect()
    }

    /// Arrays of a sheet in row-major anchor order.
    pub fn in_sheet(&self, sheet: SheetId) -> Vec<(RangeAddress, VertexId)> {
        self.arrays
            .range(CellAddress::new(sheet, 0, 0)..)
            .take_while(|(anchor, _)| anchor.sheet == sheet)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_uses_footprints() {
        let mut m = ArrayMapping::new();
        m.insert(RangeAddress::new(0, 1, 1, 2, 3), VertexId::new(4));
        m.insert(RangeAddress::new(0, 5, 0, 5, 0), VertexId::new(5));
        assert_eq!(
            m.containing(&CellAddress::new(0, 2, 2)).map(|(_, id)| id),
            Some(VertexId::new(4))
        );
        assert_eq!(m.containing(&CellAddress::new(0, 3, 2)), None);
        assert_eq!(m.containing(&CellAddress::new(1, 2, 2)), None);
        assert_eq!(m.in_sheet(0).len(), 2);
        assert_eq!(m.overlapping(&RangeAddress::new(0, 0, 0, 1, 1)).len(), 1);
    }
}
