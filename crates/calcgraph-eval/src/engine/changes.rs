//! Values that changed during one engine call.

use crate::engine::named_range::NameScope;
use calcgraph_common::{CellAddress, LiteralValue};
use rustc_hash::FxHashMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChangeAddress {
    Cell(CellAddress),
    Named { name: String, scope: NameScope },
}

impl ChangeAddress {
    pub fn cell(&self) -> Option<CellAddress> {
        match self {
            ChangeAddress::Cell(a) => Some(*a),
            ChangeAddress::Named { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellValueChange {
    pub address: ChangeAddress,
    pub old_value: LiteralValue,
    pub new_value: LiteralValue,
}

/// Accumulates value changes until they are drained. Repeated writes to
/// one address keep the first old value and the last new one.
#[derive(Debug, Default)]
pub struct ChangeList {
    entries: FxHashMap<ChangeAddress, (LiteralValue, LiteralValue)>,
}

impl ChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, address: ChangeAddress, old: LiteralValue, new: LiteralValue) {
        match self.entries.get_mut(&address) {
            Some((_, last)) => *last = new,
            None => {
                self.entries.insert(address, (old, new));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Hand out the net changes in address order. Addresses that ended
    /// where they started are dropped.
    pub fn drain(&mut self) -> Vec<CellValueChange> {
        let mut out: Vec<CellValueChange> = self
            .entries
            .drain()
            .filter(|(_, (old, new))| old != new)
            .map(|(address, (old_value, new_value))| CellValueChange {
                address,
                old_value,
                new_value,
            })
            .collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_old_and_last_new() {
        let a1 = ChangeAddress::Cell(CellAddress::new(0, 0, 0));
        let mut list = ChangeList::new();
        list.record(a1.clone(), LiteralValue::Empty, LiteralValue::Number(1.0));
        list.record(a1.clone(), LiteralValue::Number(1.0), LiteralValue::Number(2.0));
        let changes = list.drain();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value, LiteralValue::Empty);
        assert_eq!(changes[0].new_value, LiteralValue::Number(2.0));
        assert!(list.is_empty());
    }

    #[test]
    fn round_trips_are_dropped() {
        let mut list = ChangeList::new();
        let b2 = ChangeAddress::Cell(CellAddress::new(0, 1, 1));
        list.record(b2.clone(), LiteralValue::Number(3.0), LiteralValue::Number(4.0));
        list.record(b2, LiteralValue::Number(4.0), LiteralValue::Number(3.0));
        let named = ChangeAddress::Named {
            name: "Rate".into(),
            scope: NameScope::Workbook,
        };
        list.record(named.clone(), LiteralValue::Empty, LiteralValue::Boolean(true));
        let changes = list.drain();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].address, named);
    }
}
