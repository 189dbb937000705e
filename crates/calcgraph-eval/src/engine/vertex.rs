use crate::engine::content::RawCellContent;
use bitflags::bitflags;
use calcgraph_common::{CellAddress, ExcelError, LiteralValue, RangeAddress, SheetId};
use calcgraph_parse::ASTNode;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::Arc;

/// Engine-internal vertex identity. Ids are recycled after removal.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VertexId(pub(crate) u32);

impl VertexId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VertexFlags: u8 {
        /// Value was produced by circular relaxation and seeds the next one.
        const ITERATED = 0b0000_0001;
        /// Last evaluation found the vertex on a cycle.
        const CYCLIC = 0b0000_0010;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexKind {
    Empty,
    Value,
    Formula,
    Array,
    Range,
}

/// Formula source held by a [`FormulaCell`].
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Parsed(Arc<ASTNode>),
    /// Text that failed to parse, kept verbatim and never evaluated.
    Unparsed { text: String, error: String },
}

#[derive(Debug, Clone)]
pub struct ValueCell {
    pub address: CellAddress,
    pub value: LiteralValue,
    pub raw: RawCellContent,
}

#[derive(Debug, Clone)]
pub struct FormulaCell {
    pub address: CellAddress,
    /// Sheet that unqualified references resolve against.
    pub host_sheet: SheetId,
    pub formula: Formula,
    pub value: Option<LiteralValue>,
    pub flags: VertexFlags,
    pub generation: u64,
}

impl FormulaCell {
    pub fn new(address: CellAddress, host_sheet: SheetId, formula: Formula) -> Self {
        let value = match &formula {
            Formula::Parsed(_) => None,
            Formula::Unparsed { error, .. } => Some(LiteralValue::Error(
                ExcelError::new(calcgraph_common::ExcelErrorKind::Error).with_message(error.clone()),
            )),
        };
        Self {
            address,
            host_sheet,
            formula,
            value,
            flags: VertexFlags::empty(),
            generation: 0,
        }
    }

    pub fn ast(&self) -> Option<&Arc<ASTNode>> {
        match &self.formula {
            Formula::Parsed(ast) => Some(ast),
            Formula::Unparsed { .. } => None,
        }
    }
}

/// A formula whose result occupies a fixed rectangle anchored at its
/// top-left cell.
#[derive(Debug, Clone)]
pub struct ArrayVertex {
    pub anchor: CellAddress,
    pub height: u32,
    pub width: u32,
    pub ast: Arc<ASTNode>,
    pub values: Option<Vec<Vec<LiteralValue>>>,
    pub flags: VertexFlags,
    pub generation: u64,
}

impl ArrayVertex {
    pub fn new(anchor: CellAddress, height: u32, width: u32, ast: Arc<ASTNode>) -> Self {
        Self {
            anchor,
            height,
            width,
            ast,
            values: None,
            flags: VertexFlags::empty(),
            generation: 0,
        }
    }

    pub fn footprint(&self) -> RangeAddress {
        RangeAddress::new(
            self.anchor.sheet,
            self.anchor.row,
            self.anchor.col,
            self.anchor.row + self.height - 1,
            self.anchor.col + self.width - 1,
        )
    }

    pub fn value_at(&self, addr: &CellAddress) -> LiteralValue {
        let (Some(i), Some(j)) = (
            addr.row.checked_sub(self.anchor.row),
            addr.col.checked_sub(self.anchor.col),
        ) else {
            return LiteralValue::Empty;
        };
        self.values
            .as_ref()
            .and_then(|rows| rows.get(i as usize))
            .and_then(|row| row.get(j as usize))
            .cloned()
            .unwrap_or(LiteralValue::Empty)
    }
}

/// A range referenced by at least one formula. Caches partial
/// aggregates keyed by function and criterion; the cache is dropped
/// whenever the range is reached by a recalculation.
#[derive(Debug)]
pub struct RangeVertex {
    pub range: RangeAddress,
    cache: RefCell<FxHashMap<String, LiteralValue>>,
}

impl RangeVertex {
    pub fn new(range: RangeAddress) -> Self {
        Self {
            range,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn cached(&self, key: &str) -> Option<LiteralValue> {
        self.cache.borrow().get(key).cloned()
    }

    pub fn store(&self, key: &str, value: LiteralValue) {
        self.cache.borrow_mut().insert(key.to_string(), value);
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }
}

#[derive(Debug)]
pub enum Vertex {
    /// A cell with no content that a formula still reads.
    Empty(CellAddress),
    Value(ValueCell),
    Formula(FormulaCell),
    Array(ArrayVertex),
    Range(RangeVertex),
}

impl Vertex {
    pub fn kind(&self) -> VertexKind {
        match self {
            Vertex::Empty(_) => VertexKind::Empty,
            Vertex::Value(_) => VertexKind::Value,
            Vertex::Formula(_) => VertexKind::Formula,
            Vertex::Array(_) => VertexKind::Array,
            Vertex::Range(_) => VertexKind::Range,
        }
    }

    /// Cell address of the vertex; arrays report their anchor.
    pub fn address(&self) -> Option<CellAddress> {
        match self {
            Vertex::Empty(a) => Some(*a),
            Vertex::Value(c) => Some(c.address),
            Vertex::Formula(c) => Some(c.address),
            Vertex::Array(a) => Some(a.anchor),
            Vertex::Range(_) => None,
        }
    }

    /// Deterministic ordering used for tie-breaking: sheet, row, column,
    /// then cells before ranges.
    pub fn sort_key(&self) -> (SheetId, u32, u32, u8) {
        match self {
            Vertex::Range(r) => (r.range.sheet, r.range.start_row, r.range.start_col, 1),
            other => {
                let a = other.address().unwrap_or(CellAddress::new(0, 0, 0));
                (a.sheet, a.row, a.col, 0)
            }
        }
    }

    pub fn value_at(&self, addr: &CellAddress) -> LiteralValue {
        match self {
            Vertex::Value(c) => c.value.clone(),
            Vertex::Formula(c) => c.value.clone().unwrap_or(LiteralValue::Empty),
            Vertex::Array(a) => a.value_at(addr),
            Vertex::Empty(_) | Vertex::Range(_) => LiteralValue::Empty,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, Vertex::Formula(_) | Vertex::Array(_))
    }

    pub fn flags(&self) -> VertexFlags {
        match self {
            Vertex::Formula(c) => c.flags,
            Vertex::Array(a) => a.flags,
            _ => VertexFlags::empty(),
        }
    }

    pub(crate) fn flags_mut(&mut self) -> Option<&mut VertexFlags> {
        match self {
            Vertex::Formula(c) => Some(&mut c.flags),
            Vertex::Array(a) => Some(&mut a.flags),
            _ => None,
        }
    }
}
