use super::DependencyGraph;
use crate::engine::content::RawCellContent;
use crate::engine::vertex::{Formula, Vertex};
use calcgraph_common::{CellAddress, LiteralValue, RangeAddress, SheetId};
use calcgraph_parse::{ASTNode, canonical_formula};
use std::sync::Arc;

/// Content of one cell, detached from the graph. Enough to put the
/// cell back exactly as it was.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellSnapshot {
    #[default]
    Empty,
    Value {
        value: LiteralValue,
        raw: RawCellContent,
    },
    Formula(Arc<ASTNode>),
    Invalid {
        text: String,
        error: String,
    },
    /// Taken at an array anchor. Other footprint cells snapshot as empty.
    ArrayFormula {
        ast: Arc<ASTNode>,
        height: u32,
        width: u32,
    },
}

impl CellSnapshot {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellSnapshot::Empty)
    }

    /// The content as it would be typed back in.
    pub fn to_raw(&self) -> RawCellContent {
        match self {
            CellSnapshot::Empty => RawCellContent::Empty,
            CellSnapshot::Value { raw, .. } => raw.clone(),
            CellSnapshot::Formula(ast) => RawCellContent::Text(canonical_formula(ast)),
            CellSnapshot::Invalid { text, .. } => RawCellContent::Text(text.clone()),
            CellSnapshot::ArrayFormula { ast, .. } => {
                RawCellContent::Text(format!("{{{}}}", canonical_formula(ast)))
            }
        }
    }
}

impl DependencyGraph {
    pub fn snapshot_cell(&self, addr: &CellAddress) -> CellSnapshot {
        let Some(vertex) = self.vertex_at(addr).and_then(|id| self.graph.get(id)) else {
            return CellSnapshot::Empty;
        };
        match vertex {
            Vertex::Value(c) => CellSnapshot::Value {
                value: c.value.clone(),
                raw: c.raw.clone(),
            },
            Vertex::Formula(f) => match &f.formula {
                Formula::Parsed(ast) => CellSnapshot::Formula(ast.clone()),
                Formula::Unparsed { text, error } => CellSnapshot::Invalid {
                    text: text.clone(),
                    error: error.clone(),
                },
            },
            Vertex::Array(a) if a.anchor == *addr => CellSnapshot::ArrayFormula {
                ast: a.ast.clone(),
                height: a.height,
                width: a.width,
            },
            Vertex::Array(_) | Vertex::Empty(_) | Vertex::Range(_) => CellSnapshot::Empty,
        }
    }

    /// Write `snapshot` into `addr` without validation. Arrays in the
    /// way are removed, which is what replaying history needs: the
    /// state being restored had no overlap.
    pub(crate) fn restore_cell(&mut self, addr: CellAddress, snapshot: &CellSnapshot) {
        if let Some((footprint, _)) = self.arrays.containing(&addr) {
            if footprint.start() == addr || !snapshot.is_empty() {
                self.remove_array(&footprint.start());
            } else {
                return;
            }
        }
        match snapshot {
            CellSnapshot::Empty => self.set_cell_empty(addr),
            CellSnapshot::Value { value, raw } => {
                self.set_cell_value(addr, value.clone(), raw.clone());
            }
            CellSnapshot::Formula(ast) => {
                self.set_cell_formula(addr, Formula::Parsed(ast.clone()));
            }
            CellSnapshot::Invalid { text, error } => {
                self.set_cell_formula(
                    addr,
                    Formula::Unparsed {
                        text: text.clone(),
                        error: error.clone(),
                    },
                );
            }
            CellSnapshot::ArrayFormula { ast, height, width } => {
                let footprint = RangeAddress::new(
                    addr.sheet,
                    addr.row,
                    addr.col,
                    addr.row + height - 1,
                    addr.col + width - 1,
                );
                for (other, _) in self.arrays.overlapping(&footprint) {
                    self.remove_array(&other.start());
                }
                self.set_array_formula(addr, ast.clone(), *height, *width);
            }
        }
    }

    /// Raw contents of a sheet as rows, trimmed to the used extent.
    pub fn serialize_sheet(&self, sheet: SheetId) -> Vec<Vec<RawCellContent>> {
        let mut rows: Vec<Vec<RawCellContent>> = Vec::new();
        for (addr, _) in self.addresses.entries_in_sheet(sheet) {
            let raw = self.snapshot_cell(&addr).to_raw();
            if raw.is_empty() {
                continue;
            }
            let (r, c) = (addr.row as usize, addr.col as usize);
            if rows.len() <= r {
                rows.resize_with(r + 1, Vec::new);
            }
            let row = &mut rows[r];
            if row.len() <= c {
                row.resize_with(c + 1, RawCellContent::default);
            }
            row[c] = raw;
        }
        rows
    }
}
