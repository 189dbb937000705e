//! Cut, copy and paste.
//!
//! Copying snapshots the block; pasting writes the snapshots with
//! relative references shifted by the paste offset. Cutting only
//! remembers the block: the paste turns into a cell move so that
//! references follow the cells.

use crate::engine::graph::DependencyGraph;
use crate::engine::graph::editor::{EditorError, ReferenceAdjuster};
use crate::engine::graph::snapshot::CellSnapshot;
use calcgraph_common::{CellAddress, RangeAddress};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardOperation {
    Copy,
    Cut,
}

#[derive(Debug, Clone)]
pub struct Clipboard {
    pub source: RangeAddress,
    pub operation: ClipboardOperation,
    /// Row-major snapshots of a copied block. Empty for a cut.
    content: Vec<Vec<CellSnapshot>>,
}

fn ensure_copyable(graph: &DependencyGraph, source: &RangeAddress) -> Result<(), EditorError> {
    if !graph.sheets.contains(source.sheet) {
        return Err(EditorError::NoSheetWithId(source.sheet));
    }
    if !source.is_finite() {
        return Err(EditorError::InvalidArguments(
            "only finite ranges can be copied".into(),
        ));
    }
    if !graph.arrays.overlapping(source).is_empty() {
        return Err(EditorError::SourceLocationHasArray);
    }
    Ok(())
}

impl Clipboard {
    pub fn copy(graph: &DependencyGraph, source: RangeAddress) -> Result<Self, EditorError> {
        ensure_copyable(graph, &source)?;
        let content = (source.start_row..=source.end_row)
            .map(|row| {
                (source.start_col..=source.end_col)
                    .map(|col| graph.snapshot_cell(&CellAddress::new(source.sheet, row, col)))
                    .collect()
            })
            .collect();
        Ok(Self {
            source,
            operation: ClipboardOperation::Copy,
            content,
        })
    }

    pub fn cut(graph: &DependencyGraph, source: RangeAddress) -> Result<Self, EditorError> {
        ensure_copyable(graph, &source)?;
        Ok(Self {
            source,
            operation: ClipboardOperation::Cut,
            content: Vec::new(),
        })
    }

    pub fn is_cut(&self) -> bool {
        self.operation == ClipboardOperation::Cut
    }

    /// Contents to write for a paste of a copied block at `target`.
    pub fn paste_content(
        &self,
        graph: &DependencyGraph,
        target: CellAddress,
    ) -> Vec<(CellAddress, CellSnapshot)> {
        let adjuster = ReferenceAdjuster::new(&graph.sheets);
        let rows = i64::from(target.row) - i64::from(self.source.start_row);
        let cols = i64::from(target.col) - i64::from(self.source.start_col);
        let mut out = Vec::new();
        for (i, line) in self.content.iter().enumerate() {
            for (j, snapshot) in line.iter().enumerate() {
                let Some(addr) = target.offset(i as i64, j as i64) else {
                    continue;
                };
                let content = match snapshot {
                    CellSnapshot::Formula(ast) => {
                        CellSnapshot::Formula(Arc::new(adjuster.offset_ast(ast, rows, cols)))
                    }
                    other => other.clone(),
                };
                out.push((addr, content));
            }
        }
        out
    }
}
