use crate::engine::sheet_registry::SheetRegistry;
use calcgraph_common::{CellAddress, RangeAddress, SheetId, UNBOUNDED};
use calcgraph_parse::{ASTNode, ReferenceRewrite, ReferenceType};

/// A change to the shape of the workbook, in 0-based coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralTransform {
    InsertRows {
        sheet: SheetId,
        at: u32,
        count: u32,
    },
    RemoveRows {
        sheet: SheetId,
        start: u32,
        count: u32,
    },
    InsertColumns {
        sheet: SheetId,
        at: u32,
        count: u32,
    },
    RemoveColumns {
        sheet: SheetId,
        start: u32,
        count: u32,
    },
    /// Cut `source` and drop it with its top-left corner on `target`.
    MoveCells {
        source: RangeAddress,
        target: CellAddress,
    },
    RemoveSheet {
        sheet: SheetId,
    },
    RenameSheet {
        sheet: SheetId,
        new_name: String,
    },
}

/// Where something ends up after a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation<T> {
    Unchanged,
    Moved(T),
    Destroyed,
}

impl<T: Copy> Relocation<T> {
    /// Position after the transform, or `None` when destroyed.
    pub fn resolve(self, original: T) -> Option<T> {
        match self {
            Relocation::Unchanged => Some(original),
            Relocation::Moved(t) => Some(t),
            Relocation::Destroyed => None,
        }
    }
}

fn insert_at(v: u32, at: u32, count: u32) -> u32 {
    if v != UNBOUNDED && v >= at {
        v.saturating_add(count).min(UNBOUNDED - 1)
    } else {
        v
    }
}

/// Remove `count` lines starting at `start` from the span `s..=e`.
fn remove_span(s: u32, e: u32, start: u32, count: u32) -> Option<(u32, u32)> {
    let end_rm = start.saturating_add(count.saturating_sub(1));
    if s >= start && e <= end_rm {
        return None;
    }
    let new_start = if s < start {
        s
    } else if s <= end_rm {
        start
    } else {
        s - count
    };
    let new_end = if e == UNBOUNDED || e < start {
        e
    } else if e <= end_rm {
        start - 1
    } else {
        e - count
    };
    Some((new_start, new_end))
}

/// Offset a line index, clamped to the addressable lines.
fn shift(v: u32, delta: i64) -> u32 {
    if v == UNBOUNDED {
        v
    } else {
        let shifted = (i64::from(v) + delta).clamp(0, i64::from(UNBOUNDED - 1));
        u32::try_from(shifted).unwrap_or(UNBOUNDED - 1)
    }
}

impl StructuralTransform {
    /// The sheet whose contents move or disappear.
    pub fn sheet(&self) -> SheetId {
        match self {
            StructuralTransform::InsertRows { sheet, .. }
            | StructuralTransform::RemoveRows { sheet, .. }
            | StructuralTransform::InsertColumns { sheet, .. }
            | StructuralTransform::RemoveColumns { sheet, .. }
            | StructuralTransform::RemoveSheet { sheet }
            | StructuralTransform::RenameSheet { sheet, .. } => *sheet,
            StructuralTransform::MoveCells { source, .. } => source.sheet,
        }
    }

    /// Rectangle covered by the moved cells after a `MoveCells`.
    pub fn move_destination(&self) -> Option<RangeAddress> {
        match self {
            StructuralTransform::MoveCells { source, target } => Some(RangeAddress {
                sheet: target.sheet,
                start_row: target.row,
                start_col: target.col,
                end_row: shift(source.end_row, i64::from(target.row) - i64::from(source.start_row)),
                end_col: shift(source.end_col, i64::from(target.col) - i64::from(source.start_col)),
            }),
            _ => None,
        }
    }

    pub fn transform_cell(&self, cell: CellAddress) -> Relocation<CellAddress> {
        match self.transform_range(RangeAddress::single(cell)) {
            Relocation::Unchanged => Relocation::Unchanged,
            Relocation::Moved(r) => Relocation::Moved(r.start()),
            Relocation::Destroyed => Relocation::Destroyed,
        }
    }

    /// Insertions stretch a range that spans the insertion point;
    /// removals truncate it, destroying it only when nothing survives.
    /// A move carries ranges lying entirely inside the source and
    /// destroys ranges lying entirely inside the destination.
    pub fn transform_range(&self, range: RangeAddress) -> Relocation<RangeAddress> {
        let moved = match self {
            StructuralTransform::InsertRows { sheet, at, count } if range.sheet == *sheet => {
                RangeAddress {
                    start_row: insert_at(range.start_row, *at, *count),
                    end_row: insert_at(range.end_row, *at, *count),
                    ..range
                }
            }
            StructuralTransform::InsertColumns { sheet, at, count } if range.sheet == *sheet => {
                RangeAddress {
                    start_col: insert_at(range.start_col, *at, *count),
                    end_col: insert_at(range.end_col, *at, *count),
                    ..range
                }
            }
            StructuralTransform::RemoveRows { sheet, start, count } if range.sheet == *sheet => {
                if range.is_whole_columns() && range.start_row == 0 {
                    return Relocation::Unchanged;
                }
                match remove_span(range.start_row, range.end_row, *start, *count) {
                    Some((s, e)) => RangeAddress {
                        start_row: s,
                        end_row: e,
                        ..range
                    },
                    None => return Relocation::Destroyed,
                }
            }
            StructuralTransform::RemoveColumns { sheet, start, count } if range.sheet == *sheet => {
                if range.is_whole_rows() && range.start_col == 0 {
                    return Relocation::Unchanged;
                }
                match remove_span(range.start_col, range.end_col, *start, *count) {
                    Some((s, e)) => RangeAddress {
                        start_col: s,
                        end_col: e,
                        ..range
                    },
                    None => return Relocation::Destroyed,
                }
            }
            StructuralTransform::MoveCells { source, target } => {
                if source.contains_range(&range) {
                    let dr = i64::from(target.row) - i64::from(source.start_row);
                    let dc = i64::from(target.col) - i64::from(source.start_col);
                    RangeAddress {
                        sheet: target.sheet,
                        start_row: shift(range.start_row, dr),
                        start_col: shift(range.start_col, dc),
                        end_row: shift(range.end_row, dr),
                        end_col: shift(range.end_col, dc),
                    }
                } else if self
                    .move_destination()
                    .is_some_and(|dest| dest.contains_range(&range))
                {
                    return Relocation::Destroyed;
                } else {
                    return Relocation::Unchanged;
                }
            }
            StructuralTransform::RemoveSheet { sheet } if range.sheet == *sheet => {
                return Relocation::Destroyed;
            }
            _ => return Relocation::Unchanged,
        };
        if moved == range {
            Relocation::Unchanged
        } else {
            Relocation::Moved(moved)
        }
    }
}

/// Rewrites formula references for structural transforms and for
/// pasting copied formulas at an offset.
pub struct ReferenceAdjuster<'a> {
    sheets: &'a SheetRegistry,
}

/// A reference after its sheet was resolved, in 0-based coordinates.
enum Located {
    Cell(CellAddress),
    Range(RangeAddress),
}

impl<'a> ReferenceAdjuster<'a> {
    pub fn new(sheets: &'a SheetRegistry) -> Self {
        Self { sheets }
    }

    fn locate(&self, reference: &ReferenceType, host: SheetId) -> Option<Located> {
        let sheet = match reference.sheet() {
            Some(name) => self.sheets.id_for(name)?,
            None => host,
        };
        match reference {
            ReferenceType::Cell { row, col, .. } => {
                Some(Located::Cell(CellAddress::new(sheet, row - 1, col - 1)))
            }
            ReferenceType::Range {
                start_row,
                start_col,
                end_row,
                end_col,
                ..
            } => Some(Located::Range(RangeAddress::new(
                sheet,
                start_row.map_or(0, |r| r - 1),
                start_col.map_or(0, |c| c - 1),
                end_row.map_or(UNBOUNDED, |r| r - 1),
                end_col.map_or(UNBOUNDED, |c| c - 1),
            ))),
            ReferenceType::NamedRange(_) => None,
        }
    }

    fn sheet_name(&self, sheet: SheetId, transform: &StructuralTransform) -> Option<String> {
        match transform {
            StructuralTransform::RenameSheet { sheet: s, new_name } if *s == sheet => {
                Some(new_name.clone())
            }
            _ => self.sheets.name(sheet).map(str::to_string),
        }
    }

    /// Rewrite `ast` of a formula hosted on `host` that will be hosted
    /// on `new_host` afterwards. Returns `None` when nothing changed.
    pub fn adjust_ast(
        &self,
        ast: &ASTNode,
        transform: &StructuralTransform,
        host: SheetId,
        new_host: SheetId,
    ) -> Option<ASTNode> {
        let mut changed = false;
        let out = ast.rewrite_references(&mut |reference| {
            let rewrite = self.adjust_reference(reference, transform, host, new_host);
            if rewrite != ReferenceRewrite::Unchanged {
                changed = true;
            }
            rewrite
        });
        changed.then_some(out)
    }

    pub fn adjust_reference(
        &self,
        reference: &ReferenceType,
        transform: &StructuralTransform,
        host: SheetId,
        new_host: SheetId,
    ) -> ReferenceRewrite {
        let Some(located) = self.locate(reference, host) else {
            return ReferenceRewrite::Unchanged;
        };
        let (sheet, new_ref) = match located {
            Located::Cell(cell) => match transform.transform_cell(cell) {
                Relocation::Destroyed => return ReferenceRewrite::Destroyed,
                Relocation::Unchanged => (cell.sheet, reference.clone()),
                Relocation::Moved(c) => (c.sheet, with_cell(reference, c)),
            },
            Located::Range(range) => match transform.transform_range(range) {
                Relocation::Destroyed => return ReferenceRewrite::Destroyed,
                Relocation::Unchanged => (range.sheet, reference.clone()),
                Relocation::Moved(r) => (r.sheet, with_range(reference, r)),
            },
        };
        let renamed = matches!(
            transform,
            StructuralTransform::RenameSheet { sheet: s, .. } if *s == sheet
        );
        let qualified = if reference.sheet().is_none() && sheet == new_host {
            new_ref.with_sheet(None)
        } else {
            match (reference.sheet(), self.sheet_name(sheet, transform)) {
                (Some(current), Some(name)) if !renamed && current.eq_ignore_ascii_case(&name) => {
                    new_ref
                }
                (_, Some(name)) => new_ref.with_sheet(Some(name)),
                (_, None) => new_ref,
            }
        };
        if qualified == *reference {
            ReferenceRewrite::Unchanged
        } else {
            ReferenceRewrite::Replaced(qualified)
        }
    }

    /// Shift the relative parts of every reference by a paste offset.
    /// Absolute parts and open dimensions stay put; references pushed
    /// off the grid become `#REF!`.
    pub fn offset_ast(&self, ast: &ASTNode, rows: i64, cols: i64) -> ASTNode {
        ast.rewrite_references(&mut |reference| offset_reference(reference, rows, cols))
    }
}

fn with_cell(reference: &ReferenceType, cell: CellAddress) -> ReferenceType {
    match reference {
        ReferenceType::Cell { sheet, anchor, .. } => ReferenceType::Cell {
            sheet: sheet.clone(),
            row: cell.row + 1,
            col: cell.col + 1,
            anchor: *anchor,
        },
        other => other.clone(),
    }
}

fn with_range(reference: &ReferenceType, range: RangeAddress) -> ReferenceType {
    match reference {
        ReferenceType::Range {
            sheet,
            start_row,
            start_col,
            end_row,
            end_col,
            start_anchor,
            end_anchor,
        } => ReferenceType::Range {
            sheet: sheet.clone(),
            start_row: start_row.map(|_| range.start_row + 1),
            start_col: start_col.map(|_| range.start_col + 1),
            end_row: end_row.map(|_| range.end_row + 1),
            end_col: end_col.map(|_| range.end_col + 1),
            start_anchor: *start_anchor,
            end_anchor: *end_anchor,
        },
        other => other.clone(),
    }
}

fn offset_coord(v: u32, delta: i64, absolute: bool) -> Option<u32> {
    if absolute || delta == 0 {
        return Some(v);
    }
    let moved = i64::from(v) + delta;
    (moved >= 1 && moved < i64::from(UNBOUNDED)).then_some(moved as u32)
}

fn offset_reference(reference: &ReferenceType, rows: i64, cols: i64) -> ReferenceRewrite {
    let moved = match reference {
        ReferenceType::Cell {
            sheet,
            row,
            col,
            anchor,
        } => {
            let (Some(row), Some(col)) = (
                offset_coord(*row, rows, anchor.row_abs),
                offset_coord(*col, cols, anchor.col_abs),
            ) else {
                return ReferenceRewrite::Destroyed;
            };
            ReferenceType::Cell {
                sheet: sheet.clone(),
                row,
                col,
                anchor: *anchor,
            }
        }
        ReferenceType::Range {
            sheet,
            start_row,
            start_col,
            end_row,
            end_col,
            start_anchor,
            end_anchor,
        } => {
            let part = |v: Option<u32>, delta: i64, abs: bool| -> Result<Option<u32>, ()> {
                match v {
                    None => Ok(None),
                    Some(v) => offset_coord(v, delta, abs).map(Some).ok_or(()),
                }
            };
            let parts = (
                part(*start_row, rows, start_anchor.row_abs),
                part(*start_col, cols, start_anchor.col_abs),
                part(*end_row, rows, end_anchor.row_abs),
                part(*end_col, cols, end_anchor.col_abs),
            );
            let (Ok(start_row), Ok(start_col), Ok(end_row), Ok(end_col)) = parts else {
                return ReferenceRewrite::Destroyed;
            };
            ReferenceType::Range {
                sheet: sheet.clone(),
                start_row,
                start_col,
                end_row,
                end_col,
                start_anchor: *start_anchor,
                end_anchor: *end_anchor,
            }
        }
        ReferenceType::NamedRange(_) => return ReferenceRewrite::Unchanged,
    };
    if moved == *reference {
        ReferenceRewrite::Unchanged
    } else {
        ReferenceRewrite::Replaced(moved)
    }
}
