//! Sheet-scoped coordinates used by the graph, the address mapping and
//! structural edits. Everything here is 0-based; the 1-based A1 notation
//! only appears at the text boundary.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable sheet identifier. Ids are never reused while a sheet exists.
pub type SheetId = u32;

/// Reserved sheet that hosts the synthetic cells of named expressions.
pub const NAMED_EXPRESSION_SHEET: SheetId = SheetId::MAX;

/// Marker for the open end of a whole-column or whole-row range.
pub const UNBOUNDED: u32 = u32::MAX;

/// A single cell. Ordering is row-major within a sheet.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub sheet: SheetId,
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub const fn new(sheet: SheetId, row: u32, col: u32) -> Self {
        Self { sheet, row, col }
    }

    /// Parse `B3` (1-based notation) into a 0-based address on `sheet`.
    pub fn parse_a1(sheet: SheetId, text: &str) -> Option<Self> {
        let (col, row) = parse_a1_parts(text)?;
        Some(Self::new(sheet, row, col))
    }

    /// Shift by a signed offset; `None` when the result leaves the grid.
    pub fn offset(&self, rows: i64, cols: i64) -> Option<Self> {
        let row = i64::from(self.row) + rows;
        let col = i64::from(self.col) + cols;
        if row < 0 || col < 0 || row >= i64::from(UNBOUNDED) || col >= i64::from(UNBOUNDED) {
            return None;
        }
        Some(Self::new(self.sheet, row as u32, col as u32))
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row + 1)
    }

    pub fn is_named_expression(&self) -> bool {
        self.sheet == NAMED_EXPRESSION_SHEET
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_named_expression() {
            write!(f, "#names!{}", self.to_a1())
        } else {
            write!(f, "#{}!{}", self.sheet, self.to_a1())
        }
    }
}

/// A rectangle of cells; `end_row`/`end_col` may be [`UNBOUNDED`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeAddress {
    pub sheet: SheetId,
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl RangeAddress {
    pub fn new(sheet: SheetId, start_row: u32, start_col: u32, end_row: u32, end_col: u32) -> Self {
        Self {
            sheet,
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: end_row.max(start_row),
            end_col: end_col.max(start_col),
        }
    }

    pub fn from_corners(start: CellAddress, end: CellAddress) -> Self {
        Self::new(start.sheet, start.row, start.col, end.row, end.col)
    }

    pub fn single(cell: CellAddress) -> Self {
        Self::from_corners(cell, cell)
    }

    pub fn whole_columns(sheet: SheetId, start_col: u32, end_col: u32) -> Self {
        Self::new(sheet, 0, start_col, UNBOUNDED, end_col)
    }

    pub fn whole_rows(sheet: SheetId, start_row: u32, end_row: u32) -> Self {
        Self::new(sheet, start_row, 0, end_row, UNBOUNDED)
    }

    /// Parse `A1:B3` on `sheet`.
    pub fn parse_a1(sheet: SheetId, text: &str) -> Option<Self> {
        let (start, end) = text.split_once(':')?;
        let start = CellAddress::parse_a1(sheet, start)?;
        let end = CellAddress::parse_a1(sheet, end)?;
        Some(Self::from_corners(start, end))
    }

    pub fn start(&self) -> CellAddress {
        CellAddress::new(self.sheet, self.start_row, self.start_col)
    }

    pub fn end(&self) -> CellAddress {
        CellAddress::new(self.sheet, self.end_row, self.end_col)
    }

    pub fn is_finite(&self) -> bool {
        self.end_row != UNBOUNDED && self.end_col != UNBOUNDED
    }

    pub fn is_whole_columns(&self) -> bool {
        self.end_row == UNBOUNDED
    }

    pub fn is_whole_rows(&self) -> bool {
        self.end_col == UNBOUNDED
    }

    pub fn height(&self) -> Option<u32> {
        (self.end_row != UNBOUNDED).then(|| self.end_row - self.start_row + 1)
    }

    pub fn width(&self) -> Option<u32> {
        (self.end_col != UNBOUNDED).then(|| self.end_col - self.start_col + 1)
    }

    pub fn contains(&self, cell: &CellAddress) -> bool {
        cell.sheet == self.sheet
            && cell.row >= self.start_row
            && cell.row <= self.end_row
            && cell.col >= self.start_col
            && cell.col <= self.end_col
    }

    pub fn contains_range(&self, other: &RangeAddress) -> bool {
        other.sheet == self.sheet
            && other.start_row >= self.start_row
            && other.end_row <= self.end_row
            && other.start_col >= self.start_col
            && other.end_col <= self.end_col
    }

    pub fn intersects(&self, other: &RangeAddress) -> bool {
        self.sheet == other.sheet
            && self.start_row <= other.end_row
            && other.start_row <= self.end_row
            && self.start_col <= other.end_col
            && other.start_col <= self.end_col
    }

    /// Every address of a finite range in row-major order. Unbounded
    /// ranges yield nothing.
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        let rows = if self.is_finite() {
            self.start_row..=self.end_row
        } else {
            1..=0
        };
        rows.flat_map(move |row| {
            (self.start_col..=self.end_col).map(move |col| CellAddress::new(self.sheet, row, col))
        })
    }

    pub fn with_sheet(mut self, sheet: SheetId) -> Self {
        self.sheet = sheet;
        self
    }
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = if self.is_whole_columns() {
            column_to_letters(self.start_col)
        } else if self.is_whole_rows() {
            (self.start_row + 1).to_string()
        } else {
            self.start().to_a1()
        };
        let end = if self.is_whole_columns() {
            column_to_letters(self.end_col)
        } else if self.is_whole_rows() {
            (self.end_row + 1).to_string()
        } else {
            self.end().to_a1()
        };
        write!(f, "#{}!{start}:{end}", self.sheet)
    }
}

/// 0-based column index to letters (`0 -> A`, `26 -> AA`).
pub fn column_to_letters(col: u32) -> String {
    let mut n = col as u64 + 1;
    let mut out = Vec::with_capacity(3);
    while n > 0 {
        n -= 1;
        out.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Letters to a 0-based column index, case-insensitive.
pub fn letters_to_column(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 7 {
        return None;
    }
    let mut acc: u64 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        acc = acc * 26 + u64::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    u32::try_from(acc - 1).ok()
}

/// Split `$B$3` style text into 0-based (col, row).
fn parse_a1_parts(text: &str) -> Option<(u32, u32)> {
    let text = text.trim();
    let split = text
        .trim_start_matches('$')
        .find(|c: char| !c.is_ascii_alphabetic())?;
    let body = text.trim_start_matches('$');
    let (letters, digits) = body.split_at(split);
    let digits = digits.trim_start_matches('$');
    let col = letters_to_column(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col, row - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_round_trip() {
        for (col, letters) in [(0, "A"), (25, "Z"), (26, "AA"), (701, "ZZ"), (702, "AAA")] {
            assert_eq!(column_to_letters(col), letters);
            assert_eq!(letters_to_column(letters), Some(col));
        }
        assert_eq!(letters_to_column("a"), Some(0));
        assert_eq!(letters_to_column("A1"), None);
    }

    #[test]
    fn a1_parsing() {
        assert_eq!(CellAddress::parse_a1(2, "B3"), Some(CellAddress::new(2, 2, 1)));
        assert_eq!(CellAddress::parse_a1(0, "$C$10"), Some(CellAddress::new(0, 9, 2)));
        assert_eq!(CellAddress::parse_a1(0, "A0"), None);
        let r = RangeAddress::parse_a1(0, "B2:A1").unwrap();
        assert_eq!((r.start_row, r.start_col, r.end_row, r.end_col), (0, 0, 1, 1));
    }

    #[test]
    fn row_major_ordering() {
        let mut cells = vec![
            CellAddress::new(0, 1, 0),
            CellAddress::new(0, 0, 5),
            CellAddress::new(1, 0, 0),
            CellAddress::new(0, 0, 1),
        ];
        cells.sort();
        assert_eq!(
            cells,
            vec![
                CellAddress::new(0, 0, 1),
                CellAddress::new(0, 0, 5),
                CellAddress::new(0, 1, 0),
                CellAddress::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn unbounded_ranges_do_not_enumerate() {
        let cols = RangeAddress::whole_columns(0, 0, 1);
        assert!(!cols.is_finite());
        assert_eq!(cols.cells().count(), 0);
        assert!(cols.contains(&CellAddress::new(0, 100_000, 1)));
        let finite = RangeAddress::parse_a1(0, "A1:B2").unwrap();
        assert_eq!(finite.cells().count(), 4);
    }
}
