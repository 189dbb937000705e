//! Mapping parsed references onto engine coordinates.

use calcgraph_common::{CellAddress, RangeAddress, SheetId, UNBOUNDED};
use calcgraph_parse::ReferenceType;

/// A reference with its sheet resolved and coordinates made 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedReference {
    Cell(CellAddress),
    Range(RangeAddress),
    Named(String),
}

/// Resolve `reference` for a formula whose unqualified references point
/// at `host_sheet`. Fails with the sheet name when it is unknown.
pub fn resolve_reference<F>(
    reference: &ReferenceType,
    host_sheet: SheetId,
    lookup: F,
) -> Result<ResolvedReference, String>
where
    F: Fn(&str) -> Option<SheetId>,
{
    let sheet = match reference.sheet() {
        Some(name) => lookup(name).ok_or_else(|| name.to_string())?,
        None => host_sheet,
    };
    Ok(match reference {
        ReferenceType::Cell { row, col, .. } => {
            ResolvedReference::Cell(CellAddress::new(sheet, row - 1, col - 1))
        }
        ReferenceType::Range {
            start_row,
            start_col,
            end_row,
            end_col,
            ..
        } => ResolvedReference::Range(RangeAddress::new(
            sheet,
            start_row.map_or(0, |r| r - 1),
            start_col.map_or(0, |c| c - 1),
            end_row.map_or(UNBOUNDED, |r| r - 1),
            end_col.map_or(UNBOUNDED, |c| c - 1),
        )),
        ReferenceType::NamedRange(name) => ResolvedReference::Named(name.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<SheetId> {
        (name == "Data").then_some(3)
    }

    #[test]
    fn coordinates_become_zero_based() {
        let r = ReferenceType::from_string("Data!B2:C4").unwrap();
        assert_eq!(
            resolve_reference(&r, 0, lookup),
            Ok(ResolvedReference::Range(RangeAddress::new(3, 1, 1, 3, 2)))
        );
        let c = ReferenceType::from_string("$A$1").unwrap();
        assert_eq!(
            resolve_reference(&c, 7, lookup),
            Ok(ResolvedReference::Cell(CellAddress::new(7, 0, 0)))
        );
    }

    #[test]
    fn open_ranges_are_unbounded() {
        let cols = ReferenceType::from_string("B:C").unwrap();
        assert_eq!(
            resolve_reference(&cols, 0, lookup),
            Ok(ResolvedReference::Range(RangeAddress::whole_columns(0, 1, 2)))
        );
        let rows = ReferenceType::from_string("2:2").unwrap();
        assert_eq!(
            resolve_reference(&rows, 0, lookup),
            Ok(ResolvedReference::Range(RangeAddress::whole_rows(0, 1, 1)))
        );
    }

    #[test]
    fn unknown_sheet_is_reported() {
        let r = ReferenceType::from_string("Nope!A1").unwrap();
        assert_eq!(resolve_reference(&r, 0, lookup), Err("Nope".to_string()));
    }
}
