//! Named expression registry.
//!
//! Each name lives on a synthetic address of the
//! [`NAMED_EXPRESSION_SHEET`] so that it can take part in the
//! dependency graph like a cell. A formula that mentions an unknown
//! name gets a workbook-scoped placeholder which evaluates to `#NAME?`
//! until the name is added.

use calcgraph_common::{CellAddress, NAMED_EXPRESSION_SHEET, SheetId, letters_to_column};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use rustc_hash::FxHashMap;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameScope {
    Workbook,
    Sheet(SheetId),
}

impl NameScope {
    pub fn from_sheet(sheet: Option<SheetId>) -> Self {
        sheet.map_or(NameScope::Workbook, NameScope::Sheet)
    }

    pub fn sheet(&self) -> Option<SheetId> {
        match self {
            NameScope::Workbook => None,
            NameScope::Sheet(s) => Some(*s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpression {
    /// Name as it was first written.
    pub name: String,
    pub scope: NameScope,
    pub address: CellAddress,
    /// False for placeholders created by references to unknown names.
    pub added: bool,
}

#[derive(Debug, Default)]
pub struct NamedExpressions {
    entries: FxHashMap<(String, NameScope), NamedExpression>,
    by_address: FxHashMap<CellAddress, (String, NameScope)>,
    next_row: u32,
    free_rows: Vec<u32>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

/// Whether `name` can be used for a named expression: a letter,
/// underscore or backslash followed by letters, digits, `_` and `.`,
/// and not readable as a cell reference or a boolean.
pub fn is_name_valid(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_' || first == '\\') {
        return false;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        return false;
    }
    if name.eq_ignore_ascii_case("TRUE") || name.eq_ignore_ascii_case("FALSE") {
        return false;
    }
    !looks_like_cell(name) && !looks_like_r1c1(name)
}

fn looks_like_cell(name: &str) -> bool {
    let split = name
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(name.len());
    let (letters, digits) = name.split_at(split);
    !letters.is_empty()
        && !digits.is_empty()
        && letters.chars().all(|c| c.is_ascii_alphabetic())
        && digits.chars().all(|c| c.is_ascii_digit())
        && letters_to_column(letters).is_some()
}

fn looks_like_r1c1(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix('R') else {
        return false;
    };
    let Some(c_pos) = rest.find('C') else {
        return false;
    };
    let (row, col) = (&rest[..c_pos], &rest[c_pos + 1..]);
    row.chars().all(|c| c.is_ascii_digit()) && col.chars().all(|c| c.is_ascii_digit())
}

impl NamedExpressions {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_address(&mut self) -> CellAddress {
        let row = self.free_rows.pop().unwrap_or_else(|| {
            self.next_row += 1;
            self.next_row - 1
        });
        CellAddress::new(NAMED_EXPRESSION_SHEET, row, 0)
    }

    /// No added expression with this name exists in `scope`.
    pub fn is_name_available(&self, name: &str, scope: NameScope) -> bool {
        !self
            .entries
            .get(&(key(name), scope))
            .is_some_and(|e| e.added)
    }

    /// Entry for `name` in exactly `scope`, placeholders included.
    pub fn get(&self, name: &str, scope: NameScope) -> Option<&NamedExpression> {
        self.entries.get(&(key(name), scope))
    }

    /// Added expression for `name` in exactly `scope`.
    pub fn named_expression_in_scope(&self, name: &str, scope: NameScope) -> Option<&NamedExpression> {
        self.get(name, scope).filter(|e| e.added)
    }

    /// Sheet-scoped expression when `sheet` defines one, otherwise the
    /// workbook-scoped one. Placeholders are returned as well.
    pub fn named_expression_for_scope(
        &self,
        name: &str,
        sheet: Option<SheetId>,
    ) -> Option<&NamedExpression> {
        sheet
            .and_then(|s| self.named_expression_in_scope(name, NameScope::Sheet(s)))
            .or_else(|| self.get(name, NameScope::Workbook))
    }

    /// Like [`Self::named_expression_for_scope`] but skips placeholders.
    pub fn nearest_named_expression(&self, name: &str, sheet: SheetId) -> Option<&NamedExpression> {
        self.named_expression_for_scope(name, Some(sheet))
            .filter(|e| e.added)
    }

    /// Register `name` in `scope`, reusing a placeholder when one exists.
    pub fn add(&mut self, name: &str, scope: NameScope) -> CellAddress {
        if let Some(entry) = self.entries.get_mut(&(key(name), scope)) {
            entry.added = true;
            entry.name = name.to_string();
            return entry.address;
        }
        self.insert(name, scope, true)
    }

    /// Workbook-scoped placeholder for an unknown name.
    pub fn placeholder(&mut self, name: &str) -> CellAddress {
        if let Some(entry) = self.get(name, NameScope::Workbook) {
            return entry.address;
        }
        self.insert(name, NameScope::Workbook, false)
    }

    fn insert(&mut self, name: &str, scope: NameScope, added: bool) -> CellAddress {
        let address = self.allocate_address();
        self.entries.insert(
            (key(name), scope),
            NamedExpression {
                name: name.to_string(),
                scope,
                address,
                added,
            },
        );
        self.by_address.insert(address, (key(name), scope));
        address
    }

    /// Turn an added expression back into a placeholder.
    pub fn demote(&mut self, name: &str, scope: NameScope) -> Option<CellAddress> {
        let entry = self.entries.get_mut(&(key(name), scope))?;
        entry.added = false;
        Some(entry.address)
    }

    /// Drop an entry entirely and free its address.
    pub fn forget(&mut self, name: &str, scope: NameScope) -> Option<NamedExpression> {
        let entry = self.entries.remove(&(key(name), scope))?;
        self.by_address.remove(&entry.address);
        self.free_rows.push(entry.address.row);
        Some(entry)
    }

    pub fn by_address(&self, address: &CellAddress) -> Option<&NamedExpression> {
        let k = self.by_address.get(address)?;
        self.entries.get(k)
    }

    /// Added expressions, optionally restricted to one scope, sorted by name.
    pub fn list(&self, scope: Option<NameScope>) -> Vec<&NamedExpression> {
        let mut out: Vec<&NamedExpression> = self
            .entries
            .values()
            .filter(|e| e.added && scope.is_none_or(|s| e.scope == s))
            .collect();
        out.sort_by(|a, b| (a.scope, a.name.to_lowercase()).cmp(&(b.scope, b.name.to_lowercase())));
        out
    }

    /// Every entry (placeholders too) scoped to `sheet`.
    pub fn in_sheet_scope(&self, sheet: SheetId) -> Vec<NamedExpression> {
        self.entries
            .values()
            .filter(|e| e.scope == NameScope::Sheet(sheet))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
