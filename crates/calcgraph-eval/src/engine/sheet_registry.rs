use calcgraph_common::SheetId;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetEntry {
    id: SheetId,
    name: String,
}

/// Sheet names and ids in workbook order. Names are matched
/// case-insensitively; ids are never reused.
#[derive(Default, Debug)]
pub struct SheetRegistry {
    sheets: Vec<SheetEntry>,
    id_by_name: FxHashMap<String, SheetId>,
    next_id: SheetId,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl SheetRegistry {
    pub fn new() -> Self {
        SheetRegistry::default()
    }

    /// Append a sheet. Returns `None` when the name is taken.
    pub fn add(&mut self, name: &str) -> Option<SheetId> {
        let id = self.next_id;
        self.insert_at(name, id, self.sheets.len())?;
        Some(id)
    }

    /// Re-create a sheet with a known id at a given position.
    pub fn insert_at(&mut self, name: &str, id: SheetId, position: usize) -> Option<()> {
        if self.id_by_name.contains_key(&key(name)) || self.contains(id) {
            return None;
        }
        let position = position.min(self.sheets.len());
        self.sheets.insert(
            position,
            SheetEntry {
                id,
                name: name.to_string(),
            },
        );
        self.id_by_name.insert(key(name), id);
        self.next_id = self.next_id.max(id + 1);
        Some(())
    }

    /// Remove a sheet, returning its position and name.
    pub fn remove(&mut self, id: SheetId) -> Option<(usize, String)> {
        let position = self.sheets.iter().position(|s| s.id == id)?;
        let entry = self.sheets.remove(position);
        self.id_by_name.remove(&key(&entry.name));
        Some((position, entry.name))
    }

    /// Returns false when `new_name` belongs to another sheet.
    pub fn rename(&mut self, id: SheetId, new_name: &str) -> bool {
        if let Some(&owner) = self.id_by_name.get(&key(new_name)) {
            if owner != id {
                return false;
            }
        }
        let Some(entry) = self.sheets.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        self.id_by_name.remove(&key(&entry.name));
        entry.name = new_name.to_string();
        self.id_by_name.insert(key(new_name), id);
        true
    }

    pub fn id_for(&self, name: &str) -> Option<SheetId> {
        self.id_by_name.get(&key(name)).copied()
    }

    pub fn name(&self, id: SheetId) -> Option<&str> {
        self.sheets
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
    }

    pub fn position(&self, id: SheetId) -> Option<usize> {
        self.sheets.iter().position(|s| s.id == id)
    }

    pub fn contains(&self, id: SheetId) -> bool {
        self.sheets.iter().any(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<SheetId> {
        self.sheets.iter().map(|s| s.id).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}
