//! Calcgraph dependency graph engine
//!
//! Keeps a workbook as a graph of cell, range, array and named-expression
//! vertices and recalculates incrementally after every edit. Structural
//! edits rewrite references; every edit can be undone.

pub mod address_mapping;
pub mod array_mapping;
pub mod changes;
pub mod clipboard;
pub mod content;
pub mod digraph;
pub mod eval;
pub mod events;
pub mod graph;
pub mod named_range;
pub mod range_mapping;
pub mod scheduler;
pub mod sheet_registry;
pub mod vertex;

#[cfg(test)]
mod tests;

pub use address_mapping::AddressStoragePolicy;
pub use changes::{CellValueChange, ChangeAddress, ChangeList};
pub use clipboard::{Clipboard, ClipboardOperation};
pub use content::{ParsedContent, RawCellContent, parse_content};
pub use eval::{CellType, Engine};
pub use events::{EngineEvent, ListenerId};
pub use graph::editor::{EditorError, SheetLimits, UndoEntry, UndoEngine};
pub use graph::snapshot::CellSnapshot;
pub use graph::DependencyGraph;
pub use named_range::{NameScope, NamedExpression};
pub use scheduler::{Schedule, ScheduleStep, Scheduler};
pub use vertex::{Vertex, VertexFlags, VertexId, VertexKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the evaluation engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct EvalConfig {
    /// Relax cycles instead of reporting `#CYCLE!`.
    pub allow_circular_references: bool,
    /// Passes over a cycle when circular references are allowed.
    pub circular_iterations: u32,
    /// Seed value for cycle members that have never been relaxed.
    pub circular_initial_value: f64,
    pub address_storage: AddressStoragePolicy,
    /// Depth of the undo stack. Zero disables undo.
    pub undo_limit: usize,
    /// Formulas that evaluate to an empty value report `0` instead.
    pub evaluate_null_to_zero: bool,
    pub max_rows: u32,
    pub max_columns: u32,
    /// `chrono` formats tried, in order, when typed text might be a date.
    pub date_formats: Vec<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        let limits = SheetLimits::default();
        Self {
            allow_circular_references: false,
            circular_iterations: 100,
            circular_initial_value: 0.0,
            address_storage: AddressStoragePolicy::default(),
            undo_limit: 20,
            evaluate_null_to_zero: false,
            max_rows: limits.max_rows,
            max_columns: limits.max_columns,
            date_formats: vec!["%d/%m/%Y".to_string(), "%d/%m/%y".to_string()],
        }
    }
}

impl EvalConfig {
    pub fn limits(&self) -> SheetLimits {
        SheetLimits {
            max_rows: self.max_rows,
            max_columns: self.max_columns,
        }
    }

    pub fn validate(&self) -> Result<(), EditorError> {
        if self.max_rows == 0 || self.max_columns == 0 {
            return Err(EditorError::InvalidArguments(
                "sheet limits must be positive".into(),
            ));
        }
        if let AddressStoragePolicy::Threshold(t) = self.address_storage {
            if !(0.0..=1.0).contains(&t) {
                return Err(EditorError::InvalidArguments(format!(
                    "address storage threshold {t} is outside 0..=1"
                )));
            }
        }
        if !self.circular_initial_value.is_finite() {
            return Err(EditorError::InvalidArguments(
                "initial value for cycles must be finite".into(),
            ));
        }
        Ok(())
    }
}
