//! Undoable edits to the dependency graph.
//!
//! [`VertexEditor`] performs every content and structural change and
//! describes it as an [`UndoEntry`]; [`UndoEngine`] keeps those entries
//! on the undo and redo stacks.

pub mod change_log;
pub mod reference_adjuster;
pub mod undo_engine;
pub mod vertex_editor;

pub use change_log::{ContentChange, FormulaRestore, FormulaTarget, TransformRecord, UndoEntry};
pub use reference_adjuster::{ReferenceAdjuster, Relocation, StructuralTransform};
pub use undo_engine::UndoEngine;
pub use vertex_editor::{EditorError, SheetLimits, VertexEditor};
