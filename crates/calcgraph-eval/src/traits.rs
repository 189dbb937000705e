//! Seams between the interpreter and whatever owns the cell values.

use crate::args::Arg;
use calcgraph_common::{CellAddress, LiteralValue, RangeAddress, SheetId};
use calcgraph_parse::ASTNode;

/// Read access to the workbook while a single formula is evaluated.
///
/// The engine implements this over its dependency graph; tests can
/// implement it over a plain map.
pub trait EvaluationContext {
    fn resolve_cell(&self, address: &CellAddress) -> LiteralValue;

    /// Values of a range in row-major order. Open ranges (`A:A`, `3:3`)
    /// are clipped to the used extent of their sheet.
    fn resolve_range(&self, range: &RangeAddress) -> Vec<Vec<LiteralValue>>;

    /// Current value of a named expression as seen from the formula
    /// being evaluated, or `#NAME?` when no such name is defined.
    fn resolve_name(&self, name: &str) -> LiteralValue;

    fn sheet_id(&self, name: &str) -> Option<SheetId>;

    /// Sheet that unqualified references resolve against.
    fn host_sheet(&self) -> SheetId;

    fn current_cell(&self) -> CellAddress;

    /// Previously stored aggregate for `range` under `key`.
    fn cached_aggregate(&self, _range: &RangeAddress, _key: &str) -> Option<LiteralValue> {
        None
    }

    fn store_aggregate(&self, _range: &RangeAddress, _key: &str, _value: LiteralValue) {}

    /// A known range one row shorter than `range`, sharing its top-left
    /// corner, whose aggregates can be reused.
    fn smaller_range(&self, _range: &RangeAddress) -> Option<RangeAddress> {
        None
    }
}

/// Excel-style callable. Object safe so the registry can hold
/// `Arc<dyn Function>`.
pub trait Function: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn min_args(&self) -> usize {
        0
    }

    fn max_args(&self) -> Option<usize> {
        None
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue;

    /// Shape of the result given the shapes of the arguments. Scalar
    /// functions return `None`.
    fn result_shape(&self, _arg_shapes: &[(u32, u32)]) -> Option<(u32, u32)> {
        None
    }
}

/// Pluggable formula evaluation used by the engine.
pub trait FormulaEvaluator {
    fn evaluate(&self, ast: &ASTNode, ctx: &dyn EvaluationContext) -> LiteralValue;

    /// Static (rows, cols) of the value `ast` produces. Used to size
    /// array formulas before any value is known.
    fn array_shape(&self, ast: &ASTNode, ctx: &dyn EvaluationContext) -> (u32, u32);
}
