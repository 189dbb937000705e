use crate::traits::EvaluationContext;
use calcgraph_common::{ExcelError, LiteralValue, RangeAddress};

/// A function argument. Range references stay unresolved so that
/// aggregates can consult the range cache before reading cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(LiteralValue),
    Range(RangeAddress),
}

impl Arg {
    pub fn is_range(&self) -> bool {
        matches!(self, Arg::Range(_))
    }

    pub fn range(&self) -> Option<&RangeAddress> {
        match self {
            Arg::Range(r) => Some(r),
            Arg::Value(_) => None,
        }
    }

    /// Every value of the argument as rows.
    pub fn rows(&self, ctx: &dyn EvaluationContext) -> Vec<Vec<LiteralValue>> {
        match self {
            Arg::Value(LiteralValue::Array(rows)) => rows.clone(),
            Arg::Value(v) => vec![vec![v.clone()]],
            Arg::Range(r) => ctx.resolve_range(r),
        }
    }

    /// The argument reduced to one value; multi-cell ranges are `#VALUE!`.
    pub fn scalar(&self, ctx: &dyn EvaluationContext) -> LiteralValue {
        match self {
            Arg::Value(v) => v.coerce_to_single_value(),
            Arg::Range(r) if r.height() == Some(1) && r.width() == Some(1) => {
                ctx.resolve_cell(&r.start())
            }
            Arg::Range(_) => LiteralValue::Error(
                ExcelError::new_value().with_message("range used where a single value is expected"),
            ),
        }
    }
}
