//! Functions whose result is an array.

use crate::args::Arg;
use crate::coercion::to_number;
use crate::traits::{EvaluationContext, Function};
use calcgraph_common::{ExcelError, LiteralValue};
use std::sync::Arc;

pub(crate) fn register() -> Vec<Arc<dyn Function>> {
    vec![Arc::new(TransposeFn), Arc::new(MmultFn)]
}

pub struct TransposeFn;

impl Function for TransposeFn {
    fn name(&self) -> &'static str {
        "TRANSPOSE"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let rows = args[0].rows(ctx);
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        LiteralValue::Array(
            (0..width)
                .map(|j| {
                    rows.iter()
                        .map(|row| row.get(j).cloned().unwrap_or(LiteralValue::Empty))
                        .collect()
                })
                .collect(),
        )
    }

    fn result_shape(&self, arg_shapes: &[(u32, u32)]) -> Option<(u32, u32)> {
        arg_shapes.first().map(|&(r, c)| (c, r))
    }
}

pub struct MmultFn;

fn numeric_matrix(rows: Vec<Vec<LiteralValue>>) -> Result<Vec<Vec<f64>>, ExcelError> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|v| match v {
                    LiteralValue::Number(_) => to_number(v),
                    LiteralValue::Error(e) => Err(e.clone()),
                    _ => Err(ExcelError::new_value().with_message("MMULT needs numbers")),
                })
                .collect()
        })
        .collect()
}

impl Function for MmultFn {
    fn name(&self) -> &'static str {
        "MMULT"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let (a, b) = match (numeric_matrix(args[0].rows(ctx)), numeric_matrix(args[1].rows(ctx))) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => return LiteralValue::Error(e),
        };
        let inner = a.first().map_or(0, |r| r.len());
        if inner == 0 || inner != b.len() {
            return LiteralValue::Error(
                ExcelError::new_value().with_message("MMULT dimensions do not agree"),
            );
        }
        let cols = b[0].len();
        LiteralValue::Array(
            a.iter()
                .map(|row| {
                    (0..cols)
                        .map(|j| {
                            LiteralValue::Number((0..inner).map(|k| row[k] * b[k][j]).sum())
                        })
                        .collect()
                })
                .collect(),
        )
    }

    fn result_shape(&self, arg_shapes: &[(u32, u32)]) -> Option<(u32, u32)> {
        match arg_shapes {
            [(rows, _), (_, cols)] => Some((*rows, *cols)),
            _ => None,
        }
    }
}
