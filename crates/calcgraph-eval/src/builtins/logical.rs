use crate::args::Arg;
use crate::coercion::to_logical;
use crate::traits::{EvaluationContext, Function};
use calcgraph_common::{ExcelError, LiteralValue};
use std::sync::Arc;

pub(crate) fn register() -> Vec<Arc<dyn Function>> {
    vec![
        Arc::new(IfFn),
        Arc::new(AndFn),
        Arc::new(OrFn),
        Arc::new(NotFn),
        Arc::new(IfErrorFn),
        Arc::new(IsErrorFn),
        Arc::new(IsBlankFn),
        Arc::new(IsNumberFn),
        Arc::new(TrueFn),
        Arc::new(FalseFn),
        Arc::new(NaFn),
    ]
}

pub struct IfFn;

impl Function for IfFn {
    fn name(&self) -> &'static str {
        "IF"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let branch = match to_logical(&args[0].scalar(ctx)) {
            Ok(true) => &args[1],
            Ok(false) => match args.get(2) {
                Some(arg) => arg,
                None => return LiteralValue::Boolean(false),
            },
            Err(e) => return LiteralValue::Error(e),
        };
        match branch {
            Arg::Value(v) => v.clone(),
            Arg::Range(r) => LiteralValue::Array(ctx.resolve_range(r)),
        }
    }
}

/// Logical values of every argument; text and empty cells inside ranges
/// are skipped.
fn logicals(args: &[Arg], ctx: &dyn EvaluationContext) -> Result<Vec<bool>, ExcelError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Arg::Value(v) if !matches!(v, LiteralValue::Array(_)) => out.push(to_logical(v)?),
            _ => {
                for v in arg.rows(ctx).iter().flatten() {
                    match v {
                        LiteralValue::Boolean(b) => out.push(*b),
                        LiteralValue::Number(n) => out.push(*n != 0.0),
                        LiteralValue::Error(e) => return Err(e.clone()),
                        _ => {}
                    }
                }
            }
        }
    }
    if out.is_empty() {
        return Err(ExcelError::new_value().with_message("no logical values"));
    }
    Ok(out)
}

pub struct AndFn;

impl Function for AndFn {
    fn name(&self) -> &'static str {
        "AND"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        match logicals(args, ctx) {
            Ok(v) => LiteralValue::Boolean(v.into_iter().all(|b| b)),
            Err(e) => LiteralValue::Error(e),
        }
    }
}

pub struct OrFn;

impl Function for OrFn {
    fn name(&self) -> &'static str {
        "OR"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        match logicals(args, ctx) {
            Ok(v) => LiteralValue::Boolean(v.into_iter().any(|b| b)),
            Err(e) => LiteralValue::Error(e),
        }
    }
}

pub struct NotFn;

impl Function for NotFn {
    fn name(&self) -> &'static str {
        "NOT"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        match to_logical(&args[0].scalar(ctx)) {
            Ok(b) => LiteralValue::Boolean(!b),
            Err(e) => LiteralValue::Error(e),
        }
    }
}

pub struct IfErrorFn;

impl Function for IfErrorFn {
    fn name(&self) -> &'static str {
        "IFERROR"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let value = args[0].scalar(ctx);
        if value.is_error() {
            args[1].scalar(ctx)
        } else {
            value
        }
    }
}

pub struct IsErrorFn;

impl Function for IsErrorFn {
    fn name(&self) -> &'static str {
        "ISERROR"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        LiteralValue::Boolean(args[0].scalar(ctx).is_error())
    }
}

pub struct IsBlankFn;

impl Function for IsBlankFn {
    fn name(&self) -> &'static str {
        "ISBLANK"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        LiteralValue::Boolean(args[0].scalar(ctx).is_empty())
    }
}

pub struct IsNumberFn;

impl Function for IsNumberFn {
    fn name(&self) -> &'static str {
        "ISNUMBER"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        LiteralValue::Boolean(matches!(args[0].scalar(ctx), LiteralValue::Number(_)))
    }
}

pub struct TrueFn;

impl Function for TrueFn {
    fn name(&self) -> &'static str {
        "TRUE"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(&self, _args: &[Arg], _ctx: &dyn EvaluationContext) -> LiteralValue {
        LiteralValue::Boolean(true)
    }
}

pub struct FalseFn;

impl Function for FalseFn {
    fn name(&self) -> &'static str {
        "FALSE"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(&self, _args: &[Arg], _ctx: &dyn EvaluationContext) -> LiteralValue {
        LiteralValue::Boolean(false)
    }
}

pub struct NaFn;

impl Function for NaFn {
    fn name(&self) -> &'static str {
        "NA"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(&self, _args: &[Arg], _ctx: &dyn EvaluationContext) -> LiteralValue {
        LiteralValue::Error(ExcelError::new_na())
    }
}
