use crate::args::Arg;
use crate::coercion::to_text;
use crate::traits::{EvaluationContext, Function};
use calcgraph_common::LiteralValue;
use std::sync::Arc;

pub(crate) fn register() -> Vec<Arc<dyn Function>> {
    vec![
        Arc::new(ConcatenateFn),
        Arc::new(LenFn),
        Arc::new(UpperFn),
        Arc::new(LowerFn),
    ]
}

pub struct ConcatenateFn;

impl Function for ConcatenateFn {
    fn name(&self) -> &'static str {
        "CONCATENATE"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let mut out = String::new();
        for arg in args {
            match to_text(&arg.scalar(ctx)) {
                Ok(s) => out.push_str(&s),
                Err(e) => return LiteralValue::Error(e),
            }
        }
        LiteralValue::Text(out)
    }
}

fn map_text(args: &[Arg], ctx: &dyn EvaluationContext, f: impl Fn(String) -> LiteralValue) -> LiteralValue {
    match to_text(&args[0].scalar(ctx)) {
        Ok(s) => f(s),
        Err(e) => LiteralValue::Error(e),
    }
}

pub struct LenFn;

impl Function for LenFn {
    fn name(&self) -> &'static str {
        "LEN"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        map_text(args, ctx, |s| LiteralValue::Number(s.chars().count() as f64))
    }
}

pub struct UpperFn;

impl Function for UpperFn {
    fn name(&self) -> &'static str {
        "UPPER"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        map_text(args, ctx, |s| LiteralValue::Text(s.to_uppercase()))
    }
}

pub struct LowerFn;

impl Function for LowerFn {
    fn name(&self) -> &'static str {
        "LOWER"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        map_text(args, ctx, |s| LiteralValue::Text(s.to_lowercase()))
    }
}
