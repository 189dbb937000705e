use crate::args::Arg;
use crate::coercion::{Criterion, number_result, to_number};
use crate::traits::{EvaluationContext, Function};
use calcgraph_common::{ExcelError, LiteralValue, RangeAddress};
use std::sync::Arc;

pub(crate) fn register() -> Vec<Arc<dyn Function>> {
    vec![
        Arc::new(SumFn),
        Arc::new(AverageFn),
        Arc::new(MinFn),
        Arc::new(MaxFn),
        Arc::new(CountFn),
        Arc::new(CountaFn),
        Arc::new(ProductFn),
        Arc::new(AbsFn),
        Arc::new(RoundFn),
        Arc::new(SqrtFn),
        Arc::new(ModFn),
        Arc::new(PowerFn),
        Arc::new(SumIfFn),
        Arc::new(CountIfFn),
    ]
}

fn to_value(result: Result<f64, ExcelError>) -> LiteralValue {
    match result {
        Ok(n) => number_result(n),
        Err(e) => LiteralValue::Error(e),
    }
}

/// Numbers contributed by one argument. Inside ranges and arrays only
/// numeric cells count; a direct value is coerced.
fn collect_numbers(
    arg: &Arg,
    ctx: &dyn EvaluationContext,
    out: &mut Vec<f64>,
) -> Result<(), ExcelError> {
    match arg {
        Arg::Range(_) | Arg::Value(LiteralValue::Array(_)) => {
            for v in arg.rows(ctx).iter().flatten() {
                match v {
                    LiteralValue::Number(n) => out.push(*n),
                    LiteralValue::Error(e) => return Err(e.clone()),
                    _ => {}
                }
            }
        }
        Arg::Value(v) => out.push(to_number(v)?),
    }
    Ok(())
}

fn numbers(args: &[Arg], ctx: &dyn EvaluationContext) -> Result<Vec<f64>, ExcelError> {
    let mut out = Vec::new();
    for arg in args {
        collect_numbers(arg, ctx, &mut out)?;
    }
    Ok(out)
}

fn sum_rows(rows: &[Vec<LiteralValue>]) -> Result<f64, ExcelError> {
    let mut total = 0.0;
    for v in rows.iter().flatten() {
        match v {
            LiteralValue::Number(n) => total += n,
            LiteralValue::Error(e) => return Err(e.clone()),
            _ => {}
        }
    }
    Ok(total)
}

/// A row-additive aggregate over `range`, stored in the range cache
/// under `key`. When a range one row shorter is known, its aggregate
/// is reused and only the last row is read.
pub(crate) fn cached_range_fold(
    range: &RangeAddress,
    key: &str,
    ctx: &dyn EvaluationContext,
    fold: &dyn Fn(&[Vec<LiteralValue>]) -> Result<f64, ExcelError>,
) -> LiteralValue {
    if let Some(v) = ctx.cached_aggregate(range, key) {
        return v;
    }
    let result = match ctx.smaller_range(range) {
        Some(smaller) if range.is_finite() && smaller.end_row < range.end_row => {
            match cached_range_fold(&smaller, key, ctx, fold) {
                LiteralValue::Number(partial) => {
                    let tail = RangeAddress::new(
                        range.sheet,
                        smaller.end_row + 1,
                        range.start_col,
                        range.end_row,
                        range.end_col,
                    );
                    fold(&ctx.resolve_range(&tail)).map(|t| partial + t)
                }
                LiteralValue::Error(e) => Err(e),
                _ => fold(&ctx.resolve_range(range)),
            }
        }
        _ => fold(&ctx.resolve_range(range)),
    };
    let value = to_value(result);
    ctx.store_aggregate(range, key, value.clone());
    value
}

pub struct SumFn;

impl Function for SumFn {
    fn name(&self) -> &'static str {
        "SUM"
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let mut total = 0.0;
        for arg in args {
            let part = match arg {
                Arg::Range(range) => cached_range_fold(range, "SUM", ctx, &sum_rows),
                other => {
                    let mut nums = Vec::new();
                    to_value(collect_numbers(other, ctx, &mut nums).map(|_| nums.iter().sum()))
                }
            };
            match part {
                LiteralValue::Number(n) => total += n,
                err => return err,
            }
        }
        number_result(total)
    }
}

pub struct AverageFn;

impl Function for AverageFn {
    fn name(&self) -> &'static str {
        "AVERAGE"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        match numbers(args, ctx) {
            Ok(nums) if nums.is_empty() => LiteralValue::Error(ExcelError::new_div()),
            Ok(nums) => number_result(nums.iter().sum::<f64>() / nums.len() as f64),
            Err(e) => LiteralValue::Error(e),
        }
    }
}

pub struct MinFn;

impl Function for MinFn {
    fn name(&self) -> &'static str {
        "MIN"
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        to_value(numbers(args, ctx).map(|n| n.into_iter().reduce(f64::min).unwrap_or(0.0)))
    }
}

pub struct MaxFn;

impl Function for MaxFn {
    fn name(&self) -> &'static str {
        "MAX"
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        to_value(numbers(args, ctx).map(|n| n.into_iter().reduce(f64::max).unwrap_or(0.0)))
    }
}

pub struct CountFn;

impl Function for CountFn {
    fn name(&self) -> &'static str {
        "COUNT"
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let count = args
            .iter()
            .map(|arg| match arg {
                Arg::Value(v) if !matches!(v, LiteralValue::Array(_)) => {
                    usize::from(to_number(v).is_ok() && !v.is_empty())
                }
                _ => arg
                    .rows(ctx)
                    .iter()
                    .flatten()
                    .filter(|v| matches!(v, LiteralValue::Number(_)))
                    .count(),
            })
            .sum::<usize>();
        LiteralValue::Number(count as f64)
    }
}

pub struct CountaFn;

impl Function for CountaFn {
    fn name(&self) -> &'static str {
        "COUNTA"
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let count: usize = args
            .iter()
            .map(|arg| arg.rows(ctx).iter().flatten().filter(|v| !v.is_empty()).count())
            .sum();
        LiteralValue::Number(count as f64)
    }
}

pub struct ProductFn;

impl Function for ProductFn {
    fn name(&self) -> &'static str {
        "PRODUCT"
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        to_value(numbers(args, ctx).map(|n| {
            if n.is_empty() {
                0.0
            } else {
                n.into_iter().product()
            }
        }))
    }
}

fn unary_number(args: &[Arg], ctx: &dyn EvaluationContext, f: impl Fn(f64) -> LiteralValue) -> LiteralValue {
    match to_number(&args[0].scalar(ctx)) {
        Ok(n) => f(n),
        Err(e) => LiteralValue::Error(e),
    }
}

pub struct AbsFn;

impl Function for AbsFn {
    fn name(&self) -> &'static str {
        "ABS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        unary_number(args, ctx, |n| LiteralValue::Number(n.abs()))
    }
}

pub struct SqrtFn;

impl Function for SqrtFn {
    fn name(&self) -> &'static str {
        "SQRT"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        unary_number(args, ctx, |n| {
            if n < 0.0 {
                LiteralValue::Error(ExcelError::new_num())
            } else {
                LiteralValue::Number(n.sqrt())
            }
        })
    }
}

pub struct RoundFn;

impl Function for RoundFn {
    fn name(&self) -> &'static str {
        "ROUND"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let digits = match args.get(1).map(|a| to_number(&a.scalar(ctx))) {
            Some(Ok(d)) => d.trunc() as i32,
            Some(Err(e)) => return LiteralValue::Error(e),
            None => 0,
        };
        unary_number(args, ctx, |n| {
            let factor = 10f64.powi(digits);
            // Half away from zero, with a nudge for binary representation error.
            let scaled = n * factor;
            let rounded = (scaled.abs() + 0.5 + 1e-9).floor().copysign(scaled);
            number_result(rounded / factor)
        })
    }
}

pub struct ModFn;

impl Function for ModFn {
    fn name(&self) -> &'static str {
        "MOD"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        match (to_number(&args[0].scalar(ctx)), to_number(&args[1].scalar(ctx))) {
            (Ok(_), Ok(d)) if d == 0.0 => LiteralValue::Error(ExcelError::new_div()),
            (Ok(n), Ok(d)) => number_result(n - d * (n / d).floor()),
            (Err(e), _) | (_, Err(e)) => LiteralValue::Error(e),
        }
    }
}

pub struct PowerFn;

impl Function for PowerFn {
    fn name(&self) -> &'static str {
        "POWER"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        match (to_number(&args[0].scalar(ctx)), to_number(&args[1].scalar(ctx))) {
            (Ok(b), Ok(e)) if b == 0.0 && e < 0.0 => LiteralValue::Error(ExcelError::new_div()),
            (Ok(b), Ok(e)) => number_result(b.powf(e)),
            (Err(e), _) | (_, Err(e)) => LiteralValue::Error(e),
        }
    }
}

pub struct SumIfFn;

impl Function for SumIfFn {
    fn name(&self) -> &'static str {
        "SUMIF"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let criterion_value = args[1].scalar(ctx);
        if criterion_value.is_error() {
            return criterion_value;
        }
        let criterion = Criterion::parse(&criterion_value);
        let fold = |rows: &[Vec<LiteralValue>]| -> Result<f64, ExcelError> {
            Ok(rows
                .iter()
                .flatten()
                .filter(|v| criterion.matches(v))
                .filter_map(|v| match v {
                    LiteralValue::Number(n) => Some(*n),
                    _ => None,
                })
                .sum())
        };
        match (&args[0], args.get(2)) {
            (Arg::Range(range), None) => {
                let key = format!("SUMIF|{}", criterion.cache_key());
                cached_range_fold(range, &key, ctx, &fold)
            }
            (test, Some(sum)) => {
                let test_rows = test.rows(ctx);
                let sum_rows = sum.rows(ctx);
                let mut total = 0.0;
                for (i, row) in test_rows.iter().enumerate() {
                    for (j, v) in row.iter().enumerate() {
                        if !criterion.matches(v) {
                            continue;
                        }
                        match sum_rows.get(i).and_then(|r| r.get(j)) {
                            Some(LiteralValue::Number(n)) => total += n,
                            Some(LiteralValue::Error(e)) => return LiteralValue::Error(e.clone()),
                            _ => {}
                        }
                    }
                }
                number_result(total)
            }
            (values, None) => to_value(fold(&values.rows(ctx))),
        }
    }
}

pub struct CountIfFn;

impl Function for CountIfFn {
    fn name(&self) -> &'static str {
        "COUNTIF"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(&self, args: &[Arg], ctx: &dyn EvaluationContext) -> LiteralValue {
        let criterion_value = args[1].scalar(ctx);
        if criterion_value.is_error() {
            return criterion_value;
        }
        let criterion = Criterion::parse(&criterion_value);
        let fold = |rows: &[Vec<LiteralValue>]| -> Result<f64, ExcelError> {
            Ok(rows.iter().flatten().filter(|v| criterion.matches(v)).count() as f64)
        };
        match &args[0] {
            Arg::Range(range) => {
                let key = format!("COUNTIF|{}", criterion.cache_key());
                cached_range_fold(range, &key, ctx, &fold)
            }
            values => to_value(fold(&values.rows(ctx))),
        }
    }
}
