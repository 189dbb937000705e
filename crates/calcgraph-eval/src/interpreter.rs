//! Tree-walking evaluation of a formula AST against an [`EvaluationContext`].

use crate::args::Arg;
use crate::builtins;
use crate::coercion::{compare_values, number_result, to_number, to_text};
use crate::reference::{ResolvedReference, resolve_reference};
use crate::traits::{EvaluationContext, FormulaEvaluator};
use calcgraph_common::{ExcelError, LiteralValue};
use calcgraph_parse::{ASTNode, ASTNodeType, ReferenceType};
use std::cmp::Ordering;

pub struct Interpreter<'a> {
    context: &'a dyn EvaluationContext,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a dyn EvaluationContext) -> Self {
        Self { context }
    }

    pub fn evaluate_ast(&self, node: &ASTNode) -> Result<LiteralValue, ExcelError> {
        match &node.node_type {
            ASTNodeType::Literal(v) => Ok(v.clone()),
            ASTNodeType::Reference { reference, .. } => self.eval_reference(reference),
            ASTNodeType::UnaryOp { op, expr } => self.eval_unary(op, expr),
            ASTNodeType::BinaryOp { op, left, right } => self.eval_binary(op, left, right),
            ASTNodeType::Function { name, args } => self.eval_function(name, args),
            ASTNodeType::Array(rows) => self.eval_array_literal(rows),
        }
    }

    fn resolve(&self, reference: &ReferenceType) -> Result<ResolvedReference, ExcelError> {
        resolve_reference(reference, self.context.host_sheet(), |name| {
            self.context.sheet_id(name)
        })
        .map_err(|sheet| ExcelError::new_ref().with_message(format!("unknown sheet '{sheet}'")))
    }

    fn eval_reference(&self, reference: &ReferenceType) -> Result<LiteralValue, ExcelError> {
        Ok(match self.resolve(reference)? {
            ResolvedReference::Cell(addr) => self.context.resolve_cell(&addr),
            ResolvedReference::Range(range) => {
                LiteralValue::Array(self.context.resolve_range(&range))
            }
            ResolvedReference::Named(name) => self.context.resolve_name(&name),
        })
    }

    fn eval_unary(&self, op: &str, expr: &ASTNode) -> Result<LiteralValue, ExcelError> {
        let v = self.evaluate_ast(expr)?;
        Ok(map_values(v, &|v| unary_scalar(op, v)))
    }

    fn eval_binary(
        &self,
        op: &str,
        left: &ASTNode,
        right: &ASTNode,
    ) -> Result<LiteralValue, ExcelError> {
        let l = self.evaluate_ast(left)?;
        let r = self.evaluate_ast(right)?;
        Ok(broadcast(&l, &r, &|a, b| binary_scalar(op, a, b)))
    }

    fn eval_function(&self, name: &str, args: &[ASTNode]) -> Result<LiteralValue, ExcelError> {
        let function = builtins::get(name)
            .ok_or_else(|| ExcelError::new_name().with_message(format!("unknown function {name}")))?;
        if args.len() < function.min_args()
            || function.max_args().is_some_and(|max| args.len() > max)
        {
            return Err(ExcelError::new_na()
                .with_message(format!("wrong number of arguments to {}", function.name())));
        }
        let args: Vec<Arg> = args.iter().map(|a| self.evaluate_arg(a)).collect();
        Ok(function.eval(&args, self.context))
    }

    /// Range references stay as addresses; everything else is evaluated.
    fn evaluate_arg(&self, node: &ASTNode) -> Arg {
        if let ASTNodeType::Reference { reference, .. } = &node.node_type {
            match self.resolve(reference) {
                Ok(ResolvedReference::Range(range)) => return Arg::Range(range),
                Err(e) => return Arg::Value(LiteralValue::Error(e)),
                Ok(_) => {}
            }
        }
        Arg::Value(self.evaluate_ast(node).unwrap_or_else(LiteralValue::Error))
    }

    fn eval_array_literal(&self, rows: &[Vec<ASTNode>]) -> Result<LiteralValue, ExcelError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(row.len());
            for item in row {
                values.push(self.evaluate_ast(item)?.coerce_to_single_value());
            }
            out.push(values);
        }
        Ok(LiteralValue::Array(out))
    }

    /// Static (rows, cols) of the value `node` produces.
    pub fn shape_of(&self, node: &ASTNode) -> (u32, u32) {
        match &node.node_type {
            ASTNodeType::Literal(v) => v.dimensions(),
            ASTNodeType::Reference { reference, .. } => match self.resolve(reference) {
                Ok(ResolvedReference::Range(range)) => match (range.height(), range.width()) {
                    (Some(h), Some(w)) => (h, w),
                    _ => LiteralValue::Array(self.context.resolve_range(&range)).dimensions(),
                },
                Ok(ResolvedReference::Named(name)) => self.context.resolve_name(&name).dimensions(),
                _ => (1, 1),
            },
            ASTNodeType::UnaryOp { expr, .. } => self.shape_of(expr),
            ASTNodeType::BinaryOp { left, right, .. } => {
                let (lr, lc) = self.shape_of(left);
                let (rr, rc) = self.shape_of(right);
                (lr.max(rr), lc.max(rc))
            }
            ASTNodeType::Function { name, args } => {
                let shapes: Vec<(u32, u32)> = args.iter().map(|a| self.shape_of(a)).collect();
                builtins::get(name)
                    .and_then(|f| f.result_shape(&shapes))
                    .unwrap_or((1, 1))
            }
            ASTNodeType::Array(rows) => (
                rows.len() as u32,
                rows.first().map_or(0, |r| r.len() as u32),
            ),
        }
    }
}

fn unary_scalar(op: &str, v: &LiteralValue) -> LiteralValue {
    if v.is_error() {
        return v.clone();
    }
    match op {
        "+" => v.clone(),
        "-" => match to_number(v) {
            Ok(n) => number_result(-n),
            Err(e) => LiteralValue::Error(e),
        },
        "%" => match to_number(v) {
            Ok(n) => number_result(n / 100.0),
            Err(e) => LiteralValue::Error(e),
        },
        _ => LiteralValue::Error(ExcelError::new_name().with_message(format!("unary operator {op}"))),
    }
}

fn numeric(l: &LiteralValue, r: &LiteralValue, f: impl Fn(f64, f64) -> LiteralValue) -> LiteralValue {
    match (to_number(l), to_number(r)) {
        (Ok(a), Ok(b)) => f(a, b),
        (Err(e), _) | (_, Err(e)) => LiteralValue::Error(e),
    }
}

fn binary_scalar(op: &str, l: &LiteralValue, r: &LiteralValue) -> LiteralValue {
    if l.is_error() {
        return l.clone();
    }
    if r.is_error() {
        return r.clone();
    }
    match op {
        "+" => numeric(l, r, |a, b| number_result(a + b)),
        "-" => numeric(l, r, |a, b| number_result(a - b)),
        "*" => numeric(l, r, |a, b| number_result(a * b)),
        "/" => numeric(l, r, |a, b| {
            if b == 0.0 {
                LiteralValue::Error(ExcelError::new_div())
            } else {
                number_result(a / b)
            }
        }),
        "^" => numeric(l, r, |a, b| {
            if a == 0.0 && b < 0.0 {
                LiteralValue::Error(ExcelError::new_div())
            } else {
                number_result(a.powf(b))
            }
        }),
        "&" => match (to_text(l), to_text(r)) {
            (Ok(a), Ok(b)) => LiteralValue::Text(a + &b),
            (Err(e), _) | (_, Err(e)) => LiteralValue::Error(e),
        },
        "=" | "<>" | "<" | "<=" | ">" | ">=" => {
            let ord = compare_values(l, r);
            LiteralValue::Boolean(match op {
                "=" => ord == Ordering::Equal,
                "<>" => ord != Ordering::Equal,
                "<" => ord == Ordering::Less,
                "<=" => ord != Ordering::Greater,
                ">" => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
        _ => LiteralValue::Error(ExcelError::new_name().with_message(format!("operator {op}"))),
    }
}

pub(crate) fn map_values(v: LiteralValue, f: &dyn Fn(&LiteralValue) -> LiteralValue) -> LiteralValue {
    match v {
        LiteralValue::Array(rows) => LiteralValue::Array(
            rows.iter()
                .map(|row| row.iter().map(f).collect())
                .collect(),
        ),
        other => f(&other),
    }
}

/// Element-wise `f` with single rows and columns stretched to the other
/// operand. Positions outside both operands are `#N/A`.
pub(crate) fn broadcast(
    l: &LiteralValue,
    r: &LiteralValue,
    f: &dyn Fn(&LiteralValue, &LiteralValue) -> LiteralValue,
) -> LiteralValue {
    if !matches!(l, LiteralValue::Array(_)) && !matches!(r, LiteralValue::Array(_)) {
        return f(l, r);
    }
    let ldims = l.dimensions();
    let rdims = r.dimensions();
    let rows = ldims.0.max(rdims.0);
    let cols = ldims.1.max(rdims.1);
    let pick = |v: &LiteralValue, dims: (u32, u32), i: u32, j: u32| match v {
        LiteralValue::Array(a) => {
            let ii = (if dims.0 == 1 { 0 } else { i }) as usize;
            let jj = (if dims.1 == 1 { 0 } else { j }) as usize;
            a.get(ii)
                .and_then(|row| row.get(jj))
                .cloned()
                .unwrap_or_else(|| LiteralValue::Error(ExcelError::new_na()))
        }
        other => other.clone(),
    };
    LiteralValue::Array(
        (0..rows)
            .map(|i| {
                (0..cols)
                    .map(|j| f(&pick(l, ldims, i, j), &pick(r, rdims, i, j)))
                    .collect()
            })
            .collect(),
    )
}

/// The interpreter packaged as the engine's default [`FormulaEvaluator`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEvaluator;

impl FormulaEvaluator for StandardEvaluator {
    fn evaluate(&self, ast: &ASTNode, ctx: &dyn EvaluationContext) -> LiteralValue {
        Interpreter::new(ctx)
            .evaluate_ast(ast)
            .unwrap_or_else(LiteralValue::Error)
    }

    fn array_shape(&self, ast: &ASTNode, ctx: &dyn EvaluationContext) -> (u32, u32) {
        Interpreter::new(ctx).shape_of(ast)
    }
}
