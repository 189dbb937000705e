//! Canonical formula text for an AST.
//!
//! This is the inverse of [`crate::parse`] up to whitespace, redundant
//! parentheses and the casing of references: `parse(canonical_formula(a))`
//! yields a tree equal to `a`.

use crate::parser::{ASTNode, ASTNodeType};
use calcgraph_common::LiteralValue;

const UNARY_PRECEDENCE: u8 = 7;
const POSTFIX_PRECEDENCE: u8 = 6;
const ATOM_PRECEDENCE: u8 = 10;

fn binary_precedence(op: &str) -> u8 {
    match op {
        "^" => 5,
        "*" | "/" => 4,
        "+" | "-" => 3,
        "&" => 2,
        _ => 1,
    }
}

fn node_precedence(node: &ASTNode) -> u8 {
    match &node.node_type {
        ASTNodeType::BinaryOp { op, .. } => binary_precedence(op),
        ASTNodeType::UnaryOp { op, .. } if op == "%" => POSTFIX_PRECEDENCE,
        ASTNodeType::UnaryOp { .. } => UNARY_PRECEDENCE,
        _ => ATOM_PRECEDENCE,
    }
}

/// Formula text with a leading `=`.
pub fn canonical_formula(ast: &ASTNode) -> String {
    let mut out = String::from("=");
    write_node(ast, &mut out);
    out
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn write_literal(value: &LiteralValue, out: &mut String) {
    match value {
        LiteralValue::Number(n) => out.push_str(&format_number(*n)),
        LiteralValue::Text(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        }
        LiteralValue::Boolean(true) => out.push_str("TRUE"),
        LiteralValue::Boolean(false) => out.push_str("FALSE"),
        LiteralValue::Error(e) => out.push_str(e.kind.code()),
        LiteralValue::Empty => {}
        LiteralValue::Array(rows) => {
            out.push('{');
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                for (j, item) in row.iter().enumerate() {
                    if j > 0 {
                        out.push(',');
                    }
                    write_literal(item, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_child(child: &ASTNode, needs_parens: bool, out: &mut String) {
    if needs_parens {
        out.push('(');
        write_node(child, out);
        out.push(')');
    } else {
        write_node(child, out);
    }
}

fn write_node(node: &ASTNode, out: &mut String) {
    match &node.node_type {
        ASTNodeType::Literal(value) => write_literal(value, out),
        ASTNodeType::Reference { reference, .. } => out.push_str(&reference.to_string()),
        ASTNodeType::UnaryOp { op, expr } if op == "%" => {
            write_child(expr, node_precedence(expr) < POSTFIX_PRECEDENCE, out);
            out.push('%');
        }
        ASTNodeType::UnaryOp { op, expr } => {
            out.push_str(op);
            write_child(expr, node_precedence(expr) < UNARY_PRECEDENCE, out);
        }
        ASTNodeType::BinaryOp { op, left, right } => {
            let prec = binary_precedence(op);
            write_child(left, node_precedence(left) < prec, out);
            out.push_str(op);
            write_child(right, node_precedence(right) <= prec, out);
        }
        ASTNodeType::Function { name, args } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_node(arg, out);
            }
            out.push(')');
        }
        ASTNodeType::Array(rows) => {
            out.push('{');
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                for (j, item) in row.iter().enumerate() {
                    if j > 0 {
                        out.push(',');
                    }
                    write_node(item, out);
                }
            }
            out.push('}');
        }
    }
}
