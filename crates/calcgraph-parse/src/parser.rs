use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, TokenizerError};
use crate::{ParsingError, Tokenizer};
use calcgraph_common::{ExcelError, LiteralValue};

use std::error::Error;
use std::fmt::{self, Display};

#[derive(Debug)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "ParserError at position {}: {}", pos, self.message)
        } else {
            write!(f, "ParserError: {}", self.message)
        }
    }
}

impl Error for ParserError {}

impl From<TokenizerError> for ParserError {
    fn from(err: TokenizerError) -> Self {
        ParserError {
            message: err.message,
            position: Some(err.pos),
        }
    }
}

/// Which coordinates of a reference carry a `$`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Anchor {
    pub row_abs: bool,
    pub col_abs: bool,
}

impl Anchor {
    pub const RELATIVE: Anchor = Anchor {
        row_abs: false,
        col_abs: false,
    };
    pub const ABSOLUTE: Anchor = Anchor {
        row_abs: true,
        col_abs: true,
    };

    pub fn new(row_abs: bool, col_abs: bool) -> Self {
        Anchor { row_abs, col_abs }
    }
}

/// A reference to something outside the formula's own cell.
///
/// Rows and columns are 1-based, as written. `None` on a range bound
/// means the range is open in that dimension (`A:A`, `3:5`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    Cell {
        sheet: Option<String>,
        row: u32,
        col: u32,
        anchor: Anchor,
    },
    Range {
        sheet: Option<String>,
        start_row: Option<u32>,
        start_col: Option<u32>,
        end_row: Option<u32>,
        end_col: Option<u32>,
        start_anchor: Anchor,
        end_anchor: Anchor,
    },
    NamedRange(String),
}

/// Outcome of rewriting one reference during a structural edit.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceRewrite {
    Unchanged,
    Replaced(ReferenceType),
    /// The referenced cells no longer exist; the node becomes `#REF!`.
    Destroyed,
}

struct RangePart {
    col: Option<u32>,
    row: Option<u32>,
    anchor: Anchor,
}

impl ReferenceType {
    /// Parse `A1`, `$A$1`, `A1:B2`, `A:A`, `1:1`, `Sheet1!A1`,
    /// `'My Sheet'!A1:B2`. Anything that is not a cell or range is a
    /// named expression.
    pub fn from_string(reference: &str) -> Result<Self, ParsingError> {
        let (sheet, ref_part) = Self::extract_sheet_name(reference);

        if ref_part.contains(':') {
            return Self::parse_range_reference(&ref_part, sheet);
        }
        match Self::parse_cell_reference(&ref_part) {
            Ok(part) => match (part.col, part.row) {
                (Some(col), Some(row)) => Ok(ReferenceType::Cell {
                    sheet,
                    row,
                    col,
                    anchor: part.anchor,
                }),
                _ => Err(ParsingError::InvalidReference(reference.to_string())),
            },
            Err(_) if sheet.is_none() => Ok(ReferenceType::NamedRange(reference.to_string())),
            Err(e) => Err(e),
        }
    }

    pub fn sheet(&self) -> Option<&str> {
        match self {
            ReferenceType::Cell { sheet, .. } | ReferenceType::Range { sheet, .. } => {
                sheet.as_deref()
            }
            ReferenceType::NamedRange(_) => None,
        }
    }

    /// Same reference pointing at another sheet.
    pub fn with_sheet(&self, new_sheet: Option<String>) -> Self {
        let mut out = self.clone();
        match &mut out {
            ReferenceType::Cell { sheet, .. } | ReferenceType::Range { sheet, .. } => {
                *sheet = new_sheet
            }
            ReferenceType::NamedRange(_) => {}
        }
        out
    }

    fn parse_range_reference(reference: &str, sheet: Option<String>) -> Result<Self, ParsingError> {
        let Some((start, end)) = reference.split_once(':') else {
            return Err(ParsingError::InvalidReference(reference.to_string()));
        };
        let start = Self::parse_range_part(start)?;
        let end = Self::parse_range_part(end)?;

        let cols_only = start.row.is_none() && end.row.is_none();
        let rows_only = start.col.is_none() && end.col.is_none();
        let full = start.row.is_some()
            && start.col.is_some()
            && end.row.is_some()
            && end.col.is_some();
        if !(cols_only || rows_only || full) {
            return Err(ParsingError::InvalidReference(reference.to_string()));
        }

        let (start_row, end_row, sr_abs, er_abs) =
            order_bounds(start.row, end.row, start.anchor.row_abs, end.anchor.row_abs);
        let (start_col, end_col, sc_abs, ec_abs) =
            order_bounds(start.col, end.col, start.anchor.col_abs, end.anchor.col_abs);

        Ok(ReferenceType::Range {
            sheet,
            start_row,
            start_col,
            end_row,
            end_col,
            start_anchor: Anchor::new(sr_abs, sc_abs),
            end_anchor: Anchor::new(er_abs, ec_abs),
        })
    }

    /// One side of a range: `A1`, `$A`, `$3`.
    fn parse_range_part(part: &str) -> Result<RangePart, ParsingError> {
        let invalid = || ParsingError::InvalidReference(format!("invalid range part: {part}"));
        let bytes = part.as_bytes();
        let mut i = 0;

        let col_abs = bytes.first() == Some(&b'$');
        if col_abs {
            i += 1;
        }
        let col_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let col = if i > col_start {
            Some(Self::column_to_number(&part[col_start..i])?)
        } else {
            None
        };

        let mut row_abs = false;
        if i < bytes.len() && bytes[i] == b'$' {
            row_abs = true;
            i += 1;
        }
        let row_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i != bytes.len() {
            return Err(invalid());
        }
        let row = if i > row_start {
            let row = part[row_start..i].parse::<u32>().map_err(|_| invalid())?;
            if row == 0 {
                return Err(invalid());
            }
            Some(row)
        } else {
            None
        };

        match (col, row) {
            (None, None) => Err(invalid()),
            // a lone `$` in front of row digits marks the row, not a column
            (None, Some(_)) => Ok(RangePart {
                col,
                row,
                anchor: Anchor::new(col_abs || row_abs, false),
            }),
            (Some(_), None) if row_abs => Err(invalid()),
            _ => Ok(RangePart {
                col,
                row,
                anchor: Anchor::new(row_abs, col_abs),
            }),
        }
    }

    fn parse_cell_reference(reference: &str) -> Result<RangePart, ParsingError> {
        let part = Self::parse_range_part(reference)?;
        if part.col.is_none() || part.row.is_none() {
            return Err(ParsingError::InvalidReference(format!(
                "invalid cell reference: {reference}"
            )));
        }
        Ok(part)
    }

    /// Column letters to a 1-based number. Three letters at most.
    pub fn column_to_number(column: &str) -> Result<u32, ParsingError> {
        let bytes = column.as_bytes();
        if bytes.is_empty() || bytes.len() > 3 {
            return Err(ParsingError::InvalidReference(format!(
                "invalid column: {column}"
            )));
        }
        let mut result = 0u32;
        for &b in bytes {
            if !b.is_ascii_alphabetic() {
                return Err(ParsingError::InvalidReference(format!(
                    "invalid column: {column}"
                )));
            }
            result = result * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
        }
        Ok(result)
    }

    /// 1-based column number to letters.
    pub fn number_to_column(num: u32) -> String {
        calcgraph_common::column_to_letters(num.saturating_sub(1))
    }

    fn extract_sheet_name(reference: &str) -> (Option<String>, String) {
        if let Some(rest) = reference.strip_prefix('\'') {
            let bytes = rest.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    if bytes.get(i + 1) == Some(&b'!') {
                        let sheet = rest[..i].replace("''", "'");
                        return (Some(sheet), rest[i + 2..].to_string());
                    }
                }
                i += 1;
            }
        }
        match reference.find('!') {
            Some(pos) if pos > 0 => (
                Some(reference[..pos].to_string()),
                reference[pos + 1..].to_string(),
            ),
            _ => (None, reference.to_string()),
        }
    }
}

fn order_bounds(
    a: Option<u32>,
    b: Option<u32>,
    a_abs: bool,
    b_abs: bool,
) -> (Option<u32>, Option<u32>, bool, bool) {
    match (a, b) {
        (Some(x), Some(y)) if x > y => (b, a, b_abs, a_abs),
        _ => (a, b, a_abs, b_abs),
    }
}

fn sheet_prefix(sheet: &Option<String>) -> String {
    match sheet {
        None => String::new(),
        Some(name) => {
            let plain = !name.is_empty()
                && !name.as_bytes()[0].is_ascii_digit()
                && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
            if plain {
                format!("{name}!")
            } else {
                format!("'{}'!", name.replace('\'', "''"))
            }
        }
    }
}

fn fmt_part(col: Option<u32>, row: Option<u32>, anchor: Anchor) -> String {
    let mut out = String::new();
    if let Some(c) = col {
        if anchor.col_abs {
            out.push('$');
        }
        out.push_str(&ReferenceType::number_to_column(c));
    }
    if let Some(r) = row {
        if anchor.row_abs {
            out.push('$');
        }
        out.push_str(&r.to_string());
    }
    out
}

impl Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceType::Cell {
                sheet,
                row,
                col,
                anchor,
            } => write!(
                f,
                "{}{}",
                sheet_prefix(sheet),
                fmt_part(Some(*col), Some(*row), *anchor)
            ),
            ReferenceType::Range {
                sheet,
                start_row,
                start_col,
                end_row,
                end_col,
                start_anchor,
                end_anchor,
            } => write!(
                f,
                "{}{}:{}",
                sheet_prefix(sheet),
                fmt_part(*start_col, *start_row, *start_anchor),
                fmt_part(*end_col, *end_row, *end_anchor)
            ),
            ReferenceType::NamedRange(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ASTNodeType {
    Literal(LiteralValue),
    Reference {
        original: String,
        reference: ReferenceType,
    },
    UnaryOp {
        op: String,
        expr: Box<ASTNode>,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Function {
        name: String,
        args: Vec<ASTNode>,
    },
    Array(Vec<Vec<ASTNode>>),
}

/// A parsed formula element. Equality ignores source spans.
#[derive(Debug, Clone)]
pub struct ASTNode {
    pub node_type: ASTNodeType,
    pub source_token: Option<Token>,
}

impl PartialEq for ASTNode {
    fn eq(&self, other: &Self) -> bool {
        self.node_type == other.node_type
    }
}

impl ASTNode {
    pub fn new(node_type: ASTNodeType, source_token: Option<Token>) -> Self {
        ASTNode {
            node_type,
            source_token,
        }
    }

    pub fn literal(value: LiteralValue) -> Self {
        ASTNode::new(ASTNodeType::Literal(value), None)
    }

    pub fn reference(reference: ReferenceType) -> Self {
        ASTNode::new(
            ASTNodeType::Reference {
                original: reference.to_string(),
                reference,
            },
            None,
        )
    }

    /// Every reference in the tree, left to right.
    pub fn references(&self) -> Vec<&ReferenceType> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a ReferenceType>) {
        match &self.node_type {
            ASTNodeType::Reference { reference, .. } => out.push(reference),
            ASTNodeType::UnaryOp { expr, .. } => expr.collect_references(out),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            ASTNodeType::Function { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
            ASTNodeType::Array(rows) => {
                for item in rows.iter().flatten() {
                    item.collect_references(out);
                }
            }
            ASTNodeType::Literal(_) => {}
        }
    }

    /// Build a new tree with every reference passed through `f`.
    ///
    /// The receiver is left untouched. Destroyed references turn into
    /// `#REF!` literals.
    pub fn rewrite_references<F>(&self, f: &mut F) -> ASTNode
    where
        F: FnMut(&ReferenceType) -> ReferenceRewrite,
    {
        let node_type = match &self.node_type {
            ASTNodeType::Reference { original, reference } => match f(reference) {
                ReferenceRewrite::Unchanged => ASTNodeType::Reference {
                    original: original.clone(),
                    reference: reference.clone(),
                },
                ReferenceRewrite::Replaced(new_ref) => ASTNodeType::Reference {
                    original: new_ref.to_string(),
                    reference: new_ref,
                },
                ReferenceRewrite::Destroyed => {
                    ASTNodeType::Literal(LiteralValue::Error(ExcelError::new_ref()))
                }
            },
            ASTNodeType::UnaryOp { op, expr } => ASTNodeType::UnaryOp {
                op: op.clone(),
                expr: Box::new(expr.rewrite_references(f)),
            },
            ASTNodeType::BinaryOp { op, left, right } => ASTNodeType::BinaryOp {
                op: op.clone(),
                left: Box::new(left.rewrite_references(f)),
                right: Box::new(right.rewrite_references(f)),
            },
            ASTNodeType::Function { name, args } => ASTNodeType::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.rewrite_references(f)).collect(),
            },
            ASTNodeType::Array(rows) => ASTNodeType::Array(
                rows.iter()
                    .map(|row| row.iter().map(|a| a.rewrite_references(f)).collect())
                    .collect(),
            ),
            ASTNodeType::Literal(v) => ASTNodeType::Literal(v.clone()),
        };
        ASTNode::new(node_type, self.source_token.clone())
    }

    /// Whether any function call in the tree matches `name` (case-insensitive).
    pub fn calls_function(&self, name: &str) -> bool {
        match &self.node_type {
            ASTNodeType::Function { name: n, args } => {
                n.eq_ignore_ascii_case(name) || args.iter().any(|a| a.calls_function(name))
            }
            ASTNodeType::UnaryOp { expr, .. } => expr.calls_function(name),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.calls_function(name) || right.calls_function(name)
            }
            ASTNodeType::Array(rows) => rows.iter().flatten().any(|a| a.calls_function(name)),
            _ => false,
        }
    }
}

impl Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::pretty::canonical_formula(self))
    }
}

/// Turns tokens into an AST with precedence climbing.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens
                .into_iter()
                .filter(|t| t.token_type != TokenType::Whitespace)
                .collect(),
            position: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParserError {
        ParserError {
            message: message.into(),
            position: Some(self.position),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_is(&self, token_type: TokenType, subtype: TokenSubType) -> bool {
        self.peek()
            .is_some_and(|t| t.token_type == token_type && t.subtype == subtype)
    }

    pub fn parse(&mut self) -> Result<ASTNode, ParserError> {
        let Some(first) = self.tokens.first() else {
            return Err(ParserError {
                message: "no tokens to parse".to_string(),
                position: None,
            });
        };

        if first.token_type == TokenType::Literal {
            let token = first.clone();
            return Ok(ASTNode::new(
                ASTNodeType::Literal(LiteralValue::Text(token.value.clone())),
                Some(token),
            ));
        }

        let ast = self.parse_binary_op(0)?;
        if let Some(tok) = self.peek() {
            return Err(self.error(format!("unexpected token {tok}")));
        }
        Ok(ast)
    }

    fn parse_binary_op(&mut self, min_precedence: u8) -> Result<ASTNode, ParserError> {
        let mut left = self.parse_unary_op()?;

        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpInfix {
                break;
            }
            let (precedence, associativity) =
                token.get_precedence().unwrap_or((0, Associativity::Left));
            if precedence < min_precedence {
                break;
            }
            let op_token = token.clone();
            self.position += 1;

            let next_min = if associativity == Associativity::Left {
                precedence + 1
            } else {
                precedence
            };
            let right = self.parse_binary_op(next_min)?;
            left = ASTNode::new(
                ASTNodeType::BinaryOp {
                    op: op_token.value.clone(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Some(op_token),
            );
        }

        Ok(left)
    }

    fn parse_unary_op(&mut self) -> Result<ASTNode, ParserError> {
        if let Some(token) = self.peek() {
            if token.token_type == TokenType::OpPrefix {
                let op_token = token.clone();
                self.position += 1;
                let expr = self.parse_unary_op()?;
                return Ok(ASTNode::new(
                    ASTNodeType::UnaryOp {
                        op: op_token.value.clone(),
                        expr: Box::new(expr),
                    },
                    Some(op_token),
                ));
            }
        }
        self.parse_postfix_op()
    }

    fn parse_postfix_op(&mut self) -> Result<ASTNode, ParserError> {
        let mut expr = self.parse_primary()?;
        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpPostfix {
                break;
            }
            let op_token = token.clone();
            self.position += 1;
            expr = ASTNode::new(
                ASTNodeType::UnaryOp {
                    op: op_token.value.clone(),
                    expr: Box::new(expr),
                },
                Some(op_token),
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<ASTNode, ParserError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of formula"));
        };
        match (token.token_type, token.subtype) {
            (TokenType::Operand, _) => {
                self.position += 1;
                self.parse_operand(token)
            }
            (TokenType::Func, TokenSubType::Open) => {
                self.position += 1;
                self.parse_function(token)
            }
            (TokenType::Paren, TokenSubType::Open) => {
                self.position += 1;
                let expr = self.parse_binary_op(0)?;
                if !self.peek_is(TokenType::Paren, TokenSubType::Close) {
                    return Err(self.error("expected closing parenthesis"));
                }
                self.position += 1;
                Ok(expr)
            }
            (TokenType::Array, TokenSubType::Open) => {
                self.position += 1;
                self.parse_array()
            }
            _ => Err(self.error(format!("unexpected token {token}"))),
        }
    }

    fn parse_operand(&mut self, token: Token) -> Result<ASTNode, ParserError> {
        let node_type = match token.subtype {
            TokenSubType::Number => {
                let value = token
                    .value
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("invalid number {}", token.value)))?;
                ASTNodeType::Literal(LiteralValue::Number(value))
            }
            TokenSubType::Text => {
                let inner = &token.value[1..token.value.len().saturating_sub(1).max(1)];
                ASTNodeType::Literal(LiteralValue::Text(inner.replace("\"\"", "\"")))
            }
            TokenSubType::Logical => {
                ASTNodeType::Literal(LiteralValue::Boolean(token.value.eq_ignore_ascii_case("TRUE")))
            }
            TokenSubType::Error => {
                let code = token
                    .value
                    .rfind('#')
                    .map_or(token.value.as_str(), |pos| &token.value[pos..]);
                ASTNodeType::Literal(LiteralValue::Error(ExcelError::from_error_string(code)))
            }
            TokenSubType::Range => {
                let reference = ReferenceType::from_string(&token.value).map_err(|e| {
                    self.error(format!("invalid reference '{}': {e}", token.value))
                })?;
                ASTNodeType::Reference {
                    original: token.value.clone(),
                    reference,
                }
            }
            other => return Err(self.error(format!("unexpected operand subtype {other:?}"))),
        };
        Ok(ASTNode::new(node_type, Some(token)))
    }

    fn parse_function(&mut self, func_token: Token) -> Result<ASTNode, ParserError> {
        let name = func_token.value[..func_token.value.len() - 1].to_string();
        let mut args = Vec::new();

        if self.peek_is(TokenType::Func, TokenSubType::Close) {
            self.position += 1;
            return Ok(ASTNode::new(
                ASTNodeType::Function { name, args },
                Some(func_token),
            ));
        }

        loop {
            let at_boundary = self.peek_is(TokenType::Sep, TokenSubType::Arg)
                || self.peek_is(TokenType::Func, TokenSubType::Close);
            if at_boundary {
                args.push(ASTNode::literal(LiteralValue::Empty));
            } else {
                args.push(self.parse_binary_op(0)?);
            }

            if self.peek_is(TokenType::Sep, TokenSubType::Arg) {
                self.position += 1;
            } else if self.peek_is(TokenType::Func, TokenSubType::Close) {
                self.position += 1;
                break;
            } else {
                return Err(self.error("expected ',' or ')' in function arguments"));
            }
        }

        Ok(ASTNode::new(
            ASTNodeType::Function { name, args },
            Some(func_token),
        ))
    }

    fn parse_array(&mut self) -> Result<ASTNode, ParserError> {
        let mut rows = Vec::new();
        let mut current_row = Vec::new();

        if self.peek_is(TokenType::Array, TokenSubType::Close) {
            self.position += 1;
            return Ok(ASTNode::new(ASTNodeType::Array(rows), None));
        }

        current_row.push(self.parse_binary_op(0)?);
        loop {
            if self.peek_is(TokenType::Sep, TokenSubType::Arg) {
                self.position += 1;
                current_row.push(self.parse_binary_op(0)?);
            } else if self.peek_is(TokenType::Sep, TokenSubType::Row) {
                self.position += 1;
                rows.push(std::mem::take(&mut current_row));
                current_row.push(self.parse_binary_op(0)?);
            } else if self.peek_is(TokenType::Array, TokenSubType::Close) {
                self.position += 1;
                rows.push(current_row);
                break;
            } else {
                return Err(self.error("unexpected token in array literal"));
            }
        }

        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return Err(self.error("array literal rows differ in length"));
        }
        Ok(ASTNode::new(ASTNodeType::Array(rows), None))
    }
}

/// Parse formula text. The text must start with `=`.
pub fn parse<T: AsRef<str>>(formula: T) -> Result<ASTNode, ParserError> {
    let formula = formula.as_ref();
    if !formula.starts_with('=') {
        return Err(ParserError {
            message: "formula must start with '='".to_string(),
            position: Some(0),
        });
    }
    let tokens = Tokenizer::new(formula)?.items;
    Parser::new(tokens).parse()
}
