//! Classification of raw cell input.
//!
//! Everything a caller can write into a cell goes through
//! [`parse_content`]: formulas are parsed, text that reads as a number,
//! boolean, date or error code becomes that value, and the original
//! input is kept so that the sheet serializes back to what was typed.

use crate::coercion::parse_number_text;
use calcgraph_common::{ExcelError, ExcelErrorKind, LiteralValue, date_to_serial};
use calcgraph_parse::{ASTNode, parse};
use chrono::NaiveDate;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Content exactly as supplied by the caller.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawCellContent {
    #[default]
    Empty,
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl RawCellContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, RawCellContent::Empty)
    }

    /// Text starting with `=` (or `{=` for array formulas).
    pub fn is_formula(&self) -> bool {
        matches!(self, RawCellContent::Text(t) if t.starts_with('=') || is_array_formula_text(t))
    }
}

impl From<f64> for RawCellContent {
    fn from(n: f64) -> Self {
        RawCellContent::Number(n)
    }
}

impl From<i32> for RawCellContent {
    fn from(n: i32) -> Self {
        RawCellContent::Number(f64::from(n))
    }
}

impl From<bool> for RawCellContent {
    fn from(b: bool) -> Self {
        RawCellContent::Boolean(b)
    }
}

impl From<&str> for RawCellContent {
    fn from(s: &str) -> Self {
        RawCellContent::Text(s.to_string())
    }
}

impl From<String> for RawCellContent {
    fn from(s: String) -> Self {
        RawCellContent::Text(s)
    }
}

impl<T: Into<RawCellContent>> From<Option<T>> for RawCellContent {
    fn from(v: Option<T>) -> Self {
        v.map_or(RawCellContent::Empty, Into::into)
    }
}

/// Raw content after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedContent {
    Empty,
    Value(LiteralValue),
    Formula(ASTNode),
    /// `{=...}`: a formula whose result spans a block of cells.
    ArrayFormula(ASTNode),
    /// Formula text the parser rejected. Kept verbatim.
    Invalid { text: String, error: String },
}

fn is_array_formula_text(text: &str) -> bool {
    text.starts_with("{=") && text.ends_with('}')
}

/// Classify `raw`. `date_formats` are chrono patterns tried in order on
/// text that is not a number.
pub fn parse_content(raw: &RawCellContent, date_formats: &[String]) -> ParsedContent {
    match raw {
        RawCellContent::Empty => ParsedContent::Empty,
        RawCellContent::Number(n) if !n.is_finite() => ParsedContent::Value(LiteralValue::Error(
            ExcelError::new_num().with_message("value too large"),
        )),
        RawCellContent::Number(n) => ParsedContent::Value(LiteralValue::Number(normalize_zero(*n))),
        RawCellContent::Boolean(b) => ParsedContent::Value(LiteralValue::Boolean(*b)),
        RawCellContent::Text(text) => parse_text(text, date_formats),
    }
}

fn normalize_zero(n: f64) -> f64 {
    if n == 0.0 { 0.0 } else { n }
}

fn parse_text(text: &str, date_formats: &[String]) -> ParsedContent {
    if text.is_empty() {
        return ParsedContent::Empty;
    }
    if is_array_formula_text(text) {
        let inner = &text[1..text.len() - 1];
        return match parse(inner) {
            Ok(ast) => ParsedContent::ArrayFormula(ast),
            Err(e) => ParsedContent::Invalid {
                text: text.to_string(),
                error: e.to_string(),
            },
        };
    }
    if text.starts_with('=') {
        return match parse(text) {
            Ok(ast) => ParsedContent::Formula(ast),
            Err(e) => ParsedContent::Invalid {
                text: text.to_string(),
                error: e.to_string(),
            },
        };
    }
    if let Some(rest) = text.strip_prefix('\'') {
        return ParsedContent::Value(LiteralValue::Text(rest.to_string()));
    }
    if text.eq_ignore_ascii_case("true") {
        return ParsedContent::Value(LiteralValue::Boolean(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return ParsedContent::Value(LiteralValue::Boolean(false));
    }
    if let Some(kind) = ExcelErrorKind::try_parse(&text.to_uppercase()) {
        return ParsedContent::Value(LiteralValue::Error(kind.into()));
    }
    let trimmed = text.trim();
    if let Some(n) = parse_number_text(trimmed) {
        return parse_content(&RawCellContent::Number(n), date_formats);
    }
    if let Some(serial) = parse_date(trimmed, date_formats) {
        return ParsedContent::Value(LiteralValue::Number(serial));
    }
    ParsedContent::Value(LiteralValue::Text(text.to_string()))
}

fn parse_date(text: &str, date_formats: &[String]) -> Option<f64> {
    date_formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(date_to_serial)
}
