//! Value coercions shared by operators and builtins.

use calcgraph_common::{ExcelError, LiteralValue};
use calcgraph_parse::pretty::format_number;
use std::cmp::Ordering;

/// Text that reads as a number: `12`, ` 1.5 `, `-3e2`, `50%`.
pub fn parse_number_text(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(pct) = t.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|n| n / 100.0);
    }
    let n = t.parse::<f64>().ok()?;
    n.is_finite().then_some(n)
}

pub fn to_number(v: &LiteralValue) -> Result<f64, ExcelError> {
    match v {
        LiteralValue::Number(n) => Ok(*n),
        LiteralValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        LiteralValue::Empty => Ok(0.0),
        LiteralValue::Text(s) => parse_number_text(s).ok_or_else(|| {
            ExcelError::new_value().with_message(format!("cannot convert \"{s}\" to a number"))
        }),
        LiteralValue::Error(e) => Err(e.clone()),
        LiteralValue::Array(_) => to_number(&v.coerce_to_single_value()),
    }
}

pub fn to_text(v: &LiteralValue) -> Result<String, ExcelError> {
    match v {
        LiteralValue::Number(n) => Ok(format_number(*n)),
        LiteralValue::Text(s) => Ok(s.clone()),
        LiteralValue::Boolean(true) => Ok("TRUE".to_string()),
        LiteralValue::Boolean(false) => Ok("FALSE".to_string()),
        LiteralValue::Empty => Ok(String::new()),
        LiteralValue::Error(e) => Err(e.clone()),
        LiteralValue::Array(_) => to_text(&v.coerce_to_single_value()),
    }
}

pub fn to_logical(v: &LiteralValue) -> Result<bool, ExcelError> {
    match v {
        LiteralValue::Boolean(b) => Ok(*b),
        LiteralValue::Number(n) => Ok(*n != 0.0),
        LiteralValue::Empty => Ok(false),
        LiteralValue::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
        LiteralValue::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
        LiteralValue::Text(s) => Err(ExcelError::new_value()
            .with_message(format!("cannot convert \"{s}\" to a logical value"))),
        LiteralValue::Error(e) => Err(e.clone()),
        LiteralValue::Array(_) => to_logical(&v.coerce_to_single_value()),
    }
}

/// Finite numbers pass through; NaN and infinities become `#NUM!`.
pub fn number_result(n: f64) -> LiteralValue {
    if n.is_finite() {
        LiteralValue::Number(n)
    } else {
        LiteralValue::Error(ExcelError::new_num())
    }
}

fn type_rank(v: &LiteralValue) -> u8 {
    match v {
        LiteralValue::Number(_) | LiteralValue::Empty => 0,
        LiteralValue::Text(_) => 1,
        LiteralValue::Boolean(_) => 2,
        _ => 3,
    }
}

/// Spreadsheet ordering of two scalars: numbers sort before text, text
/// before booleans, text compares case-insensitively. An empty cell
/// takes the type of the other side.
pub fn compare_values(a: &LiteralValue, b: &LiteralValue) -> Ordering {
    use LiteralValue::*;
    match (a, b) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, Text(s)) => "".cmp(s.to_lowercase().as_str()),
        (Text(s), Empty) => s.to_lowercase().as_str().cmp(""),
        (Empty, Boolean(b)) => false.cmp(b),
        (Boolean(a), Empty) => a.cmp(&false),
        (Number(x), Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Number(x), Empty) => x.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
        (Empty, Number(y)) => 0.0f64.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Text(x), Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CriterionOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A `SUMIF`/`COUNTIF` criterion such as `">5"`, `"<>x"` or `"ap*"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    op: CriterionOp,
    operand: LiteralValue,
}

impl Criterion {
    pub fn parse(v: &LiteralValue) -> Criterion {
        let text = match v {
            LiteralValue::Text(s) => s.as_str(),
            other => {
                return Criterion {
                    op: CriterionOp::Eq,
                    operand: other.clone(),
                };
            }
        };
        let (op, rest) = [
            (">=", CriterionOp::Ge),
            ("<=", CriterionOp::Le),
            ("<>", CriterionOp::Ne),
            (">", CriterionOp::Gt),
            ("<", CriterionOp::Lt),
            ("=", CriterionOp::Eq),
        ]
        .iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((CriterionOp::Eq, text));

        let operand = if let Some(n) = parse_number_text(rest) {
            LiteralValue::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") {
            LiteralValue::Boolean(true)
        } else if rest.eq_ignore_ascii_case("FALSE") {
            LiteralValue::Boolean(false)
        } else if rest.is_empty() {
            LiteralValue::Empty
        } else {
            LiteralValue::Text(rest.to_string())
        };
        Criterion { op, operand }
    }

    /// Stable text used to key cached aggregates.
    pub fn cache_key(&self) -> String {
        format!("{:?}:{:?}", self.op, self.operand)
    }

    pub fn matches(&self, v: &LiteralValue) -> bool {
        if v.is_error() {
            return false;
        }
        match (&self.operand, self.op) {
            (LiteralValue::Text(pattern), CriterionOp::Eq | CriterionOp::Ne) => {
                let hit = match v {
                    LiteralValue::Text(s) => wildcard_match(pattern, s),
                    _ => false,
                };
                hit == (self.op == CriterionOp::Eq)
            }
            (LiteralValue::Empty, CriterionOp::Eq) => {
                matches!(v, LiteralValue::Empty) || matches!(v, LiteralValue::Text(s) if s.is_empty())
            }
            (LiteralValue::Empty, CriterionOp::Ne) => !v.is_empty(),
            (operand, op) => {
                let v = match v {
                    LiteralValue::Text(s) => match parse_number_text(s) {
                        Some(n) if matches!(operand, LiteralValue::Number(_)) => {
                            LiteralValue::Number(n)
                        }
                        _ => v.clone(),
                    },
                    _ => v.clone(),
                };
                if type_rank(&v) != type_rank(operand) || v.is_empty() {
                    return op == CriterionOp::Ne;
                }
                let ord = compare_values(&v, operand);
                match op {
                    CriterionOp::Eq => ord == Ordering::Equal,
                    CriterionOp::Ne => ord != Ordering::Equal,
                    CriterionOp::Lt => ord == Ordering::Less,
                    CriterionOp::Le => ord != Ordering::Greater,
                    CriterionOp::Gt => ord == Ordering::Greater,
                    CriterionOp::Ge => ord != Ordering::Less,
                }
            }
        }
    }
}

/// Case-insensitive match with `*`, `?` and `~` escapes.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && p[pi] == '~' && pi + 1 < p.len() && p[pi + 1] == t[ti] {
            pi += 2;
            ti += 1;
        } else if pi < p.len() && (p[pi] == '?' || (p[pi] == t[ti] && p[pi] != '*')) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_text_coerces() {
        assert_eq!(to_number(&LiteralValue::Text(" 2.5 ".into())), Ok(2.5));
        assert_eq!(to_number(&LiteralValue::Text("50%".into())), Ok(0.5));
        assert!(to_number(&LiteralValue::Text("abc".into())).is_err());
        assert_eq!(to_number(&LiteralValue::Empty), Ok(0.0));
    }

    #[test]
    fn mixed_type_ordering() {
        let n = LiteralValue::Number(100.0);
        let t = LiteralValue::Text("a".into());
        let b = LiteralValue::Boolean(false);
        assert_eq!(compare_values(&n, &t), Ordering::Less);
        assert_eq!(compare_values(&t, &b), Ordering::Less);
        assert_eq!(
            compare_values(&LiteralValue::Text("ABC".into()), &LiteralValue::Text("abc".into())),
            Ordering::Equal
        );
    }

    #[test]
    fn criteria() {
        let gt = Criterion::parse(&LiteralValue::Text(">5".into()));
        assert!(gt.matches(&LiteralValue::Number(6.0)));
        assert!(!gt.matches(&LiteralValue::Number(5.0)));
        assert!(!gt.matches(&LiteralValue::Text("zzz".into())));

        let wild = Criterion::parse(&LiteralValue::Text("ap*".into()));
        assert!(wild.matches(&LiteralValue::Text("Apple".into())));
        assert!(!wild.matches(&LiteralValue::Text("grape".into())));

        let ne = Criterion::parse(&LiteralValue::Text("<>x".into()));
        assert!(ne.matches(&LiteralValue::Text("y".into())));
        assert!(!ne.matches(&LiteralValue::Text("X".into())));

        let exact = Criterion::parse(&LiteralValue::Number(3.0));
        assert!(exact.matches(&LiteralValue::Text("3".into())));
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("a?c", "abc"));
        assert!(wildcard_match("*c", "abc"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*d", "abc"));
        assert!(wildcard_match("~*", "*"));
    }
}
