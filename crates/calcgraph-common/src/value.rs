use chrono::{Duration as ChronoDur, NaiveDate};
use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

use crate::{ExcelError, ExcelErrorKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ───────────────────── date-serial utilities ───────────────────────
Dates are plain numbers inside the engine, counted the spreadsheet way:
  Serial 1  = 1900-01-01
  Serial 60 = 1900-02-29 (phantom day kept for compatibility)
  Serial 61 = 1900-03-01
------------------------------------------------------------------- */

const SERIAL_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1899, 12, 31) {
    Some(d) => d,
    None => panic!("invalid serial epoch"),
};

const PHANTOM_CUTOFF: NaiveDate = match NaiveDate::from_ymd_opt(1900, 3, 1) {
    Some(d) => d,
    None => panic!("invalid phantom cutoff"),
};

pub fn date_to_serial(date: NaiveDate) -> f64 {
    let days = (date - SERIAL_EPOCH).num_days();
    if date >= PHANTOM_CUTOFF {
        (days + 1) as f64
    } else {
        days as f64
    }
}

pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = match days {
        60 => return NaiveDate::from_ymd_opt(1900, 2, 28),
        d if d < 60 => d,
        d => d - 1,
    };
    SERIAL_EPOCH.checked_add_signed(ChronoDur::days(offset))
}

/// A computed or literal cell value.
///
/// `Empty` is distinct from zero and from the empty string; arithmetic
/// treats it as 0 and concatenation as "".
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LiteralValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Array(Vec<Vec<LiteralValue>>),
    #[default]
    Empty,
    Error(ExcelError),
}

impl Hash for LiteralValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LiteralValue::Number(n) => n.to_bits().hash(state),
            LiteralValue::Text(s) => s.hash(state),
            LiteralValue::Boolean(b) => b.hash(state),
            LiteralValue::Array(a) => a.hash(state),
            LiteralValue::Empty => {}
            LiteralValue::Error(e) => e.kind.hash(state),
        }
    }
}

impl Eq for LiteralValue {}

impl Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Number(n) => write!(f, "{n}"),
            LiteralValue::Text(s) => write!(f, "{s}"),
            LiteralValue::Boolean(true) => write!(f, "TRUE"),
            LiteralValue::Boolean(false) => write!(f, "FALSE"),
            LiteralValue::Error(e) => write!(f, "{}", e.kind),
            LiteralValue::Array(a) => write!(f, "{a:?}"),
            LiteralValue::Empty => write!(f, ""),
        }
    }
}

impl From<f64> for LiteralValue {
    fn from(n: f64) -> Self {
        LiteralValue::Number(n)
    }
}

impl From<bool> for LiteralValue {
    fn from(b: bool) -> Self {
        LiteralValue::Boolean(b)
    }
}

impl From<&str> for LiteralValue {
    fn from(s: &str) -> Self {
        LiteralValue::Text(s.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(s: String) -> Self {
        LiteralValue::Text(s)
    }
}

impl LiteralValue {
    pub fn is_error(&self) -> bool {
        matches!(self, LiteralValue::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, LiteralValue::Empty)
    }

    pub fn error_kind(&self) -> Option<ExcelErrorKind> {
        match self {
            LiteralValue::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            LiteralValue::Number(n) => Some(*n),
            LiteralValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            LiteralValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Collapse a 1x1 array to its only element; larger arrays yield `#VALUE!`.
    pub fn coerce_to_single_value(&self) -> LiteralValue {
        match self {
            LiteralValue::Array(arr) => match arr.as_slice() {
                [row] if row.len() == 1 => row[0].clone(),
                [] => LiteralValue::Empty,
                _ => LiteralValue::Error(
                    ExcelError::new_value().with_message("array used where a single value is expected"),
                ),
            },
            _ => self.clone(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            LiteralValue::Boolean(b) => *b,
            LiteralValue::Number(n) => *n != 0.0,
            LiteralValue::Text(s) => !s.is_empty(),
            LiteralValue::Array(arr) => !arr.is_empty(),
            LiteralValue::Error(_) | LiteralValue::Empty => false,
        }
    }

    /// Dimensions of an array value as (rows, cols); scalars are 1x1.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            LiteralValue::Array(rows) => {
                let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
                (rows.len() as u32, width as u32)
            }
            _ => (1, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_dates_honour_phantom_leap_day() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(date_to_serial(d(1900, 1, 1)), 1.0);
        assert_eq!(date_to_serial(d(1900, 2, 28)), 59.0);
        assert_eq!(date_to_serial(d(1900, 3, 1)), 61.0);
        assert_eq!(date_to_serial(d(2024, 1, 15)), 45306.0);
        assert_eq!(serial_to_date(45306.0), Some(d(2024, 1, 15)));
        assert_eq!(serial_to_date(60.0), Some(d(1900, 2, 28)));
        assert_eq!(serial_to_date(0.0), None);
    }

    #[test]
    fn single_value_coercion() {
        let one = LiteralValue::Array(vec![vec![LiteralValue::Number(4.0)]]);
        assert_eq!(one.coerce_to_single_value(), LiteralValue::Number(4.0));
        let wide = LiteralValue::Array(vec![vec![1.0.into(), 2.0.into()]]);
        assert!(wide.coerce_to_single_value().is_error());
    }
}
