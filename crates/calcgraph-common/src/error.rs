//! Spreadsheet error values.
//!
//! Errors are ordinary values: a formula that fails caches an
//! [`ExcelError`] exactly like a number, and its dependents read it
//! through the same channel. Only the kind matters for equality of
//! computed results; the message is diagnostic.

use std::{error::Error, fmt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::LiteralValue;

/// Every error code a cell can hold.
///
/// `Display` renders the code exactly as it appears in formula text
/// (`#DIV/0!`, `#CYCLE!`, ...).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExcelErrorKind {
    Null,
    Ref,
    Name,
    Value,
    Div,
    Na,
    Num,
    /// Unparseable formula text.
    Error,
    /// Non-iterative circular reference.
    Cycle,
    Spill,
    NImpl,
}

impl fmt::Display for ExcelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl ExcelErrorKind {
    pub const ALL: [ExcelErrorKind; 11] = [
        Self::Null,
        Self::Ref,
        Self::Name,
        Self::Value,
        Self::Div,
        Self::Na,
        Self::Num,
        Self::Error,
        Self::Cycle,
        Self::Spill,
        Self::NImpl,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Null => "#NULL!",
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Value => "#VALUE!",
            Self::Div => "#DIV/0!",
            Self::Na => "#N/A",
            Self::Num => "#NUM!",
            Self::Error => "#ERROR!",
            Self::Cycle => "#CYCLE!",
            Self::Spill => "#SPILL!",
            Self::NImpl => "#N/IMPL!",
        }
    }

    /// Case-insensitive lookup of an error code such as `#ref!`.
    pub fn try_parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(trimmed))
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExcelError {
    pub kind: ExcelErrorKind,
    pub message: Option<String>,
}

impl From<ExcelErrorKind> for ExcelError {
    fn from(kind: ExcelErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl ExcelError {
    pub fn new(kind: ExcelErrorKind) -> Self {
        kind.into()
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn new_ref() -> Self {
        Self::new(ExcelErrorKind::Ref)
    }

    pub fn new_cycle() -> Self {
        Self::new(ExcelErrorKind::Cycle)
    }

    pub fn new_value() -> Self {
        Self::new(ExcelErrorKind::Value)
    }

    pub fn new_div() -> Self {
        Self::new(ExcelErrorKind::Div)
    }

    pub fn new_na() -> Self {
        Self::new(ExcelErrorKind::Na)
    }

    pub fn new_name() -> Self {
        Self::new(ExcelErrorKind::Name)
    }

    pub fn new_num() -> Self {
        Self::new(ExcelErrorKind::Num)
    }

    /// Parse an error literal; unknown codes become `#ERROR!`.
    pub fn from_error_string(s: &str) -> Self {
        match ExcelErrorKind::try_parse(s) {
            Some(kind) => Self::new(kind),
            None => Self::new(ExcelErrorKind::Error).with_message(format!("unknown error code {s}")),
        }
    }
}

impl fmt::Display for ExcelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for ExcelError {}

impl From<ExcelError> for LiteralValue {
    fn from(error: ExcelError) -> Self {
        LiteralValue::Error(error)
    }
}

impl From<ExcelErrorKind> for LiteralValue {
    fn from(kind: ExcelErrorKind) -> Self {
        LiteralValue::Error(ExcelError::new(kind))
    }
}

impl PartialEq<str> for ExcelError {
    fn eq(&self, other: &str) -> bool {
        self.kind.code() == other
    }
}

impl PartialEq<&str> for ExcelError {
    fn eq(&self, other: &&str) -> bool {
        self.kind.code() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_case_insensitively() {
        for kind in ExcelErrorKind::ALL {
            assert_eq!(ExcelErrorKind::try_parse(kind.code()), Some(kind));
            let lower = kind.code().to_ascii_lowercase();
            assert_eq!(ExcelErrorKind::try_parse(&lower), Some(kind));
        }
        assert_eq!(ExcelErrorKind::try_parse("#BOGUS!"), None);
    }

    #[test]
    fn unknown_literal_becomes_error_kind() {
        let err = ExcelError::from_error_string("#WHAT?");
        assert_eq!(err.kind, ExcelErrorKind::Error);
        assert!(err.message.is_some());
    }
}
