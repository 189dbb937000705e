//! Meta crate that re-exports the calcgraph building blocks. Depend on
//! this crate for the full engine, or on the layer crates directly when
//! only the value types or the parser are needed.

#[cfg(feature = "common")]
pub use calcgraph_common as common;

#[cfg(feature = "parse")]
pub use calcgraph_parse as parse;

#[cfg(feature = "eval")]
pub use calcgraph_eval as eval;

#[cfg(feature = "common")]
pub use calcgraph_common::{
    CellAddress, ExcelError, ExcelErrorKind, LiteralValue, RangeAddress, SheetId,
};

#[cfg(feature = "parse")]
pub use calcgraph_parse::{ASTNode, ParserError, parse};

#[cfg(feature = "eval")]
pub use calcgraph_eval::engine::{
    AddressStoragePolicy, CellValueChange, ChangeAddress, EditorError, Engine, EvalConfig,
    RawCellContent,
};
