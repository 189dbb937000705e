pub mod parser;
pub mod pretty;
pub mod tokenizer;
pub mod types;

pub use parser::{
    ASTNode, ASTNodeType, Anchor, Parser, ParserError, ReferenceRewrite, ReferenceType, parse,
};
pub use pretty::canonical_formula;
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};
pub use types::ParsingError;

pub use calcgraph_common::{ExcelError, ExcelErrorKind, LiteralValue};
