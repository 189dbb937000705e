use std::convert::TryFrom;
use std::error::Error;
use std::fmt::{self, Display};

const TOKEN_ENDERS: &str = ",;}) +-*/^&=><%";

const fn build_token_enders() -> [bool; 256] {
    let mut tbl = [false; 256];
    let bytes = TOKEN_ENDERS.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        tbl[bytes[i] as usize] = true;
        i += 1;
    }
    tbl
}
static TOKEN_ENDERS_TABLE: [bool; 256] = build_token_enders();

#[inline(always)]
fn is_token_ender(c: u8) -> bool {
    TOKEN_ENDERS_TABLE[c as usize]
}

static ERROR_CODES: &[&str] = &[
    "#NULL!", "#DIV/0!", "#VALUE!", "#REF!", "#NAME?", "#NUM!", "#N/A", "#ERROR!", "#CYCLE!",
    "#SPILL!",
];

/// Operator associativity.
#[derive(Debug, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizerError at {}: {}", self.pos, self.message)
    }
}

impl Error for TokenizerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Literal,
    Operand,
    Func,
    Array,
    Paren,
    Sep,
    OpPrefix,
    OpInfix,
    OpPostfix,
    Whitespace,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSubType {
    None,
    Text,
    Number,
    Logical,
    Error,
    Range,
    Open,
    Close,
    Arg,
    Row,
}

/// A lexical token with its byte span in the source formula.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub subtype: TokenSubType,
    pub start: usize,
    pub end: usize,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} subtype: {:?} value: {}>",
            self.token_type, self.subtype, self.value
        )
    }
}

impl Token {
    fn from_slice(
        source: &str,
        token_type: TokenType,
        subtype: TokenSubType,
        start: usize,
        end: usize,
    ) -> Self {
        Token {
            value: source[start..end].to_string(),
            token_type,
            subtype,
            start,
            end,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::OpPrefix | TokenType::OpInfix | TokenType::OpPostfix
        )
    }

    pub fn get_precedence(&self) -> Option<(u8, Associativity)> {
        let op = if self.token_type == TokenType::OpPrefix {
            "u"
        } else {
            self.value.as_str()
        };

        match op {
            "u" => Some((7, Associativity::Right)),
            "%" => Some((6, Associativity::Left)),
            "^" => Some((5, Associativity::Left)),
            "*" | "/" => Some((4, Associativity::Left)),
            "+" | "-" => Some((3, Associativity::Left)),
            "&" => Some((2, Associativity::Left)),
            "=" | "<" | ">" | "<=" | ">=" | "<>" => Some((1, Associativity::Left)),
            _ => None,
        }
    }

    fn classify_operand(value: &str) -> TokenSubType {
        if value.starts_with('"') {
            TokenSubType::Text
        } else if value.starts_with('#') {
            TokenSubType::Error
        } else if value.eq_ignore_ascii_case("TRUE") || value.eq_ignore_ascii_case("FALSE") {
            TokenSubType::Logical
        } else if value.parse::<f64>().is_ok() {
            TokenSubType::Number
        } else {
            TokenSubType::Range
        }
    }

    fn operand_from_slice(source: &str, start: usize, end: usize) -> Self {
        let subtype = Self::classify_operand(&source[start..end]);
        Token::from_slice(source, TokenType::Operand, subtype, start, end)
    }

    /// Opener or closer of a parenthesis, function call or array literal.
    fn subexp_from_slice(source: &str, func: bool, start: usize, end: usize) -> Self {
        let last = source.as_bytes()[end - 1];
        let token_type = if func {
            TokenType::Func
        } else if last == b'{' || last == b'}' {
            TokenType::Array
        } else {
            TokenType::Paren
        };
        let subtype = if last == b')' || last == b'}' {
            TokenSubType::Close
        } else {
            TokenSubType::Open
        };
        Token::from_slice(source, token_type, subtype, start, end)
    }
}

/// Splits formula text (`=...`) into tokens. Text that does not start
/// with `=` becomes a single literal token.
pub struct Tokenizer {
    formula: String,
    pub items: Vec<Token>,
    token_stack: Vec<Token>,
    offset: usize,
    token_start: usize,
    token_end: usize,
}

impl Tokenizer {
    pub fn new(formula: &str) -> Result<Self, TokenizerError> {
        let mut tokenizer = Tokenizer {
            formula: formula.to_string(),
            items: Vec::with_capacity(formula.len() / 2),
            token_stack: Vec::with_capacity(16),
            offset: 0,
            token_start: 0,
            token_end: 0,
        };
        tokenizer.parse()?;
        Ok(tokenizer)
    }

    #[inline]
    fn byte_at(&self, pos: usize) -> u8 {
        self.formula.as_bytes()[pos]
    }

    #[inline]
    fn has_token(&self) -> bool {
        self.token_end > self.token_start
    }

    #[inline]
    fn start_token(&mut self) {
        self.token_start = self.offset;
        self.token_end = self.offset;
    }

    fn parse(&mut self) -> Result<(), TokenizerError> {
        if self.formula.is_empty() {
            return Ok(());
        }

        if self.byte_at(0) != b'=' {
            self.items.push(Token::from_slice(
                &self.formula,
                TokenType::Literal,
                TokenSubType::None,
                0,
                self.formula.len(),
            ));
            return Ok(());
        }

        self.offset = 1;
        self.start_token();

        while self.offset < self.formula.len() {
            if self.consume_exponent_sign() {
                continue;
            }

            let curr = self.byte_at(self.offset);
            if is_token_ender(curr) && self.has_token() {
                self.save_token();
                self.start_token();
            }

            match curr {
                b'"' | b'\'' => self.parse_string()?,
                b'#' => self.parse_error()?,
                b' ' | b'\n' | b'\t' => self.parse_whitespace(),
                b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'>' | b'<' | b'%' => {
                    self.parse_operator()
                }
                b'{' | b'(' => self.parse_opener(),
                b')' | b'}' => self.parse_closer()?,
                b';' | b',' => self.parse_separator(),
                _ => {
                    if !self.has_token() {
                        self.start_token();
                    }
                    self.offset += 1;
                    self.token_end = self.offset;
                }
            }
        }

        self.save_token();

        if let Some(open) = self.token_stack.last() {
            return Err(TokenizerError {
                message: format!("unmatched opener '{}'", open.value),
                pos: open.start,
            });
        }

        Ok(())
    }

    /// `1.5E+3`: the sign belongs to the number being accumulated.
    fn consume_exponent_sign(&mut self) -> bool {
        let curr = self.byte_at(self.offset);
        if (curr == b'+' || curr == b'-') && self.is_exponent_base() {
            self.offset += 1;
            self.token_end = self.offset;
            return true;
        }
        false
    }

    fn is_exponent_base(&self) -> bool {
        if !self.has_token() {
            return false;
        }
        let slice = &self.formula.as_bytes()[self.token_start..self.token_end];
        let [first, middle @ .., last] = slice else {
            return false;
        };
        if !(*last == b'E' || *last == b'e') || !first.is_ascii_digit() {
            return false;
        }
        let mut dot_seen = false;
        middle.iter().all(|&ch| match ch {
            b'0'..=b'9' => true,
            b'.' if !dot_seen => {
                dot_seen = true;
                true
            }
            _ => false,
        })
    }

    fn save_token(&mut self) {
        if self.has_token() {
            let token = Token::operand_from_slice(&self.formula, self.token_start, self.token_end);
            self.items.push(token);
        }
        self.start_token();
    }

    /// `"text"` literals become operands; `'quoted sheet'` names stay part
    /// of the reference being accumulated.
    fn parse_string(&mut self) -> Result<(), TokenizerError> {
        let delim = self.byte_at(self.offset);

        if delim == b'"' && self.has_token() {
            self.save_token();
        }

        let string_start = if delim == b'\'' && self.has_token() {
            self.token_start
        } else {
            self.offset
        };
        self.offset += 1;

        while self.offset < self.formula.len() {
            if self.byte_at(self.offset) == delim {
                self.offset += 1;
                if self.offset < self.formula.len() && self.byte_at(self.offset) == delim {
                    self.offset += 1;
                    continue;
                }
                if delim == b'"' {
                    let token =
                        Token::operand_from_slice(&self.formula, string_start, self.offset);
                    self.items.push(token);
                    self.start_token();
                } else {
                    self.token_start = string_start;
                    self.token_end = self.offset;
                }
                return Ok(());
            }
            self.offset += 1;
        }

        Err(TokenizerError {
            message: "reached end of formula while parsing string".to_string(),
            pos: self.offset,
        })
    }

    fn parse_error(&mut self) -> Result<(), TokenizerError> {
        // `Sheet1!#REF!` keeps its sheet prefix.
        if self.has_token() && self.byte_at(self.token_end - 1) != b'!' {
            self.save_token();
        }
        let error_start = if self.has_token() {
            self.token_start
        } else {
            self.offset
        };

        let rest = &self.formula.as_bytes()[self.offset..];
        for &code in ERROR_CODES {
            let code_bytes = code.as_bytes();
            if rest.len() >= code_bytes.len()
                && rest[..code_bytes.len()].eq_ignore_ascii_case(code_bytes)
            {
                let end = self.offset + code_bytes.len();
                let token = Token::from_slice(
                    &self.formula,
                    TokenType::Operand,
                    TokenSubType::Error,
                    error_start,
                    end,
                );
                self.items.push(token);
                self.offset = end;
                self.start_token();
                return Ok(());
            }
        }

        Err(TokenizerError {
            message: format!("invalid error code at position {}", self.offset),
            pos: self.offset,
        })
    }

    fn parse_whitespace(&mut self) {
        self.save_token();
        let ws_start = self.offset;
        while self.offset < self.formula.len()
            && matches!(self.byte_at(self.offset), b' ' | b'\n' | b'\t')
        {
            self.offset += 1;
        }
        self.items.push(Token::from_slice(
            &self.formula,
            TokenType::Whitespace,
            TokenSubType::None,
            ws_start,
            self.offset,
        ));
        self.start_token();
    }

    fn parse_operator(&mut self) {
        self.save_token();

        if self.offset + 1 < self.formula.len() {
            let two = &self.formula.as_bytes()[self.offset..self.offset + 2];
            if two == b">=" || two == b"<=" || two == b"<>" {
                self.items.push(Token::from_slice(
                    &self.formula,
                    TokenType::OpInfix,
                    TokenSubType::None,
                    self.offset,
                    self.offset + 2,
                ));
                self.offset += 2;
                self.start_token();
                return;
            }
        }

        let token_type = match self.byte_at(self.offset) {
            b'%' => TokenType::OpPostfix,
            b'+' | b'-' => {
                let prev = self
                    .items
                    .iter()
                    .rev()
                    .find(|t| t.token_type != TokenType::Whitespace);
                match prev {
                    Some(p)
                        if p.subtype == TokenSubType::Close
                            || p.token_type == TokenType::OpPostfix
                            || p.token_type == TokenType::Operand =>
                    {
                        TokenType::OpInfix
                    }
                    _ => TokenType::OpPrefix,
                }
            }
            _ => TokenType::OpInfix,
        };

        self.items.push(Token::from_slice(
            &self.formula,
            token_type,
            TokenSubType::None,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
    }

    fn parse_opener(&mut self) {
        let curr = self.byte_at(self.offset);
        let token = if curr == b'(' && self.has_token() {
            Token::subexp_from_slice(&self.formula, true, self.token_start, self.offset + 1)
        } else {
            self.save_token();
            Token::subexp_from_slice(&self.formula, false, self.offset, self.offset + 1)
        };

        self.items.push(token.clone());
        self.token_stack.push(token);
        self.offset += 1;
        self.start_token();
    }

    fn parse_closer(&mut self) -> Result<(), TokenizerError> {
        self.save_token();
        let curr = self.byte_at(self.offset);

        let Some(open) = self.token_stack.pop() else {
            return Err(TokenizerError {
                message: format!("no matching opener for closer at position {}", self.offset),
                pos: self.offset,
            });
        };
        let expects_brace = open.token_type == TokenType::Array;
        if expects_brace != (curr == b'}') {
            return Err(TokenizerError {
                message: "mismatched ( and { pair".to_string(),
                pos: self.offset,
            });
        }

        self.items.push(Token::from_slice(
            &self.formula,
            open.token_type,
            TokenSubType::Close,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
        Ok(())
    }

    fn parse_separator(&mut self) {
        self.save_token();
        let curr = self.byte_at(self.offset);

        let (token_type, subtype) = if curr == b';' {
            (TokenType::Sep, TokenSubType::Row)
        } else {
            match self.token_stack.last() {
                Some(top) if matches!(top.token_type, TokenType::Func | TokenType::Array) => {
                    (TokenType::Sep, TokenSubType::Arg)
                }
                _ => (TokenType::OpInfix, TokenSubType::None),
            }
        };

        self.items.push(Token::from_slice(
            &self.formula,
            token_type,
            subtype,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
    }

    /// Reassemble the source text from tokens.
    pub fn render(&self) -> String {
        match self.items.first() {
            None => String::new(),
            Some(first) if first.token_type == TokenType::Literal => first.value.clone(),
            Some(_) => {
                let body: String = self.items.iter().map(|t| t.value.as_str()).collect();
                format!("={body}")
            }
        }
    }
}

impl TryFrom<&str> for Tokenizer {
    type Error = TokenizerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Tokenizer::new(value)
    }
}
