//! Bit-exact parsing of numeric literal tokens.
//!
//! The lexer is an external collaborator: it hands over tokens already
//! classified as numeric, and the parsers here produce exact values,
//! recording recoverable errors against the source offset and consuming
//! the remainder of an offending token so parsing can resynchronize.

mod literals;

pub use literals::{
    parse_f32, parse_f64, parse_i16, parse_i32, parse_i64, parse_i8, parse_u32, parse_v128,
    try_parse_u64, try_parse_uptr, FloatBits,
};

/// Numeric token classes produced by the lexer.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    DecimalInt,
    HexInt,
    DecimalFloat,
    HexFloat,
    FloatNan,
    FloatInf,
    VecI8x16,
    VecI16x8,
    VecI32x4,
    VecI64x2,
    VecF32x4,
    VecF64x2,
}

#[derive(Copy, Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character (its sign, if any).
    pub begin: usize,
}

/// A recoverable parse error, anchored to a source offset.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

#[derive(Debug)]
pub struct ParseState<'s> {
    source: &'s str,
    errors: Vec<ParseError>,
}

impl<'s> ParseState<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            errors: Vec::new(),
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub(crate) fn record(&mut self, offset: usize, message: impl Into<String>) {
        self.errors.push(ParseError {
            offset,
            message: message.into(),
        });
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }
}

/// A token stream position over a [`ParseState`].
#[derive(Debug)]
pub struct CursorState<'s, 'p> {
    pub state: &'p mut ParseState<'s>,
    tokens: &'p [Token],
    next: usize,
}

impl<'s, 'p> CursorState<'s, 'p> {
    pub fn new(state: &'p mut ParseState<'s>, tokens: &'p [Token]) -> Self {
        Self {
            state,
            tokens,
            next: 0,
        }
    }

    pub fn peek(&self) -> Option<Token> {
        self.tokens.get(self.next).copied()
    }

    pub fn bump(&mut self) {
        self.next += 1;
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.tokens.len()
    }

    /// Records `message` against the next token (or end of input).
    pub(crate) fn error_at_next_token(&mut self, message: impl Into<String>) {
        let offset = self
            .peek()
            .map_or(self.state.source.len(), |token| token.begin);
        self.state.record(offset, message);
    }
}

/// Returned after an error was recorded and the parser substituted a
/// best-effort value; the caller should resynchronize.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Recover;
