use std::fmt;

/// A single lexed token: its kind plus the literal text it was built from.
///
/// The literal is the original source slice; string and character tokens
/// keep their surrounding quotes, and escape sequences are left undecoded.
/// Decoding is the parser's job (see [`crate::parser`]).
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>) -> Token {
        Token {
            kind,
            literal: literal.into(),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:?})", self.kind, self.literal)
    }
}

// Keywords are deliberately absent here: they are reserved identifiers,
// lexed as plain identifiers and recognized by the parser through literal
// matching.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,
    Decimal,
    Character,
    String,
    Operator,
}

/// Reserved identifiers, rejected by the parser in variable and function
/// name positions.
pub static KEYWORDS: phf::Set<&'static str> = phf::phf_set! {
    "LET",
    "DEF",
    "IF",
    "ELSE",
    "FOR",
    "IN",
    "DO",
    "END",
    "RETURN",
    "OBJECT",
    "AND",
    "OR",
    "TRUE",
    "FALSE",
    "NIL",
};
