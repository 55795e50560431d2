use std::{iter::Peekable, ops::Range, str::Chars};

use crate::token::{Token, TokenKind};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Lexes the entire source, producing the token sequence the parser
/// consumes.
///
/// Whitespace and `//` line comments are skipped; the first malformed
/// construct aborts lexing with an [`Error`].
pub fn lex(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).run()
}

/// The tarn lexer.
///
/// A hand-written longest-match scanner over a single read cursor with one
/// character of lookahead. Token literals are source slices: string and
/// character tokens keep their surrounding quotes and their escape
/// sequences undecoded (the parser performs decoding).
struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<Chars<'src>>,
    cursor: usize,
    current_lo: usize,
}

impl Lexer<'_> {
    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::with_capacity(64);
        while let Some(kind) = self.scan_token_kind()? {
            tokens.push(self.produce(kind));
        }
        Ok(tokens)
    }

    /// Scans the next token kind, skipping trivia. Returns `None` at the
    /// end of the source.
    fn scan_token_kind(&mut self) -> Result<Option<TokenKind>> {
        use TokenKind::*;
        loop {
            return Ok(Some(match self.mark_advance() {
                '\0' => return Ok(None),
                c if is_trivia(c) => continue,
                '/' => match self.peek() {
                    '/' => {
                        self.line_comment();
                        continue;
                    }
                    _ => Operator,
                },
                // `==`, `!=`, `<=` and `>=` win over their one-character
                // prefixes by longest match.
                '=' | '<' | '>' | '!' => {
                    if self.peek() == '=' {
                        self.advance();
                    }
                    Operator
                }
                '&' | '|' | '+' | '-' | '*' | '(' | ')' | '{' | '}' | ';' | ',' | '.' => Operator,
                '\'' => self.character()?,
                '"' => self.string()?,
                c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
                c if c.is_ascii_digit() => self.number()?,
                c => return Err(Error::UnexpectedCharacter(c)),
            }));
        }
    }

    fn identifier(&mut self) -> TokenKind {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        // Keywords are not distinguished here; the parser matches their
        // literals directly.
        TokenKind::Identifier
    }

    fn number(&mut self) -> Result<TokenKind> {
        let mut decimal = false;
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == '.' {
            self.advance();
            if !self.peek().is_ascii_digit() {
                return Err(Error::MissingFractionDigits);
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            decimal = true;
        }
        if self.peek() == 'e' {
            self.advance();
            if !self.peek().is_ascii_digit() {
                return Err(Error::MissingExponentDigits);
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            decimal = true;
        }
        Ok(if decimal {
            TokenKind::Decimal
        } else {
            TokenKind::Integer
        })
    }

    fn character(&mut self) -> Result<TokenKind> {
        match self.advance() {
            '\0' | '\n' => return Err(Error::UnterminatedCharacter),
            '\'' => return Err(Error::EmptyCharacter),
            '\\' => self.escape()?,
            _ => {}
        }
        match self.advance() {
            '\'' => Ok(TokenKind::Character),
            _ => Err(Error::UnterminatedCharacter),
        }
    }

    fn string(&mut self) -> Result<TokenKind> {
        loop {
            match self.advance() {
                '"' => return Ok(TokenKind::String),
                '\0' | '\n' => return Err(Error::UnterminatedString),
                '\\' => self.escape()?,
                _ => {}
            }
        }
    }

    /// Validates the escape sequence whose backslash has just been
    /// consumed. The escape is kept raw in the token literal.
    fn escape(&mut self) -> Result<()> {
        match self.advance() {
            'b' | 'n' | 'r' | 't' | '\'' | '"' | '\\' => Ok(()),
            '\0' => Err(Error::UnterminatedEscape),
            c => Err(Error::InvalidEscape(c)),
        }
    }

    fn line_comment(&mut self) {
        while !matches!(self.peek(), '\n' | '\0') {
            self.advance();
        }
    }
}

impl<'src> Lexer<'src> {
    fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
        }
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next character and advances the iterator.
    fn advance(&mut self) -> char {
        self.iter
            .next()
            .inspect(|c| self.cursor += c.len_utf8())
            .unwrap_or('\0')
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the currently marked range.
    fn range(&self) -> Range<usize> {
        self.current_lo..self.cursor
    }

    /// Produces a token from the marked bounds.
    fn produce(&self, kind: TokenKind) -> Token {
        Token::new(kind, &self.src[self.range()])
    }
}

fn is_trivia(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x08')
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unexpected character {0:?}")]
    UnexpectedCharacter(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated character literal")]
    UnterminatedCharacter,
    #[error("empty character literal")]
    EmptyCharacter,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("unterminated escape sequence")]
    UnterminatedEscape,
    #[error("expected digits after decimal point")]
    MissingFractionDigits,
    #[error("expected digits after exponent")]
    MissingExponentDigits,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tests_with_literals() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "" => [],
            " \t\r\n" => [],
            "+ - * / ( ) { } ; , ." => [
                (Operator, "+"),
                (Operator, "-"),
                (Operator, "*"),
                (Operator, "/"),
                (Operator, "("),
                (Operator, ")"),
                (Operator, "{"),
                (Operator, "}"),
                (Operator, ";"),
                (Operator, ","),
                (Operator, "."),
            ],
            "= == != <= >= < > ! & |" => [
                (Operator, "="),
                (Operator, "=="),
                (Operator, "!="),
                (Operator, "<="),
                (Operator, ">="),
                (Operator, "<"),
                (Operator, ">"),
                (Operator, "!"),
                (Operator, "&"),
                (Operator, "|"),
            ],
            // Longest match without separating whitespace.
            "<=== >=!=" => [
                (Operator, "<="),
                (Operator, "=="),
                (Operator, ">="),
                (Operator, "!="),
            ],
            "x _x x1 LET getName" => [
                (Identifier, "x"),
                (Identifier, "_x"),
                (Identifier, "x1"),
                (Identifier, "LET"),
                (Identifier, "getName"),
            ],
            "0 1 007 123456789012345678901234567890" => [
                (Integer, "0"),
                (Integer, "1"),
                (Integer, "007"),
                (Integer, "123456789012345678901234567890"),
            ],
            "1.0 0.125 1e5 1.5e2" => [
                (Decimal, "1.0"),
                (Decimal, "0.125"),
                (Decimal, "1e5"),
                (Decimal, "1.5e2"),
            ],
            r#""" "string" "a\nb" "esc \"quoted\"""# => [
                (String, r#""""#),
                (String, r#""string""#),
                (String, r#""a\nb""#),
                (String, r#""esc \"quoted\"""#),
            ],
            r"'a' '\n' '\''" => [
                (Character, "'a'"),
                (Character, r"'\n'"),
                (Character, r"'\''"),
            ],
            "1 // a comment\n2" => [
                (Integer, "1"),
                (Integer, "2"),
            ],
            "// only a comment" => [],
            "LET x = 1 + 2;" => [
                (Identifier, "LET"),
                (Identifier, "x"),
                (Operator, "="),
                (Integer, "1"),
                (Operator, "+"),
                (Integer, "2"),
                (Operator, ";"),
            ],
        });

        for (input, tokens) in cases {
            assert_eq!(lex(input).unwrap(), tokens.as_slice(), "input: {input}");
        }
    }

    #[test]
    fn tests_with_errors() {
        let cases: &[(&str, Error)] = &[
            ("#", Error::UnexpectedCharacter('#')),
            ("12.", Error::MissingFractionDigits),
            ("1.x", Error::MissingFractionDigits),
            ("1e", Error::MissingExponentDigits),
            ("1.5e;", Error::MissingExponentDigits),
            (r#""unterminated"#, Error::UnterminatedString),
            ("\"line\nbreak\"", Error::UnterminatedString),
            ("'a", Error::UnterminatedCharacter),
            ("'ab'", Error::UnterminatedCharacter),
            ("''", Error::EmptyCharacter),
            (r#""bad \z escape""#, Error::InvalidEscape('z')),
            (r"'\q'", Error::InvalidEscape('q')),
            (r#""trailing \"#, Error::UnterminatedEscape),
        ];
        for &(input, error) in cases {
            assert_eq!(lex(input), Err(error), "input: {input}");
        }
    }

    #[test]
    fn leading_hyphen_is_an_operator() {
        let tokens = lex("-1").unwrap();
        assert_eq!(tokens[0], Token::new(TokenKind::Operator, "-"));
        assert_eq!(tokens[1], Token::new(TokenKind::Integer, "1"));
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $literal:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![$(Token::new($kind, $literal)),*],
            )),*]
        }};
    }
    use cases;
}
