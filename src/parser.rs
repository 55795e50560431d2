use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::{
    ast::{
        Assignment, BinaryOp, Def, Expr, Expression, For, If, Let, Literal, ObjectExpr, Return,
        Source, Stmt,
    },
    token::{Token, TokenKind, KEYWORDS},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Parses the token sequence into an untyped [`Source`] tree.
///
/// A successful parse consumes every token; the first syntax error aborts
/// parsing with no recovery.
pub fn parse(tokens: Vec<Token>) -> Result<Source> {
    Parser { tokens, cursor: 0 }.parse_source()
}

/// The tarn parser: recursive descent, with operator precedence encoded in
/// the grammar stack (`logical` > `comparison` > `additive` >
/// `multiplicative` > `secondary` > `primary`).
///
/// The token stream is traversed with [`Parser::peek`] and [`Parser::eat`],
/// which accept a [`Pattern`]: either a token kind or an exact literal.
/// Keywords are not lexically distinguished, so statement dispatch matches
/// on literals like `"LET"`.
struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    fn parse_source(mut self) -> Result<Source> {
        let mut statements = Vec::new();
        while self.cursor < self.tokens.len() {
            statements.push(self.parse_stmt()?);
        }
        Ok(Source { statements })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        if self.peek("LET") {
            self.parse_let_stmt().map(Stmt::Let)
        } else if self.peek("DEF") {
            self.parse_def_stmt().map(Stmt::Def)
        } else if self.peek("IF") {
            self.parse_if_stmt().map(Stmt::If)
        } else if self.peek("FOR") {
            self.parse_for_stmt().map(Stmt::For)
        } else if self.peek("RETURN") {
            self.parse_return_stmt().map(Stmt::Return)
        } else {
            self.parse_expression_or_assignment_stmt()
        }
    }

    fn parse_let_stmt(&mut self) -> Result<Let> {
        self.consume("LET", "'LET'")?;
        let name = self.identifier("variable name")?;
        let ty = if self.eat(":") {
            Some(self.identifier("type name")?)
        } else {
            None
        };
        let value = if self.eat("=") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.consume(";", "';' after let statement")?;
        Ok(Let { name, ty, value })
    }

    fn parse_def_stmt(&mut self) -> Result<Def> {
        self.consume("DEF", "'DEF'")?;
        let name = self.identifier("function name")?;
        self.consume("(", "'(' after function name")?;

        let mut parameters = Vec::new();
        let mut parameter_types = Vec::new();
        if !self.eat(")") {
            loop {
                parameters.push(self.identifier("parameter name")?);
                parameter_types.push(if self.eat(":") {
                    Some(self.identifier("parameter type")?)
                } else {
                    None
                });
                if !self.eat(",") {
                    break;
                }
            }
            self.consume(")", "')' after parameters")?;
        }

        let return_type = if self.eat(":") {
            Some(self.identifier("return type")?)
        } else {
            None
        };

        self.consume("DO", "'DO' after function signature")?;
        let mut body = Vec::new();
        while !self.eat("END") {
            if self.at_end() {
                return Err(self.expected("'END' after function body"));
            }
            body.push(self.parse_stmt()?);
        }

        Ok(Def {
            name,
            parameters,
            parameter_types,
            return_type,
            body,
        })
    }

    fn parse_if_stmt(&mut self) -> Result<If> {
        self.consume("IF", "'IF'")?;
        let condition = self.parse_expr()?;
        self.consume("DO", "'DO' after condition")?;

        let mut then_body = Vec::new();
        while !self.peek("ELSE") && !self.peek("END") {
            if self.at_end() {
                return Err(self.expected("'END' after if statement"));
            }
            then_body.push(self.parse_stmt()?);
        }

        let mut else_body = Vec::new();
        if self.eat("ELSE") {
            while !self.peek("END") {
                if self.at_end() {
                    return Err(self.expected("'END' after else body"));
                }
                else_body.push(self.parse_stmt()?);
            }
        }

        self.consume("END", "'END' after if statement")?;
        Ok(If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_for_stmt(&mut self) -> Result<For> {
        self.consume("FOR", "'FOR'")?;
        let name = self.identifier("loop variable")?;
        self.consume("IN", "'IN' after loop variable")?;
        let iterable = self.parse_expr()?;
        self.consume("DO", "'DO' after iterable")?;

        let mut body = Vec::new();
        while !self.eat("END") {
            if self.at_end() {
                return Err(self.expected("'END' after for loop"));
            }
            body.push(self.parse_stmt()?);
        }

        Ok(For {
            name,
            iterable,
            body,
        })
    }

    fn parse_return_stmt(&mut self) -> Result<Return> {
        self.consume("RETURN", "'RETURN'")?;
        if self.eat(";") {
            return Ok(Return { value: None });
        }
        let value = self.parse_expr()?;
        self.consume(";", "';' after return value")?;
        Ok(Return { value: Some(value) })
    }

    fn parse_expression_or_assignment_stmt(&mut self) -> Result<Stmt> {
        let expression = self.parse_expr()?;
        if self.eat("=") {
            let value = self.parse_expr()?;
            self.consume(";", "';' after assignment")?;
            Ok(Stmt::Assignment(Assignment {
                target: expression,
                value,
            }))
        } else {
            self.consume(";", "';' after expression")?;
            Ok(Stmt::Expression(Expression { expression }))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_logical_expr()
    }

    fn parse_logical_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_comparison_expr()?;
        loop {
            let op = if self.eat("AND") {
                BinaryOp::And
            } else if self.eat("OR") {
                BinaryOp::Or
            } else {
                break;
            };
            let right = self.parse_comparison_expr()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_additive_expr()?;
        loop {
            let op = if self.eat("==") {
                BinaryOp::Eq
            } else if self.eat("!=") {
                BinaryOp::Ne
            } else if self.eat("<=") {
                BinaryOp::Le
            } else if self.eat(">=") {
                BinaryOp::Ge
            } else if self.eat("<") {
                BinaryOp::Lt
            } else if self.eat(">") {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.parse_additive_expr()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_additive_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_multiplicative_expr()?;
        loop {
            let op = if self.eat("+") {
                BinaryOp::Add
            } else if self.eat("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative_expr()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_secondary_expr()?;
        loop {
            let op = if self.eat("*") {
                BinaryOp::Mul
            } else if self.eat("/") {
                BinaryOp::Div
            } else {
                break;
            };
            let right = self.parse_secondary_expr()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    /// Property accesses and method calls, chained left-to-right.
    fn parse_secondary_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary_expr()?;
        while self.eat(".") {
            let name = self.identifier("member name after '.'")?;
            if self.eat("(") {
                let arguments = self.parse_arguments()?;
                expr = Expr::Method {
                    receiver: Box::new(expr),
                    name,
                    arguments,
                };
            } else {
                expr = Expr::Property {
                    receiver: Box::new(expr),
                    name,
                };
            }
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        if self.peek(TokenKind::Integer) {
            let literal = self.advance().literal;
            let value = BigInt::from_str(&literal).expect("lexer produced a digit-only literal");
            return Ok(Expr::Literal(Literal::Integer(value)));
        }
        if self.peek(TokenKind::Decimal) {
            let literal = self.advance().literal;
            let value =
                BigDecimal::from_str(&literal).expect("lexer produced a well-formed decimal");
            return Ok(Expr::Literal(Literal::Decimal(value)));
        }
        if self.peek(TokenKind::String) {
            let literal = self.advance().literal;
            return Ok(Expr::Literal(Literal::String(decode_string(&literal))));
        }
        if self.peek(TokenKind::Character) {
            let literal = self.advance().literal;
            return Ok(Expr::Literal(Literal::Character(decode_character(&literal))));
        }
        if self.eat("TRUE") {
            return Ok(Expr::Literal(Literal::Boolean(true)));
        }
        if self.eat("FALSE") {
            return Ok(Expr::Literal(Literal::Boolean(false)));
        }
        if self.eat("NIL") {
            return Ok(Expr::Literal(Literal::Nil));
        }
        if self.eat("(") {
            let expr = self.parse_expr()?;
            self.consume(")", "')' after grouped expression")?;
            return Ok(Expr::Group(Box::new(expr)));
        }
        if self.peek("OBJECT") {
            return self.parse_object_expr().map(Expr::ObjectExpr);
        }
        if self.peek(TokenKind::Identifier) {
            return self.parse_variable_or_function_expr();
        }
        Err(self.expected("expression"))
    }

    fn parse_object_expr(&mut self) -> Result<ObjectExpr> {
        self.consume("OBJECT", "'OBJECT'")?;

        let name = if self.peek(TokenKind::Identifier) && !self.is_keyword_next() {
            Some(self.identifier("object name")?)
        } else {
            None
        };

        self.consume("DO", "'DO' after object name")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.peek("END") {
            if self.peek("LET") {
                fields.push(self.parse_let_stmt()?);
            } else if self.peek("DEF") {
                methods.push(self.parse_def_stmt()?);
            } else {
                return Err(self.expected("'LET', 'DEF' or 'END' in object body"));
            }
        }
        self.consume("END", "'END' after object body")?;

        Ok(ObjectExpr {
            name,
            fields,
            methods,
        })
    }

    fn parse_variable_or_function_expr(&mut self) -> Result<Expr> {
        let name = self.identifier("expression")?;
        if self.eat("(") {
            let arguments = self.parse_arguments()?;
            return Ok(Expr::Function { name, arguments });
        }
        Ok(Expr::Variable(name))
    }

    /// Parses a comma-separated argument list; the opening parenthesis has
    /// already been consumed.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut arguments = Vec::new();
        if self.eat(")") {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_expr()?);
            if !self.eat(",") {
                break;
            }
        }
        self.consume(")", "')' after arguments")?;
        Ok(arguments)
    }
}

impl Parser {
    fn at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    /// Returns true if the current token matches the pattern.
    fn peek<'a>(&self, pattern: impl Into<Pattern<'a>>) -> bool {
        let pattern = pattern.into();
        self.peek_token().is_some_and(|t| pattern.matches(t))
    }

    /// Advances past the current token if it matches the pattern.
    fn eat<'a>(&mut self, pattern: impl Into<Pattern<'a>>) -> bool {
        let matched = self.peek(pattern);
        if matched {
            self.cursor += 1;
        }
        matched
    }

    /// Returns the current token and advances. Only called after a
    /// successful peek.
    fn advance(&mut self) -> Token {
        let token = self.tokens[self.cursor].clone();
        self.cursor += 1;
        token
    }

    /// Advances past the current token if it matches, or fails with an
    /// "expected ..." error naming the local context.
    fn consume<'a>(&mut self, pattern: impl Into<Pattern<'a>>, expected: &'static str) -> Result<()> {
        if self.eat(pattern) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    /// Consumes an identifier token, rejecting reserved words.
    fn identifier(&mut self, expected: &'static str) -> Result<String> {
        if !self.peek(TokenKind::Identifier) {
            return Err(self.expected(expected));
        }
        if self.is_keyword_next() {
            let token = self.advance();
            return Err(Error::ReservedWord(token.literal));
        }
        Ok(self.advance().literal)
    }

    fn is_keyword_next(&self) -> bool {
        self.peek_token()
            .is_some_and(|t| KEYWORDS.contains(t.literal.as_str()))
    }

    fn expected(&self, expected: &'static str) -> Error {
        match self.peek_token() {
            Some(token) => Error::Unexpected {
                expected,
                found: token.literal.clone(),
            },
            None => Error::UnexpectedEof { expected },
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// A token pattern: matches on the token's kind or on its exact literal.
#[derive(Copy, Clone)]
enum Pattern<'a> {
    Kind(TokenKind),
    Literal(&'a str),
}

impl Pattern<'_> {
    fn matches(&self, token: &Token) -> bool {
        match self {
            Pattern::Kind(kind) => token.kind == *kind,
            Pattern::Literal(literal) => token.literal == *literal,
        }
    }
}

impl From<TokenKind> for Pattern<'static> {
    fn from(kind: TokenKind) -> Self {
        Pattern::Kind(kind)
    }
}

impl<'a> From<&'a str> for Pattern<'a> {
    fn from(literal: &'a str) -> Self {
        Pattern::Literal(literal)
    }
}

/// Strips the surrounding quotes and decodes escape sequences. The lexer
/// guarantees well-formedness.
fn decode_string(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut buf = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let escape = chars.next().expect("lexer validated the escape");
            buf.push(decode_escape(escape));
        } else {
            buf.push(c);
        }
    }
    buf
}

fn decode_character(raw: &str) -> char {
    let inner = &raw[1..raw.len() - 1];
    let mut chars = inner.chars();
    match chars.next().expect("lexer rejected empty character literals") {
        '\\' => decode_escape(chars.next().expect("lexer validated the escape")),
        c => c,
    }
}

fn decode_escape(escape: char) -> char {
    match escape {
        'b' => '\x08',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '\'' => '\'',
        '"' => '"',
        '\\' => '\\',
        _ => unreachable!("lexer rejected unknown escape '\\{escape}'"),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected {expected}, found '{found}'")]
    Unexpected {
        expected: &'static str,
        found: String,
    },
    #[error("expected {expected}, found end of input")]
    UnexpectedEof { expected: &'static str },
    #[error("'{0}' is a reserved word")]
    ReservedWord(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use pretty_assertions::assert_eq;

    fn parse_source(input: &str) -> Source {
        parse(lexer::lex(input).unwrap()).unwrap()
    }

    fn parse_single_expr(input: &str) -> Expr {
        let source = parse_source(&format!("{input};"));
        let [Stmt::Expression(stmt)] = source.statements.as_slice() else {
            panic!("expected a single expression statement");
        };
        stmt.expression.clone()
    }

    fn int(value: i64) -> Expr {
        Expr::Literal(Literal::Integer(BigInt::from(value)))
    }

    #[test]
    fn let_statement_forms() {
        let source = parse_source("LET a; LET b: Integer; LET c = 1; LET d: Decimal = 1.5;");
        assert_eq!(
            source.statements,
            vec![
                Stmt::Let(Let {
                    name: "a".into(),
                    ty: None,
                    value: None,
                }),
                Stmt::Let(Let {
                    name: "b".into(),
                    ty: Some("Integer".into()),
                    value: None,
                }),
                Stmt::Let(Let {
                    name: "c".into(),
                    ty: None,
                    value: Some(int(1)),
                }),
                Stmt::Let(Let {
                    name: "d".into(),
                    ty: Some("Decimal".into()),
                    value: Some(Expr::Literal(Literal::Decimal("1.5".parse().unwrap()))),
                }),
            ],
        );
    }

    #[test]
    fn def_statement_with_annotations() {
        let source = parse_source("DEF f(a: Integer, b): Decimal DO RETURN b; END");
        assert_eq!(
            source.statements,
            vec![Stmt::Def(Def {
                name: "f".into(),
                parameters: vec!["a".into(), "b".into()],
                parameter_types: vec![Some("Integer".into()), None],
                return_type: Some("Decimal".into()),
                body: vec![Stmt::Return(Return {
                    value: Some(Expr::Variable("b".into())),
                })],
            })],
        );
    }

    #[test]
    fn if_statement_with_else() {
        let source = parse_source("IF TRUE DO 1; ELSE 2; END");
        assert_eq!(
            source.statements,
            vec![Stmt::If(If {
                condition: Expr::Literal(Literal::Boolean(true)),
                then_body: vec![Stmt::Expression(Expression { expression: int(1) })],
                else_body: vec![Stmt::Expression(Expression { expression: int(2) })],
            })],
        );
    }

    #[test]
    fn for_statement() {
        let source = parse_source("FOR i IN range(0, 3) DO print(i); END");
        assert_eq!(
            source.statements,
            vec![Stmt::For(For {
                name: "i".into(),
                iterable: Expr::Function {
                    name: "range".into(),
                    arguments: vec![int(0), int(3)],
                },
                body: vec![Stmt::Expression(Expression {
                    expression: Expr::Function {
                        name: "print".into(),
                        arguments: vec![Expr::Variable("i".into())],
                    },
                })],
            })],
        );
    }

    #[test]
    fn assignment_statement() {
        let source = parse_source("x = 2; o.p = 3;");
        assert_eq!(
            source.statements,
            vec![
                Stmt::Assignment(Assignment {
                    target: Expr::Variable("x".into()),
                    value: int(2),
                }),
                Stmt::Assignment(Assignment {
                    target: Expr::Property {
                        receiver: Box::new(Expr::Variable("o".into())),
                        name: "p".into(),
                    },
                    value: int(3),
                }),
            ],
        );
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(
            parse_single_expr("1 + 2 * 3"),
            binary(BinaryOp::Add, int(1), binary(BinaryOp::Mul, int(2), int(3))),
        );
        assert_eq!(
            parse_single_expr("1 - 2 - 3"),
            binary(BinaryOp::Sub, binary(BinaryOp::Sub, int(1), int(2)), int(3)),
        );
        assert_eq!(
            parse_single_expr("1 < 2 AND 3 >= 4"),
            binary(
                BinaryOp::And,
                binary(BinaryOp::Lt, int(1), int(2)),
                binary(BinaryOp::Ge, int(3), int(4)),
            ),
        );
        assert_eq!(
            parse_single_expr("(1 + 2) * 3"),
            binary(
                BinaryOp::Mul,
                Expr::Group(Box::new(binary(BinaryOp::Add, int(1), int(2)))),
                int(3),
            ),
        );
    }

    #[test]
    fn secondary_chains() {
        assert_eq!(
            parse_single_expr("o.a.m(1).b"),
            Expr::Property {
                receiver: Box::new(Expr::Method {
                    receiver: Box::new(Expr::Property {
                        receiver: Box::new(Expr::Variable("o".into())),
                        name: "a".into(),
                    }),
                    name: "m".into(),
                    arguments: vec![int(1)],
                }),
                name: "b".into(),
            },
        );
    }

    #[test]
    fn literal_decoding() {
        assert_eq!(
            parse_single_expr(r#""a\nb\\c\"d""#),
            Expr::Literal(Literal::String("a\nb\\c\"d".into())),
        );
        assert_eq!(
            parse_single_expr(r"'\t'"),
            Expr::Literal(Literal::Character('\t')),
        );
        assert_eq!(parse_single_expr("NIL"), Expr::Literal(Literal::Nil));
        assert_eq!(
            parse_single_expr("FALSE"),
            Expr::Literal(Literal::Boolean(false)),
        );
    }

    #[test]
    fn object_expression() {
        let expr = parse_single_expr("OBJECT Point DO LET x = 1; DEF get() DO RETURN 1; END END");
        assert_eq!(
            expr,
            Expr::ObjectExpr(ObjectExpr {
                name: Some("Point".into()),
                fields: vec![Let {
                    name: "x".into(),
                    ty: None,
                    value: Some(int(1)),
                }],
                methods: vec![Def {
                    name: "get".into(),
                    parameters: vec![],
                    parameter_types: vec![],
                    return_type: None,
                    body: vec![Stmt::Return(Return {
                        value: Some(int(1)),
                    })],
                }],
            }),
        );
    }

    #[test]
    fn anonymous_object_expression() {
        let expr = parse_single_expr("OBJECT DO END");
        assert_eq!(
            expr,
            Expr::ObjectExpr(ObjectExpr {
                name: None,
                fields: vec![],
                methods: vec![],
            }),
        );
    }

    #[test]
    fn error_cases() {
        let cases: &[(&str, Error)] = &[
            (
                "LET x",
                Error::UnexpectedEof {
                    expected: "';' after let statement",
                },
            ),
            (
                "1 + ;",
                Error::Unexpected {
                    expected: "expression",
                    found: ";".into(),
                },
            ),
            (
                "IF TRUE DO 1;",
                Error::UnexpectedEof {
                    expected: "'END' after if statement",
                },
            ),
            ("LET IF = 1;", Error::ReservedWord("IF".into())),
            (
                "OBJECT DO 1; END",
                Error::Unexpected {
                    expected: "'LET', 'DEF' or 'END' in object body",
                    found: "1".into(),
                },
            ),
        ];
        for (input, error) in cases {
            let tokens = lexer::lex(input).unwrap();
            assert_eq!(parse(tokens).unwrap_err(), *error, "input: {input}");
        }
    }
}
