// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WQL statement parser and evaluator for the in-memory provider.
//!
//! # Supported Syntax
//!
//! ```text
//! statement  ::= SELECT fields FROM class [WITHIN number] [WHERE expression]
//! fields     ::= '*' | field (',' field)*
//!
//! expression ::= condition
//!              | expression AND expression
//!              | expression OR expression
//!              | NOT expression
//!              | '(' expression ')'
//!
//! condition  ::= field operator literal
//!              | field ISA string
//!              | field IS [NOT] NULL
//!
//! field      ::= identifier ('.' identifier)*
//! operator   ::= '>' | '<' | '>=' | '<=' | '=' | '<>' | '!='
//! literal    ::= integer | float | string | TRUE | FALSE | NULL
//! ```
//!
//! String literals use backslash escapes (`'C:\\Windows'`).

use crate::value::Variant;
use std::cmp::Ordering;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

/// Literal on the right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// Parsed `WHERE` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Comparison {
        field: String,
        op: Operator,
        value: Literal,
    },
    /// `field ISA 'Class'`
    Isa { field: String, class: String },
    /// `field IS [NOT] NULL`
    IsNull { field: String, negated: bool },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    /// No `WHERE` clause.
    True,
}

/// A parsed `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Selected fields; empty for `*`.
    pub fields: Vec<String>,
    /// Class after `FROM`.
    pub class: String,
    /// Polling interval from `WITHIN`, in seconds.
    pub within: Option<f64>,
    pub condition: Expression,
}

/// Parse failure with a short reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),
    Operator(Operator),
    Star,
    Comma,
    LParen,
    RParen,
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.next_char();
        }
    }

    // Dotted identifiers (`TargetInstance.Name`) lex as one token
    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.next_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if self.peek_char() == Some('-') {
            self.next_char();
        }

        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                self.next_char();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.next_char();
            } else {
                break;
            }
        }

        let text = &self.input[start..self.pos];
        let bad = || ParseError(format!("Invalid number: {}", text));
        if has_dot {
            text.parse().map(Token::Float).map_err(|_| bad())
        } else {
            text.parse().map(Token::Integer).map_err(|_| bad())
        }
    }

    fn read_string(&mut self, quote: char) -> ParseResult<String> {
        self.next_char(); // opening quote
        let mut out = String::new();
        while let Some(ch) = self.next_char() {
            match ch {
                '\\' => match self.next_char() {
                    Some(escaped) => out.push(escaped),
                    None => break,
                },
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(ParseError("Unterminated string".to_string()))
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let ch = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        match ch {
            '>' | '<' | '=' | '!' => {
                self.next_char();
                let next = self.peek_char();
                let op = match (ch, next) {
                    ('>', Some('=')) => Operator::Ge,
                    ('<', Some('=')) => Operator::Le,
                    ('<', Some('>')) | ('!', Some('=')) => Operator::Ne,
                    ('>', _) => return Ok(Token::Operator(Operator::Gt)),
                    ('<', _) => return Ok(Token::Operator(Operator::Lt)),
                    ('=', _) => return Ok(Token::Operator(Operator::Eq)),
                    _ => return Err(ParseError("Expected '=' after '!'".to_string())),
                };
                self.next_char();
                Ok(Token::Operator(op))
            }
            '*' => {
                self.next_char();
                Ok(Token::Star)
            }
            ',' => {
                self.next_char();
                Ok(Token::Comma)
            }
            '(' => {
                self.next_char();
                Ok(Token::LParen)
            }
            ')' => {
                self.next_char();
                Ok(Token::RParen)
            }
            '\'' | '"' => self.read_string(ch).map(Token::String),
            c if c.is_ascii_digit()
                || (c == '-'
                    && self.input[self.pos + 1..].starts_with(|d: char| d.is_ascii_digit())) =>
            {
                self.read_number()
            }
            c if c.is_alphabetic() || c == '_' => Ok(Token::Identifier(self.read_identifier())),
            c => Err(ParseError(format!("Unexpected character: '{}'", c))),
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current, Token::Identifier(id) if id.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if !self.at_keyword(keyword) {
            return Err(ParseError(format!(
                "Expected {}, got {:?}",
                keyword, self.current
            )));
        }
        self.advance()
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match &self.current {
            Token::Identifier(id) => {
                let id = id.clone();
                self.advance()?;
                Ok(id)
            }
            other => Err(ParseError(format!("Expected identifier, got {:?}", other))),
        }
    }

    fn parse_select(&mut self) -> ParseResult<Select> {
        self.expect_keyword("SELECT")?;

        let mut fields = Vec::new();
        if self.current == Token::Star {
            self.advance()?;
        } else {
            fields.push(self.identifier()?);
            while self.current == Token::Comma {
                self.advance()?;
                fields.push(self.identifier()?);
            }
        }

        self.expect_keyword("FROM")?;
        let class = self.identifier()?;

        let mut within = None;
        if self.at_keyword("WITHIN") {
            self.advance()?;
            within = Some(match self.current {
                Token::Integer(n) => n as f64,
                Token::Float(f) => f,
                _ => return Err(ParseError("Expected interval after WITHIN".to_string())),
            });
            self.advance()?;
        }

        let condition = if self.at_keyword("WHERE") {
            self.advance()?;
            self.parse_or()?
        } else {
            Expression::True
        };

        if self.current != Token::Eof {
            return Err(ParseError(format!(
                "Unexpected trailing input: {:?}",
                self.current
            )));
        }

        Ok(Select {
            fields,
            class,
            within,
            condition,
        })
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_and()?;
        while self.at_keyword("OR") {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_not()?;
        while self.at_keyword("AND") {
            self.advance()?;
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expression> {
        if self.at_keyword("NOT") {
            self.advance()?;
            let expr = self.parse_not()?;
            return Ok(Expression::Not(Box::new(expr)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        if self.current == Token::LParen {
            self.advance()?;
            let expr = self.parse_or()?;
            if self.current != Token::RParen {
                return Err(ParseError("Expected closing parenthesis".to_string()));
            }
            self.advance()?;
            return Ok(expr);
        }
        self.parse_condition()
    }

    fn parse_condition(&mut self) -> ParseResult<Expression> {
        let field = self.identifier()?;

        if self.at_keyword("ISA") {
            self.advance()?;
            return match &self.current {
                Token::String(class) => {
                    let class = class.clone();
                    self.advance()?;
                    Ok(Expression::Isa { field, class })
                }
                other => Err(ParseError(format!("Expected class name, got {:?}", other))),
            };
        }

        if self.at_keyword("IS") {
            self.advance()?;
            let negated = self.at_keyword("NOT");
            if negated {
                self.advance()?;
            }
            self.expect_keyword("NULL")?;
            return Ok(Expression::IsNull { field, negated });
        }

        let op = match self.current {
            Token::Operator(op) => op,
            ref other => return Err(ParseError(format!("Expected operator, got {:?}", other))),
        };
        self.advance()?;

        let value = match &self.current {
            Token::Integer(n) => Literal::Integer(*n),
            Token::Float(f) => Literal::Float(*f),
            Token::String(s) => Literal::String(s.clone()),
            Token::Identifier(id) if id.eq_ignore_ascii_case("TRUE") => Literal::Boolean(true),
            Token::Identifier(id) if id.eq_ignore_ascii_case("FALSE") => Literal::Boolean(false),
            Token::Identifier(id) if id.eq_ignore_ascii_case("NULL") => Literal::Null,
            other => return Err(ParseError(format!("Expected literal, got {:?}", other))),
        };
        self.advance()?;

        Ok(Expression::Comparison { field, op, value })
    }
}

/// Parse a WQL `SELECT` statement.
pub fn parse_select(wql: &str) -> ParseResult<Select> {
    let trimmed = wql.trim();
    if trimmed.is_empty() {
        return Err(ParseError("Empty query".to_string()));
    }
    Parser::new(trimmed)?.parse_select()
}

/// Field access for expression evaluation.
pub trait FieldSource {
    /// Value of a (possibly dotted) field.
    fn field(&self, path: &str) -> Option<Variant>;

    /// True when the object at `path` is an instance of `class` or a subclass.
    fn isa(&self, path: &str, class: &str) -> bool;
}

impl Expression {
    /// Evaluate against an object.
    pub fn matches(&self, source: &dyn FieldSource) -> bool {
        match self {
            Expression::True => true,
            Expression::Comparison { field, op, value } => {
                let actual = source.field(field).unwrap_or(Variant::Null);
                compare(&actual, *op, value)
            }
            Expression::Isa { field, class } => source.isa(field, class),
            Expression::IsNull { field, negated } => {
                let is_null = source.field(field).map_or(true, |v| v.is_null());
                is_null != *negated
            }
            Expression::And(left, right) => left.matches(source) && right.matches(source),
            Expression::Or(left, right) => left.matches(source) || right.matches(source),
            Expression::Not(inner) => !inner.matches(source),
        }
    }
}

fn compare(actual: &Variant, op: Operator, literal: &Literal) -> bool {
    let ordering = match literal {
        Literal::Null => {
            return match op {
                Operator::Eq => actual.is_null(),
                Operator::Ne => !actual.is_null(),
                _ => false,
            }
        }
        _ if actual.is_null() => return false,
        Literal::String(expected) => {
            let text = actual.to_string();
            Some(text.to_lowercase().cmp(&expected.to_lowercase()))
        }
        Literal::Integer(expected) => match actual.as_i64() {
            Some(v) => Some(v.cmp(expected)),
            None => actual.as_f64().and_then(|v| v.partial_cmp(&(*expected as f64))),
        },
        Literal::Float(expected) => actual
            .as_f64()
            .or_else(|| actual.as_i64().map(|v| v as f64))
            .and_then(|v| v.partial_cmp(expected)),
        Literal::Boolean(expected) => actual.as_bool().map(|v| v.cmp(expected)),
    };

    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fields(HashMap<&'static str, Variant>);

    impl FieldSource for Fields {
        fn field(&self, path: &str) -> Option<Variant> {
            self.0.get(path).cloned()
        }

        fn isa(&self, path: &str, class: &str) -> bool {
            path == "TargetInstance" && class == "Win32_Process"
        }
    }

    #[test]
    fn test_parse_select_star() {
        let select = parse_select("SELECT * FROM Win32_Process").expect("parse");
        assert!(select.fields.is_empty());
        assert_eq!(select.class, "Win32_Process");
        assert_eq!(select.condition, Expression::True);
    }

    #[test]
    fn test_parse_fields_and_where() {
        let select =
            parse_select("select Name, Handle from Win32_Process where Name = 'notepad.exe'")
                .expect("parse");
        assert_eq!(select.fields, ["Name", "Handle"]);
        assert!(matches!(
            select.condition,
            Expression::Comparison { op: Operator::Eq, .. }
        ));
    }

    #[test]
    fn test_parse_notification_query() {
        let select = parse_select(
            "SELECT * FROM __InstanceCreationEvent WITHIN 2 WHERE TargetInstance ISA 'Win32_Process' AND TargetInstance.Name = 'x'",
        )
        .expect("parse");
        assert_eq!(select.within, Some(2.0));
        match select.condition {
            Expression::And(left, right) => {
                assert_eq!(
                    *left,
                    Expression::Isa {
                        field: "TargetInstance".into(),
                        class: "Win32_Process".into()
                    }
                );
                assert!(
                    matches!(*right, Expression::Comparison { ref field, .. } if field == "TargetInstance.Name")
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_backslash_escapes() {
        let select =
            parse_select(r"SELECT * FROM Win32_Directory WHERE Name = 'C:\\Windows'").expect("parse");
        match select.condition {
            Expression::Comparison { value, .. } => {
                assert_eq!(value, Literal::String(r"C:\Windows".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_select("").is_err());
        assert!(parse_select("SELECT FROM").is_err());
        assert!(parse_select("SELECT * FROM X WHERE").is_err());
        assert!(parse_select("SELECT * FROM X WHERE Name = 'open").is_err());
        assert!(parse_select("SELECT * FROM X trailing").is_err());
    }

    #[test]
    fn test_evaluate() {
        let mut map = HashMap::new();
        map.insert("Name", Variant::from("Notepad.exe"));
        map.insert("Priority", Variant::U32(8));
        let fields = Fields(map);

        let eval = |wql: &str| {
            parse_select(wql)
                .expect("parse")
                .condition
                .matches(&fields)
        };
        assert!(eval("SELECT * FROM X WHERE Name = 'notepad.exe'"));
        assert!(eval("SELECT * FROM X WHERE Priority >= 8 AND NOT Priority > 8"));
        assert!(eval("SELECT * FROM X WHERE Missing IS NULL OR Priority = 1"));
        assert!(eval("SELECT * FROM X WHERE TargetInstance ISA 'Win32_Process'"));
        assert!(!eval("SELECT * FROM X WHERE Name <> 'Notepad.exe'"));
    }
}
