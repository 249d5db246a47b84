// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! A small expression language for `dsl` matchers, extractors and
//! `{{helper(...)}}` placeholders.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := compare ( "&&" compare )*
//! compare := unary ( ("==" | "!=" | "<" | "<=" | ">" | ">=") unary )?
//! unary   := "!" unary | primary
//! primary := literal | identifier | call | "(" or ")"
//! call    := identifier "(" ( or ( "," or )* )? ")"
//! ```
//!
//! Identifiers may contain `-` so keys such as `interactsh-url` resolve.
//! Functions are resolved at parse time; an unknown function is a compile
//! error, an unknown variable is an evaluation error.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use serde_json::{Number, Value};

use crate::errors::CompileError;
use crate::output::{value_as_string, InternalEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Len,
    Contains,
    StartsWith,
    EndsWith,
    ToLower,
    ToUpper,
    Trim,
    Base64,
    Base64Decode,
    Regex,
    Concat,
    HexEncode,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "len" => Self::Len,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "to_lower" => Self::ToLower,
            "to_upper" => Self::ToUpper,
            "trim" => Self::Trim,
            "base64" => Self::Base64,
            "base64_decode" => Self::Base64Decode,
            "regex" => Self::Regex,
            "concat" => Self::Concat,
            "hex_encode" => Self::HexEncode,
            _ => return None,
        })
    }

    /// Accepted argument counts as (min, max); `None` means unbounded.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Len | Self::ToLower | Self::ToUpper | Self::Trim => (1, Some(1)),
            Self::Base64 | Self::Base64Decode | Self::HexEncode => (1, Some(1)),
            Self::Contains | Self::StartsWith | Self::EndsWith | Self::Regex => (2, Some(2)),
            Self::Concat => (1, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Variable(String),
    Not(Box<Expression>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Call {
        function: Function,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DslError {
    UnknownVariable(String),
    InvalidArgument { function: Function, reason: String },
}

impl Display for DslError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DslError::UnknownVariable(name) => write!(f, "unknown variable '{}'", name),
            DslError::InvalidArgument { function, reason } => {
                write!(f, "invalid argument to {:?}: {}", function, reason)
            }
        }
    }
}

impl std::error::Error for DslError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    Comma,
    Not,
    Op(BinaryOp),
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some('\\') => {
                            if let Some(next) = chars.get(i + 1) {
                                literal.push(match next {
                                    'n' => '\n',
                                    'r' => '\r',
                                    't' => '\t',
                                    other => *other,
                                });
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            literal.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Op(BinaryOp::Eq), 2),
                    ('!', Some('=')) => (Token::Op(BinaryOp::Ne), 2),
                    ('<', Some('=')) => (Token::Op(BinaryOp::Le), 2),
                    ('>', Some('=')) => (Token::Op(BinaryOp::Ge), 2),
                    ('&', Some('&')) => (Token::Op(BinaryOp::And), 2),
                    ('|', Some('|')) => (Token::Op(BinaryOp::Or), 2),
                    ('<', _) => (Token::Op(BinaryOp::Lt), 1),
                    ('>', _) => (Token::Op(BinaryOp::Gt), 1),
                    ('!', _) => (Token::Not, 1),
                    _ => return Err(format!("unexpected character '{}'", c)),
                };
                tokens.push(token);
                i += width;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of expression", expected)),
        }
    }

    fn parse_or(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Op(BinaryOp::Or)) {
            self.position += 1;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_compare()?;
        while self.peek() == Some(&Token::Op(BinaryOp::And)) {
            self.position += 1;
            let right = self.parse_compare()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expression, String> {
        let left = self.parse_unary()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            if !matches!(op, BinaryOp::And | BinaryOp::Or) {
                self.position += 1;
                let right = self.parse_unary()?;
                return Ok(binary(op, left, right));
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, String> {
        if self.peek() == Some(&Token::Not) {
            self.position += 1;
            return Ok(Expression::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expression::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expression::Literal(number_value(n))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.position += 1;
                    return self.parse_call(&name);
                }
                Ok(match name.as_str() {
                    "true" => Expression::Literal(Value::Bool(true)),
                    "false" => Expression::Literal(Value::Bool(false)),
                    _ => Expression::Variable(name),
                })
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expression, String> {
        let function =
            Function::from_name(name).ok_or_else(|| format!("unknown function '{}'", name))?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.peek() == Some(&Token::Comma) {
                    self.position += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        let (min, max) = function.arity();
        if args.len() < min || max.map(|max| args.len() > max).unwrap_or(false) {
            return Err(format!(
                "function '{}' called with {} arguments",
                name,
                args.len()
            ));
        }

        Ok(Expression::Call { function, args })
    }
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Parses an expression, resolving function names.
pub fn compile(source: &str) -> Result<Expression, CompileError> {
    let invalid = |reason: String| CompileError::InvalidExpression {
        expression: source.to_string(),
        reason,
    };

    let tokens = tokenize(source).map_err(invalid)?;
    if tokens.is_empty() {
        return Err(invalid("empty expression".to_string()));
    }

    let mut parser = Parser {
        tokens,
        position: 0,
    };
    let expression = parser.parse_or().map_err(invalid)?;
    if parser.position < parser.tokens.len() {
        return Err(invalid(format!(
            "unexpected trailing token {:?}",
            parser.tokens[parser.position]
        )));
    }
    Ok(expression)
}

/// Truthiness used by `&&`, `||`, `!` and `dsl` matchers.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Ordering {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => value_as_string(left).cmp(&value_as_string(right)),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Bool(l), Value::Bool(r)) => l == r,
        _ => compare(left, right) == Ordering::Equal,
    }
}

impl Expression {
    pub fn evaluate(&self, variables: &InternalEvent) -> Result<Value, DslError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Variable(name) => variables
                .get(name)
                .cloned()
                .ok_or_else(|| DslError::UnknownVariable(name.clone())),
            Expression::Not(inner) => Ok(Value::Bool(!is_truthy(&inner.evaluate(variables)?))),
            Expression::Binary { op, left, right } => {
                let left = left.evaluate(variables)?;
                // Short-circuit before touching the right side.
                match op {
                    BinaryOp::And if !is_truthy(&left) => return Ok(Value::Bool(false)),
                    BinaryOp::Or if is_truthy(&left) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let right = right.evaluate(variables)?;
                Ok(Value::Bool(match op {
                    BinaryOp::And | BinaryOp::Or => is_truthy(&right),
                    BinaryOp::Eq => loosely_equal(&left, &right),
                    BinaryOp::Ne => !loosely_equal(&left, &right),
                    BinaryOp::Lt => compare(&left, &right) == Ordering::Less,
                    BinaryOp::Le => compare(&left, &right) != Ordering::Greater,
                    BinaryOp::Gt => compare(&left, &right) == Ordering::Greater,
                    BinaryOp::Ge => compare(&left, &right) != Ordering::Less,
                }))
            }
            Expression::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(variables))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*function, &values)
            }
        }
    }

    /// Evaluates to a boolean; evaluation errors count as false.
    pub fn matches(&self, variables: &InternalEvent) -> bool {
        self.evaluate(variables)
            .map(|value| is_truthy(&value))
            .unwrap_or(false)
    }
}

fn call(function: Function, args: &[Value]) -> Result<Value, DslError> {
    let text = |index: usize| args.get(index).map(value_as_string).unwrap_or_default();

    Ok(match function {
        Function::Len => {
            let len = match args.first() {
                Some(Value::Array(items)) => items.len(),
                _ => text(0).chars().count(),
            };
            Value::Number(Number::from(len))
        }
        Function::Contains => {
            let found = match args.first() {
                Some(Value::Array(items)) => items.iter().any(|item| loosely_equal(item, &args[1])),
                _ => text(0).contains(&text(1)),
            };
            Value::Bool(found)
        }
        Function::StartsWith => Value::Bool(text(0).starts_with(&text(1))),
        Function::EndsWith => Value::Bool(text(0).ends_with(&text(1))),
        Function::ToLower => Value::String(text(0).to_lowercase()),
        Function::ToUpper => Value::String(text(0).to_uppercase()),
        Function::Trim => Value::String(text(0).trim().to_string()),
        Function::Base64 => Value::String(STANDARD.encode(text(0))),
        Function::Base64Decode => {
            let decoded = STANDARD
                .decode(text(0).trim())
                .map_err(|e| DslError::InvalidArgument {
                    function,
                    reason: e.to_string(),
                })?;
            Value::String(String::from_utf8_lossy(&decoded).into_owned())
        }
        Function::HexEncode => Value::String(hex::encode(text(0))),
        Function::Regex => {
            let pattern = Regex::new(&text(0)).map_err(|e| DslError::InvalidArgument {
                function,
                reason: e.to_string(),
            })?;
            Value::Bool(pattern.is_match(&text(1)))
        }
        Function::Concat => Value::String((0..args.len()).map(text).collect()),
    })
}
