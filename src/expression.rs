/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module defines how patterns evaluate expressions against annotations: the attribute
//! tests (`<type test="...">`) and the value transforms of attribute setters (`@(expr):name`).
//!
//! The [`ExpressionEngine`] trait is the seam for plugging in a full expression language.
//! [`SimpleExpressions`] is a small built-in engine which covers attribute access, comparisons,
//! boolean connectives and a handful of string functions.

use std::fmt;
use std::sync::Arc;

use crate::annotation::Annotation;
use crate::error::TapasError;
use crate::token::TokenSequence;

/// The value an expression evaluates to
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl ExpressionValue {
    /// Truthiness: non-empty strings and non-zero numbers are true, null is false
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
        }
    }

    /// String value, null is the empty string
    pub fn as_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
        }
    }

    /// Numeric value, if the value can be interpreted as one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// What an expression is evaluated against: a span in a token sequence
pub struct ExpressionContext<'a> {
    pub tokens: &'a dyn TokenSequence,
    pub annotation: &'a Annotation,
}

impl<'a> ExpressionContext<'a> {
    pub fn new(tokens: &'a dyn TokenSequence, annotation: &'a Annotation) -> Self {
        Self { tokens, annotation }
    }
}

/// A parsed expression, ready to be evaluated many times
pub trait CompiledExpression: Send + Sync + fmt::Debug {
    /// The source the expression was parsed from
    fn source(&self) -> &str;

    fn evaluate(&self, context: &ExpressionContext) -> Result<ExpressionValue, TapasError>;
}

/// Parses expressions. Implementations must be shareable across threads.
pub trait ExpressionEngine: Send + Sync {
    /// Parses an expression, fails with [`TapasError::ExpressionSyntaxError`] on malformed input
    fn parse(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, TapasError>;
}

/// The built-in expression engine
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleExpressions;

impl ExpressionEngine for SimpleExpressions {
    fn parse(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, TapasError> {
        let lexemes = lex(source)?;
        let mut parser = ExprParser {
            lexemes: &lexemes,
            pos: 0,
            len: source.chars().count(),
        };
        let root = parser.parse_or()?;
        if let Some((lexeme, offset)) = parser.peek_with_offset() {
            return Err(TapasError::ExpressionSyntaxError(
                format!("Unexpected '{}' after end of expression", lexeme),
                offset,
            ));
        }
        Ok(Arc::new(SimpleExpression {
            source: source.to_string(),
            root,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Attribute(String),
    Variable(String),
    Name(String),
    Literal(String),
    Number(f64),
    Op(CompareOp),
    Open,
    Close,
    Comma,
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Attribute(name) => write!(f, "@{}", name),
            Self::Variable(name) => write!(f, "${}", name),
            Self::Name(name) => write!(f, "{}", name),
            Self::Literal(s) => write!(f, "'{}'", s),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Op(op) => write!(f, "{}", op.as_str()),
            Self::Open => write!(f, "("),
            Self::Close => write!(f, ")"),
            Self::Comma => write!(f, ","),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':'
}

/// Splits an expression into lexemes, each with its character offset
fn lex(source: &str) -> Result<Vec<(Lexeme, usize)>, TapasError> {
    let chars: Vec<char> = source.chars().collect();
    let mut lexemes = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let begin = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => {
                lexemes.push((Lexeme::Open, begin));
                i += 1;
            }
            ')' => {
                lexemes.push((Lexeme::Close, begin));
                i += 1;
            }
            ',' => {
                lexemes.push((Lexeme::Comma, begin));
                i += 1;
            }
            '=' => {
                lexemes.push((Lexeme::Op(CompareOp::Equal), begin));
                i += 1;
            }
            '!' | '<' | '>' => {
                let followed_by_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, followed_by_eq) {
                    ('!', true) => CompareOp::NotEqual,
                    ('<', true) => CompareOp::LessEqual,
                    ('>', true) => CompareOp::GreaterEqual,
                    ('<', false) => CompareOp::Less,
                    ('>', false) => CompareOp::Greater,
                    _ => {
                        return Err(TapasError::ExpressionSyntaxError(
                            "Expected '=' after '!'".to_string(),
                            begin,
                        ))
                    }
                };
                lexemes.push((Lexeme::Op(op), begin));
                i += if followed_by_eq { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(TapasError::ExpressionSyntaxError(
                                "Unterminated string literal".to_string(),
                                begin,
                            ))
                        }
                        Some('\\') if chars.get(i + 1) == Some(&quote) => {
                            value.push(quote);
                            i += 2;
                        }
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(*c);
                            i += 1;
                        }
                    }
                }
                lexemes.push((Lexeme::Literal(value), begin));
            }
            '@' | '$' => {
                i += 1;
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                if start == i {
                    return Err(TapasError::ExpressionSyntaxError(
                        format!("Expected a name after '{}'", c),
                        begin,
                    ));
                }
                let name: String = chars[start..i].iter().collect();
                if c == '@' {
                    lexemes.push((Lexeme::Attribute(name), begin));
                } else {
                    lexemes.push((Lexeme::Variable(name), begin));
                }
            }
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let number: String = chars[begin..i].iter().collect();
                let number: f64 = number.parse().map_err(|_| {
                    TapasError::ExpressionSyntaxError(
                        format!("Invalid number '{}'", number),
                        begin,
                    )
                })?;
                lexemes.push((Lexeme::Number(number), begin));
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                let name: String = chars[begin..i].iter().collect();
                lexemes.push((Lexeme::Name(name), begin));
            }
            c => {
                return Err(TapasError::ExpressionSyntaxError(
                    format!("Unexpected character '{}'", c),
                    begin,
                ))
            }
        }
    }
    Ok(lexemes)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Not,
    True,
    False,
    Lower,
    Upper,
    Concat,
    Contains,
    StartsWith,
    StringLength,
    NormalizeSpace,
    SubstringBefore,
    SubstringAfter,
    Substring,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "not" => Some(Self::Not),
            "true" => Some(Self::True),
            "false" => Some(Self::False),
            "lower" => Some(Self::Lower),
            "upper" => Some(Self::Upper),
            "concat" => Some(Self::Concat),
            "contains" => Some(Self::Contains),
            "starts-with" => Some(Self::StartsWith),
            "string-length" => Some(Self::StringLength),
            "normalize-space" => Some(Self::NormalizeSpace),
            "substring-before" => Some(Self::SubstringBefore),
            "substring-after" => Some(Self::SubstringAfter),
            "substring" => Some(Self::Substring),
            _ => None,
        }
    }

    /// Minimum and maximum number of arguments
    fn arity(&self) -> (usize, usize) {
        match self {
            Self::True | Self::False => (0, 0),
            Self::Not | Self::Lower | Self::Upper | Self::StringLength | Self::NormalizeSpace => {
                (1, 1)
            }
            Self::Contains | Self::StartsWith | Self::SubstringBefore | Self::SubstringAfter => {
                (2, 2)
            }
            Self::Substring => (2, 3),
            Self::Concat => (1, usize::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Variable {
    Type,
    Value,
    Size,
    Start,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(ExpressionValue),
    Attribute(String),
    Variable(Variable),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

struct ExprParser<'a> {
    lexemes: &'a [(Lexeme, usize)],
    pos: usize,
    len: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&'a Lexeme> {
        self.lexemes.get(self.pos).map(|(lexeme, _)| lexeme)
    }

    fn peek_with_offset(&self) -> Option<(&'a Lexeme, usize)> {
        self.lexemes
            .get(self.pos)
            .map(|(lexeme, offset)| (lexeme, *offset))
    }

    fn offset(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.len)
    }

    fn next(&mut self) -> Option<&'a Lexeme> {
        let lexeme = self.peek();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Lexeme::Name(name)) if name == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr, TapasError> {
        let mut left = self.parse_and()?;
        while self.is_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, TapasError> {
        let mut left = self.parse_comparison()?;
        while self.is_keyword("and") {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, TapasError> {
        let left = self.parse_primary()?;
        if let Some(Lexeme::Op(op)) = self.peek() {
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(*op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, TapasError> {
        let offset = self.offset();
        match self.next() {
            Some(Lexeme::Literal(s)) => Ok(Expr::Literal(ExpressionValue::String(s.clone()))),
            Some(Lexeme::Number(n)) => Ok(Expr::Literal(ExpressionValue::Number(*n))),
            Some(Lexeme::Attribute(name)) => Ok(Expr::Attribute(name.clone())),
            Some(Lexeme::Variable(name)) => {
                let variable = match name.as_str() {
                    "type" => Variable::Type,
                    "value" => Variable::Value,
                    "size" => Variable::Size,
                    "start" => Variable::Start,
                    _ => {
                        return Err(TapasError::ExpressionSyntaxError(
                            format!("Unknown variable '${}'", name),
                            offset,
                        ))
                    }
                };
                Ok(Expr::Variable(variable))
            }
            Some(Lexeme::Open) => {
                let inner = self.parse_or()?;
                self.expect_close(offset)?;
                Ok(inner)
            }
            Some(Lexeme::Name(name)) => {
                let function = Function::from_name(name).ok_or_else(|| {
                    TapasError::ExpressionSyntaxError(
                        format!("Unknown function '{}'", name),
                        offset,
                    )
                })?;
                if self.next() != Some(&Lexeme::Open) {
                    return Err(TapasError::ExpressionSyntaxError(
                        format!("Expected '(' after function name '{}'", name),
                        offset,
                    ));
                }
                let mut arguments = Vec::new();
                if self.peek() == Some(&Lexeme::Close) {
                    self.pos += 1;
                } else {
                    loop {
                        arguments.push(self.parse_or()?);
                        match self.next() {
                            Some(Lexeme::Comma) => continue,
                            Some(Lexeme::Close) => break,
                            _ => {
                                return Err(TapasError::ExpressionSyntaxError(
                                    format!("Expected ',' or ')' in arguments of '{}'", name),
                                    self.offset(),
                                ))
                            }
                        }
                    }
                }
                let (min, max) = function.arity();
                if arguments.len() < min || arguments.len() > max {
                    return Err(TapasError::ExpressionSyntaxError(
                        format!(
                            "Function '{}' does not take {} argument(s)",
                            name,
                            arguments.len()
                        ),
                        offset,
                    ));
                }
                Ok(Expr::Call(function, arguments))
            }
            Some(lexeme) => Err(TapasError::ExpressionSyntaxError(
                format!("Unexpected '{}'", lexeme),
                offset,
            )),
            None => Err(TapasError::ExpressionSyntaxError(
                "Unexpected end of expression".to_string(),
                offset,
            )),
        }
    }

    fn expect_close(&mut self, open_offset: usize) -> Result<(), TapasError> {
        if self.next() == Some(&Lexeme::Close) {
            Ok(())
        } else {
            Err(TapasError::ExpressionSyntaxError(
                "Unbalanced parenthesis".to_string(),
                open_offset,
            ))
        }
    }
}

#[derive(Debug)]
struct SimpleExpression {
    source: String,
    root: Expr,
}

impl CompiledExpression for SimpleExpression {
    fn source(&self) -> &str {
        self.source.as_str()
    }

    fn evaluate(&self, context: &ExpressionContext) -> Result<ExpressionValue, TapasError> {
        evaluate(&self.root, context)
    }
}

fn compare(op: CompareOp, left: &ExpressionValue, right: &ExpressionValue) -> bool {
    if left.is_null() || right.is_null() {
        // comparisons against something absent never hold, not even inequality
        return false;
    }
    let ordering = match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => Some(left.as_string().cmp(&right.as_string())),
    };
    match ordering {
        None => op == CompareOp::NotEqual,
        Some(ordering) => match op {
            CompareOp::Equal => ordering.is_eq(),
            CompareOp::NotEqual => ordering.is_ne(),
            CompareOp::Less => ordering.is_lt(),
            CompareOp::LessEqual => ordering.is_le(),
            CompareOp::Greater => ordering.is_gt(),
            CompareOp::GreaterEqual => ordering.is_ge(),
        },
    }
}

fn evaluate(expr: &Expr, context: &ExpressionContext) -> Result<ExpressionValue, TapasError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Attribute(name) => Ok(context
            .annotation
            .attribute(name)
            .map(|value| ExpressionValue::String(value.to_string()))
            .unwrap_or(ExpressionValue::Null)),
        Expr::Variable(variable) => Ok(match variable {
            Variable::Type => {
                ExpressionValue::String(context.annotation.annotationtype().to_string())
            }
            Variable::Value => ExpressionValue::String(context.annotation.text(context.tokens)),
            Variable::Size => ExpressionValue::Number(context.annotation.size() as f64),
            Variable::Start => ExpressionValue::Number(context.annotation.begin() as f64),
        }),
        Expr::And(left, right) => Ok(ExpressionValue::Bool(
            evaluate(left, context)?.as_bool() && evaluate(right, context)?.as_bool(),
        )),
        Expr::Or(left, right) => Ok(ExpressionValue::Bool(
            evaluate(left, context)?.as_bool() || evaluate(right, context)?.as_bool(),
        )),
        Expr::Compare(op, left, right) => Ok(ExpressionValue::Bool(compare(
            *op,
            &evaluate(left, context)?,
            &evaluate(right, context)?,
        ))),
        Expr::Call(function, arguments) => {
            let values = arguments
                .iter()
                .map(|argument| evaluate(argument, context))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, &values)
        }
    }
}

fn call(function: Function, values: &[ExpressionValue]) -> Result<ExpressionValue, TapasError> {
    let string = |i: usize| values.get(i).map(|v| v.as_string()).unwrap_or_default();
    Ok(match function {
        Function::Not => ExpressionValue::Bool(!values[0].as_bool()),
        Function::True => ExpressionValue::Bool(true),
        Function::False => ExpressionValue::Bool(false),
        Function::Lower => ExpressionValue::String(string(0).to_lowercase()),
        Function::Upper => ExpressionValue::String(string(0).to_uppercase()),
        Function::Concat => ExpressionValue::String(values.iter().map(|v| v.as_string()).collect()),
        Function::Contains => ExpressionValue::Bool(string(0).contains(string(1).as_str())),
        Function::StartsWith => ExpressionValue::Bool(string(0).starts_with(string(1).as_str())),
        Function::StringLength => ExpressionValue::Number(string(0).chars().count() as f64),
        Function::NormalizeSpace => ExpressionValue::String(
            string(0).split_whitespace().collect::<Vec<_>>().join(" "),
        ),
        Function::SubstringBefore => {
            let s = string(0);
            ExpressionValue::String(
                s.split_once(string(1).as_str())
                    .map(|(before, _)| before.to_string())
                    .unwrap_or_default(),
            )
        }
        Function::SubstringAfter => {
            let s = string(0);
            ExpressionValue::String(
                s.split_once(string(1).as_str())
                    .map(|(_, after)| after.to_string())
                    .unwrap_or_default(),
            )
        }
        Function::Substring => {
            // one-based, like XPath
            let s = string(0);
            let start = values[1].as_number().ok_or_else(|| {
                TapasError::ExpressionError(format!(
                    "substring(): start is not a number: '{}'",
                    values[1].as_string()
                ))
            })?;
            let start = (start.round() as i64 - 1).max(0) as usize;
            let taken: String = match values.get(2) {
                Some(length) => {
                    let length = length.as_number().ok_or_else(|| {
                        TapasError::ExpressionError(format!(
                            "substring(): length is not a number: '{}'",
                            length.as_string()
                        ))
                    })?;
                    s.chars()
                        .skip(start)
                        .take(length.round().max(0.0) as usize)
                        .collect()
                }
                None => s.chars().skip(start).collect(),
            };
            ExpressionValue::String(taken)
        }
    })
}
