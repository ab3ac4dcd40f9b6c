/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module contains the pattern language: the element tree a pattern compiles to ([`PatternElement`]),
//! the compiler itself ([`compile()`]) and some textual utilities ([`explode_pattern()`], [`normalize_pattern()`]).
//!
//! The surface syntax:
//!
//! * `<type attr="value" attr2="(a|b)" test="expression">` matches an annotation of the given type. An attribute value `*` (or an
//!   empty one) only requires the attribute to be present, a value `(a|b)` requires one of the alternatives, the reserved
//!   attribute `test` holds an expression that must evaluate to true for the candidate annotation.
//! * `'literal text'` matches tokens, the text is tokenized with the tokenizer of the token sequence (escapes `\'` and `\\`).
//! * `"regex"` matches a regular expression against the text of one or more consecutive tokens (it has to match entirely).
//! * `(A B)` is a sequence group, `(A|B)` an alternation.
//! * Any element may be followed by one quantifier (`?`, `*`, `+`, `{m}`, `{m,}`, `{m,n}`) and any number of
//!   attribute setters: `@name`, `@(expression):name`, `@name[separator]` or `@name[f|l|m]` (keep first, last, or longest value).

use regex::Regex;
use sealed::sealed;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::TapasError;
use crate::expression::{CompiledExpression, ExpressionEngine};
use crate::token::Tokenizer;
use crate::types::*;

/// Maximum count that denotes an unbounded number of repetitions
pub const UNBOUNDED: usize = usize::MAX;

/// Name of the reserved attribute that holds a test expression in an annotation matcher
pub const TEST_ATTRIBUTE: &str = "test";

/// A compiled pattern: a sequence of elements
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    elements: Vec<Arc<PatternElement>>,
}

impl PartialEq for Pattern {
    /// Patterns are equal when their element trees are, regardless of how they were written
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl Pattern {
    /// The source the pattern was compiled from
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// The top-level elements, to be matched in sequence
    pub fn elements(&self) -> &[Arc<PatternElement>] {
        &self.elements
    }

    /// Returns all distinct regular expression literals in the pattern, in order of first occurrence
    pub fn regex_literals(&self) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        for element in self.elements.iter() {
            element.walk(&mut |element| {
                if let ElementKind::RegexLiteral(regex) = &element.kind {
                    if !found.contains(&regex.as_str()) {
                        found.push(regex.as_str());
                    }
                }
            });
        }
        found
    }

    /// Returns all distinct annotation types the pattern refers to, in order of first occurrence
    pub fn annotation_types(&self) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        for element in self.elements.iter() {
            element.walk(&mut |element| {
                if let ElementKind::Annotation(matcher) = &element.kind {
                    if !found.contains(&matcher.annotationtype.as_str()) {
                        found.push(matcher.annotationtype.as_str());
                    }
                }
            });
        }
        found
    }
}

#[sealed]
impl TypeInfo for Pattern {
    fn typeinfo() -> Type {
        Type::Pattern
    }
}

/// A node in the element tree of a pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternElement {
    pub(crate) kind: ElementKind,
    pub(crate) min: usize,
    pub(crate) max: usize,
    pub(crate) setters: Vec<AttributeSetter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// Literal text, matched as a sequence of tokens
    Literal { text: String, tokens: Vec<String> },
    /// A regular expression matched against the text of consecutive tokens
    RegexLiteral(String),
    Annotation(AnnotationMatcher),
    /// All children in order, once per repetition
    Sequence(Vec<Arc<PatternElement>>),
    /// Any one of the children per repetition
    Alternative(Vec<Arc<PatternElement>>),
}

impl PatternElement {
    pub(crate) fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            min: 1,
            max: 1,
            setters: Vec::new(),
        }
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    /// Minimum number of repetitions
    pub fn min(&self) -> usize {
        self.min
    }

    /// Maximum number of repetitions, [`UNBOUNDED`] if there is no limit
    pub fn max(&self) -> usize {
        self.max
    }

    pub fn setters(&self) -> &[AttributeSetter] {
        &self.setters
    }

    /// Calls the function on this element and all descendants, depth-first
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a PatternElement),
    {
        f(self);
        match &self.kind {
            ElementKind::Sequence(children) | ElementKind::Alternative(children) => {
                for child in children.iter() {
                    child.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Is this a plain element: exactly once, no attribute setters?
    fn is_plain(&self) -> bool {
        self.min == 1 && self.max == 1 && self.setters.is_empty()
    }
}

/// Constrains candidate annotations of a given type
#[derive(Debug, Clone)]
pub struct AnnotationMatcher {
    pub(crate) annotationtype: String,
    pub(crate) constraints: Vec<AttributeConstraint>,
    pub(crate) test: Option<Arc<dyn CompiledExpression>>,
}

impl PartialEq for AnnotationMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.annotationtype == other.annotationtype
            && self.constraints == other.constraints
            && self.test.as_ref().map(|e| e.source()) == other.test.as_ref().map(|e| e.source())
    }
}

impl AnnotationMatcher {
    pub fn annotationtype(&self) -> &str {
        self.annotationtype.as_str()
    }

    pub fn constraints(&self) -> &[AttributeConstraint] {
        &self.constraints
    }

    pub fn test(&self) -> Option<&dyn CompiledExpression> {
        self.test.as_deref()
    }
}

/// A test on one attribute of a candidate annotation
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeConstraint {
    pub(crate) name: String,
    pub(crate) test: ValueTest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueTest {
    /// The attribute must be present, any value goes
    Present,
    /// The attribute value must equal one of these
    OneOf(Vec<String>),
}

impl AttributeConstraint {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Tests the value of the attribute (`None` if the attribute is absent)
    pub fn test(&self, value: Option<&str>) -> bool {
        match (&self.test, value) {
            (_, None) => false,
            (ValueTest::Present, Some(_)) => true,
            (ValueTest::OneOf(alternatives), Some(value)) => {
                alternatives.iter().any(|alternative| alternative == value)
            }
        }
    }
}

/// How repeated values for the same match attribute are combined
#[derive(Debug, Clone, PartialEq)]
pub enum MultiValuePolicy {
    /// Keep the earliest value
    First,
    /// Keep the newest value
    Last,
    /// Keep the longest value
    Longest,
    /// Concatenate all values, with the given separator or, if none is given, the configured default
    Join(Option<String>),
}

/// An attribute setter directive (`@name`, `@(expression):name`, `@name[...]`) on a pattern element
#[derive(Debug, Clone)]
pub struct AttributeSetter {
    pub(crate) name: String,
    pub(crate) expression: Option<Arc<dyn CompiledExpression>>,
    pub(crate) policy: MultiValuePolicy,
}

impl PartialEq for AttributeSetter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.policy == other.policy
            && self.expression.as_ref().map(|e| e.source())
                == other.expression.as_ref().map(|e| e.source())
    }
}

impl AttributeSetter {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn expression(&self) -> Option<&dyn CompiledExpression> {
        self.expression.as_deref()
    }

    pub fn policy(&self) -> &MultiValuePolicy {
        &self.policy
    }
}

/// Options for the compiler
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// If set, annotation matchers may only refer to these types
    pub known_types: Option<HashSet<String>>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_types = Some(types.into_iter().map(|s| s.into()).collect());
        self
    }
}

/// Compiles a pattern. Literals are tokenized with the specified tokenizer, expressions are parsed with the specified engine.
///
/// This is a pure function, use a [`crate::PatternCache`] (or [`crate::PatternMatcher`]) to avoid compiling the same pattern over and over.
pub fn compile(
    source: &str,
    tokenizer: &dyn Tokenizer,
    expressions: &dyn ExpressionEngine,
) -> Result<Pattern, TapasError> {
    compile_with_options(source, tokenizer, expressions, &CompileOptions::default())
}

/// Compiles a pattern, like [`compile()`], with extra options
pub fn compile_with_options(
    source: &str,
    tokenizer: &dyn Tokenizer,
    expressions: &dyn ExpressionEngine,
    options: &CompileOptions,
) -> Result<Pattern, TapasError> {
    let mut parser = PatternParser {
        chars: source.chars().collect(),
        pos: 0,
        tokenizer,
        expressions,
        options,
    };
    let elements = parser.parse_elements()?;
    match parser.peek() {
        Some(')') => return Err(parser.error("Unbalanced group: unexpected ')'", parser.pos)),
        Some('|') => {
            return Err(parser.error(
                "Alternation '|' is only allowed inside a group",
                parser.pos,
            ))
        }
        _ => {}
    }
    if elements.is_empty() {
        return Err(parser.error("Empty pattern", 0));
    }
    Ok(Pattern {
        source: source.to_string(),
        elements,
    })
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':'
}

struct PatternParser<'a> {
    chars: Vec<char>,
    pos: usize,
    tokenizer: &'a dyn Tokenizer,
    expressions: &'a dyn ExpressionEngine,
    options: &'a CompileOptions,
}

impl<'a> PatternParser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> TapasError {
        TapasError::PatternSyntaxError(message.into(), offset)
    }

    fn read_name(&mut self) -> String {
        let begin = self.pos;
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            self.pos += 1;
        }
        self.chars[begin..self.pos].iter().collect()
    }

    /// Parses elements until the end of input, a `)` or a `|`
    fn parse_elements(&mut self) -> Result<Vec<Arc<PatternElement>>, TapasError> {
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(')') | Some('|') => break,
                _ => elements.push(Arc::new(self.parse_element()?)),
            }
        }
        Ok(elements)
    }

    fn parse_element(&mut self) -> Result<PatternElement, TapasError> {
        let offset = self.pos;
        let kind = match self.peek() {
            Some('\'') => self.parse_literal()?,
            Some('"') => self.parse_regex()?,
            Some('<') => self.parse_annotation_matcher()?,
            Some('(') => self.parse_group()?,
            Some(c) => {
                return Err(self.error(format!("Unexpected character '{}'", c), offset));
            }
            None => return Err(self.error("Unexpected end of pattern", offset)),
        };
        let mut element = PatternElement::new(kind);
        self.parse_quantifier(&mut element)?;
        loop {
            self.skip_whitespace();
            if self.peek() != Some('@') {
                break;
            }
            element.setters.push(self.parse_setter()?);
        }
        Ok(element)
    }

    /// Reads quoted text, the current character is the opening quote. Only the quote itself can be escaped
    /// (and, if `escape_backslash` is set, the backslash), other backslashes are retained as-is.
    fn read_quoted(&mut self, escape_backslash: bool, what: &str) -> Result<String, TapasError> {
        let offset = self.pos;
        let quote = match self.peek() {
            Some(c @ '\'') | Some(c @ '"') => c,
            _ => return Err(self.error(format!("Expected quoted {}", what), offset)),
        };
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error(format!("Unterminated {}", what), offset)),
                Some('\\') => match self.chars.get(self.pos + 1).copied() {
                    Some(c) if c == quote || (escape_backslash && c == '\\') => {
                        text.push(c);
                        self.pos += 2;
                    }
                    Some(c) => {
                        text.push('\\');
                        text.push(c);
                        self.pos += 2;
                    }
                    None => return Err(self.error(format!("Unterminated {}", what), offset)),
                },
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(text);
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_literal(&mut self) -> Result<ElementKind, TapasError> {
        let offset = self.pos;
        let text = self.read_quoted(true, "literal")?;
        let tokens: Vec<String> = self
            .tokenizer
            .tokenize(&text)
            .into_iter()
            .map(|token| token.text().to_string())
            .collect();
        if tokens.is_empty() {
            return Err(self.error("Empty literal", offset));
        }
        Ok(ElementKind::Literal { text, tokens })
    }

    fn parse_regex(&mut self) -> Result<ElementKind, TapasError> {
        let offset = self.pos;
        let regex = self.read_quoted(false, "regular expression")?;
        if regex.is_empty() {
            return Err(self.error("Empty regular expression", offset));
        }
        if let Err(e) = Regex::new(&format!("^(?:{})$", regex)) {
            return Err(self.error(format!("Invalid regular expression: {}", e), offset));
        }
        Ok(ElementKind::RegexLiteral(regex))
    }

    fn parse_annotation_matcher(&mut self) -> Result<ElementKind, TapasError> {
        let offset = self.pos;
        self.pos += 1; //skip <
        self.skip_whitespace();
        let typeoffset = self.pos;
        let annotationtype = self.read_name();
        let valid = annotationtype
            .chars()
            .next()
            .map(|c| c.is_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid {
            return Err(self.error(
                format!("Unknown annotation type '{}'", annotationtype),
                typeoffset,
            ));
        }
        if let Some(known_types) = self.options.known_types.as_ref() {
            if !known_types.contains(&annotationtype) {
                return Err(self.error(
                    format!("Unknown annotation type '{}'", annotationtype),
                    typeoffset,
                ));
            }
        }
        let mut matcher = AnnotationMatcher {
            annotationtype,
            constraints: Vec::new(),
            test: None,
        };
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error("Unterminated annotation matcher", offset)),
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if is_name_char(c) => {
                    let name = self.read_name();
                    self.skip_whitespace();
                    if self.peek() != Some('=') {
                        //bare attribute name: presence test
                        matcher.constraints.push(AttributeConstraint {
                            name,
                            test: ValueTest::Present,
                        });
                        continue;
                    }
                    self.pos += 1;
                    self.skip_whitespace();
                    let valueoffset = self.pos + 1;
                    let value = self.read_quoted(false, "attribute value")?;
                    if name == TEST_ATTRIBUTE {
                        matcher.test = Some(self.parse_expression(&value, valueoffset, "test")?);
                    } else {
                        matcher.constraints.push(AttributeConstraint {
                            name,
                            test: value_test(&value),
                        });
                    }
                }
                Some(c) => {
                    return Err(self.error(
                        format!("Unexpected character '{}' in annotation matcher", c),
                        self.pos,
                    ))
                }
            }
        }
        Ok(ElementKind::Annotation(matcher))
    }

    fn parse_expression(
        &self,
        source: &str,
        offset: usize,
        what: &str,
    ) -> Result<Arc<dyn CompiledExpression>, TapasError> {
        self.expressions.parse(source).map_err(|e| match e {
            TapasError::ExpressionSyntaxError(msg, exproffset) => self.error(
                format!("Invalid {} expression: {}", what, msg),
                offset + exproffset,
            ),
            e => e,
        })
    }

    fn parse_group(&mut self) -> Result<ElementKind, TapasError> {
        let offset = self.pos;
        self.pos += 1; //skip (
        let mut branches: Vec<Vec<Arc<PatternElement>>> = Vec::new();
        loop {
            let branchoffset = self.pos;
            let branch = self.parse_elements()?;
            if branch.is_empty() {
                return Err(self.error("Empty group or alternative", branchoffset));
            }
            branches.push(branch);
            match self.peek() {
                Some('|') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error("Unbalanced group: missing ')'", offset)),
            }
        }
        if branches.len() == 1 {
            Ok(ElementKind::Sequence(branches.pop().unwrap_or_default()))
        } else {
            Ok(ElementKind::Alternative(
                branches
                    .into_iter()
                    .map(|mut branch| {
                        if branch.len() == 1 {
                            branch.remove(0)
                        } else {
                            Arc::new(PatternElement::new(ElementKind::Sequence(branch)))
                        }
                    })
                    .collect(),
            ))
        }
    }

    fn parse_quantifier(&mut self, element: &mut PatternElement) -> Result<(), TapasError> {
        self.skip_whitespace();
        let offset = self.pos;
        let (min, max) = match self.peek() {
            Some('?') => (0, 1),
            Some('*') => (0, UNBOUNDED),
            Some('+') => (1, UNBOUNDED),
            Some('{') => {
                let close = self.chars[self.pos..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|i| self.pos + i)
                    .ok_or_else(|| self.error("Unterminated quantifier", offset))?;
                let inner: String = self.chars[self.pos + 1..close].iter().collect();
                let invalid = || self.error(format!("Invalid quantifier '{{{}}}'", inner), offset);
                let (min, max) = match inner.split_once(',') {
                    None => {
                        let n: usize = inner.trim().parse().map_err(|_| invalid())?;
                        (n, n)
                    }
                    Some((min, max)) => {
                        let min: usize = min.trim().parse().map_err(|_| invalid())?;
                        let max: usize = if max.trim().is_empty() {
                            UNBOUNDED
                        } else {
                            max.trim().parse().map_err(|_| invalid())?
                        };
                        (min, max)
                    }
                };
                if max < 1 || max < min {
                    return Err(invalid());
                }
                self.pos = close;
                (min, max)
            }
            _ => return Ok(()),
        };
        self.pos += 1;
        element.min = min;
        element.max = max;
        self.skip_whitespace();
        if matches!(self.peek(), Some('?') | Some('*') | Some('+') | Some('{')) {
            return Err(self.error("Invalid quantifier: only one quantifier per element", self.pos));
        }
        Ok(())
    }

    fn parse_setter(&mut self) -> Result<AttributeSetter, TapasError> {
        let offset = self.pos;
        self.pos += 1; //skip @
        let mut expression = None;
        if self.peek() == Some('(') {
            let exproffset = self.pos + 1;
            let source = self.read_balanced()?;
            expression = Some(self.parse_expression(&source, exproffset, "attribute setter")?);
            if self.peek() != Some(':') {
                return Err(self.error(
                    "Invalid attribute setter: expected ':' after the expression",
                    self.pos,
                ));
            }
            self.pos += 1;
        }
        let name = self.read_name();
        if name.is_empty() {
            return Err(self.error("Invalid attribute setter: missing attribute name", offset));
        }
        let mut policy = MultiValuePolicy::Join(None);
        if self.peek() == Some('[') {
            let bracketoffset = self.pos;
            self.pos += 1;
            let mut separator = String::new();
            loop {
                match self.peek() {
                    None => {
                        return Err(self.error(
                            "Invalid attribute setter: unterminated '['",
                            bracketoffset,
                        ))
                    }
                    Some('\\') if self.chars.get(self.pos + 1) == Some(&']') => {
                        separator.push(']');
                        self.pos += 2;
                    }
                    Some(']') => {
                        self.pos += 1;
                        break;
                    }
                    Some(c) => {
                        separator.push(c);
                        self.pos += 1;
                    }
                }
            }
            policy = match separator.as_str() {
                "f" => MultiValuePolicy::First,
                "l" => MultiValuePolicy::Last,
                "m" => MultiValuePolicy::Longest,
                _ => MultiValuePolicy::Join(Some(separator)),
            };
        }
        Ok(AttributeSetter {
            name,
            expression,
            policy,
        })
    }

    /// Reads a parenthesized expression (respecting quotes), the current character is the opening parenthesis.
    /// Returns the text between the outer parentheses.
    fn read_balanced(&mut self) -> Result<String, TapasError> {
        let offset = self.pos;
        let mut depth = 0;
        let mut quote: Option<char> = None;
        let begin = self.pos + 1;
        while let Some(c) = self.peek() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'') | (None, '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        let text = self.chars[begin..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(text);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error(
            "Invalid attribute setter: unterminated expression",
            offset,
        ))
    }
}

fn value_test(value: &str) -> ValueTest {
    if value.is_empty() || value == "*" {
        ValueTest::Present
    } else if value.starts_with('(') && value.ends_with(')') && value.len() > 2 {
        ValueTest::OneOf(
            value[1..value.len() - 1]
                .split('|')
                .map(|s| s.to_string())
                .collect(),
        )
    } else {
        ValueTest::OneOf(vec![value.to_string()])
    }
}

// ----------------------------- serialisation back to surface syntax ------------------------------

fn escape(s: &str, quote: char, escape_backslash: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if escape_backslash {
                out.push_str("\\\\");
            } else {
                // retained escape sequence: keep the pair together
                out.push('\\');
                if let Some(next) = chars.next() {
                    if next == quote {
                        out.push('\\');
                    }
                    out.push(next);
                }
            }
        } else if c == quote {
            out.push('\\');
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for Pattern {
    /// Serializes the pattern back to canonical surface syntax
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", element)?;
        }
        Ok(())
    }
}

impl fmt::Display for PatternElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ElementKind::Literal { text, .. } => write!(f, "'{}'", escape(text, '\'', true))?,
            ElementKind::RegexLiteral(regex) => write!(f, "\"{}\"", escape(regex, '"', false))?,
            ElementKind::Annotation(matcher) => write!(f, "{}", matcher)?,
            ElementKind::Sequence(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")?;
            }
            ElementKind::Alternative(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    match &child.kind {
                        // an unadorned sequence is a multi-element branch, it needs no parentheses of its own
                        ElementKind::Sequence(grandchildren) if child.is_plain() => {
                            for (j, grandchild) in grandchildren.iter().enumerate() {
                                if j > 0 {
                                    write!(f, " ")?;
                                }
                                write!(f, "{}", grandchild)?;
                            }
                        }
                        _ => write!(f, "{}", child)?,
                    }
                }
                write!(f, ")")?;
            }
        }
        match (self.min, self.max) {
            (1, 1) => {}
            (0, 1) => write!(f, "?")?,
            (0, UNBOUNDED) => write!(f, "*")?,
            (1, UNBOUNDED) => write!(f, "+")?,
            (min, UNBOUNDED) => write!(f, "{{{},}}", min)?,
            (min, max) if min == max => write!(f, "{{{}}}", min)?,
            (min, max) => write!(f, "{{{},{}}}", min, max)?,
        }
        for setter in self.setters.iter() {
            write!(f, "{}", setter)?;
        }
        Ok(())
    }
}

impl fmt::Display for AnnotationMatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{}", self.annotationtype)?;
        for constraint in self.constraints.iter() {
            let value = match &constraint.test {
                ValueTest::Present => "*".to_string(),
                ValueTest::OneOf(alternatives) if alternatives.len() == 1 => {
                    alternatives[0].clone()
                }
                ValueTest::OneOf(alternatives) => format!("({})", alternatives.join("|")),
            };
            write!(f, " {}=\"{}\"", constraint.name, escape(&value, '"', false))?;
        }
        if let Some(test) = self.test.as_ref() {
            write!(
                f,
                " {}=\"{}\"",
                TEST_ATTRIBUTE,
                escape(test.source(), '"', false)
            )?;
        }
        write!(f, ">")
    }
}

impl fmt::Display for AttributeSetter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@")?;
        if let Some(expression) = self.expression.as_ref() {
            write!(f, "({}):", expression.source())?;
        }
        write!(f, "{}", self.name)?;
        match &self.policy {
            MultiValuePolicy::Join(None) => Ok(()),
            MultiValuePolicy::First => write!(f, "[f]"),
            MultiValuePolicy::Last => write!(f, "[l]"),
            MultiValuePolicy::Longest => write!(f, "[m]"),
            MultiValuePolicy::Join(Some(separator)) => {
                write!(f, "[{}]", separator.replace(']', "\\]"))
            }
        }
    }
}

// ----------------------------- textual layout utilities ------------------------------

/// A lexical piece of pattern source, as far as layout is concerned
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// Text that is copied verbatim: quoted literals, tags, setter expressions and separators, quantifier braces
    Verbatim(String),
    /// A structural character outside of any verbatim text
    Char(char),
    /// A run of whitespace outside of any verbatim text
    Space,
}

impl Segment {
    /// Does this segment attach to the element before it (quantifiers and setters)?
    fn is_suffix(&self) -> bool {
        match self {
            Self::Char(c) => matches!(c, '?' | '*' | '+' | '@' | ':'),
            Self::Verbatim(s) => s.starts_with('{') || s.starts_with('[') || s.starts_with("@("),
            Self::Space => false,
        }
    }
}

/// Reads from `chars[i]` (an opening delimiter) up to and including the matching closing delimiter,
/// respecting backslash escapes and, where `nested_quotes` is set, quoted text inside.
fn take_delimited(chars: &[char], i: usize, close: char, nested_quotes: bool) -> usize {
    let open = chars[i];
    let mut j = i + 1;
    let mut depth = 1;
    let mut quote: Option<char> = None;
    while j < chars.len() {
        let c = chars[j];
        if c == '\\' {
            j += 2;
            continue;
        }
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if nested_quotes && (c == '\'' || c == '"') => quote = Some(c),
            None if c == close && (open == close || depth == 1) => return j + 1,
            None if c == close => depth -= 1,
            None if c == open => depth += 1,
            None => {}
        }
        j += 1;
    }
    chars.len()
}

fn segments(source: &str) -> Vec<Segment> {
    let chars: Vec<char> = source.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let end = match c {
            c if c.is_whitespace() => {
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                segments.push(Segment::Space);
                continue;
            }
            '\'' | '"' => take_delimited(&chars, i, c, false),
            '<' => take_delimited(&chars, i, '>', true),
            '[' => take_delimited(&chars, i, ']', false),
            '{' => take_delimited(&chars, i, '}', false),
            '@' if chars.get(i + 1) == Some(&'(') => take_delimited(&chars, i + 1, ')', true),
            c => {
                segments.push(Segment::Char(c));
                i += 1;
                continue;
            }
        };
        let end = end.min(chars.len());
        segments.push(Segment::Verbatim(chars[i..end].iter().collect()));
        i = end;
    }
    segments
}

/// Lays a pattern out over multiple lines for readability: one element per line, group contents
/// indented with one tab per nesting level, and every `|` on a line of its own. Quoted text is not altered.
pub fn explode_pattern(source: &str) -> String {
    let mut out = String::new();
    let mut line = String::new();
    let mut depth: usize = 0;
    let flush = |out: &mut String, line: &mut String, depth: usize| {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            for _ in 0..depth {
                out.push('\t');
            }
            out.push_str(trimmed);
            out.push('\n');
        }
        line.clear();
    };
    let segments = segments(source);
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Space => {
                if !segments.get(i + 1).map(|s| s.is_suffix()).unwrap_or(false) {
                    flush(&mut out, &mut line, depth);
                }
            }
            Segment::Char('(') => {
                flush(&mut out, &mut line, depth);
                line.push('(');
                flush(&mut out, &mut line, depth);
                depth += 1;
            }
            Segment::Char(')') => {
                flush(&mut out, &mut line, depth);
                depth = depth.saturating_sub(1);
                line.push(')');
            }
            Segment::Char('|') => {
                flush(&mut out, &mut line, depth);
                line.push('|');
                flush(&mut out, &mut line, depth.saturating_sub(1));
            }
            Segment::Char(c) => line.push(*c),
            Segment::Verbatim(s) => {
                if s.starts_with('<') || s.starts_with('\'') || s.starts_with('"') {
                    // a new element directly after the previous one still gets its own line
                    if !line.trim().is_empty() && !line.ends_with(':') {
                        flush(&mut out, &mut line, depth);
                    }
                }
                line.push_str(s);
            }
        }
    }
    flush(&mut out, &mut line, depth);
    out
}

/// Collapses the layout of a pattern to a single line: whitespace outside of quoted text is reduced to
/// single spaces, and removed altogether around parentheses, `|`, quantifiers and attribute setters.
pub fn normalize_pattern(source: &str) -> String {
    let segments = segments(source);
    let mut out = String::new();
    let mut pending_space = false;
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Space => pending_space = true,
            segment => {
                if pending_space && i > 0 {
                    let after_opener = out.ends_with('(') || out.ends_with('|');
                    let before_closer = matches!(segment, Segment::Char(')') | Segment::Char('|'));
                    if !out.is_empty() && !after_opener && !before_closer && !segment.is_suffix()
                    {
                        out.push(' ');
                    }
                }
                pending_space = false;
                match segment {
                    Segment::Char(c) => out.push(*c),
                    Segment::Verbatim(s) if s.starts_with('<') => out.push_str(&collapse_tag(s)),
                    Segment::Verbatim(s) if s.starts_with('{') => {
                        out.extend(s.chars().filter(|c| !c.is_whitespace()))
                    }
                    Segment::Verbatim(s) => out.push_str(s),
                    Segment::Space => {}
                }
            }
        }
    }
    out
}

/// Collapses whitespace inside a tag (outside quoted values) to single spaces
fn collapse_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;
    for c in tag.chars() {
        if quote.is_some() {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if Some(c) == quote {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.ends_with('<') && c != '>' && c != '=' && !out.ends_with('=') {
            out.push(' ');
        }
        pending_space = false;
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}
