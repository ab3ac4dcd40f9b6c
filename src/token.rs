/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module defines the token layer of the text model: [`Token`], the [`TokenSequence`] trait
//! and the [`Tokenizer`] trait along with a default implementation.

use regex::Regex;
use sealed::sealed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::types::*;

/// A single token. It holds its textual value, the whitespace that followed it in the
/// original text, and an arbitrary set of flags (e.g. `paragraph_end`) defined by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    text: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    whitespace: String,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    flags: BTreeSet<String>,
}

impl Token {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            whitespace: String::new(),
            flags: BTreeSet::new(),
        }
    }

    /// Builder pattern to set the whitespace following this token
    pub fn with_whitespace(mut self, whitespace: impl Into<String>) -> Self {
        self.whitespace = whitespace.into();
        self
    }

    /// Builder pattern to add a flag
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    /// Returns the textual value of the token
    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// Returns the whitespace that follows this token
    pub fn whitespace(&self) -> &str {
        self.whitespace.as_str()
    }

    pub fn set_whitespace(&mut self, whitespace: impl Into<String>) {
        self.whitespace = whitespace.into();
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: impl Into<String>) {
        self.flags.insert(flag.into());
    }

    pub fn unset_flag(&mut self, flag: &str) -> bool {
        self.flags.remove(flag)
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(|s| s.as_str())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[sealed]
impl TypeInfo for Token {
    fn typeinfo() -> Type {
        Type::Token
    }
}

/// Splits text into tokens. Patterns are tokenized with the same tokenizer as the
/// token sequence they are matched against, so literals line up with document tokens.
pub trait Tokenizer: Send + Sync {
    /// An identifier for the tokenization scheme, tokenizers that tokenize identically should share it
    fn id(&self) -> &str;

    /// Tokenizes the text
    fn tokenize(&self, text: &str) -> Vec<Token>;
}

/// A straightforward regular-expression based tokenizer. It yields numbers (with inner
/// decimal marks), runs of letters and digits (with inner hyphens and apostrophes), and
/// every other non-whitespace character as a token of its own.
#[derive(Debug, Clone)]
pub struct SimpleTokenizer {
    expression: Regex,
}

impl SimpleTokenizer {
    pub fn new() -> Self {
        Self {
            expression: Regex::new(
                r"\p{N}+(?:[.,]\p{N}+)+|[\p{L}\p{N}]+(?:['\-][\p{L}\p{N}]+)*|\S",
            )
            .expect("tokenizer expression must be valid"),
        }
    }
}

impl Default for SimpleTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for SimpleTokenizer {
    fn id(&self) -> &str {
        "simple"
    }

    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut prevend = None;
        for m in self.expression.find_iter(text) {
            if let (Some(prevend), Some(last)) = (prevend, tokens.last_mut()) {
                last.set_whitespace(&text[prevend..m.start()]);
            }
            tokens.push(Token::new(m.as_str()));
            prevend = Some(m.end());
        }
        if let (Some(prevend), Some(last)) = (prevend, tokens.last_mut()) {
            last.set_whitespace(&text[prevend..]);
        }
        tokens
    }
}

/// Returns the tokenizer that is used when none is specified explicitly
pub fn default_tokenizer() -> Arc<dyn Tokenizer> {
    Arc::new(SimpleTokenizer::new())
}

/// An ordered, 0-indexed sequence of tokens
pub trait TokenSequence {
    /// Returns the number of tokens
    fn len(&self) -> usize;

    /// Returns the token at the specified index
    fn token(&self, index: usize) -> Option<&Token>;

    /// Returns the tokenizer that produced this sequence
    fn tokenizer(&self) -> &dyn Tokenizer;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the text value of the token at the specified index, an empty string if out of bounds
    fn value(&self, index: usize) -> &str {
        self.token(index).map(|token| token.text()).unwrap_or("")
    }

    /// Returns the text covered by the tokens `begin..end` (exclusive end), with the original
    /// whitespace between the tokens but without the whitespace after the last one.
    fn text_of(&self, begin: usize, end: usize) -> String {
        let end = end.min(self.len());
        let mut text = String::new();
        for i in begin..end {
            if let Some(token) = self.token(i) {
                text += token.text();
                if i + 1 < end {
                    text += token.whitespace();
                }
            }
        }
        text
    }
}
