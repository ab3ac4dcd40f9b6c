/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! ## Introduction
//!
//! TAPAS is a library for finding patterns of annotations on tokenized text. Annotations are typed,
//! attributed spans over a token sequence; they may nest or overlap freely. A pattern describes a sequence of
//! annotations, literal tokens and regular expressions, with grouping, alternation and quantifiers,
//! much like a regular expression does for characters:
//!
//! ```text
//! <lastName> ',' <firstName>@first ("[A-Z]" '.')?
//! ```
//!
//! **What can you do with this library?**
//!
//! * Compile patterns ([`compile()`]) and cache compiled patterns ([`PatternCache`])
//! * Index annotations by type and start token ([`AnnotationIndex`]), optionally kept in sync with a mutable [`Document`] ([`ObservingIndex`])
//! * Find all matches of a pattern in a token sequence, as match trees or as new annotations ([`PatternMatcher`])
//! * Compute attributes for matches from the matched text or from expressions ([`AttributeSetter`])
//! * Assemble enumerations ("A, B, C and D") out of element and separator annotations ([`EnumerationAssembler`])
//!
//! Main entry points:
//! * [`PatternMatcher`]
//! * [`Document`]
//! * [`AnnotationIndex`]
//! * [`Pattern`]
//! * [`EnumerationAssembler`]

mod annotation;
mod attributes;
mod cache;
mod config;
mod document;
mod enumeration;
mod error;
mod expression;
mod file;
mod index;
mod json;
mod literals;
mod matcher;
mod pattern;
mod token;
mod types;

// Our internal crate structure is not very relevant to the outside world,
// expose all structs and traits in the root namespace, and be explicit about it:

pub use annotation::{document_order, Annotation};
pub use attributes::{apply_setters, merge_value, setter_value};
pub use cache::PatternCache;
pub use config::{Config, Configurable};
pub use document::{Document, DocumentEvent};
pub use enumeration::{
    EnumerationAssembler, EnumerationInput, ENUMERATION_TYPE, MEMBERS_ATTRIBUTE, SIZE_ATTRIBUTE,
};
pub use error::{TapasError, TapasResult};
pub use expression::{
    CompiledExpression, ExpressionContext, ExpressionEngine, ExpressionValue, SimpleExpressions,
};
pub use index::{AnnotationIndex, AnnotationLookup, AnnotationSource, ObservingIndex};
pub use json::{FromJson, ToJson};
pub use literals::{regex_type, PatternLiteralIndexer};
pub use matcher::{MatchTree, PatternMatch, PatternMatcher};
pub use pattern::{
    compile, compile_with_options, explode_pattern, normalize_pattern, AnnotationMatcher,
    AttributeConstraint, AttributeSetter, CompileOptions, ElementKind, MultiValuePolicy, Pattern,
    PatternElement, ValueTest, TEST_ATTRIBUTE, UNBOUNDED,
};
pub use token::{default_tokenizer, SimpleTokenizer, Token, TokenSequence, Tokenizer};
pub use types::*;

mod tests;
