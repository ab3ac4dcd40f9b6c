/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

use nanoid::nanoid;
use sealed::sealed;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::json::{FromJson, ToJson};
use crate::token::TokenSequence;
use crate::types::*;

/// `Annotation` is a typed, attributed span over a token sequence. The span is expressed
/// in tokens: it starts at token `begin` and covers `size` tokens. Annotations may nest or
/// overlap arbitrarily, no well-formedness is enforced.
///
/// An annotation may carry a public identifier. Annotations added to a [`crate::Document`] always get one,
/// annotations that are produced on the fly (e.g. by matching) typically don't.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Public identifier for this annotation
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(rename = "type")]
    annotationtype: String,

    /// Index of the first token covered
    begin: usize,

    /// Number of tokens covered
    size: usize,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

impl Annotation {
    pub fn new(annotationtype: impl Into<String>, begin: usize, size: usize) -> Self {
        Self {
            id: None,
            annotationtype: annotationtype.into(),
            begin,
            size,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder pattern to set the public identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder pattern to assign a random public identifier (only if there is none yet)
    pub fn with_generated_id(mut self) -> Self {
        if self.id.is_none() {
            self.id = Some(format!("A{}", nanoid!()));
        }
        self
    }

    /// Builder pattern to set an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder pattern to set multiple attributes at once
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in attributes {
            self.attributes.insert(name.into(), value.into());
        }
        self
    }

    /// Returns the public identifier, if any
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Returns an identifier that is usable for comparisons: the public identifier if set,
    /// otherwise one derived from type and span.
    pub fn identifier(&self) -> Cow<str> {
        match self.id.as_deref() {
            Some(id) => Cow::Borrowed(id),
            None => Cow::Owned(format!(
                "{}@{}+{}",
                self.annotationtype, self.begin, self.size
            )),
        }
    }

    pub fn annotationtype(&self) -> &str {
        self.annotationtype.as_str()
    }

    pub(crate) fn set_annotationtype(&mut self, annotationtype: impl Into<String>) {
        self.annotationtype = annotationtype.into();
    }

    /// Index of the first token
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Number of tokens
    pub fn size(&self) -> usize {
        self.size
    }

    /// Index of the first token *after* the annotation (exclusive end)
    pub fn end(&self) -> usize {
        self.begin + self.size
    }

    pub(crate) fn set_span(&mut self, begin: usize, size: usize) {
        self.begin = begin;
        self.size = size;
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Sets an attribute, returns the previous value if there was one
    pub fn set_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.attributes.insert(name.into(), value.into())
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    /// Iterates over all attributes, sorted by name
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the text covered by this annotation in the given token sequence
    pub fn text(&self, tokens: &dyn TokenSequence) -> String {
        tokens.text_of(self.begin, self.end())
    }

    /// Do both annotations cover exactly the same tokens?
    pub fn same_span(&self, other: &Annotation) -> bool {
        self.begin == other.begin && self.size == other.size
    }

    /// Is the other annotation entirely within the span of this one?
    pub fn embeds(&self, other: &Annotation) -> bool {
        self.begin <= other.begin && other.end() <= self.end()
    }
}

/// Canonical document order for annotations: by ascending begin, longer annotations first
/// on the same begin, then by type.
pub fn document_order(a: &Annotation, b: &Annotation) -> Ordering {
    a.begin
        .cmp(&b.begin)
        .then_with(|| b.size.cmp(&a.size))
        .then_with(|| a.annotationtype.cmp(&b.annotationtype))
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<{}> [{}, {})",
            self.annotationtype,
            self.begin,
            self.end()
        )
    }
}

#[sealed]
impl TypeInfo for Annotation {
    fn typeinfo() -> Type {
        Type::Annotation
    }
}

impl ToJson for Annotation {}
impl FromJson for Annotation {}
