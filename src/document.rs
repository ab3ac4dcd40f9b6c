/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module contains [`Document`]: a mutable token sequence with annotations on it, which notifies
//! subscribers of every change via [`DocumentEvent`].

use sealed::sealed;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use crate::annotation::{document_order, Annotation};
use crate::error::TapasError;
use crate::index::AnnotationSource;
use crate::json::{FromJson, ToJson};
use crate::token::{default_tokenizer, Token, TokenSequence, Tokenizer};
use crate::types::*;

/// A change notification emitted by a [`Document`]
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// The token sequence itself was edited, spans of annotations may have shifted
    TokensChanged,
    AnnotationAdded(Annotation),
    AnnotationRemoved(Annotation),
    /// An annotation got a new type, the annotation carries the new type
    AnnotationRetyped {
        old_type: String,
        annotation: Annotation,
    },
    /// An attribute of the annotation changed, the annotation carries the new state
    AnnotationChanged(Annotation),
}

/// A document is a tokenized text with annotations over its tokens.
#[derive(Serialize, Deserialize)]
pub struct Document {
    tokens: Vec<Token>,

    #[serde(default)]
    annotations: Vec<Annotation>,

    #[serde(skip, default = "default_tokenizer")]
    tokenizer: Arc<dyn Tokenizer>,

    /// Channels of everybody who subscribed to change notifications
    #[serde(skip)]
    subscribers: Vec<Sender<DocumentEvent>>,
}

impl Document {
    /// Creates a new empty document that will use the specified tokenizer
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokens: Vec::new(),
            annotations: Vec::new(),
            tokenizer,
            subscribers: Vec::new(),
        }
    }

    /// Creates a new document by tokenizing the text
    pub fn from_text(text: &str, tokenizer: Arc<dyn Tokenizer>) -> Self {
        let tokens = tokenizer.tokenize(text);
        Self::from_tokens(tokens, tokenizer)
    }

    /// Creates a new document from already tokenized text
    pub fn from_tokens(tokens: Vec<Token>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokens,
            ..Self::new(tokenizer)
        }
    }

    /// Builder pattern to add an annotation
    pub fn with_annotation(mut self, annotation: Annotation) -> Result<Self, TapasError> {
        self.annotate(annotation)?;
        Ok(self)
    }

    /// Replaces the tokenizer, for instance after deserialisation
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Subscribes to change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<DocumentEvent> {
        let (sender, receiver) = channel();
        self.subscribers.push(sender);
        receiver
    }

    fn emit(&mut self, event: DocumentEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Adds an annotation to the document, returns its identifier. An identifier
    /// is generated if the annotation has none.
    pub fn annotate(&mut self, annotation: Annotation) -> Result<String, TapasError> {
        if annotation.end() > self.tokens.len() {
            return Err(TapasError::IllegalUsage(
                "Document::annotate(): annotation span exceeds the token sequence",
            ));
        }
        let annotation = annotation.with_generated_id();
        let id = annotation.identifier().into_owned();
        if self.position(&id).is_some() {
            return Err(TapasError::IllegalUsage(
                "Document::annotate(): annotation identifier is already in use",
            ));
        }
        self.annotations.push(annotation.clone());
        self.emit(DocumentEvent::AnnotationAdded(annotation));
        Ok(id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.annotations
            .iter()
            .position(|annotation| annotation.id() == Some(id))
    }

    fn position_or_err(&self, id: &str) -> Result<usize, TapasError> {
        self.position(id)
            .ok_or_else(|| TapasError::NotFoundError(id.to_string(), "Document annotation"))
    }

    /// Returns the annotation with the specified identifier
    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.position(id).map(|pos| &self.annotations[pos])
    }

    /// Removes the annotation with the specified identifier and returns it
    pub fn remove_annotation(&mut self, id: &str) -> Result<Annotation, TapasError> {
        let pos = self.position_or_err(id)?;
        let annotation = self.annotations.remove(pos);
        self.emit(DocumentEvent::AnnotationRemoved(annotation.clone()));
        Ok(annotation)
    }

    /// Changes the type of the annotation with the specified identifier
    pub fn retype_annotation(&mut self, id: &str, newtype: &str) -> Result<(), TapasError> {
        let pos = self.position_or_err(id)?;
        let old_type = self.annotations[pos].annotationtype().to_string();
        if old_type == newtype {
            return Ok(());
        }
        self.annotations[pos].set_annotationtype(newtype);
        let annotation = self.annotations[pos].clone();
        self.emit(DocumentEvent::AnnotationRetyped {
            old_type,
            annotation,
        });
        Ok(())
    }

    /// Sets an attribute on the annotation with the specified identifier
    pub fn set_annotation_attribute(
        &mut self,
        id: &str,
        name: &str,
        value: &str,
    ) -> Result<(), TapasError> {
        let pos = self.position_or_err(id)?;
        self.annotations[pos].set_attribute(name, value);
        let annotation = self.annotations[pos].clone();
        self.emit(DocumentEvent::AnnotationChanged(annotation));
        Ok(())
    }

    /// Iterates over all annotations in the order they were added
    pub fn annotations(&self) -> std::slice::Iter<Annotation> {
        self.annotations.iter()
    }

    /// Returns all annotations of the specified type, in document order
    pub fn annotations_of_type(&self, annotationtype: &str) -> Vec<Annotation> {
        let mut annotations: Vec<Annotation> = self
            .annotations
            .iter()
            .filter(|annotation| annotation.annotationtype() == annotationtype)
            .cloned()
            .collect();
        annotations.sort_by(document_order);
        annotations
    }

    /// Returns all distinct annotation types in the document, sorted
    pub fn annotation_types(&self) -> Vec<String> {
        let types: BTreeSet<&str> = self
            .annotations
            .iter()
            .map(|annotation| annotation.annotationtype())
            .collect();
        types.into_iter().map(|s| s.to_string()).collect()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Sets a flag on the token at the specified index
    pub fn set_token_flag(&mut self, index: usize, flag: &str) -> Result<(), TapasError> {
        let token = self
            .tokens
            .get_mut(index)
            .ok_or(TapasError::IllegalUsage(
                "Document::set_token_flag(): token index out of bounds",
            ))?;
        token.set_flag(flag);
        Ok(())
    }

    /// Tokenizes the text and inserts the tokens before the token at index `at`
    /// (`at` may equal the length, which appends). Annotations after the insertion
    /// point shift, annotations spanning the insertion point grow.
    /// Returns the number of inserted tokens.
    pub fn insert_tokens(&mut self, at: usize, text: &str) -> Result<usize, TapasError> {
        if at > self.tokens.len() {
            return Err(TapasError::IllegalUsage(
                "Document::insert_tokens(): insertion point out of bounds",
            ));
        }
        let mut inserted = self.tokenizer.tokenize(text);
        let count = inserted.len();
        if count == 0 {
            return Ok(0);
        }
        if at < self.tokens.len() {
            if let Some(last) = inserted.last_mut() {
                if last.whitespace().is_empty() {
                    last.set_whitespace(" ");
                }
            }
        }
        if at > 0 {
            if let Some(prev) = self.tokens.get_mut(at - 1) {
                if prev.whitespace().is_empty() {
                    prev.set_whitespace(" ");
                }
            }
        }
        self.tokens.splice(at..at, inserted);
        for annotation in self.annotations.iter_mut() {
            if annotation.begin() >= at {
                annotation.set_span(annotation.begin() + count, annotation.size());
            } else if annotation.end() > at {
                annotation.set_span(annotation.begin(), annotation.size() + count);
            }
        }
        self.emit(DocumentEvent::TokensChanged);
        Ok(count)
    }

    /// Removes `count` tokens starting at index `at`. Annotations shrink accordingly,
    /// annotations that no longer cover any token are removed.
    pub fn remove_tokens(&mut self, at: usize, count: usize) -> Result<(), TapasError> {
        let end = match at.checked_add(count) {
            Some(end) if end <= self.tokens.len() => end,
            _ => {
                return Err(TapasError::IllegalUsage(
                    "Document::remove_tokens(): range out of bounds",
                ))
            }
        };
        if count == 0 {
            return Ok(());
        }
        self.tokens.drain(at..end);
        let mut removed = Vec::new();
        self.annotations.retain_mut(|annotation| {
            let begin = annotation.begin();
            let aend = annotation.end();
            let overlap = aend.min(end).saturating_sub(begin.max(at));
            let newsize = annotation.size() - overlap;
            if newsize == 0 {
                removed.push(annotation.clone());
                return false;
            }
            let newbegin = if begin >= end {
                begin - count
            } else if begin >= at {
                at
            } else {
                begin
            };
            annotation.set_span(newbegin, newsize);
            true
        });
        for annotation in removed {
            self.emit(DocumentEvent::AnnotationRemoved(annotation));
        }
        self.emit(DocumentEvent::TokensChanged);
        Ok(())
    }
}

impl TokenSequence for Document {
    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }
}

impl AnnotationSource for Document {
    fn annotations_of_type(&self, annotationtype: &str) -> Vec<Annotation> {
        Document::annotations_of_type(self, annotationtype)
    }

    fn annotation_types(&self) -> Vec<String> {
        Document::annotation_types(self)
    }
}

impl AnnotationSource for RefCell<Document> {
    fn annotations_of_type(&self, annotationtype: &str) -> Vec<Annotation> {
        self.borrow().annotations_of_type(annotationtype)
    }

    fn annotation_types(&self) -> Vec<String> {
        self.borrow().annotation_types()
    }
}

impl Clone for Document {
    /// Clones tokens and annotations, subscriptions are not carried over
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            annotations: self.annotations.clone(),
            tokenizer: self.tokenizer.clone(),
            subscribers: Vec::new(),
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Document")
            .field("tokenizer", &self.tokenizer.id())
            .field("tokens", &self.tokens)
            .field("annotations", &self.annotations)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[sealed]
impl TypeInfo for Document {
    fn typeinfo() -> Type {
        Type::Document
    }
}

impl ToJson for Document {}
impl FromJson for Document {}
