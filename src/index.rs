/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module contains the [`AnnotationIndex`], which maps (type, begin) to annotations and is
//! what the matcher queries, and the [`ObservingIndex`], which keeps such an index in sync with a
//! mutable [`Document`].

use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;
use std::sync::mpsc::Receiver;

use crate::annotation::Annotation;
use crate::config::{debug, Config, Configurable};
use crate::document::{Document, DocumentEvent};

/// Anything that can hand out annotations by type, an index materializes from such a source.
pub trait AnnotationSource {
    /// Returns all annotations of the specified type
    fn annotations_of_type(&self, annotationtype: &str) -> Vec<Annotation>;

    /// Returns all annotation types that are available
    fn annotation_types(&self) -> Vec<String>;
}

impl AnnotationSource for [Annotation] {
    fn annotations_of_type(&self, annotationtype: &str) -> Vec<Annotation> {
        self.iter()
            .filter(|annotation| annotation.annotationtype() == annotationtype)
            .cloned()
            .collect()
    }

    fn annotation_types(&self) -> Vec<String> {
        let types: BTreeSet<&str> = self.iter().map(|a| a.annotationtype()).collect();
        types.into_iter().map(|s| s.to_string()).collect()
    }
}

impl AnnotationSource for Vec<Annotation> {
    fn annotations_of_type(&self, annotationtype: &str) -> Vec<Annotation> {
        self.as_slice().annotations_of_type(annotationtype)
    }

    fn annotation_types(&self) -> Vec<String> {
        self.as_slice().annotation_types()
    }
}

/// Read access to annotations by type and start offset, this is all the matcher needs.
pub trait AnnotationLookup {
    /// Returns the annotations of the specified type starting at the specified token, in insertion order and with at most one annotation per size.
    /// An unindexed type yields an empty result.
    fn annotations(&self, annotationtype: &str, begin: usize) -> Vec<Annotation>;

    /// Returns all annotation types this lookup knows about, sorted
    fn annotation_types(&self) -> Vec<String>;
}

/// Annotations sharing a type and a begin offset
type Bucket = SmallVec<[Annotation; 2]>;

#[derive(Default)]
struct IndexState {
    /// type => begin => annotations
    types: HashMap<String, HashMap<usize, Bucket>>,

    /// types that have been pulled from the source already
    materialized: HashSet<String>,
}

/// A multimap from (type, begin) to annotations.
///
/// The index may be attached to an [`AnnotationSource`] (typically a [`Document`]), in which case a
/// type is materialized lazily: the first time it is touched all annotations of that type are pulled from the
/// source, after that the type is never pulled again. The index may also have a parent index, lookups then read
/// through to the parent and merge its results after the index's own ones. A child never mutates its parent.
///
/// An index holds on to its source and parent until [`Self::dispose()`] is called (or it is dropped).
pub struct AnnotationIndex {
    state: RefCell<IndexState>,
    source: RefCell<Option<Rc<dyn AnnotationSource>>>,
    parent: RefCell<Option<Rc<AnnotationIndex>>>,
    disposed: Cell<bool>,
    config: Config,
}

impl Default for AnnotationIndex {
    fn default() -> Self {
        Self {
            state: RefCell::new(IndexState::default()),
            source: RefCell::new(None),
            parent: RefCell::new(None),
            disposed: Cell::new(false),
            config: Config::default(),
        }
    }
}

impl AnnotationIndex {
    /// Creates a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index that materializes types lazily from the source
    pub fn from_source(source: Rc<dyn AnnotationSource>) -> Self {
        Self {
            source: RefCell::new(Some(source)),
            ..Self::default()
        }
    }

    /// Creates an index from annotations, each indexed under its own type
    pub fn from_annotations<I>(annotations: I) -> Self
    where
        I: IntoIterator<Item = Annotation>,
    {
        let index = Self::new();
        index.add_all(annotations);
        index
    }

    /// Builder pattern to set a parent index to read through to
    pub fn with_parent(self, parent: Rc<AnnotationIndex>) -> Self {
        self.parent.replace(Some(parent));
        self
    }

    /// Builder pattern to attach a source to materialize from
    pub fn with_source(self, source: Rc<dyn AnnotationSource>) -> Self {
        self.source.replace(Some(source));
        self
    }

    /// Pulls all annotations of the type from the source, unless done before
    fn materialize(&self, annotationtype: &str) {
        if self.state.borrow().materialized.contains(annotationtype) {
            return;
        }
        let pulled = match self.source.borrow().as_ref() {
            Some(source) => source.annotations_of_type(annotationtype),
            None => Vec::new(),
        };
        debug(&self.config, || {
            format!(
                "AnnotationIndex: materialized type {} with {} annotation(s)",
                annotationtype,
                pulled.len()
            )
        });
        let mut state = self.state.borrow_mut();
        state.materialized.insert(annotationtype.to_string());
        let buckets = state.types.entry(annotationtype.to_string()).or_default();
        for annotation in pulled {
            insert_into(buckets, annotation);
        }
    }

    /// Adds an annotation, indexed under its own type. Returns false if the bucket already
    /// held an annotation of the same size (the earlier one is kept).
    pub fn add(&self, annotation: Annotation) -> bool {
        let annotationtype = annotation.annotationtype().to_string();
        self.add_as(annotation, &annotationtype)
    }

    /// Adds an annotation, indexed under the specified type rather than its own. The
    /// annotation itself is stored unaltered.
    pub fn add_as(&self, annotation: Annotation, annotationtype: &str) -> bool {
        if self.disposed.get() {
            return false;
        }
        self.materialize(annotationtype);
        let mut state = self.state.borrow_mut();
        let buckets = state.types.entry(annotationtype.to_string()).or_default();
        insert_into(buckets, annotation)
    }

    /// Adds all annotations, each under its own type
    pub fn add_all<I>(&self, annotations: I)
    where
        I: IntoIterator<Item = Annotation>,
    {
        for annotation in annotations {
            self.add(annotation);
        }
    }

    /// Adds all annotations under the specified type
    pub fn add_all_as<I>(&self, annotations: I, annotationtype: &str)
    where
        I: IntoIterator<Item = Annotation>,
    {
        for annotation in annotations {
            self.add_as(annotation, annotationtype);
        }
    }

    /// Removes an annotation that was indexed under its own type. Returns true if it was found.
    pub fn remove(&self, annotation: &Annotation) -> bool {
        self.remove_as(annotation, annotation.annotationtype())
    }

    /// Removes an annotation that was indexed under the specified type. Returns true if it was found.
    pub fn remove_as(&self, annotation: &Annotation, annotationtype: &str) -> bool {
        if self.disposed.get() {
            return false;
        }
        self.materialize(annotationtype);
        self.remove_from(annotationtype, annotation)
    }

    /// Removes all the annotations (each indexed under its own type), returns how many were found
    pub fn remove_all<'a, I>(&self, annotations: I) -> usize
    where
        I: IntoIterator<Item = &'a Annotation>,
    {
        annotations
            .into_iter()
            .filter(|annotation| self.remove(annotation))
            .count()
    }

    fn remove_from(&self, annotationtype: &str, annotation: &Annotation) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(buckets) = state.types.get_mut(annotationtype) {
            if let Some(bucket) = buckets.get_mut(&annotation.begin()) {
                let identifier = annotation.identifier();
                if let Some(pos) = bucket.iter().position(|candidate| {
                    candidate.size() == annotation.size() && candidate.identifier() == identifier
                }) {
                    bucket.remove(pos);
                    if bucket.is_empty() {
                        buckets.remove(&annotation.begin());
                    }
                    return true;
                }
            }
        }
        false
    }

    /// Returns the annotations of the specified type that start at the specified token.
    /// Results are in insertion order, this index's own annotations before those of the parent, and hold at most one annotation per size.
    pub fn annotations(&self, annotationtype: &str, begin: usize) -> Vec<Annotation> {
        if self.disposed.get() {
            return Vec::new();
        }
        self.materialize(annotationtype);
        let mut results: Vec<Annotation> = self
            .state
            .borrow()
            .types
            .get(annotationtype)
            .and_then(|buckets| buckets.get(&begin))
            .map(|bucket| bucket.to_vec())
            .unwrap_or_default();
        if let Some(parent) = self.parent.borrow().as_ref() {
            for annotation in parent.annotations(annotationtype, begin) {
                if !results.iter().any(|r| r.size() == annotation.size()) {
                    results.push(annotation);
                }
            }
        }
        results
    }

    /// Returns all annotation types known to this index, its source and its parent, sorted
    pub fn annotation_types(&self) -> Vec<String> {
        if self.disposed.get() {
            return Vec::new();
        }
        let mut types: BTreeSet<String> = self
            .state
            .borrow()
            .types
            .iter()
            .filter(|(_, buckets)| !buckets.is_empty())
            .map(|(annotationtype, _)| annotationtype.clone())
            .collect();
        if let Some(source) = self.source.borrow().as_ref() {
            types.extend(source.annotation_types());
        }
        if let Some(parent) = self.parent.borrow().as_ref() {
            types.extend(parent.annotation_types());
        }
        types.into_iter().collect()
    }

    /// Returns the number of annotations held by this index itself (not counting the parent, nor types not materialized yet)
    pub fn len(&self) -> usize {
        self.state
            .borrow()
            .types
            .values()
            .flat_map(|buckets| buckets.values())
            .map(|bucket| bucket.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all state and releases the source. If `cascade` is set, the parent is disposed as well,
    /// the reference to the parent is released in either case.
    pub fn dispose(&self, cascade: bool) {
        debug(&self.config, || {
            format!("AnnotationIndex: disposing (cascade={})", cascade)
        });
        {
            let mut state = self.state.borrow_mut();
            state.types.clear();
            state.materialized.clear();
        }
        self.source.replace(None);
        if let Some(parent) = self.parent.replace(None) {
            if cascade {
                parent.dispose(true);
            }
        }
        self.disposed.set(true);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn is_materialized(&self, annotationtype: &str) -> bool {
        self.state.borrow().materialized.contains(annotationtype)
    }

    /// Drops all materialized types, they will be pulled from the source again on next use
    pub(crate) fn invalidate(&self) {
        let mut state = self.state.borrow_mut();
        state.types.clear();
        state.materialized.clear();
    }

    /// Applies a document change, but only to types that were materialized already
    pub(crate) fn patch(&self, event: &DocumentEvent) {
        match event {
            DocumentEvent::TokensChanged => self.invalidate(),
            DocumentEvent::AnnotationAdded(annotation) => {
                if self.is_materialized(annotation.annotationtype()) {
                    self.insert_materialized(annotation.clone());
                }
            }
            DocumentEvent::AnnotationRemoved(annotation) => {
                if self.is_materialized(annotation.annotationtype())
                    && self.remove_from(annotation.annotationtype(), annotation)
                {
                    self.refill(annotation.annotationtype(), annotation.begin());
                }
            }
            DocumentEvent::AnnotationRetyped {
                old_type,
                annotation,
            } => {
                if self.is_materialized(old_type) && self.remove_from(old_type, annotation) {
                    self.refill(old_type, annotation.begin());
                }
                if self.is_materialized(annotation.annotationtype()) {
                    self.insert_materialized(annotation.clone());
                }
            }
            DocumentEvent::AnnotationChanged(annotation) => {
                if self.is_materialized(annotation.annotationtype()) {
                    self.remove_from(annotation.annotationtype(), annotation);
                    self.insert_materialized(annotation.clone());
                }
            }
        }
    }

    /// Pulls the annotations of the type at `begin` from the source again, filling sizes that were
    /// shadowed by an annotation that has just been removed
    fn refill(&self, annotationtype: &str, begin: usize) {
        let pulled: Vec<Annotation> = match self.source.borrow().as_ref() {
            Some(source) => source
                .annotations_of_type(annotationtype)
                .into_iter()
                .filter(|annotation| annotation.begin() == begin)
                .collect(),
            None => return,
        };
        if pulled.is_empty() {
            return;
        }
        let mut state = self.state.borrow_mut();
        let buckets = state.types.entry(annotationtype.to_string()).or_default();
        for annotation in pulled {
            insert_into(buckets, annotation);
        }
    }

    fn insert_materialized(&self, annotation: Annotation) {
        let mut state = self.state.borrow_mut();
        let buckets = state
            .types
            .entry(annotation.annotationtype().to_string())
            .or_default();
        insert_into(buckets, annotation);
    }
}

/// Inserts into the bucket for the annotation's begin, unless an annotation of equal size is already there
fn insert_into(buckets: &mut HashMap<usize, Bucket>, annotation: Annotation) -> bool {
    let bucket = buckets.entry(annotation.begin()).or_default();
    if bucket.iter().any(|a| a.size() == annotation.size()) {
        false
    } else {
        bucket.push(annotation);
        true
    }
}

impl Configurable for AnnotationIndex {
    fn config(&self) -> &Config {
        &self.config
    }

    fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    fn set_config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }
}

impl AnnotationLookup for AnnotationIndex {
    fn annotations(&self, annotationtype: &str, begin: usize) -> Vec<Annotation> {
        AnnotationIndex::annotations(self, annotationtype, begin)
    }

    fn annotation_types(&self) -> Vec<String> {
        AnnotationIndex::annotation_types(self)
    }
}

/// An [`AnnotationIndex`] that stays in sync with a mutable [`Document`].
///
/// Pending change notifications are applied at the start of every lookup: token edits
/// invalidate everything, annotation changes are patched into types that were materialized
/// already. Types that were never requested are left alone.
pub struct ObservingIndex {
    index: AnnotationIndex,
    events: RefCell<Option<Receiver<DocumentEvent>>>,
}

impl ObservingIndex {
    /// Creates a new index observing the document
    pub fn new(document: Rc<RefCell<Document>>) -> Self {
        let events = document.borrow_mut().subscribe();
        Self {
            index: AnnotationIndex::from_source(document),
            events: RefCell::new(Some(events)),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.index.set_config(config);
        self
    }

    /// Applies all pending change notifications
    pub fn sync(&self) {
        if let Some(events) = self.events.borrow().as_ref() {
            while let Ok(event) = events.try_recv() {
                debug(self.index.config(), || {
                    format!("ObservingIndex: applying {:?}", event)
                });
                self.index.patch(&event);
            }
        }
    }

    /// Returns the annotations of the specified type starting at the specified token
    pub fn annotations(&self, annotationtype: &str, begin: usize) -> Vec<Annotation> {
        self.sync();
        self.index.annotations(annotationtype, begin)
    }

    /// Gives access to the underlying index, after applying pending change notifications
    pub fn index(&self) -> &AnnotationIndex {
        self.sync();
        &self.index
    }

    /// Unsubscribes from the document and disposes the underlying index
    pub fn dispose(&self) {
        self.events.replace(None);
        self.index.dispose(false);
    }
}

impl AnnotationLookup for ObservingIndex {
    fn annotations(&self, annotationtype: &str, begin: usize) -> Vec<Annotation> {
        ObservingIndex::annotations(self, annotationtype, begin)
    }

    fn annotation_types(&self) -> Vec<String> {
        self.sync();
        self.index.annotation_types()
    }
}
