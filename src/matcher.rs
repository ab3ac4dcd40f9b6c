/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module contains the backtracking matcher that applies compiled patterns to token sequences,
//! and [`PatternMatcher`], the main entry point of the library.

use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::annotation::Annotation;
use crate::attributes::apply_setters;
use crate::cache::PatternCache;
use crate::config::{debug, Config, Configurable};
use crate::document::Document;
use crate::enumeration::{EnumerationAssembler, EnumerationInput};
use crate::error::TapasError;
use crate::expression::{ExpressionContext, ExpressionEngine, SimpleExpressions};
use crate::index::{AnnotationIndex, AnnotationLookup};
use crate::literals::{regex_type, PatternLiteralIndexer};
use crate::pattern::{AnnotationMatcher, ElementKind, Pattern, PatternElement};
use crate::token::{TokenSequence, Tokenizer};

/// One complete match of a pattern, as a tree that mirrors the pattern elements that matched
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTree {
    /// The match as a whole, its children correspond to the top-level pattern elements (one per repetition)
    Root {
        begin: usize,
        end: usize,
        children: Vec<MatchTree>,
    },
    /// One repetition of a group
    Internal {
        element: Arc<PatternElement>,
        begin: usize,
        end: usize,
        children: Vec<MatchTree>,
    },
    /// One repetition of a literal, a regular expression literal, or an annotation matcher
    Leaf {
        element: Arc<PatternElement>,
        begin: usize,
        end: usize,
        /// The matched annotation (for annotation matchers) or regular expression span
        annotation: Option<Annotation>,
    },
}

impl MatchTree {
    /// Index of the first matched token
    pub fn begin(&self) -> usize {
        match self {
            Self::Root { begin, .. } | Self::Internal { begin, .. } | Self::Leaf { begin, .. } => {
                *begin
            }
        }
    }

    /// Index of the first token after the match
    pub fn end(&self) -> usize {
        match self {
            Self::Root { end, .. } | Self::Internal { end, .. } | Self::Leaf { end, .. } => *end,
        }
    }

    pub fn size(&self) -> usize {
        self.end() - self.begin()
    }

    /// The pattern element this node matched, `None` for the root
    pub fn element(&self) -> Option<&PatternElement> {
        match self {
            Self::Root { .. } => None,
            Self::Internal { element, .. } | Self::Leaf { element, .. } => Some(element),
        }
    }

    pub fn children(&self) -> &[MatchTree] {
        match self {
            Self::Root { children, .. } | Self::Internal { children, .. } => children,
            Self::Leaf { .. } => &[],
        }
    }

    /// Returns all leaves, depth-first (i.e. in token order)
    pub fn leaves(&self) -> Vec<&MatchTree> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a MatchTree>) {
        match self {
            Self::Leaf { .. } => leaves.push(self),
            _ => {
                for child in self.children() {
                    child.collect_leaves(leaves);
                }
            }
        }
    }

    /// Returns the matched annotations of all leaves that have one, in token order
    pub fn annotations(&self) -> Vec<&Annotation> {
        self.leaves()
            .into_iter()
            .filter_map(|leaf| match leaf {
                Self::Leaf {
                    annotation: Some(annotation),
                    ..
                } => Some(annotation),
                _ => None,
            })
            .collect()
    }
}

/// A match of a pattern, with the attributes computed by the attribute setters of the pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    tree: MatchTree,
    attributes: BTreeMap<String, String>,
}

impl PatternMatch {
    pub fn tree(&self) -> &MatchTree {
        &self.tree
    }

    pub fn begin(&self) -> usize {
        self.tree.begin()
    }

    pub fn end(&self) -> usize {
        self.tree.end()
    }

    pub fn size(&self) -> usize {
        self.tree.size()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Converts the match into an annotation of the given type, carrying the match attributes
    pub fn to_annotation(&self, annotationtype: &str) -> Annotation {
        Annotation::new(annotationtype, self.begin(), self.size())
            .with_attributes(self.attributes.clone())
    }
}

/// A persistent singly linked list, search states share their common tails
struct Link<T> {
    head: T,
    tail: Chain<T>,
}

type Chain<T> = Option<Rc<Link<T>>>;

impl<T> Drop for Link<T> {
    /// Unlinks iteratively, so that dropping a long chain does not recurse once per link
    fn drop(&mut self) {
        let mut tail = self.tail.take();
        while let Some(link) = tail {
            match Rc::try_unwrap(link) {
                Ok(mut link) => tail = link.tail.take(),
                Err(_) => break,
            }
        }
    }
}

fn cons<T>(tail: &Chain<T>, head: T) -> Chain<T> {
    Some(Rc::new(Link {
        head,
        tail: tail.clone(),
    }))
}

/// Returns the items of the chain, oldest first
fn collect_chain<T: Clone>(chain: &Chain<T>) -> Vec<T> {
    let mut items = Vec::new();
    let mut link = chain.as_deref();
    while let Some(current) = link {
        items.push(current.head.clone());
        link = current.tail.as_deref();
    }
    items.reverse();
    items
}

/// Something that remains to be matched
#[derive(Clone, Copy)]
enum Goal<'p> {
    /// `elements[i..]`, where element `i` has been matched `count` times already
    Elements {
        elements: &'p [Arc<PatternElement>],
        i: usize,
        count: usize,
    },
    /// Completes one repetition of a group that began at `begin`, after `count` earlier repetitions
    Close {
        element: &'p Arc<PatternElement>,
        count: usize,
        begin: usize,
    },
}

/// A point in the search: the goals ahead, and the partial match tree and attributes behind
#[derive(Clone)]
struct State<'p> {
    goals: Chain<Goal<'p>>,
    offset: usize,
    /// Nodes of the innermost open group (or the root), newest first
    children: Chain<MatchTree>,
    /// Nodes of the enclosing open groups, innermost group first
    outer: Chain<Chain<MatchTree>>,
    /// Attributes accumulated from all nodes matched so far
    attributes: Rc<BTreeMap<String, String>>,
}

/// Opens a repetition of a group: the children are matched first, then the repetition is closed
fn open_group<'p>(
    next: State<'p>,
    element: &'p Arc<PatternElement>,
    count: usize,
    children: &'p [Arc<PatternElement>],
) -> State<'p> {
    let State {
        goals,
        offset,
        children: siblings,
        outer,
        attributes,
    } = next;
    let goals = cons(
        &goals,
        Goal::Close {
            element,
            count,
            begin: offset,
        },
    );
    State {
        goals: cons(
            &goals,
            Goal::Elements {
                elements: children,
                i: 0,
                count: 0,
            },
        ),
        offset,
        children: None,
        outer: cons(&outer, siblings),
        attributes,
    }
}

/// The state of matching one pattern against one token sequence
struct Session<'s> {
    tokens: &'s dyn TokenSequence,
    index: &'s dyn AnnotationLookup,
    literals: &'s AnnotationIndex,
    config: &'s Config,
    matches: Vec<PatternMatch>,
}

impl<'s> Session<'s> {
    /// Collects all matches that start at the specified token.
    ///
    /// The search is depth-first over an explicit stack of pending states, so its depth is not bounded by the
    /// native stack. Successors are explored in order: advancing past an element before repeating it,
    /// candidates in index order, alternatives in the order they are written.
    fn match_at<'p>(&mut self, pattern: &'p Pattern, start: usize) {
        let mut pending: Vec<State<'p>> = vec![State {
            goals: cons(
                &None,
                Goal::Elements {
                    elements: pattern.elements(),
                    i: 0,
                    count: 0,
                },
            ),
            offset: start,
            children: None,
            outer: None,
            attributes: Rc::new(BTreeMap::new()),
        }];
        while let Some(state) = pending.pop() {
            let mark = pending.len();
            self.expand(state, start, &mut pending);
            pending[mark..].reverse();
        }
    }

    /// Pushes the successors of a state, most preferred first
    fn expand<'p>(&mut self, state: State<'p>, start: usize, successors: &mut Vec<State<'p>>) {
        let (goal, rest) = match state.goals.as_deref() {
            Some(link) => (link.head, link.tail.clone()),
            None => {
                self.complete(state, start);
                return;
            }
        };
        match goal {
            Goal::Elements { elements, i, count } => {
                let element = match elements.get(i) {
                    Some(element) => element,
                    None => {
                        successors.push(State {
                            goals: rest,
                            ..state
                        });
                        return;
                    }
                };
                if count >= element.min() {
                    successors.push(State {
                        goals: cons(
                            &rest,
                            Goal::Elements {
                                elements,
                                i: i + 1,
                                count: 0,
                            },
                        ),
                        ..state.clone()
                    });
                }
                if count < element.max() {
                    let next = State {
                        goals: cons(
                            &rest,
                            Goal::Elements {
                                elements,
                                i,
                                count: count + 1,
                            },
                        ),
                        ..state
                    };
                    self.repeat(element, count, next, successors);
                }
            }
            Goal::Close {
                element,
                count,
                begin,
            } => {
                if state.offset == begin && count >= element.min() {
                    // a zero-width repetition beyond the minimum would repeat forever
                    return;
                }
                let (children, outer) = match state.outer.as_deref() {
                    Some(link) => (link.head.clone(), link.tail.clone()),
                    None => return,
                };
                let node = MatchTree::Internal {
                    element: element.clone(),
                    begin,
                    end: state.offset,
                    children: collect_chain(&state.children),
                };
                let parent = State {
                    goals: rest,
                    offset: state.offset,
                    children,
                    outer,
                    attributes: state.attributes,
                };
                successors.push(self.accept(parent, node, element));
            }
        }
    }

    /// Pushes a successor for every way the element matches once more at the offset of `next`,
    /// which already carries the goals that follow this repetition
    fn repeat<'p>(
        &self,
        element: &'p Arc<PatternElement>,
        count: usize,
        next: State<'p>,
        successors: &mut Vec<State<'p>>,
    ) {
        let offset = next.offset;
        match element.kind() {
            ElementKind::Literal { tokens, .. } => {
                let end = offset + tokens.len();
                if end <= self.tokens.len()
                    && tokens
                        .iter()
                        .enumerate()
                        .all(|(j, token)| self.tokens.value(offset + j) == token.as_str())
                {
                    successors.push(self.accept_leaf(next, element, end, None));
                }
            }
            ElementKind::RegexLiteral(regex) => {
                for candidate in self.literals.annotations(&regex_type(regex), offset) {
                    let end = candidate.end();
                    successors.push(self.accept_leaf(next.clone(), element, end, Some(candidate)));
                }
            }
            ElementKind::Annotation(matcher) => {
                for candidate in self.index.annotations(matcher.annotationtype(), offset) {
                    if candidate.size() > 0 && self.accepts(matcher, &candidate) {
                        let end = candidate.end();
                        successors
                            .push(self.accept_leaf(next.clone(), element, end, Some(candidate)));
                    }
                }
            }
            ElementKind::Sequence(children) => {
                successors.push(open_group(next, element, count, children));
            }
            ElementKind::Alternative(children) => {
                for child in children.iter() {
                    successors.push(open_group(
                        next.clone(),
                        element,
                        count,
                        std::slice::from_ref(child),
                    ));
                }
            }
        }
    }

    fn accept_leaf<'p>(
        &self,
        state: State<'p>,
        element: &'p Arc<PatternElement>,
        end: usize,
        annotation: Option<Annotation>,
    ) -> State<'p> {
        let node = MatchTree::Leaf {
            element: element.clone(),
            begin: state.offset,
            end,
            annotation,
        };
        let mut state = self.accept(state, node, element);
        state.offset = end;
        state
    }

    /// Adds a node to the innermost open group and merges the values of the element's attribute setters
    fn accept<'p>(&self, state: State<'p>, node: MatchTree, element: &PatternElement) -> State<'p> {
        let State {
            goals,
            offset,
            children,
            outer,
            attributes,
        } = state;
        let attributes = if element.setters().is_empty() {
            attributes
        } else {
            let context = match &node {
                MatchTree::Leaf {
                    annotation: Some(annotation),
                    ..
                } => annotation.clone(),
                node => Annotation::new("", node.begin(), node.size()),
            };
            match apply_setters(
                element.setters(),
                self.tokens,
                &context,
                &attributes,
                self.config,
            ) {
                Some(merged) => Rc::new(merged),
                None => attributes,
            }
        };
        State {
            goals,
            offset,
            children: cons(&children, node),
            outer,
            attributes,
        }
    }

    /// Reports a state without goals as a match, unless nothing but optional elements matched
    fn complete(&mut self, state: State<'_>, start: usize) {
        if state.offset == start {
            return;
        }
        self.matches.push(PatternMatch {
            tree: MatchTree::Root {
                begin: start,
                end: state.offset,
                children: collect_chain(&state.children),
            },
            attributes: state.attributes.as_ref().clone(),
        });
    }

    /// Tests a candidate annotation against the attribute constraints and test expression of a matcher.
    /// A test expression that fails to evaluate counts as false.
    fn accepts(&self, matcher: &AnnotationMatcher, candidate: &Annotation) -> bool {
        matcher
            .constraints()
            .iter()
            .all(|constraint| constraint.test(candidate.attribute(constraint.name())))
            && matcher
                .test()
                .map(|test| {
                    test.evaluate(&ExpressionContext::new(self.tokens, candidate))
                        .map(|value| value.as_bool())
                        .unwrap_or(false)
                })
                .unwrap_or(true)
    }
}

/// Matches patterns against token sequences. This is the main entry point of the library.
///
/// A matcher holds a configuration, a (shareable) cache of compiled patterns and the expression engine used
/// to compile expressions in patterns. It holds no per-document state, so a single matcher can be used from many threads.
pub struct PatternMatcher {
    config: Config,
    cache: Arc<PatternCache>,
    expressions: Arc<dyn ExpressionEngine>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl PatternMatcher {
    /// Creates a new matcher with its own cache, using the built-in expression engine
    pub fn new(config: Config) -> Self {
        Self {
            cache: Arc::new(PatternCache::new(config.clone())),
            config,
            expressions: Arc::new(SimpleExpressions),
            interrupt: None,
        }
    }

    /// Builder pattern to use a (shared) cache
    pub fn with_cache(mut self, cache: Arc<PatternCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Builder pattern to use another expression engine. Note that the cache does not
    /// distinguish expression engines, use a separate cache per engine.
    pub fn with_expressions(mut self, expressions: Arc<dyn ExpressionEngine>) -> Self {
        self.expressions = expressions;
        self
    }

    /// Builder pattern to set an interruption flag. Matching checks the flag before every start offset
    /// and stops early when it is set, returning the matches found so far.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn cache(&self) -> &Arc<PatternCache> {
        &self.cache
    }

    pub fn expressions(&self) -> &dyn ExpressionEngine {
        self.expressions.as_ref()
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Compiles a pattern for use with token sequences produced by the tokenizer, through the cache
    pub fn compile(
        &self,
        source: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Result<Arc<Pattern>, TapasError> {
        debug(&self.config, || {
            format!("PatternMatcher: compiling {} for tokenizer {}", source, tokenizer.id())
        });
        self.cache
            .get_or_compile(source, tokenizer, self.expressions.as_ref())
    }

    /// Matches a compiled pattern against a token sequence, with annotations provided by the index.
    /// Matching is attempted at every token; results are sorted by begin offset, longer matches first.
    /// Matches at the same begin offset and of the same size are in the order they were found.
    pub fn match_pattern(
        &self,
        tokens: &dyn TokenSequence,
        index: &dyn AnnotationLookup,
        pattern: &Pattern,
    ) -> Vec<PatternMatch> {
        let literals = match PatternLiteralIndexer::new(&self.config).index(pattern, tokens) {
            Ok(literals) => literals,
            Err(e) => {
                debug(&self.config, || {
                    format!("PatternMatcher: regular expressions not indexed: {}", e)
                });
                AnnotationIndex::new()
            }
        };
        let mut session = Session {
            tokens,
            index,
            literals: &literals,
            config: &self.config,
            matches: Vec::new(),
        };
        for start in 0..tokens.len() {
            if self.interrupted() {
                debug(&self.config, || {
                    format!("PatternMatcher: interrupted at token {}", start)
                });
                break;
            }
            session.match_at(pattern, start);
        }
        let mut matches = session.matches;
        matches.sort_by(|a, b| a.begin().cmp(&b.begin()).then(b.size().cmp(&a.size())));
        debug(&self.config, || {
            format!(
                "PatternMatcher: {} match(es) for {} over {} token(s)",
                matches.len(),
                pattern.source(),
                tokens.len()
            )
        });
        matches
    }

    /// Compiles the pattern (through the cache) and matches it
    pub fn find_matches(
        &self,
        tokens: &dyn TokenSequence,
        index: &dyn AnnotationLookup,
        source: &str,
    ) -> Result<Vec<PatternMatch>, TapasError> {
        let pattern = self.compile(source, tokens.tokenizer())?;
        Ok(self.match_pattern(tokens, index, &pattern))
    }

    /// Compiles the pattern and returns its matches as annotations of the specified type, carrying the match attributes.
    /// Matches that would yield identical annotations are only reported once.
    pub fn find_annotations(
        &self,
        tokens: &dyn TokenSequence,
        index: &dyn AnnotationLookup,
        source: &str,
        annotationtype: &str,
    ) -> Result<Vec<Annotation>, TapasError> {
        let mut annotations: Vec<Annotation> = Vec::new();
        let mut seen: HashSet<(usize, usize, BTreeMap<String, String>)> = HashSet::new();
        for m in self.find_matches(tokens, index, source)? {
            if seen.insert((m.begin(), m.size(), m.attributes().clone())) {
                annotations.push(m.to_annotation(annotationtype));
            }
        }
        Ok(annotations)
    }

    /// Finds annotations in many documents in parallel. Every document is matched against its own
    /// annotations, the cache of compiled patterns is shared. Results are in the order of the documents.
    pub fn find_annotations_in_documents(
        &self,
        documents: &[Document],
        source: &str,
        annotationtype: &str,
    ) -> Result<Vec<Vec<Annotation>>, TapasError> {
        documents
            .par_iter()
            .map(|document| {
                let index = AnnotationIndex::from_annotations(document.annotations().cloned());
                self.find_annotations(document, &index, source, annotationtype)
            })
            .collect()
    }

    /// Assembles enumerations, see [`EnumerationAssembler`]
    pub fn enumerations(
        &self,
        tokens: &dyn TokenSequence,
        input: &EnumerationInput,
    ) -> Result<Vec<Annotation>, TapasError> {
        EnumerationAssembler::new(self).assemble(tokens, input)
    }
}

impl Configurable for PatternMatcher {
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
