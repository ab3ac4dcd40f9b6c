/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module assembles enumerations ("A, B, C and D") out of element and separator annotations,
//! by applying patterns repeatedly until no new enumeration turns up.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::annotation::{document_order, Annotation};
use crate::config::{debug, Config, Configurable};
use crate::error::TapasError;
use crate::index::AnnotationIndex;
use crate::matcher::PatternMatcher;
use crate::token::TokenSequence;

/// Annotation type of assembled enumerations
pub const ENUMERATION_TYPE: &str = "enumeration";

/// Attribute of an assembled enumeration that lists the identifiers of its members, separated by spaces
pub const MEMBERS_ATTRIBUTE: &str = "members";

/// Attribute of an assembled enumeration that holds the number of members
pub const SIZE_ATTRIBUTE: &str = "size";

const ELEMENT_TYPE: &str = "cElement";
const END_ELEMENT_TYPE: &str = "eElement";
const SEPARATOR_TYPE: &str = "separator";
const END_SEPARATOR_TYPE: &str = "endSeparator";

/// Extends an enumeration by one element
const GROW_PATTERN: &str = "<enumeration> <separator> <cElement>";

/// Optionally closes an enumeration
const CLOSE_PATTERN: &str =
    "<enumeration> ((<separator>|<endSeparator>) (<cElement>|<eElement>))?";

/// The annotations an enumeration is assembled from
#[derive(Debug, Clone, Default)]
pub struct EnumerationInput {
    /// Elements an enumeration may start with
    pub start_elements: Vec<Annotation>,
    /// Elements that may continue an enumeration
    pub elements: Vec<Annotation>,
    /// Elements that may only close an enumeration
    pub end_elements: Vec<Annotation>,
    /// Separators between elements
    pub separators: Vec<Annotation>,
    /// Separators that may only precede the closing element (such as "and")
    pub end_separators: Vec<Annotation>,
}

impl EnumerationInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_elements(mut self, annotations: Vec<Annotation>) -> Self {
        self.start_elements = annotations;
        self
    }

    pub fn with_elements(mut self, annotations: Vec<Annotation>) -> Self {
        self.elements = annotations;
        self
    }

    pub fn with_end_elements(mut self, annotations: Vec<Annotation>) -> Self {
        self.end_elements = annotations;
        self
    }

    pub fn with_separators(mut self, annotations: Vec<Annotation>) -> Self {
        self.separators = annotations;
        self
    }

    pub fn with_end_separators(mut self, annotations: Vec<Annotation>) -> Self {
        self.end_separators = annotations;
        self
    }
}

/// An enumeration under construction
#[derive(Debug, Clone)]
struct Candidate {
    members: Vec<Annotation>,
    /// Stand-in for the candidate in the index, its identifier leads back to the candidate
    annotation: Annotation,
}

impl Candidate {
    fn new(members: Vec<Annotation>, serial: usize) -> Self {
        let begin = members.first().map(|m| m.begin()).unwrap_or(0);
        let end = members.last().map(|m| m.end()).unwrap_or(begin);
        Self {
            annotation: Annotation::new(ENUMERATION_TYPE, begin, end.saturating_sub(begin))
                .with_id(format!("enumeration.{}", serial)),
            members,
        }
    }

    fn key(&self) -> Vec<String> {
        member_key(&self.members)
    }

    fn to_annotation(&self) -> Annotation {
        let members: Vec<String> = self.key();
        Annotation::new(
            ENUMERATION_TYPE,
            self.annotation.begin(),
            self.annotation.size(),
        )
        .with_attribute(MEMBERS_ATTRIBUTE, members.join(" "))
        .with_attribute(SIZE_ATTRIBUTE, members.len().to_string())
    }
}

fn member_key(members: &[Annotation]) -> Vec<String> {
    members
        .iter()
        .map(|member| member.identifier().into_owned())
        .collect()
}

/// Does `inner` occur as a contiguous run inside `outer`?
fn is_contiguous_part(inner: &[String], outer: &[String]) -> bool {
    inner.len() < outer.len() && outer.windows(inner.len()).any(|window| window == inner)
}

/// Assembles enumerations.
///
/// Every start element seeds a candidate. In each round, the candidates found in the previous round are
/// extended by one separator and one element each, until a round yields no new candidate (candidates are told
/// apart by their sequence of members). A final pass optionally closes each candidate with an end separator
/// and/or end element. Candidates that are a contiguous part of a longer one are not reported, which removes
/// the seeds and partial chains of every longer enumeration. A start element that no separator connects to
/// anything is reported as an enumeration of one member.
pub struct EnumerationAssembler<'m> {
    matcher: &'m PatternMatcher,
    config: Config,
}

impl<'m> EnumerationAssembler<'m> {
    pub fn new(matcher: &'m PatternMatcher) -> Self {
        Self {
            config: matcher.config().clone(),
            matcher,
        }
    }

    /// Assembles enumerations from separately passed annotations
    pub fn enumerations(
        &self,
        tokens: &dyn TokenSequence,
        start_elements: &[Annotation],
        elements: &[Annotation],
        end_elements: &[Annotation],
        separators: &[Annotation],
        end_separators: &[Annotation],
    ) -> Result<Vec<Annotation>, TapasError> {
        let input = EnumerationInput {
            start_elements: start_elements.to_vec(),
            elements: elements.to_vec(),
            end_elements: end_elements.to_vec(),
            separators: separators.to_vec(),
            end_separators: end_separators.to_vec(),
        };
        self.assemble(tokens, &input)
    }

    /// Assembles enumerations, returns them in document order as annotations of type [`ENUMERATION_TYPE`]
    pub fn assemble(
        &self,
        tokens: &dyn TokenSequence,
        input: &EnumerationInput,
    ) -> Result<Vec<Annotation>, TapasError> {
        let grow = self.matcher.compile(GROW_PATTERN, tokens.tokenizer())?;
        let close = self.matcher.compile(CLOSE_PATTERN, tokens.tokenizer())?;

        let base = Rc::new(AnnotationIndex::new());
        base.add_all_as(input.elements.iter().cloned(), ELEMENT_TYPE);
        base.add_all_as(input.end_elements.iter().cloned(), END_ELEMENT_TYPE);
        base.add_all_as(input.separators.iter().cloned(), SEPARATOR_TYPE);
        base.add_all_as(input.end_separators.iter().cloned(), END_SEPARATOR_TYPE);

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut frontier: Vec<usize> = Vec::new();
        for start in input.start_elements.iter() {
            let candidate = Candidate::new(vec![start.clone()], candidates.len());
            if seen.insert(candidate.key()) {
                frontier.push(candidates.len());
                positions.insert(candidate.annotation.identifier().into_owned(), candidates.len());
                candidates.push(candidate);
            }
        }

        let mut round = 0;
        while !frontier.is_empty() {
            if round >= self.config.enumeration_max_rounds() {
                debug(&self.config, || {
                    format!(
                        "EnumerationAssembler: giving up after {} rounds with {} open candidate(s)",
                        round,
                        frontier.len()
                    )
                });
                break;
            }
            round += 1;
            let index = AnnotationIndex::new().with_parent(base.clone());
            for i in frontier.iter() {
                index.add(candidates[*i].annotation.clone());
            }
            let mut grown: Vec<Vec<Annotation>> = Vec::new();
            for m in self.matcher.match_pattern(tokens, &index, &grow) {
                let leaves = m.tree().annotations();
                if let ([_, _, element], Some(parent)) = (
                    leaves.as_slice(),
                    leaves
                        .first()
                        .and_then(|leaf| positions.get(&*leaf.identifier())),
                ) {
                    let mut members = candidates[*parent].members.clone();
                    members.push((*element).clone());
                    grown.push(members);
                }
            }
            index.dispose(false);
            frontier.clear();
            for members in grown {
                let candidate = Candidate::new(members, candidates.len());
                if seen.insert(candidate.key()) {
                    frontier.push(candidates.len());
                    positions
                        .insert(candidate.annotation.identifier().into_owned(), candidates.len());
                    candidates.push(candidate);
                }
            }
            debug(&self.config, || {
                format!(
                    "EnumerationAssembler: round {} produced {} new candidate(s)",
                    round,
                    frontier.len()
                )
            });
        }

        // closing pass over all candidates
        let index = AnnotationIndex::new().with_parent(base.clone());
        for candidate in candidates.iter() {
            index.add(candidate.annotation.clone());
        }
        let mut results: Vec<Candidate> = Vec::new();
        let mut reported: HashSet<Vec<String>> = HashSet::new();
        for m in self.matcher.match_pattern(tokens, &index, &close) {
            let leaves = m.tree().annotations();
            let parent = match leaves
                .first()
                .and_then(|leaf| positions.get(&*leaf.identifier()))
            {
                Some(parent) => *parent,
                None => continue,
            };
            let mut members = candidates[parent].members.clone();
            if let [_, _, element] = leaves.as_slice() {
                members.push((*element).clone());
            }
            let candidate = Candidate::new(members, results.len());
            if reported.insert(candidate.key()) {
                results.push(candidate);
            }
        }
        index.dispose(false);
        base.dispose(false);

        let keys: Vec<Vec<String>> = results.iter().map(|c| c.key()).collect();
        let mut enumerations: Vec<Annotation> = results
            .iter()
            .zip(keys.iter())
            .filter(|(_, key)| !keys.iter().any(|other| is_contiguous_part(key, other)))
            .map(|(candidate, _)| candidate.to_annotation())
            .collect();
        enumerations.sort_by(document_order);
        debug(&self.config, || {
            format!(
                "EnumerationAssembler: {} enumeration(s) after {} round(s), {} candidate(s) considered",
                enumerations.len(),
                round,
                candidates.len()
            )
        });
        Ok(enumerations)
    }
}

impl<'m> Configurable for EnumerationAssembler<'m> {
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
