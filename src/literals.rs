/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module pre-indexes the regular expression literals of a pattern, so the matcher can treat
//! them like any other annotation lookup.

use regex::Regex;

use crate::annotation::Annotation;
use crate::config::{debug, Config};
use crate::error::TapasError;
use crate::index::AnnotationIndex;
use crate::pattern::Pattern;
use crate::token::TokenSequence;

/// Returns the synthetic annotation type under which matches of a regular expression literal are indexed
pub fn regex_type(regex: &str) -> String {
    format!("\"{}\"", regex)
}

/// Finds all spans of consecutive tokens whose text entirely matches a regular expression literal
pub struct PatternLiteralIndexer<'a> {
    config: &'a Config,
}

impl<'a> PatternLiteralIndexer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Builds a session index holding the matches of every distinct regular expression literal in the
    /// pattern, each literal under its own synthetic type (see [`regex_type()`]). A span covers
    /// at most [`Config::regex_max_tokens()`] tokens. Within a start offset, shorter spans come first.
    pub fn index(
        &self,
        pattern: &Pattern,
        tokens: &dyn TokenSequence,
    ) -> Result<AnnotationIndex, TapasError> {
        let index = AnnotationIndex::new();
        for regex in pattern.regex_literals() {
            let count = self.index_regex(regex, tokens, &index)?;
            debug(self.config, || {
                format!(
                    "PatternLiteralIndexer: regular expression {} matched {} span(s)",
                    regex, count
                )
            });
        }
        Ok(index)
    }

    fn index_regex(
        &self,
        regex: &str,
        tokens: &dyn TokenSequence,
        index: &AnnotationIndex,
    ) -> Result<usize, TapasError> {
        let expression = Regex::new(&format!("^(?:{})$", regex)).map_err(|e| {
            TapasError::PatternSyntaxError(format!("Invalid regular expression: {}", e), 0)
        })?;
        let annotationtype = regex_type(regex);
        let maxtokens = self.config.regex_max_tokens();
        let mut count = 0;
        for begin in 0..tokens.len() {
            let maxend = (begin + maxtokens).min(tokens.len());
            for end in begin + 1..=maxend {
                if expression.is_match(&tokens.text_of(begin, end)) {
                    index.add(Annotation::new(annotationtype.as_str(), begin, end - begin));
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}
