/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module computes match attributes: the values of the attribute setters (`@name`, `@(expr):name`, ...)
//! on the elements of a pattern, merged into one attribute map per match.

use std::collections::BTreeMap;

use crate::annotation::Annotation;
use crate::config::Config;
use crate::expression::ExpressionContext;
use crate::pattern::{AttributeSetter, MultiValuePolicy};
use crate::token::TokenSequence;

/// Computes the raw value of an attribute setter for a matched span. The `context` annotation describes the span
/// (for annotation matchers it is the matched annotation itself).
///
/// Without an expression, the value is the text of the span. With an expression, it is the evaluated value, and there
/// is no value at all if the expression is falsy or fails to evaluate. Empty values count as no value.
pub fn setter_value(
    setter: &AttributeSetter,
    tokens: &dyn TokenSequence,
    context: &Annotation,
) -> Option<String> {
    let value = match setter.expression() {
        None => context.text(tokens),
        Some(expression) => {
            match expression.evaluate(&ExpressionContext::new(tokens, context)) {
                Ok(value) if value.as_bool() => value.as_string(),
                _ => return None,
            }
        }
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Merges a value into an attribute map according to the multi-value policy. Merging happens in match order,
/// so "first" means the value that was merged earliest.
pub fn merge_value(
    attributes: &mut BTreeMap<String, String>,
    name: &str,
    value: String,
    policy: &MultiValuePolicy,
    default_separator: &str,
) {
    match attributes.get_mut(name) {
        None => {
            attributes.insert(name.to_string(), value);
        }
        Some(existing) => match policy {
            MultiValuePolicy::First => {}
            MultiValuePolicy::Last => *existing = value,
            MultiValuePolicy::Longest => {
                if value.chars().count() > existing.chars().count() {
                    *existing = value;
                }
            }
            MultiValuePolicy::Join(separator) => {
                existing.push_str(separator.as_deref().unwrap_or(default_separator));
                existing.push_str(&value);
            }
        },
    }
}

/// Applies all setters of one element repetition to a copy of the accumulated attributes.
/// Returns `None` if none of the setters yielded a value (the accumulated map can then be reused as-is).
pub fn apply_setters(
    setters: &[AttributeSetter],
    tokens: &dyn TokenSequence,
    context: &Annotation,
    accumulated: &BTreeMap<String, String>,
    config: &Config,
) -> Option<BTreeMap<String, String>> {
    let mut result: Option<BTreeMap<String, String>> = None;
    for setter in setters {
        if let Some(value) = setter_value(setter, tokens, context) {
            let attributes = result.get_or_insert_with(|| accumulated.clone());
            merge_value(
                attributes,
                setter.name(),
                value,
                setter.policy(),
                config.default_separator(),
            );
        }
    }
    result
}
