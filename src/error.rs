/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module defines the single error type used throughout the library: [`TapasError`].

use std::error::Error;
use std::fmt;

/// Result type alias used throughout the library
pub type TapasResult<T> = Result<T, TapasError>;

#[derive(Debug)]
pub enum TapasError {
    /// A pattern could not be compiled. Carries a message and the character offset in the pattern source where the problem was detected.
    PatternSyntaxError(String, usize),

    /// An expression (attribute test or attribute-setter transform) could not be parsed. Carries a message and the character offset in the expression source.
    ExpressionSyntaxError(String, usize),

    /// An expression failed during evaluation. The matcher never surfaces these, they are downgraded to a failed test or a missing value.
    ExpressionError(String),

    /// Programmer misuse, not expected to be recovered from
    IllegalUsage(&'static str),

    /// Something that was asked for by identifier does not exist
    NotFoundError(String, &'static str),

    IOError(std::io::Error, String, &'static str),
    JsonError(
        serde_path_to_error::Error<serde_json::Error>,
        String,
        &'static str,
    ),
    SerializationError(String),
}

impl From<&TapasError> for String {
    /// Returns the error message as a String
    fn from(error: &TapasError) -> String {
        match error {
            TapasError::PatternSyntaxError(msg, offset) => {
                format!("PatternSyntaxError: {} (at character {})", msg, offset)
            }
            TapasError::ExpressionSyntaxError(msg, offset) => {
                format!("ExpressionSyntaxError: {} (at character {})", msg, offset)
            }
            TapasError::ExpressionError(msg) => format!("ExpressionError: {}", msg),
            TapasError::IllegalUsage(contextmsg) => format!("IllegalUsage: {}", contextmsg),
            TapasError::NotFoundError(id, contextmsg) => {
                format!("NotFoundError: No such item: {} ({})", id, contextmsg)
            }
            TapasError::IOError(err, filename, contextmsg) => format!(
                "IOError: {}: {} ({})",
                filename, err, contextmsg
            ),
            TapasError::JsonError(err, filename, contextmsg) => format!(
                "JsonError: Parsing failed for {}: {} ({})",
                filename, err, contextmsg
            ),
            TapasError::SerializationError(msg) => format!("SerializationError: {}", msg),
        }
    }
}

impl fmt::Display for TapasError {
    /// Formats the error message for printing
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let errmsg: String = String::from(self);
        write!(f, "[TapasError] {}", errmsg)
    }
}

impl Error for TapasError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IOError(err, ..) => Some(err),
            Self::JsonError(err, ..) => Some(err),
            _ => None,
        }
    }
}

impl TapasError {
    /// Returns the character offset at which a syntax error was detected, if this is a syntax error
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::PatternSyntaxError(_, offset) | Self::ExpressionSyntaxError(_, offset) => {
                Some(*offset)
            }
            _ => None,
        }
    }
}
