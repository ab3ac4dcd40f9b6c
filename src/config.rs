use sealed::sealed;
use serde::{Deserialize, Serialize};

use crate::error::TapasError;
use crate::file::*;
use crate::json::*;
use crate::types::*;

pub trait Configurable: Sized {
    //// Obtain the configuration
    fn config(&self) -> &Config;

    //// Obtain the configuration mutably
    fn config_mut(&mut self) -> &mut Config;

    ///Builder pattern to associate a configuration
    fn with_config(mut self, config: Config) -> Self {
        self.set_config(config);
        self
    }

    ///Setter to associate a configuration
    fn set_config(&mut self, config: Config) -> &mut Self;
}

/// This holds the configuration. It is not limited to configuring a single part of the library, but unifies all in a single configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Debug mode
    pub(crate) debug: bool,

    /// Maximum number of compiled patterns held by a [`crate::PatternCache`] before the least recently used one is evicted
    pub(crate) cache_capacity: usize,

    /// Maximum number of consecutive tokens a regular expression literal in a pattern may span
    pub(crate) regex_max_tokens: usize,

    /// Separator used to join multiple values of a match attribute when the attribute setter does not specify one
    pub(crate) default_separator: String,

    /// Upper bound on the number of growth rounds in enumeration assembly
    pub(crate) enumeration_max_rounds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            cache_capacity: 100,
            regex_max_tokens: 10,
            default_separator: " ".to_string(),
            enumeration_max_rounds: 1000,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug mode. In debug mode, verbose output will be printed to standard error output
    pub fn with_debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Is debug mode enabled or not?
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Sets the capacity of the pattern cache. A capacity of zero disables caching altogether.
    /// Do not change this on a configuration that is already in use!
    pub fn with_cache_capacity(mut self, value: usize) -> Self {
        self.cache_capacity = value;
        self
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    /// Sets the maximum number of consecutive tokens a regular expression literal may span.
    /// Values below one are treated as one.
    pub fn with_regex_max_tokens(mut self, value: usize) -> Self {
        self.regex_max_tokens = value;
        self
    }

    pub fn regex_max_tokens(&self) -> usize {
        self.regex_max_tokens.max(1)
    }

    /// Sets the separator used to concatenate repeated values of a match attribute
    pub fn with_default_separator(mut self, value: impl Into<String>) -> Self {
        self.default_separator = value.into();
        self
    }

    pub fn default_separator(&self) -> &str {
        self.default_separator.as_str()
    }

    pub fn with_enumeration_max_rounds(mut self, value: usize) -> Self {
        self.enumeration_max_rounds = value;
        self
    }

    pub fn enumeration_max_rounds(&self) -> usize {
        self.enumeration_max_rounds
    }

    /// Loads configuration from a JSON file
    pub fn from_file(filename: &str) -> Result<Self, TapasError> {
        let reader = open_file_reader(filename)?;
        let deserializer = &mut serde_json::Deserializer::from_reader(reader);
        let result: Result<Self, _> = serde_path_to_error::deserialize(deserializer);
        result
            .map_err(|e| TapasError::JsonError(e, filename.to_string(), "Reading config from file"))
    }
}

#[sealed]
impl TypeInfo for Config {
    fn typeinfo() -> Type {
        Type::Config
    }
}

impl ToJson for Config {}
impl FromJson for Config {}

/// Prints a debug message to standard error output, but only when debug mode is enabled in the configuration.
/// The message is produced by a closure so it costs nothing when debug mode is off.
pub(crate) fn debug<F>(config: &Config, message_func: F)
where
    F: FnOnce() -> String,
{
    if config.debug {
        eprintln!("[tapas debug] {}", message_func());
    }
}
