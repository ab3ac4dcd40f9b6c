/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module contains the [`PatternCache`], a bounded cache of compiled patterns with least-recently-used eviction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::{debug, Config};
use crate::error::TapasError;
use crate::expression::ExpressionEngine;
use crate::pattern::{compile, Pattern};
use crate::token::Tokenizer;

/// Patterns compile differently under different tokenizers, so the key holds both
type CacheKey = (String, String);

#[derive(Default)]
struct CacheState {
    /// key => (pattern, tick of last use)
    entries: HashMap<CacheKey, (Arc<Pattern>, u64)>,
    /// tick of last use => key, the first entry is the least recently used one
    recency: BTreeMap<u64, CacheKey>,
    tick: u64,
    hits: usize,
    misses: usize,
}

impl CacheState {
    fn touch(&mut self, key: &CacheKey) -> Option<Arc<Pattern>> {
        self.tick += 1;
        let tick = self.tick;
        let (pattern, lastuse) = self.entries.get_mut(key)?;
        self.recency.remove(&*lastuse);
        *lastuse = tick;
        self.recency.insert(tick, key.clone());
        Some(pattern.clone())
    }
}

/// A bounded cache of compiled patterns, keyed by tokenizer and pattern source.
///
/// The cache is safe to share between threads. Compilation happens outside of the lock: two threads
/// compiling the same uncached pattern simultaneously both compile it, and the later insert simply replaces
/// the earlier (identical) one.
pub struct PatternCache {
    state: Mutex<CacheState>,
    capacity: usize,
    config: Config,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl PatternCache {
    /// Creates a new cache, its capacity is taken from the configuration
    pub fn new(config: Config) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: config.cache_capacity(),
            config,
        }
    }

    /// Creates a new cache with a specific capacity. A capacity of zero disables caching.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Config::default().with_cache_capacity(capacity))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the pattern compiled from the source with the tokenizer, compiling it if it is not cached yet
    pub fn get_or_compile(
        &self,
        source: &str,
        tokenizer: &dyn Tokenizer,
        expressions: &dyn ExpressionEngine,
    ) -> Result<Arc<Pattern>, TapasError> {
        if let Some(pattern) = self.get(tokenizer.id(), source) {
            return Ok(pattern);
        }
        let pattern = Arc::new(compile(source, tokenizer, expressions)?);
        self.insert(tokenizer.id(), pattern.clone());
        Ok(pattern)
    }

    /// Looks up a compiled pattern, marking it as most recently used
    pub fn get(&self, tokenizer_id: &str, source: &str) -> Option<Arc<Pattern>> {
        if self.capacity == 0 {
            return None;
        }
        let key = (tokenizer_id.to_string(), source.to_string());
        if let Ok(mut state) = self.state.lock() {
            match state.touch(&key) {
                Some(pattern) => {
                    state.hits += 1;
                    debug(&self.config, || format!("PatternCache: hit for {}", source));
                    Some(pattern)
                }
                None => {
                    state.misses += 1;
                    debug(&self.config, || format!("PatternCache: miss for {}", source));
                    None
                }
            }
        } else {
            None
        }
    }

    /// Adds a compiled pattern, evicting the least recently used one if the cache is full
    pub fn insert(&self, tokenizer_id: &str, pattern: Arc<Pattern>) {
        if self.capacity == 0 {
            return;
        }
        let key = (tokenizer_id.to_string(), pattern.source().to_string());
        if let Ok(mut state) = self.state.lock() {
            state.tick += 1;
            let tick = state.tick;
            if let Some((_, lastuse)) = state.entries.insert(key.clone(), (pattern, tick)) {
                state.recency.remove(&lastuse);
            }
            state.recency.insert(tick, key);
            while state.entries.len() > self.capacity {
                let oldest = state.recency.keys().next().copied();
                match oldest.and_then(|tick| state.recency.remove(&tick)) {
                    Some(evicted) => {
                        debug(&self.config, || {
                            format!("PatternCache: evicting {}", evicted.1)
                        });
                        state.entries.remove(&evicted);
                    }
                    None => break,
                }
            }
        }
    }

    /// Is the pattern cached? This does not count as a use.
    pub fn contains(&self, tokenizer_id: &str, source: &str) -> bool {
        let key = (tokenizer_id.to_string(), source.to_string());
        self.state
            .lock()
            .map(|state| state.entries.contains_key(&key))
            .unwrap_or(false)
    }

    /// Returns the number of cached patterns
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of cache hits and misses so far
    pub fn stats(&self) -> (usize, usize) {
        self.state
            .lock()
            .map(|state| (state.hits, state.misses))
            .unwrap_or((0, 0))
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.clear();
            state.recency.clear();
        }
    }
}
