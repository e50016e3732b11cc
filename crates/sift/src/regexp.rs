//! Process-wide cache of compiled regular expressions.
//!
//! Patterns compile once per process; the cache is append-only and safe
//! under concurrent reads with guarded inserts. Script-level match semantics
//! (`~=`, `!~`, regexp `case` arms) are substring-in-any-line, with each
//! line trimmed before matching.

use std::sync::{Mutex, OnceLock, PoisonError};

use ahash::AHashMap;
use regex::Regex;

static CACHE: OnceLock<Mutex<AHashMap<String, Regex>>> = OnceLock::new();

/// Compiles `pattern`, reusing a previously compiled instance when one
/// exists. Flags are part of the pattern text (inline `(?im)` groups).
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    let cache = CACHE.get_or_init(|| Mutex::new(AHashMap::new()));
    // The cache is append-only, so a poisoned lock still holds valid state.
    let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(compiled) = guard.get(pattern) {
        return Ok(compiled.clone());
    }
    let compiled = Regex::new(pattern)?;
    guard.insert(pattern.to_owned(), compiled.clone());
    Ok(compiled)
}

/// Returns true when any trimmed line of `haystack` contains a match.
pub fn line_match(pattern: &Regex, haystack: &str) -> bool {
    haystack.lines().any(|line| pattern.is_match(line.trim()))
}
