//! Runtime value model.
//!
//! Values are plain tagged variants: scripts cannot hold references into the
//! engine, so cloning is cheap structural copying. Truthiness is the single
//! rule by which any value collapses to a boolean for conditionals and
//! logical operators.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use ahash::AHashMap;
use chrono::{DateTime, Utc};

/// A value produced or consumed by script execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// UTF-8 string.
    Str(String),
    /// Absence of a value: unknown variables and missing record fields.
    #[default]
    Null,
    /// The "no result" value produced by statements such as `print(..)`.
    Void,
    /// A regular-expression pattern; any `i`/`m` flags are folded in as an
    /// inline `(?im)` group.
    Regexp(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Mapping from hashable keys to values. Iteration order is not stored;
    /// it is derived by sorting the stringified keys.
    Hash(AHashMap<HashKey, Value>),
}

impl Value {
    /// Short lower-case name of this value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "boolean",
            Self::Str(_) => "string",
            Self::Null => "null",
            Self::Void => "void",
            Self::Regexp(_) => "regexp",
            Self::Array(_) => "array",
            Self::Hash(_) => "hash",
        }
    }

    /// Collapses this value to a boolean.
    ///
    /// Zero numbers, empty strings/arrays/hashes, `Null`, `Void` and `false`
    /// are falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(n) => *n != 0,
            Self::Float(n) => *n != 0.0,
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
            Self::Null | Self::Void => false,
            Self::Regexp(_) => true,
            Self::Array(items) => !items.is_empty(),
            Self::Hash(pairs) => !pairs.is_empty(),
        }
    }

    /// Converts a host time value to its script representation: Unix seconds
    /// as an Integer.
    #[must_use]
    pub fn from_datetime(when: DateTime<Utc>) -> Self {
        Self::Int(when.timestamp())
    }

    /// The numeric magnitude of this value, when it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Script-level equality: Integer and Float compare numerically, other
    /// types compare structurally, and mismatched types are never equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) => (*a as f64) == *b,
            (Self::Float(a), Self::Int(b)) => *a == (*b as f64),
            _ => self == other,
        }
    }

    /// The display form used in diagnostics, constant-pool listings and the
    /// constant dedup key: strings quoted, containers recursively inspected.
    #[must_use]
    pub fn inspect(&self) -> String {
        match self {
            Self::Str(s) => format!("{s:?}"),
            Self::Array(items) => {
                let inner: Vec<String> = items.iter().map(Self::inspect).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Hash(pairs) => {
                let inner: Vec<String> = sorted_pairs(pairs)
                    .into_iter()
                    .map(|(key, value)| format!("{key}: {}", value.inspect()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            other => other.to_string(),
        }
    }

    /// Starts iteration over this value, or `None` when the type does not
    /// support it. Strings iterate by rune, arrays by element and index,
    /// hashes by value and key with keys in sorted order.
    #[must_use]
    pub fn iterate(&self) -> Option<ValueIter> {
        match self {
            Self::Str(s) => Some(ValueIter::Str {
                chars: s.chars().collect(),
                pos: 0,
            }),
            Self::Array(items) => Some(ValueIter::Array {
                items: items.clone(),
                pos: 0,
            }),
            Self::Hash(pairs) => Some(ValueIter::Hash {
                pairs: sorted_pairs(pairs)
                    .into_iter()
                    .map(|(key, value)| (Value::from(key), value))
                    .collect(),
                pos: 0,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => f.write_str(s),
            Self::Null => f.write_str("null"),
            Self::Void => f.write_str("void"),
            Self::Regexp(pattern) => write!(f, "/{pattern}/"),
            Self::Array(_) | Self::Hash(_) => f.write_str(&self.inspect()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Sorts hash pairs by the display form of the key, for deterministic
/// iteration and inspection.
fn sorted_pairs(pairs: &AHashMap<HashKey, Value>) -> Vec<(HashKey, Value)> {
    let mut sorted: Vec<(HashKey, Value)> = pairs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    sorted.sort_by_key(|(key, _)| key.to_string());
    sorted
}

/// A value usable as a hash key: Integer, Float, String or Boolean.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Int(i64),
    Float(FloatKey),
    Str(String),
    Bool(bool),
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{}", n.0),
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl TryFrom<Value> for HashKey {
    type Error = &'static str;

    /// Fails with the value's type name when the type is not hashable.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(n) => Ok(Self::Int(n)),
            Value::Float(n) => Ok(Self::Float(FloatKey(n))),
            Value::Str(s) => Ok(Self::Str(s)),
            Value::Bool(b) => Ok(Self::Bool(b)),
            other => Err(other.type_name()),
        }
    }
}

impl From<HashKey> for Value {
    fn from(key: HashKey) -> Self {
        match key {
            HashKey::Int(n) => Self::Int(n),
            HashKey::Float(n) => Self::Float(n.0),
            HashKey::Str(s) => Self::Str(s),
            HashKey::Bool(b) => Self::Bool(b),
        }
    }
}

/// An `f64` compared and hashed by bit pattern so it can key a hash.
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatKey {}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits());
    }
}

/// Explicit iteration state for one iterable, driven by the VM's
/// `IterationReset`/`IterationNext` pair.
#[derive(Debug)]
pub enum ValueIter {
    Str { chars: Vec<char>, pos: usize },
    Array { items: Vec<Value>, pos: usize },
    Hash { pairs: Vec<(Value, Value)>, pos: usize },
}

impl ValueIter {
    /// Advances, yielding `(element, index-or-key)`; `None` when exhausted.
    pub fn advance(&mut self) -> Option<(Value, Value)> {
        match self {
            Self::Str { chars, pos } => {
                let ch = chars.get(*pos)?;
                let item = (Value::Str(ch.to_string()), Value::Int(*pos as i64));
                *pos += 1;
                Some(item)
            }
            Self::Array { items, pos } => {
                let value = items.get(*pos)?;
                let item = (value.clone(), Value::Int(*pos as i64));
                *pos += 1;
                Some(item)
            }
            Self::Hash { pairs, pos } => {
                let (key, value) = pairs.get(*pos)?;
                let item = (value.clone(), key.clone());
                *pos += 1;
                Some(item)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_rules() {
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(!Value::Hash(AHashMap::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Void.is_truthy());
        assert!(!Value::Bool(false).is_truthy());

        assert!(Value::Int(-3).is_truthy());
        assert!(Value::Float(0.1).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Regexp("^a$".into()).is_truthy());
    }

    #[test]
    fn semantic_equality_coerces_numbers() {
        assert!(Value::Int(1).semantic_eq(&Value::Float(1.0)));
        assert!(Value::Float(2.0).semantic_eq(&Value::Int(2)));
        assert!(!Value::Int(1).semantic_eq(&Value::Str("1".into())));
        assert!(Value::Null.semantic_eq(&Value::Null));
    }

    #[test]
    fn inspect_quotes_strings_and_nests() {
        assert_eq!(Value::Str("a\tb".into()).inspect(), "\"a\\tb\"");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Str("x".into())]).inspect(),
            "[1, \"x\"]"
        );
    }

    #[test]
    fn string_iteration_is_by_rune() {
        let mut iter = Value::Str("héllo".into()).iterate().unwrap();
        assert_eq!(iter.advance(), Some((Value::Str("h".into()), Value::Int(0))));
        assert_eq!(iter.advance(), Some((Value::Str("é".into()), Value::Int(1))));
    }

    #[test]
    fn hash_iteration_is_sorted_by_key() {
        let mut pairs = AHashMap::new();
        pairs.insert(HashKey::Str("b".into()), Value::Int(2));
        pairs.insert(HashKey::Str("a".into()), Value::Int(1));
        pairs.insert(HashKey::Str("c".into()), Value::Int(3));
        let mut iter = Value::Hash(pairs).iterate().unwrap();
        let mut keys = Vec::new();
        while let Some((_, key)) = iter.advance() {
            keys.push(key.to_string());
        }
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_iterables_finish_immediately() {
        let mut iter = Value::Array(vec![]).iterate().unwrap();
        assert_eq!(iter.advance(), None);
    }

    #[test]
    fn only_scalars_are_hashable() {
        assert!(HashKey::try_from(Value::Int(1)).is_ok());
        assert!(HashKey::try_from(Value::Bool(true)).is_ok());
        assert_eq!(HashKey::try_from(Value::Array(vec![])), Err("array"));
        assert_eq!(HashKey::try_from(Value::Null), Err("null"));
    }

    #[test]
    fn datetime_reflects_as_unix_seconds() {
        let when = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(Value::from_datetime(when), Value::Int(1_700_000_000));
    }

    #[test]
    fn non_iterables_decline() {
        assert!(Value::Int(3).iterate().is_none());
        assert!(Value::Null.iterate().is_none());
    }
}
