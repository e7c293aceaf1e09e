//! Document value model for the external store.
//!
//! `Value` is the unit of data exchanged with the store, `Document` a named
//! field map. The comparison rules follow the store's canonical sort
//! convention so that bounds computed client-side agree with server-side
//! range evaluation:
//!
//! `MinKey < Null < numbers < strings < objects < arrays < binary < bool < MaxKey`
//!
//! Numbers compare numerically across integer widths (`Int(1) == Uint(1)`),
//! which is why `PartialEq` is hand-written to stay consistent with `Ord`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single field value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    /// Range sentinel ordered before every other value.
    MinKey,
    /// Range sentinel ordered after every other value.
    MaxKey,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Int128(i128),
    Uint128(u128),
    Str(String),
    Binary(Vec<u8>),
    Object(Document),
    Array(Vec<Value>),
}

/// A named, ordered field map.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Document(pub BTreeMap<String, Value>);

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) if *v <= i64::MAX as u64 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// True when every field of `sub` is present in `self` with an equal
    /// value, descending into nested objects.
    pub fn contains(&self, sub: &Value) -> bool {
        match (self, sub) {
            (Value::Object(doc), Value::Object(sub_doc)) => {
                sub_doc.0.iter().all(|(key, sub_val)| {
                    doc.0.get(key).map(|val| val.contains(sub_val)).unwrap_or(false)
                })
            }
            (a, b) => a == b,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::MinKey => 0,
            Value::Null => 1,
            Value::Int(_) | Value::Uint(_) | Value::Int128(_) | Value::Uint128(_) => 2,
            Value::Str(_) => 3,
            Value::Object(_) => 4,
            Value::Array(_) => 5,
            Value::Binary(_) => 6,
            Value::Bool(_) => 7,
            Value::MaxKey => 8,
        }
    }

    /// Numeric view as (negative-sign, magnitude) for cross-width compare.
    fn numeric_view(&self) -> Option<(bool, u128)> {
        match *self {
            Value::Int(v) => Some((v < 0, v.unsigned_abs() as u128)),
            Value::Uint(v) => Some((false, v as u128)),
            Value::Int128(v) => Some((v < 0, v.unsigned_abs())),
            Value::Uint128(v) => Some((false, v)),
            _ => None,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Null, Value::Null)
            | (Value::MinKey, Value::MinKey)
            | (Value::MaxKey, Value::MaxKey) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            _ => {
                // both numeric by rank equality
                let (an, av) = self.numeric_view().unwrap_or((false, 0));
                let (bn, bv) = other.numeric_view().unwrap_or((false, 0));
                match (an, bn) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => av.cmp(&bv),
                    (true, true) => bv.cmp(&av),
                }
            }
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::MinKey => write!(f, "$minKey"),
            Value::MaxKey => write!(f, "$maxKey"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Uint(v) => write!(f, "{}", v),
            Value::Int128(v) => write!(f, "{}", v),
            Value::Uint128(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Binary(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Object(doc) => write!(f, "{}", doc),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Resolve a dotted path (`"_SERVICE_.scope"`) against nested objects.
    /// A plain key that happens to contain no dot is a direct lookup.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Insert at a dotted path, creating intermediate objects as needed.
    pub fn insert_path(&mut self, path: &str, value: Value) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let last = match parts.pop() {
            Some(last) => last,
            None => return,
        };
        let mut doc = self;
        for part in parts {
            let entry = doc
                .0
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            let Value::Object(inner) = entry else {
                return;
            };
            doc = inner;
        }
        doc.0.insert(last.to_string(), value);
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Document(iter.into_iter().collect())
    }
}

// ── JSON interop ─────────────────────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Value::Uint(v)
                } else if let Some(v) = n.as_i64() {
                    Value::Int(v)
                } else {
                    // non-integral numbers are carried in string form
                    Value::Str(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn test_type_rank_ordering() {
        let ordered = [
            Value::MinKey,
            Value::Null,
            Value::Int(5),
            Value::Str("a".into()),
            Value::Object(Document::new()),
            Value::Array(vec![]),
            Value::Binary(vec![1]),
            Value::Bool(false),
            Value::MaxKey,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_cross_width_numeric_compare() {
        assert_eq!(Value::Int(1), Value::Uint(1));
        assert_eq!(Value::Uint(7), Value::Uint128(7));
        assert!(Value::Int(-1) < Value::Uint(0));
        assert!(Value::Int128(-5) < Value::Int128(-4));
        assert!(Value::Uint128(u128::from(u64::MAX) + 1) > Value::Uint(u64::MAX));
    }

    #[test]
    fn test_binary_is_bytewise() {
        assert!(Value::Binary(vec![0, 1]) < Value::Binary(vec![0, 2]));
        assert!(Value::Binary(vec![0]) < Value::Binary(vec![0, 0]));
    }

    #[test]
    fn test_contains_subset() {
        let row: Value = serde_json::json!({"a": 1, "b": {"c": 2, "d": 3}}).into();
        let key: Value = serde_json::json!({"a": 1, "b": {"c": 2}}).into();
        let miss: Value = serde_json::json!({"a": 2}).into();
        assert!(row.contains(&key));
        assert!(!row.contains(&miss));
    }

    #[test]
    fn test_path_access() {
        let mut doc = Document::new();
        doc.insert_path("a.b.c", Value::Int(9));
        assert_eq!(doc.get_path("a.b.c"), Some(&Value::Int(9)));
        assert!(doc.get_path("a.b.x").is_none());
        assert!(doc.get("a").unwrap().is_object());
    }
}
