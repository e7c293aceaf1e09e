//! Core identifier types: base-32 symbol names, primary keys, revisions,
//! cursor ids.
//!
//! Account, table and index names are 64-bit symbols encoded with the
//! 13-character base-32 alphabet `.12345a-z`. The string form is the
//! canonical external representation (database and collection names are
//! built from it), so decoding is strict: an invalid character or an
//! overlong string is an error, never a silent truncation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decoding failure for a base-32 symbol name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("name '{0}' is longer than 13 characters")]
    TooLong(String),

    #[error("name '{name}' contains invalid character '{ch}'")]
    InvalidChar { name: String, ch: char },

    #[error("name '{0}' has an invalid 13th character")]
    InvalidTail(String),
}

const NAME_ALPHABET: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'.' => Some(0),
        _ => None,
    }
}

/// Encode a 64-bit symbol into its canonical string form.
/// Trailing dots are trimmed, so symbol 0 encodes to the empty string.
pub fn symbol_to_string(value: u64) -> String {
    let mut out = [b'.'; 13];
    let mut v = value;
    for i in (0..13).rev() {
        let idx = if i == 12 { (v & 0x0f) as usize } else { (v & 0x1f) as usize };
        out[i] = NAME_ALPHABET[idx];
        v >>= if i == 12 { 4 } else { 5 };
    }
    let s = String::from_utf8_lossy(&out).into_owned();
    s.trim_end_matches('.').to_string()
}

/// Decode a canonical string into a 64-bit symbol.
pub fn string_to_symbol(s: &str) -> Result<u64, NameError> {
    let bytes = s.as_bytes();
    if bytes.len() > 13 {
        return Err(NameError::TooLong(s.to_string()));
    }
    let mut value: u64 = 0;
    for (i, &c) in bytes.iter().enumerate() {
        let sym = char_to_symbol(c).ok_or_else(|| NameError::InvalidChar {
            name: s.to_string(),
            ch: c as char,
        })?;
        if i < 12 {
            value |= sym << (64 - 5 * (i as u32 + 1));
        } else {
            if sym >= 16 {
                return Err(NameError::InvalidTail(s.to_string()));
            }
            value |= sym;
        }
    }
    Ok(value)
}

macro_rules! symbol_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&symbol_to_string(self.0))
            }
        }

        impl FromStr for $name {
            type Err = NameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                string_to_symbol(s).map($name)
            }
        }
    };
}

symbol_newtype! {
    /// An account id: the owning namespace of tables (spec: "code") and the
    /// secondary partition id within a table (spec: "scope").
    AccountName
}

symbol_newtype! {
    /// A symbolic table id.
    TableName
}

symbol_newtype! {
    /// A symbolic index id.
    IndexName
}

/// A per-row primary key within `(code, table, scope)`.
///
/// Two sentinel values sit at the top of the range: `UNSET` marks a cursor
/// whose position has not been resolved yet, `END` marks the past-the-end
/// position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PrimaryKey(pub u64);

impl PrimaryKey {
    pub const UNSET: PrimaryKey = PrimaryKey(u64::MAX);
    pub const END: PrimaryKey = PrimaryKey(u64::MAX - 1);

    /// True for real row keys, false for both sentinels.
    pub fn is_good(self) -> bool {
        self.0 < Self::END.0
    }

    pub fn next(self) -> PrimaryKey {
        PrimaryKey(self.0 + 1)
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PrimaryKey::UNSET => write!(f, "pk:unset"),
            PrimaryKey::END => write!(f, "pk:end"),
            PrimaryKey(v) => write!(f, "pk:{}", v),
        }
    }
}

/// A monotonically increasing row version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Revision(pub i64);

impl Revision {
    /// No revision recorded.
    pub const UNSET: Revision = Revision(-1);
    /// The lowest real revision.
    pub const START: Revision = Revision(1);
}

impl Default for Revision {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev:{}", self.0)
    }
}

/// Identifier of a cursor within its code bucket. Allocation starts at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CursorId(pub u64);

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor:{}", self.0)
    }
}

#[cfg(test)]
mod name_tests {
    use super::*;

    #[test]
    fn test_roundtrip_simple_names() {
        for s in ["eosio", "undo", "alice", "a", "zzzzzzzzzzzzj", "a.b.c", "table5"] {
            let v = string_to_symbol(s).unwrap();
            assert_eq!(symbol_to_string(v), s, "roundtrip of '{}'", s);
        }
    }

    #[test]
    fn test_zero_is_empty_string() {
        assert_eq!(symbol_to_string(0), "");
        assert_eq!(string_to_symbol("").unwrap(), 0);
    }

    #[test]
    fn test_trailing_dots_trimmed() {
        let v = string_to_symbol("abc").unwrap();
        assert_eq!(symbol_to_string(v), "abc");
        // "abc." encodes to the same symbol, and prints without the dot
        assert_eq!(string_to_symbol("abc.").unwrap(), v);
    }

    #[test]
    fn test_invalid_characters_rejected() {
        assert!(matches!(
            string_to_symbol("Bad"),
            Err(NameError::InvalidChar { ch: 'B', .. })
        ));
        assert!(matches!(
            string_to_symbol("a_b"),
            Err(NameError::InvalidChar { ch: '_', .. })
        ));
        assert!(matches!(
            string_to_symbol("has6digit"),
            Err(NameError::InvalidChar { ch: '6', .. })
        ));
    }

    #[test]
    fn test_too_long_rejected() {
        assert!(matches!(
            string_to_symbol("aaaaaaaaaaaaaa"),
            Err(NameError::TooLong(_))
        ));
    }

    #[test]
    fn test_tail_character_restricted() {
        // 13th character only admits the first 16 alphabet symbols (. 1-5 a-j)
        assert!(string_to_symbol("zzzzzzzzzzzzj").is_ok());
        assert!(matches!(
            string_to_symbol("zzzzzzzzzzzzk"),
            Err(NameError::InvalidTail(_))
        ));
    }

    #[test]
    fn test_name_ordering_matches_symbol_ordering() {
        let a = string_to_symbol("alice").unwrap();
        let b = string_to_symbol("bob").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_primary_key_sentinels() {
        assert!(!PrimaryKey::UNSET.is_good());
        assert!(!PrimaryKey::END.is_good());
        assert!(PrimaryKey(0).is_good());
        assert!(PrimaryKey(u64::MAX - 2).is_good());
        assert!(PrimaryKey::END < PrimaryKey::UNSET);
    }
}
