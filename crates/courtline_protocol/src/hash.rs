//! Idempotency content hashing.
//!
//! A record's hash covers only the declared meaningful fields, never
//! volatile metadata like timestamps. Values are normalized and field
//! names sorted before hashing so that field order and incidental
//! whitespace cannot change the digest.

use crate::defaults::CONTENT_HASH_LEN;
use blake3::Hasher;
use chrono::NaiveDate;

const SEP: u8 = 0x1f;

/// A value participating in the content hash.
#[derive(Debug, Clone, PartialEq)]
pub enum HashValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Null,
}

impl HashValue {
    /// Canonical string form. Uniform across absent/None/NaN inputs.
    fn canonical(&self) -> String {
        match self {
            HashValue::Text(s) => s.trim().to_string(),
            HashValue::Number(n) => canonical_number(*n),
            HashValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            HashValue::Null => "null".to_string(),
        }
    }
}

impl From<Option<f64>> for HashValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(n) => HashValue::Number(n),
            None => HashValue::Null,
        }
    }
}

/// Canonical numeric rendering: no trailing zeros, no negative zero,
/// non-finite values collapse to the null token.
pub fn canonical_number(value: f64) -> String {
    if !value.is_finite() {
        return "null".to_string();
    }
    let value = if value == 0.0 { 0.0 } else { value };
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let mut s = format!("{:.6}", value);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

/// Hash a set of named fields into a short stable digest.
///
/// Field order does not matter; names are sorted before hashing.
/// The digest is truncated hex, stable across runs and processes.
pub fn content_hash(fields: &[(String, HashValue)]) -> String {
    let mut pairs: Vec<(&str, String)> = fields
        .iter()
        .map(|(name, value)| (name.as_str(), value.canonical()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Hasher::new();
    for (name, value) in pairs {
        hasher.update(name.trim().as_bytes());
        hasher.update(&[SEP]);
        hasher.update(value.as_bytes());
        hasher.update(&[SEP]);
    }
    let hex = hasher.finalize().to_hex().to_string();
    hex[..CONTENT_HASH_LEN.min(hex.len())].to_string()
}
