//! Recipient addresses and their canonical form.
//!
//! Raw input is whatever an operator pasted: spaces, dashes, parentheses,
//! with or without the leading `+`. A [`Target`] only ever holds the canonical
//! form `+<digits>`, so two spellings of the same address compare equal.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum digit count of a routable address.
pub const MIN_DIGITS: usize = 7;

/// Maximum digit count of a routable address (E.164 upper bound).
pub const MAX_DIGITS: usize = 15;

/// Why a raw address was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("address `{raw}` has {digits} digits, expected {MIN_DIGITS}..={MAX_DIGITS}")]
    DigitCount { raw: String, digits: usize },
}

/// A normalized recipient address. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    /// Normalize one raw address.
    ///
    /// Everything except ASCII digits is stripped (a `+` only counts as the
    /// leading marker), then the canonical `+` prefix is applied.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(TargetError::DigitCount {
                raw: raw.to_string(),
                digits: digits.len(),
            });
        }
        Ok(Self(format!("+{digits}")))
    }

    /// Canonical form, including the leading `+`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only, as the surface expects them in a request address.
    pub fn digits(&self) -> &str {
        &self.0[1..]
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}

/// Result of normalizing a batch of raw addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    /// Valid, unique targets in first-seen order.
    pub targets: Vec<Target>,

    /// Entries that could not be normalized.
    pub rejected: Vec<TargetError>,

    /// Number of entries dropped because an earlier entry had the same canonical form.
    pub duplicates: usize,
}

impl TargetList {
    /// Normalize, validate and deduplicate, preserving order.
    pub fn normalize<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = TargetList::default();
        let mut seen = HashSet::new();

        for entry in raw {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match Target::parse(entry) {
                Ok(target) => {
                    if seen.insert(target.clone()) {
                        list.targets.push(target);
                    } else {
                        list.duplicates += 1;
                    }
                }
                Err(e) => list.rejected.push(e),
            }
        }
        list
    }

    /// Split a pasted text blob on newlines and commas, then normalize.
    pub fn from_text(text: &str) -> Self {
        Self::normalize(text.split(['\n', ',']))
    }
}
