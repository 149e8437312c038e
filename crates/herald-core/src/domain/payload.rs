//! Message payload and the request address that carries it to the surface.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::target::Target;

/// Message text sent identically to every target of a job.
///
/// Length limits are enforced by job validation, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Without leading and trailing whitespace.
    pub fn trimmed(self) -> Self {
        let trimmed = self.0.trim();
        if trimmed.len() == self.0.len() {
            return self;
        }
        Self(trimmed.to_string())
    }
}

/// Canonical `(recipient, url-encoded payload)` request address.
///
/// `base` is the surface origin without a trailing slash, e.g. `https://surface.example`.
pub fn request_address(base: &str, target: &Target, payload: &Payload) -> String {
    format!(
        "{}/send?phone={}&text={}",
        base.trim_end_matches('/'),
        target.digits(),
        encode_component(payload.as_str())
    )
}

/// Percent-encode everything except the URI-component unreserved set.
pub fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
