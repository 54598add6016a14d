//! Request identity for the raw response cache.

use sha2::{Digest, Sha256};
use std::fmt;

/// Placeholder substituted by the cursor value in URL templates.
pub const PLACEHOLDER: &str = "{}";

/// Identity of one remote request: a URL template plus one cursor value.
///
/// Two requests with the same identity are interchangeable, which is what
/// makes the raw cache replay-safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId {
    /// Dataset the request belongs to.
    pub dataset: String,
    /// Request slot within the dataset (`main`, `supplement`).
    pub slot: String,
    /// URL template with a single `{}` placeholder (or none).
    pub template: String,
    /// Cursor value substituted into the template.
    pub value: String,
}

impl RequestId {
    /// Creates a request identity in the `main` slot.
    pub fn new(
        dataset: impl Into<String>,
        template: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            slot: "main".into(),
            template: template.into(),
            value: value.into(),
        }
    }

    /// Moves the request into another slot.
    #[must_use]
    pub fn in_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = slot.into();
        self
    }

    /// The concrete URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.template.replace(PLACEHOLDER, &self.value)
    }

    /// File name used by the raw cache.
    ///
    /// Starts with a digest of the template, so a changed template never
    /// replays old responses. In the value, unreserved characters are kept
    /// and everything else is percent-encoded, so distinct values never
    /// share a file.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut out = self.template_digest();
        out.push('-');
        if self.value.is_empty() {
            out.push_str("_.raw");
            return out;
        }
        for b in self.value.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' {
                out.push(b as char);
            } else {
                out.push_str(&format!("%{b:02X}"));
            }
        }
        out.push_str(".raw");
        out
    }
}

impl RequestId {
    /// First 8 bytes of the template's SHA-256, as hex.
    fn template_digest(&self) -> String {
        Sha256::digest(self.template.as_bytes())
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.dataset, self.slot, self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_substitutes_value() {
        let id = RequestId::new("contests", "https://example.com/archive?page={}", "3");
        assert_eq!(id.url(), "https://example.com/archive?page=3");
        assert_eq!(id.to_string(), "contests/main:https://example.com/archive?page=3");
    }

    #[test]
    fn file_name_escapes() {
        let id = RequestId::new("results", "x/{}", "abc 300/1");
        assert!(id.file_name().ends_with("-abc%20300%2F1.raw"));
        assert!(RequestId::new("models", "x", "").file_name().ends_with("-_.raw"));
        assert_ne!(
            RequestId::new("d", "t", "a_b").file_name(),
            RequestId::new("d", "t", "a/b").file_name()
        );
    }

    #[test]
    fn file_name_depends_on_template() {
        let old = RequestId::new("results", "https://example.com/{}/results", "abc300");
        let new = RequestId::new("results", "https://example.com/{}/results/json", "abc300");
        assert_ne!(old.file_name(), new.file_name());
        assert_eq!(old.file_name(), old.clone().file_name());
        // 16 hex digits, a dash, then the value
        assert_eq!(old.file_name().len(), 16 + 1 + "abc300.raw".len());
    }
}
