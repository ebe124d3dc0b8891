//! Run identifiers.
//!
//! Two formats are supported (spec §3): a default `run-<unix_nanos>` form,
//! and a human-readable `run-<adjective>-<noun>-<noun>` tri-token form for
//! callers that want friendlier log lines and directory names.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `run-<unix_nanos>` — the default, monotonic within a process.
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(format!("run-{nanos}"))
    }

    /// `run-<adjective>-<noun>-<noun>` — a friendlier, still-unique-enough
    /// form for interactive use. Seeded from the same nanosecond clock so it
    /// stays cheap and dependency-free.
    pub fn generate_friendly() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let a = ADJECTIVES[(nanos % ADJECTIVES.len() as u128) as usize];
        let n1 = NOUNS[((nanos / 7) % NOUNS.len() as u128) as usize];
        let n2 = NOUNS[((nanos / 13) % NOUNS.len() as u128) as usize];
        Self(format!("run-{a}-{n1}-{n2}"))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque handle to a runner instance started by a `Runtime`. For the local
/// runtime this is the child process id; other runtimes may use a container
/// or VM id instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const ADJECTIVES: &[&str] = &[
    "brisk", "quiet", "amber", "steady", "spare", "tidy", "wry", "keen", "still", "bold",
];

const NOUNS: &[&str] = &[
    "otter", "glade", "ridge", "ember", "harbor", "thicket", "meadow", "quarry", "brook", "lintel",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed() {
        let id = RunId::generate();
        assert!(id.as_str().starts_with("run-"));
    }

    #[test]
    fn friendly_ids_have_three_tokens_after_prefix() {
        let id = RunId::generate_friendly();
        let rest = id.as_str().strip_prefix("run-").unwrap();
        assert_eq!(rest.split('-').count(), 3);
    }
}
