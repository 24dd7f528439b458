//! Targets, locks and the checksum that identifies them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Compute the checksum for a set of identifying parameters.
///
/// Each part is length-prefixed before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` produce different digests. The result is a 64 character
/// lowercase hex BLAKE3 digest and depends only on `parts`.
pub fn checksum(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// A resource a change claims exclusive access to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    name: String,
    checksum: String,
    description: String,
}

impl Target {
    /// Create a target whose checksum is derived from `identity`.
    ///
    /// `identity` must only contain parameters that identify the resource,
    /// never runtime values such as timestamps or process ids.
    pub fn new(name: impl Into<String>, description: impl Into<String>, identity: &[&str]) -> Self {
        Self {
            name: name.into(),
            checksum: checksum(identity),
            description: description.into(),
        }
    }

    /// Create a target from a precomputed checksum
    pub fn with_checksum(
        name: impl Into<String>,
        checksum: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
            description: description.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.checksum.get(..12).unwrap_or(&self.checksum);
        write!(f, "{} ({short})", self.name)
    }
}

/// A target plus the longest the engine will wait to acquire it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLock {
    pub target: Target,
    pub timeout: Duration,
}

impl TargetLock {
    pub fn new(target: Target, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Create a lock with a timeout in whole seconds
    pub fn secs(target: Target, timeout_s: u64) -> Self {
        Self::new(target, Duration::from_secs(timeout_s))
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }

    pub fn checksum(&self) -> &str {
        self.target.checksum()
    }
}
