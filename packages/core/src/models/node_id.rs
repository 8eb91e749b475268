//! Node Identifiers
//!
//! Node identifiers double as primary keys and as path segments. They are
//! canonical ULIDs: 26-character Crockford base32 tokens holding a 48-bit
//! millisecond timestamp followed by 80 bits of entropy, so identifiers sort
//! lexicographically in creation order.
//!
//! Validation is structural only (length, alphabet, canonical upper-case
//! form). It never consults the store.

use crate::models::tree_node::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use ulid::{Generator, Ulid};

/// Length of every encoded node identifier
pub const NODE_ID_LEN: usize = 26;

/// A validated node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Parse and validate an identifier
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(Self(raw))
    }

    /// Structural check: a ULID in its canonical encoding
    ///
    /// Lower-case spellings and values past 128 bits decode but do not
    /// re-encode to the same text, so they are rejected. Paths compare
    /// segments as plain strings.
    pub fn validate(raw: &str) -> Result<(), ValidationError> {
        let ulid = Ulid::from_string(raw)
            .map_err(|e| ValidationError::InvalidId(format!("{:?}: {}", raw, e)))?;

        if ulid.to_string() != raw {
            return Err(ValidationError::InvalidId(format!(
                "{:?} is not in canonical form",
                raw
            )));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Millisecond timestamp encoded in the identifier
    pub fn timestamp_ms(&self) -> u64 {
        Ulid::from_string(&self.0)
            .map(|ulid| ulid.timestamp_ms())
            .unwrap_or_default()
    }
}

impl From<Ulid> for NodeId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodeId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Source of fresh node identifiers
///
/// Implementations must be safe to share between tasks and must never hand out
/// the same identifier twice.
pub trait IdSource: Send + Sync + fmt::Debug {
    fn new_id(&self) -> NodeId;
}

/// Monotonic, time-ordered identifier generator backed by `ulid::Generator`
///
/// Within one source, identifiers are strictly increasing: calls landing in
/// the same millisecond increment the entropy of the previous identifier.
pub struct UlidSource {
    generator: Mutex<Generator>,
}

impl UlidSource {
    pub fn new() -> Self {
        Self {
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl Default for UlidSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UlidSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UlidSource").finish_non_exhaustive()
    }
}

impl IdSource for UlidSource {
    fn new_id(&self) -> NodeId {
        let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
        match generator.generate() {
            Ok(ulid) => ulid.into(),
            Err(e) => {
                // 2^80 identifiers in one millisecond: start over with fresh entropy
                tracing::warn!("ULID entropy exhausted ({}), reseeding", e);
                *generator = Generator::new();
                Ulid::new().into()
            }
        }
    }
}
