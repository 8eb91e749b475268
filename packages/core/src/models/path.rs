//! Materialized Path Algebra
//!
//! Pure string/segment operations over a materialized path. A path is the
//! separator followed by the ordered node identifiers of every ancestor and
//! the node itself, e.g. `/01HV.../01HW...`. The root path is the separator
//! alone.
//!
//! Every structural question the tree service asks (ancestors, descendants,
//! depth, direct parenthood) reduces to prefix and segment arithmetic on this
//! type, so none of it touches the store.
//!
//! # Examples
//!
//! ```rust
//! use pathtree_core::models::TreePath;
//!
//! let root = TreePath::root();
//! let a = root.append_segment("a").unwrap();
//! let b = a.append_segment("b").unwrap();
//!
//! assert_eq!(b.as_str(), "/a/b");
//! assert_eq!(b.depth(), 2);
//! assert!(a.contains(&b));
//! assert!(!b.contains(&b));
//! assert_eq!(b.parent().unwrap(), a);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between node identifiers inside a path
pub const PATH_SEPARATOR: char = '/';

/// Path of a tenant's root node
pub const ROOT_PATH: &str = "/";

/// Path algebra errors
///
/// These are local validation failures. They are always surfaced to the
/// caller and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid materialized path: {0:?}")]
    InvalidPath(String),

    #[error("Invalid path segment: {0:?}")]
    InvalidSegment(String),

    #[error("Root path has no parent")]
    NoParent,

    #[error("Root path has no segment")]
    RootHasNoSegment,

    #[error("Depth cannot be negative: {0}")]
    NegativeDepth(i64),

    #[error("Requested depth {requested} is greater than path depth {depth}")]
    DepthExceedsPath { requested: i64, depth: usize },
}

/// A validated materialized path
///
/// Invariants (enforced by every constructor):
/// - starts with [`PATH_SEPARATOR`]
/// - never ends with the separator unless it is the root
/// - never contains two consecutive separators
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreePath(String);

impl TreePath {
    /// The root path (`/`)
    pub fn root() -> Self {
        Self(ROOT_PATH.to_string())
    }

    /// Parse and validate a raw path string
    pub fn parse(raw: impl Into<String>) -> Result<Self, PathError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(Self(raw))
    }

    /// Structural validation of a raw path
    ///
    /// Fails with [`PathError::InvalidPath`] if the path is empty, does not
    /// start with the separator, ends with the separator (and is not the
    /// root), or contains an empty segment.
    pub fn validate(raw: &str) -> Result<(), PathError> {
        if raw.is_empty() {
            return Err(PathError::InvalidPath(raw.to_string()));
        }

        if raw == ROOT_PATH {
            return Ok(());
        }

        if !raw.starts_with(PATH_SEPARATOR) || raw.ends_with(PATH_SEPARATOR) {
            return Err(PathError::InvalidPath(raw.to_string()));
        }

        if raw[1..].split(PATH_SEPARATOR).any(str::is_empty) {
            return Err(PathError::InvalidPath(raw.to_string()));
        }

        Ok(())
    }

    /// Build a path from an ordered list of segments (root for an empty list)
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .try_fold(Self::root(), |path, segment| path.append_segment(segment.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_PATH
    }

    /// Number of segments; the root has depth 0
    pub fn depth(&self) -> usize {
        if self.is_root() {
            return 0;
        }
        self.0.matches(PATH_SEPARATOR).count()
    }

    /// Path with the last segment removed
    pub fn parent(&self) -> Result<TreePath, PathError> {
        if self.is_root() {
            return Err(PathError::NoParent);
        }

        match self.0.rfind(PATH_SEPARATOR) {
            Some(0) | None => Ok(Self::root()),
            Some(idx) => Ok(Self(self.0[..idx].to_string())),
        }
    }

    /// Path with `segment` appended after a separator
    pub fn append_segment(&self, segment: &str) -> Result<TreePath, PathError> {
        if segment.is_empty() || segment.contains(PATH_SEPARATOR) {
            return Err(PathError::InvalidSegment(segment.to_string()));
        }

        let base = self.0.trim_end_matches(PATH_SEPARATOR);
        Ok(Self(format!("{}{}{}", base, PATH_SEPARATOR, segment)))
    }

    /// Strict ancestor-of test
    ///
    /// - the root contains every non-root path
    /// - a non-root path never contains the root
    /// - otherwise `sub` must start with `self` followed by a separator
    ///
    /// A path never contains itself.
    pub fn contains(&self, sub: &TreePath) -> bool {
        if self.is_root() {
            return !sub.is_root();
        }

        if sub.is_root() {
            return false;
        }

        sub.0
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
    }

    pub fn is_descendant_of(&self, ancestor: &TreePath) -> bool {
        ancestor.contains(self)
    }

    pub fn is_direct_parent_of(&self, child: &TreePath) -> bool {
        child.parent().is_ok_and(|parent| &parent == self)
    }

    /// Ordered segments; empty for the root
    pub fn segments(&self) -> Vec<&str> {
        if self.is_root() {
            return Vec::new();
        }
        self.0[1..].split(PATH_SEPARATOR).collect()
    }

    pub fn last_segment(&self) -> Result<&str, PathError> {
        if self.is_root() {
            return Err(PathError::RootHasNoSegment);
        }

        self.0
            .rsplit(PATH_SEPARATOR)
            .next()
            .ok_or(PathError::RootHasNoSegment)
    }

    /// Ancestor (or self) at the given depth
    ///
    /// Returns the root for depth 0 and `self` for `depth == self.depth()`.
    pub fn ancestor_at_depth(&self, depth: i64) -> Result<TreePath, PathError> {
        if depth < 0 {
            return Err(PathError::NegativeDepth(depth));
        }

        let current = self.depth();
        let requested = depth as usize;
        if requested > current {
            return Err(PathError::DepthExceedsPath {
                requested: depth,
                depth: current,
            });
        }

        if requested == 0 {
            return Ok(Self::root());
        }

        if requested == current {
            return Ok(self.clone());
        }

        Self::from_segments(self.segments().into_iter().take(requested))
    }

    /// Strict ancestors ordered from depth 1 to `depth - 1`
    ///
    /// The root (depth 0) and the path itself are not included.
    pub fn ancestors(&self) -> Vec<TreePath> {
        let segments = self.segments();
        (1..segments.len())
            .map(|depth| {
                let mut raw = String::new();
                for segment in &segments[..depth] {
                    raw.push(PATH_SEPARATOR);
                    raw.push_str(segment);
                }
                Self(raw)
            })
            .collect()
    }

    /// Store-agnostic `LIKE` pattern matching all strict descendants
    ///
    /// For the root this is `%` (every path); callers must still exclude the
    /// path itself.
    pub fn prefix_pattern(&self) -> String {
        if self.is_root() {
            return "%".to_string();
        }
        format!(
            "{}{}%",
            self.0.trim_end_matches(PATH_SEPARATOR),
            PATH_SEPARATOR
        )
    }

    /// Replace the `from` prefix of this path with `to`
    ///
    /// `self` must be `from` or one of its descendants. This is the per-row
    /// step of a subtree move.
    pub fn rebase(&self, from: &TreePath, to: &TreePath) -> Result<TreePath, PathError> {
        if self == from {
            return Ok(to.clone());
        }

        if !from.contains(self) {
            return Err(PathError::InvalidPath(format!(
                "{} is not under {}",
                self, from
            )));
        }

        let suffix = if from.is_root() {
            &self.0[..]
        } else {
            &self.0[from.0.len()..]
        };

        if to.is_root() {
            return Self::parse(suffix);
        }

        Self::parse(format!("{}{}", to.0, suffix))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TreePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TreePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TreePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TreePath> for String {
    fn from(path: TreePath) -> Self {
        path.0
    }
}
