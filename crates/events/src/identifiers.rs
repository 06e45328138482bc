//! Newtype domain identifiers.
//!
//! Repository names, branch names and commit identifiers are all strings on
//! the wire, but they are never interchangeable: a [`BranchName`] must not end
//! up in a field that expects a [`RepositoryName`]. Each concept is a distinct
//! newtype wrapping a primitive.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// String-backed identifiers (platform names)
// ---------------------------------------------------------------------------

string_id! {
    /// A repository identifier in the hosting platform's own slug convention.
    ///
    /// Examples: `"octo/hello-world"` (GitHub), `"group/sub/project"` (GitLab),
    /// `"~yahavi/hello-world"` (a Bitbucket Server personal project). The value
    /// is platform-native; no attempt is made to unify naming across platforms.
    RepositoryName
}

string_id! {
    /// A bare branch or tag name with any `refs/...` prefix already removed.
    BranchName
}

string_id! {
    /// A commit identifier as reported by the platform (usually 40 hex chars).
    CommitSha
}

// ---------------------------------------------------------------------------
// Integer-backed identifiers
// ---------------------------------------------------------------------------

/// The number of a pull request (GitHub, Bitbucket, Azure Repos) or the
/// project-scoped IID of a GitLab merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestId(u64);

impl PullRequestId {
    /// Creates a new identifier from a raw integer.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
