//! Field normalization.
//!
//! Pure, deterministic transforms from platform-native encodings to the
//! canonical forms used in [`events::CanonicalWebhookEvent`]. Nothing here
//! performs I/O or depends on the current time.
//!
//! Repository names are *not* normalized across platforms: each adapter keeps
//! its platform's slug convention (see e.g.
//! [`crate::providers::bitbucket_server::personal_namespace`]).

use chrono::{DateTime, NaiveDateTime, Utc};

use events::{BranchName, CommitSha, Provider, RefLocation, RepositoryName, UnixTimestamp, WebhookError};

const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A timestamp in the encoding the platform sent it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTime<'a> {
    /// Seconds since the epoch.
    Seconds(i64),
    /// Milliseconds since the epoch.
    Millis(i64),
    /// ISO-8601 text.
    Iso8601(&'a str),
}

/// Converts a platform-native timestamp to Unix seconds.
///
/// Milliseconds are truncated, not rounded.
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] when ISO-8601 text cannot be
/// parsed.
pub fn timestamp(provider: Provider, native: NativeTime<'_>) -> Result<UnixTimestamp, WebhookError> {
    match native {
        NativeTime::Seconds(seconds) => Ok(UnixTimestamp::from_seconds(seconds)),
        NativeTime::Millis(millis) => Ok(UnixTimestamp::from_millis(millis)),
        NativeTime::Iso8601(text) => parse_iso8601(text)
            .map(UnixTimestamp::from_datetime)
            .ok_or_else(|| WebhookError::malformed(provider, format!("unparseable timestamp '{text}'"))),
    }
}

/// Parses the ISO-8601 shapes the supported platforms emit.
///
/// - RFC 3339: `2021-09-09T09:06:32Z`, `2021-09-09T12:06:32+03:00`, with an
///   optional fraction of any length (Azure sends seven digits).
/// - Compact offset: `2021-09-09T12:06:32+0300` (Bitbucket Server).
/// - GitLab's legacy form: `2021-09-09 09:06:32 UTC` or
///   `2021-09-09 12:06:32 +0300`.
pub fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    const OFFSET_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S %z",
    ];
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S UTC")
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Refs
// ---------------------------------------------------------------------------

/// A ref string split into its namespace and bare name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitRef<'a> {
    /// `refs/heads/<name>`.
    Branch(&'a str),
    /// `refs/tags/<name>`.
    Tag(&'a str),
    /// Anything else, kept verbatim (platforms that already send bare names).
    Bare(&'a str),
}

impl<'a> GitRef<'a> {
    /// Classifies a raw ref string.
    pub fn parse(raw: &'a str) -> Self {
        if let Some(name) = raw.strip_prefix(HEADS_PREFIX) {
            GitRef::Branch(name)
        } else if let Some(name) = raw.strip_prefix(TAGS_PREFIX) {
            GitRef::Tag(name)
        } else {
            GitRef::Bare(raw)
        }
    }

    /// The name without any `refs/...` prefix.
    pub fn name(self) -> &'a str {
        match self {
            GitRef::Branch(name) | GitRef::Tag(name) | GitRef::Bare(name) => name,
        }
    }

    /// Returns `true` for `refs/tags/...`.
    pub fn is_tag(self) -> bool {
        matches!(self, GitRef::Tag(_))
    }
}

/// Strips a `refs/heads/` (or `refs/tags/`) prefix, leaving the bare name.
pub fn strip_ref_prefix(raw: &str) -> &str {
    GitRef::parse(raw).name()
}

/// Builds a [`BranchName`] from a raw ref, stripping any ref-path prefix.
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] if the bare name is empty.
pub fn branch(provider: Provider, raw_ref: &str) -> Result<BranchName, WebhookError> {
    BranchName::new(strip_ref_prefix(raw_ref))
        .ok_or_else(|| WebhookError::malformed(provider, format!("empty branch name in ref '{raw_ref}'")))
}

/// Builds a [`RepositoryName`], keeping the platform's convention verbatim.
///
/// # Errors
///
/// Returns [`WebhookError::MalformedPayload`] if `raw` is empty.
pub fn repository(provider: Provider, raw: impl Into<String>) -> Result<RepositoryName, WebhookError> {
    RepositoryName::new(raw).ok_or_else(|| WebhookError::malformed(provider, "empty repository name"))
}

/// Builds a [`RefLocation`] from a repository name and a raw ref.
pub fn location(
    provider: Provider,
    repository_name: impl Into<String>,
    raw_ref: &str,
) -> Result<RefLocation, WebhookError> {
    Ok(RefLocation::new(
        repository(provider, repository_name)?,
        branch(provider, raw_ref)?,
    ))
}

/// Returns the commit identifier, or `None` for an empty or all-zero value
/// (the marker platforms use for ref creation and deletion).
pub fn commit_sha(raw: Option<&str>) -> Option<CommitSha> {
    raw.filter(|sha| !sha.bytes().all(|b| b == b'0'))
        .and_then(CommitSha::new)
}
