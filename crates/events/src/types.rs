//! Shared value types for the forgehook event domain.
//!
//! [`CanonicalWebhookEvent`] is the single output of the ingestion pipeline.
//! Its constructors are the only way to build one, so the invariants below hold
//! for every value in circulation:
//!
//! - push-family events carry a repository and branch and no source side;
//! - PR-family events carry a repository, branch, source repository and source
//!   branch;
//! - an [`WebhookEvent::Unrecognized`] event carries nothing beyond its kind.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BranchName, CommitSha, PullRequestId, RepositoryName, WebhookError};

// ---------------------------------------------------------------------------
// Platforms
// ---------------------------------------------------------------------------

/// A supported source-control hosting platform.
///
/// Parsed from (and displayed as) its kebab-case identifier, which is also the
/// key used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// github.com and GitHub Enterprise Server.
    #[serde(rename = "github")]
    GitHub,
    /// gitlab.com and self-managed GitLab.
    #[serde(rename = "gitlab")]
    GitLab,
    /// Self-hosted Bitbucket (Server / Data Center).
    #[serde(rename = "bitbucket-server")]
    BitbucketServer,
    /// bitbucket.org.
    #[serde(rename = "bitbucket-cloud")]
    BitbucketCloud,
    /// Azure DevOps Repos.
    #[serde(rename = "azure-repos")]
    AzureRepos,
}

impl Provider {
    /// Every supported platform, in a stable order.
    pub const ALL: [Provider; 5] = [
        Provider::GitHub,
        Provider::GitLab,
        Provider::BitbucketServer,
        Provider::BitbucketCloud,
        Provider::AzureRepos,
    ];

    /// Returns the canonical identifier (`"github"`, `"bitbucket-server"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::BitbucketServer => "bitbucket-server",
            Provider::BitbucketCloud => "bitbucket-cloud",
            Provider::AzureRepos => "azure-repos",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = WebhookError;

    /// Parses a platform identifier, case-insensitively.
    ///
    /// Besides the canonical kebab-case form, the spellings without separators
    /// (`bitbucketserver`, `azurerepos`) and underscores are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match key.as_str() {
            "github" => Ok(Provider::GitHub),
            "gitlab" => Ok(Provider::GitLab),
            "bitbucketserver" => Ok(Provider::BitbucketServer),
            "bitbucketcloud" | "bitbucket" => Ok(Provider::BitbucketCloud),
            "azurerepos" | "azure" => Ok(Provider::AzureRepos),
            _ => Err(WebhookError::UnsupportedProvider {
                provider: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The canonical kind of a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    /// Commits were pushed to (or a ref was created/deleted on) a branch.
    Push,
    /// A tag was pushed.
    TagPush,
    /// A pull request was opened or reopened.
    PrCreated,
    /// A pull request's source ref or metadata changed.
    PrEdited,
    /// A pull request was merged.
    PrMerged,
    /// A pull request was declined, closed without merging, or deleted.
    PrRejected,
    /// A comment was added to a pull request.
    PrCommented,
    /// The platform event type is not handled.
    ///
    /// This is not an error: callers are expected to branch on it and take no
    /// action.
    Unrecognized,
}

impl WebhookEvent {
    /// Returns `true` for [`WebhookEvent::Push`] and [`WebhookEvent::TagPush`].
    pub fn is_push(self) -> bool {
        matches!(self, WebhookEvent::Push | WebhookEvent::TagPush)
    }

    /// Returns `true` for every pull-request kind, comments included.
    pub fn is_pull_request(self) -> bool {
        matches!(
            self,
            WebhookEvent::PrCreated
                | WebhookEvent::PrEdited
                | WebhookEvent::PrMerged
                | WebhookEvent::PrRejected
                | WebhookEvent::PrCommented
        )
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WebhookEvent::Push => "push",
            WebhookEvent::TagPush => "tag_push",
            WebhookEvent::PrCreated => "pr_created",
            WebhookEvent::PrEdited => "pr_edited",
            WebhookEvent::PrMerged => "pr_merged",
            WebhookEvent::PrRejected => "pr_rejected",
            WebhookEvent::PrCommented => "pr_commented",
            WebhookEvent::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Seconds since the Unix epoch.
///
/// Every platform-native time encoding (milliseconds, ISO-8601 text, seconds)
/// is reduced to this one representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(i64);

impl UnixTimestamp {
    /// Wraps a value that is already in seconds.
    pub fn from_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Converts milliseconds to seconds, truncating any sub-second remainder.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis / 1000)
    }

    /// Converts a UTC date-time, dropping sub-second precision.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    /// Returns the number of seconds since the epoch.
    pub fn as_secs(self) -> i64 {
        self.0
    }

}

impl std::fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Canonical event
// ---------------------------------------------------------------------------

/// A repository paired with one of its branches.
///
/// Used for both sides of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefLocation {
    /// Platform-native repository identifier.
    pub repository: RepositoryName,
    /// Bare branch name.
    pub branch: BranchName,
}

impl RefLocation {
    /// Creates a new [`RefLocation`].
    pub fn new(repository: RepositoryName, branch: BranchName) -> Self {
        Self { repository, branch }
    }
}

/// The platform-independent description of one webhook delivery.
///
/// Absent optional fields are omitted on serialization rather than written as
/// `null`, so a non-PR event has no `source_repository` key at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalWebhookEvent {
    /// What happened.
    pub event: WebhookEvent,

    /// Target repository. Always present unless the event is unrecognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryName>,

    /// Target branch (tag name for [`WebhookEvent::TagPush`]). Always present
    /// unless the event is unrecognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchName>,

    /// Source repository of a pull request. Equals `repository` when the PR
    /// does not come from a fork.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repository: Option<RepositoryName>,

    /// Source branch of a pull request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<BranchName>,

    /// When the event happened, in seconds since the epoch.
    ///
    /// `None` only for unrecognized events and for pushes whose payload carries
    /// no time information (e.g. a ref deletion with no commits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<UnixTimestamp>,

    /// Head commit of the push or of the PR source branch, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<CommitSha>,

    /// Pull request number, for PR-family events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_id: Option<PullRequestId>,
}

impl CanonicalWebhookEvent {
    /// Builds a push-family event (`Push` or `TagPush`).
    pub fn push(
        event: WebhookEvent,
        target: RefLocation,
        timestamp: Option<UnixTimestamp>,
        commit_sha: Option<CommitSha>,
    ) -> Self {
        debug_assert!(event.is_push(), "push() called with {event}");
        Self {
            event,
            repository: Some(target.repository),
            branch: Some(target.branch),
            source_repository: None,
            source_branch: None,
            timestamp,
            commit_sha,
            pull_request_id: None,
        }
    }

    /// Builds a PR-family event.
    pub fn pull_request(
        event: WebhookEvent,
        target: RefLocation,
        source: RefLocation,
        timestamp: UnixTimestamp,
        commit_sha: Option<CommitSha>,
        pull_request_id: Option<PullRequestId>,
    ) -> Self {
        debug_assert!(event.is_pull_request(), "pull_request() called with {event}");
        Self {
            event,
            repository: Some(target.repository),
            branch: Some(target.branch),
            source_repository: Some(source.repository),
            source_branch: Some(source.branch),
            timestamp: Some(timestamp),
            commit_sha,
            pull_request_id,
        }
    }

    /// Builds the soft-fail result for an event type nobody handles.
    pub fn unrecognized() -> Self {
        Self {
            event: WebhookEvent::Unrecognized,
            repository: None,
            branch: None,
            source_repository: None,
            source_branch: None,
            timestamp: None,
            commit_sha: None,
            pull_request_id: None,
        }
    }

    /// Returns `true` if the event kind is [`WebhookEvent::Unrecognized`].
    pub fn is_unrecognized(&self) -> bool {
        self.event == WebhookEvent::Unrecognized
    }
}
