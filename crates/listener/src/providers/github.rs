//! GitHub (github.com and GitHub Enterprise Server).
//!
//! - Event type: `X-GitHub-Event` header, refined by the payload `action`.
//! - Authentication: HMAC-SHA256 in `X-Hub-Signature-256: sha256=<hex>`.
//! - Repository: `repository.full_name` (`owner/name`), verbatim.
//! - Time: `head_commit.timestamp` (ISO-8601) for pushes, falling back to
//!   `repository.pushed_at` (epoch seconds); `updated_at` for pull requests.

use serde::Deserialize;

use events::{CanonicalWebhookEvent, Provider, PullRequestId, RefLocation, WebhookError, WebhookEvent};

use crate::classifier::{EventRule, EventSignal};
use crate::normalize::{self, GitRef, NativeTime};
use crate::provider::{decode_json, ensure_json, required_header, ProviderAdapter};
use crate::signature::{Authentication, Credential, VerificationPolicy};
use crate::WebhookRequest;

const PROVIDER: Provider = Provider::GitHub;

const EVENT_TABLE: &[EventRule] = &[
    EventRule::exact("push", "branch", WebhookEvent::Push),
    EventRule::exact("push", "tag", WebhookEvent::TagPush),
    EventRule::exact("pull_request", "opened", WebhookEvent::PrCreated),
    EventRule::exact("pull_request", "reopened", WebhookEvent::PrCreated),
    EventRule::exact("pull_request", "synchronize", WebhookEvent::PrEdited),
    EventRule::exact("pull_request", "edited", WebhookEvent::PrEdited),
    EventRule::exact("pull_request", "closed:merged", WebhookEvent::PrMerged),
    EventRule::exact("pull_request", "closed", WebhookEvent::PrRejected),
    EventRule::exact("pull_request_review_comment", "created", WebhookEvent::PrCommented),
];

/// Adapter for GitHub webhooks.
#[derive(Debug, Clone)]
pub struct GitHubAdapter {
    policy: VerificationPolicy,
}

impl GitHubAdapter {
    /// Header carrying the event type.
    pub const EVENT_HEADER: &'static str = "X-GitHub-Event";
    /// Header carrying the body signature.
    pub const SIGNATURE_HEADER: &'static str = "X-Hub-Signature-256";

    /// Creates an adapter with the default ([`VerificationPolicy::Optional`])
    /// policy.
    pub fn new() -> Self {
        Self::with_policy(VerificationPolicy::Optional)
    }

    /// Creates an adapter with an explicit verification policy.
    pub fn with_policy(policy: VerificationPolicy) -> Self {
        Self { policy }
    }
}

impl Default for GitHubAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Payload schema
// ---------------------------------------------------------------------------

/// A decoded GitHub delivery.
#[derive(Debug)]
pub enum GitHubPayload {
    /// `push`
    Push(PushEvent),
    /// `pull_request`
    PullRequest(PullRequestEvent),
    /// `pull_request_review_comment`
    ReviewComment(ReviewCommentEvent),
    /// Any other event type; the body was only checked to be JSON.
    Other {
        /// The `X-GitHub-Event` value.
        event: String,
    },
}

/// Body of a `push` delivery.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    after: Option<String>,
    repository: PushRepository,
    #[serde(default)]
    head_commit: Option<HeadCommit>,
}

#[derive(Debug, Deserialize)]
struct PushRepository {
    full_name: String,
    #[serde(default)]
    pushed_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    timestamp: String,
}

/// Body of a `pull_request` delivery.
#[derive(Debug, Deserialize)]
pub struct PullRequestEvent {
    action: String,
    pull_request: PullRequest,
}

/// Body of a `pull_request_review_comment` delivery.
#[derive(Debug, Deserialize)]
pub struct ReviewCommentEvent {
    action: String,
    comment: ReviewComment,
    pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
struct ReviewComment {
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    #[serde(default)]
    merged: Option<bool>,
    updated_at: String,
    head: PullRequestRef,
    base: PullRequestRef,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
    // `null` on the head side once the fork has been deleted.
    #[serde(default)]
    repo: Option<RepositoryRef>,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    full_name: String,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

impl ProviderAdapter for GitHubAdapter {
    type Payload = GitHubPayload;

    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn authentication(&self) -> Authentication {
        Authentication {
            credential: Credential::HmacSha256 {
                header: Self::SIGNATURE_HEADER,
                prefix: "sha256=",
            },
            policy: self.policy,
        }
    }

    fn event_table(&self) -> &'static [EventRule] {
        EVENT_TABLE
    }

    fn decode(&self, request: &WebhookRequest) -> Result<GitHubPayload, WebhookError> {
        let event = required_header(PROVIDER, request, Self::EVENT_HEADER)?;
        let body = request.body();

        Ok(match event {
            "push" => GitHubPayload::Push(decode_json(PROVIDER, body)?),
            "pull_request" => GitHubPayload::PullRequest(decode_json(PROVIDER, body)?),
            "pull_request_review_comment" => GitHubPayload::ReviewComment(decode_json(PROVIDER, body)?),
            other => {
                ensure_json(PROVIDER, body)?;
                GitHubPayload::Other {
                    event: other.to_string(),
                }
            }
        })
    }

    fn signal(&self, payload: &GitHubPayload) -> EventSignal {
        match payload {
            GitHubPayload::Push(push) => EventSignal::qualified("push", ref_kind(&push.git_ref)),
            GitHubPayload::PullRequest(pr) => EventSignal::qualified(
                "pull_request",
                pull_request_action(&pr.action, pr.pull_request.merged.unwrap_or(false)),
            ),
            GitHubPayload::ReviewComment(comment) => {
                EventSignal::qualified("pull_request_review_comment", comment.action.as_str())
            }
            GitHubPayload::Other { event } => EventSignal::new(event.as_str()),
        }
    }

    fn normalize(
        &self,
        event: WebhookEvent,
        payload: GitHubPayload,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        match payload {
            GitHubPayload::Push(push) => {
                let target = normalize::location(PROVIDER, push.repository.full_name, &push.git_ref)?;
                let timestamp = match (&push.head_commit, push.repository.pushed_at) {
                    (Some(commit), _) => Some(normalize::timestamp(
                        PROVIDER,
                        NativeTime::Iso8601(&commit.timestamp),
                    )?),
                    (None, Some(seconds)) => Some(normalize::timestamp(PROVIDER, NativeTime::Seconds(seconds))?),
                    (None, None) => None,
                };
                Ok(CanonicalWebhookEvent::push(
                    event,
                    target,
                    timestamp,
                    normalize::commit_sha(push.after.as_deref()),
                ))
            }
            GitHubPayload::PullRequest(pr) => {
                let updated_at = pr.pull_request.updated_at.clone();
                pull_request_event(event, pr.pull_request, &updated_at)
            }
            GitHubPayload::ReviewComment(comment) => {
                pull_request_event(event, comment.pull_request, &comment.comment.updated_at)
            }
            GitHubPayload::Other { event: name } => Err(WebhookError::malformed(
                PROVIDER,
                format!("event type '{name}' cannot be normalized"),
            )),
        }
    }
}

fn pull_request_event(
    event: WebhookEvent,
    pr: PullRequest,
    time: &str,
) -> Result<CanonicalWebhookEvent, WebhookError> {
    let base_repo = pr
        .base
        .repo
        .ok_or_else(|| WebhookError::malformed(PROVIDER, "pull request base has no repository"))?
        .full_name;
    let head_repo = pr.head.repo.map(|repo| repo.full_name);

    let target = normalize::location(PROVIDER, base_repo.clone(), &pr.base.ref_name)?;
    let source = source_location(head_repo, base_repo, &pr.head.ref_name)?;

    Ok(CanonicalWebhookEvent::pull_request(
        event,
        target,
        source,
        normalize::timestamp(PROVIDER, NativeTime::Iso8601(time))?,
        normalize::commit_sha(Some(pr.head.sha.as_str())),
        Some(PullRequestId::new(pr.number)),
    ))
}

// ---------------------------------------------------------------------------
// Naming quirks
// ---------------------------------------------------------------------------

/// Qualifier for a push: `"branch"`, `"tag"`, or `"other"` (e.g. `refs/notes/*`).
pub fn ref_kind(git_ref: &str) -> &'static str {
    match GitRef::parse(git_ref) {
        GitRef::Branch(_) => "branch",
        GitRef::Tag(_) => "tag",
        GitRef::Bare(_) => "other",
    }
}

/// Qualifier for a `pull_request` delivery: the action, with `closed` split
/// into `closed:merged` and `closed` by the `merged` flag.
pub fn pull_request_action(action: &str, merged: bool) -> String {
    if action == "closed" && merged {
        "closed:merged".to_string()
    } else {
        action.to_string()
    }
}

/// The source side of a pull request. A head repository that is gone (its
/// fork was deleted) falls back to the base repository.
fn source_location(
    head_repo: Option<String>,
    base_repo: String,
    head_ref: &str,
) -> Result<RefLocation, WebhookError> {
    normalize::location(PROVIDER, head_repo.unwrap_or(base_repo), head_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WebhookParser;
    use crate::WebhookSecret;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderName, HeaderValue};

    fn request(event: &'static str, body: impl Into<Bytes>) -> WebhookRequest {
        WebhookRequest::new(HeaderMap::new(), body).with_header(
            HeaderName::from_static("x-github-event"),
            HeaderValue::from_static(event),
        )
    }

    fn parse(event: &'static str, body: impl Into<Bytes>) -> Result<CanonicalWebhookEvent, WebhookError> {
        GitHubAdapter::new().parse(&WebhookSecret::none(), &request(event, body))
    }

    const PR_BODY: &str = r#"{
        "action": "closed",
        "number": 12,
        "pull_request": {
            "number": 12,
            "merged": true,
            "updated_at": "2021-09-09T09:11:01Z",
            "head": {"ref": "feature", "sha": "abc123", "repo": {"full_name": "fork/hello"}},
            "base": {"ref": "main", "sha": "def456", "repo": {"full_name": "octo/hello"}}
        }
    }"#;

    #[test]
    fn merged_close_is_split_from_plain_close() {
        assert_eq!(pull_request_action("closed", true), "closed:merged");
        assert_eq!(pull_request_action("closed", false), "closed");
        assert_eq!(pull_request_action("opened", true), "opened");
    }

    #[test]
    fn ref_kinds() {
        assert_eq!(ref_kind("refs/heads/main"), "branch");
        assert_eq!(ref_kind("refs/tags/v1"), "tag");
        assert_eq!(ref_kind("refs/notes/commits"), "other");
    }

    #[test]
    fn merged_pull_request_from_fork() {
        let event = parse("pull_request", PR_BODY).unwrap();
        assert_eq!(event.event, WebhookEvent::PrMerged);
        assert_eq!(event.repository.unwrap().as_str(), "octo/hello");
        assert_eq!(event.branch.unwrap().as_str(), "main");
        assert_eq!(event.source_repository.unwrap().as_str(), "fork/hello");
        assert_eq!(event.source_branch.unwrap().as_str(), "feature");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_661);
        assert_eq!(event.pull_request_id, Some(PullRequestId::new(12)));
    }

    #[test]
    fn deleted_fork_falls_back_to_base_repository() {
        let body = r#"{
            "action": "opened",
            "number": 3,
            "pull_request": {
                "number": 3,
                "updated_at": "2021-09-09T09:11:01Z",
                "head": {"ref": "feature", "sha": "abc123", "repo": null},
                "base": {"ref": "main", "sha": "def456", "repo": {"full_name": "octo/hello"}}
            }
        }"#;
        let event = parse("pull_request", body).unwrap();
        assert_eq!(event.event, WebhookEvent::PrCreated);
        assert_eq!(event.source_repository.unwrap().as_str(), "octo/hello");
    }

    #[test]
    fn branch_deletion_uses_pushed_at_seconds() {
        let body = r#"{
            "ref": "refs/heads/old",
            "after": "0000000000000000000000000000000000000000",
            "repository": {"full_name": "octo/hello", "pushed_at": 1631178392},
            "head_commit": null
        }"#;
        let event = parse("push", body).unwrap();
        assert_eq!(event.event, WebhookEvent::Push);
        assert_eq!(event.branch.unwrap().as_str(), "old");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
        assert!(event.commit_sha.is_none());
    }

    #[test]
    fn labeled_pull_request_is_unrecognized() {
        let body = PR_BODY.replace("\"closed\"", "\"labeled\"");
        let event = parse("pull_request", body).unwrap();
        assert!(event.is_unrecognized());
    }

    #[test]
    fn unknown_event_type_is_soft() {
        let event = parse("ping", r#"{"zen": "Keep it logically awesome."}"#).unwrap();
        assert!(event.is_unrecognized());
    }

    #[test]
    fn unknown_event_type_still_requires_json() {
        assert!(matches!(
            parse("ping", "not json"),
            Err(WebhookError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn missing_event_header_is_malformed() {
        let request = WebhookRequest::new(HeaderMap::new(), PR_BODY);
        let err = GitHubAdapter::new()
            .parse(&WebhookSecret::none(), &request)
            .unwrap_err();
        assert_eq!(
            err,
            WebhookError::malformed(Provider::GitHub, "missing X-GitHub-Event header")
        );
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let body = r#"{"ref": "refs/heads/main"}"#;
        assert!(matches!(
            parse("push", body),
            Err(WebhookError::MalformedPayload {
                provider: Provider::GitHub,
                ..
            })
        ));
    }
}
