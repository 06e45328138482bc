//! GitLab (gitlab.com and self-managed).
//!
//! - Event type: `X-Gitlab-Event` header (`Push Hook`, `Merge Request Hook`,
//!   ...), refined by `object_attributes.action` or `noteable_type`.
//! - Authentication: the configured token itself in `X-Gitlab-Token`.
//! - Repository: `project.path_with_namespace`, verbatim (may contain
//!   subgroups, e.g. `group/sub/project`).
//! - Time: ISO-8601 text; older instances use `2021-09-09 09:06:32 UTC`.

use serde::Deserialize;

use events::{CanonicalWebhookEvent, Provider, PullRequestId, UnixTimestamp, WebhookError, WebhookEvent};

use crate::classifier::{EventRule, EventSignal};
use crate::normalize::{self, NativeTime};
use crate::provider::{decode_json, ensure_json, required_header, ProviderAdapter};
use crate::signature::{Authentication, Credential, VerificationPolicy};
use crate::WebhookRequest;

const PROVIDER: Provider = Provider::GitLab;

const PUSH_HOOK: &str = "Push Hook";
const TAG_PUSH_HOOK: &str = "Tag Push Hook";
const MERGE_REQUEST_HOOK: &str = "Merge Request Hook";
const NOTE_HOOK: &str = "Note Hook";

const EVENT_TABLE: &[EventRule] = &[
    EventRule::any(PUSH_HOOK, WebhookEvent::Push),
    EventRule::any(TAG_PUSH_HOOK, WebhookEvent::TagPush),
    EventRule::exact(MERGE_REQUEST_HOOK, "open", WebhookEvent::PrCreated),
    EventRule::exact(MERGE_REQUEST_HOOK, "reopen", WebhookEvent::PrCreated),
    EventRule::exact(MERGE_REQUEST_HOOK, "update", WebhookEvent::PrEdited),
    EventRule::exact(MERGE_REQUEST_HOOK, "merge", WebhookEvent::PrMerged),
    EventRule::exact(MERGE_REQUEST_HOOK, "close", WebhookEvent::PrRejected),
    EventRule::exact(NOTE_HOOK, "MergeRequest", WebhookEvent::PrCommented),
];

/// Adapter for GitLab webhooks.
#[derive(Debug, Clone)]
pub struct GitLabAdapter {
    policy: VerificationPolicy,
}

impl GitLabAdapter {
    /// Header carrying the event type.
    pub const EVENT_HEADER: &'static str = "X-Gitlab-Event";
    /// Header carrying the secret token.
    pub const TOKEN_HEADER: &'static str = "X-Gitlab-Token";

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

impl Default for GitLabAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Payload schema
// ---------------------------------------------------------------------------

/// A decoded GitLab delivery.
#[derive(Debug)]
pub enum GitLabPayload {
    /// `Push Hook`
    Push(PushHook),
    /// `Tag Push Hook` (same schema as a branch push)
    TagPush(PushHook),
    /// `Merge Request Hook`
    MergeRequest(MergeRequestHook),
    /// `Note Hook`
    Note(NoteHook),
    /// Any other hook; the body was only checked to be JSON.
    Other {
        /// The `X-Gitlab-Event` value.
        event: String,
    },
}

/// Body of a `Push Hook` or `Tag Push Hook` delivery.
#[derive(Debug, Deserialize)]
pub struct PushHook {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    checkout_sha: Option<String>,
    project: Project,
    #[serde(default)]
    commits: Vec<Commit>,
}

#[derive(Debug, Deserialize)]
struct Project {
    path_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    id: String,
    timestamp: String,
}

/// Body of a `Merge Request Hook` delivery.
#[derive(Debug, Deserialize)]
pub struct MergeRequestHook {
    object_attributes: MergeRequest,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
    #[serde(default)]
    action: Option<String>,
    source_branch: String,
    target_branch: String,
    source: Project,
    target: Project,
    #[serde(default)]
    last_commit: Option<LastCommit>,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct LastCommit {
    id: String,
}

/// Body of a `Note Hook` delivery.
#[derive(Debug, Deserialize)]
pub struct NoteHook {
    object_attributes: Note,
    #[serde(default)]
    merge_request: Option<MergeRequest>,
}

#[derive(Debug, Deserialize)]
struct Note {
    noteable_type: String,
    created_at: String,
    #[serde(default)]
    updated_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

impl ProviderAdapter for GitLabAdapter {
    type Payload = GitLabPayload;

    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn authentication(&self) -> Authentication {
        Authentication {
            credential: Credential::TokenHeader {
                header: Self::TOKEN_HEADER,
            },
            policy: self.policy,
        }
    }

    fn event_table(&self) -> &'static [EventRule] {
        EVENT_TABLE
    }

    fn decode(&self, request: &WebhookRequest) -> Result<GitLabPayload, WebhookError> {
        let event = required_header(PROVIDER, request, Self::EVENT_HEADER)?;
        let body = request.body();

        Ok(match event {
            PUSH_HOOK => GitLabPayload::Push(decode_json(PROVIDER, body)?),
            TAG_PUSH_HOOK => GitLabPayload::TagPush(decode_json(PROVIDER, body)?),
            MERGE_REQUEST_HOOK => GitLabPayload::MergeRequest(decode_json(PROVIDER, body)?),
            NOTE_HOOK => GitLabPayload::Note(decode_json(PROVIDER, body)?),
            other => {
                ensure_json(PROVIDER, body)?;
                GitLabPayload::Other {
                    event: other.to_string(),
                }
            }
        })
    }

    fn signal(&self, payload: &GitLabPayload) -> EventSignal {
        match payload {
            GitLabPayload::Push(_) => EventSignal::new(PUSH_HOOK),
            GitLabPayload::TagPush(_) => EventSignal::new(TAG_PUSH_HOOK),
            GitLabPayload::MergeRequest(hook) => EventSignal {
                kind: MERGE_REQUEST_HOOK.to_string(),
                qualifier: hook.object_attributes.action.clone(),
            },
            GitLabPayload::Note(hook) => {
                EventSignal::qualified(NOTE_HOOK, hook.object_attributes.noteable_type.as_str())
            }
            GitLabPayload::Other { event } => EventSignal::new(event.as_str()),
        }
    }

    fn normalize(
        &self,
        event: WebhookEvent,
        payload: GitLabPayload,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        match payload {
            GitLabPayload::Push(hook) | GitLabPayload::TagPush(hook) => {
                let timestamp = head_commit_time(&hook)?;
                let commit = normalize::commit_sha(hook.checkout_sha.as_deref().or(hook.after.as_deref()));
                let target = normalize::location(PROVIDER, hook.project.path_with_namespace, &hook.git_ref)?;
                Ok(CanonicalWebhookEvent::push(event, target, timestamp, commit))
            }
            GitLabPayload::MergeRequest(hook) => {
                let mr = hook.object_attributes;
                let time = normalize::timestamp(PROVIDER, NativeTime::Iso8601(&mr.updated_at))?;
                merge_request_event(event, mr, time)
            }
            GitLabPayload::Note(hook) => {
                let note = hook.object_attributes;
                let mr = hook
                    .merge_request
                    .ok_or_else(|| WebhookError::malformed(PROVIDER, "merge request note without merge_request"))?;
                let text = note.updated_at.as_deref().unwrap_or(&note.created_at);
                let time = normalize::timestamp(PROVIDER, NativeTime::Iso8601(text))?;
                merge_request_event(event, mr, time)
            }
            GitLabPayload::Other { event: name } => Err(WebhookError::malformed(
                PROVIDER,
                format!("event type '{name}' cannot be normalized"),
            )),
        }
    }
}

fn merge_request_event(
    event: WebhookEvent,
    mr: MergeRequest,
    time: UnixTimestamp,
) -> Result<CanonicalWebhookEvent, WebhookError> {
    let target = normalize::location(PROVIDER, mr.target.path_with_namespace, &mr.target_branch)?;
    let source = normalize::location(PROVIDER, mr.source.path_with_namespace, &mr.source_branch)?;

    Ok(CanonicalWebhookEvent::pull_request(
        event,
        target,
        source,
        time,
        normalize::commit_sha(mr.last_commit.as_ref().map(|c| c.id.as_str())),
        Some(PullRequestId::new(mr.iid)),
    ))
}

/// Time of the commit the push moved the ref to.
///
/// GitLab lists the pushed commits oldest first; the head is the one matching
/// `checkout_sha`, or the last one listed. A push without commits (a ref
/// deletion) carries no time at all.
fn head_commit_time(hook: &PushHook) -> Result<Option<UnixTimestamp>, WebhookError> {
    let head = hook
        .checkout_sha
        .as_deref()
        .and_then(|sha| hook.commits.iter().find(|c| c.id == sha))
        .or_else(|| hook.commits.last());

    head.map(|commit| normalize::timestamp(PROVIDER, NativeTime::Iso8601(&commit.timestamp)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WebhookParser, WebhookSecret};
    use http::{HeaderMap, HeaderName, HeaderValue};

    fn request(event: &'static str, body: &'static str) -> WebhookRequest {
        WebhookRequest::new(HeaderMap::new(), body).with_header(
            HeaderName::from_static("x-gitlab-event"),
            HeaderValue::from_static(event),
        )
    }

    fn parse(event: &'static str, body: &'static str) -> Result<CanonicalWebhookEvent, WebhookError> {
        GitLabAdapter::new().parse(&WebhookSecret::none(), &request(event, body))
    }

    #[test]
    fn push_uses_checkout_commit_time() {
        let body = r#"{
            "object_kind": "push",
            "ref": "refs/heads/main",
            "checkout_sha": "bbb",
            "project": {"path_with_namespace": "group/sub/project"},
            "commits": [
                {"id": "bbb", "timestamp": "2021-09-09T12:06:32+03:00"},
                {"id": "aaa", "timestamp": "2021-09-01T00:00:00Z"}
            ]
        }"#;
        let event = parse(PUSH_HOOK, body).unwrap();
        assert_eq!(event.event, WebhookEvent::Push);
        assert_eq!(event.repository.unwrap().as_str(), "group/sub/project");
        assert_eq!(event.branch.unwrap().as_str(), "main");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
        assert_eq!(event.commit_sha.unwrap().as_str(), "bbb");
    }

    #[test]
    fn ref_deletion_has_no_timestamp() {
        let body = r#"{
            "ref": "refs/heads/gone",
            "checkout_sha": null,
            "after": "0000000000000000000000000000000000000000",
            "project": {"path_with_namespace": "group/project"},
            "commits": []
        }"#;
        let event = parse(PUSH_HOOK, body).unwrap();
        assert_eq!(event.branch.unwrap().as_str(), "gone");
        assert!(event.timestamp.is_none());
        assert!(event.commit_sha.is_none());
    }

    #[test]
    fn tag_push_strips_tag_prefix() {
        let body = r#"{
            "ref": "refs/tags/v1.0.0",
            "checkout_sha": "ccc",
            "project": {"path_with_namespace": "group/project"},
            "commits": [{"id": "ccc", "timestamp": "2021-09-09 09:06:32 UTC"}]
        }"#;
        let event = parse(TAG_PUSH_HOOK, body).unwrap();
        assert_eq!(event.event, WebhookEvent::TagPush);
        assert_eq!(event.branch.unwrap().as_str(), "v1.0.0");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
    }

    #[test]
    fn merge_request_from_fork() {
        let body = r#"{
            "object_kind": "merge_request",
            "object_attributes": {
                "iid": 4,
                "action": "merge",
                "source_branch": "feature",
                "target_branch": "main",
                "source": {"path_with_namespace": "someone/project"},
                "target": {"path_with_namespace": "group/project"},
                "last_commit": {"id": "ddd"},
                "updated_at": "2021-09-09 09:36:25 UTC"
            }
        }"#;
        let event = parse(MERGE_REQUEST_HOOK, body).unwrap();
        assert_eq!(event.event, WebhookEvent::PrMerged);
        assert_eq!(event.repository.unwrap().as_str(), "group/project");
        assert_eq!(event.source_repository.unwrap().as_str(), "someone/project");
        assert_eq!(event.source_branch.unwrap().as_str(), "feature");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_180_185);
        assert_eq!(event.pull_request_id, Some(PullRequestId::new(4)));
    }

    #[test]
    fn merge_request_without_action_is_unrecognized() {
        let body = r#"{
            "object_attributes": {
                "iid": 4,
                "source_branch": "feature",
                "target_branch": "main",
                "source": {"path_with_namespace": "group/project"},
                "target": {"path_with_namespace": "group/project"},
                "updated_at": "2021-09-09 09:36:25 UTC"
            }
        }"#;
        assert!(parse(MERGE_REQUEST_HOOK, body).unwrap().is_unrecognized());
    }

    #[test]
    fn issue_note_is_unrecognized() {
        let body = r#"{
            "object_attributes": {"noteable_type": "Issue", "created_at": "2021-09-09 09:36:25 UTC"}
        }"#;
        assert!(parse(NOTE_HOOK, body).unwrap().is_unrecognized());
    }

    #[test]
    fn merge_request_note_is_a_comment() {
        let body = r#"{
            "object_attributes": {"noteable_type": "MergeRequest", "created_at": "2021-09-09 09:11:01 UTC"},
            "merge_request": {
                "iid": 9,
                "source_branch": "feature",
                "target_branch": "main",
                "source": {"path_with_namespace": "group/project"},
                "target": {"path_with_namespace": "group/project"},
                "updated_at": "2021-09-09 09:00:00 UTC"
            }
        }"#;
        let event = parse(NOTE_HOOK, body).unwrap();
        assert_eq!(event.event, WebhookEvent::PrCommented);
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_661);
    }

    #[test]
    fn token_must_match_when_configured() {
        let request = request(PUSH_HOOK, "{}").with_header(
            HeaderName::from_static("x-gitlab-token"),
            HeaderValue::from_static("wrong"),
        );
        assert_eq!(
            GitLabAdapter::new().parse(&WebhookSecret::new("right"), &request),
            Err(WebhookError::SignatureMismatch)
        );
    }
}
