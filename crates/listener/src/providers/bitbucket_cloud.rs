//! Bitbucket Cloud (bitbucket.org).
//!
//! - Event type: `X-Event-Key` header (`repo:push`, `pullrequest:created`, ...).
//! - Authentication: Bitbucket Cloud cannot sign deliveries, so the configured
//!   token is appended to the webhook URL as `?token=<secret>`.
//! - Repository: `repository.full_name` (`workspace/slug`), verbatim.
//! - Time: `target.date` of the pushed commit; `updated_on` for pull requests.
//!   Both are ISO-8601.

use serde::Deserialize;

use events::{CanonicalWebhookEvent, Provider, PullRequestId, WebhookError, WebhookEvent};

use crate::classifier::{EventRule, EventSignal};
use crate::normalize::{self, NativeTime};
use crate::provider::{decode_json, ensure_json, required_header, ProviderAdapter};
use crate::signature::{Authentication, Credential, VerificationPolicy};
use crate::WebhookRequest;

const PROVIDER: Provider = Provider::BitbucketCloud;

const REPO_PUSH: &str = "repo:push";

const EVENT_TABLE: &[EventRule] = &[
    EventRule::exact(REPO_PUSH, "branch", WebhookEvent::Push),
    EventRule::exact(REPO_PUSH, "tag", WebhookEvent::TagPush),
    EventRule::exact(REPO_PUSH, "annotated_tag", WebhookEvent::TagPush),
    EventRule::any("pullrequest:created", WebhookEvent::PrCreated),
    EventRule::any("pullrequest:updated", WebhookEvent::PrEdited),
    EventRule::any("pullrequest:fulfilled", WebhookEvent::PrMerged),
    EventRule::any("pullrequest:rejected", WebhookEvent::PrRejected),
    EventRule::any("pullrequest:comment_created", WebhookEvent::PrCommented),
];

/// Adapter for Bitbucket Cloud webhooks.
#[derive(Debug, Clone)]
pub struct BitbucketCloudAdapter {
    policy: VerificationPolicy,
}

impl BitbucketCloudAdapter {
    /// Header carrying the event type.
    pub const EVENT_HEADER: &'static str = "X-Event-Key";
    /// Query parameter carrying the token.
    pub const TOKEN_PARAM: &'static str = "token";

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

impl Default for BitbucketCloudAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Payload schema
// ---------------------------------------------------------------------------

/// A decoded Bitbucket Cloud delivery.
#[derive(Debug)]
pub enum BitbucketCloudPayload {
    /// `repo:push`
    Push(PushEvent),
    /// Any `pullrequest:*` event listed in the classification table.
    PullRequest {
        /// The `X-Event-Key` value.
        event: String,
        /// The decoded body.
        body: PullRequestEvent,
    },
    /// Any other event key; the body was only checked to be JSON.
    Other {
        /// The `X-Event-Key` value.
        event: String,
    },
}

/// Body of a `repo:push` delivery.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    push: Push,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct Push {
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    // `new` is null when the ref was deleted, `old` when it was created.
    #[serde(default)]
    new: Option<RefState>,
    #[serde(default)]
    old: Option<RefState>,
}

#[derive(Debug, Deserialize)]
struct RefState {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    target: Option<Target>,
}

#[derive(Debug, Deserialize)]
struct Target {
    hash: String,
    #[serde(default)]
    date: Option<String>,
}

/// Body of a `pullrequest:*` delivery.
#[derive(Debug, Deserialize)]
pub struct PullRequestEvent {
    pullrequest: PullRequest,
    repository: Repository,
    #[serde(default)]
    comment: Option<Comment>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    id: u64,
    updated_on: String,
    source: Endpoint,
    destination: Endpoint,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    branch: EndpointBranch,
    #[serde(default)]
    commit: Option<EndpointCommit>,
    // Null when the source fork has been deleted.
    #[serde(default)]
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct EndpointBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct EndpointCommit {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct Comment {
    created_on: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

impl Change {
    /// The ref state that identifies the change: the new one, or the old one
    /// for a deletion.
    fn current(&self) -> Option<&RefState> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

impl ProviderAdapter for BitbucketCloudAdapter {
    type Payload = BitbucketCloudPayload;

    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn authentication(&self) -> Authentication {
        Authentication {
            credential: Credential::TokenQuery {
                param: Self::TOKEN_PARAM,
            },
            policy: self.policy,
        }
    }

    fn event_table(&self) -> &'static [EventRule] {
        EVENT_TABLE
    }

    fn decode(&self, request: &WebhookRequest) -> Result<BitbucketCloudPayload, WebhookError> {
        let event = required_header(PROVIDER, request, Self::EVENT_HEADER)?;
        let body = request.body();

        if event == REPO_PUSH {
            let push: PushEvent = decode_json(PROVIDER, body)?;
            if push.push.changes.iter().all(|change| change.current().is_none()) {
                return Err(WebhookError::malformed(PROVIDER, "repo:push without ref changes"));
            }
            return Ok(BitbucketCloudPayload::Push(push));
        }

        if event.starts_with("pullrequest:") && EVENT_TABLE.iter().any(|rule| rule.kind == event) {
            return Ok(BitbucketCloudPayload::PullRequest {
                event: event.to_string(),
                body: decode_json(PROVIDER, body)?,
            });
        }

        ensure_json(PROVIDER, body)?;
        Ok(BitbucketCloudPayload::Other {
            event: event.to_string(),
        })
    }

    fn signal(&self, payload: &BitbucketCloudPayload) -> EventSignal {
        match payload {
            BitbucketCloudPayload::Push(push) => match first_ref(push) {
                Some((_, state)) => EventSignal::qualified(REPO_PUSH, state.kind.as_str()),
                None => EventSignal::new(REPO_PUSH),
            },
            BitbucketCloudPayload::PullRequest { event, .. } | BitbucketCloudPayload::Other { event } => {
                EventSignal::new(event.as_str())
            }
        }
    }

    fn normalize(
        &self,
        event: WebhookEvent,
        payload: BitbucketCloudPayload,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        match payload {
            BitbucketCloudPayload::Push(push) => {
                let (change, state) = first_ref(&push)
                    .ok_or_else(|| WebhookError::malformed(PROVIDER, "repo:push without ref changes"))?;
                let target = normalize::location(PROVIDER, push.repository.full_name.as_str(), &state.name)?;

                // Only the new side's commit describes the pushed state.
                let pushed = change.new.as_ref().and_then(|new| new.target.as_ref());
                let timestamp = pushed
                    .and_then(|target| target.date.as_deref())
                    .map(|date| normalize::timestamp(PROVIDER, NativeTime::Iso8601(date)))
                    .transpose()?;

                Ok(CanonicalWebhookEvent::push(
                    event,
                    target,
                    timestamp,
                    normalize::commit_sha(pushed.map(|target| target.hash.as_str())),
                ))
            }
            BitbucketCloudPayload::PullRequest { body, .. } => {
                let pr = body.pullrequest;
                let time = match &body.comment {
                    Some(comment) => comment.created_on.as_str(),
                    None => pr.updated_on.as_str(),
                };

                let target_repo = pr
                    .destination
                    .repository
                    .map(|repo| repo.full_name)
                    .unwrap_or_else(|| body.repository.full_name.clone());
                let source_repo = pr
                    .source
                    .repository
                    .map(|repo| repo.full_name)
                    .unwrap_or_else(|| target_repo.clone());

                let target = normalize::location(PROVIDER, target_repo, &pr.destination.branch.name)?;
                let source = normalize::location(PROVIDER, source_repo, &pr.source.branch.name)?;

                Ok(CanonicalWebhookEvent::pull_request(
                    event,
                    target,
                    source,
                    normalize::timestamp(PROVIDER, NativeTime::Iso8601(time))?,
                    normalize::commit_sha(pr.source.commit.as_ref().map(|c| c.hash.as_str())),
                    Some(PullRequestId::new(pr.id)),
                ))
            }
            BitbucketCloudPayload::Other { event: name } => Err(WebhookError::malformed(
                PROVIDER,
                format!("event key '{name}' cannot be normalized"),
            )),
        }
    }
}

/// The first change that names a ref; branch, time and commit all come from it.
fn first_ref(push: &PushEvent) -> Option<(&Change, &RefState)> {
    push.push
        .changes
        .iter()
        .find_map(|change| change.current().map(|state| (change, state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WebhookParser, WebhookSecret};
    use http::{HeaderMap, HeaderName, HeaderValue};

    const PUSH_BODY: &str = r#"{
        "actor": {"display_name": "Someone"},
        "repository": {"full_name": "team/website", "name": "website"},
        "push": {"changes": [{
            "new": {
                "type": "branch",
                "name": "main",
                "target": {"type": "commit", "hash": "5c1b2a", "date": "2021-09-09T09:06:32+00:00"}
            },
            "old": {
                "type": "branch",
                "name": "main",
                "target": {"type": "commit", "hash": "4a0b1c", "date": "2021-09-01T00:00:00+00:00"}
            }
        }]}
    }"#;

    fn request(event: &'static str, body: &'static str) -> WebhookRequest {
        WebhookRequest::new(HeaderMap::new(), body).with_header(
            HeaderName::from_static("x-event-key"),
            HeaderValue::from_static(event),
        )
    }

    #[test]
    fn push_uses_new_target() {
        let event = BitbucketCloudAdapter::new()
            .parse(&WebhookSecret::none(), &request(REPO_PUSH, PUSH_BODY))
            .unwrap();
        assert_eq!(event.event, WebhookEvent::Push);
        assert_eq!(event.repository.unwrap().as_str(), "team/website");
        assert_eq!(event.branch.unwrap().as_str(), "main");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
        assert_eq!(event.commit_sha.unwrap().as_str(), "5c1b2a");
    }

    #[test]
    fn branch_deletion_has_no_commit() {
        let body = r#"{
            "repository": {"full_name": "team/website"},
            "push": {"changes": [{
                "new": null,
                "old": {"type": "branch", "name": "stale", "target": {"hash": "4a0b1c", "date": "2021-09-01T00:00:00+00:00"}}
            }]}
        }"#;
        let event = BitbucketCloudAdapter::new()
            .parse(&WebhookSecret::none(), &request(REPO_PUSH, body))
            .unwrap();
        assert_eq!(event.branch.unwrap().as_str(), "stale");
        assert!(event.timestamp.is_none());
        assert!(event.commit_sha.is_none());
    }

    #[test]
    fn change_without_ref_is_skipped_as_a_whole() {
        let body = r#"{
            "repository": {"full_name": "team/website"},
            "push": {"changes": [
                {"new": null, "old": null},
                {"new": {"type": "branch", "name": "main", "target": {"hash": "abc123", "date": "2021-09-09T09:06:32+00:00"}}}
            ]}
        }"#;
        let event = BitbucketCloudAdapter::new()
            .parse(&WebhookSecret::none(), &request(REPO_PUSH, body))
            .unwrap();
        assert_eq!(event.branch.unwrap().as_str(), "main");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
        assert_eq!(event.commit_sha.unwrap().as_str(), "abc123");
    }

    #[test]
    fn annotated_tag_is_tag_push() {
        let body = r#"{
            "repository": {"full_name": "team/website"},
            "push": {"changes": [{"new": {"type": "annotated_tag", "name": "v3", "target": {"hash": "abc"}}}]}
        }"#;
        let event = BitbucketCloudAdapter::new()
            .parse(&WebhookSecret::none(), &request(REPO_PUSH, body))
            .unwrap();
        assert_eq!(event.event, WebhookEvent::TagPush);
        assert_eq!(event.branch.unwrap().as_str(), "v3");
    }

    #[test]
    fn token_is_read_from_query() {
        let adapter = BitbucketCloudAdapter::new();
        let secret = WebhookSecret::new("s3cret");

        let missing = adapter.parse(&secret, &request(REPO_PUSH, PUSH_BODY)).unwrap_err();
        assert!(matches!(missing, WebhookError::MissingSignature { .. }));

        let wrong = request(REPO_PUSH, PUSH_BODY).with_query("token=nope");
        assert_eq!(adapter.parse(&secret, &wrong), Err(WebhookError::SignatureMismatch));

        let right = request(REPO_PUSH, PUSH_BODY).with_query("token=s3cret");
        assert!(adapter.parse(&secret, &right).is_ok());
    }

    #[test]
    fn fulfilled_pull_request_is_merged() {
        let body = r#"{
            "repository": {"full_name": "team/website"},
            "pullrequest": {
                "id": 17,
                "updated_on": "2021-09-09T09:36:25.123456+00:00",
                "source": {"branch": {"name": "feature"}, "commit": {"hash": "f00"}, "repository": {"full_name": "fork/website"}},
                "destination": {"branch": {"name": "main"}, "commit": {"hash": "ba5"}, "repository": {"full_name": "team/website"}}
            }
        }"#;
        let event = BitbucketCloudAdapter::new()
            .parse(&WebhookSecret::none(), &request("pullrequest:fulfilled", body))
            .unwrap();
        assert_eq!(event.event, WebhookEvent::PrMerged);
        assert_eq!(event.source_repository.unwrap().as_str(), "fork/website");
        assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_180_185);
        assert_eq!(event.pull_request_id, Some(PullRequestId::new(17)));
    }
}
