//! Bitbucket Server / Data Center.
//!
//! - Event type: `X-Event-Key` header (`repo:refs_changed`, `pr:opened`, ...).
//! - Authentication: HMAC-SHA256 in `X-Hub-Signature: sha256=<hex>`.
//! - Repository: `<PROJECT KEY>/<slug>`, or `~<owner>/<slug>` for a
//!   personal project.
//! - Time: `date` (ISO-8601 with a `+hhmm` offset) for ref changes,
//!   `updatedDate` (epoch milliseconds) for pull requests.

use serde::Deserialize;

use events::{CanonicalWebhookEvent, Provider, PullRequestId, WebhookError, WebhookEvent};

use crate::classifier::{EventRule, EventSignal};
use crate::normalize::{self, NativeTime};
use crate::provider::{decode_json, ensure_json, required_header, ProviderAdapter};
use crate::signature::{Authentication, Credential, VerificationPolicy};
use crate::WebhookRequest;

const PROVIDER: Provider = Provider::BitbucketServer;

const REFS_CHANGED: &str = "repo:refs_changed";
const PERSONAL_MARKER: char = '~';

const EVENT_TABLE: &[EventRule] = &[
    EventRule::exact(REFS_CHANGED, "BRANCH", WebhookEvent::Push),
    EventRule::exact(REFS_CHANGED, "TAG", WebhookEvent::TagPush),
    EventRule::any("pr:opened", WebhookEvent::PrCreated),
    EventRule::any("pr:from_ref_updated", WebhookEvent::PrEdited),
    EventRule::any("pr:modified", WebhookEvent::PrEdited),
    EventRule::any("pr:merged", WebhookEvent::PrMerged),
    EventRule::any("pr:declined", WebhookEvent::PrRejected),
    EventRule::any("pr:deleted", WebhookEvent::PrRejected),
    EventRule::any("pr:comment:added", WebhookEvent::PrCommented),
];

/// Adapter for Bitbucket Server webhooks.
#[derive(Debug, Clone)]
pub struct BitbucketServerAdapter {
    policy: VerificationPolicy,
}

impl BitbucketServerAdapter {
    /// Header carrying the event type.
    pub const EVENT_HEADER: &'static str = "X-Event-Key";
    /// Header carrying the body signature.
    pub const SIGNATURE_HEADER: &'static str = "X-Hub-Signature";

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

impl Default for BitbucketServerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Payload schema
// ---------------------------------------------------------------------------

/// A decoded Bitbucket Server delivery.
#[derive(Debug)]
pub enum BitbucketServerPayload {
    /// `repo:refs_changed`
    RefsChanged(RefsChangedEvent),
    /// Any `pr:*` event listed in the classification table.
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

/// Body of a `repo:refs_changed` delivery.
#[derive(Debug, Deserialize)]
pub struct RefsChangedEvent {
    date: String,
    repository: Repository,
    changes: Vec<RefChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefChange {
    ref_id: String,
    #[serde(default)]
    to_hash: Option<String>,
    #[serde(rename = "ref")]
    target: ChangedRef,
}

#[derive(Debug, Deserialize)]
struct ChangedRef {
    #[serde(rename = "type")]
    kind: String,
}

/// Body of a `pr:*` delivery.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestEvent {
    pull_request: PullRequest,
    #[serde(default)]
    comment: Option<Comment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    id: u64,
    updated_date: i64,
    from_ref: PullRequestRef,
    to_ref: PullRequestRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestRef {
    id: String,
    #[serde(default)]
    latest_commit: Option<String>,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Comment {
    created_date: i64,
}

#[derive(Debug, Deserialize)]
struct Repository {
    slug: String,
    project: Project,
}

#[derive(Debug, Deserialize)]
struct Project {
    key: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    owner: Option<Owner>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    slug: String,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

impl ProviderAdapter for BitbucketServerAdapter {
    type Payload = BitbucketServerPayload;

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

    fn decode(&self, request: &WebhookRequest) -> Result<BitbucketServerPayload, WebhookError> {
        let event = required_header(PROVIDER, request, Self::EVENT_HEADER)?;
        let body = request.body();

        if event == REFS_CHANGED {
            let refs: RefsChangedEvent = decode_json(PROVIDER, body)?;
            if refs.changes.is_empty() {
                return Err(WebhookError::malformed(PROVIDER, "refs_changed without changes"));
            }
            return Ok(BitbucketServerPayload::RefsChanged(refs));
        }

        if is_pull_request_key(event) {
            return Ok(BitbucketServerPayload::PullRequest {
                event: event.to_string(),
                body: decode_json(PROVIDER, body)?,
            });
        }

        ensure_json(PROVIDER, body)?;
        Ok(BitbucketServerPayload::Other {
            event: event.to_string(),
        })
    }

    fn signal(&self, payload: &BitbucketServerPayload) -> EventSignal {
        match payload {
            // The first change decides; a single push touches one ref type.
            BitbucketServerPayload::RefsChanged(refs) => match refs.changes.first() {
                Some(change) => EventSignal::qualified(REFS_CHANGED, change.target.kind.as_str()),
                None => EventSignal::new(REFS_CHANGED),
            },
            BitbucketServerPayload::PullRequest { event, .. } | BitbucketServerPayload::Other { event } => {
                EventSignal::new(event.as_str())
            }
        }
    }

    fn normalize(
        &self,
        event: WebhookEvent,
        payload: BitbucketServerPayload,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        match payload {
            BitbucketServerPayload::RefsChanged(refs) => {
                let change = refs
                    .changes
                    .first()
                    .ok_or_else(|| WebhookError::malformed(PROVIDER, "refs_changed without changes"))?;
                let target = normalize::location(PROVIDER, repository_name(&refs.repository), &change.ref_id)?;
                let timestamp = normalize::timestamp(PROVIDER, NativeTime::Iso8601(&refs.date))?;

                Ok(CanonicalWebhookEvent::push(
                    event,
                    target,
                    Some(timestamp),
                    normalize::commit_sha(change.to_hash.as_deref()),
                ))
            }
            BitbucketServerPayload::PullRequest { body, .. } => {
                let pr = body.pull_request;
                let millis = body
                    .comment
                    .map(|comment| comment.created_date)
                    .unwrap_or(pr.updated_date);

                let target = normalize::location(PROVIDER, repository_name(&pr.to_ref.repository), &pr.to_ref.id)?;
                let source =
                    normalize::location(PROVIDER, repository_name(&pr.from_ref.repository), &pr.from_ref.id)?;

                Ok(CanonicalWebhookEvent::pull_request(
                    event,
                    target,
                    source,
                    normalize::timestamp(PROVIDER, NativeTime::Millis(millis))?,
                    normalize::commit_sha(pr.from_ref.latest_commit.as_deref()),
                    Some(PullRequestId::new(pr.id)),
                ))
            }
            BitbucketServerPayload::Other { event: name } => Err(WebhookError::malformed(
                PROVIDER,
                format!("event key '{name}' cannot be normalized"),
            )),
        }
    }
}

fn is_pull_request_key(event: &str) -> bool {
    event.starts_with("pr:") && EVENT_TABLE.iter().any(|rule| rule.kind == event)
}

// ---------------------------------------------------------------------------
// Naming quirks
// ---------------------------------------------------------------------------

/// Renders a repository in Bitbucket Server's own convention.
///
/// Project repositories are `<PROJECT KEY>/<slug>`. Repositories in a user's
/// personal project are `~<owner slug>/<slug>`.
fn repository_name(repository: &Repository) -> String {
    let project = &repository.project;
    let personal = project.kind.as_deref() == Some("PERSONAL") || project.key.starts_with(PERSONAL_MARKER);

    if personal {
        let owner = project.owner.as_ref().map(|owner| owner.slug.as_str());
        format!("{}/{}", personal_namespace(&project.key, owner), repository.slug)
    } else {
        format!("{}/{}", project.key, repository.slug)
    }
}

/// The `~user` namespace of a personal project.
///
/// Prefers the owner's slug; without one, falls back to the project key
/// (`~USER`) lower-cased.
pub fn personal_namespace(project_key: &str, owner_slug: Option<&str>) -> String {
    let user = match owner_slug {
        Some(slug) if !slug.is_empty() => slug.to_string(),
        _ => project_key.trim_start_matches(PERSONAL_MARKER).to_lowercase(),
    };
    format!("{PERSONAL_MARKER}{user}")
}
