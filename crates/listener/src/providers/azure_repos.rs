//! Azure Repos (Azure DevOps service hooks).
//!
//! - Event type: the `eventType` field of the JSON envelope; there is no
//!   event header.
//! - Authentication: none. Service hooks can only be protected with basic
//!   auth on the receiving endpoint, which is outside this crate.
//! - Repository: `<project>/<repository>`.
//! - Time: ISO-8601 with a seven-digit fraction (`createdDate`, push `date`).

use serde::de::DeserializeOwned;
use serde::Deserialize;

use events::{CanonicalWebhookEvent, Provider, PullRequestId, WebhookError, WebhookEvent};

use crate::classifier::{EventRule, EventSignal};
use crate::normalize::{self, GitRef, NativeTime};
use crate::provider::{decode_json, ProviderAdapter};
use crate::signature::Authentication;
use crate::WebhookRequest;

const PROVIDER: Provider = Provider::AzureRepos;

const GIT_PUSH: &str = "git.push";
const PR_CREATED: &str = "git.pullrequest.created";
const PR_UPDATED: &str = "git.pullrequest.updated";
const PR_MERGED: &str = "git.pullrequest.merged";
const PR_COMMENT: &str = "ms.vss-code.git-pullrequest-comment-event";

const EVENT_TABLE: &[EventRule] = &[
    EventRule::exact(GIT_PUSH, "branch", WebhookEvent::Push),
    EventRule::exact(GIT_PUSH, "tag", WebhookEvent::TagPush),
    EventRule::any(PR_CREATED, WebhookEvent::PrCreated),
    EventRule::exact(PR_UPDATED, "active", WebhookEvent::PrEdited),
    EventRule::exact(PR_UPDATED, "completed", WebhookEvent::PrMerged),
    EventRule::exact(PR_UPDATED, "abandoned", WebhookEvent::PrRejected),
    EventRule::exact(PR_MERGED, "completed", WebhookEvent::PrMerged),
    EventRule::any(PR_COMMENT, WebhookEvent::PrCommented),
];

/// Adapter for Azure Repos service hooks.
#[derive(Debug, Clone, Default)]
pub struct AzureReposAdapter;

impl AzureReposAdapter {
    /// Creates the adapter. Azure Repos has no verification mechanism, so
    /// there is no policy to choose.
    pub fn new() -> Self {
        Self
    }
}

// ---------------------------------------------------------------------------
// Payload schema
// ---------------------------------------------------------------------------

/// A decoded Azure Repos delivery.
#[derive(Debug)]
pub enum AzureReposPayload {
    /// `git.push`
    Push {
        /// Envelope `createdDate`.
        created: String,
        /// The decoded resource.
        resource: PushResource,
    },
    /// `git.pullrequest.*`
    PullRequest {
        /// Envelope `eventType`.
        event: String,
        /// Envelope `createdDate`.
        created: String,
        /// The decoded resource.
        resource: PullRequestResource,
    },
    /// Pull request comment
    Comment {
        /// Envelope `createdDate`.
        created: String,
        /// The pull request the comment belongs to.
        resource: PullRequestResource,
    },
    /// Any other event type; the resource was left undecoded.
    Other {
        /// Envelope `eventType`.
        event: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    event_type: String,
    created_date: String,
    resource: serde_json::Value,
}

/// `resource` of a `git.push` event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResource {
    ref_updates: Vec<RefUpdate>,
    repository: Repository,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefUpdate {
    name: String,
    #[serde(default)]
    new_object_id: Option<String>,
}

/// `resource` of a pull request event (or `resource.pullRequest` of a
/// comment event).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestResource {
    pull_request_id: u64,
    status: String,
    source_ref_name: String,
    target_ref_name: String,
    repository: Repository,
    #[serde(default)]
    fork_source: Option<ForkSource>,
    #[serde(default)]
    last_merge_source_commit: Option<CommitRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentResource {
    pull_request: PullRequestResource,
}

#[derive(Debug, Deserialize)]
struct ForkSource {
    repository: Repository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitRef {
    commit_id: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    #[serde(default)]
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    name: String,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

impl ProviderAdapter for AzureReposAdapter {
    type Payload = AzureReposPayload;

    fn provider(&self) -> Provider {
        PROVIDER
    }

    fn authentication(&self) -> Authentication {
        Authentication::NONE
    }

    fn event_table(&self) -> &'static [EventRule] {
        EVENT_TABLE
    }

    fn decode(&self, request: &WebhookRequest) -> Result<AzureReposPayload, WebhookError> {
        let envelope: Envelope = decode_json(PROVIDER, request.body())?;
        let created = envelope.created_date;

        Ok(match envelope.event_type.as_str() {
            GIT_PUSH => {
                let resource: PushResource = decode_resource(envelope.resource)?;
                if resource.ref_updates.is_empty() {
                    return Err(WebhookError::malformed(PROVIDER, "git.push without refUpdates"));
                }
                AzureReposPayload::Push { created, resource }
            }
            PR_CREATED | PR_UPDATED | PR_MERGED => AzureReposPayload::PullRequest {
                resource: decode_resource(envelope.resource)?,
                event: envelope.event_type.clone(),
                created,
            },
            PR_COMMENT => {
                let comment: CommentResource = decode_resource(envelope.resource)?;
                AzureReposPayload::Comment {
                    created,
                    resource: comment.pull_request,
                }
            }
            _ => AzureReposPayload::Other {
                event: envelope.event_type.clone(),
            },
        })
    }

    fn signal(&self, payload: &AzureReposPayload) -> EventSignal {
        match payload {
            AzureReposPayload::Push { resource, .. } => match resource.ref_updates.first() {
                Some(update) => EventSignal::qualified(GIT_PUSH, ref_kind(&update.name)),
                None => EventSignal::new(GIT_PUSH),
            },
            AzureReposPayload::PullRequest { event, resource, .. } => {
                EventSignal::qualified(event.as_str(), resource.status.as_str())
            }
            AzureReposPayload::Comment { .. } => EventSignal::new(PR_COMMENT),
            AzureReposPayload::Other { event } => EventSignal::new(event.as_str()),
        }
    }

    fn normalize(
        &self,
        event: WebhookEvent,
        payload: AzureReposPayload,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        match payload {
            AzureReposPayload::Push { created, resource } => {
                let update = resource
                    .ref_updates
                    .first()
                    .ok_or_else(|| WebhookError::malformed(PROVIDER, "git.push without refUpdates"))?;
                let target = normalize::location(PROVIDER, repository_name(&resource.repository), &update.name)?;
                let time = resource.date.as_deref().unwrap_or(&created);

                Ok(CanonicalWebhookEvent::push(
                    event,
                    target,
                    Some(normalize::timestamp(PROVIDER, NativeTime::Iso8601(time))?),
                    normalize::commit_sha(update.new_object_id.as_deref()),
                ))
            }
            AzureReposPayload::PullRequest { created, resource, .. }
            | AzureReposPayload::Comment { created, resource } => pull_request_event(event, &created, resource),
            AzureReposPayload::Other { event: name } => Err(WebhookError::malformed(
                PROVIDER,
                format!("event type '{name}' cannot be normalized"),
            )),
        }
    }
}

fn pull_request_event(
    event: WebhookEvent,
    created: &str,
    pr: PullRequestResource,
) -> Result<CanonicalWebhookEvent, WebhookError> {
    let target_repo = repository_name(&pr.repository);
    let source_repo = pr
        .fork_source
        .as_ref()
        .map(|fork| repository_name(&fork.repository))
        .unwrap_or_else(|| target_repo.clone());

    let target = normalize::location(PROVIDER, target_repo, &pr.target_ref_name)?;
    let source = normalize::location(PROVIDER, source_repo, &pr.source_ref_name)?;

    Ok(CanonicalWebhookEvent::pull_request(
        event,
        target,
        source,
        normalize::timestamp(PROVIDER, NativeTime::Iso8601(created))?,
        normalize::commit_sha(pr.last_merge_source_commit.as_ref().map(|c| c.commit_id.as_str())),
        Some(PullRequestId::new(pr.pull_request_id)),
    ))
}

fn decode_resource<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(value).map_err(|e| WebhookError::malformed(PROVIDER, format!("resource: {e}")))
}

/// `<project>/<repository>`, or the bare repository name when the project is
/// not included.
fn repository_name(repository: &Repository) -> String {
    match &repository.project {
        Some(project) => format!("{}/{}", project.name, repository.name),
        None => repository.name.clone(),
    }
}

fn ref_kind(name: &str) -> &'static str {
    if GitRef::parse(name).is_tag() {
        "tag"
    } else {
        "branch"
    }
}
