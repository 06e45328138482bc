//! forgehook webhook ingestion.
//!
//! Turns one raw webhook delivery (headers, query parameters, body bytes)
//! from a source-control platform into a single
//! [`events::CanonicalWebhookEvent`], or a typed [`events::WebhookError`].
//!
//! ```text
//! Receive ─▶ Verify ─▶ Decode ─▶ Classify ─▶ Normalize ─▶ CanonicalWebhookEvent
//! ```
//!
//! Any stage failure short-circuits. An event type nobody handles is not a
//! failure: it classifies as [`events::WebhookEvent::Unrecognized`].
//!
//! ## Supported Platforms
//!
//! | Identifier | Adapter | Event signal | Credential |
//! |------------|---------|--------------|------------|
//! | `github` | [`GitHubAdapter`] | `X-GitHub-Event` | HMAC-SHA256, `X-Hub-Signature-256` |
//! | `gitlab` | [`GitLabAdapter`] | `X-Gitlab-Event` | token, `X-Gitlab-Token` |
//! | `bitbucket-server` | [`BitbucketServerAdapter`] | `X-Event-Key` | HMAC-SHA256, `X-Hub-Signature` |
//! | `bitbucket-cloud` | [`BitbucketCloudAdapter`] | `X-Event-Key` | token, `?token=` |
//! | `azure-repos` | [`AzureReposAdapter`] | `eventType` field | none |
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`request`] | `WebhookRequest`, `WebhookSecret` |
//! | [`signature`] | HMAC / token verification and `VerificationPolicy` |
//! | [`classifier`] | `EventSignal`, `EventRule`, table lookup |
//! | [`normalize`] | Timestamp, ref and repository normalization |
//! | [`provider`] | `ProviderAdapter` and the object-safe `WebhookParser` |
//! | [`providers`] | One adapter per platform |
//! | [`dispatcher`] | `Dispatcher`, `parse_incoming_webhook` |
//! | [`config`] | `ListenerConfig` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Everything platform-specific lives here. Consumers see
//! only the types of the `events` crate.

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod request;
pub mod signature;

pub use config::{ConfigError, ListenerConfig, ProviderSettings};
pub use dispatcher::{parse_incoming_webhook, Dispatcher};
pub use provider::{ProviderAdapter, WebhookParser};
pub use providers::{
    AzureReposAdapter, BitbucketCloudAdapter, BitbucketServerAdapter, GitHubAdapter, GitLabAdapter,
};
pub use request::{WebhookRequest, WebhookSecret};
pub use signature::{Authentication, Credential, VerificationPolicy};
