//! Provider dispatch.
//!
//! [`Dispatcher`] is the single entry point of the ingestion pipeline: given a
//! platform identifier, the configured secret and a request, it selects the
//! platform's parser and runs it. The registry is immutable once built, so one
//! dispatcher can be shared across tasks behind an `Arc` without locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use events::{CanonicalWebhookEvent, Provider, WebhookError};

use crate::config::ListenerConfig;
use crate::provider::WebhookParser;
use crate::providers::{
    AzureReposAdapter, BitbucketCloudAdapter, BitbucketServerAdapter, GitHubAdapter, GitLabAdapter,
};
use crate::signature::VerificationPolicy;
use crate::{WebhookRequest, WebhookSecret};

/// Registry of webhook parsers keyed by platform.
#[derive(Clone)]
pub struct Dispatcher {
    parsers: HashMap<Provider, Arc<dyn WebhookParser>>,
}

impl Dispatcher {
    /// A dispatcher with every built-in platform registered under its default
    /// verification policy.
    pub fn new() -> Self {
        Self::from_config(&ListenerConfig::default())
    }

    /// A dispatcher with no platforms registered.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// A dispatcher built from configuration: disabled platforms are left
    /// unregistered and policy overrides are applied to the rest.
    pub fn from_config(config: &ListenerConfig) -> Self {
        let mut dispatcher = Self::empty();
        for provider in Provider::ALL {
            let settings = config.settings(provider);
            if settings.enabled {
                dispatcher.register(builtin(provider, settings.verification));
            }
        }
        dispatcher
    }

    /// Registers `parser` under its own platform, replacing any previous one.
    pub fn register(&mut self, parser: Arc<dyn WebhookParser>) {
        self.parsers.insert(parser.provider(), parser);
    }

    /// The parser registered for `provider`, if any.
    pub fn parser(&self, provider: Provider) -> Option<&Arc<dyn WebhookParser>> {
        self.parsers.get(&provider)
    }

    /// Registered platforms in a stable order.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.parsers.keys().copied().collect();
        providers.sort();
        providers
    }

    /// Runs the full pipeline for one delivery.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::UnsupportedProvider`] if `provider` is not registered.
    /// - Any error of the selected parser.
    #[instrument(skip_all, fields(provider = %provider))]
    pub fn dispatch(
        &self,
        provider: Provider,
        secret: &WebhookSecret,
        request: &WebhookRequest,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        let parser = self
            .parsers
            .get(&provider)
            .ok_or_else(|| WebhookError::UnsupportedProvider {
                provider: provider.to_string(),
            })?;

        debug!(body_len = request.body().len(), "Dispatching webhook");
        let event = parser.parse(secret, request)?;
        debug!(event = %event.event, "Webhook normalized");
        Ok(event)
    }

    /// Like [`Dispatcher::dispatch`], with the platform given as a string
    /// identifier (`"github"`, `"bitbucket-server"`, ...).
    pub fn dispatch_named(
        &self,
        provider: &str,
        secret: &WebhookSecret,
        request: &WebhookRequest,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        let provider: Provider = provider.parse()?;
        self.dispatch(provider, secret, request)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("providers", &self.providers())
            .finish()
    }
}

fn builtin(provider: Provider, policy: Option<VerificationPolicy>) -> Arc<dyn WebhookParser> {
    let policy = policy.unwrap_or(VerificationPolicy::Optional);
    match provider {
        Provider::GitHub => Arc::new(GitHubAdapter::with_policy(policy)),
        Provider::GitLab => Arc::new(GitLabAdapter::with_policy(policy)),
        Provider::BitbucketServer => Arc::new(BitbucketServerAdapter::with_policy(policy)),
        Provider::BitbucketCloud => Arc::new(BitbucketCloudAdapter::with_policy(policy)),
        Provider::AzureRepos => Arc::new(AzureReposAdapter::new()),
    }
}

/// Parses one delivery with the default dispatcher.
///
/// `provider` is a platform identifier such as `"gitlab"`.
///
/// # Errors
///
/// See [`Dispatcher::dispatch_named`].
pub fn parse_incoming_webhook(
    provider: &str,
    secret: &WebhookSecret,
    request: &WebhookRequest,
) -> Result<CanonicalWebhookEvent, WebhookError> {
    Dispatcher::new().dispatch_named(provider, secret, request)
}
