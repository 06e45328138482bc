//! The per-platform adapter abstraction.
//!
//! Every platform implements [`ProviderAdapter`]: one concrete type exposing
//! the four pipeline stages (verify, decode, classify, normalize) with its own
//! payload type. The payload type is an associated type, so a platform's raw
//! structure never leaves its adapter; the [`crate::Dispatcher`] only sees the
//! object-safe [`WebhookParser`], which every adapter gets through a blanket
//! implementation.

use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;

use events::{CanonicalWebhookEvent, Provider, WebhookError, WebhookEvent};

use crate::classifier::{classify, EventRule, EventSignal};
use crate::signature::Authentication;
use crate::{WebhookRequest, WebhookSecret};

/// One source-control platform's view of a webhook delivery.
pub trait ProviderAdapter: Send + Sync {
    /// The platform-specific decoded body.
    type Payload;

    /// The platform this adapter handles.
    fn provider(&self) -> Provider;

    /// The credential scheme and the policy currently applied to it.
    fn authentication(&self) -> Authentication;

    /// Classification table for this platform.
    fn event_table(&self) -> &'static [EventRule];

    /// Strictly decodes the raw body (and event-type header, when the
    /// platform uses one).
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MalformedPayload`] on any decode failure.
    fn decode(&self, request: &WebhookRequest) -> Result<Self::Payload, WebhookError>;

    /// Extracts the event-type signal from a decoded payload.
    fn signal(&self, payload: &Self::Payload) -> EventSignal;

    /// Converts a classified payload into the canonical event.
    ///
    /// Never called for [`WebhookEvent::Unrecognized`].
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MalformedPayload`] when a field required for
    /// `event` is missing or unparseable.
    fn normalize(
        &self,
        event: WebhookEvent,
        payload: Self::Payload,
    ) -> Result<CanonicalWebhookEvent, WebhookError>;

    /// Checks the request's credential against `secret`.
    fn verify(&self, secret: &WebhookSecret, request: &WebhookRequest) -> Result<(), WebhookError> {
        self.authentication().verify(secret, request)
    }

    /// Looks the payload's signal up in [`ProviderAdapter::event_table`].
    fn classify(&self, payload: &Self::Payload) -> WebhookEvent {
        classify(self.event_table(), &self.signal(payload))
    }
}

/// A platform-erased webhook parser, as held by the dispatcher.
pub trait WebhookParser: Send + Sync {
    /// The platform this parser handles.
    fn provider(&self) -> Provider;

    /// The credential scheme and policy applied by this parser.
    fn authentication(&self) -> Authentication;

    /// Runs Verify → Decode → Classify → Normalize on one request.
    ///
    /// # Errors
    ///
    /// Any stage failure short-circuits the remaining stages; see
    /// [`WebhookError`] for the variants.
    fn parse(
        &self,
        secret: &WebhookSecret,
        request: &WebhookRequest,
    ) -> Result<CanonicalWebhookEvent, WebhookError>;
}

impl<A: ProviderAdapter> WebhookParser for A {
    fn provider(&self) -> Provider {
        ProviderAdapter::provider(self)
    }

    fn authentication(&self) -> Authentication {
        ProviderAdapter::authentication(self)
    }

    fn parse(
        &self,
        secret: &WebhookSecret,
        request: &WebhookRequest,
    ) -> Result<CanonicalWebhookEvent, WebhookError> {
        self.verify(secret, request)?;

        let payload = self.decode(request)?;
        let event = ProviderAdapter::classify(self, &payload);
        if event == WebhookEvent::Unrecognized {
            debug!(signal = %self.signal(&payload), "Unrecognized webhook event type");
            return Ok(CanonicalWebhookEvent::unrecognized());
        }

        debug!(%event, "Classified webhook event");
        self.normalize(event, payload)
    }
}

// ---------------------------------------------------------------------------
// Decode helpers shared by the adapters
// ---------------------------------------------------------------------------

/// Deserializes `body` into `T`, mapping failures to
/// [`WebhookError::MalformedPayload`]. Unknown fields are ignored.
pub(crate) fn decode_json<T: DeserializeOwned>(provider: Provider, body: &[u8]) -> Result<T, WebhookError> {
    serde_json::from_slice(body).map_err(|e| WebhookError::malformed(provider, e.to_string()))
}

/// Checks that `body` is well-formed JSON without decoding it into any schema.
pub(crate) fn ensure_json(provider: Provider, body: &[u8]) -> Result<(), WebhookError> {
    decode_json::<IgnoredAny>(provider, body).map(|_| ())
}

/// Returns a required event-type header.
pub(crate) fn required_header<'r>(
    provider: Provider,
    request: &'r WebhookRequest,
    name: &str,
) -> Result<&'r str, WebhookError> {
    request
        .header(name)
        .ok_or_else(|| WebhookError::malformed(provider, format!("missing {name} header")))
}
