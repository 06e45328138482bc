//! Error types for webhook ingestion.
//!
//! [`WebhookError`] covers every hard failure the ingestion pipeline can
//! produce. Each variant is a distinct, matchable kind; none is retried or
//! logged by the pipeline itself. The soft outcome of an unhandled platform
//! event type is *not* an error; see [`crate::WebhookEvent::Unrecognized`].

use thiserror::Error;

use crate::Provider;

/// A hard failure while ingesting one webhook delivery.
///
/// No partial event accompanies an error: a delivery either produces one
/// [`crate::CanonicalWebhookEvent`] or one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// The computed digest or configured token does not match the one supplied
    /// by the sender.
    ///
    /// The request must be treated as potentially forged and rejected.
    #[error("Payload signature mismatch")]
    SignatureMismatch,

    /// The platform requires a signature (or token) and the request carried
    /// none.
    #[error("Missing webhook signature: expected {credential}")]
    MissingSignature {
        /// Where the credential was expected (e.g. `"X-Hub-Signature-256 header"`).
        credential: String,
    },

    /// The platform identifier is not recognized, or that platform is not
    /// enabled.
    #[error("Unsupported webhook provider: {provider}")]
    UnsupportedProvider {
        /// The identifier as supplied by the caller.
        provider: String,
    },

    /// The body (or the mandatory event-type header) does not decode into the
    /// schema expected for the platform.
    #[error("Malformed {provider} webhook payload: {message}")]
    MalformedPayload {
        /// The platform whose schema was applied.
        provider: Provider,
        /// What failed to decode.
        message: String,
    },
}

impl WebhookError {
    /// Shorthand for [`WebhookError::MalformedPayload`].
    pub fn malformed(provider: Provider, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            provider,
            message: message.into(),
        }
    }

    /// Returns `true` for the authentication failures
    /// ([`WebhookError::SignatureMismatch`], [`WebhookError::MissingSignature`]).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::SignatureMismatch | Self::MissingSignature { .. }
        )
    }
}
