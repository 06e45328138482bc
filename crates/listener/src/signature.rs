//! Webhook authentication.
//!
//! Platforms authenticate deliveries in one of three ways:
//!
//! | Scheme | Platforms | Check |
//! |--------|-----------|-------|
//! | HMAC-SHA256 over the raw body | GitHub, Bitbucket Server | `sha256=<hex>` header, constant-time compare |
//! | Shared token | GitLab (header), Bitbucket Cloud (query) | configured token, constant-time compare |
//! | None | Azure Repos | skipped |
//!
//! Whether the check runs is per-platform configuration data
//! ([`VerificationPolicy`]), not a single global switch.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use events::WebhookError;

use crate::{WebhookRequest, WebhookSecret};

type HmacSha256 = Hmac<Sha256>;

/// Where a platform puts its credential and how it is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// HMAC-SHA256 of the raw body, hex encoded, in a header. The value may
    /// carry `prefix` (e.g. `sha256=`), which is stripped before comparison.
    HmacSha256 {
        /// Header carrying the signature.
        header: &'static str,
        /// Algorithm prefix of the header value.
        prefix: &'static str,
    },
    /// The configured token itself, sent in a header.
    TokenHeader {
        /// Header carrying the token.
        header: &'static str,
    },
    /// The configured token itself, sent as a URL query parameter.
    TokenQuery {
        /// Query parameter carrying the token.
        param: &'static str,
    },
    /// The platform offers no verification mechanism.
    None,
}

impl Credential {
    /// Human-readable location of the credential, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Credential::HmacSha256 { header, .. } => format!("{header} header"),
            Credential::TokenHeader { header } => format!("{header} header"),
            Credential::TokenQuery { param } => format!("'{param}' query parameter"),
            Credential::None => "no credential".to_string(),
        }
    }

    fn supplied<'r>(&self, request: &'r WebhookRequest) -> Option<&'r str> {
        match self {
            Credential::HmacSha256 { header, .. } | Credential::TokenHeader { header } => {
                request.header(header)
            }
            Credential::TokenQuery { param } => request.query_param(param),
            Credential::None => None,
        }
    }
}

/// Whether a platform's credential must be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// Every delivery must carry a valid credential. With no secret configured
    /// nothing can be valid, so every delivery is rejected.
    Mandatory,
    /// Checked when a non-empty secret is configured; skipped otherwise.
    Optional,
    /// Never checked.
    Unsupported,
}

impl std::fmt::Display for VerificationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VerificationPolicy::Mandatory => "mandatory",
            VerificationPolicy::Optional => "optional",
            VerificationPolicy::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// A platform's credential scheme together with the policy applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authentication {
    /// Where the credential lives.
    pub credential: Credential,
    /// Whether it is checked.
    pub policy: VerificationPolicy,
}

impl Authentication {
    /// Authentication for a platform with no verification mechanism.
    pub const NONE: Authentication = Authentication {
        credential: Credential::None,
        policy: VerificationPolicy::Unsupported,
    };

    /// Returns the policy that actually applies: a platform without a
    /// credential is never verified whatever the configured policy says.
    pub fn effective_policy(&self) -> VerificationPolicy {
        match self.credential {
            Credential::None => VerificationPolicy::Unsupported,
            _ => self.policy,
        }
    }

    /// Checks `request` against `secret`.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::MissingSignature`] when verification applies and the
    ///   request carries no credential.
    /// - [`WebhookError::SignatureMismatch`] when the credential does not match,
    ///   or when the policy is mandatory and no secret is configured.
    pub fn verify(&self, secret: &WebhookSecret, request: &WebhookRequest) -> Result<(), WebhookError> {
        match self.effective_policy() {
            VerificationPolicy::Unsupported => return Ok(()),
            VerificationPolicy::Optional if secret.is_empty() => return Ok(()),
            VerificationPolicy::Optional | VerificationPolicy::Mandatory => {}
        }

        let Some(supplied) = self.credential.supplied(request) else {
            return Err(WebhookError::MissingSignature {
                credential: self.credential.describe(),
            });
        };

        // An empty key or token is computable by anyone.
        if secret.is_empty() {
            return Err(WebhookError::SignatureMismatch);
        }

        match self.credential {
            Credential::HmacSha256 { prefix, .. } => {
                verify_hmac_sha256(secret.expose(), request.body(), supplied, prefix)
            }
            Credential::TokenHeader { .. } | Credential::TokenQuery { .. } => {
                verify_token(secret.expose(), supplied)
            }
            Credential::None => Ok(()),
        }
    }
}

/// Verifies a hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
///
/// `prefix` is stripped from `supplied` when present. A value that is not valid
/// hex cannot match and is reported as a mismatch. The digest comparison is
/// constant-time.
pub fn verify_hmac_sha256(
    secret: &[u8],
    body: &[u8],
    supplied: &str,
    prefix: &str,
) -> Result<(), WebhookError> {
    let hex_sig = supplied.trim();
    let hex_sig = hex_sig.strip_prefix(prefix).unwrap_or(hex_sig);

    let Ok(expected) = hex::decode(hex_sig) else {
        return Err(WebhookError::SignatureMismatch);
    };

    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return Err(WebhookError::SignatureMismatch);
    };

    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::SignatureMismatch)
}

/// Compares a supplied token with the configured one in constant time.
pub fn verify_token(secret: &[u8], supplied: &str) -> Result<(), WebhookError> {
    if bool::from(secret.ct_eq(supplied.as_bytes())) {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Computes the hex-encoded HMAC-SHA256 of `body` keyed by `secret`, without
/// any algorithm prefix.
pub fn hmac_sha256_hex(secret: &[u8], body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
