//! Event domain for forgehook.
//!
//! This crate defines the canonical description of a source-control webhook
//! delivery, the identifiers it is built from, and the error taxonomy of the
//! ingestion pipeline. The `listener` crate produces these values; downstream
//! automation consumes them.
//!
//! ## Architectural Layer
//!
//! **Domain types only.** This crate has no I/O dependencies and knows nothing
//! about HTTP, signatures, or any platform's JSON schema.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RepositoryName`, `BranchName`, etc.) |
//! | [`types`] | `CanonicalWebhookEvent`, `WebhookEvent`, `Provider`, `UnixTimestamp` |
//! | [`errors`] | `WebhookError` |

pub mod errors;
pub mod identifiers;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::WebhookError;
pub use identifiers::{BranchName, CommitSha, PullRequestId, RepositoryName};
pub use types::{CanonicalWebhookEvent, Provider, RefLocation, UnixTimestamp, WebhookEvent};
