//! The inbound request model and the shared secret.
//!
//! A [`WebhookRequest`] owns the body as one immutable [`Bytes`] buffer. The
//! verifier and the decoder both borrow that same buffer, so the bytes that are
//! authenticated are exactly the bytes that are parsed; nothing is
//! re-serialized in between.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use tokio::io::{AsyncRead, AsyncReadExt};

/// One webhook delivery: headers, URL query parameters, and the raw body.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Bytes,
}

impl WebhookRequest {
    /// Creates a request from already-materialized headers and body.
    pub fn new(headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            query: Vec::new(),
            body: body.into(),
        }
    }

    /// Converts an `http` request whose body has already been collected.
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts.headers, body).with_uri(&parts.uri)
    }

    /// Reads `body` to the end exactly once and builds a request from it.
    ///
    /// This is the only suspension point of the ingestion pipeline; everything
    /// after it is synchronous.
    pub async fn read_from<R>(headers: HeaderMap, uri: Option<&Uri>, mut body: R) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = Vec::new();
        body.read_to_end(&mut buffer).await?;

        let request = Self::new(headers, buffer);
        Ok(match uri {
            Some(uri) => request.with_uri(uri),
            None => request,
        })
    }

    /// Adds (or replaces) one header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Takes the query parameters from `uri`, percent-decoded.
    pub fn with_uri(self, uri: &Uri) -> Self {
        match uri.query() {
            Some(query) => self.with_query(query),
            None => self,
        }
    }

    /// Parses a raw `application/x-www-form-urlencoded` query string
    /// (without the leading `?`) and replaces the query parameters with it.
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        self
    }

    /// Appends one query parameter exactly as given, with no decoding.
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Returns the value of `name` if present and valid visible ASCII.
    ///
    /// Header names are matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the first value of the query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the raw body bytes exactly as received.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// The shared secret (HMAC key) or token configured for a webhook.
///
/// The value is excluded from `Debug` output. An empty secret means "not
/// configured"; see [`crate::VerificationPolicy`] for how that interacts with
/// verification.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// An unconfigured (empty) secret.
    pub fn none() -> Self {
        Self(String::new())
    }

    /// Returns `true` if no secret is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("WebhookSecret(<empty>)")
        } else {
            f.write_str("WebhookSecret(<REDACTED>)")
        }
    }
}

impl From<&str> for WebhookSecret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for WebhookSecret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
