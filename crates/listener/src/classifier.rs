//! Event classification.
//!
//! Each platform adapter reduces its event-type signal to an [`EventSignal`]
//! (a kind plus an optional qualifier such as the payload `action`) and owns a
//! static table of [`EventRule`]s. [`classify`] looks the signal up in that
//! table.
//!
//! Unknown signals classify as [`WebhookEvent::Unrecognized`]. This is not an
//! error: platforms add event types over time and callers simply ignore the
//! ones nobody handles.

use events::WebhookEvent;

/// The raw event-type signal of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignal {
    /// Primary signal, e.g. the `X-GitHub-Event` header or Azure's `eventType`.
    pub kind: String,
    /// Secondary discriminator, e.g. the payload `action` or the ref type.
    pub qualifier: Option<String>,
}

impl EventSignal {
    /// A signal with no qualifier.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            qualifier: None,
        }
    }

    /// A signal with a qualifier.
    pub fn qualified(kind: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            qualifier: Some(qualifier.into()),
        }
    }
}

impl std::fmt::Display for EventSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}/{}", self.kind, qualifier),
            None => f.write_str(&self.kind),
        }
    }
}

/// One row of a platform's classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRule {
    /// Signal kind to match, compared exactly.
    pub kind: &'static str,
    /// Qualifier to match. `None` matches any qualifier (or none).
    pub qualifier: Option<&'static str>,
    /// Resulting canonical kind.
    pub event: WebhookEvent,
}

impl EventRule {
    /// A rule matching `kind` with any qualifier.
    pub const fn any(kind: &'static str, event: WebhookEvent) -> Self {
        Self {
            kind,
            qualifier: None,
            event,
        }
    }

    /// A rule matching `kind` with exactly `qualifier`.
    pub const fn exact(kind: &'static str, qualifier: &'static str, event: WebhookEvent) -> Self {
        Self {
            kind,
            qualifier: Some(qualifier),
            event,
        }
    }
}

/// Maps `signal` to a canonical event kind using `table`.
///
/// A rule whose qualifier matches exactly wins over a rule for the same kind
/// without a qualifier.
pub fn classify(table: &[EventRule], signal: &EventSignal) -> WebhookEvent {
    let mut fallback = None;

    for rule in table.iter().filter(|rule| rule.kind == signal.kind) {
        match rule.qualifier {
            Some(qualifier) if signal.qualifier.as_deref() == Some(qualifier) => {
                return rule.event;
            }
            Some(_) => {}
            None => {
                fallback.get_or_insert(rule.event);
            }
        }
    }

    fallback.unwrap_or(WebhookEvent::Unrecognized)
}
