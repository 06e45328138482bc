//! Listener configuration.
//!
//! Per-provider settings loaded from a JSON file:
//!
//! ```json
//! {
//!   "providers": {
//!     "github": { "verification": "mandatory" },
//!     "bitbucket-cloud": { "enabled": false }
//!   }
//! }
//! ```
//!
//! Providers that are not listed keep their defaults (enabled, default
//! policy). Secrets are never part of this file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use events::Provider;

use crate::signature::VerificationPolicy;

/// Errors raised while loading or validating a [`ListenerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON of the expected shape.
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A verification policy was requested that the platform cannot honour.
    #[error("Provider {provider} has no verification mechanism; policy '{policy}' cannot apply")]
    InvalidPolicy {
        provider: Provider,
        policy: VerificationPolicy,
    },
}

/// Settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// Whether deliveries for this provider are accepted at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the provider's default verification policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationPolicy>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            verification: None,
        }
    }
}

/// Top-level listener configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Per-provider settings, keyed by provider identifier.
    #[serde(default)]
    pub providers: BTreeMap<Provider, ProviderSettings>,
}

impl ListenerConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ListenerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Rejects a `mandatory` or `optional` policy for Azure Repos, which
    /// cannot authenticate deliveries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (provider, settings) in &self.providers {
            match (provider, settings.verification) {
                (Provider::AzureRepos, Some(policy)) if policy != VerificationPolicy::Unsupported => {
                    return Err(ConfigError::InvalidPolicy {
                        provider: *provider,
                        policy,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Settings for `provider`, or the defaults when it is not listed.
    pub fn settings(&self, provider: Provider) -> ProviderSettings {
        self.providers.get(&provider).cloned().unwrap_or_default()
    }
}
