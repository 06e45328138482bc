//! Built-in platform adapters, one module per platform.
//!
//! Each module owns its platform's payload schema, classification table and
//! naming quirks. Nothing platform-specific leaks out of its module except the
//! adapter type itself.

pub mod azure_repos;
pub mod bitbucket_cloud;
pub mod bitbucket_server;
pub mod github;
pub mod gitlab;

pub use azure_repos::AzureReposAdapter;
pub use bitbucket_cloud::BitbucketCloudAdapter;
pub use bitbucket_server::BitbucketServerAdapter;
pub use github::GitHubAdapter;
pub use gitlab::GitLabAdapter;
