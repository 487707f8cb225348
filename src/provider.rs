//! Git provider access.
//!
//! [`ProviderClient`] is the read-only view of one repository on the
//! provider that the rest of the crate consumes. [`server::ServerApiClient`]
//! implements it against the self-hosted REST API; tests substitute their
//! own implementations.

mod auth;
pub mod server;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use auth::{Authenticator, BearerAuthenticator, TokenAuthenticator};

use crate::git::CloneLink;
use crate::sync::Cancellation;

/// Failure talking to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The repository (or requested object) does not exist or is not visible.
    NotFound(String),
    /// Transport failure or an unexpected HTTP status.
    Io(String),
    /// The call was cancelled.
    Interrupted,
    /// Anything else, e.g. an undecodable response.
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::NotFound(what) => write!(f, "not found: {what}"),
            ProviderError::Io(msg) => write!(f, "provider request failed: {msg}"),
            ProviderError::Interrupted => write!(f, "provider request interrupted"),
            ProviderError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::Interrupted {
            ProviderError::Interrupted
        } else {
            ProviderError::Io(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryLinks {
    #[serde(default)]
    pub clone: Vec<CloneLink>,
}

/// A repository as the provider describes it.
///
/// The owner is the project key and the repository name is the slug.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    #[serde(default)]
    pub id: Option<u64>,
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    pub project: Project,
    #[serde(default)]
    pub links: RepositoryLinks,
}

impl RepositoryInfo {
    pub fn owner(&self) -> &str {
        &self.project.key
    }

    pub fn repository_name(&self) -> &str {
        &self.slug
    }

    /// Whether this is `owner/repository`, ignoring case.
    pub fn is(&self, owner: &str, repository: &str) -> bool {
        self.owner().eq_ignore_ascii_case(owner)
            && self.repository_name().eq_ignore_ascii_case(repository)
    }
}

/// A branch or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRef {
    /// Full ref name, e.g. `refs/heads/main`.
    pub id: String,
    pub display_id: String,
    pub latest_commit: String,
}

/// One side of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRef {
    pub id: String,
    pub display_id: String,
    pub latest_commit: String,
    pub repository: RepositoryInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub from_ref: PullRequestRef,
    pub to_ref: PullRequestRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorServer {
    pub id: String,
    pub name: String,
}

/// A repository as served by one mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredRepository {
    pub available: bool,
    #[serde(default)]
    pub links: RepositoryLinks,
}

/// Read access to one repository on the provider.
///
/// Every call takes the caller's [`Cancellation`] so in-flight requests are
/// aborted as soon as the caller gives up.
pub trait ProviderClient: Send + Sync {
    fn branches(&self, cancel: &Cancellation) -> Result<Vec<GitRef>, ProviderError>;

    fn tags(&self, cancel: &Cancellation) -> Result<Vec<GitRef>, ProviderError>;

    fn repository(&self, cancel: &Cancellation) -> Result<RepositoryInfo, ProviderError>;

    /// Open pull requests whose source is `ref_id`.
    fn outgoing_open_pull_requests(
        &self,
        ref_id: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, ProviderError>;

    /// Open pull requests whose target is `ref_id`.
    fn incoming_open_pull_requests(
        &self,
        ref_id: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, ProviderError>;

    fn pull_request(&self, id: &str, cancel: &Cancellation) -> Result<PullRequest, ProviderError>;

    /// Mirror servers known to the provider.
    fn mirrors(&self, cancel: &Cancellation) -> Result<Vec<MirrorServer>, ProviderError>;

    /// The repository as served by mirror `mirror_id`.
    ///
    /// A mirror that has not finished synchronizing is reported as an error.
    fn mirrored_repository(
        &self,
        mirror_id: &str,
        cancel: &Cancellation,
    ) -> Result<MirroredRepository, ProviderError>;
}

/// Hands out clients for arbitrary repositories on the same provider.
///
/// Push notifications can come from forks, and pull requests for a changed
/// ref are looked up on the repository that owns the ref.
pub trait ClientFactory: Send + Sync {
    fn client(&self, owner: &str, repository: &str) -> Arc<dyn ProviderClient>;
}

impl<F> ClientFactory for F
where
    F: Fn(&str, &str) -> Arc<dyn ProviderClient> + Send + Sync,
{
    fn client(&self, owner: &str, repository: &str) -> Arc<dyn ProviderClient> {
        self(owner, repository)
    }
}
