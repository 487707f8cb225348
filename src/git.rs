//! Git-side building blocks: heads and revisions, clone link selection,
//! remote resolution and the commit fallback fetch.

mod error;
mod fallback;
mod head;
mod links;
mod remote;
mod repository;
mod url;

pub use error::{FetchError, LinkSet, ResolveError};
pub use fallback::FallbackFetcher;
pub use head::{
    BranchHead, CheckoutStrategy, CommitRevision, Head, HeadOrigin, PullRequestHead,
    PullRequestRevision, Revision, TagHead,
};
pub use links::{CloneLink, RepositoryProtocol, select_clone_link};
pub use remote::{
    AdditionalRemote, BranchWithHash, CheckoutExtension, CheckoutPlan, RemoteResolver,
    disambiguate,
};
pub use repository::Repository;
pub use url::{CloneUrl, cloud_repository_url, normalize_server_url};
