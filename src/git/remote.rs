//! Remote resolution: how to fetch the code for a head.
//!
//! Given a head (and optionally the revision being built) plus what the
//! provider advertises about the repository, [`RemoteResolver::resolve`]
//! computes the remote URL, refspecs, extra remotes and checkout extensions a
//! build needs. Resolution is pure: it performs no I/O and the same inputs
//! always produce the same plan.

use std::sync::Arc;

use serde::Serialize;

use super::error::{LinkSet, ResolveError};
use super::head::{CheckoutStrategy, Head, PullRequestHead, Revision};
use super::links::{CloneLink, RepositoryProtocol, select_clone_link};
use super::url::cloud_repository_url;
use crate::provider::Authenticator;

/// Alias for the primary repository when fetching missing commits from it.
const PRIMARY_ALIAS: &str = "primary";
/// Alias for the target repository of a cloud fork pull request.
const UPSTREAM_ALIAS: &str = "upstream";

/// A branch and the commit a build expects it to point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchWithHash {
    pub branch: String,
    pub hash: String,
}

impl BranchWithHash {
    pub fn new(branch: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            hash: hash.into(),
        }
    }
}

/// A remote fetched in addition to the main one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionalRemote {
    pub name: String,
    pub url: String,
    pub ref_specs: Vec<String>,
}

/// Extra checkout work attached to a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CheckoutExtension {
    /// After the main fetch, fetch any of `branches` whose commit is missing
    /// from `clone_link` under `remote_name`.
    FallbackFetch {
        clone_link: String,
        remote_name: String,
        branches: Vec<BranchWithHash>,
    },
    /// Merge `ref_name` (at `hash` when known) into the working tree.
    MergeWith {
        ref_name: String,
        hash: Option<String>,
    },
}

/// Everything a build needs to fetch and check out a head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutPlan {
    pub remote_name: String,
    pub remote_url: String,
    pub ref_specs: Vec<String>,
    pub additional_remotes: Vec<AdditionalRemote>,
    pub extensions: Vec<CheckoutExtension>,
    /// Branch name the working tree is checked out as.
    pub checkout_branch: String,
    pub checkout_hash: Option<String>,
}

/// Pick a remote alias that does not collide with any in `taken`.
///
/// Returns `requested` when free; otherwise doubles it with a dash
/// (`primary` → `primary-primary`) until it is.
pub fn disambiguate(requested: &str, taken: &[&str]) -> String {
    let mut candidate = requested.to_string();
    while taken.contains(&candidate.as_str()) {
        candidate = format!("{candidate}-{candidate}");
    }
    candidate
}

fn branch_ref_spec(branch: &str, remote: &str, local: &str) -> String {
    format!("+refs/heads/{branch}:refs/remotes/{remote}/{local}")
}

/// Computes checkout plans for one configured repository.
#[derive(Clone)]
pub struct RemoteResolver {
    owner: String,
    repository: String,
    remote_name: String,
    protocol: RepositoryProtocol,
    cloud_host: Option<String>,
    primary_links: Vec<CloneLink>,
    mirror_links: Vec<CloneLink>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl RemoteResolver {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        protocol: RepositoryProtocol,
    ) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            remote_name: "origin".to_string(),
            protocol,
            cloud_host: None,
            primary_links: Vec::new(),
            mirror_links: Vec::new(),
            authenticator: None,
        }
    }

    /// Alias of the main remote (default `origin`).
    pub fn remote_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name = name.into();
        self
    }

    /// Treat the repository as cloud-hosted on `host`, where fork URLs are
    /// synthesized rather than looked up.
    pub fn cloud(mut self, host: impl Into<String>) -> Self {
        self.cloud_host = Some(host.into());
        self
    }

    pub fn primary_links(mut self, links: Vec<CloneLink>) -> Self {
        self.primary_links = links;
        self
    }

    /// Clone links of the mirror. When non-empty, branches and tags are
    /// fetched from the mirror instead of the primary.
    pub fn mirror_links(mut self, links: Vec<CloneLink>) -> Self {
        self.mirror_links = links;
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    fn link(&self, link_set: LinkSet) -> Result<String, ResolveError> {
        let links = match link_set {
            LinkSet::Primary => &self.primary_links,
            LinkSet::Mirror => &self.mirror_links,
        };
        select_clone_link(links, self.protocol, link_set, self.authenticator.as_deref())
    }

    /// Mirror when one is configured, primary otherwise.
    fn preferred_link(&self) -> Result<String, ResolveError> {
        if self.mirror_links.is_empty() {
            self.link(LinkSet::Primary)
        } else {
            self.link(LinkSet::Mirror)
        }
    }

    /// Compute the checkout plan for `head`, optionally pinned to `revision`.
    pub fn resolve(
        &self,
        head: &Head,
        revision: Option<&Revision>,
    ) -> Result<CheckoutPlan, ResolveError> {
        let alias = self.remote_name.as_str();
        let checkout_hash = revision.map(|r| r.hash().to_string());

        match head {
            Head::Tag(tag) => Ok(CheckoutPlan {
                remote_name: alias.to_string(),
                remote_url: self.preferred_link()?,
                ref_specs: vec![format!("+refs/tags/{0}:refs/tags/{0}", tag.name)],
                additional_remotes: Vec::new(),
                extensions: Vec::new(),
                checkout_branch: tag.name.clone(),
                checkout_hash,
            }),
            Head::Branch(branch) => Ok(CheckoutPlan {
                remote_name: alias.to_string(),
                remote_url: self.preferred_link()?,
                ref_specs: vec![branch_ref_spec(&branch.name, alias, &branch.name)],
                additional_remotes: Vec::new(),
                extensions: Vec::new(),
                checkout_branch: branch.name.clone(),
                checkout_hash,
            }),
            Head::PullRequest(pr) => {
                let mut plan = self.resolve_pull_request(pr, revision)?;
                plan.checkout_hash = checkout_hash;
                Ok(plan)
            }
        }
    }

    fn resolve_pull_request(
        &self,
        pr: &PullRequestHead,
        revision: Option<&Revision>,
    ) -> Result<CheckoutPlan, ResolveError> {
        let alias = self.remote_name.as_str();
        let branch = pr.branch_name.as_str();
        let target = pr.target.name.as_str();
        let pr_revision = match revision {
            Some(Revision::PullRequest(r)) => Some(r),
            _ => None,
        };
        let from_source = pr.source_owner.eq_ignore_ascii_case(&self.owner)
            && pr.source_repo.eq_ignore_ascii_case(&self.repository);

        let mut ref_specs = Vec::new();
        let mut additional_remotes = Vec::new();
        let mut extensions = Vec::new();

        let remote_url = if from_source {
            ref_specs.push(branch_ref_spec(branch, alias, branch));
            if self.mirror_links.is_empty() {
                self.link(LinkSet::Primary)?
            } else {
                // The mirror may lag behind the primary; fetch what it lacks.
                if let Some(rev) = pr_revision {
                    let mut branches = vec![BranchWithHash::new(branch, &rev.pull_hash)];
                    if pr.checkout_strategy == CheckoutStrategy::Merge {
                        branches.push(BranchWithHash::new(target, &rev.target_hash));
                    }
                    extensions.push(CheckoutExtension::FallbackFetch {
                        clone_link: self.link(LinkSet::Primary)?,
                        remote_name: disambiguate(PRIMARY_ALIAS, &[alias]),
                        branches,
                    });
                }
                self.link(LinkSet::Mirror)?
            }
        } else if let Some(host) = &self.cloud_host {
            ref_specs.push(branch_ref_spec(branch, alias, &pr.name));
            cloud_repository_url(host, &pr.source_owner, &pr.source_repo, self.protocol)
        } else {
            ref_specs.push(format!(
                "+refs/pull-requests/{}/from:refs/remotes/{alias}/{}",
                pr.id, pr.name
            ));
            self.link(LinkSet::Primary)?
        };

        if pr.checkout_strategy == CheckoutStrategy::Merge {
            let hash = pr_revision.map(|r| r.target_hash.clone());
            if !from_source && self.cloud_host.is_some() {
                let upstream = disambiguate(UPSTREAM_ALIAS, &[alias]);
                additional_remotes.push(AdditionalRemote {
                    url: self.link(LinkSet::Primary)?,
                    ref_specs: vec![branch_ref_spec(target, &upstream, target)],
                    name: upstream.clone(),
                });
                extensions.push(CheckoutExtension::MergeWith {
                    ref_name: format!("remotes/{upstream}/{target}"),
                    hash,
                });
            } else {
                ref_specs.push(branch_ref_spec(target, alias, target));
                extensions.push(CheckoutExtension::MergeWith {
                    ref_name: format!("remotes/{alias}/{target}"),
                    hash,
                });
            }
        }

        Ok(CheckoutPlan {
            remote_name: alias.to_string(),
            remote_url,
            ref_specs,
            additional_remotes,
            extensions,
            checkout_branch: branch.to_string(),
            checkout_hash: None,
        })
    }
}
