//! Fetch commits a mirror does not have yet.
//!
//! A mirror can lag behind its primary. When a build is pinned to commits that
//! the mirror fetch did not bring in, [`FallbackFetcher`] fetches exactly the
//! missing branches from the primary, in one batched fetch.

use super::error::FetchError;
use super::remote::{BranchWithHash, CheckoutExtension};
use super::repository::Repository;
use crate::sync::Cancellation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackFetcher {
    clone_link: String,
    remote_name: String,
    branches: Vec<BranchWithHash>,
}

impl FallbackFetcher {
    pub fn new(
        clone_link: impl Into<String>,
        remote_name: impl Into<String>,
        branches: Vec<BranchWithHash>,
    ) -> Self {
        Self {
            clone_link: clone_link.into(),
            remote_name: remote_name.into(),
            branches,
        }
    }

    /// Build a fetcher from a plan's fallback extension, if that is what it is.
    pub fn from_extension(extension: &CheckoutExtension) -> Option<Self> {
        match extension {
            CheckoutExtension::FallbackFetch {
                clone_link,
                remote_name,
                branches,
            } => Some(Self::new(clone_link, remote_name, branches.clone())),
            CheckoutExtension::MergeWith { .. } => None,
        }
    }

    /// Fetch every branch whose expected commit is missing from `repo`.
    ///
    /// Returns the refspecs that were fetched; empty when every commit was
    /// already present and no fetch ran.
    pub fn decorate(
        &self,
        repo: &Repository,
        cancel: &Cancellation,
    ) -> Result<Vec<String>, FetchError> {
        let mut ref_specs = Vec::new();
        for BranchWithHash { branch, hash } in &self.branches {
            if cancel.is_cancelled() {
                return Err(FetchError::Interrupted);
            }
            if repo.commit_exists(hash, cancel)? {
                continue;
            }
            log::debug!(
                "Commit {} for {} missing locally, fetching from {}",
                hash,
                branch,
                self.remote_name
            );
            ref_specs.push(format!(
                "+refs/heads/{branch}:refs/remotes/{}/{branch}",
                self.remote_name
            ));
        }

        if ref_specs.is_empty() {
            return Ok(ref_specs);
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Interrupted);
        }
        repo.fetch(&self.clone_link, &ref_specs, cancel)?;
        log::info!(
            "Fetched {} missing branch(es) from {}",
            ref_specs.len(),
            self.remote_name
        );
        Ok(ref_specs)
    }
}
