//! Buildable heads and the revisions they resolve to.
//!
//! A [`Head`] names something a build can check out (a branch, a tag or a
//! pull request). A [`Revision`] pins a head to concrete commits; pull
//! requests carry two, the target branch tip and the source branch tip.

use serde::{Deserialize, Serialize};

/// A branch of the configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchHead {
    pub name: String,
}

impl BranchHead {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A tag, with its creation time in epoch millis (`0` when unknown).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagHead {
    pub name: String,
    pub timestamp: i64,
}

impl TagHead {
    pub fn new(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            timestamp,
        }
    }
}

/// Whether a pull request comes from the configured repository or a fork.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HeadOrigin {
    Default,
    Fork,
}

/// How a pull request is checked out.
///
/// `Head` builds the source branch as-is; `Merge` builds the source branch
/// merged into the target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CheckoutStrategy {
    Head,
    Merge,
}

/// A pull request, as a buildable head.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestHead {
    /// Buildable name (`PR-7`, or `PR-7-merge` when several strategies apply).
    pub name: String,
    pub id: String,
    /// Source branch name.
    pub branch_name: String,
    pub source_owner: String,
    pub source_repo: String,
    /// Source branch name as reported by the provider, before any renaming.
    pub original_branch_name: String,
    pub target: BranchHead,
    pub origin: HeadOrigin,
    pub checkout_strategy: CheckoutStrategy,
}

impl PullRequestHead {
    /// Buildable name for pull request `id` under `strategy`.
    ///
    /// The strategy suffix is only added when more than one strategy applies,
    /// so single-strategy setups keep stable `PR-<id>` names.
    pub fn head_name(id: &str, strategy: CheckoutStrategy, strategy_count: usize) -> String {
        if strategy_count > 1 {
            format!("PR-{id}-{strategy}")
        } else {
            format!("PR-{id}")
        }
    }
}

/// Something a build can check out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Head {
    Branch(BranchHead),
    Tag(TagHead),
    PullRequest(PullRequestHead),
}

impl Head {
    pub fn name(&self) -> &str {
        match self {
            Head::Branch(b) => &b.name,
            Head::Tag(t) => &t.name,
            Head::PullRequest(pr) => &pr.name,
        }
    }
}

impl std::fmt::Display for Head {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Head::Branch(b) => write!(f, "branch {}", b.name),
            Head::Tag(t) => write!(f, "tag {}", t.name),
            Head::PullRequest(pr) => write!(f, "pull request {} ({})", pr.id, pr.name),
        }
    }
}

/// A head pinned to one commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CommitRevision {
    #[serde(skip)]
    pub head: Head,
    pub hash: String,
}

/// A pull request pinned to its target and source commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PullRequestRevision {
    #[serde(skip)]
    pub head: PullRequestHead,
    pub target_hash: String,
    pub pull_hash: String,
}

impl PullRequestRevision {
    /// The target branch tip, bound to the pull request's target head.
    pub fn target(&self) -> CommitRevision {
        CommitRevision {
            head: Head::Branch(self.head.target.clone()),
            hash: self.target_hash.clone(),
        }
    }

    /// The source branch tip, bound to the pull request head.
    pub fn pull(&self) -> CommitRevision {
        CommitRevision {
            head: Head::PullRequest(self.head.clone()),
            hash: self.pull_hash.clone(),
        }
    }
}

/// A concrete revision of a head.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Revision {
    Commit(CommitRevision),
    PullRequest(PullRequestRevision),
}

impl Revision {
    pub fn commit(head: Head, hash: impl Into<String>) -> Self {
        Revision::Commit(CommitRevision {
            head,
            hash: hash.into(),
        })
    }

    pub fn head(&self) -> Head {
        match self {
            Revision::Commit(c) => c.head.clone(),
            Revision::PullRequest(pr) => Head::PullRequest(pr.head.clone()),
        }
    }

    /// The commit a build of this revision checks out. For pull requests this
    /// is the source commit.
    pub fn hash(&self) -> &str {
        match self {
            Revision::Commit(c) => &c.hash,
            Revision::PullRequest(pr) => &pr.pull_hash,
        }
    }
}
