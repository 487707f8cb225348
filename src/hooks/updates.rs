//! Turning a batch of ref changes into head updates.
//!
//! A [`HeadEvent`] holds one classified batch from one notification. For each
//! configured source it yields the heads that changed and their new revisions,
//! including the pull requests a branch push affects. Pull request lookups
//! are cached for the lifetime of the event, so several sources (or several
//! changes to the same ref) share one provider round trip per ref.

use std::ops::ControlFlow;
use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use serde::ser::SerializeStruct;

use super::payload::{Change, ChangeKind, RefType};
use crate::config::SourceConfig;
use crate::git::{
    BranchHead, CheckoutStrategy, Head, HeadOrigin, PullRequestHead, PullRequestRevision,
    Revision, TagHead, normalize_server_url,
};
use crate::provider::{ClientFactory, ProviderClient, ProviderError, PullRequest, RepositoryInfo};
use crate::sync::{Cancellation, OnceMap};

/// Heads changed by an event, each mapped to its new revision or to `None`
/// when the head was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadUpdateSet {
    updates: IndexMap<Head, Option<Revision>>,
    incomplete: bool,
}

impl HeadUpdateSet {
    pub fn insert(&mut self, head: Head, revision: Option<Revision>) {
        self.updates.insert(head, revision);
    }

    pub fn get(&self, head: &Head) -> Option<Option<&Revision>> {
        self.updates.get(head).map(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Head, Option<&Revision>)> {
        self.updates.iter().map(|(h, r)| (h, r.as_ref()))
    }

    pub fn heads(&self) -> impl Iterator<Item = &Head> {
        self.updates.keys()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Whether pull request correlation was interrupted, so pull request
    /// heads may be missing.
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }
}

#[derive(Serialize)]
struct UpdateEntry<'a> {
    head: &'a Head,
    revision: Option<&'a Revision>,
}

impl Serialize for HeadUpdateSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<UpdateEntry<'_>> = self
            .iter()
            .map(|(head, revision)| UpdateEntry { head, revision })
            .collect();
        let mut state = serializer.serialize_struct("HeadUpdateSet", 2)?;
        state.serialize_field("updates", &entries)?;
        state.serialize_field("incomplete", &self.incomplete)?;
        state.end()
    }
}

/// Pull requests touching one ref, by id.
type PullRequestsByRef = Arc<IndexMap<u64, PullRequest>>;

/// A cached lookup; `None` when it was interrupted. Interrupted lookups are
/// not cached.
type Lookup = Option<PullRequestsByRef>;

/// Pull request cache key: the changed ref and the credentials used to look
/// it up, since visibility depends on who asks.
type CacheKey = (String, Option<String>);

/// One classified batch of changes from one notification.
pub struct HeadEvent {
    server_url: String,
    kind: ChangeKind,
    changes: Vec<Change>,
    origin: String,
    repository: RepositoryInfo,
    mirror_id: Option<String>,
    pull_requests: OnceMap<CacheKey, PullRequestsByRef>,
}

impl std::fmt::Debug for HeadEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadEvent")
            .field("server_url", &self.server_url)
            .field("kind", &self.kind)
            .field("changes", &self.changes.len())
            .field("origin", &self.origin)
            .field(
                "repository",
                &format_args!(
                    "{}/{}",
                    self.repository.owner(),
                    self.repository.repository_name()
                ),
            )
            .field("mirror_id", &self.mirror_id)
            .finish()
    }
}

impl HeadEvent {
    pub fn new(
        server_url: impl Into<String>,
        kind: ChangeKind,
        changes: Vec<Change>,
        origin: impl Into<String>,
        repository: RepositoryInfo,
        mirror_id: Option<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            kind,
            changes,
            origin: origin.into(),
            repository,
            mirror_id,
            pull_requests: OnceMap::new(),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Where the notification came from (e.g. the peer address).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn repository(&self) -> &RepositoryInfo {
        &self.repository
    }

    pub fn mirror_id(&self) -> Option<&str> {
        self.mirror_id.as_deref()
    }

    /// Whether this event is about `source`'s repository as seen through
    /// `source`'s mirror (or both without a mirror).
    pub fn matches(&self, source: &SourceConfig) -> bool {
        normalize_server_url(&self.server_url) == normalize_server_url(&source.server_url)
            && self.repository.is(&source.owner, &source.repository)
            && self.mirror_id == source.mirror_id
    }

    /// Head updates this event implies for `source`.
    ///
    /// Returns an empty set when the event is not about `source`. If pull
    /// request lookups are interrupted the heads gathered so far are returned
    /// and the set is flagged incomplete.
    pub fn heads(
        &self,
        source: &SourceConfig,
        clients: &dyn ClientFactory,
        cancel: &Cancellation,
    ) -> HeadUpdateSet {
        let mut result = HeadUpdateSet::default();
        if !self.matches(source) {
            return result;
        }

        self.add_branches_and_tags(&mut result);
        if self
            .add_pull_requests(source, clients, cancel, &mut result)
            .is_break()
        {
            log::info!(
                "Interrupted while fetching pull requests for {}/{}, results may be incomplete",
                self.repository.owner(),
                self.repository.repository_name()
            );
            result.mark_incomplete();
        }
        result
    }

    /// Every open pull request touched by this event's changes, for `source`.
    pub fn pull_requests(
        &self,
        source: &SourceConfig,
        clients: &dyn ClientFactory,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        let client = self.client(clients);
        let lookups: Vec<Lookup> = self
            .changes
            .par_iter()
            .map(|change| self.lookup(source, client.as_ref(), change, cancel))
            .collect();

        let mut pull_requests = Vec::new();
        for lookup in lookups {
            let found = lookup.ok_or(ProviderError::Interrupted)?;
            pull_requests.extend(found.values().cloned());
        }
        Ok(pull_requests)
    }

    fn client(&self, clients: &dyn ClientFactory) -> Arc<dyn ProviderClient> {
        clients.client(self.repository.owner(), self.repository.repository_name())
    }

    fn add_branches_and_tags(&self, result: &mut HeadUpdateSet) {
        for change in &self.changes {
            let name = &change.changed_ref.display_id;
            let head = match change.changed_ref.kind() {
                RefType::Branch => Head::Branch(BranchHead::new(name)),
                RefType::Tag => Head::Tag(TagHead::new(name, 0)),
                RefType::Other => {
                    log::info!(
                        "Received event for unknown ref type {} of ref {}",
                        change.changed_ref.ref_type,
                        name
                    );
                    continue;
                }
            };
            let revision = match self.kind {
                ChangeKind::Removed => None,
                ChangeKind::Created | ChangeKind::Updated => {
                    Some(Revision::commit(head.clone(), &change.to_hash))
                }
            };
            result.insert(head, revision);
        }
    }

    fn add_pull_requests(
        &self,
        source: &SourceConfig,
        clients: &dyn ClientFactory,
        cancel: &Cancellation,
        result: &mut HeadUpdateSet,
    ) -> ControlFlow<()> {
        // Creations and deletions are handled as plain branch events
        if self.kind != ChangeKind::Updated || !source.pull_requests.discover {
            return ControlFlow::Continue(());
        }

        let origin = if self.repository.is(&source.owner, &source.repository) {
            HeadOrigin::Default
        } else {
            HeadOrigin::Fork
        };
        let strategies = source.pull_requests.strategies(origin);

        let branch_changes: Vec<&Change> = self
            .changes
            .iter()
            .filter(|c| c.changed_ref.kind() == RefType::Branch)
            .collect();
        if branch_changes.is_empty() {
            return ControlFlow::Continue(());
        }

        let client = self.client(clients);
        let lookups: Vec<(&Change, Lookup)> = branch_changes
            .into_par_iter()
            .map(|change| (change, self.lookup(source, client.as_ref(), change, cancel)))
            .collect();

        let mut interrupted = false;
        for (change, lookup) in lookups {
            let Some(pull_requests) = lookup else {
                interrupted = true;
                continue;
            };
            for pull_request in pull_requests.values() {
                // Only pull requests targeting this source
                if !pull_request
                    .to_ref
                    .repository
                    .is(&source.owner, &source.repository)
                {
                    continue;
                }
                for &strategy in &strategies {
                    // Head builds only change when the PR's own branch moves
                    if strategy != CheckoutStrategy::Merge
                        && change.ref_id != pull_request.from_ref.id
                    {
                        continue;
                    }
                    let (head, revision) =
                        pull_request_update(pull_request, origin, strategy, strategies.len());
                    result.insert(Head::PullRequest(head), Some(revision));
                }
            }
        }

        if interrupted {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Cached pull request lookup for `change`.
    fn lookup(
        &self,
        source: &SourceConfig,
        client: &dyn ProviderClient,
        change: &Change,
        cancel: &Cancellation,
    ) -> Lookup {
        let key = (change.ref_id.clone(), source.credentials_id.clone());
        self.pull_requests
            .try_get_or_init(key, || load_pull_requests(client, &change.ref_id, cancel))
    }
}

fn pull_request_update(
    pull_request: &PullRequest,
    origin: HeadOrigin,
    strategy: CheckoutStrategy,
    strategy_count: usize,
) -> (PullRequestHead, Revision) {
    let id = pull_request.id.to_string();
    let source = &pull_request.from_ref;
    let head = PullRequestHead {
        name: PullRequestHead::head_name(&id, strategy, strategy_count),
        id,
        branch_name: source.display_id.clone(),
        source_owner: source.repository.owner().to_string(),
        source_repo: source.repository.repository_name().to_string(),
        original_branch_name: source.display_id.clone(),
        target: BranchHead::new(&pull_request.to_ref.display_id),
        origin,
        checkout_strategy: strategy,
    };
    let revision = Revision::PullRequest(PullRequestRevision {
        head: head.clone(),
        target_hash: pull_request.to_ref.latest_commit.clone(),
        pull_hash: source.latest_commit.clone(),
    });
    (head, revision)
}

#[derive(Clone, Copy, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum Direction {
    Outgoing,
    Incoming,
}

/// Outgoing then incoming open pull requests for `ref_id`, merged by id.
///
/// A missing repository ends the lookup with no results. Other failures only
/// lose the direction they happened in.
fn load_pull_requests(client: &dyn ProviderClient, ref_id: &str, cancel: &Cancellation) -> Lookup {
    let mut pull_requests = IndexMap::new();
    for direction in [Direction::Outgoing, Direction::Incoming] {
        if cancel.is_cancelled() {
            return None;
        }
        let found = match direction {
            Direction::Outgoing => client.outgoing_open_pull_requests(ref_id, cancel),
            Direction::Incoming => client.incoming_open_pull_requests(ref_id, cancel),
        };
        if let ControlFlow::Break(lookup) = merge_direction(direction, found, &mut pull_requests) {
            return lookup;
        }
    }
    Some(Arc::new(pull_requests))
}

fn merge_direction(
    direction: Direction,
    found: Result<Vec<PullRequest>, ProviderError>,
    pull_requests: &mut IndexMap<u64, PullRequest>,
) -> ControlFlow<Lookup> {
    match found {
        Ok(list) => {
            for pull_request in list {
                pull_requests.insert(pull_request.id, pull_request);
            }
            ControlFlow::Continue(())
        }
        Err(ProviderError::NotFound(what)) => {
            log::info!("No such repository on the provider: {what}");
            ControlFlow::Break(Some(Arc::new(IndexMap::new())))
        }
        Err(ProviderError::Interrupted) => ControlFlow::Break(None),
        Err(e) => {
            log::warn!("Failed to retrieve {direction} pull requests: {e}");
            ControlFlow::Continue(())
        }
    }
}
