use std::path::Path;

use anyhow::Context;
use headsync::config::SourceConfig;
use headsync::git::{
    BranchHead, Head, HeadOrigin, PullRequestHead, PullRequestRevision, RemoteResolver, Revision,
    TagHead,
};
use headsync::provider::ClientFactory;
use headsync::provider::server::ServerClientFactory;
use headsync::sync::Cancellation;

use crate::HeadArgs;

pub fn run(config: Option<&Path>, args: HeadArgs, cancel: &Cancellation) -> anyhow::Result<()> {
    let source = super::load_source(config)?;
    let resolver = resolver_for(&source, cancel)?;
    let (head, revision) = head_from_args(&source, args);

    let plan = resolver
        .resolve(&head, revision.as_ref())
        .with_context(|| format!("Cannot resolve {head}"))?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// Resolver loaded with the repository's current clone links.
fn resolver_for(source: &SourceConfig, cancel: &Cancellation) -> anyhow::Result<RemoteResolver> {
    let authenticator = source.authenticator()?;
    let client = ServerClientFactory::new(&source.server_url, authenticator.clone())
        .client(&source.owner, &source.repository);

    let repository = client
        .repository(cancel)
        .with_context(|| format!("Failed to look up {}/{}", source.owner, source.repository))?;
    let mut resolver = RemoteResolver::new(&source.owner, &source.repository, source.protocol)
        .remote_name(&source.remote_name)
        .primary_links(repository.links.clone);

    if let Some(mirror_id) = &source.mirror_id {
        let mirrored = client
            .mirrored_repository(mirror_id, cancel)
            .with_context(|| format!("Failed to look up mirror {mirror_id}"))?;
        resolver = resolver.mirror_links(mirrored.links.clone);
    }
    if source.is_cloud()
        && let Some(host) = source.server_host()
    {
        resolver = resolver.cloud(host);
    }
    if let Some(authenticator) = authenticator {
        resolver = resolver.authenticator(authenticator);
    }
    Ok(resolver)
}

fn head_from_args(source: &SourceConfig, args: HeadArgs) -> (Head, Option<Revision>) {
    match args {
        HeadArgs::Branch { name, hash } => {
            let head = Head::Branch(BranchHead::new(name));
            let revision = hash.map(|h| Revision::commit(head.clone(), h));
            (head, revision)
        }
        HeadArgs::Tag { name, hash } => {
            let head = Head::Tag(TagHead::new(name, 0));
            let revision = hash.map(|h| Revision::commit(head.clone(), h));
            (head, revision)
        }
        HeadArgs::Pr {
            id,
            branch,
            target,
            source_owner,
            source_repo,
            strategy,
            target_hash,
            pull_hash,
        } => {
            let source_owner = source_owner.unwrap_or_else(|| source.owner.clone());
            let source_repo = source_repo.unwrap_or_else(|| source.repository.clone());
            let origin = if source_owner.eq_ignore_ascii_case(&source.owner)
                && source_repo.eq_ignore_ascii_case(&source.repository)
            {
                HeadOrigin::Default
            } else {
                HeadOrigin::Fork
            };
            let strategy_count = source.pull_requests.strategies(origin).len();
            let head = PullRequestHead {
                name: PullRequestHead::head_name(&id, strategy, strategy_count),
                id,
                original_branch_name: branch.clone(),
                branch_name: branch,
                source_owner,
                source_repo,
                target: BranchHead::new(target),
                origin,
                checkout_strategy: strategy,
            };
            let revision = match (target_hash, pull_hash) {
                (Some(target_hash), Some(pull_hash)) => {
                    Some(Revision::PullRequest(PullRequestRevision {
                        head: head.clone(),
                        target_hash,
                        pull_hash,
                    }))
                }
                _ => None,
            };
            (Head::PullRequest(head), revision)
        }
    }
}
