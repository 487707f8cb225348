use std::path::Path;

use anyhow::Context;
use headsync::git::{BranchWithHash, FallbackFetcher, Repository};
use headsync::sync::Cancellation;

pub fn run(
    repo: &Path,
    url: &str,
    remote: &str,
    branches: Vec<(String, String)>,
    cancel: &Cancellation,
) -> anyhow::Result<()> {
    let branches = branches
        .into_iter()
        .map(|(branch, hash)| BranchWithHash::new(branch, hash))
        .collect();
    let fetcher = FallbackFetcher::new(url, remote, branches);

    let fetched = fetcher
        .decorate(&Repository::at(repo), cancel)
        .with_context(|| format!("Fallback fetch into {} failed", repo.display()))?;
    for ref_spec in fetched {
        println!("{ref_spec}");
    }
    Ok(())
}
