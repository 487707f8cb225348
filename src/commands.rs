pub mod fallback;
pub mod hook;
pub mod resolve;

use std::path::Path;

use anyhow::Context;
use headsync::config::{SourceConfig, config_path};
use headsync::git::FetchError;
use headsync::provider::ProviderError;

/// Parse a `BRANCH=HASH` argument.
pub fn parse_branch_hash(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((branch, hash)) if !branch.is_empty() && !hash.is_empty() => {
            Ok((branch.to_string(), hash.to_string()))
        }
        _ => Err(format!("expected BRANCH=HASH, got `{arg}`")),
    }
}

pub fn load_source(explicit: Option<&Path>) -> anyhow::Result<SourceConfig> {
    let path = config_path(explicit).context("Cannot determine the config directory")?;
    SourceConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Whether `error` was caused by cancellation.
pub fn is_interrupted(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(cause.downcast_ref::<FetchError>(), Some(FetchError::Interrupted))
            || matches!(
                cause.downcast_ref::<ProviderError>(),
                Some(ProviderError::Interrupted)
            )
    })
}
