//! Clone link selection.
//!
//! Providers advertise one clone link per transport, named after the
//! transport (`http`/`ssh` on self-hosted servers, `https`/`ssh` in the
//! cloud). A build picks exactly one of them for its configured protocol.

use serde::{Deserialize, Serialize};
use strum::VariantNames;

use super::error::{LinkSet, ResolveError};
use crate::provider::Authenticator;

/// Transport used to clone a repository.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum RepositoryProtocol {
    Ssh,
    #[default]
    Http,
}

impl TryFrom<String> for RepositoryProtocol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(|_| {
            format!(
                "unknown protocol `{value}`, expected one of: {}",
                Self::VARIANTS.join(", ")
            )
        })
    }
}

impl RepositoryProtocol {
    /// Link-name prefix this protocol matches.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Http => "http",
        }
    }

    /// Whether a clone link name belongs to this protocol.
    ///
    /// Prefix match, so `"https"` counts as HTTP.
    pub fn matches(self, link_name: &str) -> bool {
        link_name.starts_with(self.prefix())
    }
}

/// A provider-advertised clone URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloneLink {
    pub name: String,
    pub href: String,
}

impl CloneLink {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
        }
    }
}

/// Pick the clone link for `protocol` from `links` and return its href.
///
/// Takes the first matching link in list order. When an authenticator is
/// given, it may rewrite the link (for example to embed a token) before the
/// href is extracted.
pub fn select_clone_link(
    links: &[CloneLink],
    protocol: RepositoryProtocol,
    link_set: LinkSet,
    authenticator: Option<&dyn Authenticator>,
) -> Result<String, ResolveError> {
    let link = links
        .iter()
        .find(|link| protocol.matches(&link.name))
        .ok_or_else(|| ResolveError::NoMatchingLink {
            protocol,
            link_set,
            available: links.iter().map(|l| l.name.clone()).collect(),
        })?;

    let link = match authenticator {
        Some(auth) => auth.rewrite_link(link.clone()),
        None => link.clone(),
    };
    Ok(link.href)
}
