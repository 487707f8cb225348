//! Push notification payloads.
//!
//! Both payload shapes carry the same `changes` array:
//!
//! ```json
//! {
//!   "repository": {"slug": "service", "project": {"key": "PROJ"}},
//!   "changes": [{
//!     "ref": {"id": "refs/heads/main", "displayId": "main", "type": "BRANCH"},
//!     "refId": "refs/heads/main",
//!     "fromHash": "5d5c…",
//!     "toHash": "8f1a…",
//!     "type": "UPDATE"
//!   }]
//! }
//! ```
//!
//! Mirror synchronization payloads add `"mirrorServer": {"id": …, "name": …}`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{HookError, HookEventType};
use crate::provider::RepositoryInfo;

/// Kind of ref a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RefType {
    Branch,
    Tag,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedRef {
    #[serde(default)]
    pub id: String,
    pub display_id: String,
    /// Raw ref type (`BRANCH`, `TAG`, …).
    #[serde(rename = "type")]
    pub ref_type: String,
}

impl ChangedRef {
    pub fn kind(&self) -> RefType {
        match self.ref_type.as_str() {
            "BRANCH" => RefType::Branch,
            "TAG" => RefType::Tag,
            _ => RefType::Other,
        }
    }
}

/// One ref change from a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub ref_id: String,
    #[serde(rename = "ref")]
    pub changed_ref: ChangedRef,
    #[serde(default)]
    pub from_hash: String,
    #[serde(default)]
    pub to_hash: String,
    /// Raw change type (`ADD`, `UPDATE`, `DELETE`), classified by [`classify`].
    #[serde(rename = "type")]
    pub change_type: String,
}

/// How a ref changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

impl ChangeKind {
    /// Map a provider change type; unknown types yield `None`.
    pub fn from_change_type(change_type: &str) -> Option<Self> {
        match change_type {
            "ADD" => Some(ChangeKind::Created),
            "UPDATE" => Some(ChangeKind::Updated),
            "DELETE" => Some(ChangeKind::Removed),
            _ => None,
        }
    }
}

/// A parsed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub repository: RepositoryInfo,
    /// Set for mirror synchronization events.
    pub mirror_id: Option<String>,
    pub changes: Vec<Change>,
}

#[derive(Deserialize)]
struct RefsChangedPayload {
    repository: RepositoryInfo,
    #[serde(default)]
    changes: Option<Vec<Change>>,
}

#[derive(Deserialize)]
struct MirrorServerRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MirrorSynchronizedPayload {
    mirror_server: MirrorServerRef,
    repository: RepositoryInfo,
    #[serde(default)]
    changes: Option<Vec<Change>>,
}

/// Parse a notification payload of the given type.
pub fn translate(
    event_type: HookEventType,
    payload: &str,
) -> Result<ChangeNotification, HookError> {
    let parse_error = |e: serde_json::Error| HookError::PayloadParse(e.to_string());
    match event_type {
        HookEventType::RefsChanged => {
            let event: RefsChangedPayload = serde_json::from_str(payload).map_err(parse_error)?;
            Ok(ChangeNotification {
                repository: event.repository,
                mirror_id: None,
                changes: event.changes.unwrap_or_default(),
            })
        }
        HookEventType::MirrorSynchronized => {
            let event: MirrorSynchronizedPayload =
                serde_json::from_str(payload).map_err(parse_error)?;
            Ok(ChangeNotification {
                repository: event.repository,
                mirror_id: Some(event.mirror_server.id),
                changes: event.changes.unwrap_or_default(),
            })
        }
        HookEventType::PullRequestOpened
        | HookEventType::PullRequestMerged
        | HookEventType::PullRequestDeclined => Err(HookError::UnsupportedEvent(event_type)),
    }
}

/// Group changes by kind, in order of first appearance. Changes of unknown
/// type are logged and dropped.
pub fn classify(changes: Vec<Change>) -> IndexMap<ChangeKind, Vec<Change>> {
    let mut groups: IndexMap<ChangeKind, Vec<Change>> = IndexMap::new();
    for change in changes {
        match ChangeKind::from_change_type(&change.change_type) {
            Some(kind) => groups.entry(kind).or_default().push(change),
            None => log::info!(
                "Unknown change event type {} for {}; ignoring",
                change.change_type,
                change.ref_id
            ),
        }
    }
    groups
}
