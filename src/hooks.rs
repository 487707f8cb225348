//! Provider push notifications.
//!
//! A notification flows through three stages:
//!
//! 1. [`payload::translate`] parses it into a [`payload::ChangeNotification`].
//! 2. [`PushHookProcessor`] classifies the changes and schedules one
//!    [`HeadEvent`] per kind of change on an [`EventBus`], after a quiet delay.
//! 3. When the event fires, [`HeadEvent::heads`] turns it into head updates for
//!    a configured source, correlating branch pushes with open pull requests.

mod dispatch;
pub mod payload;
mod processor;
mod updates;

pub use dispatch::{DelayedDispatcher, Dispatched, EventBus, ReindexRequest};
pub use payload::{Change, ChangeKind, ChangeNotification, RefType, classify, translate};
pub use processor::PushHookProcessor;
pub use updates::{HeadEvent, HeadUpdateSet};

/// Notification types a provider can send.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
pub enum HookEventType {
    /// Branches or tags were pushed, created or deleted.
    #[strum(serialize = "repo:refs_changed")]
    RefsChanged,
    /// A mirror finished synchronizing a repository.
    #[strum(serialize = "mirror:repo_synchronized")]
    MirrorSynchronized,
    #[strum(serialize = "pr:opened")]
    PullRequestOpened,
    #[strum(serialize = "pr:merged")]
    PullRequestMerged,
    #[strum(serialize = "pr:declined")]
    PullRequestDeclined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The payload is not valid JSON for its event type.
    PayloadParse(String),
    /// The event type is not a push notification.
    UnsupportedEvent(HookEventType),
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookError::PayloadParse(msg) => write!(f, "cannot read hook payload: {msg}"),
            HookError::UnsupportedEvent(event) => {
                write!(f, "unsupported hook event {event}")
            }
        }
    }
}

impl std::error::Error for HookError {}
