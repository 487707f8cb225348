//! Push notification handling.
//!
//! Ref changes are grouped by kind and handed to the [`EventBus`] as delayed
//! [`HeadEvent`]s; a push without changes asks for a reindex instead.

use std::sync::Arc;
use std::time::Duration;

use super::dispatch::{EventBus, ReindexRequest};
use super::payload::{classify, translate};
use super::updates::HeadEvent;
use super::{HookError, HookEventType};

/// Turns push notifications into scheduled head events.
pub struct PushHookProcessor {
    bus: Arc<dyn EventBus>,
    delay: Duration,
}

impl PushHookProcessor {
    pub fn new(bus: Arc<dyn EventBus>, delay: Duration) -> Self {
        Self { bus, delay }
    }

    /// Handle one notification from `server_url`.
    ///
    /// Malformed payloads are logged and dropped. Only routing a non-push
    /// event type here is an error.
    pub fn process(
        &self,
        event_type: HookEventType,
        payload: &str,
        origin: &str,
        server_url: Option<&str>,
    ) -> Result<(), HookError> {
        // Without a server URL the event cannot match any source
        let Some(server_url) = server_url else {
            log::debug!("Ignoring {event_type} hook from {origin} without a server URL");
            return Ok(());
        };

        let notification = match translate(event_type, payload) {
            Ok(notification) => notification,
            Err(e @ HookError::UnsupportedEvent(_)) => return Err(e),
            Err(e @ HookError::PayloadParse(_)) => {
                log::error!("Dropping {event_type} hook from {origin}: {e}");
                return Ok(());
            }
        };

        let repository = notification.repository;
        if notification.changes.is_empty() {
            log::info!(
                "Received hook from {origin} with no changes on {}/{}",
                repository.owner(),
                repository.repository_name()
            );
            self.bus.request_reindex(ReindexRequest {
                server_url: server_url.to_string(),
                owner: repository.owner().to_string(),
                repository: repository.repository_name().to_string(),
            });
            return Ok(());
        }

        for (kind, changes) in classify(notification.changes) {
            log::debug!(
                "Scheduling {} {kind} change(s) on {}/{}",
                changes.len(),
                repository.owner(),
                repository.repository_name()
            );
            let event = HeadEvent::new(
                server_url,
                kind,
                changes,
                origin,
                repository.clone(),
                notification.mirror_id.clone(),
            );
            self.bus.fire_later(event, self.delay);
        }
        Ok(())
    }
}
