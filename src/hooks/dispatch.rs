//! Deferred delivery of head events.
//!
//! Bursts of pushes are coalesced by firing each batch only after a quiet
//! delay. [`DelayedDispatcher`] does this on a single worker thread fed by a
//! channel; due items are delivered to a handler in due-time order.

use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};

use super::updates::HeadEvent;

/// A request to rescan a whole repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexRequest {
    pub server_url: String,
    pub owner: String,
    pub repository: String,
}

/// Destination for translated notifications.
pub trait EventBus: Send + Sync {
    /// Deliver `event` once `delay` has elapsed.
    fn fire_later(&self, event: HeadEvent, delay: Duration);

    /// Ask for a full rescan of a repository whose changes could not be
    /// reported individually.
    fn request_reindex(&self, request: ReindexRequest);
}

/// What a [`DelayedDispatcher`] hands to its handler.
#[derive(Debug)]
pub enum Dispatched {
    Heads(HeadEvent),
    Reindex(ReindexRequest),
}

struct Scheduled {
    due: Instant,
    seq: u64,
    item: Dispatched,
}

/// [`EventBus`] that delivers items to a handler on a worker thread.
pub struct DelayedDispatcher {
    sender: Mutex<Option<Sender<(Instant, Dispatched)>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedDispatcher {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(Dispatched) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded::<(Instant, Dispatched)>();
        let worker = thread::Builder::new()
            .name("headsync-dispatch".into())
            .spawn(move || {
                let mut handler = handler;
                let mut pending: Vec<Scheduled> = Vec::new();
                let mut seq = 0u64;
                loop {
                    let received = match pending.iter().map(|s| s.due).min() {
                        Some(due) => rx.recv_deadline(due),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match received {
                        Ok((due, item)) => {
                            pending.push(Scheduled { due, seq, item });
                            seq += 1;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    fire_due(&mut pending, Instant::now(), &mut handler);
                }

                // Shut down: deliver what is left, each at its due time
                pending.sort_by_key(|s| (s.due, s.seq));
                for scheduled in pending {
                    let now = Instant::now();
                    if scheduled.due > now {
                        thread::sleep(scheduled.due - now);
                    }
                    handler(scheduled.item);
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to start dispatcher thread: {e}");
                None
            }
        };
        Self {
            sender: Mutex::new(worker.as_ref().map(|_| tx)),
            worker: Mutex::new(worker),
        }
    }

    fn schedule(&self, due: Instant, item: Dispatched) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) if tx.send((due, item)).is_ok() => {}
            _ => log::warn!("Dispatcher is shut down; dropping event"),
        }
    }

    /// Stop accepting events, deliver everything still pending at its due
    /// time, and wait for the worker to finish.
    pub fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker
            && handle.join().is_err()
        {
            log::error!("Dispatcher handler panicked");
        }
    }
}

/// Deliver every item due at or before `now`, earliest first.
fn fire_due<F: FnMut(Dispatched)>(pending: &mut Vec<Scheduled>, now: Instant, handler: &mut F) {
    if !pending.iter().any(|s| s.due <= now) {
        return;
    }
    let (mut due, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|s| s.due <= now);
    *pending = rest;
    due.sort_by_key(|s| (s.due, s.seq));
    for scheduled in due {
        handler(scheduled.item);
    }
}

impl EventBus for DelayedDispatcher {
    fn fire_later(&self, event: HeadEvent, delay: Duration) {
        log::debug!("Scheduling {} event in {:?}", event.kind(), delay);
        self.schedule(Instant::now() + delay, Dispatched::Heads(event));
    }

    fn request_reindex(&self, request: ReindexRequest) {
        log::info!(
            "Requesting reindex of {}/{}",
            request.owner,
            request.repository
        );
        self.schedule(Instant::now(), Dispatched::Reindex(request));
    }
}

impl Drop for DelayedDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
