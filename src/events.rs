/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of management service events for event handling and logging.
//!
//! Note: an event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::types::data_types::{ReferenceTime, SnapshotDigest};

pub enum Event {
    // Events that change the held snapshot.
    RefreshSnapshot(RefreshSnapshotEvent),
    RefreshFailure(RefreshFailureEvent),
    // Events that involve pushing to the topology consumer.
    UpdateTopology(UpdateTopologyEvent),
    // Background refresher lifecycle events.
    StartRefresher(StartRefresherEvent),
    StopRefresher(StopRefresherEvent),
}

impl Event {
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only hangs up during shutdown, when nobody is listening anyway.
            let _ = event_publisher.send(self);
        }
    }
}

/// A snapshot pulled from the provider was published as the service's current snapshot.
pub struct RefreshSnapshotEvent {
    pub timestamp: SystemTime,
    pub current_reference: ReferenceTime,
    pub committee_terms: usize,
    pub topology_size: usize,
    pub digest: SnapshotDigest,
    /// Whether `digest` differs from the digest of the previously held snapshot. Always `true` for
    /// the initial refresh.
    pub content_changed: bool,
}

/// A refresh failed, and the previously held snapshot (if any) was kept.
pub struct RefreshFailureEvent {
    pub timestamp: SystemTime,
    pub initial: bool,
    pub error: String,
}

pub struct UpdateTopologyEvent {
    pub timestamp: SystemTime,
    pub peers: usize,
}

pub struct StartRefresherEvent {
    pub timestamp: SystemTime,
    pub interval: Duration,
}

pub struct StopRefresherEvent {
    pub timestamp: SystemTime,
    pub interval: Duration,
}
