/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the service's
//! [config](crate::config::Configuration).
//!
//! The management service logs using the [log](https://docs.rs/log/latest/log/) crate. To get these
//! messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [RefreshSnapshot](crate::events::RefreshSnapshotEvent) is printed:
//!
//! ```text
//! RefreshSnapshot, 1701329264, 1701329200, 3, 4, fNGCJyk, true
//! ```
//!
//! In the snippet:
//! - The third value is the current reference of the new snapshot.
//! - The fourth value is the number of committee terms it holds.
//! - The fifth value is the number of peers in its topology.
//! - The sixth value is the first seven characters of the Base64 encoding of its content digest.
//! - The seventh value is whether its content differs from the previous snapshot's.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const REFRESH_SNAPSHOT: &str = "RefreshSnapshot";
pub const REFRESH_FAILURE: &str = "RefreshFailure";
pub const UPDATE_TOPOLOGY: &str = "UpdateTopology";
pub const START_REFRESHER: &str = "StartRefresher";
pub const STOP_REFRESHER: &str = "StopRefresher";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for RefreshSnapshotEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |refresh_snapshot_event: &RefreshSnapshotEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                REFRESH_SNAPSHOT,
                secs_since_unix_epoch(refresh_snapshot_event.timestamp),
                refresh_snapshot_event.current_reference,
                refresh_snapshot_event.committee_terms,
                refresh_snapshot_event.topology_size,
                first_seven_base64_chars(&refresh_snapshot_event.digest.bytes()),
                refresh_snapshot_event.content_changed
            )
        };
        Box::new(logger)
    }
}

impl Logger for RefreshFailureEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |refresh_failure_event: &RefreshFailureEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                REFRESH_FAILURE,
                secs_since_unix_epoch(refresh_failure_event.timestamp),
                refresh_failure_event.initial,
                refresh_failure_event.error
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateTopologyEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_topology_event: &UpdateTopologyEvent| {
            log::info!(
                "{}, {}, {}",
                UPDATE_TOPOLOGY,
                secs_since_unix_epoch(update_topology_event.timestamp),
                update_topology_event.peers
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartRefresherEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_refresher_event: &StartRefresherEvent| {
            log::info!(
                "{}, {}, {}",
                START_REFRESHER,
                secs_since_unix_epoch(start_refresher_event.timestamp),
                start_refresher_event.interval.as_secs_f64()
            )
        };
        Box::new(logger)
    }
}

impl Logger for StopRefresherEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |stop_refresher_event: &StopRefresherEvent| {
            log::info!(
                "{}, {}, {}",
                STOP_REFRESHER,
                secs_since_unix_epoch(stop_refresher_event.timestamp),
                stop_refresher_event.interval.as_secs_f64()
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
