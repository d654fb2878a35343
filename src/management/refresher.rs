/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The background refresher thread.
//!
//! The refresher cycles through `Waiting(interval) -> Refreshing -> Waiting(interval)`. The shutdown
//! signal is only observed while waiting: a refresh that is in flight when the service is dropped runs
//! to completion, and the thread stops at the start of its next wait.
//!
//! Refresh failures are logged and swallowed. A refresh that panics, for example because the
//! [topology consumer](crate::topology_consumer::TopologyConsumer) panicked, aborts the process: the
//! consumer may have been left with a stale or partial membership view, and no later refresh can run.

use std::{
    panic::{self, AssertUnwindSafe},
    process,
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crate::{events::*, provider::Provider};

use super::ServiceState;

pub(super) fn start_refresher<P: Provider>(
    state: Arc<ServiceState<P>>,
    interval: Duration,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        Event::StartRefresher(StartRefresherEvent {
            timestamp: SystemTime::now(),
            interval,
        })
        .publish(&event_publisher);

        loop {
            match shutdown_signal.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                // Failures are logged and reported by the refresh itself.
                Err(RecvTimeoutError::Timeout) => {
                    if panic::catch_unwind(AssertUnwindSafe(|| state.refresh(false))).is_err() {
                        log::error!("Background management refresh panicked, aborting.");
                        log::logger().flush();
                        process::abort();
                    }
                }
            }
        }

        Event::StopRefresher(StopRefresherEvent {
            timestamp: SystemTime::now(),
            interval,
        })
        .publish(&event_publisher);
    })
}
