/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which dispatches [events](crate::events) to registered handlers.

use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// How long the event bus waits for an event before checking for shutdown again.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) struct EventHandlers {
    pub(crate) refresh_snapshot_handlers: Vec<HandlerPtr<RefreshSnapshotEvent>>,
    pub(crate) refresh_failure_handlers: Vec<HandlerPtr<RefreshFailureEvent>>,
    pub(crate) update_topology_handlers: Vec<HandlerPtr<UpdateTopologyEvent>>,
    pub(crate) start_refresher_handlers: Vec<HandlerPtr<StartRefresherEvent>>,
    pub(crate) stop_refresher_handlers: Vec<HandlerPtr<StopRefresherEvent>>,
}

impl EventHandlers {
    /// Collect the user-defined handlers and, if `log_events`, the default loggers of every event.
    pub(crate) fn new(
        log_events: bool,
        refresh_snapshot_handler: Option<HandlerPtr<RefreshSnapshotEvent>>,
        refresh_failure_handler: Option<HandlerPtr<RefreshFailureEvent>>,
        update_topology_handler: Option<HandlerPtr<UpdateTopologyEvent>>,
        start_refresher_handler: Option<HandlerPtr<StartRefresherEvent>>,
        stop_refresher_handler: Option<HandlerPtr<StopRefresherEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            refresh_snapshot_handlers: handlers(log_events, refresh_snapshot_handler),
            refresh_failure_handlers: handlers(log_events, refresh_failure_handler),
            update_topology_handlers: handlers(log_events, update_topology_handler),
            start_refresher_handlers: handlers(log_events, start_refresher_handler),
            stop_refresher_handlers: handlers(log_events, stop_refresher_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.refresh_snapshot_handlers.is_empty()
            && self.refresh_failure_handlers.is_empty()
            && self.update_topology_handlers.is_empty()
            && self.start_refresher_handlers.is_empty()
            && self.stop_refresher_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::RefreshSnapshot(refresh_snapshot_event) => self
                .refresh_snapshot_handlers
                .iter()
                .for_each(|handler| handler(&refresh_snapshot_event)),

            Event::RefreshFailure(refresh_failure_event) => self
                .refresh_failure_handlers
                .iter()
                .for_each(|handler| handler(&refresh_failure_event)),

            Event::UpdateTopology(update_topology_event) => self
                .update_topology_handlers
                .iter()
                .for_each(|handler| handler(&update_topology_event)),

            Event::StartRefresher(start_refresher_event) => self
                .start_refresher_handlers
                .iter()
                .for_each(|handler| handler(&start_refresher_event)),

            Event::StopRefresher(stop_refresher_event) => self
                .stop_refresher_handlers
                .iter()
                .for_each(|handler| handler(&stop_refresher_event)),
        }
    }
}

fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(user_handler) = user_handler {
        handlers.push(user_handler);
    }
    handlers
}

/// Start the event bus thread. On shutdown, events already published are dispatched before the thread
/// exits.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                event_subscriber
                    .try_iter()
                    .for_each(|event| event_handlers.fire_handlers(event));
                return;
            }
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // Every publisher is gone; wait for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => {
                let _ = shutdown_signal.recv();
                return;
            }
        }
    })
}
