/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, start, and query a management service.
//!
//! The management service is the long-lived orchestrator that keeps one authoritative
//! [`ManagementSnapshot`] current and serves it to the rest of the node. The key components of this
//! module are:
//! - The builder-pattern interface to construct a [specification of the service](ManagementSpec) with:
//!   1. `ManagementSpec::builder` to construct a `ManagementSpecBuilder`,
//!   2. The setters of the `ManagementSpecBuilder`, and
//!   3. The `ManagementSpecBuilder::build` method to construct a [ManagementSpec],
//! - The functions to [start](ManagementSpec::start) or [try to start](ManagementSpec::try_start) a
//!   [ManagementService] given its specification,
//! - [The type](ManagementService) which answers point-in-time queries and keeps the background
//!   refresher alive.
//!
//! ## Starting a service
//!
//! ```ignore
//! let management =
//!     ManagementSpec::builder()
//!     .provider(provider)
//!     .topology_consumer(consumer)
//!     .configuration(configuration)
//!     .on_refresh_snapshot(refresh_handler)
//!     .build()
//!     .start();
//! ```
//!
//! ### Required setters
//!
//! - `.provider(...)`
//! - `.topology_consumer(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from [crate::events]:
//! - `.on_refresh_snapshot(...)`
//! - `.on_refresh_failure(...)`
//! - `.on_update_topology(...)`
//! - `.on_start_refresher(...)`
//! - `.on_stop_refresher(...)`
//!
//! ## Refreshing
//!
//! Starting a service performs one synchronous refresh before returning. A node cannot operate safely
//! without an initial membership view, so if this first refresh fails, [`start`](ManagementSpec::start)
//! panics and [`try_start`](ManagementSpec::try_start) returns the error.
//!
//! If the configured refresh interval is non-zero, a background thread then refreshes once per
//! interval until the service is dropped. Failures of these periodic refreshes are logged and
//! swallowed, and the service keeps serving its last successfully published snapshot. A periodic
//! refresh that panics aborts the process.
//!
//! A refresh:
//! 1. Pulls a complete snapshot from the [`Provider`] with no locks held on the read path.
//! 2. Rejects it if any of its term sequences is empty.
//! 3. Publishes it by swapping a single pointer.
//! 4. Pushes its topology to the [`TopologyConsumer`].
//!
//! Refreshes are serialized: an explicit [`refresh`](ManagementService::refresh) that races the
//! background refresher waits for the in-flight refresh to finish.
//!
//! ## Reading
//!
//! Every query takes a reference to the current snapshot once and answers from it, so a reader never
//! observes a mix of two snapshots. Queries never perform I/O and only block for as long as it takes
//! to clone a pointer.

use std::{
    any::Any,
    fmt::{self, Display, Formatter},
    panic,
    sync::{
        mpsc::{self, Sender},
        Arc, Mutex, MutexGuard, RwLock,
    },
    thread::{self, JoinHandle},
    time::SystemTime,
};

use typed_builder::TypedBuilder;

use crate::{
    config::Configuration,
    event_bus::*,
    events::*,
    provider::{Provider, ProviderError},
    topology_consumer::TopologyConsumer,
    types::{
        data_types::{ProtocolVersion, ReferenceTime, SnapshotDigest},
        snapshot::{EmptyTermSequenceError, ManagementSnapshot, TermKind},
        terms::CommitteeTerm,
        topology::Topology,
    },
};

mod refresher;

#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ManagementSpec]. On the builder call the following methods to construct a valid [ManagementSpec].

    Required:
    - `.provider(...)`
    - `.topology_consumer(...)`
    - `.configuration(...)`

    Optional:
    - `.on_refresh_snapshot(...)`
    - `.on_refresh_failure(...)`
    - `.on_update_topology(...)`
    - `.on_start_refresher(...)`
    - `.on_stop_refresher(...)`
"))]
pub struct ManagementSpec<P: Provider, C: TopologyConsumer> {
    // Required parameters
    #[builder(setter(doc = "Set the source of snapshots. Required."))]
    provider: P,
    #[builder(setter(doc = "Set the component that is told about topology changes. Required."))]
    topology_consumer: C,
    #[builder(setter(doc = "Set the [configuration](Configuration) of the service. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&RefreshSnapshotEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RefreshSnapshotEvent>),
    doc = "Register a handler closure to be invoked after a refreshed snapshot is published. Optional."))]
    on_refresh_snapshot: Option<HandlerPtr<RefreshSnapshotEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RefreshFailureEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RefreshFailureEvent>),
    doc = "Register a handler closure to be invoked after a refresh fails. Optional."))]
    on_refresh_failure: Option<HandlerPtr<RefreshFailureEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateTopologyEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateTopologyEvent>),
    doc = "Register a handler closure to be invoked after the topology consumer is updated. Optional."))]
    on_update_topology: Option<HandlerPtr<UpdateTopologyEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartRefresherEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartRefresherEvent>),
    doc = "Register a handler closure to be invoked after the background refresher starts. Optional."))]
    on_start_refresher: Option<HandlerPtr<StartRefresherEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StopRefresherEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StopRefresherEvent>),
    doc = "Register a handler closure to be invoked after the background refresher stops. Optional."))]
    on_stop_refresher: Option<HandlerPtr<StopRefresherEvent>>,
}

impl<P: Provider, C: TopologyConsumer> ManagementSpec<P, C> {
    /// Performs the initial refresh, starts all threads associated with running the service, and
    /// returns the handle to them in a [ManagementService].
    ///
    /// # Panics
    ///
    /// Panics if the initial refresh fails.
    pub fn start(self) -> ManagementService<P> {
        match self.try_start() {
            Ok(service) => service,
            Err(err) => panic!("Management service failed its initial refresh: {}", err),
        }
    }

    /// Like [`start`](Self::start), but returns the error of a failed initial refresh instead of
    /// panicking.
    pub fn try_start(self) -> Result<ManagementService<P>, ManagementError> {
        let configuration = self.configuration;

        let event_handlers = EventHandlers::new(
            configuration.log_events,
            self.on_refresh_snapshot,
            self.on_refresh_failure,
            self.on_update_topology,
            self.on_start_refresher,
            self.on_stop_refresher,
        );

        let (event_publisher, event_bus, event_bus_shutdown) = if !event_handlers.is_empty() {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus =
                start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
            (Some(event_publisher), Some(event_bus), Some(event_bus_shutdown))
        } else {
            (None, None, None)
        };

        let mut refresh_context = RefreshContext {
            topology_consumer: Box::new(self.topology_consumer),
            event_publisher: event_publisher.clone(),
            last_digest: None,
        };

        let snapshot = match refresh_context.pull(&self.provider, true) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // Let the event bus deliver the failure event before giving up.
                drop(refresh_context);
                drop(event_publisher);
                if let Some(payload) = stop_thread(event_bus, event_bus_shutdown.as_ref()) {
                    panic::resume_unwind(payload)
                }
                return Err(err);
            }
        };

        let topology = snapshot.topology_map();
        refresh_context.record_publish(&snapshot);
        let state = Arc::new(ServiceState {
            provider: self.provider,
            snapshot: RwLock::new(Arc::new(snapshot)),
            refresh_context: Mutex::new(refresh_context),
        });
        state.lock_refresh_context().push_topology(topology);

        let (refresher, refresher_shutdown) = if configuration.periodic_refresh_enabled() {
            let (refresher_shutdown, refresher_shutdown_receiver) = mpsc::channel();
            let refresher = refresher::start_refresher(
                Arc::clone(&state),
                configuration.refresh_interval,
                refresher_shutdown_receiver,
                event_publisher,
            );
            (Some(refresher), Some(refresher_shutdown))
        } else {
            (None, None)
        };

        Ok(ManagementService {
            state,
            refresher,
            refresher_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A handle to the snapshot and background threads of a management service. When this value is
/// dropped, all background threads are gracefully shut down.
///
/// `ManagementService` is [`Sync`]: any number of threads may query it concurrently, including while
/// a refresh is in flight.
pub struct ManagementService<P: Provider> {
    state: Arc<ServiceState<P>>,
    refresher: Option<JoinHandle<()>>,
    refresher_shutdown: Option<Sender<()>>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<P: Provider> ManagementService<P> {
    /// Get the current snapshot.
    ///
    /// The returned snapshot is immutable and stays valid after later refreshes replace it.
    pub fn snapshot(&self) -> Arc<ManagementSnapshot> {
        self.state.snapshot()
    }

    /// Get the current reference of the virtual chain.
    ///
    /// See [`ManagementSnapshot::current_reference_at`] for how this is derived for privately managed
    /// chains.
    pub fn get_current_reference(&self) -> ReferenceTime {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0);
        self.snapshot()
            .current_reference_at(ReferenceTime::new(now))
    }

    /// Get the genesis reference of the virtual chain.
    pub fn get_genesis_reference(&self) -> ReferenceTime {
        self.snapshot().genesis_reference()
    }

    /// Get the reachable endpoints of known participants, keyed by identity.
    pub fn get_topology(&self) -> Topology {
        self.snapshot().topology_map()
    }

    /// Get the committee in effect at `reference`.
    pub fn get_committee(&self, reference: ReferenceTime) -> CommitteeTerm {
        self.snapshot().committee_at(reference).clone()
    }

    /// Get the protocol version in effect at `reference`.
    pub fn get_protocol_version(&self, reference: ReferenceTime) -> ProtocolVersion {
        self.snapshot().protocol_version_at(reference).version
    }

    /// Check whether the virtual chain's subscription is active at `reference`.
    pub fn get_subscription_status(&self, reference: ReferenceTime) -> bool {
        self.snapshot().subscription_at(reference).is_active
    }

    /// Refresh the snapshot now, without waiting for the next background tick.
    ///
    /// On failure the previously held snapshot is kept and the error is returned.
    pub fn refresh(&self) -> Result<(), ManagementError> {
        self.state.refresh(false)
    }
}

impl<P: Provider> Drop for ManagementService<P> {
    fn drop(&mut self) {
        // The refresher publishes events, so it must stop before the event bus does. Both are joined
        // before either one's panic is resumed.
        let refresher_panic = stop_thread(self.refresher.take(), self.refresher_shutdown.as_ref());
        let event_bus_panic = stop_thread(self.event_bus.take(), self.event_bus_shutdown.as_ref());
        if let Some(payload) = refresher_panic.or(event_bus_panic) {
            if !thread::panicking() {
                panic::resume_unwind(payload)
            }
        }
    }
}

// Signal `thread` to shut down and wait for it. Returns the payload of a panic on `thread`.
fn stop_thread(
    thread: Option<JoinHandle<()>>,
    shutdown: Option<&Sender<()>>,
) -> Option<Box<dyn Any + Send>> {
    if let Some(shutdown) = shutdown {
        let _ = shutdown.send(());
    }
    thread.and_then(|thread| thread.join().err())
}

/// State shared between a [`ManagementService`] and its background refresher.
pub(crate) struct ServiceState<P: Provider> {
    provider: P,
    snapshot: RwLock<Arc<ManagementSnapshot>>,
    refresh_context: Mutex<RefreshContext>,
}

impl<P: Provider> ServiceState<P> {
    fn snapshot(&self) -> Arc<ManagementSnapshot> {
        // The write lock is only held for a pointer swap, which cannot panic.
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&snapshot)
    }

    pub(crate) fn refresh(&self, initial: bool) -> Result<(), ManagementError> {
        let mut refresh_context = self.lock_refresh_context();

        let snapshot = refresh_context.pull(&self.provider, initial)?;
        let topology = snapshot.topology_map();
        refresh_context.record_publish(&snapshot);

        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(snapshot);

        refresh_context.push_topology(topology);
        Ok(())
    }

    fn lock_refresh_context(&self) -> MutexGuard<'_, RefreshContext> {
        match self.refresh_context.lock() {
            Ok(refresh_context) => refresh_context,
            Err(_) => panic!("A previous management refresh panicked."),
        }
    }
}

/// Everything a refresh mutates besides the snapshot itself. Owned by a mutex so that refreshes are
/// serialized.
struct RefreshContext {
    topology_consumer: Box<dyn TopologyConsumer>,
    event_publisher: Option<Sender<Event>>,
    last_digest: Option<SnapshotDigest>,
}

impl RefreshContext {
    /// Pull a snapshot from `provider` and check that it can be published.
    fn pull<P: Provider>(
        &mut self,
        provider: &P,
        initial: bool,
    ) -> Result<ManagementSnapshot, ManagementError> {
        let result = provider
            .get(ReferenceTime::new(0))
            .map_err(ManagementError::from)
            .and_then(|snapshot| {
                snapshot.validate()?;
                Ok(snapshot)
            });

        if let Err(err) = &result {
            if initial {
                log::error!("Initial management refresh failed: {}", err);
            } else {
                log::warn!(
                    "Management refresh failed, keeping previous snapshot: {}",
                    err
                );
            }
            Event::RefreshFailure(RefreshFailureEvent {
                timestamp: SystemTime::now(),
                initial,
                error: err.to_string(),
            })
            .publish(&self.event_publisher);
        }

        result
    }

    fn record_publish(&mut self, snapshot: &ManagementSnapshot) {
        let digest = snapshot.content_digest();
        let content_changed = self.last_digest != Some(digest);
        self.last_digest = Some(digest);

        log::debug!(
            "Publishing management snapshot {} (current reference {}, changed {})",
            digest,
            snapshot.current_reference(),
            content_changed
        );

        Event::RefreshSnapshot(RefreshSnapshotEvent {
            timestamp: SystemTime::now(),
            current_reference: snapshot.current_reference(),
            committee_terms: snapshot.committees().len(),
            topology_size: snapshot.topology().len(),
            digest,
            content_changed,
        })
        .publish(&self.event_publisher);
    }

    fn push_topology(&mut self, topology: Topology) {
        let peers = topology.len();
        self.topology_consumer.update_topology(topology);

        Event::UpdateTopology(UpdateTopologyEvent {
            timestamp: SystemTime::now(),
            peers,
        })
        .publish(&self.event_publisher);
    }
}

/// Ways that a refresh of a [`ManagementService`] can fail.
#[derive(Debug)]
pub enum ManagementError {
    /// The provider could not produce a snapshot.
    Provider(ProviderError),

    /// The provider produced a snapshot with no terms of the given kind.
    EmptyTermSequence { kind: TermKind },
}

impl Display for ManagementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ManagementError::Provider(err) => write!(f, "{}", err),
            ManagementError::EmptyTermSequence { kind } => {
                write!(f, "provider returned an empty {} term sequence", kind)
            }
        }
    }
}

impl std::error::Error for ManagementError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ManagementError::Provider(err) => Some(err),
            ManagementError::EmptyTermSequence { .. } => None,
        }
    }
}

impl From<ProviderError> for ManagementError {
    fn from(value: ProviderError) -> Self {
        ManagementError::Provider(value)
    }
}

impl From<EmptyTermSequenceError> for ManagementError {
    fn from(value: EmptyTermSequenceError) -> Self {
        ManagementError::EmptyTermSequence { kind: value.0 }
    }
}
