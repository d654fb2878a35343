/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Virtual-chain management for a byzantine-fault-tolerant node.
//!
//! This crate tracks, over time, who is allowed to participate in consensus (the committee), where
//! each participant can be reached (the topology), and which protocol rules apply (protocol-version
//! and subscription terms). Consensus correctness depends on every node resolving "the committee as of
//! reference R" to the same answer, and the [`ManagementService`](management::ManagementService) is
//! the single source of truth for that resolution.
//!
//! ## Components
//!
//! - [`types`]: the versioned-term data model, point-in-time resolution, and the
//!   [`ManagementSnapshot`](types::snapshot::ManagementSnapshot) aggregate.
//! - [`provider`]: the [`Provider`](provider::Provider) capability and its two implementations,
//!   [`DocumentProvider`](provider::document::DocumentProvider) (an externally authored JSON document
//!   fetched from a path or URL) and [`MemoryProvider`](provider::memory::MemoryProvider) (directly
//!   mutable, for tests and development tooling).
//! - [`management`]: the long-lived service that refreshes its snapshot from a provider on startup
//!   and on a timer, answers point-in-time queries under concurrent access, and pushes topology
//!   changes to a [`TopologyConsumer`](topology_consumer::TopologyConsumer).
//! - [`events`] and [`logging`]: observable events emitted by the service and the default loggers
//!   for them.
//!
//! ## Starting a service
//!
//! ```ignore
//! let configuration = Configuration::builder()
//!     .refresh_interval(Duration::from_secs(60))
//!     .log_events(true)
//!     .build();
//!
//! let management = ManagementSpec::builder()
//!     .provider(DocumentProvider::new(document_config)?)
//!     .topology_consumer(transport)
//!     .configuration(configuration)
//!     .build()
//!     .start();
//!
//! let committee = management.get_committee(reference);
//! ```

pub mod config;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub mod management;

pub mod provider;

pub mod topology_consumer;

pub mod types;
