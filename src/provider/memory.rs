/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`MemoryProvider`], a directly mutable in-memory source of snapshots.
//!
//! `MemoryProvider` is meant for tests and development tooling that need to drive a
//! [management service](crate::management) through deterministic membership changes without
//! authoring documents. It is cheaply [`Clone`]able: every clone shares the same state, so a test can
//! keep one clone to append terms to while the service polls another.
//!
//! ## Seeding
//!
//! [`MemoryProvider::new`] seeds exactly one term of each kind, all at reference 0:
//! 1. A committee term with the given members.
//! 2. A protocol-version term with [`ProtocolVersion::MAXIMAL_SUPPORTED`].
//! 3. An active subscription term.
//!
//! The current reference is the wall-clock time in seconds at construction, and the genesis reference
//! is [`DEFAULT_GENESIS_ONSET`] seconds before that.
//!
//! ## Appending
//!
//! Every `append_*` method rejects a reference that is strictly less than the `effective_from` of the
//! last term of the same kind, and leaves the state untouched when it does. An equal reference is
//! accepted: the appended term then shadows the previous one at that reference. A successful append
//! advances the current reference to the appended term's reference.

use std::{
    fmt::{self, Display, Formatter},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::types::{
    data_types::{NodeIdentity, ProtocolVersion, ReferenceTime},
    snapshot::{ManagementSnapshot, TermKind},
    terms::{CommitteeTerm, ProtocolVersionTerm, SubscriptionTerm, Term},
    topology::GossipPeer,
};

use super::{Provider, ProviderError};

/// How many seconds before construction time the genesis reference of a [`MemoryProvider`] lies.
pub const DEFAULT_GENESIS_ONSET: u64 = 1000;

/// A [`Provider`] whose snapshot is held in memory and mutated directly through `append_*` calls.
#[derive(Clone)]
pub struct MemoryProvider(Arc<RwLock<MemoryProviderState>>);

struct MemoryProviderState {
    current_reference: ReferenceTime,
    genesis_reference: ReferenceTime,
    topology: Vec<GossipPeer>,
    committees: Vec<CommitteeTerm>,
    protocol_versions: Vec<ProtocolVersionTerm>,
    subscriptions: Vec<SubscriptionTerm>,
}

impl MemoryProvider {
    /// Create a `MemoryProvider` seeded with `committee` and `topology`.
    ///
    /// `committee` is kept in the order given.
    pub fn new(committee: Vec<NodeIdentity>, topology: Vec<GossipPeer>) -> Self {
        let now = ReferenceTime::new(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|duration| duration.as_secs())
                .unwrap_or(0),
        );

        let state = MemoryProviderState {
            current_reference: now,
            genesis_reference: now - DEFAULT_GENESIS_ONSET,
            topology,
            committees: vec![CommitteeTerm::new(ReferenceTime::new(0), committee)],
            protocol_versions: vec![ProtocolVersionTerm::new(
                ReferenceTime::new(0),
                ProtocolVersion::MAXIMAL_SUPPORTED,
            )],
            subscriptions: vec![SubscriptionTerm::new(ReferenceTime::new(0), true)],
        };

        Self(Arc::new(RwLock::new(state)))
    }

    /// Append a committee term with `members`, effective from `reference`.
    pub fn append_committee(
        &self,
        reference: ReferenceTime,
        members: Vec<NodeIdentity>,
    ) -> Result<(), AppendTermError> {
        let mut state = self.write();
        check_monotonic(TermKind::Committee, &state.committees, reference)?;

        log::debug!(
            "Appending committee term: reference {}, {} members",
            reference,
            members.len()
        );
        state.committees.push(CommitteeTerm::new(reference, members));
        state.current_reference = reference;
        Ok(())
    }

    /// Append a subscription term, effective from `reference`.
    pub fn append_subscription(
        &self,
        reference: ReferenceTime,
        is_active: bool,
    ) -> Result<(), AppendTermError> {
        let mut state = self.write();
        check_monotonic(TermKind::Subscription, &state.subscriptions, reference)?;

        log::debug!(
            "Appending subscription term: reference {}, active {}",
            reference,
            is_active
        );
        state
            .subscriptions
            .push(SubscriptionTerm::new(reference, is_active));
        state.current_reference = reference;
        Ok(())
    }

    /// Append a protocol-version term, effective from `reference`.
    pub fn append_protocol_version(
        &self,
        reference: ReferenceTime,
        version: ProtocolVersion,
    ) -> Result<(), AppendTermError> {
        let mut state = self.write();
        check_monotonic(
            TermKind::ProtocolVersion,
            &state.protocol_versions,
            reference,
        )?;

        log::debug!(
            "Appending protocol version term: reference {}, version {}",
            reference,
            version
        );
        state
            .protocol_versions
            .push(ProtocolVersionTerm::new(reference, version));
        state.current_reference = reference;
        Ok(())
    }

    /// Replace the held topology with `topology`.
    pub fn replace_topology(&self, topology: Vec<GossipPeer>) {
        log::debug!("Replacing topology: {} peers", topology.len());
        self.write().topology = topology;
    }

    /// Get the number of committee terms held.
    pub fn committee_term_count(&self) -> usize {
        self.read().committees.len()
    }

    // Every mutation is a single push or assignment made after all checks, so a poisoned lock still
    // guards consistent state.
    fn read(&self) -> RwLockReadGuard<'_, MemoryProviderState> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryProviderState> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Provider for MemoryProvider {
    /// Get a copy of the held snapshot. `reference_time` is ignored.
    fn get(&self, _reference_time: ReferenceTime) -> Result<ManagementSnapshot, ProviderError> {
        let state = self.read();
        Ok(ManagementSnapshot::builder()
            .current_reference(state.current_reference)
            .genesis_reference(state.genesis_reference)
            .page_start(ReferenceTime::new(0))
            .page_end(state.current_reference)
            .topology(state.topology.clone())
            .committees(state.committees.clone())
            .protocol_versions(state.protocol_versions.clone())
            .subscriptions(state.subscriptions.clone())
            .build())
    }
}

fn check_monotonic<T: Term>(
    kind: TermKind,
    terms: &[T],
    reference: ReferenceTime,
) -> Result<(), AppendTermError> {
    match terms.last() {
        Some(last) if reference < last.effective_from() => {
            Err(AppendTermError::NonMonotonicReference {
                kind,
                last: last.effective_from(),
                attempted: reference,
            })
        }
        _ => Ok(()),
    }
}

/// Ways that an `append_*` call on a [`MemoryProvider`] can fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendTermError {
    /// `attempted` is strictly less than the `effective_from` of the last term of this kind.
    NonMonotonicReference {
        kind: TermKind,
        last: ReferenceTime,
        attempted: ReferenceTime,
    },
}

impl Display for AppendTermError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AppendTermError::NonMonotonicReference {
                kind,
                last,
                attempted,
            } => write!(
                f,
                "new {} term reference {} is lower than the last term reference {}",
                kind, attempted, last
            ),
        }
    }
}

impl std::error::Error for AppendTermError {}
