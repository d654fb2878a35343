/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ManagementSnapshot`] aggregate.
//!
//! A snapshot is one complete, internally consistent view of a virtual chain's topology and term
//! sequences. Providers construct a brand-new snapshot on every refresh, and the
//! [management service](crate::management) replaces the snapshot it holds wholesale. Snapshots are never
//! mutated after being handed to the service, so a reader holding an older snapshot keeps a consistent,
//! if stale, view.

use std::fmt::{self, Display, Formatter};

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use typed_builder::TypedBuilder;

use super::{
    data_types::{ReferenceTime, SnapshotDigest},
    terms::{term_at, CommitteeTerm, ProtocolVersionTerm, SubscriptionTerm, Term},
    topology::{topology_from_peers, GossipPeer, Topology},
};

/// Aggregate of the current topology and every term sequence of a virtual chain.
///
/// ## Page references
///
/// `page_start` and `page_end` delimit the range of references that the snapshot's source vouches
/// for. They are carried as-is for the benefit of callers; resolution does not consult them.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ManagementSnapshot]. On the builder call the following methods to construct a valid [ManagementSnapshot].

    Required:
    - `.committees(...)`
    - `.protocol_versions(...)`
    - `.subscriptions(...)`

    Optional:
    - `.current_reference(...)`
    - `.genesis_reference(...)`
    - `.page_start(...)`
    - `.page_end(...)`
    - `.topology(...)`
"))]
pub struct ManagementSnapshot {
    #[builder(default, setter(doc = "Set the current reference of the source. Optional, defaults to 0 (privately managed)."))]
    current_reference: ReferenceTime,
    #[builder(default, setter(doc = "Set the genesis reference of the virtual chain. Optional."))]
    genesis_reference: ReferenceTime,
    #[builder(default, setter(doc = "Set the first reference this snapshot vouches for. Optional."))]
    page_start: ReferenceTime,
    #[builder(default, setter(doc = "Set the last reference this snapshot vouches for. Optional."))]
    page_end: ReferenceTime,
    #[builder(default, setter(doc = "Set the reachable endpoints of known participants. Optional."))]
    topology: Vec<GossipPeer>,
    #[builder(setter(doc = "Set the committee term sequence. Required."))]
    committees: Vec<CommitteeTerm>,
    #[builder(setter(doc = "Set the protocol-version term sequence. Required."))]
    protocol_versions: Vec<ProtocolVersionTerm>,
    #[builder(setter(doc = "Set the subscription term sequence. Required."))]
    subscriptions: Vec<SubscriptionTerm>,
}

impl ManagementSnapshot {
    pub fn current_reference(&self) -> ReferenceTime {
        self.current_reference
    }

    pub fn genesis_reference(&self) -> ReferenceTime {
        self.genesis_reference
    }

    pub fn page_start(&self) -> ReferenceTime {
        self.page_start
    }

    pub fn page_end(&self) -> ReferenceTime {
        self.page_end
    }

    pub fn topology(&self) -> &[GossipPeer] {
        &self.topology
    }

    pub fn committees(&self) -> &[CommitteeTerm] {
        &self.committees
    }

    pub fn protocol_versions(&self) -> &[ProtocolVersionTerm] {
        &self.protocol_versions
    }

    pub fn subscriptions(&self) -> &[SubscriptionTerm] {
        &self.subscriptions
    }

    /// Get the topology as a map keyed by participant identity.
    pub fn topology_map(&self) -> Topology {
        topology_from_peers(&self.topology)
    }

    /// Get the committee term in effect at `reference`.
    pub fn committee_at(&self, reference: ReferenceTime) -> &CommitteeTerm {
        term_at(&self.committees, reference)
    }

    /// Get the protocol-version term in effect at `reference`.
    pub fn protocol_version_at(&self, reference: ReferenceTime) -> &ProtocolVersionTerm {
        term_at(&self.protocol_versions, reference)
    }

    /// Get the subscription term in effect at `reference`.
    pub fn subscription_at(&self, reference: ReferenceTime) -> &SubscriptionTerm {
        term_at(&self.subscriptions, reference)
    }

    /// Get the current reference of the virtual chain.
    ///
    /// A publicly managed source states its current reference explicitly. A privately managed source
    /// leaves it at 0, in which case the current reference is the latest `effective_from` among the
    /// committee, subscription, and protocol-version terms in effect at `system_time`.
    pub fn current_reference_at(&self, system_time: ReferenceTime) -> ReferenceTime {
        if self.current_reference != ReferenceTime::new(0) {
            return self.current_reference;
        }

        let committee_from = self.committee_at(system_time).effective_from();
        let subscription_from = self.subscription_at(system_time).effective_from;
        let protocol_version_from = self.protocol_version_at(system_time).effective_from;
        committee_from
            .max(subscription_from)
            .max(protocol_version_from)
    }

    /// Check that every term sequence holds at least one term.
    pub fn validate(&self) -> Result<(), EmptyTermSequenceError> {
        if self.committees.is_empty() {
            return Err(EmptyTermSequenceError(TermKind::Committee));
        }
        if self.protocol_versions.is_empty() {
            return Err(EmptyTermSequenceError(TermKind::ProtocolVersion));
        }
        if self.subscriptions.is_empty() {
            return Err(EmptyTermSequenceError(TermKind::Subscription));
        }
        Ok(())
    }

    /// Compute the SHA256 digest of the content of this snapshot.
    ///
    /// The digest covers the topology and the three term sequences, in order. It does not cover the
    /// current, genesis, and page references, so two snapshots derived from the same document at
    /// different times have the same digest as long as the membership facts are the same.
    pub fn content_digest(&self) -> SnapshotDigest {
        let mut hasher = Sha256::new();
        // Safety: serializing into a Vec cannot fail.
        hasher.update(&self.topology.try_to_vec().unwrap());
        hasher.update(&self.committees.try_to_vec().unwrap());
        hasher.update(&self.protocol_versions.try_to_vec().unwrap());
        hasher.update(&self.subscriptions.try_to_vec().unwrap());
        SnapshotDigest::new(hasher.finalize().into())
    }
}

/// The kinds of term sequence in a [`ManagementSnapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermKind {
    Committee,
    ProtocolVersion,
    Subscription,
}

impl Display for TermKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TermKind::Committee => write!(f, "committee"),
            TermKind::ProtocolVersion => write!(f, "protocol version"),
            TermKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// A [`ManagementSnapshot`] was found to have no terms of the given kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmptyTermSequenceError(pub TermKind);

impl Display for EmptyTermSequenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot has an empty {} term sequence", self.0)
    }
}

impl std::error::Error for EmptyTermSequenceError {}
