/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Time-stamped facts ("terms") and point-in-time resolution over sequences of them.
//!
//! A term pairs a fact with the [`ReferenceTime`] from which it is effective. It stays in effect until
//! a later term of the same kind supersedes it. There are three kinds of term:
//! 1. [`CommitteeTerm`]: who may take part in consensus.
//! 2. [`ProtocolVersionTerm`]: which protocol rules apply.
//! 3. [`SubscriptionTerm`]: whether the virtual chain is active.
//!
//! ## Ordering
//!
//! A term sequence is logically ordered by non-decreasing `effective_from`. Nothing in this module
//! reorders entries: whoever builds a sequence is responsible for inserting terms in an order that
//! respects monotonicity. Two terms may share an `effective_from`; the later-inserted one wins.
//!
//! ## Resolution
//!
//! [`term_at`] returns the term in effect at a reference by scanning from the tail of the sequence
//! towards the head and stopping at the first term whose `effective_from <= reference`. If no such
//! term exists, the first term is returned regardless of its `effective_from`: index 0 is the
//! unconditional floor.

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{NodeIdentity, ProtocolVersion, ReferenceTime, Weight};

/// Implemented by every kind of term so that [`term_at`] can resolve any of them.
pub trait Term {
    /// Get the reference from which this term is effective.
    fn effective_from(&self) -> ReferenceTime;
}

/// Get the term in effect at `reference`.
///
/// # Panics
///
/// Panics if `terms` is empty. Every term sequence is seeded with at least one term on construction,
/// so an empty sequence is a programming error.
pub fn term_at<T: Term>(terms: &[T], reference: ReferenceTime) -> &T {
    assert!(
        !terms.is_empty(),
        "Programming error: tried to resolve a term in an empty term sequence."
    );

    let index = terms
        .iter()
        .rposition(|term| term.effective_from() <= reference)
        .unwrap_or(0);
    &terms[index]
}

/// Set of participants authorized to take part in consensus from `effective_from` onwards.
///
/// `weights` is positionally parallel to `members`: `weights[i]` is the weight of `members[i]`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitteeTerm {
    effective_from: ReferenceTime,
    members: Vec<NodeIdentity>,
    weights: Vec<Weight>,
}

impl CommitteeTerm {
    /// Create a new `CommitteeTerm` in which every member has [`Weight::DEFAULT`].
    pub fn new(effective_from: ReferenceTime, members: Vec<NodeIdentity>) -> Self {
        let weights = vec![Weight::DEFAULT; members.len()];
        Self {
            effective_from,
            members,
            weights,
        }
    }

    /// Create a new `CommitteeTerm` with explicit `weights`.
    ///
    /// # Panics
    ///
    /// Panics if `weights` and `members` have different lengths.
    pub fn with_weights(
        effective_from: ReferenceTime,
        members: Vec<NodeIdentity>,
        weights: Vec<Weight>,
    ) -> Self {
        assert_eq!(
            members.len(),
            weights.len(),
            "Programming error: committee members and weights must be parallel."
        );
        Self {
            effective_from,
            members,
            weights,
        }
    }

    /// Get the members of this committee, in canonical order.
    pub fn members(&self) -> &[NodeIdentity] {
        &self.members
    }

    /// Get the weights of the members of this committee.
    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }

    /// Check whether `identity` is a member of this committee.
    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.members.contains(identity)
    }
}

impl Term for CommitteeTerm {
    fn effective_from(&self) -> ReferenceTime {
        self.effective_from
    }
}

/// Protocol version in effect from `effective_from` onwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProtocolVersionTerm {
    pub effective_from: ReferenceTime,
    pub version: ProtocolVersion,
}

impl ProtocolVersionTerm {
    pub fn new(effective_from: ReferenceTime, version: ProtocolVersion) -> Self {
        Self {
            effective_from,
            version,
        }
    }
}

impl Term for ProtocolVersionTerm {
    fn effective_from(&self) -> ReferenceTime {
        self.effective_from
    }
}

/// Whether the virtual chain's subscription is active from `effective_from` onwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SubscriptionTerm {
    pub effective_from: ReferenceTime,
    pub is_active: bool,
}

impl SubscriptionTerm {
    pub fn new(effective_from: ReferenceTime, is_active: bool) -> Self {
        Self {
            effective_from,
            is_active,
        }
    }
}

impl Term for SubscriptionTerm {
    fn effective_from(&self) -> ReferenceTime {
        self.effective_from
    }
}
