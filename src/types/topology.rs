/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Network-reachable endpoints of known participants.

use std::collections::HashMap;

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::NodeIdentity;

/// The set of reachable endpoints keyed by the identity of the participant behind each endpoint.
///
/// This is what the management service pushes to its
/// [`TopologyConsumer`](crate::topology_consumer::TopologyConsumer) after every successful refresh.
pub type Topology = HashMap<NodeIdentity, GossipPeer>;

/// A participant's reachable network endpoint.
///
/// Fresh `GossipPeer`s are produced on every refresh. A committee member is not required to have one:
/// a member with no known endpoint is a valid, if inert, state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct GossipPeer {
    address: NodeIdentity,
    endpoint: String,
    port: u16,
}

impl GossipPeer {
    /// Create a new `GossipPeer` for `address`, reachable at `endpoint`:`port`.
    pub fn new(address: NodeIdentity, endpoint: impl Into<String>, port: u16) -> Self {
        Self {
            address,
            endpoint: endpoint.into(),
            port,
        }
    }

    /// Get the identity of the participant behind this endpoint.
    pub fn address(&self) -> NodeIdentity {
        self.address
    }

    /// Get the identity of the participant in printable (hex) form.
    pub fn hex_address(&self) -> String {
        self.address.to_hex()
    }

    /// Get the host name or IP address of this endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the port of this endpoint.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Collect `peers` into a [`Topology`]. If two peers share an address, the later one wins.
pub fn topology_from_peers<'a>(peers: impl IntoIterator<Item = &'a GossipPeer>) -> Topology {
    peers
        .into_iter()
        .map(|peer| (peer.address, peer.clone()))
        .collect()
}
