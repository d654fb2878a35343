/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The downstream capability that receives topology updates.

use crate::types::topology::Topology;

/// Implemented by the component that maintains connections to peers, typically a transport or
/// connection-pool layer.
///
/// After every successful refresh, the [management service](crate::management) calls
/// [`update_topology`](TopologyConsumer::update_topology) with the complete topology of the new
/// snapshot. The call happens synchronously on the refreshing thread, after the new snapshot has been
/// published, so an implementation should hand the update off quickly.
///
/// It is important for the consumer to know about topology updates because, for example, if a new
/// committee member comes online at a new endpoint, the consumer may want to establish a connection to
/// it before the member's first consensus round.
///
/// The management service provides no recovery path for a consumer that cannot apply an update. A
/// consumer that panics takes the refreshing thread down with it.
pub trait TopologyConsumer: Send + 'static {
    /// Inform the consumer of the complete, current topology.
    fn update_topology(&mut self, peers: Topology);
}
