use std::sync::{Arc, Mutex};

use vchain_management::{topology_consumer::TopologyConsumer, types::topology::Topology};

/// A topology consumer that records every update it receives. Clones share the same record.
#[derive(Clone, Default)]
pub(crate) struct RecordingConsumer {
    updates: Arc<Mutex<Vec<Topology>>>,
}

impl RecordingConsumer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn updates(&self) -> Vec<Topology> {
        self.updates.lock().unwrap().clone()
    }

    pub(crate) fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

impl TopologyConsumer for RecordingConsumer {
    fn update_topology(&mut self, peers: Topology) {
        self.updates.lock().unwrap().push(peers);
    }
}
