use rand::Rng;

use vchain_management::types::data_types::{NodeIdentity, NODE_IDENTITY_LEN};

/// An identity whose bytes are all `byte`. Handy for committees whose order must be predictable.
pub(crate) fn identity(byte: u8) -> NodeIdentity {
    NodeIdentity::new([byte; NODE_IDENTITY_LEN])
}

pub(crate) fn random_identities(n: usize) -> Vec<NodeIdentity> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| NodeIdentity::new(rng.gen::<[u8; NODE_IDENTITY_LEN]>()))
        .collect()
}

/// `identities` sorted in descending byte order, the order document-derived committees are kept in.
pub(crate) fn descending(identities: &[NodeIdentity]) -> Vec<NodeIdentity> {
    let mut sorted = identities.to_vec();
    sorted.sort_by(|a, b| b.cmp(a));
    sorted
}
