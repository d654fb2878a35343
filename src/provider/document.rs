/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`DocumentProvider`], which derives snapshots from an externally authored JSON document.
//!
//! ## Document format
//!
//! ```text
//! {
//!   "CurrentRefTime": 1582616070,
//!   "PageStartRefTime": 1582613000,
//!   "PageEndRefTime": 1582616070,
//!   "VirtualChains": {
//!     "42": {
//!       "GenesisRefTime": 1582615603,
//!       "CurrentTopology": [ { "Address": "a328…4de7", "Ip": "192.168.199.2", "Port": 4400 } ],
//!       "CommitteeEvents": [
//!         { "RefTime": 1582613000,
//!           "Committee": [ { "OrbsAddress": "a328…4de7", "EthAddress": "…", "EffectiveStake": 1000, "IdentityType": 0 } ] }
//!       ],
//!       "SubscriptionEvents": [ { "RefTime": 0, "Data": { "Status": "active", "Tier": "B0", "RolloutGroup": "main", "IdentityType": 0 } } ],
//!       "ProtocolVersionEvents": [ { "RefTime": 0, "Data": { "RolloutGroup": "main", "Version": 1 } } ]
//!     }
//!   }
//! }
//! ```
//!
//! Fields this node has no use for (`EthAddress`, `EffectiveStake`, `IdentityType`, `Tier`,
//! `RolloutGroup`) are accepted and ignored. `GenesisRefTime`, `SubscriptionEvents`, and
//! `ProtocolVersionEvents` are optional.
//!
//! ## Derivation
//!
//! - Every topology entry becomes a [`GossipPeer`] keyed by its hex-decoded address. Entries with an
//!   empty `Ip` or a `Port` outside 1024–65535 are rejected.
//! - Every committee event becomes one [`CommitteeTerm`]. Its members are the hex-decoded
//!   `OrbsAddress`es of the listed participants, **sorted in descending byte order**, so that all nodes
//!   parsing the same document derive the same member order. Every member gets [`Weight::DEFAULT`].
//! - Committee terms keep the document's event order. Their `RefTime`s are **not** checked for
//!   monotonicity and are **not** re-sorted: the document's author is trusted to order them, and
//!   re-sorting would change which of two same-reference terms wins resolution.
//! - A missing or empty `ProtocolVersionEvents` yields one term at reference 0 with
//!   [`ProtocolVersion::MINIMAL`]. A missing or empty `SubscriptionEvents` yields one active term at
//!   reference 0.
//!
//! ## Page references
//!
//! When `CurrentRefTime` is non-zero, a current document must satisfy
//! `CurrentRefTime == PageEndRefTime >= PageStartRefTime`, and a historic page (requested with a non-zero
//! reference, and fetched from `<location>/<reference>`) must satisfy
//! `CurrentRefTime >= PageEndRefTime >= PageStartRefTime`.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use serde::Deserialize;

use crate::{
    config::DocumentProviderConfiguration,
    types::{
        data_types::{
            NodeIdentity, NodeIdentityDecodeError, ProtocolVersion, ReferenceTime, VirtualChainID,
        },
        snapshot::ManagementSnapshot,
        terms::{CommitteeTerm, ProtocolVersionTerm, SubscriptionTerm},
        topology::GossipPeer,
    },
};

use super::{
    retrieval::{Fetch, LocationFetcher, RetrievalError},
    Provider, ProviderError,
};

/// Lowest port a topology entry may listen on.
pub const MIN_TOPOLOGY_PORT: i64 = 1024;

/// Highest port a topology entry may listen on.
pub const MAX_TOPOLOGY_PORT: i64 = 65535;

/// A [`Provider`] that fetches and parses a management document on every call.
pub struct DocumentProvider<F: Fetch = LocationFetcher> {
    config: DocumentProviderConfiguration,
    fetcher: F,
}

impl DocumentProvider<LocationFetcher> {
    /// Create a `DocumentProvider` that reads local paths from the filesystem and fetches `http(s)`
    /// locations over HTTP.
    pub fn new(config: DocumentProviderConfiguration) -> Result<Self, RetrievalError> {
        let fetcher = LocationFetcher::new(config.max_document_size, config.http_timeout)?;
        Ok(Self { config, fetcher })
    }
}

impl<F: Fetch> DocumentProvider<F> {
    /// Create a `DocumentProvider` that retrieves documents through `fetcher`.
    pub fn with_fetcher(config: DocumentProviderConfiguration, fetcher: F) -> Self {
        Self { config, fetcher }
    }

    /// Get the location that the page covering `reference_time` is fetched from.
    pub fn location_for(&self, reference_time: ReferenceTime) -> String {
        if reference_time == ReferenceTime::new(0) {
            self.config.location.clone()
        } else {
            format!("{}/{}", self.config.location, reference_time)
        }
    }
}

impl<F: Fetch> Provider for DocumentProvider<F> {
    fn get(&self, reference_time: ReferenceTime) -> Result<ManagementSnapshot, ProviderError> {
        let location = self.location_for(reference_time);

        let contents = self.fetcher.fetch(&location).map_err(|err| {
            log::error!("Management document retrieval error, {}: {}", location, err);
            err
        })?;

        let is_historic = reference_time != ReferenceTime::new(0);
        let snapshot = parse_document(&contents, self.config.virtual_chain_id, is_historic)
            .map_err(|err| {
                log::error!("Management document parsing error, {}: {}", location, err);
                err
            })?;

        Ok(snapshot)
    }
}

/// Derive a [`ManagementSnapshot`] for `virtual_chain_id` from the raw bytes of a management document.
///
/// `is_historic` selects which page-reference rule applies (see the [module docs](self)).
pub fn parse_document(
    contents: &[u8],
    virtual_chain_id: VirtualChainID,
    is_historic: bool,
) -> Result<ManagementSnapshot, DocumentError> {
    let document: ManagementDocument =
        serde_json::from_slice(contents).map_err(DocumentError::Malformed)?;

    let virtual_chain = document
        .virtual_chains
        .get(&virtual_chain_id.to_string())
        .ok_or(DocumentError::VirtualChainNotFound { virtual_chain_id })?;

    check_page_references(&document, is_historic)?;

    let topology = parse_topology(&virtual_chain.current_topology)?;
    let committees = parse_committees(&virtual_chain.committee_events)?;
    let subscriptions = parse_subscriptions(&virtual_chain.subscription_events);
    let protocol_versions = parse_protocol_versions(&virtual_chain.protocol_version_events);

    Ok(ManagementSnapshot::builder()
        .current_reference(ReferenceTime::new(document.current_ref_time))
        .genesis_reference(ReferenceTime::new(virtual_chain.genesis_ref_time))
        .page_start(ReferenceTime::new(document.page_start_ref_time))
        .page_end(ReferenceTime::new(document.page_end_ref_time))
        .topology(topology)
        .committees(committees)
        .protocol_versions(protocol_versions)
        .subscriptions(subscriptions)
        .build())
}

fn check_page_references(
    document: &ManagementDocument,
    is_historic: bool,
) -> Result<(), DocumentError> {
    if document.current_ref_time == 0 {
        return Ok(());
    }

    let consistent = if is_historic {
        document.current_ref_time >= document.page_end_ref_time
            && document.page_end_ref_time >= document.page_start_ref_time
    } else {
        document.current_ref_time == document.page_end_ref_time
            && document.page_end_ref_time >= document.page_start_ref_time
    };

    if consistent {
        Ok(())
    } else {
        Err(DocumentError::InconsistentPageReferences {
            current: ReferenceTime::new(document.current_ref_time),
            page_start: ReferenceTime::new(document.page_start_ref_time),
            page_end: ReferenceTime::new(document.page_end_ref_time),
        })
    }
}

fn decode_address(address: &str) -> Result<NodeIdentity, DocumentError> {
    NodeIdentity::from_hex(address).map_err(|source| match source {
        NodeIdentityDecodeError::InvalidHex(source) => DocumentError::BadHexAddress {
            address: address.to_string(),
            source,
        },
        NodeIdentityDecodeError::InvalidLength(length) => DocumentError::BadAddressLength {
            address: address.to_string(),
            length,
        },
    })
}

fn parse_topology(nodes: &[TopologyNode]) -> Result<Vec<GossipPeer>, DocumentError> {
    nodes
        .iter()
        .map(|node| {
            let address = decode_address(&node.address)?;
            if node.ip.is_empty() {
                return Err(DocumentError::EmptyIp {
                    address: node.address.clone(),
                });
            }
            if node.port < MIN_TOPOLOGY_PORT || node.port > MAX_TOPOLOGY_PORT {
                return Err(DocumentError::PortOutOfRange {
                    address: node.address.clone(),
                    port: node.port,
                });
            }
            Ok(GossipPeer::new(address, node.ip.clone(), node.port as u16))
        })
        .collect()
}

fn parse_committees(events: &[CommitteeEvent]) -> Result<Vec<CommitteeTerm>, DocumentError> {
    if events.is_empty() {
        return Err(DocumentError::NoCommitteeEvents);
    }

    events
        .iter()
        .map(|event| {
            let mut members = event
                .committee
                .iter()
                .map(|member| decode_address(&member.orbs_address))
                .collect::<Result<Vec<NodeIdentity>, DocumentError>>()?;

            // Descending byte order.
            members.sort_by(|a, b| b.cmp(a));

            Ok(CommitteeTerm::new(ReferenceTime::new(event.ref_time), members))
        })
        .collect()
}

fn parse_subscriptions(events: &[SubscriptionEvent]) -> Vec<SubscriptionTerm> {
    if events.is_empty() {
        return vec![SubscriptionTerm::new(ReferenceTime::new(0), true)];
    }

    events
        .iter()
        .map(|event| {
            SubscriptionTerm::new(
                ReferenceTime::new(event.ref_time),
                event.data.status == ACTIVE_SUBSCRIPTION_STATUS,
            )
        })
        .collect()
}

fn parse_protocol_versions(events: &[ProtocolVersionEvent]) -> Vec<ProtocolVersionTerm> {
    if events.is_empty() {
        return vec![ProtocolVersionTerm::new(
            ReferenceTime::new(0),
            ProtocolVersion::MINIMAL,
        )];
    }

    events
        .iter()
        .map(|event| {
            ProtocolVersionTerm::new(
                ReferenceTime::new(event.ref_time),
                ProtocolVersion::new(event.data.version),
            )
        })
        .collect()
}

/// Value of a subscription event's `Status` that marks the virtual chain active.
const ACTIVE_SUBSCRIPTION_STATUS: &str = "active";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManagementDocument {
    #[serde(default)]
    current_ref_time: u64,
    #[serde(default)]
    page_start_ref_time: u64,
    #[serde(default)]
    page_end_ref_time: u64,
    virtual_chains: HashMap<String, VirtualChainEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VirtualChainEntry {
    #[serde(default)]
    genesis_ref_time: u64,
    #[serde(default)]
    current_topology: Vec<TopologyNode>,
    #[serde(default)]
    committee_events: Vec<CommitteeEvent>,
    #[serde(default)]
    subscription_events: Vec<SubscriptionEvent>,
    #[serde(default)]
    protocol_version_events: Vec<ProtocolVersionEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TopologyNode {
    #[serde(alias = "OrbsAddress")]
    address: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    port: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommitteeEvent {
    ref_time: u64,
    #[serde(default)]
    committee: Vec<CommitteeMember>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommitteeMember {
    orbs_address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubscriptionEvent {
    ref_time: u64,
    data: SubscriptionData,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubscriptionData {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProtocolVersionEvent {
    ref_time: u64,
    data: ProtocolVersionData,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProtocolVersionData {
    version: u32,
}

/// Ways that [`parse_document`] can reject a management document.
#[derive(Debug)]
pub enum DocumentError {
    /// The document is not JSON, or its top-level structure does not match the expected format.
    Malformed(serde_json::Error),

    /// The document has no entry for the configured virtual chain.
    VirtualChainNotFound { virtual_chain_id: VirtualChainID },

    /// A topology or committee address is not valid hex.
    BadHexAddress {
        address: String,
        source: hex::FromHexError,
    },

    /// A topology or committee address decoded into the wrong number of bytes.
    BadAddressLength { address: String, length: usize },

    /// A topology entry has an empty `Ip`.
    EmptyIp { address: String },

    /// A topology entry has a `Port` outside [`MIN_TOPOLOGY_PORT`]..=[`MAX_TOPOLOGY_PORT`].
    PortOutOfRange { address: String, port: i64 },

    /// The document's page references violate the rule for its kind of page.
    InconsistentPageReferences {
        current: ReferenceTime,
        page_start: ReferenceTime,
        page_end: ReferenceTime,
    },

    /// The virtual chain's entry lists no committee events, so no committee term can be seeded.
    NoCommitteeEvents,
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Malformed(source) => {
                write!(f, "could not unmarshal management document: {}", source)
            }
            DocumentError::VirtualChainNotFound { virtual_chain_id } => write!(
                f,
                "could not find virtual chain {} in document",
                virtual_chain_id
            ),
            DocumentError::BadHexAddress { address, source } => {
                write!(f, "cannot decode node address hex {}: {}", address, source)
            }
            DocumentError::BadAddressLength { address, length } => write!(
                f,
                "node address {} has {} bytes, expected {}",
                address,
                length,
                crate::types::data_types::NODE_IDENTITY_LEN
            ),
            DocumentError::EmptyIp { address } => {
                write!(f, "empty ip address for node {}", address)
            }
            DocumentError::PortOutOfRange { address, port } => write!(
                f,
                "topology node {} port {} needs to be in the {}-{} range",
                address, port, MIN_TOPOLOGY_PORT, MAX_TOPOLOGY_PORT
            ),
            DocumentError::InconsistentPageReferences {
                current,
                page_start,
                page_end,
            } => write!(
                f,
                "inconsistent page references: current {}, page start {}, page end {}",
                current, page_start, page_end
            ),
            DocumentError::NoCommitteeEvents => {
                write!(f, "cannot start virtual chain with no committee events")
            }
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Malformed(source) => Some(source),
            DocumentError::BadHexAddress { source, .. } => Some(source),
            _ => None,
        }
    }
}
