use std::{fs, path::Path};

use serde_json::{json, Map, Value};

use vchain_management::types::data_types::NodeIdentity;

/// A committee event: its reference and its members, in the order they should appear in the document.
pub(crate) type CommitteeEventFixture = (u64, Vec<NodeIdentity>);

/// A topology entry: its address, IP, and port.
pub(crate) type TopologyNodeFixture = (NodeIdentity, &'static str, i64);

/// Build a management document describing one virtual chain.
///
/// Page references are set to `current_ref_time` so that the document is consistent.
pub(crate) fn document(
    virtual_chain_id: u32,
    current_ref_time: u64,
    committee_events: &[CommitteeEventFixture],
    topology: &[TopologyNodeFixture],
) -> Value {
    let committee_events: Vec<Value> = committee_events
        .iter()
        .map(|(ref_time, members)| {
            let committee: Vec<Value> = members
                .iter()
                .map(|member| {
                    json!({
                        "OrbsAddress": member.to_hex(),
                        "EthAddress": "0000000000000000000000000000000000000000",
                        "EffectiveStake": 1000,
                        "IdentityType": 0
                    })
                })
                .collect();
            json!({ "RefTime": ref_time, "Committee": committee })
        })
        .collect();

    let topology: Vec<Value> = topology
        .iter()
        .map(|(address, ip, port)| json!({ "Address": address.to_hex(), "Ip": ip, "Port": port }))
        .collect();

    let mut virtual_chains = Map::new();
    virtual_chains.insert(
        virtual_chain_id.to_string(),
        json!({
            "GenesisRefTime": 1,
            "CurrentTopology": topology,
            "CommitteeEvents": committee_events
        }),
    );

    json!({
        "CurrentRefTime": current_ref_time,
        "PageStartRefTime": 0,
        "PageEndRefTime": current_ref_time,
        "VirtualChains": virtual_chains
    })
}

/// Get a mutable reference to the entry of `virtual_chain_id` in `document`.
pub(crate) fn virtual_chain_entry(document: &mut Value, virtual_chain_id: u32) -> &mut Value {
    &mut document["VirtualChains"][virtual_chain_id.to_string()]
}

pub(crate) fn to_bytes(document: &Value) -> Vec<u8> {
    serde_json::to_vec(document).unwrap()
}

/// Write `document` to `dir/name` and return the path as a string.
pub(crate) fn write_document(dir: &Path, name: &str, document: &Value) -> String {
    let path = dir.join(name);
    fs::write(&path, to_bytes(document)).unwrap();
    path.to_str().unwrap().to_string()
}
