/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store numbers and bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Point on the time axis that versioned terms are placed on.
///
/// A reference time may be a block height or a timestamp in seconds; the management service does not
/// care which, only that all terms of one snapshot share the same axis. Reference `0` is the floor
/// that every term sequence is seeded at.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ReferenceTime(u64);

impl ReferenceTime {
    /// Create a new `ReferenceTime` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `ReferenceTime`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ReferenceTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ReferenceTime {
    type Output = ReferenceTime;
    fn add(self, rhs: u64) -> Self::Output {
        ReferenceTime::new(self.0 + rhs)
    }
}

impl Sub<u64> for ReferenceTime {
    type Output = ReferenceTime;
    fn sub(self, rhs: u64) -> Self::Output {
        ReferenceTime::new(self.0.saturating_sub(rhs))
    }
}

/// Length in bytes of a [`NodeIdentity`].
pub const NODE_IDENTITY_LEN: usize = 20;

/// Network address that identifies a participant.
///
/// `NodeIdentity` is used as a map key in a [`Topology`](super::topology::Topology) and as the unit of
/// committee membership. Equality and ordering are byte-exact.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct NodeIdentity([u8; NODE_IDENTITY_LEN]);

impl NodeIdentity {
    /// Create a new `NodeIdentity` wrapping `bytes`.
    pub const fn new(bytes: [u8; NODE_IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a `NodeIdentity` from its hex representation. A leading `0x` is accepted.
    pub fn from_hex(hex_address: &str) -> Result<Self, NodeIdentityDecodeError> {
        let digits = hex_address
            .strip_prefix("0x")
            .or_else(|| hex_address.strip_prefix("0X"))
            .unwrap_or(hex_address);
        let bytes = hex::decode(digits).map_err(NodeIdentityDecodeError::InvalidHex)?;
        let bytes: [u8; NODE_IDENTITY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| NodeIdentityDecodeError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Get the inner `[u8; 20]` value of this `NodeIdentity`.
    pub const fn bytes(&self) -> [u8; NODE_IDENTITY_LEN] {
        self.0
    }

    /// Get the lowercase hex representation of this `NodeIdentity`, without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for NodeIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for NodeIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdentity({})", self.to_hex())
    }
}

/// Ways that [`NodeIdentity::from_hex`] can fail.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeIdentityDecodeError {
    /// The input is not valid hex.
    InvalidHex(hex::FromHexError),

    /// The input decoded into this many bytes instead of [`NODE_IDENTITY_LEN`].
    InvalidLength(usize),
}

impl Display for NodeIdentityDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeIdentityDecodeError::InvalidHex(source) => write!(f, "invalid hex: {}", source),
            NodeIdentityDecodeError::InvalidLength(len) => write!(
                f,
                "decoded {} bytes, expected {}",
                len, NODE_IDENTITY_LEN
            ),
        }
    }
}

impl std::error::Error for NodeIdentityDecodeError {}

/// Weight of a committee member in threshold computations downstream.
///
/// Terms that do not carry explicit weights give every member a weight of [`Weight::DEFAULT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Weight(u64);

impl Weight {
    /// The weight given to members of terms that carry no weights of their own.
    pub const DEFAULT: Weight = Weight(1);

    /// Create a new `Weight` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Weight`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Default for Weight {
    fn default() -> Self {
        Weight::DEFAULT
    }
}

/// Version of the block protocol rules in effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct ProtocolVersion(u32);

impl ProtocolVersion {
    /// The lowest protocol version a consensus block may carry. Used when a document lists no
    /// protocol-version events.
    pub const MINIMAL: ProtocolVersion = ProtocolVersion(1);

    /// The highest protocol version this node understands. Seeds the
    /// [`MemoryProvider`](crate::provider::memory::MemoryProvider).
    pub const MAXIMAL_SUPPORTED: ProtocolVersion = ProtocolVersion(2);

    /// Create a new `ProtocolVersion` with an `int` inner value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the inner `u32` value of this `ProtocolVersion`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Number that uniquely identifies a virtual chain.
///
/// A management document may describe several virtual chains. Each node selects the one whose key
/// (the decimal string form of this number) matches its configured `VirtualChainID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct VirtualChainID(u32);

impl VirtualChainID {
    /// Create a new `VirtualChainID` with an `int` value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the `u32` value of this `VirtualChainID`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for VirtualChainID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// 32-byte SHA256 digest of the content of a
/// [`ManagementSnapshot`](super::snapshot::ManagementSnapshot).
///
/// See [`ManagementSnapshot::content_digest`](super::snapshot::ManagementSnapshot::content_digest)
/// for what is and is not covered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SnapshotDigest([u8; 32]);

impl SnapshotDigest {
    /// Create a new `SnapshotDigest` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `SnapshotDigest`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for SnapshotDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for SnapshotDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotDigest({})", hex::encode(self.0))
    }
}
