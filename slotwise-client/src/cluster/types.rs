use crate::error::{RedisError, Result};
use crate::types::NodeAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Total number of hash slots
pub const TOTAL_SLOTS: u16 = 16384;

/// Role of a node in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Replica,
}

/// State of the cluster bus link as reported by the queried node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Node flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeFlags {
    pub myself: bool,
    pub fail: bool,
    pub pfail: bool,
    pub handshake: bool,
    pub noaddr: bool,
    pub nofailover: bool,
}

/// Slot range (inclusive start, inclusive end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start > end || end >= TOTAL_SLOTS {
            return Err(RedisError::usage(format!(
                "Invalid slot range: {}-{}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(slot: u16) -> Result<Self> {
        Self::new(slot, slot)
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn count(&self) -> u16 {
        self.end - self.start + 1
    }

    pub fn slots(&self) -> std::ops::RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Cluster node information, as captured in one topology snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Node ID (40 hex characters on a real cluster)
    pub id: String,
    pub address: NodeAddress,
    pub role: NodeRole,
    /// Master node ID (if this is a replica)
    pub master_id: Option<String>,
    /// Slots served (masters only)
    pub slots: Vec<SlotRange>,
    pub flags: NodeFlags,
    pub link_state: LinkState,
}

impl ClusterNode {
    /// A connected master serving `slots`
    pub fn master(id: impl Into<String>, address: NodeAddress, slots: Vec<SlotRange>) -> Self {
        Self {
            id: id.into(),
            address,
            role: NodeRole::Master,
            master_id: None,
            slots,
            flags: NodeFlags::default(),
            link_state: LinkState::Connected,
        }
    }

    /// A connected replica of `master_id`
    pub fn replica(id: impl Into<String>, address: NodeAddress, master_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address,
            role: NodeRole::Replica,
            master_id: Some(master_id.into()),
            slots: Vec::new(),
            flags: NodeFlags::default(),
            link_state: LinkState::Connected,
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn serves_slot(&self, slot: u16) -> bool {
        self.slots.iter().any(|r| r.contains(slot))
    }

    pub fn slot_count(&self) -> usize {
        self.slots.iter().map(|r| r.count() as usize).sum()
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.id)
    }
}

/// Reference to a node, resolved against the current topology
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Address(NodeAddress),
    Id(String),
}

impl NodeRef {
    pub fn id(id: impl Into<String>) -> Self {
        NodeRef::Id(id.into())
    }
}

impl From<NodeAddress> for NodeRef {
    fn from(address: NodeAddress) -> Self {
        NodeRef::Address(address)
    }
}

impl From<&ClusterNode> for NodeRef {
    fn from(node: &ClusterNode) -> Self {
        NodeRef::Id(node.id.clone())
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Address(address) => write!(f, "{}", address),
            NodeRef::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Slot state change for `CLUSTER SETSLOT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotMode {
    /// Importing the slot from the given node
    Importing(NodeRef),
    /// Migrating the slot to the given node
    Migrating(NodeRef),
    /// Clear any importing / migrating state
    Stable,
    /// Assign the slot to the given node
    Node(NodeRef),
}

impl SlotMode {
    pub fn keyword(&self) -> &'static str {
        match self {
            SlotMode::Importing(_) => "IMPORTING",
            SlotMode::Migrating(_) => "MIGRATING",
            SlotMode::Stable => "STABLE",
            SlotMode::Node(_) => "NODE",
        }
    }

    pub fn peer(&self) -> Option<&NodeRef> {
        match self {
            SlotMode::Importing(peer) | SlotMode::Migrating(peer) | SlotMode::Node(peer) => {
                Some(peer)
            }
            SlotMode::Stable => None,
        }
    }
}
