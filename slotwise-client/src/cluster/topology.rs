//! Cluster topology snapshot
//!
//! A [`ClusterTopology`] is immutable: a refresh produces a new snapshot and
//! readers holding the old one keep a consistent view.

use super::types::{ClusterNode, NodeRef, NodeRole, TOTAL_SLOTS};
use crate::error::{RedisError, Result};
use crate::types::NodeAddress;
use std::time::Duration;
use tokio::time::Instant;

/// Immutable view of the cluster at one point in time
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    /// Discovery order
    nodes: Vec<ClusterNode>,
    /// Slot -> index into `nodes` of the owning master
    slot_owners: Vec<Option<usize>>,
    captured_at: Instant,
}

impl ClusterTopology {
    /// Build a snapshot. Fails if two masters claim the same slot.
    pub fn new(nodes: Vec<ClusterNode>) -> Result<Self> {
        let mut slot_owners = vec![None; TOTAL_SLOTS as usize];

        for (index, node) in nodes.iter().enumerate() {
            if node.role != NodeRole::Master {
                continue;
            }
            for range in &node.slots {
                for slot in range.slots() {
                    let owner = &mut slot_owners[slot as usize];
                    if let Some(previous) = *owner {
                        let previous: &ClusterNode = &nodes[previous];
                        return Err(RedisError::ClusterStateFailure(format!(
                            "slot {} is claimed by both {} and {}",
                            slot, previous, node
                        )));
                    }
                    *owner = Some(index);
                }
            }
        }

        Ok(Self {
            nodes,
            slot_owners,
            captured_at: Instant::now(),
        })
    }

    /// All nodes, in discovery order
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Masters, in discovery order
    pub fn masters(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| n.is_master())
    }

    pub fn replicas_of(&self, master_id: &str) -> Vec<&ClusterNode> {
        self.nodes
            .iter()
            .filter(|n| n.master_id.as_deref() == Some(master_id))
            .collect()
    }

    /// Every master with its replicas
    pub fn master_replica_map(&self) -> Vec<(&ClusterNode, Vec<&ClusterNode>)> {
        self.masters()
            .map(|m| (m, self.replicas_of(&m.id)))
            .collect()
    }

    /// Master serving `slot`, if any
    pub fn master_for_slot(&self, slot: u16) -> Option<&ClusterNode> {
        self.slot_owners
            .get(slot as usize)
            .copied()
            .flatten()
            .map(|i| &self.nodes[i])
    }

    pub fn master_for_key(&self, key: &[u8]) -> Option<&ClusterNode> {
        self.master_for_slot(super::hash_slot(key))
    }

    pub fn lookup_by_address(&self, address: &NodeAddress) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| &n.address == address)
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn lookup(&self, node: &NodeRef) -> Result<&ClusterNode> {
        let found = match node {
            NodeRef::Address(address) => self.lookup_by_address(address),
            NodeRef::Id(id) => self.lookup_by_id(id),
        };
        found.ok_or_else(|| {
            RedisError::usage(format!("Node {} is unknown to the cluster", node))
        })
    }

    /// Number of slots with an owning master
    pub fn slot_coverage(&self) -> usize {
        self.slot_owners.iter().filter(|o| o.is_some()).count()
    }

    pub fn has_full_coverage(&self) -> bool {
        self.slot_coverage() == TOTAL_SLOTS as usize
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}
