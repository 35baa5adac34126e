//! Topology provider
//!
//! The caching provider serves the last snapshot while it is younger than
//! the configured TTL and re-queries `CLUSTER NODES` otherwise. Refreshes are
//! single-flight: concurrent callers wait for the one in progress and reuse
//! its result. There is no background polling; freshness is evaluated on
//! every call.

use super::nodes_parser::parse_cluster_nodes;
use super::topology::ClusterTopology;
use crate::cmd::Cmd;
use crate::error::{RedisError, Result};
use crate::pool::ConnectionProvider;
use crate::types::NodeAddress;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[async_trait]
pub trait TopologyProvider: Send + Sync {
    /// Current topology, fetched when missing or stale
    async fn topology(&self) -> Result<Arc<ClusterTopology>>;

    /// Fetch a new topology regardless of age
    async fn refresh(&self) -> Result<Arc<ClusterTopology>>;
}

pub struct CachingTopologyProvider {
    seeds: Vec<NodeAddress>,
    pool: Arc<dyn ConnectionProvider>,
    ttl: Duration,
    cached: RwLock<Option<Arc<ClusterTopology>>>,
    refresh_lock: Mutex<()>,
}

impl CachingTopologyProvider {
    pub fn new(seeds: Vec<NodeAddress>, pool: Arc<dyn ConnectionProvider>, ttl: Duration) -> Self {
        Self {
            seeds,
            pool,
            ttl,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Last fetched snapshot, however old
    pub fn cached(&self) -> Option<Arc<ClusterTopology>> {
        self.cached.read().clone()
    }

    fn fresh(&self) -> Option<Arc<ClusterTopology>> {
        self.cached().filter(|t| !t.is_stale(self.ttl))
    }

    /// Nodes to ask, in order: the last snapshot's nodes, then any seed it
    /// does not list
    fn candidates(&self) -> Vec<NodeAddress> {
        let mut candidates: Vec<NodeAddress> = self
            .cached()
            .map(|t| t.nodes().iter().map(|n| n.address.clone()).collect())
            .unwrap_or_default();
        for seed in &self.seeds {
            if !candidates.contains(seed) {
                candidates.push(seed.clone());
            }
        }
        candidates
    }

    async fn fetch(&self) -> Result<Arc<ClusterTopology>> {
        let mut failures = Vec::new();

        for address in self.candidates() {
            match self.query(&address).await {
                Ok(topology) => {
                    info!(
                        "Fetched cluster topology from {}: {} nodes, {} slots covered",
                        address,
                        topology.nodes().len(),
                        topology.slot_coverage()
                    );
                    let topology = Arc::new(topology);
                    *self.cached.write() = Some(topology.clone());
                    return Ok(topology);
                }
                Err(e) => {
                    debug!("CLUSTER NODES on {} failed: {}", address, e);
                    failures.push(format!("\r\n\t- {} failed: {}", address, e));
                }
            }
        }

        warn!("Cluster topology unavailable: {} node(s) failed", failures.len());
        Err(RedisError::ClusterStateFailure(format!(
            "Could not retrieve cluster information; CLUSTER NODES failed on every known node:{}",
            failures.concat()
        )))
    }

    async fn query(&self, address: &NodeAddress) -> Result<ClusterTopology> {
        let mut connection = self.pool.acquire(address).await?;
        let reply = connection
            .query::<String>(&Cmd::new("CLUSTER").arg("NODES"))
            .await;
        self.pool.release(connection).await;

        let nodes = parse_cluster_nodes(&reply?, address)?;
        if nodes.is_empty() {
            return Err(RedisError::ClusterStateFailure(
                "CLUSTER NODES reported no usable nodes".into(),
            ));
        }
        ClusterTopology::new(nodes)
    }
}

#[async_trait]
impl TopologyProvider for CachingTopologyProvider {
    async fn topology(&self) -> Result<Arc<ClusterTopology>> {
        if let Some(topology) = self.fresh() {
            return Ok(topology);
        }
        let _guard = self.refresh_lock.lock().await;
        if let Some(topology) = self.fresh() {
            return Ok(topology);
        }
        self.fetch().await
    }

    async fn refresh(&self) -> Result<Arc<ClusterTopology>> {
        let before = self.cached();
        let _guard = self.refresh_lock.lock().await;

        // Another caller refreshed while we waited
        if let Some(current) = self.cached() {
            let replaced = before.as_ref().is_none_or(|b| !Arc::ptr_eq(b, &current));
            if replaced {
                return Ok(current);
            }
        }
        self.fetch().await
    }
}
