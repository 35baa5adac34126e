//! Cluster connection handle
//!
//! [`ClusterConnection`] routes each command by [`Routing`], and exposes the
//! per-node fan-out and slot administration commands of a cluster.

use super::executor::ClusterCommandExecutor;
use super::hash_slot;
use super::provider::TopologyProvider;
use super::result::MultiNodeResult;
use super::routing::{Aggregate, Routing};
use super::topology::ClusterTopology;
use super::types::{ClusterNode, NodeRef, SlotMode, SlotRange};
use crate::cmd::{Cmd, ToArg};
use crate::commands::CommandTarget;
use crate::error::{RedisError, Result};
use crate::pipeline::Execution;
use crate::types::NodeAddress;
use crate::value::{FromValue, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Handle to a Redis cluster. Clones share the topology cache and the pool.
#[derive(Clone)]
pub struct ClusterConnection {
    executor: Arc<ClusterCommandExecutor>,
}

impl ClusterConnection {
    pub fn new(executor: ClusterCommandExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn executor(&self) -> &ClusterCommandExecutor {
        &self.executor
    }

    /// Run one command wherever its routing says
    pub async fn execute(&self, cmd: Cmd) -> Result<Value> {
        let routing = Routing::for_command(&cmd);
        debug!("Routing {} as {:?}", cmd.name(), routing);
        match routing {
            Routing::SingleSlot => self.executor.execute_keyed(&cmd).await,
            Routing::Split(merge) => self.executor.execute_split(&cmd, merge).await,
            Routing::AllMasters(how) => {
                let result = self.executor.execute_on_all_masters(&cmd).await?;
                ClusterCommandExecutor::aggregate(result, how)
            }
            Routing::AnyNode => self.executor.execute_on_arbitrary_node(&cmd).await,
            Routing::FirstFound => self.executor.execute_until_found(&cmd).await,
            Routing::Local => Ok(Value::Okay),
            Routing::Unsupported(reason) => Err(RedisError::UnsupportedInTopology(reason)),
        }
    }

    pub async fn query<T: FromValue>(&self, cmd: Cmd) -> Result<T> {
        T::from_value(self.execute(cmd).await?)
    }

    pub async fn topology(&self) -> Result<Arc<ClusterTopology>> {
        self.executor.topology().await
    }

    /// Re-read the topology now, regardless of cache age
    pub async fn refresh_topology(&self) -> Result<Arc<ClusterTopology>> {
        self.executor.topology_provider().refresh().await
    }

    // Fan-out

    pub async fn execute_on_all_masters(&self, cmd: Cmd) -> Result<MultiNodeResult> {
        self.executor.execute_on_all_masters(&cmd).await
    }

    pub async fn execute_on_all_nodes(&self, cmd: Cmd) -> Result<MultiNodeResult> {
        self.executor.execute_on_all_nodes(&cmd).await
    }

    /// Run `cmd` on one node of the current topology, without redirects
    pub async fn execute_on_node(&self, node: &NodeRef, cmd: Cmd) -> Result<Value> {
        let address = self.resolve(node).await?.address;
        self.executor.execute_on_node(&address, &cmd).await
    }

    pub async fn ping_all(&self) -> Result<MultiNodeResult> {
        self.execute_on_all_nodes(Cmd::new("PING")).await
    }

    pub async fn flush_db_all(&self) -> Result<()> {
        self.execute_on_all_masters(Cmd::new("FLUSHDB"))
            .await?
            .ensure_all_succeeded()?;
        Ok(())
    }

    pub async fn info_all(&self, section: Option<&str>) -> Result<MultiNodeResult> {
        let mut cmd = Cmd::new("INFO");
        if let Some(section) = section {
            cmd.push_arg(section);
        }
        self.execute_on_all_nodes(cmd).await
    }

    pub async fn config_get_all(&self, pattern: &str) -> Result<MultiNodeResult> {
        self.execute_on_all_nodes(Cmd::new("CONFIG").arg("GET").arg(pattern))
            .await
    }

    /// Keys across all masters
    pub async fn db_size(&self) -> Result<i64> {
        let result = self.execute_on_all_masters(Cmd::new("DBSIZE")).await?;
        i64::from_value(ClusterCommandExecutor::aggregate(result, Aggregate::Sum)?)
    }

    /// Most recent save across all masters
    pub async fn last_save(&self) -> Result<i64> {
        let result = self.execute_on_all_masters(Cmd::new("LASTSAVE")).await?;
        i64::from_value(ClusterCommandExecutor::aggregate(result, Aggregate::Max)?)
    }

    // Slot management

    pub async fn set_slot(&self, node: &NodeRef, slot: u16, mode: SlotMode) -> Result<()> {
        let target = self.resolve(node).await?;
        let mut cmd = Cmd::new("CLUSTER")
            .arg("SETSLOT")
            .arg(u32::from(slot))
            .arg(mode.keyword());
        if let Some(peer) = mode.peer() {
            cmd.push_arg(self.resolve(peer).await?.id);
        }
        self.admin(&target, cmd).await
    }

    pub async fn add_slots(&self, node: &NodeRef, slots: &[u16]) -> Result<()> {
        self.slot_command(node, "ADDSLOTS", slots.iter().copied()).await
    }

    pub async fn add_slots_in_range(&self, node: &NodeRef, range: SlotRange) -> Result<()> {
        self.slot_command(node, "ADDSLOTS", range.slots()).await
    }

    pub async fn delete_slots(&self, node: &NodeRef, slots: &[u16]) -> Result<()> {
        self.slot_command(node, "DELSLOTS", slots.iter().copied()).await
    }

    pub async fn delete_slots_in_range(&self, node: &NodeRef, range: SlotRange) -> Result<()> {
        self.slot_command(node, "DELSLOTS", range.slots()).await
    }

    /// Remove `node` from every other node's view of the cluster
    pub async fn forget(&self, node: &NodeRef) -> Result<MultiNodeResult> {
        let topology = self.topology().await?;
        let forgotten = topology.lookup(node)?.clone();
        let others: Vec<ClusterNode> = topology
            .nodes()
            .iter()
            .filter(|n| n.id != forgotten.id)
            .cloned()
            .collect();
        let cmd = Cmd::new("CLUSTER").arg("FORGET").arg(&forgotten.id);
        Ok(self.executor.execute_on_nodes(others, &cmd).await)
    }

    /// Introduce `address` to every known node
    pub async fn meet(&self, address: &NodeAddress) -> Result<MultiNodeResult> {
        let cmd = Cmd::new("CLUSTER")
            .arg("MEET")
            .arg(address.host())
            .arg(address.port());
        self.execute_on_all_nodes(cmd).await
    }

    /// Make `replica` a replica of `master`
    pub async fn replicate(&self, master: &NodeRef, replica: &NodeRef) -> Result<()> {
        let master = self.resolve(master).await?;
        let replica = self.resolve(replica).await?;
        self.admin(&replica, Cmd::new("CLUSTER").arg("REPLICATE").arg(&master.id))
            .await
    }

    /// `CLUSTER COUNTKEYSINSLOT` on the slot's owner
    pub async fn count_keys_in_slot(&self, slot: u16) -> Result<i64> {
        let owner = self.node_for_slot(slot).await?;
        let cmd = Cmd::new("CLUSTER")
            .arg("COUNTKEYSINSLOT")
            .arg(u32::from(slot));
        i64::from_value(self.executor.execute_on_node(&owner.address, &cmd).await?)
    }

    /// Up to `count` keys of `slot`, from the slot's owner
    pub async fn keys_in_slot<T: FromValue>(&self, slot: u16, count: u32) -> Result<Vec<T>> {
        let owner = self.node_for_slot(slot).await?;
        let cmd = Cmd::new("CLUSTER")
            .arg("GETKEYSINSLOT")
            .arg(u32::from(slot))
            .arg(count);
        Vec::<T>::from_value(self.executor.execute_on_node(&owner.address, &cmd).await?)
    }

    // Lookups

    /// Slot of `key`, computed locally
    pub fn key_slot(&self, key: impl ToArg) -> u16 {
        hash_slot(&key.to_arg())
    }

    pub async fn node_for_slot(&self, slot: u16) -> Result<ClusterNode> {
        let topology = self.topology().await?;
        topology.master_for_slot(slot).cloned().ok_or_else(|| {
            RedisError::ClusterStateFailure(format!("Slot {} is not served by any node", slot))
        })
    }

    pub async fn node_for_key(&self, key: impl ToArg) -> Result<ClusterNode> {
        self.node_for_slot(self.key_slot(key)).await
    }

    pub async fn nodes(&self) -> Result<Vec<ClusterNode>> {
        Ok(self.topology().await?.nodes().to_vec())
    }

    pub async fn replicas_of(&self, master: &NodeRef) -> Result<Vec<ClusterNode>> {
        let topology = self.topology().await?;
        let master = topology.lookup(master)?;
        Ok(topology
            .replicas_of(&master.id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn master_replica_map(&self) -> Result<Vec<(ClusterNode, Vec<ClusterNode>)>> {
        let topology = self.topology().await?;
        Ok(topology
            .master_replica_map()
            .into_iter()
            .map(|(master, replicas)| (master.clone(), replicas.into_iter().cloned().collect()))
            .collect())
    }

    /// `CLUSTER INFO` from any master, as field / value pairs
    pub async fn cluster_info(&self) -> Result<BTreeMap<String, String>> {
        let text: String = self
            .executor
            .execute_on_arbitrary_node(&Cmd::new("CLUSTER").arg("INFO"))
            .await
            .and_then(String::from_value)?;
        Ok(parse_info(&text))
    }

    async fn resolve(&self, node: &NodeRef) -> Result<ClusterNode> {
        Ok(self.topology().await?.lookup(node)?.clone())
    }

    async fn slot_command(
        &self,
        node: &NodeRef,
        subcommand: &str,
        slots: impl Iterator<Item = u16>,
    ) -> Result<()> {
        let target = self.resolve(node).await?;
        let mut cmd = Cmd::new("CLUSTER").arg(subcommand);
        for slot in slots {
            cmd.push_arg(u32::from(slot));
        }
        if cmd.args().len() == 1 {
            return Err(RedisError::usage(format!("CLUSTER {} needs at least one slot", subcommand)));
        }
        self.admin(&target, cmd).await
    }

    async fn admin(&self, target: &ClusterNode, cmd: Cmd) -> Result<()> {
        self.executor.execute_on_node(&target.address, &cmd).await?;
        Ok(())
    }
}

#[async_trait]
impl CommandTarget for ClusterConnection {
    async fn dispatch(&mut self, cmd: Cmd) -> Result<Execution<Value>> {
        self.execute(cmd).await.map(Execution::Done)
    }
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection").finish_non_exhaustive()
    }
}

/// `field:value` lines; blank lines and `#` headers skipped
fn parse_info(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}
