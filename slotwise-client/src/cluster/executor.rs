//! Cluster command executor
//!
//! Resolves target nodes from the current topology, runs commands through
//! the connection provider, follows MOVED / ASK redirects within a fixed
//! budget and fans commands out to several nodes.

use super::hash_slot;
use super::provider::TopologyProvider;
use super::redirect::Redirect;
use super::result::{MultiNodeResult, NodeResult};
use super::routing::{Aggregate, Merge};
use super::topology::ClusterTopology;
use super::types::ClusterNode;
use crate::cmd::Cmd;
use crate::connection::CommandConnection;
use crate::error::{DataAccessKind, RedisError, Result};
use crate::pool::ConnectionProvider;
use crate::types::NodeAddress;
use crate::value::{CommandResult, Value};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keys of one slot, as positions into the command's key units
struct SlotGroup {
    slot: u16,
    positions: Vec<usize>,
}

/// Everything a split command sends to one node
struct NodeBatch {
    address: NodeAddress,
    groups: Vec<SlotGroup>,
}

pub struct ClusterCommandExecutor {
    topology: Arc<dyn TopologyProvider>,
    pool: Arc<dyn ConnectionProvider>,
    max_redirects: u32,
}

impl ClusterCommandExecutor {
    pub fn new(
        topology: Arc<dyn TopologyProvider>,
        pool: Arc<dyn ConnectionProvider>,
        max_redirects: u32,
    ) -> Self {
        Self {
            topology,
            pool,
            max_redirects,
        }
    }

    pub fn topology_provider(&self) -> &Arc<dyn TopologyProvider> {
        &self.topology
    }

    pub async fn topology(&self) -> Result<Arc<ClusterTopology>> {
        self.topology.topology().await
    }

    /// The one slot every key of `cmd` maps to
    pub fn common_slot(cmd: &Cmd) -> Result<u16> {
        let mut keys = cmd.keys();
        let first = keys
            .next()
            .ok_or_else(|| RedisError::usage(format!("{} has no key to route by", cmd.name())))?;
        let slot = hash_slot(first);
        for key in keys {
            let other = hash_slot(key);
            if other != slot {
                return Err(RedisError::UnsupportedInTopology(format!(
                    "{} keys must map to the same hash slot in cluster mode (found slots {} and {})",
                    cmd.name(),
                    slot,
                    other
                )));
            }
        }
        Ok(slot)
    }

    /// Run a keyed command whose keys share one slot. Cross-slot commands
    /// are rejected before any network call.
    pub async fn execute_keyed(&self, cmd: &Cmd) -> Result<Value> {
        let slot = Self::common_slot(cmd)?;
        self.execute_on_slot(slot, cmd).await
    }

    /// Run `cmd` on the master serving `slot`, following redirects
    pub async fn execute_on_slot(&self, slot: u16, cmd: &Cmd) -> Result<Value> {
        let mut redirects = 0;
        let mut refreshed = false;
        let mut next: Option<(NodeAddress, bool)> = None;

        loop {
            let (address, asking) = match next.take() {
                Some(target) => target,
                None => {
                    let topology = self.topology.topology().await?;
                    match topology.master_for_slot(slot) {
                        Some(master) => (master.address.clone(), false),
                        None if !refreshed => {
                            debug!("Slot {} has no known owner, refreshing topology", slot);
                            refreshed = true;
                            self.topology.refresh().await?;
                            continue;
                        }
                        None => {
                            return Err(RedisError::ClusterStateFailure(format!(
                                "Slot {} is not served by any node",
                                slot
                            )));
                        }
                    }
                }
            };

            let error = match self.run_on(&address, cmd, asking).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let Some(redirect) = error.redirect() else {
                return Err(error);
            };

            if redirects >= self.max_redirects {
                return Err(RedisError::data_access(
                    DataAccessKind::TooManyRedirects,
                    format!(
                        "{} for slot {}: gave up after {} redirects, last: {}",
                        cmd.name(),
                        slot,
                        redirects,
                        error
                    ),
                ));
            }
            redirects += 1;

            match redirect.resolve_host(&address) {
                Redirect::Moved { slot: moved, address: target } => {
                    info!("Slot {} moved to {}, refreshing topology", moved, target);
                    if let Err(e) = self.topology.refresh().await {
                        warn!("Topology refresh after MOVED failed: {}", e);
                    }
                    next = Some((target, false));
                }
                Redirect::Ask { slot: asked, address: target } => {
                    debug!("Slot {} is migrating, asking {}", asked, target);
                    next = Some((target, true));
                }
            }
        }
    }

    /// Split a multi-key command by slot, send one pipelined batch per
    /// owning master and merge the replies.
    ///
    /// Parts on different nodes are not applied atomically.
    pub async fn execute_split(&self, cmd: &Cmd, merge: Merge) -> Result<Value> {
        let units = cmd.key_units().ok_or_else(|| {
            RedisError::usage(format!("{} cannot be split by key", cmd.name()))
        })?;
        let slots: Vec<u16> = units.iter().map(|u| hash_slot(&u.key)).collect();
        if slots.windows(2).all(|w| w[0] == w[1]) {
            return self.execute_on_slot(slots[0], cmd).await;
        }

        let topology = self.topology.topology().await?;
        let plan = match plan_split(&topology, &slots) {
            Ok(plan) => plan,
            Err(_) => {
                let refreshed = self.topology.refresh().await?;
                plan_split(&refreshed, &slots).map_err(|slot| {
                    RedisError::ClusterStateFailure(format!(
                        "Slot {} is not served by any node",
                        slot
                    ))
                })?
            }
        };
        debug!(
            "Splitting {} over {} node(s), {} slot(s)",
            cmd.name(),
            plan.len(),
            plan.iter().map(|b| b.groups.len()).sum::<usize>()
        );

        let name = cmd.name_bytes();
        let runs = plan.iter().map(|batch| {
            let commands: Vec<Cmd> = batch
                .groups
                .iter()
                .map(|g| Cmd::from_units(name, g.positions.iter().map(|&i| &units[i])))
                .collect();
            self.run_pipeline(&batch.address, commands)
        });
        let outcomes = join_all(runs).await;

        let merged = merge_split(&plan, outcomes, units.len(), merge);
        if let Err(error) = &merged {
            if error.redirect().is_some() {
                if let Err(e) = self.topology.refresh().await {
                    warn!("Topology refresh after split redirect failed: {}", e);
                }
            }
        }
        merged
    }

    /// Run `cmd` on one node, no redirects followed
    pub async fn execute_on_node(&self, address: &NodeAddress, cmd: &Cmd) -> Result<Value> {
        self.run_on(address, cmd, false).await
    }

    /// Run `cmd` on every node independently; one outcome per node
    pub async fn execute_on_nodes(&self, nodes: Vec<ClusterNode>, cmd: &Cmd) -> MultiNodeResult {
        let runs = nodes.into_iter().map(|node| async move {
            let outcome = self.run_on(&node.address, cmd, false).await;
            if let Err(e) = &outcome {
                warn!("{} failed on {}: {}", cmd.name(), node.address, e);
            }
            NodeResult::new(node, outcome)
        });
        MultiNodeResult::new(join_all(runs).await)
    }

    pub async fn execute_on_all_masters(&self, cmd: &Cmd) -> Result<MultiNodeResult> {
        let topology = self.topology.topology().await?;
        let masters: Vec<ClusterNode> = topology.masters().cloned().collect();
        if masters.is_empty() {
            return Err(RedisError::ClusterStateFailure("No master nodes known".into()));
        }
        Ok(self.execute_on_nodes(masters, cmd).await)
    }

    pub async fn execute_on_all_nodes(&self, cmd: &Cmd) -> Result<MultiNodeResult> {
        let topology = self.topology.topology().await?;
        Ok(self.execute_on_nodes(topology.nodes().to_vec(), cmd).await)
    }

    /// Run a keyless command on the first master of the current topology
    pub async fn execute_on_arbitrary_node(&self, cmd: &Cmd) -> Result<Value> {
        let topology = self.topology.topology().await?;
        let master = topology
            .masters()
            .next()
            .ok_or_else(|| RedisError::ClusterStateFailure("No master nodes known".into()))?;
        self.run_on(&master.address, cmd, false).await
    }

    /// Run a keyless read on each master in turn, stopping at the first
    /// non-nil reply. Node failures are not skipped.
    pub async fn execute_until_found(&self, cmd: &Cmd) -> Result<Value> {
        let topology = self.topology.topology().await?;
        for master in topology.masters() {
            match self.run_on(&master.address, cmd, false).await? {
                Value::Nil => debug!("{} found nothing on {}", cmd.name(), master.address),
                found => return Ok(found),
            }
        }
        Ok(Value::Nil)
    }

    /// Combine an all-masters outcome into a single reply. Any node failure
    /// fails the whole command.
    pub fn aggregate(result: MultiNodeResult, how: Aggregate) -> Result<Value> {
        let values: Vec<Value> = result
            .ensure_all_succeeded()?
            .into_results()
            .into_iter()
            .filter_map(|r| r.into_parts().1.ok())
            .collect();

        let integers = |values: &[Value]| -> Result<Vec<i64>> {
            values
                .iter()
                .map(|v| {
                    v.as_int().ok_or_else(|| {
                        RedisError::data_access(
                            DataAccessKind::UnexpectedReply,
                            format!("expected an integer reply, got {:?}", v),
                        )
                    })
                })
                .collect()
        };

        Ok(match how {
            Aggregate::AllOk => values.into_iter().next().unwrap_or(Value::Okay),
            Aggregate::Sum => Value::Int(integers(&values)?.into_iter().sum()),
            Aggregate::Max => Value::Int(integers(&values)?.into_iter().max().unwrap_or(0)),
            Aggregate::Concat => Value::Array(
                values
                    .into_iter()
                    .flat_map(|v| match v {
                        Value::Array(items) => items,
                        Value::Nil => Vec::new(),
                        other => vec![other],
                    })
                    .collect(),
            ),
        })
    }

    async fn run_on(&self, address: &NodeAddress, cmd: &Cmd, asking: bool) -> Result<Value> {
        let mut connection = self.pool.acquire(address).await?;
        let result = send(&mut connection, cmd, asking).await;
        self.pool.release(connection).await;
        result
    }

    async fn run_pipeline(
        &self,
        address: &NodeAddress,
        commands: Vec<Cmd>,
    ) -> Result<Vec<CommandResult>> {
        let mut connection = self.pool.acquire(address).await?;
        let result = pipeline(&mut connection, commands).await;
        self.pool.release(connection).await;
        result
    }
}

async fn send(connection: &mut CommandConnection, cmd: &Cmd, asking: bool) -> Result<Value> {
    if asking {
        connection.query::<()>(&Cmd::new("ASKING")).await?;
    }
    connection.query(cmd).await
}

async fn pipeline(
    connection: &mut CommandConnection,
    commands: Vec<Cmd>,
) -> Result<Vec<CommandResult>> {
    connection.begin_pipeline()?;
    for cmd in commands {
        // Replies are positional; the placeholders are not needed
        let _ = connection.execute(cmd).await?;
    }
    Ok(connection.flush().await?.into_results())
}

/// Group key positions by owning master, then by slot, in first-seen
/// order. `Err(slot)` when a slot has no owner.
fn plan_split(
    topology: &ClusterTopology,
    slots: &[u16],
) -> std::result::Result<Vec<NodeBatch>, u16> {
    let mut plan: Vec<NodeBatch> = Vec::new();
    for (position, &slot) in slots.iter().enumerate() {
        let owner = topology.master_for_slot(slot).ok_or(slot)?;

        let batch_index = match plan.iter().position(|b| b.address == owner.address) {
            Some(i) => i,
            None => {
                plan.push(NodeBatch {
                    address: owner.address.clone(),
                    groups: Vec::new(),
                });
                plan.len() - 1
            }
        };
        let groups = &mut plan[batch_index].groups;
        match groups.iter_mut().find(|g| g.slot == slot) {
            Some(group) => group.positions.push(position),
            None => groups.push(SlotGroup {
                slot,
                positions: vec![position],
            }),
        }
    }
    Ok(plan)
}

fn merge_split(
    plan: &[NodeBatch],
    outcomes: Vec<Result<Vec<CommandResult>>>,
    unit_count: usize,
    merge: Merge,
) -> Result<Value> {
    let mut ordered: Vec<Value> = vec![Value::Nil; unit_count];
    let mut total = 0i64;

    for (batch, outcome) in plan.iter().zip(outcomes) {
        let results = outcome?;
        if results.len() != batch.groups.len() {
            return Err(RedisError::data_access(
                DataAccessKind::UnexpectedReply,
                format!(
                    "{} replies for {} sub-commands from {}",
                    results.len(),
                    batch.groups.len(),
                    batch.address
                ),
            ));
        }
        for (group, result) in batch.groups.iter().zip(results) {
            let value = result?;
            match merge {
                Merge::KeyOrdered => match value {
                    Value::Array(items) if items.len() == group.positions.len() => {
                        for (&position, item) in group.positions.iter().zip(items) {
                            ordered[position] = item;
                        }
                    }
                    other => {
                        return Err(RedisError::data_access(
                            DataAccessKind::UnexpectedReply,
                            format!(
                                "expected {} elements for slot {}, got {:?}",
                                group.positions.len(),
                                group.slot,
                                other
                            ),
                        ));
                    }
                },
                Merge::Sum => {
                    total += value.as_int().ok_or_else(|| {
                        RedisError::data_access(
                            DataAccessKind::UnexpectedReply,
                            format!("expected an integer for slot {}, got {:?}", group.slot, value),
                        )
                    })?;
                }
                Merge::AllOk => {}
            }
        }
    }

    Ok(match merge {
        Merge::KeyOrdered => Value::Array(ordered),
        Merge::Sum => Value::Int(total),
        Merge::AllOk => Value::Okay,
    })
}
