//! Per-node outcomes of fan-out execution

use super::types::ClusterNode;
use crate::error::{RedisError, Result};
use crate::types::NodeAddress;
use crate::value::{CommandResult, FromValue, Value};

/// Outcome of a command on one node
#[derive(Debug, Clone)]
pub struct NodeResult {
    node: ClusterNode,
    outcome: CommandResult,
}

impl NodeResult {
    pub fn new(node: ClusterNode, outcome: CommandResult) -> Self {
        Self { node, outcome }
    }

    pub fn node(&self) -> &ClusterNode {
        &self.node
    }

    pub fn outcome(&self) -> &CommandResult {
        &self.outcome
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RedisError> {
        self.outcome.as_ref().err()
    }

    pub fn into_parts(self) -> (ClusterNode, CommandResult) {
        (self.node, self.outcome)
    }
}

/// One [`NodeResult`] per targeted node, in target order.
///
/// Partial failure is data here, never an error: a failed node still has
/// its entry.
#[derive(Debug, Clone, Default)]
pub struct MultiNodeResult {
    results: Vec<NodeResult>,
}

impl MultiNodeResult {
    pub fn new(results: Vec<NodeResult>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeResult> {
        self.results.iter()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(NodeResult::is_ok)
    }

    /// First successful value in target order
    pub fn first_value(&self) -> Option<&Value> {
        self.results.iter().find_map(NodeResult::value)
    }

    pub fn value_for(&self, address: &NodeAddress) -> Option<&CommandResult> {
        self.results
            .iter()
            .find(|r| &r.node.address == address)
            .map(NodeResult::outcome)
    }

    /// Successful values, in target order
    pub fn values(&self) -> Vec<&Value> {
        self.results.iter().filter_map(NodeResult::value).collect()
    }

    pub fn failures(&self) -> Vec<&NodeResult> {
        self.results.iter().filter(|r| !r.is_ok()).collect()
    }

    /// Successful values with array replies expanded into their elements
    pub fn flattened(&self) -> Vec<Value> {
        let mut out = Vec::new();
        for value in self.values() {
            match value {
                Value::Array(items) => out.extend(items.iter().cloned()),
                other => out.push(other.clone()),
            }
        }
        out
    }

    /// Every node's value converted, or the first failure in target order
    pub fn try_values<T: FromValue>(&self) -> Result<Vec<T>> {
        self.results
            .iter()
            .map(|r| match &r.outcome {
                Ok(value) => T::from_value(value.clone()),
                Err(e) => Err(e.clone()),
            })
            .collect()
    }

    /// `Err` with the first failure, if any node failed
    pub fn ensure_all_succeeded(self) -> Result<Self> {
        match self.results.iter().find_map(NodeResult::error) {
            Some(error) => Err(error.clone()),
            None => Ok(self),
        }
    }

    pub fn into_results(self) -> Vec<NodeResult> {
        self.results
    }
}

impl IntoIterator for MultiNodeResult {
    type Item = NodeResult;
    type IntoIter = std::vec::IntoIter<NodeResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
