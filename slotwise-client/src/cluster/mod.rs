//! Redis Cluster support
//!
//! Hash slot computation, `CLUSTER NODES` parsing, the cached topology,
//! redirect handling and the [`ClusterConnection`] handle that routes
//! commands to the node owning each key.

mod connection;
mod executor;
mod hash_slot;
mod nodes_parser;
mod provider;
pub(crate) mod redirect;
mod result;
mod routing;
mod topology;
mod types;

pub use connection::ClusterConnection;
pub use executor::ClusterCommandExecutor;
pub use hash_slot::{HashSlot, hash_slot};
pub use nodes_parser::parse_cluster_nodes;
pub use provider::{CachingTopologyProvider, TopologyProvider};
pub use redirect::{Redirect, parse_redirect};
pub use result::{MultiNodeResult, NodeResult};
pub use routing::{Aggregate, Merge, Routing};
pub use topology::ClusterTopology;
pub use types::{
    ClusterNode, LinkState, NodeFlags, NodeRef, NodeRole, SlotMode, SlotRange, TOTAL_SLOTS,
};
