//! `CLUSTER NODES` reply parser
//!
//! Line format:
//! `<id> <ip:port@cport[,hostname]> <flags> <master> <ping> <pong> <epoch> <link> <slot>...`

use super::types::{ClusterNode, LinkState, NodeFlags, NodeRole, SlotRange};
use crate::error::{RedisError, Result};
use crate::types::NodeAddress;
use tracing::debug;

/// Parse a `CLUSTER NODES` reply obtained from `queried`.
///
/// The queried node may report itself with an empty host; its host is then
/// taken from `queried`. Nodes still in handshake or without an address are
/// left out since nothing can be routed to them.
pub fn parse_cluster_nodes(text: &str, queried: &NodeAddress) -> Result<Vec<ClusterNode>> {
    let mut nodes = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let node = parse_line(line, queried)?;
        if node.flags.handshake || node.flags.noaddr {
            debug!("Skipping node {} ({:?})", node.id, node.flags);
            continue;
        }
        nodes.push(node);
    }
    Ok(nodes)
}

fn malformed(line: &str, what: &str) -> RedisError {
    RedisError::ClusterStateFailure(format!("malformed CLUSTER NODES line ({}): {}", what, line))
}

fn parse_line(line: &str, queried: &NodeAddress) -> Result<ClusterNode> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 {
        return Err(malformed(line, "too few fields"));
    }

    let flags = parse_flags(fields[2]);
    let role = if fields[2].split(',').any(|f| f == "slave" || f == "replica") {
        NodeRole::Replica
    } else {
        NodeRole::Master
    };

    // ip:port@cport[,hostname]; pre-3.2 servers omit @cport
    let endpoint = fields[1].split(',').next().unwrap_or_default();
    let endpoint = endpoint.split('@').next().unwrap_or_default();
    let mut address: NodeAddress = endpoint
        .parse()
        .map_err(|_| malformed(line, "address"))?;
    if address.host().is_empty() {
        address = address.with_host(queried.host());
    }

    let master_id = match fields[3] {
        "-" => None,
        id => Some(id.to_string()),
    };

    let link_state = match fields[7] {
        "connected" => LinkState::Connected,
        _ => LinkState::Disconnected,
    };

    let mut slots = Vec::new();
    for token in &fields[8..] {
        // [slot->-id] / [slot-<-id]: migration in progress, not ownership
        if token.starts_with('[') {
            continue;
        }
        let range = match token.split_once('-') {
            Some((start, end)) => (start.parse(), end.parse()),
            None => (token.parse(), token.parse()),
        };
        match range {
            (Ok(start), Ok(end)) => {
                slots.push(SlotRange::new(start, end).map_err(|_| malformed(line, "slot range"))?)
            }
            _ => return Err(malformed(line, "slot")),
        }
    }

    Ok(ClusterNode {
        id: fields[0].to_string(),
        address,
        role,
        master_id,
        slots,
        flags,
        link_state,
    })
}

fn parse_flags(field: &str) -> NodeFlags {
    let mut flags = NodeFlags::default();
    for flag in field.split(',') {
        match flag {
            "myself" => flags.myself = true,
            "fail" => flags.fail = true,
            "fail?" => flags.pfail = true,
            "handshake" => flags.handshake = true,
            "noaddr" => flags.noaddr = true,
            "nofailover" => flags.nofailover = true,
            _ => {}
        }
    }
    flags
}
