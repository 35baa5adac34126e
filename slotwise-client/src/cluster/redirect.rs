//! MOVED / ASK redirects

use crate::types::NodeAddress;

/// Redirect carried by an error reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// The slot has a new owner: refresh the slot map and retry there
    Moved { slot: u16, address: NodeAddress },
    /// The slot is being migrated: retry once on `address` after `ASKING`,
    /// without touching the slot map
    Ask { slot: u16, address: NodeAddress },
}

impl Redirect {
    pub fn slot(&self) -> u16 {
        match self {
            Redirect::Moved { slot, .. } | Redirect::Ask { slot, .. } => *slot,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        match self {
            Redirect::Moved { address, .. } | Redirect::Ask { address, .. } => address,
        }
    }

    /// Servers may omit the host (`MOVED 3999 :6381`) to mean "same host as
    /// the node that replied"
    pub(crate) fn resolve_host(self, replied_from: &NodeAddress) -> Self {
        let fill = |address: NodeAddress| {
            if address.host().is_empty() {
                address.with_host(replied_from.host())
            } else {
                address
            }
        };
        match self {
            Redirect::Moved { slot, address } => Redirect::Moved {
                slot,
                address: fill(address),
            },
            Redirect::Ask { slot, address } => Redirect::Ask {
                slot,
                address: fill(address),
            },
        }
    }
}

/// Parse `MOVED <slot> <host>:<port>` or `ASK <slot> <host>:<port>` (without
/// the leading `-`). Anything else, including a malformed redirect, is `None`.
pub fn parse_redirect(message: &str) -> Option<Redirect> {
    let mut parts = message.split_whitespace();
    let kind = parts.next()?;
    let slot: u16 = parts.next()?.parse().ok()?;
    let address: NodeAddress = parts.next()?.parse().ok()?;
    if parts.next().is_some() || slot >= super::TOTAL_SLOTS {
        return None;
    }
    match kind {
        "MOVED" => Some(Redirect::Moved { slot, address }),
        "ASK" => Some(Redirect::Ask { slot, address }),
        _ => None,
    }
}
