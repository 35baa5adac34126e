//! Command routing classification

use crate::cmd::Cmd;

/// How the per-node results of a split multi-key command are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// One reply element per key, reassembled in the caller's key order (MGET)
    KeyOrdered,
    /// Integer replies added up (DEL, EXISTS, ...)
    Sum,
    /// Every part must reply OK (MSET)
    AllOk,
}

/// How the per-node results of an all-masters command are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Every node must succeed; replies with the first node's value
    AllOk,
    Sum,
    Max,
    /// Array replies concatenated in node order
    Concat,
}

/// Where a command runs on a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Keyed command; all keys must share one slot
    SingleSlot,
    /// Multi-key command that may be split by slot
    Split(Merge),
    /// Runs on every master
    AllMasters(Aggregate),
    /// Keyless command any master can answer
    AnyNode,
    /// Keyless read tried on each master in turn until one replies non-nil
    FirstFound,
    /// Answered locally without a network call
    Local,
    /// Not available on a cluster
    Unsupported(String),
}

impl Routing {
    pub fn for_command(cmd: &Cmd) -> Routing {
        let name = cmd.name();
        match name.as_str() {
            "MULTI" | "EXEC" | "DISCARD" | "WATCH" | "UNWATCH" => Routing::Unsupported(format!(
                "{} is not supported on a cluster connection; transactions need a single-node connection",
                name
            )),
            "SELECT" => {
                let target = cmd.args().first().map(|a| a.as_slice());
                if target == Some(b"0".as_slice()) {
                    Routing::Local
                } else {
                    Routing::Unsupported(
                        "SELECT is not allowed in cluster mode; only database 0 exists".into(),
                    )
                }
            }
            _ if cmd.key_count() > 0 => match name.as_str() {
                "MGET" => Routing::Split(Merge::KeyOrdered),
                "DEL" | "EXISTS" | "UNLINK" | "TOUCH" => Routing::Split(Merge::Sum),
                "MSET" => Routing::Split(Merge::AllOk),
                _ => Routing::SingleSlot,
            },
            "FLUSHDB" | "FLUSHALL" | "SAVE" | "BGSAVE" | "BGREWRITEAOF" | "PING" => {
                Routing::AllMasters(Aggregate::AllOk)
            }
            "DBSIZE" => Routing::AllMasters(Aggregate::Sum),
            "LASTSAVE" => Routing::AllMasters(Aggregate::Max),
            "KEYS" => Routing::AllMasters(Aggregate::Concat),
            "RANDOMKEY" => Routing::FirstFound,
            "CONFIG" => match cmd.subcommand().as_deref() {
                Some("SET") | Some("RESETSTAT") | Some("REWRITE") => {
                    Routing::AllMasters(Aggregate::AllOk)
                }
                _ => Routing::AnyNode,
            },
            "SCRIPT" => match cmd.subcommand().as_deref() {
                Some("FLUSH") | Some("LOAD") => Routing::AllMasters(Aggregate::AllOk),
                _ => Routing::AnyNode,
            },
            _ => Routing::AnyNode,
        }
    }
}
