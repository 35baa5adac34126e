//! Reply / failure translation
//!
//! Everything that goes wrong below the command layer is described as a
//! [`RawFailure`] and mapped to exactly one [`RedisError`] by an
//! [`ErrorTranslator`]. The translator is an explicit value owned by the
//! client and shared with every connection.

use crate::error::{DataAccessKind, RedisError};
use crate::transport::TransportError;
use crate::types::NodeAddress;
use std::fmt;
use std::time::Duration;

/// A failure as observed by the connection layer, before translation
#[derive(Debug)]
pub enum RawFailure {
    Transport(TransportError),
    /// Protocol error reply, without the leading `-`
    ErrorReply(String),
    PoolExhausted { node: NodeAddress, waited: Duration },
    UnexpectedReply(String),
}

impl From<TransportError> for RawFailure {
    fn from(error: TransportError) -> Self {
        RawFailure::Transport(error)
    }
}

pub trait ErrorTranslator: Send + Sync + fmt::Debug {
    fn translate(&self, failure: RawFailure) -> RedisError;
}

/// Stateless default mapping
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTranslator;

impl ErrorTranslator for DefaultTranslator {
    fn translate(&self, failure: RawFailure) -> RedisError {
        match failure {
            RawFailure::Transport(error) => RedisError::ConnectionFailure(error.to_string()),
            RawFailure::PoolExhausted { node, waited } => RedisError::ConnectionFailure(format!(
                "Pool exhausted for {}: no connection available after {:?}",
                node, waited
            )),
            RawFailure::UnexpectedReply(detail) => {
                RedisError::data_access(DataAccessKind::UnexpectedReply, detail)
            }
            RawFailure::ErrorReply(message) => translate_error_reply(message),
        }
    }
}

fn translate_error_reply(message: String) -> RedisError {
    let code = message.split_whitespace().next().unwrap_or_default();
    let kind = match code {
        "CROSSSLOT" => return RedisError::UnsupportedInTopology(message),
        "CLUSTERDOWN" => return RedisError::ClusterStateFailure(message),
        "ERR" if is_topology_refusal(&message) => {
            return RedisError::UnsupportedInTopology(message);
        }
        "WRONGTYPE" => DataAccessKind::WrongType,
        "MOVED" | "ASK" => DataAccessKind::Redirect,
        "NOSCRIPT" => DataAccessKind::NoScript,
        "BUSY" => DataAccessKind::Busy,
        "LOADING" => DataAccessKind::Loading,
        "READONLY" => DataAccessKind::ReadOnly,
        "TRYAGAIN" => DataAccessKind::TryAgain,
        "EXECABORT" => DataAccessKind::ExecAbort,
        "ERR" | "SYNTAX" => DataAccessKind::InvalidArgument,
        _ => DataAccessKind::Other,
    };
    RedisError::data_access(kind, message)
}

fn is_topology_refusal(message: &str) -> bool {
    message.contains("SELECT is not allowed in cluster mode")
        || message.contains("cluster support disabled")
}
