//! Error types for slotwise
//!
//! Every failure a caller sees is one of four translated outcomes
//! (connection, data access, unsupported topology, cluster state) or an
//! API usage / configuration error raised before anything reaches the wire.

use crate::cluster::redirect::{Redirect, parse_redirect};
use std::fmt;
use thiserror::Error;

/// Result type alias for slotwise operations
pub type Result<T> = std::result::Result<T, RedisError>;

/// Sub-classification of a [`RedisError::DataAccess`] failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataAccessKind {
    /// Operation against a key holding the wrong kind of value
    WrongType,
    /// Bad argument, syntax error or unknown command
    InvalidArgument,
    /// EVALSHA for an unknown script
    NoScript,
    /// Server busy running a script
    Busy,
    /// Server still loading its dataset
    Loading,
    /// Write sent to a read-only replica
    ReadOnly,
    /// Multi-key operation during resharding, retry later
    TryAgain,
    /// MOVED / ASK reply
    Redirect,
    /// Redirect budget exhausted
    TooManyRedirects,
    /// EXEC refused because a queued command was rejected
    ExecAbort,
    /// Reply could not be converted into the requested type
    TypeConversion,
    /// Reply shape did not match the command
    UnexpectedReply,
    /// Anything the translator does not recognize
    Other,
}

impl DataAccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongType => "wrong type",
            Self::InvalidArgument => "invalid argument",
            Self::NoScript => "no script",
            Self::Busy => "busy",
            Self::Loading => "loading",
            Self::ReadOnly => "read only",
            Self::TryAgain => "try again",
            Self::Redirect => "redirect",
            Self::TooManyRedirects => "too many redirects",
            Self::ExecAbort => "exec abort",
            Self::TypeConversion => "type conversion",
            Self::UnexpectedReply => "unexpected reply",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DataAccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// slotwise error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedisError {
    /// Socket-level failure, timeout, closed link or exhausted pool.
    /// The connection it was observed on is broken.
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// The server (or reply conversion) rejected the operation
    #[error("Data access error ({kind}): {message}")]
    DataAccess {
        kind: DataAccessKind,
        message: String,
    },

    /// Operation not available against the current deployment shape
    #[error("Unsupported in this topology: {0}")]
    UnsupportedInTopology(String),

    /// Cluster topology could not be retrieved or is not usable
    #[error("Cluster state failure: {0}")]
    ClusterStateFailure(String),

    /// The API was driven in an order it does not allow
    #[error("Invalid API usage: {0}")]
    InvalidApiUsage(String),

    /// Client configuration rejected at build time
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RedisError {
    pub fn data_access(kind: DataAccessKind, message: impl Into<String>) -> Self {
        Self::DataAccess {
            kind,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::InvalidApiUsage(message.into())
    }

    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailure(_))
    }

    /// Data access sub-kind, if this is a data access error
    pub fn kind(&self) -> Option<DataAccessKind> {
        match self {
            Self::DataAccess { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The MOVED / ASK target carried by a redirect error
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            Self::DataAccess {
                kind: DataAccessKind::Redirect,
                message,
            } => parse_redirect(message),
            _ => None,
        }
    }
}
