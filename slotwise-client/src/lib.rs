//! # Slotwise
//!
//! Async Redis client for standalone servers and Redis Cluster.
//!
//! ## Features
//!
//! - **Typed commands**: strings, hashes, lists, sets, sorted sets, keys and
//!   server commands over any connection
//! - **Pipelines**: queue commands and send them in a single write
//! - **Transactions**: `MULTI` / `EXEC` with optimistic `WATCH`
//! - **Cluster routing**: hash slots, `MOVED` / `ASK` redirects, a cached
//!   topology and per-node fan-out
//! - **Pooling**: per-node connection pools with a lease limit
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slotwise_client::{Client, ClientConfig, Commands, NodeAddress};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .with_node(NodeAddress::new("127.0.0.1", 6379))
//!         .build()?;
//!     let client = Client::new(config);
//!
//!     let mut conn = client.connection().await?;
//!     conn.strings().set("user:1", "John Doe").await?;
//!     let value: Option<String> = conn.strings().get("user:1").await?.done()?;
//!     println!("Value: {:?}", value);
//!     client.release(conn).await;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod cluster;
pub mod cmd;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod hash;
pub mod keys;
pub mod kv;
pub mod list;
pub mod pipeline;
pub mod pool;
pub mod resp;
pub mod server;
pub mod set;
pub mod sorted_set;
pub mod transactions;
pub mod translator;
pub mod transport;
pub mod types;
pub mod value;

pub use client::Client;
pub use cluster::{ClusterConnection, MultiNodeResult, NodeRef, NodeResult, SlotMode};
pub use cmd::{Cmd, ToArg};
pub use commands::{CommandTarget, Commands};
pub use config::{ClientConfig, ClientConfigBuilder, DeploymentMode, PoolConfig, TlsConfig};
pub use connection::{CommandConnection, ConnectionHealth};
pub use error::{DataAccessKind, RedisError, Result};
pub use hash::HashManager;
pub use keys::KeyManager;
pub use kv::StringManager;
pub use list::ListManager;
pub use pipeline::{BatchResults, Execution, Pending};
pub use pool::{ConnectionProvider, NodePool};
pub use server::ServerManager;
pub use set::SetManager;
pub use sorted_set::SortedSetManager;
pub use transactions::TransactionOutcome;
pub use translator::{DefaultTranslator, ErrorTranslator};
pub use transport::{Transport, TransportError, TransportFactory};
pub use types::NodeAddress;
pub use value::{CommandResult, FromValue, ScoredMember, ScoredMembers, Value};
