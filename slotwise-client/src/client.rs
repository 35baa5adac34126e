//! Client entry point

use crate::cluster::{CachingTopologyProvider, ClusterCommandExecutor, ClusterConnection};
use crate::config::ClientConfig;
use crate::connection::CommandConnection;
use crate::error::{RedisError, Result};
use crate::pool::{ConnectionProvider, NodePool};
use crate::translator::{DefaultTranslator, ErrorTranslator};
use crate::transport::{TcpTransportFactory, TransportFactory};
use crate::types::NodeAddress;
use std::sync::Arc;
use tracing::info;

/// Redis client
///
/// Owns the configuration and the per-node connection pool. Standalone
/// connections are leased with [`Client::connection`] and given back with
/// [`Client::release`]; [`Client::cluster`] builds a routing handle for
/// cluster deployments.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    pool: Arc<NodePool>,
}

impl Client {
    /// Create a client that talks TCP
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport_factory(config, Arc::new(TcpTransportFactory))
    }

    /// Create a client over a custom transport
    pub fn with_transport_factory(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self::with_translator(config, factory, Arc::new(DefaultTranslator))
    }

    /// Create a client with a custom transport and error translator
    pub fn with_translator(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
        translator: Arc<dyn ErrorTranslator>,
    ) -> Self {
        let config = Arc::new(config);
        info!(
            "Redis client configured for {} node(s), {:?} mode",
            config.nodes().len(),
            config.mode()
        );
        let pool = Arc::new(NodePool::new(config.clone(), factory, translator));
        Self { config, pool }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Lease a connection to the standalone server (the first configured
    /// node)
    pub async fn connection(&self) -> Result<CommandConnection> {
        if self.config.is_cluster() {
            return Err(RedisError::UnsupportedInTopology(
                "Single-node connections are not available in cluster mode; use cluster()".into(),
            ));
        }
        let node = self
            .config
            .nodes()
            .first()
            .ok_or_else(|| RedisError::Configuration("no nodes configured".into()))?;
        self.pool.acquire(node).await
    }

    /// Lease a connection to a specific node, in either mode
    pub async fn node_connection(&self, node: &NodeAddress) -> Result<CommandConnection> {
        self.pool.acquire(node).await
    }

    /// Give a leased connection back to the pool
    pub async fn release(&self, connection: CommandConnection) {
        self.pool.release(connection).await
    }

    /// Cluster handle seeded from the configured nodes
    pub fn cluster(&self) -> Result<ClusterConnection> {
        if !self.config.is_cluster() {
            return Err(RedisError::Configuration(
                "cluster() requires mode: cluster".into(),
            ));
        }
        let pool: Arc<dyn ConnectionProvider> = self.pool.clone();
        let topology = CachingTopologyProvider::new(
            self.config.nodes().to_vec(),
            pool.clone(),
            self.config.cluster().topology_ttl(),
        );
        let executor = ClusterCommandExecutor::new(
            Arc::new(topology),
            pool,
            self.config.cluster().max_redirects,
        );
        Ok(ClusterConnection::new(executor))
    }

    /// Close every idle pooled connection
    pub async fn shutdown(&self) {
        self.pool.clear().await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("nodes", &self.config.nodes())
            .field("mode", &self.config.mode())
            .finish()
    }
}
