//! Per-node connection pooling

use crate::config::ClientConfig;
use crate::connection::{CommandConnection, ConnectionHealth};
use crate::error::Result;
use crate::translator::{ErrorTranslator, RawFailure};
use crate::transport::{Transport, TransportFactory};
use crate::types::NodeAddress;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;

/// Source of connections for a node
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self, node: &NodeAddress) -> Result<CommandConnection>;

    async fn release(&self, connection: CommandConnection);
}

struct NodeEntry {
    idle: Mutex<Vec<Box<dyn Transport>>>,
    leases: Arc<Semaphore>,
}

/// Default [`ConnectionProvider`]: an idle list and a lease limit per node
pub struct NodePool {
    config: Arc<ClientConfig>,
    factory: Arc<dyn TransportFactory>,
    translator: Arc<dyn ErrorTranslator>,
    nodes: RwLock<HashMap<NodeAddress, Arc<NodeEntry>>>,
}

impl NodePool {
    pub fn new(
        config: Arc<ClientConfig>,
        factory: Arc<dyn TransportFactory>,
        translator: Arc<dyn ErrorTranslator>,
    ) -> Self {
        Self {
            config,
            factory,
            translator,
            nodes: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, node: &NodeAddress) -> Arc<NodeEntry> {
        if let Some(entry) = self.nodes.read().get(node) {
            return entry.clone();
        }
        let max_total = self.config.pool().max_total;
        self.nodes
            .write()
            .entry(node.clone())
            .or_insert_with(|| {
                Arc::new(NodeEntry {
                    idle: Mutex::new(Vec::new()),
                    leases: Arc::new(Semaphore::new(max_total)),
                })
            })
            .clone()
    }

    /// Idle connections currently retained for `node`
    pub fn idle_count(&self, node: &NodeAddress) -> usize {
        self.nodes
            .read()
            .get(node)
            .map(|e| e.idle.lock().len())
            .unwrap_or(0)
    }

    /// Leases currently handed out for `node`
    pub fn leased_count(&self, node: &NodeAddress) -> usize {
        self.nodes
            .read()
            .get(node)
            .map(|e| self.config.pool().max_total - e.leases.available_permits())
            .unwrap_or(0)
    }

    /// Close every idle connection
    pub async fn clear(&self) {
        let drained: Vec<Box<dyn Transport>> = {
            let nodes = self.nodes.read();
            nodes
                .values()
                .flat_map(|e| std::mem::take(&mut *e.idle.lock()))
                .collect()
        };
        for mut transport in drained {
            if let Err(e) = transport.close().await {
                debug!("Closing idle connection: {}", e);
            }
        }
    }

    async fn connect(&self, node: &NodeAddress) -> Result<CommandConnection> {
        let transport = self
            .factory
            .create(node, &self.config)
            .map_err(|e| self.translator.translate(RawFailure::Transport(e)))?;
        CommandConnection::open(
            node.clone(),
            transport,
            self.translator.clone(),
            &self.config,
        )
        .await
    }
}

#[async_trait]
impl ConnectionProvider for NodePool {
    async fn acquire(&self, node: &NodeAddress) -> Result<CommandConnection> {
        if !self.config.pool().enabled {
            return self.connect(node).await;
        }

        let entry = self.entry(node);
        let waited = self.config.pool().max_wait();
        let lease = match timeout(waited, entry.leases.clone().acquire_owned()).await {
            Ok(Ok(lease)) => lease,
            _ => {
                return Err(self.translator.translate(RawFailure::PoolExhausted {
                    node: node.clone(),
                    waited,
                }));
            }
        };

        loop {
            let idle = entry.idle.lock().pop();
            match idle {
                Some(transport) if transport.is_connected() => {
                    return Ok(CommandConnection::new(
                        node.clone(),
                        transport,
                        self.translator.clone(),
                        self.config.database(),
                    )
                    .with_lease(lease));
                }
                Some(_) => continue,
                None => break,
            }
        }

        let connection = self.connect(node).await?;
        Ok(connection.with_lease(lease))
    }

    async fn release(&self, mut connection: CommandConnection) {
        let reset = connection.reset().await;
        let node = connection.node().clone();

        if !self.config.pool().enabled {
            connection.close().await;
            return;
        }
        if let Err(e) = &reset {
            debug!("Dropping connection {} to {}: reset failed: {}", connection.id(), node, e);
        }

        let (mut transport, health) = connection.into_transport();
        if reset.is_ok() && health == ConnectionHealth::Healthy {
            let entry = self.entry(&node);
            let mut idle = entry.idle.lock();
            if idle.len() < self.config.pool().max_idle {
                idle.push(transport);
                return;
            }
        }
        if let Err(e) = transport.close().await {
            debug!("Closing released connection to {}: {}", node, e);
        }
    }
}
