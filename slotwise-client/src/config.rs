//! Client configuration
//!
//! [`ClientConfig`] is immutable once built. It is produced either by
//! [`ClientConfigBuilder`] or by deserializing YAML; both paths run the same
//! validation.

use crate::error::{RedisError, Result};
use crate::types::NodeAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Deployment shape the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Standalone,
    Cluster,
}

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Enable pooling. When disabled every released connection is closed.
    pub enabled: bool,

    /// Max concurrently leased connections per node
    pub max_total: usize,

    /// Idle connections retained per node
    pub max_idle: usize,

    /// Wait for a free lease (milliseconds)
    pub max_wait_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_total: 8,
            max_idle: 8,
            max_wait_ms: 2000,
        }
    }
}

impl PoolConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// TLS settings. Only consulted by transport factories; the built-in TCP
/// factory refuses `enabled: true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    pub enabled: bool,
    pub verify_hostname: bool,
    /// SNI / verification name override
    pub server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verify_hostname: true,
            server_name: None,
        }
    }
}

/// Cluster behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSettings {
    /// MOVED / ASK redirects followed per command
    pub max_redirects: u32,

    /// How long a fetched topology is served without re-querying (milliseconds)
    pub topology_ttl_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            topology_ttl_ms: 100,
        }
    }
}

impl ClusterSettings {
    pub fn topology_ttl(&self) -> Duration {
        Duration::from_millis(self.topology_ttl_ms)
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Immutable client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    nodes: Vec<NodeAddress>,
    #[serde(default)]
    mode: DeploymentMode,
    #[serde(default = "default_timeout_ms")]
    connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    read_timeout_ms: u64,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    database: u32,
    #[serde(default)]
    pool: PoolConfig,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default)]
    cluster: ClusterSettings,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RedisError::Configuration(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            RedisError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| RedisError::Configuration(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RedisError::Configuration(msg));

        if self.nodes.is_empty() {
            return invalid("at least one node address is required".into());
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return invalid("timeouts must be greater than zero".into());
        }
        if self.mode == DeploymentMode::Cluster && self.database != 0 {
            return invalid(format!(
                "cluster mode only supports database 0, got {}",
                self.database
            ));
        }
        if let Some(name) = &self.client_name {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return invalid(format!(
                    "client name '{}' must be non-empty without spaces",
                    name
                ));
            }
        }
        if self.pool.max_total == 0 {
            return invalid("pool.max_total must be at least 1".into());
        }
        if self.pool.max_idle > self.pool.max_total {
            return invalid(format!(
                "pool.max_idle ({}) exceeds pool.max_total ({})",
                self.pool.max_idle, self.pool.max_total
            ));
        }
        Ok(())
    }

    /// Standalone target, or the cluster seeds
    pub fn nodes(&self) -> &[NodeAddress] {
        &self.nodes
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn is_cluster(&self) -> bool {
        self.mode == DeploymentMode::Cluster
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn database(&self) -> u32 {
        self.database
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    pub fn cluster(&self) -> &ClusterSettings {
        &self.cluster
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig {
                nodes: Vec::new(),
                mode: DeploymentMode::Standalone,
                connect_timeout_ms: default_timeout_ms(),
                read_timeout_ms: default_timeout_ms(),
                client_name: None,
                database: 0,
                pool: PoolConfig::default(),
                tls: TlsConfig::default(),
                cluster: ClusterSettings::default(),
            },
        }
    }

    pub fn with_node(mut self, node: NodeAddress) -> Self {
        self.config.nodes.push(node);
        self
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeAddress>) -> Self {
        self.config.nodes.extend(nodes);
        self
    }

    pub fn with_mode(mut self, mode: DeploymentMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Shorthand for `with_mode(DeploymentMode::Cluster)`
    pub fn with_cluster_mode(self) -> Self {
        self.with_mode(DeploymentMode::Cluster)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = Some(name.into());
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.config.database = database;
        self
    }

    pub fn with_pooling(mut self, enabled: bool) -> Self {
        self.config.pool.enabled = enabled;
        self
    }

    pub fn with_pool_size(mut self, max_total: usize, max_idle: usize) -> Self {
        self.config.pool.max_total = max_total;
        self.config.pool.max_idle = max_idle;
        self
    }

    pub fn with_pool_max_wait(mut self, wait: Duration) -> Self {
        self.config.pool.max_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.config.cluster.max_redirects = max_redirects;
        self
    }

    pub fn with_topology_ttl(mut self, ttl: Duration) -> Self {
        self.config.cluster.topology_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
