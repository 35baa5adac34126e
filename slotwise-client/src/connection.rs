//! Single-node command connection
//!
//! A [`CommandConnection`] owns one transport to one node and runs in one of
//! three mutually exclusive modes:
//!
//! - **direct**: every command is sent and its reply read before returning
//! - **pipelined**: commands are buffered and sent as one write on [`flush`]
//! - **transactional**: commands are buffered and sent wrapped in
//!   `MULTI`/`EXEC` on [`commit`]
//!
//! Any connection-level failure marks the connection broken; a broken
//! connection refuses further commands and is discarded by the pool.
//!
//! [`flush`]: CommandConnection::flush
//! [`commit`]: CommandConnection::commit

use crate::cmd::{Cmd, ToArg};
use crate::config::ClientConfig;
use crate::error::{RedisError, Result};
use crate::pipeline::{BatchResults, Execution, Pending};
use crate::resp::Frame;
use crate::transactions::TransactionOutcome;
use crate::translator::{ErrorTranslator, RawFailure};
use crate::transport::Transport;
use crate::types::NodeAddress;
use crate::value::{CommandResult, FromValue, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Health reported when a connection is closed or returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    Healthy,
    Broken,
}

/// Commands managed by the connection itself
const CONTROL_COMMANDS: &[&str] = &["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH"];

#[derive(Debug, Default)]
struct QueuedBatch {
    id: u64,
    commands: Vec<Cmd>,
    // (index, database) of each queued SELECT
    selects: Vec<(usize, u32)>,
}

impl QueuedBatch {
    fn new(id: u64) -> Self {
        Self {
            id,
            commands: Vec::new(),
            selects: Vec::new(),
        }
    }

    fn push(&mut self, cmd: Cmd) -> Pending<Value> {
        let index = self.commands.len();
        if let Some(db) = select_target(&cmd) {
            self.selects.push((index, db));
        }
        self.commands.push(cmd);
        Pending::new(self.id, index)
    }

    /// Database the link ends up on once `results` are known
    fn selected_after(&self, results: &[CommandResult]) -> Option<u32> {
        self.selects
            .iter()
            .filter(|(index, _)| matches!(results.get(*index), Some(Ok(_))))
            .map(|&(_, db)| db)
            .last()
    }
}

fn select_target(cmd: &Cmd) -> Option<u32> {
    if cmd.name() != "SELECT" {
        return None;
    }
    cmd.args()
        .first()
        .and_then(|a| std::str::from_utf8(a).ok())
        .and_then(|s| s.parse().ok())
}

#[derive(Debug)]
enum Mode {
    Direct,
    Pipelined(QueuedBatch),
    Transaction(QueuedBatch),
}

impl Mode {
    fn name(&self) -> &'static str {
        match self {
            Mode::Direct => "direct",
            Mode::Pipelined(_) => "pipelined",
            Mode::Transaction(_) => "transactional",
        }
    }
}

/// A command connection bound to one node for its lifetime
pub struct CommandConnection {
    id: Uuid,
    node: NodeAddress,
    transport: Box<dyn Transport>,
    translator: Arc<dyn ErrorTranslator>,
    mode: Mode,
    watching: bool,
    broken: bool,
    database: u32,
    selected_db: u32,
    next_batch: u64,
    lease: Option<OwnedSemaphorePermit>,
}

impl CommandConnection {
    /// Wrap an already connected transport whose selected database is
    /// `database`
    pub fn new(
        node: NodeAddress,
        transport: Box<dyn Transport>,
        translator: Arc<dyn ErrorTranslator>,
        database: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            node,
            transport,
            translator,
            mode: Mode::Direct,
            watching: false,
            broken: false,
            database,
            selected_db: database,
            next_batch: 0,
            lease: None,
        }
    }

    /// Connect the transport and run the handshake (`CLIENT SETNAME`,
    /// `SELECT`) from `config`
    pub async fn open(
        node: NodeAddress,
        mut transport: Box<dyn Transport>,
        translator: Arc<dyn ErrorTranslator>,
        config: &ClientConfig,
    ) -> Result<Self> {
        if let Err(e) = transport.connect().await {
            return Err(translator.translate(RawFailure::Transport(e)));
        }

        let mut connection = Self::new(node, transport, translator, 0);
        connection.database = config.database();
        if let Err(e) = connection.handshake(config).await {
            warn!("Handshake with {} failed: {}", connection.node, e);
            connection.close().await;
            return Err(e);
        }

        debug!("Connection {} opened to {}", connection.id, connection.node);
        Ok(connection)
    }

    async fn handshake(&mut self, config: &ClientConfig) -> Result<()> {
        if let Some(name) = config.client_name() {
            self.query::<()>(&Cmd::new("CLIENT").arg("SETNAME").arg(name))
                .await?;
        }
        if config.database() != 0 {
            self.query::<()>(&Cmd::new("SELECT").arg(config.database()))
                .await?;
            self.selected_db = config.database();
        }
        Ok(())
    }

    pub(crate) fn with_lease(mut self, lease: OwnedSemaphorePermit) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn node(&self) -> &NodeAddress {
        &self.node
    }

    pub fn is_pipelined(&self) -> bool {
        matches!(self.mode, Mode::Pipelined(_))
    }

    pub fn is_in_transaction(&self) -> bool {
        matches!(self.mode, Mode::Transaction(_))
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn is_connected(&self) -> bool {
        !self.broken && self.transport.is_connected()
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Database currently selected on the link
    pub fn selected_db(&self) -> u32 {
        self.selected_db
    }

    pub fn health(&self) -> ConnectionHealth {
        if self.is_connected() {
            ConnectionHealth::Healthy
        } else {
            ConnectionHealth::Broken
        }
    }

    /// Run a command in the current mode
    pub async fn execute(&mut self, cmd: Cmd) -> Result<Execution<Value>> {
        let name = cmd.name();
        if CONTROL_COMMANDS.contains(&name.as_str()) {
            return Err(RedisError::usage(format!(
                "{} is managed by the connection; use watch/unwatch/begin_transaction/commit/discard",
                name
            )));
        }
        self.ensure_usable()?;

        if let Mode::Pipelined(batch) | Mode::Transaction(batch) = &mut self.mode {
            return Ok(Execution::Queued(batch.push(cmd)));
        }

        let value = self.round_trip(&cmd).await?;
        if let Some(db) = select_target(&cmd) {
            self.selected_db = db;
        }
        Ok(Execution::Done(value))
    }

    /// Typed form of [`execute`](Self::execute)
    pub async fn execute_as<T: FromValue>(&mut self, cmd: Cmd) -> Result<Execution<T>> {
        self.execute(cmd).await?.convert()
    }

    /// Direct-mode round trip, refused while batching
    pub async fn query<T: FromValue>(&mut self, cmd: &Cmd) -> Result<T> {
        if !matches!(self.mode, Mode::Direct) {
            return Err(RedisError::usage(format!(
                "query requires direct mode, connection is {}",
                self.mode.name()
            )));
        }
        self.ensure_usable()?;
        T::from_value(self.round_trip(cmd).await?)
    }

    /// Enter pipelined mode. Idempotent.
    pub fn begin_pipeline(&mut self) -> Result<()> {
        match self.mode {
            Mode::Pipelined(_) => Ok(()),
            Mode::Transaction(_) => Err(RedisError::usage(
                "cannot open a pipeline while a transaction is open",
            )),
            Mode::Direct => {
                let id = self.next_batch_id();
                self.mode = Mode::Pipelined(QueuedBatch::new(id));
                Ok(())
            }
        }
    }

    /// Send every buffered command in one write, read one reply per command
    /// and return to direct mode
    pub async fn flush(&mut self) -> Result<BatchResults> {
        let batch = match std::mem::replace(&mut self.mode, Mode::Direct) {
            Mode::Pipelined(batch) => batch,
            Mode::Direct => return Ok(BatchResults::new(self.next_batch_id(), Vec::new())),
            transaction @ Mode::Transaction(_) => {
                self.mode = transaction;
                return Err(RedisError::usage(
                    "cannot flush while a transaction is open; use commit",
                ));
            }
        };

        if batch.commands.is_empty() {
            return Ok(BatchResults::new(batch.id, Vec::new()));
        }
        self.ensure_usable()?;

        let mut payload = Vec::new();
        for cmd in &batch.commands {
            cmd.encode(&mut payload);
        }
        debug!(
            "Connection {} flushing {} pipelined command(s)",
            self.id,
            batch.commands.len()
        );

        let frames = self.exchange(&payload, batch.commands.len()).await?;
        let results: Vec<CommandResult> = frames.into_iter().map(|f| self.resolve(f)).collect();
        if let Some(db) = batch.selected_after(&results) {
            self.selected_db = db;
        }
        Ok(BatchResults::new(batch.id, results))
    }

    /// Enter transactional mode. Idempotent.
    pub fn begin_transaction(&mut self) -> Result<()> {
        match self.mode {
            Mode::Transaction(_) => Ok(()),
            Mode::Pipelined(_) => Err(RedisError::usage(
                "cannot begin a transaction while a pipeline is open",
            )),
            Mode::Direct => {
                let id = self.next_batch_id();
                self.mode = Mode::Transaction(QueuedBatch::new(id));
                Ok(())
            }
        }
    }

    /// Watch keys for the next transaction. Sent immediately.
    pub async fn watch<K: ToArg>(&mut self, keys: &[K]) -> Result<()> {
        if !matches!(self.mode, Mode::Direct) {
            return Err(RedisError::usage(format!(
                "WATCH is not allowed while the connection is {}",
                self.mode.name()
            )));
        }
        if keys.is_empty() {
            return Err(RedisError::usage("WATCH requires at least one key"));
        }
        self.ensure_usable()?;

        let mut cmd = Cmd::new("WATCH");
        for key in keys {
            cmd.push_key(key);
        }
        self.round_trip(&cmd).await?;
        self.watching = true;
        Ok(())
    }

    pub async fn unwatch(&mut self) -> Result<()> {
        if !matches!(self.mode, Mode::Direct) {
            return Err(RedisError::usage(format!(
                "UNWATCH is not allowed while the connection is {}",
                self.mode.name()
            )));
        }
        self.ensure_usable()?;
        self.round_trip(&Cmd::new("UNWATCH")).await?;
        self.watching = false;
        Ok(())
    }

    /// Send `MULTI`, the queued commands and `EXEC` as one batch
    pub async fn commit(&mut self) -> Result<TransactionOutcome> {
        let batch = match std::mem::replace(&mut self.mode, Mode::Direct) {
            Mode::Transaction(batch) => batch,
            other => {
                self.mode = other;
                return Err(RedisError::usage(
                    "No ongoing transaction. Did you forget to call begin_transaction?",
                ));
            }
        };
        self.ensure_usable()?;

        let queued = batch.commands.len();
        let mut payload = Vec::new();
        Cmd::new("MULTI").encode(&mut payload);
        for cmd in &batch.commands {
            cmd.encode(&mut payload);
        }
        Cmd::new("EXEC").encode(&mut payload);

        let mut frames = self.exchange(&payload, queued + 2).await?.into_iter();
        // EXEC clears watches whatever its outcome
        self.watching = false;

        if let Some(Frame::Error(message)) = frames.next() {
            return Err(self.reply_error(message));
        }
        let mut queue_error = None;
        for frame in frames.by_ref().take(queued) {
            if let Frame::Error(message) = frame {
                queue_error.get_or_insert(message);
            }
        }

        match frames.next() {
            Some(Frame::Array(Some(items))) => {
                let results: Vec<CommandResult> =
                    items.into_iter().map(|f| self.resolve(f)).collect();
                if let Some(db) = batch.selected_after(&results) {
                    self.selected_db = db;
                }
                Ok(TransactionOutcome::Committed(BatchResults::new(
                    batch.id, results,
                )))
            }
            Some(Frame::Array(None)) | Some(Frame::Bulk(None)) => {
                info!(
                    "Transaction on connection {} aborted: watched key changed",
                    self.id
                );
                Ok(TransactionOutcome::Aborted)
            }
            Some(Frame::Error(message)) => {
                let message = match queue_error {
                    Some(first) => format!("{} (first queued error: {})", message, first),
                    None => message,
                };
                Err(self.reply_error(message))
            }
            other => Err(self.fail(RawFailure::UnexpectedReply(format!(
                "expected EXEC reply, got {:?}",
                other
            )))),
        }
    }

    /// Drop the open transaction and any watches. Nothing queued is applied.
    pub async fn discard(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.mode, Mode::Direct) {
            Mode::Transaction(batch) => {
                debug!(
                    "Connection {} discarding {} queued command(s)",
                    self.id,
                    batch.commands.len()
                );
            }
            other => {
                self.mode = other;
                return Err(RedisError::usage("No ongoing transaction to discard"));
            }
        }
        if self.watching && !self.broken {
            self.unwatch().await?;
        }
        Ok(())
    }

    /// Return the link to a clean direct-mode state before reuse: drop
    /// batches, clear watches, restore the configured database
    pub async fn reset(&mut self) -> Result<()> {
        self.abandon_batch();
        if self.broken {
            return Ok(());
        }
        if self.watching {
            self.unwatch().await?;
        }
        if self.selected_db != self.database {
            self.query::<()>(&Cmd::new("SELECT").arg(self.database))
                .await?;
            self.selected_db = self.database;
        }
        Ok(())
    }

    /// Close the transport. Buffered commands are dropped unsent.
    pub async fn close(mut self) -> ConnectionHealth {
        self.abandon_batch();
        let health = self.health();
        if let Err(e) = self.transport.close().await {
            debug!("Closing connection {} to {}: {}", self.id, self.node, e);
        }
        health
    }

    /// Release the transport to the pool, dropping the lease
    pub(crate) fn into_transport(self) -> (Box<dyn Transport>, ConnectionHealth) {
        let health = self.health();
        (self.transport, health)
    }

    fn abandon_batch(&mut self) {
        match std::mem::replace(&mut self.mode, Mode::Direct) {
            Mode::Pipelined(batch) | Mode::Transaction(batch) if !batch.commands.is_empty() => {
                debug!(
                    "Connection {} dropping {} unsent command(s)",
                    self.id,
                    batch.commands.len()
                );
            }
            _ => {}
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.broken {
            return Err(RedisError::ConnectionFailure(format!(
                "connection {} to {} is broken",
                self.id, self.node
            )));
        }
        Ok(())
    }

    fn next_batch_id(&mut self) -> u64 {
        self.next_batch += 1;
        self.next_batch
    }

    async fn round_trip(&mut self, cmd: &Cmd) -> Result<Value> {
        let frame = self
            .exchange(&cmd.to_bytes(), 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RedisError::ConnectionFailure("no reply received".into()))?;
        self.resolve(frame)
    }

    /// Write `payload`, then read exactly `replies` frames
    async fn exchange(&mut self, payload: &[u8], replies: usize) -> Result<Vec<Frame>> {
        if let Err(e) = self.transport.send(payload).await {
            return Err(self.fail(RawFailure::Transport(e)));
        }
        let mut frames = Vec::with_capacity(replies);
        for _ in 0..replies {
            match self.transport.receive().await {
                Ok(frame) => frames.push(frame),
                Err(e) => return Err(self.fail(RawFailure::Transport(e))),
            }
        }
        Ok(frames)
    }

    fn resolve(&self, frame: Frame) -> CommandResult {
        Value::try_from_frame(frame).map_err(|message| self.reply_error(message))
    }

    fn reply_error(&self, message: String) -> RedisError {
        self.translator.translate(RawFailure::ErrorReply(message))
    }

    fn fail(&mut self, failure: RawFailure) -> RedisError {
        let error = self.translator.translate(failure);
        if error.is_connection_failure() && !self.broken {
            warn!(
                "Connection {} to {} marked broken: {}",
                self.id, self.node, error
            );
            self.broken = true;
        }
        error
    }
}

impl fmt::Debug for CommandConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandConnection")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("mode", &self.mode.name())
            .field("watching", &self.watching)
            .field("broken", &self.broken)
            .field("selected_db", &self.selected_db)
            .finish()
    }
}
