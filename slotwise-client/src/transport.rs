//! Transports: one bidirectional byte link to one node

use crate::config::ClientConfig;
use crate::resp::{Frame, FrameDecoder};
use crate::types::NodeAddress;
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Failures below the protocol level
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Connection closed by peer")]
    Closed,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Malformed reply: {0}")]
    Protocol(String),

    #[error("TLS unavailable: {0}")]
    TlsUnavailable(String),
}

/// A byte link to a single node.
///
/// Replies arrive strictly in request order; that is the only ordering
/// assumption the connection layer makes.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Read the next complete reply frame
    async fn receive(&mut self) -> Result<Frame, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// Creates (unconnected) transports per node. Custom factories are the hook
/// for TLS or any other socket setup.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        address: &NodeAddress,
        config: &ClientConfig,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Plain TCP transport
pub struct TcpTransport {
    address: NodeAddress,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
    buffer: BytesMut,
    decoder: FrameDecoder,
}

impl TcpTransport {
    pub fn new(address: NodeAddress, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout,
            read_timeout,
            stream: None,
            buffer: BytesMut::with_capacity(16 * 1024),
            decoder: FrameDecoder::new(),
        }
    }

    fn drop_stream(&mut self) {
        self.stream = None;
        self.buffer.clear();
        self.decoder.reset();
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let target = (self.address.host().to_string(), self.address.port());
        let stream = timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "connect",
                after: self.connect_timeout,
            })??;
        stream.set_nodelay(true)?;

        debug!("Connected to {}", self.address);
        self.stream = Some(stream);
        self.buffer.clear();
        self.decoder.reset();
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let written = async {
            stream.write_all(payload).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = written {
            self.drop_stream();
            return Err(e.into());
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.decoder.decode(&mut self.buffer) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => {
                    self.drop_stream();
                    return Err(e);
                }
            }

            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
            let read = timeout(self.read_timeout, stream.read_buf(&mut self.buffer)).await;
            match read {
                Ok(Ok(0)) => {
                    self.drop_stream();
                    return Err(TransportError::Closed);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.drop_stream();
                    return Err(e.into());
                }
                Err(_) => {
                    // Replies after a timeout would be misattributed
                    self.drop_stream();
                    return Err(TransportError::Timeout {
                        operation: "read",
                        after: self.read_timeout,
                    });
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            self.buffer.clear();
            self.decoder.reset();
            stream.shutdown().await?;
            debug!("Closed link to {}", self.address);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Factory for [`TcpTransport`]. Refuses TLS configurations: encryption
/// needs a custom [`TransportFactory`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransportFactory;

impl TransportFactory for TcpTransportFactory {
    fn create(
        &self,
        address: &NodeAddress,
        config: &ClientConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        if config.tls().enabled {
            return Err(TransportError::TlsUnavailable(format!(
                "TLS is enabled for {} but no TLS socket factory is configured",
                address
            )));
        }
        Ok(Box::new(TcpTransport::new(
            address.clone(),
            config.connect_timeout(),
            config.read_timeout(),
        )))
    }
}
