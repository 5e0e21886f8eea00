//! TCP front door: handshake, then one debug session per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::config::{DebugServerConfig, PathCase};
use crate::controller::{Debugger, SessionController};
use crate::error::Result;
use crate::protocol::{DebugLocation, HandshakeResponse};
use crate::protocol_io::{MessageReader, MessageWriter};
use crate::runtime::DebugTarget;
use crate::session::DebugSession;

/// Location id used for every session.
pub const DEFAULT_LOCATION: &str = "default";

/// Source of controllers for incoming connections.
pub trait ControllerFactory: Send + Sync {
    fn debug_locations(&self) -> Vec<DebugLocation>;
    fn create_controller(&self, location: &str) -> Option<Arc<dyn SessionController>>;
}

/// Serves a single target; every connection gets a fresh [`Debugger`].
pub struct DebuggerFactory {
    target: Arc<dyn DebugTarget>,
    path_case: PathCase,
    description: String,
}

impl DebuggerFactory {
    pub fn new(
        target: Arc<dyn DebugTarget>,
        path_case: PathCase,
        description: impl Into<String>,
    ) -> Self {
        Self {
            target,
            path_case,
            description: description.into(),
        }
    }
}

impl ControllerFactory for DebuggerFactory {
    fn debug_locations(&self) -> Vec<DebugLocation> {
        vec![DebugLocation {
            id: DEFAULT_LOCATION.to_string(),
            description: self.description.clone(),
        }]
    }

    fn create_controller(&self, location: &str) -> Option<Arc<dyn SessionController>> {
        if location != DEFAULT_LOCATION {
            return None;
        }
        let debugger: Arc<dyn SessionController> =
            Debugger::new(Arc::clone(&self.target), self.path_case);
        Some(debugger)
    }
}

pub struct DebugServer {
    listener: TcpListener,
    endpoint: String,
    factory: Arc<dyn ControllerFactory>,
}

impl DebugServer {
    pub async fn bind(config: &DebugServerConfig, factory: Arc<dyn ControllerFactory>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "debug server listening");
        Ok(Self {
            listener,
            endpoint: config.endpoint.clone(),
            factory,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tracing::info!(%peer, "debug client connected");
            let factory = Arc::clone(&self.factory);
            let endpoint = self.endpoint.clone();
            tokio::spawn(async move {
                match serve_connection(stream, factory, endpoint).await {
                    Ok(()) => tracing::info!(%peer, "debug client finished"),
                    Err(err) => tracing::warn!(%peer, %err, "debug connection failed"),
                }
            });
        }
    }
}

/// Answers the handshake on `stream` and runs a session for the default location.
pub async fn serve_connection<S>(
    stream: S,
    factory: Arc<dyn ControllerFactory>,
    endpoint: String,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = MessageReader::new(read_half);
    let mut writer = MessageWriter::new(write_half, endpoint);

    let Some(handshake) = reader.read_packet().await? else {
        tracing::debug!("connection closed before handshake");
        return Ok(());
    };
    match serde_json::from_slice::<Value>(&handshake) {
        Ok(value) => tracing::debug!(handshake = %value, "handshake received"),
        Err(err) => tracing::debug!(%err, "handshake is not json"),
    }
    writer
        .write_message(&HandshakeResponse {
            success: true,
            locations: factory.debug_locations(),
        })
        .await?;

    let Some(controller) = factory.create_controller(DEFAULT_LOCATION) else {
        tracing::warn!(location = DEFAULT_LOCATION, "no controller for location");
        return writer.shutdown().await;
    };
    DebugSession::new(controller).run(reader, writer).await
}
