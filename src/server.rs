//! TCP transport: one dialogue pipeline per client connection.
//!
//! The wire protocol is raw PCM16 bytes in both directions. A reader task
//! forwards incoming bytes into the pipeline head queue and injects the
//! end-of-stream sentinel when the client disconnects; the writer loop
//! drains the tail queue back to the socket. When the tail sentinel
//! arrives the whole chain has wound down and the pipeline is stopped.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::coordinator::{Collaborators, Pipeline};
use crate::pipeline::queue::Received;
use crate::pipeline::stage::POLL_TIMEOUT;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// Builds one set of collaborators per accepted connection.
pub type CollaboratorFactory = dyn Fn(&PipelineConfig) -> Collaborators + Send + Sync;

/// Read buffer for the client socket.
const READ_BUFFER: usize = 4096;

/// Accepting socket plus the configuration each pipeline is built from.
pub struct Server {
    listener: TcpListener,
    config: PipelineConfig,
}

impl Server {
    /// Bind the configured address.
    pub async fn bind(config: PipelineConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "listening");
        Ok(Self { listener, config })
    }

    /// The bound address (useful when the port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one pipeline per client.
    pub async fn run(self, factory: Arc<CollaboratorFactory>) -> Result<()> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            let config = self.config.clone();
            let factory = Arc::clone(&factory);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, peer, config, factory).await {
                    error!(peer = %peer, error = %e, "connection failed");
                }
            });
        }
    }
}

/// Drive one client connection to completion.
async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    config: PipelineConfig,
    factory: Arc<CollaboratorFactory>,
) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(peer = %peer, session = %session_id, "connection accepted");

    let mut pipeline = Pipeline::new(config.clone());
    pipeline.build(factory(&config))?;
    pipeline.coordination().set_session_id(&session_id);
    let input = pipeline.input()?;
    let mut output = pipeline.take_output()?;
    pipeline.start()?;

    let (mut reader, mut writer) = socket.into_split();

    let read_task = tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    input.send_sentinel();
                    break;
                }
                Ok(n) => {
                    if !input.send(Bytes::copy_from_slice(&buf[..n])) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "socket read failed");
                    input.send_sentinel();
                    break;
                }
            }
        }
    });

    let mut write_error = None;
    loop {
        match output.recv_timeout(POLL_TIMEOUT).await {
            Received::Payload(chunk) => {
                if let Err(e) = writer.write_all(&chunk).await {
                    write_error = Some(e);
                    break;
                }
            }
            Received::Sentinel | Received::Closed => break,
            Received::Empty => {}
        }
    }

    pipeline.stop().await?;
    read_task.abort();
    let _ = read_task.await;

    info!(peer = %peer, session = %session_id, "connection closed");
    match write_error {
        Some(e) => Err(PipelineError::Transport(format!("socket write failed: {e}"))),
        None => Ok(()),
    }
}
