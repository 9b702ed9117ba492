//! IPC Server - Unix socket server for application instances
//!
//! Accepts connections from application instances, dispatches commands to
//! the GatewayManager, and interleaves broadcast events (sync completions,
//! notifications) onto every connected stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::gateway::GatewayManager;
use crate::ipc::protocol::{parse_command, serialize_event, serialize_response, Response};
use crate::origin::OriginTransport;

/// IPC server that listens for commands from application instances
pub struct IpcServer<T: OriginTransport> {
    /// Gateway handling all commands
    gateway: Arc<GatewayManager<T>>,
    /// Socket listener
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<RwLock<u32>>,
}

impl<T: OriginTransport> IpcServer<T> {
    /// Create a new IPC server
    pub fn new(gateway: Arc<GatewayManager<T>>) -> Self {
        Self {
            gateway,
            listener: None,
            connection_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Bind the socket, replacing any stale socket file
    pub async fn start(&mut self) -> Result<()> {
        let socket_path = self.gateway.socket_path().to_path_buf();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind Unix socket at {:?}", socket_path))?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the accept loop
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let gateway = Arc::clone(&self.gateway);
                    let connection_count = Arc::clone(&self.connection_count);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, gateway, connection_count).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Remove the socket file
    pub async fn stop(&self) -> Result<()> {
        let socket_path = PathBuf::from(self.gateway.socket_path());
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).context("Failed to remove socket file")?;
        }
        info!("IPC server stopped");
        Ok(())
    }

    /// Get the number of active connections
    pub async fn connection_count(&self) -> u32 {
        *self.connection_count.read().await
    }
}

/// Handle a single application instance connection
async fn handle_connection<T: OriginTransport>(
    stream: UnixStream,
    gateway: Arc<GatewayManager<T>>,
    connection_count: Arc<RwLock<u32>>,
) -> Result<()> {
    {
        let mut count = connection_count.write().await;
        *count += 1;
        debug!(count = *count, "New connection");
    }

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    // All outgoing bytes funnel through one channel so responses and
    // broadcast events never interleave mid-line on the stream
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(32);

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                debug!(error = %e, "Connection dropped while writing");
                break;
            }
        }
    });

    // Forward broadcast events (sync completions, notifications) onto this
    // connection alongside command responses
    let mut events = gateway.subscribe();
    let event_tx = out_tx.clone();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(json) = serialize_event(&event) {
                        if event_tx.send(json).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Connection lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Read commands line by line (newline-delimited JSON)
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(command = %trimmed, "Received command");

                let response = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => gateway.handle_command(command).await,
                    Err(e) => {
                        error!(error = %e, command = %trimmed, "Failed to parse command");
                        Response::Error {
                            error: format!("Invalid command: {}", e),
                        }
                    }
                };

                match serialize_response(&response) {
                    Ok(json) => {
                        if out_tx.send(json).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    event_task.abort();
    drop(out_tx);
    let _ = writer_task.await;

    {
        let mut count = connection_count.write().await;
        *count = count.saturating_sub(1);
        debug!(count = *count, "Connection ended");
    }

    Ok(())
}
