//! Unix domain socket server for IPC

use crate::service::ServiceHandle;
use anyhow::{Context, Result};
use std::path::Path;
use studytime_ipc::{Command, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Bind `socket_path` and forward every command to the timer service.
pub async fn serve(socket_path: &Path, handle: ServiceHandle) -> Result<()> {
    // Remove old socket if it exists
    let _ = std::fs::remove_file(socket_path);

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind IPC socket at {:?}", socket_path))?;
    info!("IPC server listening on {:?}", socket_path);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, handle).await {
                        error!("Error handling client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, handle: ServiceHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    // Read command
    reader.read_line(&mut line).await?;
    let response = match serde_json::from_str::<Command>(line.trim_end()) {
        Ok(command) => {
            debug!("IPC command: {:?}", command);
            handle.send(command).await?
        }
        Err(e) => {
            warn!("Rejecting malformed IPC command: {}", e);
            Response::Error(format!("Invalid command: {}", e))
        }
    };

    // Send response
    let mut response_json = serde_json::to_vec(&response)?;
    response_json.push(b'\n');
    writer.write_all(&response_json).await?;
    writer.shutdown().await?;

    Ok(())
}
