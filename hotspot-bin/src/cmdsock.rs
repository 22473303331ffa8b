use anyhow::Result;
use hotspot_core::{SessionManager, TerminationReason};
use hotspot_ipc::{Command, Response};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

async fn handle_disconnect(ip: Ipv4Addr, manager: Arc<SessionManager>) -> Response {
    info!("Received Disconnect command for IP {}", ip);

    // An operator pulling the plug counts as a logout on the user's behalf.
    if manager.terminate(ip, TerminationReason::UserLogout).await {
        Response::Success
    } else {
        let msg = format!("Session not found for IP {}", ip);
        warn!("{}", msg);
        Response::Error(msg)
    }
}

async fn handle_connection(mut stream: UnixStream, manager: Arc<SessionManager>) -> Result<()> {
    info!("Accepted new cmdsock connection");

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response = match serde_json::from_slice::<Command>(&buffer) {
        Ok(Command::List) => {
            info!("Received List command");
            Response::List(manager.status_snapshot().await)
        }
        Ok(Command::Disconnect { ip }) => handle_disconnect(ip, manager).await,
        Err(e) => {
            warn!("Failed to deserialize command: {}", e);
            Response::Error(format!("Deserialization failed: {}", e))
        }
    };

    let serialized = serde_json::to_vec(&response)?;
    stream.write_all(&serialized).await?;
    stream.shutdown().await?;

    Ok(())
}

pub async fn run_cmdsock_listener(path: String, manager: Arc<SessionManager>) -> Result<()> {
    let socket_path = Path::new(&path);

    // Remove the socket file if it already exists
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(&path)?;
    info!("Cmdsock listener started on {}", path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let manager = manager.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, manager).await {
                        error!("Error handling cmdsock connection: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Cmdsock accept error: {}", e);
            }
        }
    }
}
