//! The relay server.
//!
//! Accepts WebSocket clients and forwards every binary frame to all other
//! connected clients. No mixing, no inspection of the payload; latency
//! management happens entirely on the receive side of each client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{info, warn};

use crate::net::WS_PATH;

type ClientMap = Arc<Mutex<HashMap<u64, UnboundedSender<Message>>>>;

/// Bind `addr` and relay frames between clients until the process exits.
pub async fn run_server(addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {addr}"))?;
    info!("Relay server listening on {}", addr);
    serve_on(listener).await
}

async fn serve_on(listener: TcpListener) -> Result<()> {
    let clients: ClientMap = Arc::new(Mutex::new(HashMap::new()));
    let mut next_id = 0u64;

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        let id = next_id;
        next_id += 1;

        let clients = clients.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, peer, id, clients).await {
                warn!("Client {} ({}) error: {e:#}", id, peer);
            }
        });
    }
}

/// Only the advertised path completes the handshake; anything else gets a
/// plain 404 so a stray browser hit fails fast instead of half-joining.
fn check_path(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    if req.uri().path() == WS_PATH {
        Ok(resp)
    } else {
        let mut not_found = ErrorResponse::new(Some("not found".to_string()));
        *not_found.status_mut() = StatusCode::NOT_FOUND;
        Err(not_found)
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    clients: ClientMap,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .context("WebSocket handshake failed")?;
    let (mut write, mut read) = ws.split();

    // Writes to this client are funneled through a channel so the relay
    // never blocks one client's read loop on another client's socket.
    let (tx, mut rx) = unbounded_channel::<Message>();
    let total = {
        let mut clients = clients.lock().unwrap();
        clients.insert(id, tx);
        clients.len()
    };
    info!("Client connected: {} (total: {})", peer, total);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if write.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Binary(payload)) => {
                let clients = clients.lock().unwrap();
                for (other_id, sender) in clients.iter() {
                    if *other_id != id {
                        let _ = sender.send(Message::Binary(payload.clone()));
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Read error from {}: {}", peer, e);
                break;
            }
        }
    }

    let total = {
        let mut clients = clients.lock().unwrap();
        clients.remove(&id);
        clients.len()
    };
    writer.abort();
    info!("Client disconnected: {} (total: {})", peer, total);

    Ok(())
}
