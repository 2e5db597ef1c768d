//! Client side of the transport.
//!
//! Maintains one WebSocket connection to the relay server: arriving binary
//! messages are stamped and fed into the stream session, captured frames go
//! out on the same socket. A closed or failed connection is recoverable:
//! the client reconnects with a fixed backoff and the stream core simply
//! sees ingestion pause, then resume.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::stream::session::StreamSession;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Connect to `url` and pump frames both ways until the session or the
/// outgoing channel goes away. Reconnects forever on failure.
pub async fn run_client(
    url: &str,
    session: &StreamSession,
    mut outgoing: UnboundedReceiver<Vec<u8>>,
) -> Result<()> {
    // Fail fast on an address that can never work.
    url::Url::parse(url).context("Invalid server URL")?;

    loop {
        match connect_async(url).await {
            Ok((ws, _response)) => {
                info!("Connected to {}", url);
                if let Err(e) = pump(ws, session, &mut outgoing).await {
                    warn!("Connection lost: {e:#}");
                }
            }
            Err(e) => {
                warn!("Failed to connect to {}: {e}", url);
            }
        }

        info!("Reconnecting in {:?}", RECONNECT_BACKOFF);
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}

async fn pump<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    session: &StreamSession,
    outgoing: &mut UnboundedReceiver<Vec<u8>>,
) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Binary(payload))) => {
                    session.frame_arrived(payload.to_vec());
                }
                Some(Ok(Message::Close(_))) | None => {
                    anyhow::bail!("server closed the connection");
                }
                Some(Ok(other)) => {
                    debug!("Ignoring non-binary message: {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket read failed");
                }
            },
            payload = outgoing.recv() => match payload {
                Some(payload) => {
                    write
                        .send(Message::Binary(payload.into()))
                        .await
                        .context("WebSocket send failed")?;
                }
                None => {
                    // Capture side is gone; keep receiving only.
                    debug!("Outgoing channel closed, listen-only from here");
                    loop {
                        match read.next().await {
                            Some(Ok(Message::Binary(payload))) => {
                                session.frame_arrived(payload.to_vec());
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                anyhow::bail!("server closed the connection");
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                return Err(e).context("WebSocket read failed");
                            }
                        }
                    }
                }
            },
        }
    }
}
