mod audio;
mod config;
mod net;
mod stream;

use std::net::{IpAddr, UdpSocket};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use audio::CpalSink;
use audio::capture::CaptureHandle;
use config::Command;
use stream::StreamSession;

/// Get the local IP address by creating a socket.
/// This doesn't actually send any data, just queries the local routing table.
fn get_local_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to create socket")?;
    socket
        .connect("8.8.8.8:80")
        .context("Failed to connect socket")?;
    let local_addr = socket.local_addr().context("Failed to get local address")?;
    Ok(local_addr.ip())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        error!("Application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let command = config::parse_args(std::env::args().skip(1))?;

    match command {
        Command::Serve { listen_addr } => {
            info!("Starting relay server on {}", listen_addr);
            if let Ok(local_ip) = get_local_ip() {
                let port = listen_addr.rsplit(':').next().unwrap_or("8000");
                info!("Other devices can join at ws://{}:{}{}", local_ip, port, net::WS_PATH);
            }
            net::server::run_server(&listen_addr).await
        }
        Command::Join {
            server_url,
            mode,
            listen_only,
        } => {
            info!("Joining {} ({:?})", server_url, mode);

            let sink = CpalSink::open()?;
            let session = StreamSession::start(sink, mode);

            // Latency readout: display-only, nothing consumes it internally.
            let stats = session.stats();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
                loop {
                    ticker.tick().await;
                    info!(
                        "interval={:.1}ms quality={:?} target={} depth={} played={} skipped={} dropped={} malformed={}",
                        stats.smoothed_interval_ms(),
                        stats.quality(),
                        stats.current_target(),
                        stats.queue_depth(),
                        stats.frames_played(),
                        stats.frames_skipped(),
                        stats.frames_dropped(),
                        stats.frames_malformed(),
                    );
                }
            });

            let (outgoing_tx, outgoing_rx) = tokio::sync::mpsc::unbounded_channel();
            let _capture = if listen_only {
                info!("Listen-only: not capturing audio");
                None
            } else {
                Some(CaptureHandle::start(outgoing_tx.clone())?)
            };

            let result = tokio::select! {
                result = net::client::run_client(&server_url, &session, outgoing_rx) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    Ok(())
                }
            };

            if let Err(e) = &result {
                warn!("Transport error: {e:#}");
            }
            session.stop().await;
            result
        }
    }
}
