//! WebSocket transport.
//!
//! The wire protocol is the simplest thing that works: every binary
//! WebSocket message is one raw PCM frame payload. The server is a dumb
//! relay that forwards each client's frames to every other client; the
//! client timestamps arriving frames and hands them to the stream session.

pub mod client;
pub mod server;

pub const DEFAULT_PORT: u16 = 8000;
pub const WS_PATH: &str = "/ws";
