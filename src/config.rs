//! Runtime configuration.

use anyhow::Result;

use crate::net::DEFAULT_PORT;
use crate::stream::control::LatencyMode;

/// Env fallback for the serve listen address.
const ENV_LISTEN_ADDR: &str = "PARTYLINE_LISTEN_ADDR";
/// Env fallback for the join server URL.
const ENV_SERVER_URL: &str = "PARTYLINE_SERVER_URL";

#[derive(Clone, Debug)]
pub enum Command {
    /// Run the relay server.
    Serve { listen_addr: String },
    /// Join a party: capture the mic, play everyone else.
    Join {
        server_url: String,
        mode: LatencyMode,
        /// Receive and play only, no capture.
        listen_only: bool,
    },
}

/// Parse the command line, with env fallbacks for the addresses.
/// Kept deliberately simple:
///
/// ```text
/// partyline serve [LISTEN_ADDR]          (or PARTYLINE_LISTEN_ADDR)
/// partyline join [URL] [--normal-latency] [--listen-only]
///                                        (or PARTYLINE_SERVER_URL)
/// ```
pub fn parse_args(args: impl Iterator<Item = String>) -> Result<Command> {
    parse(args, |key| std::env::var(key).ok())
}

fn parse(
    args: impl Iterator<Item = String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Command> {
    let args: Vec<String> = args.collect();

    match args.first().map(String::as_str) {
        Some("serve") => {
            let listen_addr = args
                .get(1)
                .cloned()
                .or_else(|| env(ENV_LISTEN_ADDR))
                .unwrap_or_else(|| format!("0.0.0.0:{DEFAULT_PORT}"));
            Ok(Command::Serve { listen_addr })
        }
        Some("join") => {
            let server_url = args
                .get(1)
                .filter(|a| !a.starts_with("--"))
                .cloned()
                .or_else(|| env(ENV_SERVER_URL))
                .ok_or_else(|| {
                    anyhow::anyhow!("join requires a server URL (or {ENV_SERVER_URL})")
                })?;
            let mode = if args.iter().any(|a| a == "--normal-latency") {
                LatencyMode::Normal
            } else {
                LatencyMode::LowLatency
            };
            let listen_only = args.iter().any(|a| a == "--listen-only");
            Ok(Command::Join {
                server_url,
                mode,
                listen_only,
            })
        }
        _ => anyhow::bail!(
            "usage: partyline serve [LISTEN_ADDR] | partyline join <URL> [--normal-latency] [--listen-only]"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_serve_defaults() {
        let cmd = parse(["serve".to_string()].into_iter(), no_env).unwrap();
        match cmd {
            Command::Serve { listen_addr } => assert_eq!(listen_addr, "0.0.0.0:8000"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_serve_env_fallback() {
        let cmd = parse(["serve".to_string()].into_iter(), |key| {
            (key == ENV_LISTEN_ADDR).then(|| "127.0.0.1:9001".to_string())
        })
        .unwrap();
        match cmd {
            Command::Serve { listen_addr } => assert_eq!(listen_addr, "127.0.0.1:9001"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_serve_arg_beats_env() {
        let cmd = parse(
            ["serve".to_string(), "0.0.0.0:7000".to_string()].into_iter(),
            |key| (key == ENV_LISTEN_ADDR).then(|| "127.0.0.1:9001".to_string()),
        )
        .unwrap();
        match cmd {
            Command::Serve { listen_addr } => assert_eq!(listen_addr, "0.0.0.0:7000"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_join_flags() {
        let cmd = parse(
            [
                "join".to_string(),
                "ws://10.0.0.2:8000/ws".to_string(),
                "--normal-latency".to_string(),
                "--listen-only".to_string(),
            ]
            .into_iter(),
            no_env,
        )
        .unwrap();
        match cmd {
            Command::Join {
                server_url,
                mode,
                listen_only,
            } => {
                assert_eq!(server_url, "ws://10.0.0.2:8000/ws");
                assert_eq!(mode, LatencyMode::Normal);
                assert!(listen_only);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_join_url_from_env() {
        let cmd = parse(
            ["join".to_string(), "--listen-only".to_string()].into_iter(),
            |key| (key == ENV_SERVER_URL).then(|| "ws://10.0.0.3:8000/ws".to_string()),
        )
        .unwrap();
        match cmd {
            Command::Join {
                server_url,
                listen_only,
                ..
            } => {
                assert_eq!(server_url, "ws://10.0.0.3:8000/ws");
                assert!(listen_only);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_join_requires_url() {
        assert!(parse(["join".to_string()].into_iter(), no_env).is_err());
    }

    #[test]
    fn test_default_mode_is_low_latency() {
        let cmd = parse(
            ["join".to_string(), "ws://host/ws".to_string()].into_iter(),
            no_env,
        )
        .unwrap();
        match cmd {
            Command::Join { mode, .. } => assert_eq!(mode, LatencyMode::LowLatency),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
