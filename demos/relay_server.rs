//! Relay server example
//!
//! Run with: cargo run --example relay_server -- [OPTIONS]
//!
//! Examples:
//!   cargo run --example relay_server -- --token alice:secret-a --token bob:secret-b
//!   cargo run --example relay_server -- --music ./music --max-connections 500
//!
//! ## Connecting
//!
//! With websocat:
//!   websocat "ws://localhost:8080/ws?token=secret-a"
//!   {"type":"join_room","stream_id":"s1","role":"broadcaster"}
//!
//! ## Starting a call over HTTP
//!
//!   curl -H "Authorization: Bearer secret-a" -H "Content-Type: application/json" \
//!        -d '{"callee_id":"bob","type":"audio"}' http://localhost:8080/calls

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use realtime_rs::broadcast::BroadcastConfig;
use realtime_rs::call::CallConfig;
use realtime_rs::{RelayServer, ServerConfig, TokenTable, UserId};

#[derive(Parser, Debug)]
#[command(name = "relay_server")]
#[command(about = "Presence, call signaling, stream rooms and audio broadcast over WebSocket")]
struct Args {
    /// Address to bind to
    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Directory of audio files to broadcast (omit to disable the broadcast)
    #[arg(long, env = "RELAY_MUSIC_DIR")]
    music: Option<PathBuf>,

    /// Maximum concurrent WebSocket connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Seconds a call may ring before it is reclaimed
    #[arg(long, default_value_t = 45)]
    ring_timeout: u64,

    /// Session tokens as USER:TOKEN, repeatable
    #[arg(long = "token", value_parser = parse_token)]
    tokens: Vec<(String, String)>,
}

fn parse_token(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((user, token)) if !user.is_empty() && !token.is_empty() => {
            Ok((user.to_string(), token.to_string()))
        }
        _ => Err(format!("expected USER:TOKEN, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("realtime_rs=info")),
        )
        .init();

    let args = Args::parse();

    let tokens = Arc::new(TokenTable::new());
    for (user, token) in &args.tokens {
        tokens.insert(token.clone(), UserId::from(user.as_str()));
    }
    if args.tokens.is_empty() {
        let token = tokens.issue(&UserId::from("demo"));
        tracing::info!(user = "demo", token = %token, "No tokens given, issued one");
    }

    let mut config = ServerConfig::with_addr(args.bind)
        .max_connections(args.max_connections)
        .calls(CallConfig::default().ring_timeout(Duration::from_secs(args.ring_timeout)));
    if let Some(dir) = args.music {
        config = config.broadcast(BroadcastConfig::with_dir(dir));
    }

    let server = RelayServer::new(config, tokens);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!(stats = ?server.hub().stats().await, "Server stopped");
    Ok(())
}
