//! USB identifier agent, host simulation.
//!
//! Runs the full agent loop against a simulated radio and an in-process
//! identity server, with the real captive portal served over Axum. Useful
//! for developing the protocol and the portal without hardware:
//!
//! ```text
//! RUST_LOG=debug cargo run -p usbid-agent-linux
//! # then open http://localhost:8080 and "provision" the unit
//! ```
//!
//! State lives under `$USBID_DATA_DIR` (default `~/.usbid`), in the same
//! `device.json` / `wifi.json` layout the device keeps in flash.

mod sim;
mod storage;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use usbid_agent::{Agent, AgentConfig, PortalBridge, TickInputs};

use crate::sim::{SimRadio, SimServer, TerminalPanel};
use crate::storage::FileStorage;

/// Portal bind address. Port 80 needs privileges; the simulator uses 8080.
const PORTAL_ADDR: &str = "0.0.0.0:8080";

/// Agent tick cadence.
const TICK_MS: u64 = 100;

fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("USBID_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".usbid"),
        Err(_) => PathBuf::from(".usbid"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,usbid_agent=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("USB identifier agent (simulation) starting...");

    let storage = FileStorage::new(data_dir())?;
    tracing::info!("state directory: {}", storage.path().display());

    let bridge = PortalBridge::new();
    let agent = Agent::new(
        AgentConfig::default(),
        SimRadio::new(),
        SimServer::new(),
        storage,
        TerminalPanel,
        bridge.clone(),
    );

    // Portal server (always bound in the simulator; on the device it is
    // reachable through the setup AP).
    let portal_addr: SocketAddr = PORTAL_ADDR.parse()?;
    let portal = usbid_portal::create_router(bridge).layer(TraceLayer::new_for_http());
    let portal_handle = tokio::spawn(async move {
        match tokio::net::TcpListener::bind(portal_addr).await {
            Ok(listener) => {
                tracing::info!("portal listening on http://{portal_addr}");
                if let Err(e) = axum::serve(listener, portal).await {
                    tracing::error!("portal server error: {e}");
                }
            }
            Err(e) => tracing::error!("portal bind failed: {e}"),
        }
    });

    // Agent loop
    let agent_handle = tokio::spawn(run_agent(agent));

    tracing::info!("ready — open http://localhost:8080 to provision");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down...");
        }
        _ = portal_handle => {
            tracing::warn!("portal server stopped");
        }
        _ = agent_handle => {
            tracing::warn!("agent loop stopped");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Drive the agent on its tick cadence with wall-clock uptime.
async fn run_agent(
    mut agent: Agent<SimRadio, SimServer, FileStorage, TerminalPanel>,
) {
    let boot = Instant::now();
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(TICK_MS));

    loop {
        ticker.tick().await;
        let now_ms = boot.elapsed().as_millis() as u64;
        agent.tick(now_ms, &TickInputs::default());
        if agent.restart_requested() {
            break;
        }
    }
}
