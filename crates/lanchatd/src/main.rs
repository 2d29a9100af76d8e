//! lanchatd: serverless LAN chat node.
//!
//! Usage: `lanchatd [username]`. Everything else comes from the config file
//! and `LANCHAT_*` environment overrides. Chat on stdin/stdout, logs on
//! stderr (filtered by `RUST_LOG`).

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lanchat_core::config::LanchatConfig;
use lanchat_core::UI_QUEUE_CAPACITY;
use lanchat_services::{scanner_from_config, NodeSettings, Supervisor};

mod terminal;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load config
    if let Err(e) = LanchatConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = LanchatConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LanchatConfig::default()
    });
    if let Some(name) = std::env::args().nth(1).filter(|n| !n.is_empty()) {
        config.identity.username = name;
    }

    tracing::info!(
        username = %config.identity.username,
        port = config.network.port,
        force_host = config.network.force_host,
        loopback_only = config.network.loopback_only,
        "lanchatd starting"
    );

    // ── Presentation queues ──────────────────────────────────────────────────
    let (to_ui, from_node) = mpsc::channel(UI_QUEUE_CAPACITY);
    let (to_node, from_ui) = mpsc::channel(UI_QUEUE_CAPACITY);

    // ── Shutdown ─────────────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────
    let supervisor = Supervisor::new(
        NodeSettings::from(&config),
        scanner_from_config(&config),
        to_ui,
        from_ui,
        shutdown.clone(),
    );
    let supervisor_task = tokio::spawn(supervisor.run());

    let output_task = tokio::spawn(terminal::output_loop(from_node));
    terminal::spawn_input(to_node, shutdown.clone());

    supervisor_task.await?;
    output_task.abort();
    tracing::info!("lanchatd stopped");
    Ok(())
}
