//! Line-oriented stdio presentation layer.

use std::io::BufRead;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lanchat_core::{UiPacket, UiPacketType};

/// Render one packet as a terminal line.
fn render(packet: &UiPacket) -> String {
    match packet.kind {
        UiPacketType::Chat => format!("{}: {}", packet.user, packet.message),
        UiPacketType::Admin => format!("* {}", packet.message.trim_end()),
        UiPacketType::Cmd => format!("> {}", packet.message),
    }
}

/// Print everything the node sends to the presentation layer.
pub async fn output_loop(mut from_node: mpsc::Receiver<UiPacket>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(packet) = from_node.recv().await {
        let mut line = render(&packet);
        line.push('\n');
        stdout
            .write_all(line.as_bytes())
            .await
            .context("failed to write to stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    }
    Ok(())
}

/// Forward stdin lines to the node on a dedicated thread. End of input
/// shuts the node down.
///
/// The thread is detached: a blocking stdin read must not hold up runtime
/// shutdown.
pub fn spawn_input(to_node: mpsc::Sender<UiPacket>, shutdown: CancellationToken) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            };
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if to_node.blocking_send(UiPacket::chat("", line)).is_err() {
                break;
            }
        }
        tracing::info!("stdin closed");
        shutdown.cancel();
    });
}
