//! Command table: named colon commands and their handlers.
//!
//! Each command pairs an inbound handler (a peer sent us the command) with
//! an outbound handler (the local user typed it). The table is built once,
//! before any network task starts, and never changes afterwards.

use std::collections::BTreeMap;

use futures::future::BoxFuture;

use lanchat_core::{Packet, UiPacket};

use crate::node::Node;
use crate::registry::NameChange;

pub type InboundHandler = for<'a> fn(&'a Node, &'a Packet, &'a str) -> BoxFuture<'a, ()>;
pub type OutboundHandler = for<'a> fn(&'a Node, &'a UiPacket) -> BoxFuture<'a, ()>;

#[derive(Clone, Copy)]
pub struct CommandDescriptor {
    /// Leading token including the colon, e.g. `:id`.
    pub name: &'static str,
    /// `None` means peers may send it but it has no effect.
    pub inbound: Option<InboundHandler>,
    /// `None` means the local user cannot run it.
    pub outbound: Option<OutboundHandler>,
    pub usage: &'static str,
}

pub struct CommandRegistry {
    commands: BTreeMap<&'static str, CommandDescriptor>,
    help: String,
}

impl CommandRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = CommandDescriptor>) -> Self {
        let commands: BTreeMap<_, _> = descriptors.into_iter().map(|d| (d.name, d)).collect();

        let mut help = String::from("All commands start with a colon (:). Available commands:\n");
        for d in commands.values() {
            help.push_str(&format!("{:<10}\t{}\n", d.name, d.usage));
        }

        Self { commands, help }
    }

    /// The commands every node ships with.
    pub fn builtin() -> Self {
        Self::new([
            CommandDescriptor {
                name: ":help",
                inbound: None,
                outbound: Some(help_outbound),
                usage: "Show available commands",
            },
            CommandDescriptor {
                name: ":id",
                inbound: Some(id_inbound),
                outbound: Some(id_outbound),
                usage: "Change username. Example: \":id my_new_name\"",
            },
            CommandDescriptor {
                name: ":info",
                inbound: None,
                outbound: Some(info_outbound),
                usage: "List users known to this node",
            },
        ])
    }

    /// Find the command a message invokes, keyed on its first word.
    pub fn lookup(&self, message: &str) -> Option<&CommandDescriptor> {
        if !message.starts_with(':') {
            return None;
        }
        let token = message.split(' ').next()?;
        self.commands.get(token)
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }
}

/// Split `:cmd a b` and return its single argument, if it has exactly one.
fn single_argument(message: &str) -> Result<&str, String> {
    let args: Vec<&str> = message.split(' ').collect();
    match args.as_slice() {
        [_, arg] if !arg.is_empty() => Ok(arg),
        _ => Err(format!(
            ":id needs a single, non-empty argument, received {:?}",
            &args[1..]
        )),
    }
}

// ── :id ───────────────────────────────────────────────────────────────────────

fn id_inbound<'a>(node: &'a Node, packet: &'a Packet, from: &'a str) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let name = match single_argument(&packet.message) {
            Ok(n) => n,
            Err(warning) => {
                node.log_to_ui(warning).await;
                return;
            }
        };

        let msg = match node.registry().rename(from, name) {
            None => {
                tracing::debug!(peer = %from, "id from unregistered peer");
                return;
            }
            Some(NameChange::Unchanged) => return,
            Some(NameChange::Announced) => {
                let reply = Packet::cmd(node.name(), format!(":id {}", node.name()));
                node.transmit(&reply, from).await;
                format!("user \"{name}\" connected")
            }
            Some(NameChange::Renamed { previous }) => {
                format!("user \"{previous}\" changed their name to \"{name}\"")
            }
        };

        tracing::info!(peer = %from, name, "peer identified");
        node.log_to_ui(msg.clone()).await;
        node.broadcast(&Packet::admin(msg), Some(from)).await;
    })
}

fn id_outbound<'a>(node: &'a Node, packet: &'a UiPacket) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let name = match single_argument(&packet.message) {
            Ok(n) => n,
            Err(warning) => {
                node.log_to_ui(warning).await;
                return;
            }
        };

        node.broadcast(&Packet::cmd(node.name(), packet.message.clone()), None)
            .await;
        node.set_name(name);

        // Confirm off the send path; the UI may be the one blocking.
        let to_ui = node.ui_sender();
        let echo = UiPacket::cmd(packet.message.clone());
        tokio::spawn(async move {
            let _ = to_ui.send(echo).await;
        });
    })
}

// ── :help / :info ─────────────────────────────────────────────────────────────

fn help_outbound<'a>(node: &'a Node, _packet: &'a UiPacket) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        node.log_to_ui(node.commands().help_text().to_string()).await;
    })
}

fn info_outbound<'a>(node: &'a Node, _packet: &'a UiPacket) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let mut names: Vec<String> = node
            .registry()
            .peers()
            .into_iter()
            .map(|p| p.name)
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();

        let mut msg = format!("Connected users:\n- {} (you)", node.name());
        for name in names {
            msg.push_str(&format!("\n- {name}"));
        }
        node.log_to_ui(msg).await;
    })
}
