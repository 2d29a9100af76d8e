//! Types carried on the two queues between the node and its presentation layer.
//!
//! The node writes to `ToPresentation` and reads from `FromPresentation`.
//! How the packets are rendered is up to whoever owns the other end.

/// Capacity of each presentation queue.
pub const UI_QUEUE_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UiPacketType {
    #[default]
    Chat,
    Admin,
    Cmd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiPacket {
    pub user: String,
    pub message: String,
    pub kind: UiPacketType,
}

impl UiPacket {
    pub fn chat(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            kind: UiPacketType::Chat,
        }
    }

    /// A notice from the node itself; carries no user.
    pub fn admin(message: impl Into<String>) -> Self {
        Self {
            user: String::new(),
            message: message.into(),
            kind: UiPacketType::Admin,
        }
    }

    pub fn cmd(message: impl Into<String>) -> Self {
        Self {
            user: String::new(),
            message: message.into(),
            kind: UiPacketType::Cmd,
        }
    }

    pub fn is_command(&self) -> bool {
        self.message.starts_with(':')
    }
}
