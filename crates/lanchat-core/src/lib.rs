//! Shared types, wire format and configuration for lanchat.
//! All other lanchat crates depend on this one.

pub mod config;
pub mod ui;
pub mod wire;

pub use ui::{UiPacket, UiPacketType, UI_QUEUE_CAPACITY};
pub use wire::{CodecError, Packet, PacketCodec, PacketType};
