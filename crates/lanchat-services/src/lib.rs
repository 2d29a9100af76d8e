//! Peer networking engine for lanchat.

pub mod commands;
pub mod connection;
pub mod dispatch;
pub mod node;
pub mod registry;
pub mod scanner;
pub mod supervisor;

pub use commands::{CommandDescriptor, CommandRegistry};
pub use node::{Node, NodeSettings};
pub use registry::{
    ConnectionRegistry, Delivery, NameChange, PeerConnection, PeerId, PeerInfo, RegistryError,
    RestartHandle, RestartRequest, Role,
};
pub use scanner::{
    scanner_from_config, LocalhostScanner, NetScanner, NullScanner, SubnetScanner,
};
pub use supervisor::{LifecycleState, Supervisor};
