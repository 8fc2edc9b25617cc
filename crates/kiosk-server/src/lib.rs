pub mod callbacks;
pub mod connection;
pub mod coordinator;
pub mod handlers;
pub mod registry;
pub mod server;

pub use connection::ConnectionRole;
pub use coordinator::{Command, Coordinator, CoordinatorConfig, StatusSnapshot};
pub use server::{start, ServerConfig, ServerHandle};
