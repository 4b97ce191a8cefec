//! Server side: session registry and the accepting server.

pub mod registry;
pub mod server;

pub use registry::SessionRegistry;
pub use server::{PayloadSource, Server, ServerConfig};
