//! Client side: connection setup and the receiving session.

pub mod client;

pub use client::{Client, ClientConfig};
