//! Core constants, error types, and observability events.

pub mod constants;
pub mod error;
pub mod events;

pub use constants::*;
pub use error::{ChannelError, CryptoError, SessionError, SubmitError};
pub use events::{EventSink, NullSink, SharedSink, TracingSink, TransportEvent};
