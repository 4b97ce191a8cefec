//! Reliable-delivery core: sliding window, congestion control, reorder
//! buffer, rekey scheduling, and the session tasks that drive them.

pub mod congestion;
pub mod receiver;
pub mod rekey;
pub mod reorder;
pub mod sender;
pub mod state;
pub mod window;

pub use congestion::CongestionController;
pub use receiver::ReceiverSession;
pub use rekey::{RekeyCoordinator, RekeyTimeout};
pub use reorder::{ReceiveOutcome, ReorderBuffer};
pub use sender::SenderSession;
pub use state::{SessionConfig, SessionPhase, SessionStats};
pub use window::{AckDisposition, SendWindow};
