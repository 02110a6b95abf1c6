//! Supervisory process for the gatekeeper decision loop.
//!
//! Tails the decision loop's journal and mirrors it to websocket observers,
//! and accepts control commands over HTTP into the command mailbox. Nothing
//! here writes the journal or touches the loop's memory.

pub mod broadcast;
pub mod error;
pub mod feed;
pub mod server;
pub mod websocket;

pub use broadcast::Broadcaster;
pub use error::SupervisorError;
pub use feed::JournalFeed;
pub use server::{AppState, SupervisorServer};
pub use websocket::{observer_session, DeliveryCursor};
