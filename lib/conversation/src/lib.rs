//! Conversation state for the palaver relay.
//!
//! This crate provides:
//!
//! - **Turns**: immutable user/assistant/system messages
//! - **Sessions**: one bounded history per user
//! - **Store**: the process-wide, per-user keyed session map

pub mod message;
pub mod session;
pub mod store;

pub use message::{ConversationTurn, TurnRole};
pub use session::{ConversationHistory, UserSession};
pub use store::{ConversationStore, StoreConfig};
