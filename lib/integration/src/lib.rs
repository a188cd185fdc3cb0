//! Chat platform plumbing for the palaver relay.
//!
//! This crate provides:
//!
//! - **Gateway**: outbound delivery with chunking and plain-text retry
//! - **Telegram client**: the Bot API calls the relay uses
//! - **Rate limiter**: per-user fixed-window admission control

pub mod chunk;
pub mod error;
pub mod gateway;
pub mod rate_limit;
pub mod telegram;

pub use chunk::{MAX_MESSAGE_LENGTH, chunk_message};
pub use error::GatewayError;
pub use gateway::{MessageGateway, TextFormat, deliver};
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use telegram::{BotCommand, InboundText, TelegramClient, Update};
