//! Outbound delivery to the chat platform.

use crate::chunk::{MAX_MESSAGE_LENGTH, chunk_message};
use crate::error::GatewayError;
use async_trait::async_trait;
use palaver_core::ChatId;
use tracing::{debug, warn};

/// How the platform should interpret message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Markdown markup.
    Markdown,
    /// Literal text.
    Plain,
}

/// Sends text to chats.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Sends a single message of at most [`MAX_MESSAGE_LENGTH`] characters.
    async fn send_text(&self, chat: ChatId, text: &str, format: TextFormat) -> Result<(), GatewayError>;

    /// Shows the "typing" indicator in a chat.
    async fn send_typing(&self, chat: ChatId) -> Result<(), GatewayError>;
}

/// Delivers a reply of any length to a chat.
///
/// Long replies are chunked and sent in order. Each chunk is sent as
/// Markdown first and resent as plain text if that fails. Returns the number
/// of chunks delivered; stops at the first chunk that fails both ways.
pub async fn deliver(gateway: &dyn MessageGateway, chat: ChatId, text: &str) -> Result<usize, GatewayError> {
    let chunks = chunk_message(text, MAX_MESSAGE_LENGTH);
    let total = chunks.len();
    for chunk in &chunks {
        if let Err(err) = gateway.send_text(chat, chunk, TextFormat::Markdown).await {
            warn!(chat_id = %chat, error = %err, "markdown delivery failed, retrying as plain text");
            gateway.send_text(chat, chunk, TextFormat::Plain).await?;
        }
    }
    debug!(chat_id = %chat, chunks = total, "reply delivered");
    Ok(total)
}
