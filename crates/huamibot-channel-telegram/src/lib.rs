//! Telegram channel for huamibot.
//!
//! Uses the Telegram Bot API with long-polling (no webhook required):
//! inbound `/...` commands arrive through [`polling::run_polling_loop`],
//! outbound artifacts leave through [`delivery::deliver_files`].

pub mod api;
pub mod delivery;
pub mod polling;
pub mod types;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// A single send failed.
#[derive(Debug, Error)]
pub enum SendError {
    /// The endpoint itself is unusable (bad token, bot blocked). Nothing
    /// further can be delivered this batch.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    /// This particular send failed; later sends may still succeed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The chat endpoint is unreachable; the whole delivery call fails.
#[derive(Debug, Error)]
#[error("chat endpoint unreachable: {0}")]
pub struct ChannelError(pub String);

/// Outbound side of the chat transport.
///
/// A trait seam so delivery logic can be exercised against a fake in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError>;

    /// Send a local file as a document attachment with a caption.
    async fn send_document(&self, chat_id: i64, file: &Path, caption: &str)
    -> Result<(), SendError>;
}
