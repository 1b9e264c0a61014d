//! Telegram long-polling loop.
//!
//! Converts updates into [`InboundCommand`]s and forwards them over an
//! mpsc channel to the dispatcher. Non-command messages and commands the
//! bot does not know are skipped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TelegramApi;
use crate::types::{GetUpdatesParams, TgMessage};

/// One of the four commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Status,
    SendNow,
    NextSend,
}

impl BotCommand {
    /// Parse a command message (`"/send_now"`, `"/status@SomeBot"`, ...).
    pub fn parse(text: &str) -> Option<Self> {
        let name = text
            .split_whitespace()
            .next()?
            .strip_prefix('/')?
            .split('@')
            .next()?;
        match name {
            "start" => Some(Self::Start),
            "status" => Some(Self::Status),
            "send_now" => Some(Self::SendNow),
            "next_send" => Some(Self::NextSend),
            _ => None,
        }
    }
}

/// A command received from a chat user.
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub command: BotCommand,
    /// Where replies (and `/send_now` artifacts) go.
    pub chat_id: i64,
    /// Who issued the command; checked against the authorization set.
    pub user_id: i64,
}

/// Run the long-polling loop until `cancel` fires or `sender` closes.
pub async fn run_polling_loop(
    api: &TelegramApi,
    sender: mpsc::Sender<InboundCommand>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    info!("Telegram polling loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let params = GetUpdatesParams {
            offset,
            timeout: Some(30),
            allowed_updates: Some(vec!["message".into()]),
        };

        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(&params) => result,
        };

        match updates {
            Ok(updates) => {
                backoff = Duration::from_secs(1);

                for update in updates {
                    offset = Some(update.update_id + 1);

                    let Some(msg) = update.message else {
                        continue;
                    };
                    let Some(inbound) = command_from_message(&msg) else {
                        continue;
                    };

                    debug!(
                        update_id = update.update_id,
                        command = ?inbound.command,
                        "forwarding Telegram command"
                    );

                    if sender.send(inbound).await.is_err() {
                        info!("inbound channel closed, stopping polling");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(backoff_secs = backoff.as_secs(), "getUpdates error: {e}");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {},
                }

                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }

    info!("Telegram polling loop stopped");
}

/// Extract a known bot command from a message, if it carries one.
fn command_from_message(msg: &TgMessage) -> Option<InboundCommand> {
    let text = msg.text.as_deref()?;

    // Commands arrive as an entity of type "bot_command" at offset 0.
    let is_command = msg
        .entities
        .iter()
        .any(|e| e.entity_type == "bot_command" && e.offset == 0);
    if !is_command {
        return None;
    }

    let command = BotCommand::parse(text)?;
    let user_id = msg.from.as_ref().map(|u| u.id).unwrap_or(msg.chat.id);

    Some(InboundCommand {
        command,
        chat_id: msg.chat.id,
        user_id,
    })
}
