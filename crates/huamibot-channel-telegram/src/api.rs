//! Telegram Bot API HTTP client.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};

use crate::types::{
    ApiResponse, BotInfo, GetUpdatesParams, SendMessageParams, SetMyCommandsParams, TgMessage,
    Update,
};
use crate::{SendError, Transport};

/// HTTP client for the Telegram Bot API.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    /// Create a new API client with the given bot token.
    pub fn new(bot_token: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
        }
    }

    /// Verify the bot token by calling `getMe`.
    pub async fn get_me(&self) -> anyhow::Result<BotInfo> {
        let resp: ApiResponse<BotInfo> = self
            .client
            .get(format!("{}/getMe", self.base_url))
            .send()
            .await
            .context("getMe request failed")?
            .json()
            .await
            .context("getMe response parse failed")?;

        if !resp.ok {
            bail!(
                "getMe failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        resp.result.context("getMe returned no result")
    }

    /// Long-poll for updates.
    pub async fn get_updates(&self, params: &GetUpdatesParams) -> anyhow::Result<Vec<Update>> {
        let resp: ApiResponse<Vec<Update>> = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            .json(params)
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates response parse failed")?;

        if !resp.ok {
            bail!(
                "getUpdates failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(resp.result.unwrap_or_default())
    }

    /// Register bot commands in the menu.
    pub async fn set_my_commands(&self, params: &SetMyCommandsParams) -> anyhow::Result<()> {
        let resp: ApiResponse<bool> = self
            .client
            .post(format!("{}/setMyCommands", self.base_url))
            .json(params)
            .send()
            .await
            .context("setMyCommands request failed")?
            .json()
            .await
            .context("setMyCommands response parse failed")?;

        if !resp.ok {
            bail!(
                "setMyCommands failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(())
    }
}

/// Map a failed API response onto the delivery error split: auth failures
/// mean the endpoint itself is gone, anything else is a per-send fault.
fn classify<T>(method: &str, resp: ApiResponse<T>) -> SendError {
    let description = resp
        .description
        .unwrap_or_else(|| "unknown error".to_string());
    match resp.error_code {
        Some(401) | Some(403) => SendError::Unreachable(format!("{method}: {description}")),
        _ => SendError::Transport(format!("{method}: {description}")),
    }
}

#[async_trait]
impl Transport for TelegramApi {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        let params = SendMessageParams {
            chat_id,
            text: text.to_string(),
        };
        let resp: ApiResponse<TgMessage> = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&params)
            .send()
            .await
            .map_err(|e| SendError::Transport(format!("sendMessage request failed: {e}")))?
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("sendMessage response parse failed: {e}")))?;

        if !resp.ok {
            return Err(classify("sendMessage", resp));
        }
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file: &Path,
        caption: &str,
    ) -> Result<(), SendError> {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| SendError::Transport(format!("read {}: {e}", file.display())))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name));

        let resp: ApiResponse<TgMessage> = self
            .client
            .post(format!("{}/sendDocument", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SendError::Transport(format!("sendDocument request failed: {e}")))?
            .json()
            .await
            .map_err(|e| {
                SendError::Transport(format!("sendDocument response parse failed: {e}"))
            })?;

        if !resp.ok {
            return Err(classify("sendDocument", resp));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let api = TelegramApi::new("123:ABC");
        assert_eq!(api.base_url, "https://api.telegram.org/bot123:ABC");
    }

    #[test]
    fn test_classify_auth_vs_transport() {
        let unauthorized: ApiResponse<bool> = serde_json::from_str(
            r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
        )
        .unwrap();
        assert!(matches!(
            classify("sendDocument", unauthorized),
            SendError::Unreachable(_)
        ));

        let too_big: ApiResponse<bool> = serde_json::from_str(
            r#"{"ok":false,"error_code":413,"description":"Request Entity Too Large"}"#,
        )
        .unwrap();
        assert!(matches!(
            classify("sendDocument", too_big),
            SendError::Transport(_)
        ));
    }
}
