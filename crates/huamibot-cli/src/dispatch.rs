//! Command dispatcher: maps the four chat commands to actions.
//!
//! Every command first passes the authorization check; unauthorized users
//! get a fixed rejection and nothing else happens. `/status` and
//! `/next_send` are read-only; `/send_now` runs generate + deliver toward
//! the caller's own chat.

use std::sync::Arc;

use chrono::Local;
use tracing::{error, warn};

use huamibot_channel_telegram::polling::{BotCommand, InboundCommand};
use huamibot_channel_telegram::{Transport, delivery::deliver_files};
use huamibot_config::AuthorizationSet;
use huamibot_generator::{GenerationError, Generator};
use huamibot_schedule::ScheduleConfig;
use huamibot_schedule::occurrence::{next_occurrence, time_remaining};

const REJECTION: &str = "❌ You are not authorized to use this bot.";

const GREETING: &str = "🤖 GPS Data Bot is active!\n\n\
    I send GPS data files every week automatically.\n\
    Commands:\n\
    /status - Check bot status\n\
    /send_now - Send GPS files immediately\n\
    /next_send - Show next scheduled send time";

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    generator: Arc<Generator>,
    authorized: AuthorizationSet,
    schedule: ScheduleConfig,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        generator: Arc<Generator>,
        authorized: AuthorizationSet,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            transport,
            generator,
            authorized,
            schedule,
        }
    }

    /// Handle one inbound command end to end, replying in the source chat.
    pub async fn handle(&self, inbound: InboundCommand) {
        if !self.authorized.is_authorized(inbound.user_id) {
            warn!(user_id = inbound.user_id, "rejected unauthorized command");
            self.reply(inbound.chat_id, REJECTION).await;
            return;
        }

        match inbound.command {
            BotCommand::Start => self.reply(inbound.chat_id, GREETING).await,
            BotCommand::Status => {
                let next = next_occurrence(&Local::now(), &self.schedule);
                let text = format!(
                    "✅ Bot is running\n📅 Next scheduled send: {}",
                    next.format("%Y-%m-%d %H:%M")
                );
                self.reply(inbound.chat_id, &text).await;
            }
            BotCommand::NextSend => {
                let now = Local::now();
                let next = next_occurrence(&now, &self.schedule);
                let text = format!(
                    "📅 Next automatic send: {}\n⏰ Time remaining: {}",
                    next.format("%Y-%m-%d %H:%M"),
                    time_remaining(&now, &next)
                );
                self.reply(inbound.chat_id, &text).await;
            }
            BotCommand::SendNow => self.send_now(inbound.chat_id).await,
        }
    }

    async fn send_now(&self, chat_id: i64) {
        self.reply(chat_id, "🔄 Generating GPS files now...").await;

        let files = match self.generator.generate().await {
            Ok(files) => files,
            Err(GenerationError::AlreadyRunning) => {
                self.reply(chat_id, "⏳ A send is already in progress, try again later.")
                    .await;
                return;
            }
            Err(e) => {
                error!("manual generation failed: {e}");
                self.reply(chat_id, &format!("❌ Error: {e}")).await;
                return;
            }
        };

        match deliver_files(self.transport.as_ref(), chat_id, &files).await {
            Ok(outcomes) => {
                let sent = outcomes.iter().filter(|o| o.sent).count();
                let text = if sent == outcomes.len() {
                    format!("✅ {sent} GPS files sent successfully!")
                } else {
                    format!(
                        "⚠️ Sent {sent} of {} files; failed ones were kept on disk.",
                        outcomes.len()
                    )
                };
                self.reply(chat_id, &text).await;
            }
            Err(e) => {
                // Endpoint is unreachable, so the error reply will most
                // likely not arrive either; log it regardless.
                error!("manual delivery failed: {e}");
                self.reply(chat_id, &format!("❌ Error: {e}")).await;
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            warn!(chat_id, "failed to send reply: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use huamibot_channel_telegram::SendError;
    use huamibot_config::{ArtifactMode, ToolSettings};

    #[derive(Default)]
    struct RecordingTransport {
        texts: Mutex<Vec<(i64, String)>>,
        documents: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
            self.texts.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        async fn send_document(
            &self,
            _chat_id: i64,
            file: &Path,
            _caption: &str,
        ) -> Result<(), SendError> {
            self.documents
                .lock()
                .unwrap()
                .push(file.file_name().unwrap().to_string_lossy().into_owned());
            Ok(())
        }
    }

    fn idle_tool(dir: &Path) -> ToolSettings {
        ToolSettings {
            program: "true".into(),
            install_dir: dir.to_path_buf(),
            email: "user@example.com".into(),
            password: "secret".into(),
            timeout: Duration::from_secs(5),
            artifact_mode: ArtifactMode::Files,
        }
    }

    fn dispatcher_with(
        transport: Arc<RecordingTransport>,
        authorized: AuthorizationSet,
        tool: ToolSettings,
    ) -> Dispatcher {
        Dispatcher::new(
            transport,
            Arc::new(Generator::new(tool)),
            authorized,
            ScheduleConfig::default(),
        )
    }

    fn command(cmd: BotCommand, user_id: i64) -> InboundCommand {
        InboundCommand {
            command: cmd,
            chat_id: 99,
            user_id,
        }
    }

    #[tokio::test]
    async fn test_unauthorized_user_gets_rejection_only() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let authorized = AuthorizationSet::from_csv("1,2").unwrap();
        let dispatcher = dispatcher_with(transport.clone(), authorized, idle_tool(dir.path()));

        dispatcher.handle(command(BotCommand::SendNow, 42)).await;

        let texts = transport.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1, REJECTION);
        assert!(transport.documents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_set_allows_any_user() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher_with(
            transport.clone(),
            AuthorizationSet::default(),
            idle_tool(dir.path()),
        );

        dispatcher.handle(command(BotCommand::Start, 123456)).await;

        let texts = transport.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].1.contains("/send_now"));
    }

    #[tokio::test]
    async fn test_status_reports_next_send() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher_with(
            transport.clone(),
            AuthorizationSet::default(),
            idle_tool(dir.path()),
        );

        dispatcher.handle(command(BotCommand::Status, 1)).await;

        let texts = transport.texts.lock().unwrap();
        assert!(texts[0].1.contains("Bot is running"));
        assert!(texts[0].1.contains("Next scheduled send"));
    }

    #[tokio::test]
    async fn test_next_send_reports_remaining_time() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher_with(
            transport.clone(),
            AuthorizationSet::default(),
            idle_tool(dir.path()),
        );

        dispatcher.handle(command(BotCommand::NextSend, 1)).await;

        let texts = transport.texts.lock().unwrap();
        assert!(texts[0].1.contains("Time remaining:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_now_generates_and_delivers() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-huami-token");
        std::fs::write(&script, "#!/bin/sh\necho data > out.zip\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let mut tool = idle_tool(dir.path());
        tool.program = script.to_string_lossy().into_owned();

        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher_with(transport.clone(), AuthorizationSet::default(), tool);

        dispatcher.handle(command(BotCommand::SendNow, 1)).await;

        let texts = transport.texts.lock().unwrap();
        assert!(texts[0].1.contains("Generating"));
        assert!(texts[1].1.contains("sent successfully"));
        assert_eq!(*transport.documents.lock().unwrap(), vec!["out.zip"]);
        // Delivered artifact was deleted.
        assert!(!dir.path().join("out.zip").exists());
    }

    #[tokio::test]
    async fn test_send_now_reports_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher_with(
            transport.clone(),
            AuthorizationSet::default(),
            idle_tool(dir.path()),
        );

        dispatcher.handle(command(BotCommand::SendNow, 1)).await;

        let texts = transport.texts.lock().unwrap();
        assert!(texts[1].1.contains("❌"));
        assert!(texts[1].1.contains("no artifacts"));
    }
}
