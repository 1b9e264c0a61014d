//! Wires the bot together: Telegram API, generator, dispatcher, polling
//! loop and the weekly schedule loop, all under one cancellation token.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use huamibot_channel_telegram::api::TelegramApi;
use huamibot_channel_telegram::delivery::deliver_files;
use huamibot_channel_telegram::polling::run_polling_loop;
use huamibot_channel_telegram::types::{BotCommandEntry, SetMyCommandsParams};
use huamibot_config::BotConfig;
use huamibot_generator::Generator;
use huamibot_schedule::runner::run_schedule_loop;

use crate::dispatch::Dispatcher;

/// Run the bot until ctrl-c.
pub async fn run(config: BotConfig) -> anyhow::Result<()> {
    let api = Arc::new(TelegramApi::new(&config.bot_token));

    let me = api
        .get_me()
        .await
        .context("Telegram bot authentication failed")?;
    info!(
        bot_username = me.username.as_deref().unwrap_or("unknown"),
        chat_id = config.chat_id,
        "Telegram bot authenticated"
    );

    if let Err(e) = api.set_my_commands(&command_menu()).await {
        warn!("failed to register command menu: {e}");
    }

    let generator = Arc::new(Generator::new(config.tool.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        api.clone(),
        generator.clone(),
        config.authorized.clone(),
        config.schedule,
    ));

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(32);

    let poll_handle = tokio::spawn({
        let api = api.clone();
        let cancel = cancel.child_token();
        async move {
            run_polling_loop(&api, tx, cancel).await;
        }
    });

    let schedule_handle = tokio::spawn({
        let generator = generator.clone();
        let api = api.clone();
        let chat_id = config.chat_id;
        let cancel = cancel.child_token();
        async move {
            run_schedule_loop(config.schedule, config.recovery_wait, cancel, move || {
                let generator = generator.clone();
                let api = api.clone();
                async move {
                    info!("starting weekly generation");
                    let files = generator.generate().await?;
                    let outcomes = deliver_files(api.as_ref(), chat_id, &files).await?;

                    let failed = outcomes.iter().filter(|o| !o.sent).count();
                    if failed > 0 {
                        anyhow::bail!("{failed} of {} files failed to send", outcomes.len());
                    }
                    info!(files = outcomes.len(), "weekly delivery complete");
                    Ok(())
                }
            })
            .await;
        }
    });

    let dispatch_handle = tokio::spawn({
        let cancel = cancel.child_token();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    inbound = rx.recv() => {
                        let Some(inbound) = inbound else { break };
                        // Commands run concurrently; the generator's gate
                        // keeps tool runs serialized.
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            dispatcher.handle(inbound).await;
                        });
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    cancel.cancel();

    let _ = tokio::join!(poll_handle, schedule_handle, dispatch_handle);
    Ok(())
}

fn command_menu() -> SetMyCommandsParams {
    SetMyCommandsParams {
        commands: vec![
            BotCommandEntry {
                command: "start".into(),
                description: "Show bot help".into(),
            },
            BotCommandEntry {
                command: "status".into(),
                description: "Check bot status".into(),
            },
            BotCommandEntry {
                command: "send_now".into(),
                description: "Send GPS files immediately".into(),
            },
            BotCommandEntry {
                command: "next_send".into(),
                description: "Show next scheduled send time".into(),
            },
        ],
    }
}
