mod bot;
mod dispatch;

use chrono::Local;
use clap::{Parser, Subcommand};

use huamibot_config::BotConfig;
use huamibot_schedule::occurrence::{next_occurrence, time_remaining};

#[derive(Parser)]
#[command(name = "huamibot", about = "Weekly huami-token file delivery bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot: Telegram polling plus the weekly schedule loop
    Run,
    /// Validate configuration and print the computed schedule
    Check,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = BotConfig::from_env()?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(bot::run(config))?;
        }
        Commands::Check => {
            let config = BotConfig::from_env()?;
            let now = Local::now();
            let next = next_occurrence(&now, &config.schedule);

            println!("configuration ok");
            println!("  chat id: {}", config.chat_id);
            println!(
                "  schedule: {} {}",
                config.schedule.weekday(),
                config.schedule.time_of_day().format("%H:%M")
            );
            println!(
                "  next send: {} (in {})",
                next.format("%Y-%m-%d %H:%M"),
                time_remaining(&now, &next)
            );
            println!(
                "  authorized users: {}",
                if config.authorized.is_empty() {
                    "everyone (AUTHORIZED_USERS not set)".to_string()
                } else {
                    config.authorized.len().to_string()
                }
            );
            println!("  tool: {} in {}", config.tool.program, config.tool.install_dir.display());
            println!("  artifact mode: {:?}", config.tool.artifact_mode);
        }
    }

    Ok(())
}
