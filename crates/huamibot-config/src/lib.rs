//! Environment-based configuration for huamibot.
//!
//! All settings come from the process environment (a `.env` file is picked
//! up if present) and are read exactly once at startup into an immutable
//! [`BotConfig`] that is passed explicitly to each component — there is no
//! ambient global state.
//!
//! Required variables: `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`,
//! `HUAMI_EMAIL`, `HUAMI_PASSWORD`. Everything else has a default.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Timelike, Weekday};
use thiserror::Error;

use huamibot_schedule::{ScheduleConfig, ScheduleError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Telegram user ids allowed to issue commands.
///
/// An empty set allows everyone. This is the historical default-open
/// policy, kept for backward compatibility: deployments that never set
/// `AUTHORIZED_USERS` keep working, at the cost of an open bot.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationSet(HashSet<i64>);

impl AuthorizationSet {
    /// Parse a comma-separated id list. Blank entries are skipped; a
    /// non-numeric entry is an error.
    pub fn from_csv(raw: &str) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id = part.parse::<i64>().map_err(|_| ConfigError::Invalid {
                var: "AUTHORIZED_USERS",
                value: part.to_string(),
            })?;
            ids.insert(id);
        }
        Ok(Self(ids))
    }

    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.0.is_empty() || self.0.contains(&user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Which of the tool's outputs become deliverable artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactMode {
    /// Collect files the tool wrote into its directory (`.zip`/`.bin`).
    #[default]
    Files,
    /// Legacy: scrape the device key line from the tool's stdout and
    /// materialize it as a single text file.
    Stdout,
}

impl FromStr for ArtifactMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "files" => Ok(Self::Files),
            "stdout" => Ok(Self::Stdout),
            other => Err(format!("unknown artifact mode: {other:?}")),
        }
    }
}

/// How to invoke the external huami-token tool.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Executable name or path.
    pub program: String,
    /// Install directory; also the working directory and where artifacts
    /// are discovered.
    pub install_dir: PathBuf,
    /// Huami account credentials passed on the command line.
    pub email: String,
    pub password: String,
    /// Hard wall-clock limit for one invocation.
    pub timeout: Duration,
    pub artifact_mode: ArtifactMode,
}

/// Immutable top-level configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Destination chat for scheduled sends.
    pub chat_id: i64,
    pub authorized: AuthorizationSet,
    pub schedule: ScheduleConfig,
    pub tool: ToolSettings,
    /// Sleep after a failed scheduled run before recomputing.
    pub recovery_wait: Duration,
}

const DEFAULT_TOOL_DIR: &str = "/app/huami-token";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RECOVERY_SECS: u64 = 3600;

impl BotConfig {
    /// Load configuration from the process environment, reading a `.env`
    /// file first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;
        let chat_id = parse_required(&lookup, "TELEGRAM_CHAT_ID")?;
        let email = required(&lookup, "HUAMI_EMAIL")?;
        let password = required(&lookup, "HUAMI_PASSWORD")?;

        let authorized = match lookup("AUTHORIZED_USERS") {
            Some(raw) if !raw.trim().is_empty() => AuthorizationSet::from_csv(&raw)?,
            _ => AuthorizationSet::default(),
        };
        if authorized.is_empty() {
            tracing::warn!("AUTHORIZED_USERS not set; every Telegram user may issue commands");
        }

        let schedule = {
            let default = ScheduleConfig::default();
            let weekday = match lookup("SEND_WEEKDAY") {
                Some(raw) => Weekday::from_str(raw.trim()).map_err(|_| ConfigError::Invalid {
                    var: "SEND_WEEKDAY",
                    value: raw,
                })?,
                None => default.weekday(),
            };
            let hour = parse_optional(&lookup, "SEND_HOUR")?.unwrap_or(default.time_of_day().hour());
            let minute =
                parse_optional(&lookup, "SEND_MINUTE")?.unwrap_or(default.time_of_day().minute());
            ScheduleConfig::new(weekday, hour, minute)?
        };

        let tool = ToolSettings {
            program: lookup("HUAMI_TOKEN_BIN").unwrap_or_else(|| "huami-token".to_string()),
            install_dir: lookup("HUAMI_TOKEN_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOL_DIR)),
            email,
            password,
            timeout: Duration::from_secs(
                parse_optional(&lookup, "HUAMI_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            artifact_mode: match lookup("HUAMI_ARTIFACT_MODE") {
                Some(raw) => {
                    ArtifactMode::from_str(raw.trim()).map_err(|_| ConfigError::Invalid {
                        var: "HUAMI_ARTIFACT_MODE",
                        value: raw,
                    })?
                }
                None => ArtifactMode::default(),
            },
        };

        Ok(Self {
            bot_token,
            chat_id,
            authorized,
            schedule,
            tool,
            recovery_wait: Duration::from_secs(
                parse_optional(&lookup, "RECOVERY_WAIT_SECS")?.unwrap_or(DEFAULT_RECOVERY_SECS),
            ),
        })
    }
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parse_required<F, T>(lookup: &F, var: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = required(lookup, var)?;
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}

fn parse_optional<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("TELEGRAM_BOT_TOKEN", "123:ABC"),
            ("TELEGRAM_CHAT_ID", "-100123"),
            ("HUAMI_EMAIL", "user@example.com"),
            ("HUAMI_PASSWORD", "secret"),
        ])
    }

    fn lookup_of(env: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |var| env.get(var).map(|v| v.to_string())
    }

    #[test]
    fn test_minimal_env() {
        let config = BotConfig::from_lookup(lookup_of(base_env())).unwrap();
        assert_eq!(config.bot_token, "123:ABC");
        assert_eq!(config.chat_id, -100123);
        assert!(config.authorized.is_empty());
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.tool.program, "huami-token");
        assert_eq!(config.tool.install_dir, PathBuf::from("/app/huami-token"));
        assert_eq!(config.tool.timeout, Duration::from_secs(120));
        assert_eq!(config.tool.artifact_mode, ArtifactMode::Files);
        assert_eq!(config.recovery_wait, Duration::from_secs(3600));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let mut env = base_env();
        env.remove("TELEGRAM_BOT_TOKEN");
        let err = BotConfig::from_lookup(lookup_of(env)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_invalid_chat_id() {
        let mut env = base_env();
        env.insert("TELEGRAM_CHAT_ID", "not-a-number");
        let err = BotConfig::from_lookup(lookup_of(env)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "TELEGRAM_CHAT_ID", .. }));
    }

    #[test]
    fn test_schedule_overrides() {
        let mut env = base_env();
        env.insert("SEND_WEEKDAY", "sunday");
        env.insert("SEND_HOUR", "8");
        env.insert("SEND_MINUTE", "30");
        let config = BotConfig::from_lookup(lookup_of(env)).unwrap();
        assert_eq!(config.schedule, ScheduleConfig::new(Weekday::Sun, 8, 30).unwrap());
    }

    #[test]
    fn test_stdout_mode() {
        let mut env = base_env();
        env.insert("HUAMI_ARTIFACT_MODE", "stdout");
        let config = BotConfig::from_lookup(lookup_of(env)).unwrap();
        assert_eq!(config.tool.artifact_mode, ArtifactMode::Stdout);
    }

    #[test]
    fn test_bad_artifact_mode() {
        let mut env = base_env();
        env.insert("HUAMI_ARTIFACT_MODE", "both");
        assert!(BotConfig::from_lookup(lookup_of(env)).is_err());
    }

    #[test]
    fn test_authorized_csv() {
        let set = AuthorizationSet::from_csv("1, 2,3, ").unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.is_authorized(2));
        assert!(!set.is_authorized(4));
    }

    #[test]
    fn test_authorized_csv_rejects_garbage() {
        assert!(AuthorizationSet::from_csv("1,abc").is_err());
    }

    #[test]
    fn test_empty_set_allows_everyone() {
        let set = AuthorizationSet::default();
        assert!(set.is_authorized(0));
        assert!(set.is_authorized(i64::MAX));
        assert!(set.is_authorized(-42));
    }
}
