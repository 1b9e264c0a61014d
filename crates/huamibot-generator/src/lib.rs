//! huamibot-generator: runs the external huami-token tool and collects the
//! artifacts it produces.
//!
//! One [`Generator`] owns the tool settings and a single-flight gate: the
//! tool works in a fixed directory and artifacts are discovered by listing
//! that directory, so two concurrent runs would race. A caller that arrives
//! while a run is in progress gets [`GenerationError::AlreadyRunning`]
//! instead of waiting.

pub mod parse;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use huamibot_config::{ArtifactMode, ToolSettings};

/// File extensions the tool is known to emit.
pub const ARTIFACT_EXTENSIONS: [&str; 2] = ["zip", "bin"];

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("a generation run is already in progress")]
    AlreadyRunning,
    #[error("tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("tool exited with status {exit_code}: {stderr}")]
    ToolFailed { exit_code: i32, stderr: String },
    #[error("tool succeeded but produced no artifacts")]
    NoArtifacts,
    #[error("failed to run tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Invokes huami-token and turns its output into deliverable files.
pub struct Generator {
    settings: ToolSettings,
    gate: Mutex<()>,
}

impl Generator {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            gate: Mutex::new(()),
        }
    }

    /// Run one generation and return the artifact files, in path order.
    ///
    /// Single-flight: if another run holds the gate this returns
    /// `AlreadyRunning` immediately rather than queueing.
    pub async fn generate(&self) -> Result<Vec<PathBuf>, GenerationError> {
        let _guard = self
            .gate
            .try_lock()
            .map_err(|_| GenerationError::AlreadyRunning)?;
        self.run_tool().await
    }

    async fn run_tool(&self) -> Result<Vec<PathBuf>, GenerationError> {
        let dir = &self.settings.install_dir;
        let before = artifact_snapshot(dir)?;

        info!(program = %self.settings.program, dir = %dir.display(), "running huami-token");

        let mut cmd = tokio::process::Command::new(&self.settings.program);
        cmd.arg("-e")
            .arg(&self.settings.email)
            .arg("-p")
            .arg(&self.settings.password)
            .args(["-m", "amazfit", "--gps"])
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.settings.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_secs = self.settings.timeout.as_secs(), "huami-token timed out");
                return Err(GenerationError::Timeout(self.settings.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stdout.is_empty() {
            info!("huami-token stdout: {}", stdout.trim_end());
        }
        if !stderr.is_empty() {
            warn!("huami-token stderr: {}", stderr.trim_end());
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(GenerationError::ToolFailed { exit_code, stderr });
        }

        match self.settings.artifact_mode {
            ArtifactMode::Files => discover_artifacts(dir, &before),
            ArtifactMode::Stdout => {
                let record = parse::parse_device_key(&stdout, chrono::Local::now())
                    .ok_or(GenerationError::NoArtifacts)?;
                let path = parse::write_record_file(&record, dir)?;
                info!(file = %path.display(), "materialized device key record");
                Ok(vec![path])
            }
        }
    }
}

/// True if the path carries one of the known artifact extensions.
fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ARTIFACT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Artifact-suffixed files present in `dir` right now.
fn artifact_snapshot(dir: &Path) -> Result<HashSet<PathBuf>, GenerationError> {
    let mut present = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_artifact(&path) {
            present.insert(path);
        }
    }
    Ok(present)
}

/// Artifact files that appeared since the pre-run snapshot.
fn discover_artifacts(
    dir: &Path,
    before: &HashSet<PathBuf>,
) -> Result<Vec<PathBuf>, GenerationError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_artifact(&path) && !before.contains(&path) {
            info!(file = %path.display(), "found generated artifact");
            found.push(path);
        }
    }
    found.sort();

    if found.is_empty() {
        Err(GenerationError::NoArtifacts)
    } else {
        Ok(found)
    }
}
