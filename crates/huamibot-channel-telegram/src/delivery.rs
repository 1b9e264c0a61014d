//! Document delivery: send each artifact, then delete it locally.
//!
//! Per-file failures do not abort the batch; only an unreachable endpoint
//! does. A file is deleted if and only if its send was confirmed — a failed
//! deletion is logged and the file is not re-queued.

use std::path::PathBuf;

use chrono::Local;
use tracing::{info, warn};

use crate::{ChannelError, SendError, Transport};

/// Result of one attempted file send.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub file: PathBuf,
    pub sent: bool,
    pub error: Option<String>,
}

/// Send `files` to `chat_id` as document attachments, deleting each file
/// after its send is confirmed.
///
/// Returns one outcome per file. Fails as a whole only when the transport
/// reports the endpoint itself unreachable; the files not yet attempted
/// stay on disk.
pub async fn deliver_files<T: Transport + ?Sized>(
    transport: &T,
    chat_id: i64,
    files: &[PathBuf],
) -> Result<Vec<DeliveryOutcome>, ChannelError> {
    let mut outcomes = Vec::with_capacity(files.len());

    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let caption = format!(
            "📄 GPS Data File\nFile: {name}\nGenerated: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        match transport.send_document(chat_id, file, &caption).await {
            Ok(()) => {
                info!(file = %file.display(), "sent artifact");
                match std::fs::remove_file(file) {
                    Ok(()) => info!(file = %file.display(), "deleted artifact after send"),
                    Err(e) => warn!(file = %file.display(), "failed to delete artifact: {e}"),
                }
                outcomes.push(DeliveryOutcome {
                    file: file.clone(),
                    sent: true,
                    error: None,
                });
            }
            Err(SendError::Unreachable(msg)) => {
                warn!(file = %file.display(), "endpoint unreachable: {msg}");
                return Err(ChannelError(msg));
            }
            Err(SendError::Transport(msg)) => {
                warn!(file = %file.display(), "send failed, file left on disk: {msg}");
                outcomes.push(DeliveryOutcome {
                    file: file.clone(),
                    sent: false,
                    error: Some(msg),
                });
            }
        }
    }

    let sent = outcomes.iter().filter(|o| o.sent).count();
    info!(sent, total = outcomes.len(), "delivery batch finished");
    Ok(outcomes)
}
