//! The weekly trigger loop.
//!
//! Two states: waiting (asleep until the next occurrence) and triggering
//! (running the supplied callback). After a trigger — success or failure —
//! the next occurrence is recomputed from the current instant, so a run
//! that finishes late still lands on the following weekly slot. A failed
//! trigger is followed by a fixed recovery sleep instead of a full week.

use std::future::Future;
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ScheduleConfig;
use crate::occurrence::next_occurrence;

/// Run the schedule loop until `cancel` fires.
///
/// There is no persisted checkpoint: a restart recomputes from the restart
/// instant, so an occurrence that passed while the process was down is
/// skipped silently.
pub async fn run_schedule_loop<F, Fut>(
    schedule: ScheduleConfig,
    recovery: Duration,
    cancel: CancellationToken,
    mut trigger: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    info!(
        weekday = %schedule.weekday(),
        time = %schedule.time_of_day(),
        "schedule loop started"
    );

    loop {
        let now = Local::now();
        let target = next_occurrence(&now, &schedule);
        let wait = (target.clone() - now).to_std().unwrap_or(Duration::ZERO);

        info!(
            target = %target.format("%Y-%m-%d %H:%M"),
            wait_secs = wait.as_secs(),
            "waiting for next occurrence"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        info!("scheduled trigger fired");
        if let Err(e) = trigger().await {
            error!("scheduled run failed: {e:#}");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(recovery) => {}
            }
        }
    }

    info!("schedule loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loop_exits_promptly_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(
            Duration::from_secs(2),
            run_schedule_loop(
                ScheduleConfig::default(),
                Duration::from_secs(3600),
                cancel,
                || async { Ok(()) },
            ),
        )
        .await
        .expect("schedule loop should exit promptly on cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_fires_and_recomputes() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let fired = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let fired = fired.clone();
            let cancel = cancel.clone();
            async move {
                run_schedule_loop(
                    ScheduleConfig::default(),
                    Duration::from_secs(3600),
                    cancel,
                    move || {
                        let fired = fired.clone();
                        async move {
                            fired.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    },
                )
                .await;
            }
        });

        // Let the loop register its first sleep, then advance past it.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(8 * 24 * 3600)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(8 * 24 * 3600)).await;
        tokio::task::yield_now().await;

        assert!(fired.load(Ordering::SeqCst) >= 1);

        cancel.cancel();
        let _ = handle.await;
    }
}
