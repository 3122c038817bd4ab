use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::kubernetes::ClusterApi;
use crate::remediator::Remediator;
use crate::types::PassSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Interval(Duration),
}

/// Drives the remediator once or on an interval until cancelled, returning the
/// summary of the last completed pass.
///
/// In `Once` mode a failed pass is returned to the caller. In `Interval` mode
/// failures are logged and the next pass runs on schedule.
pub async fn drive<C: ClusterApi>(
    remediator: &Remediator<C>,
    mode: RunMode,
    cancel: &CancellationToken,
) -> Result<Option<PassSummary>> {
    let mut last = None;
    match mode {
        RunMode::Once => {
            let summary = remediator.run(cancel).await?;
            log_summary(&summary);
            last = Some(summary);
        }
        RunMode::Interval(every) => loop {
            match remediator.run(cancel).await {
                Ok(summary) => {
                    log_summary(&summary);
                    last = Some(summary);
                }
                Err(e) => error!("Pass failed, retrying in {:?}: {}", every, e),
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, stopping");
                    break;
                }
                _ = tokio::time::sleep(every) => {}
            }
        },
    }
    Ok(last)
}

/// Waits on `interrupted` twice. The first interrupt cancels `cancel` so the
/// current pass winds down; a second one returns `true` and the caller should
/// exit without waiting. Returns `false` if the signal source fails.
pub async fn escalate_interrupts<F, Fut>(mut interrupted: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = interrupted().await {
        warn!("Cannot listen for interrupts: {}", e);
        return false;
    }
    info!("Interrupted, finishing current pod (interrupt again to exit now)");
    cancel.cancel();

    if interrupted().await.is_err() {
        return false;
    }
    warn!("Interrupted again, exiting immediately");
    true
}

fn log_summary(s: &PassSummary) {
    let (verb, deleted) = if s.dry_run {
        ("would delete", s.would_delete)
    } else {
        ("deleted", s.deleted)
    };
    if s.failures() > 0 || s.interrupted {
        warn!(
            "Pass finished in {:?}{}: inspected {}, matched {}, {} {}, already gone {}, skipped {}, event errors {}, delete errors {}",
            s.elapsed,
            if s.interrupted { " (interrupted)" } else { "" },
            s.inspected,
            s.matched,
            verb,
            deleted,
            s.already_gone,
            s.skipped,
            s.event_errors,
            s.delete_errors
        );
    } else {
        info!(
            "Pass finished in {:?}: inspected {}, matched {}, {} {}, already gone {}, skipped {}",
            s.elapsed, s.inspected, s.matched, verb, deleted, s.already_gone, s.skipped
        );
    }
}
