use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::kubernetes::ClusterApi;
use crate::rules::RuleSet;
use crate::types::{DeleteOutcome, EventRecord, NamespaceScope, PassSummary, PodPhase, PodRef};
use crate::utils::format_age;

#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Wait this long and re-list before deleting. Zero skips the re-check.
    pub settle_delay: Duration,
    pub pass_timeout: Option<Duration>,
    pub dry_run: bool,
}

/// Stateless single pass over Pending pods: list, evaluate events, delete matches.
pub struct Remediator<C> {
    cluster: C,
    rules: RuleSet,
    scope: NamespaceScope,
    options: PassOptions,
}

impl<C: ClusterApi> Remediator<C> {
    pub fn new(cluster: C, rules: RuleSet, scope: NamespaceScope, options: PassOptions) -> Self {
        Self {
            cluster,
            rules,
            scope,
            options,
        }
    }

    pub async fn list_pending_pods(&self) -> Result<Vec<PodRef>> {
        let pods = self.cluster.list_pods(&self.scope).await?;
        Ok(pods
            .into_iter()
            .filter(|p| {
                if p.phase != PodPhase::Pending {
                    debug!("[{}] Ignoring pod in phase {}", p, p.phase);
                }
                p.phase == PodPhase::Pending
            })
            .collect())
    }

    pub async fn list_events_for(&self, pod: &PodRef) -> Result<Vec<EventRecord>> {
        let events = self.cluster.list_events(pod).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.namespace == pod.namespace && e.pod_name == pod.name)
            .filter(|e| match (&pod.uid, &e.pod_uid) {
                (Some(pod_uid), Some(event_uid)) => pod_uid == event_uid,
                _ => true,
            })
            .collect())
    }

    pub async fn remediate(&self, pod: &PodRef) -> Result<DeleteOutcome> {
        self.cluster.delete_pod(pod).await
    }

    /// Runs one pass. Only a connectivity failure while listing pods is returned
    /// as an error; per-pod failures are logged and counted.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PassSummary> {
        let started = Instant::now();
        let deadline = self.options.pass_timeout.map(|t| started + t);
        let mut summary = PassSummary {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let pending = self.list_pending_pods().await?;
        debug!("{} pending pod(s) in {}", pending.len(), self.scope);

        let mut candidates = Vec::new();
        for pod in pending {
            if stop_requested(cancel, deadline) {
                summary.interrupted = true;
                break;
            }
            summary.inspected += 1;

            let events = match self.list_events_for(&pod).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("[{}] Skipping: {}", pod, e);
                    summary.event_errors += 1;
                    continue;
                }
            };

            let now = Utc::now();
            if let Some(hit) = self.rules.first_match(&events, now) {
                let age = hit
                    .event
                    .last_timestamp
                    .map(|t| format_age(t, now))
                    .unwrap_or_else(|| "unknown".to_string());
                info!(
                    "[{}] Matched rule '{}': {} {} (x{}, {} ago): {}",
                    pod,
                    hit.rule,
                    hit.event.type_.as_deref().unwrap_or("Unknown"),
                    hit.event.reason,
                    hit.event.count.unwrap_or(1),
                    age,
                    hit.event.message
                );
                summary.matched += 1;
                candidates.push(pod);
            } else {
                debug!("[{}] No matching event among {}", pod, events.len());
            }
        }

        let needs_settle = !candidates.is_empty() && !self.options.settle_delay.is_zero();
        if needs_settle && !summary.interrupted {
            candidates = self
                .settle(candidates, cancel, deadline, &mut summary)
                .await?;
        }

        for pod in candidates {
            if stop_requested(cancel, deadline) {
                summary.interrupted = true;
                break;
            }
            if self.options.dry_run {
                info!("[{}] Dry run: would delete pod", pod);
                summary.would_delete += 1;
                continue;
            }
            match self.remediate(&pod).await {
                Ok(DeleteOutcome::Deleted) => {
                    info!("[{}] Deleted pod", pod);
                    summary.deleted += 1;
                }
                Ok(DeleteOutcome::AlreadyGone) => {
                    info!("[{}] Pod already gone", pod);
                    summary.already_gone += 1;
                }
                Err(e) => {
                    error!("{}", e);
                    summary.delete_errors += 1;
                }
            }
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Waits out the settle delay, then keeps only candidates still Pending.
    /// Cancellation or the pass deadline during the wait drops all candidates.
    async fn settle(
        &self,
        candidates: Vec<PodRef>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        summary: &mut PassSummary,
    ) -> Result<Vec<PodRef>> {
        debug!(
            "Waiting {:?} before deleting {} pod(s)",
            self.options.settle_delay,
            candidates.len()
        );
        let expired = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                summary.interrupted = true;
                return Ok(Vec::new());
            }
            _ = expired => {
                warn!(
                    "Pass deadline reached while waiting to re-check {} pod(s)",
                    candidates.len()
                );
                summary.interrupted = true;
                return Ok(Vec::new());
            }
            _ = tokio::time::sleep(self.options.settle_delay) => {}
        }

        let pending = self.list_pending_pods().await?;
        let (still_pending, moved_on): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| pending.iter().any(|p| p.same_identity(c)));
        for pod in &moved_on {
            info!("[{}] No longer pending, leaving it alone", pod);
        }
        summary.skipped += moved_on.len();
        Ok(still_pending)
    }
}

fn stop_requested(cancel: &CancellationToken, deadline: Option<Instant>) -> bool {
    cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d)
}
