//! Background worker that delivers due scheduled emails.
//!
//! Runs as a Tokio task, ticking at a fixed interval until told to stop via
//! a [`watch`] channel. Each tick holds the store lock for the whole
//! scan-deliver-mark cycle. A row whose time has come is attempted once,
//! best effort, and then marked `sent` whatever the per-recipient outcome.
//! Rows with an unreadable time stay `pending` forever.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::time::parse_send_at;
use super::{ScheduleError, ScheduleStore};
use crate::mail::Outbox;

/// Shared dependencies for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerDeps {
    /// Where scheduled emails live.
    pub store: Arc<ScheduleStore>,
    /// Sends due emails.
    pub outbox: Arc<Outbox>,
    /// Offset for `YYYY-MM-DD HH:MM` times.
    pub utc_offset: FixedOffset,
    /// Time between ticks.
    pub interval: Duration,
}

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Pending rows scanned.
    pub scanned: usize,
    /// Row ids that were attempted and marked sent.
    pub attempted: Vec<i64>,
    /// Row ids skipped because `send_at` did not parse.
    pub unparseable: Vec<i64>,
}

/// Run the worker loop until `shutdown_rx` flips to `true` or closes.
///
/// The first tick fires one full interval after start.
pub async fn run_worker(deps: WorkerDeps, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        interval_secs = deps.interval.as_secs(),
        "scheduled worker started"
    );

    let mut interval = tokio::time::interval(deps.interval);
    // Skip the immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_tick(&deps.store, &deps.outbox, deps.utc_offset, Utc::now()).await {
                    Ok(summary) if !summary.attempted.is_empty() => {
                        info!(
                            scanned = summary.scanned,
                            attempted = summary.attempted.len(),
                            unparseable = summary.unparseable.len(),
                            "scheduled tick completed"
                        );
                    }
                    Ok(summary) => {
                        debug!(scanned = summary.scanned, "scheduled tick: nothing due");
                    }
                    Err(e) => {
                        error!(error = %e, "scheduled tick failed");
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("scheduled worker shutting down");
                    break;
                }
            }
        }
    }

    info!("scheduled worker stopped");
}

/// Execute one scan-deliver-mark cycle as of `now`.
///
/// # Errors
///
/// Returns an error if pending rows cannot be read or a row cannot be marked.
/// Delivery failures are logged, never returned.
pub async fn run_tick(
    store: &ScheduleStore,
    outbox: &Outbox,
    utc_offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<TickSummary, ScheduleError> {
    let guard = store.lock().await;
    let pending = guard.list_pending().await?;

    let mut summary = TickSummary {
        scanned: pending.len(),
        ..TickSummary::default()
    };

    for email in &pending {
        let Some(due) = parse_send_at(&email.send_at, utc_offset) else {
            warn!(
                scheduled_id = email.id,
                send_at = %email.send_at,
                "unparseable send time, leaving pending"
            );
            summary.unparseable.push(email.id);
            continue;
        };
        if due > now {
            continue;
        }

        let report = outbox.send_best_effort(&email.draft()).await;
        if let Some(ref e) = report.not_attempted {
            warn!(scheduled_id = email.id, error = %e, "scheduled email not sent");
        }
        for (recipient, e) in &report.failed {
            warn!(
                scheduled_id = email.id,
                recipient = %recipient,
                error = %e,
                "scheduled delivery failed"
            );
        }
        debug!(
            scheduled_id = email.id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "scheduled email attempted"
        );
        summary.attempted.push(email.id);
    }

    for id in &summary.attempted {
        guard.mark_sent(*id).await?;
    }

    Ok(summary)
}
