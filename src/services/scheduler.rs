//! Expiration timers and the durable-state reconciler.
//!
//! Timers are a latency optimization only: a lost or late timer is covered
//! by [`reconcile_all`], which re-derives the pending set from storage and
//! resolves overdue records directly. Correctness never depends on a timer
//! surviving a restart.

use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::ActiveQuestStatus,
    error::ServiceError,
    services::lifecycle,
    state::{ArmedTimer, SharedState},
};

/// Delay before the first reconciliation pass after boot.
const STARTUP_DELAY: Duration = Duration::from_secs(1);

/// Arm (or re-arm) the expiration countdown for an active-quest record.
///
/// Replaces any existing timer for the id. A deadline already in the past
/// fires through the spawned task on the next scheduler tick, never inline,
/// so `arm` cannot reenter the lifecycle operations that call it.
pub fn arm(state: &SharedState, active_quest_id: Uuid, ends_at: SystemTime) {
    let generation = state.timers().next_generation();
    let task_state = state.clone();

    let handle = tokio::spawn(async move {
        let delay = ends_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        sleep(delay).await;

        // Drop our own entry first: once released, a concurrent cancel can no
        // longer abort this task mid-expiration.
        task_state.timers().release(active_quest_id, generation);
        if let Err(err) = lifecycle::expire(&task_state, active_quest_id).await {
            warn!(
                %active_quest_id,
                error = %err,
                "scheduled expiration failed; next reconciliation pass retries"
            );
        }
    });

    state
        .timers()
        .insert(active_quest_id, ArmedTimer::new(generation, handle));
    debug!(%active_quest_id, "armed expiration timer");
}

/// Cancel the pending countdown for a record.
///
/// Safe to call for a timer that already fired, was already cancelled, or
/// never existed. Callers only cancel after the record left the running
/// state, so an aborted countdown never loses a transition.
pub fn cancel(state: &SharedState, active_quest_id: Uuid) {
    if state.timers().cancel(active_quest_id) {
        debug!(%active_quest_id, "cancelled expiration timer");
    }
}

/// Reconcile the in-memory timer set against durable state.
///
/// Overdue running records are expired directly (covers timers lost to a
/// restart); future ones get a timer armed from their stored deadline.
pub async fn reconcile_all(state: &SharedState) -> Result<(), ServiceError> {
    let store = state.require_quest_store().await?;
    let running = store
        .list_active_quests_by_status(ActiveQuestStatus::Running)
        .await?;

    let now = SystemTime::now();
    let mut expired = 0usize;
    let mut armed = 0usize;
    for record in running {
        if record.ends_at <= now {
            if let Err(err) = lifecycle::expire(state, record.id).await {
                warn!(
                    active_quest_id = %record.id,
                    error = %err,
                    "failed to expire overdue record during reconciliation"
                );
            } else {
                expired += 1;
            }
        } else if !state.timers().is_armed(record.id) {
            arm(state, record.id, record.ends_at);
            armed += 1;
        }
    }

    if expired > 0 || armed > 0 {
        debug!(expired, armed, "reconciled running records");
    }
    Ok(())
}

/// Periodic reconciliation loop; spawned once at startup.
///
/// Runs one pass shortly after boot (rebuilding timers that did not survive
/// the previous process), then keeps going at the configured interval as the
/// fallback for missed or late timers.
pub async fn run_reconciler(state: SharedState) {
    sleep(STARTUP_DELAY).await;
    loop {
        match reconcile_all(&state).await {
            Ok(()) => {}
            Err(ServiceError::Degraded) => {
                debug!("skipping reconciliation while storage is unavailable");
            }
            Err(err) => {
                warn!(error = %err, "reconciliation pass failed");
            }
        }
        sleep(state.config().reconcile_interval()).await;
    }
}
