use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A pending expiration countdown for one active-quest record.
///
/// The deadline itself lives in the durable record; the timer only carries
/// the spawned task and the generation it belongs to.
pub struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl ArmedTimer {
    /// Bundle a spawned countdown task with its generation token.
    pub fn new(generation: u64, handle: JoinHandle<()>) -> Self {
        Self { generation, handle }
    }
}

/// Process-local set of pending expiration timers, keyed by record id.
///
/// The set is not authoritative: the durable status field is. Entries are
/// rebuilt from storage by the reconciler after a restart. The generation
/// counter lets a fired task release only its own entry, so re-arming a
/// record never races its predecessor's callback.
#[derive(Default)]
pub struct TimerSet {
    entries: DashMap<Uuid, ArmedTimer>,
    generation: AtomicU64,
}

impl TimerSet {
    /// Create an empty timer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next generation token.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Install a timer for a record, aborting any countdown it replaces.
    pub fn insert(&self, record_id: Uuid, timer: ArmedTimer) {
        if let Some(previous) = self.entries.insert(record_id, timer) {
            previous.handle.abort();
        }
    }

    /// Whether a countdown is currently registered for the record.
    pub fn is_armed(&self, record_id: Uuid) -> bool {
        self.entries.contains_key(&record_id)
    }

    /// Abort and remove the countdown for a record.
    ///
    /// No-op when the record has no timer; safe to call for timers that have
    /// already fired or been cancelled.
    pub fn cancel(&self, record_id: Uuid) -> bool {
        match self.entries.remove(&record_id) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Remove an entry without aborting it, only when the generation matches.
    ///
    /// Called by the countdown task itself right before it fires, so a timer
    /// that replaced it keeps its own entry.
    pub fn release(&self, record_id: Uuid, generation: u64) -> bool {
        self.entries
            .remove_if(&record_id, |_, timer| timer.generation == generation)
            .is_some()
    }

    /// Number of pending timers, used by logs and tests.
    pub fn armed_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_handle() -> JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        })
    }

    #[tokio::test]
    async fn insert_replaces_and_cancel_is_idempotent() {
        let set = TimerSet::new();
        let id = Uuid::new_v4();

        let first = set.next_generation();
        set.insert(id, ArmedTimer::new(first, idle_handle()));
        let second = set.next_generation();
        set.insert(id, ArmedTimer::new(second, idle_handle()));
        assert_eq!(set.armed_count(), 1);

        assert!(set.cancel(id));
        assert!(!set.cancel(id));
        assert!(!set.is_armed(id));
    }

    #[tokio::test]
    async fn release_only_matches_its_own_generation() {
        let set = TimerSet::new();
        let id = Uuid::new_v4();

        let stale = set.next_generation();
        let current = set.next_generation();
        set.insert(id, ArmedTimer::new(current, idle_handle()));

        assert!(!set.release(id, stale), "a replaced timer must not evict its successor");
        assert!(set.is_armed(id));
        assert!(set.release(id, current));
        assert!(!set.is_armed(id));
    }
}
