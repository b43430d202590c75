//! State-machine core of the quest engine.
//!
//! Every mutation of an active-quest record funnels through the three
//! operations here. The running→finished transition is decided by the
//! store's conditional write, so a manual finish racing a timer-driven
//! expiration resolves to exactly one winner; the loser becomes a no-op.

use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{ActiveQuestEntity, QuestEntity, TeamEntity, TeamStatus},
    error::ServiceError,
    services::{notifier, quest_picker, quest_picker::PickOutcome, scheduler},
    state::SharedState,
};

/// Result of assigning the next quest to a team.
#[derive(Debug)]
pub enum AssignOutcome {
    /// A new running record was created.
    Assigned {
        /// The created record.
        record: ActiveQuestEntity,
        /// Catalog details of the assigned quest.
        quest: QuestEntity,
    },
    /// The team has attempted every catalog quest; no record was created.
    Exhausted,
}

/// Result of a manual finish request.
#[derive(Debug)]
pub enum FinishOutcome {
    /// This call performed the transition.
    Finished {
        /// The record after the transition.
        record: ActiveQuestEntity,
    },
    /// The record had already left the running state.
    AlreadyFinished,
}

/// Assign the next quest to a team, or mark the team finished when none remain.
///
/// The has-running-record check and the record creation run under a per-team
/// gate so concurrent assignment attempts cannot create two running records.
/// Timers and notifications happen after the gate is released.
pub async fn assign_next(
    state: &SharedState,
    team_id: Uuid,
) -> Result<AssignOutcome, ServiceError> {
    let store = state.require_quest_store().await?;
    if store.find_team(team_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("team `{team_id}` not found")));
    }

    let gate = state.team_gate(team_id);
    let created = {
        let _guard = gate.lock().await;

        let history = store.list_active_quests_by_team(team_id).await?;
        if history.iter().any(ActiveQuestEntity::is_running) {
            return Err(ServiceError::InvalidState(format!(
                "team `{team_id}` already has a quest in progress"
            )));
        }

        match quest_picker::pick_next(&store, team_id).await? {
            PickOutcome::Exhausted => {
                store.set_team_status(team_id, TeamStatus::Finished).await?;
                None
            }
            PickOutcome::Candidate(quest) => {
                let ends_at = SystemTime::now() + quest.time_limit();
                let record = store.create_active_quest(quest.id, team_id, ends_at).await?;
                Some((record, quest))
            }
        }
    };

    let team = require_team(state, team_id).await?;
    match created {
        None => {
            info!(%team_id, "quest catalog exhausted; team marked finished");
            notifier::notify_exhausted(state, &team).await;
            Ok(AssignOutcome::Exhausted)
        }
        Some((record, quest)) => {
            scheduler::arm(state, record.id, record.ends_at);
            info!(
                %team_id,
                active_quest_id = %record.id,
                quest_id = %quest.id,
                "assigned quest to team"
            );
            notifier::notify_assignment(state, &team, &record, &quest).await;
            Ok(AssignOutcome::Assigned { record, quest })
        }
    }
}

/// Finish a running record on behalf of a proctor or admin.
///
/// Idempotent: a record that already left the running state yields
/// [`FinishOutcome::AlreadyFinished`] instead of an error, so retries and
/// races against the expiration path are harmless. A finish arriving past the
/// deadline is recorded as not validated regardless of the caller's flag.
pub async fn finish_manual(
    state: &SharedState,
    active_quest_id: Uuid,
    validated: bool,
) -> Result<FinishOutcome, ServiceError> {
    let store = state.require_quest_store().await?;
    let Some(record) = store.find_active_quest(active_quest_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "active quest `{active_quest_id}` not found"
        )));
    };
    if !record.is_running() {
        return Ok(FinishOutcome::AlreadyFinished);
    }

    let on_time = record.ends_at >= SystemTime::now();
    if validated && !on_time {
        debug!(%active_quest_id, "late manual finish; recording as not validated");
    }

    let Some(updated) = store
        .complete_active_quest(active_quest_id, validated && on_time)
        .await?
    else {
        // The expiration path transitioned the record between our read and
        // the conditional write.
        debug!(%active_quest_id, "manual finish lost the race; already finished");
        return Ok(FinishOutcome::AlreadyFinished);
    };

    // The countdown may already have fired or been cancelled; both are fine.
    scheduler::cancel(state, active_quest_id);

    if updated.validated {
        award_completion_xp(state, &updated).await?;
    }

    info!(
        %active_quest_id,
        team_id = %updated.team_id,
        validated = updated.validated,
        "active quest finished manually"
    );

    reassign_after_transition(state, updated.team_id).await?;
    Ok(FinishOutcome::Finished { record: updated })
}

/// Resolve an expired record; invoked by timers and the reconciler.
///
/// Unknown or already-finished records are no-ops, and a record whose stored
/// deadline has not actually passed is left alone (the reconciler re-arms its
/// timer from the stored deadline).
pub async fn expire(state: &SharedState, active_quest_id: Uuid) -> Result<(), ServiceError> {
    let store = state.require_quest_store().await?;
    let Some(record) = store.find_active_quest(active_quest_id).await? else {
        debug!(%active_quest_id, "expiration fired for unknown record");
        return Ok(());
    };
    if !record.is_running() {
        debug!(%active_quest_id, "expiration fired for a finished record");
        return Ok(());
    }
    if record.ends_at > SystemTime::now() {
        warn!(
            %active_quest_id,
            "expiration fired before the stored deadline; ignoring"
        );
        return Ok(());
    }

    let Some(updated) = store.complete_active_quest(active_quest_id, false).await? else {
        debug!(%active_quest_id, "expiration lost the race to a manual finish");
        return Ok(());
    };

    scheduler::cancel(state, active_quest_id);

    info!(
        %active_quest_id,
        team_id = %updated.team_id,
        "active quest expired"
    );

    reassign_after_transition(state, updated.team_id).await?;
    Ok(())
}

/// Hand the team its next quest after a terminal transition.
///
/// An external assignment may land between our transition and this call;
/// the conflict is benign because exactly one running record exists either
/// way, so it is not surfaced to the caller.
async fn reassign_after_transition(
    state: &SharedState,
    team_id: Uuid,
) -> Result<(), ServiceError> {
    match assign_next(state, team_id).await {
        Ok(_) => Ok(()),
        Err(ServiceError::InvalidState(message)) => {
            debug!(%team_id, %message, "skipping reassignment; team already has a quest");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// The team's current running record with its quest details, if any.
pub async fn current_for_team(
    state: &SharedState,
    team_id: Uuid,
) -> Result<Option<(ActiveQuestEntity, QuestEntity, TeamEntity)>, ServiceError> {
    let store = state.require_quest_store().await?;
    let team = require_team(state, team_id).await?;

    let history = store.list_active_quests_by_team(team_id).await?;
    let Some(running) = history.into_iter().find(ActiveQuestEntity::is_running) else {
        return Ok(None);
    };

    let Some(quest) = store.find_quest(running.quest_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "quest `{}` referenced by record `{}` not found",
            running.quest_id, running.id
        )));
    };

    Ok(Some((running, quest, team)))
}

async fn require_team(state: &SharedState, team_id: Uuid) -> Result<TeamEntity, ServiceError> {
    let store = state.require_quest_store().await?;
    store
        .find_team(team_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))
}

async fn award_completion_xp(
    state: &SharedState,
    record: &ActiveQuestEntity,
) -> Result<(), ServiceError> {
    let store = state.require_quest_store().await?;
    let Some(quest) = store.find_quest(record.quest_id).await? else {
        warn!(
            quest_id = %record.quest_id,
            "validated record references a missing quest; skipping xp award"
        );
        return Ok(());
    };
    let total = store.add_team_xp(record.team_id, quest.xp_reward).await?;
    debug!(team_id = %record.team_id, awarded = quest.xp_reward, total, "team xp updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use dashmap::DashMap;

    use super::*;
    use crate::config::AppConfig;
    use crate::dao::models::ActiveQuestStatus;
    use crate::dao::quest_store::{QuestStore, memory::MemoryQuestStore};
    use crate::dto::events::ServerEvent;
    use crate::state::{AppState, NotificationGateway};

    /// Gateway fake recording every push instead of touching sockets.
    #[derive(Default)]
    struct RecordingGateway {
        connections: DashMap<Uuid, Vec<Uuid>>,
        pushed: Mutex<Vec<(Uuid, ServerEvent)>>,
    }

    impl RecordingGateway {
        fn connect_user(&self, user_id: Uuid) -> Uuid {
            let connection_id = Uuid::new_v4();
            self.connections
                .entry(user_id)
                .or_default()
                .push(connection_id);
            connection_id
        }

        fn pushed_events(&self, name: &str) -> usize {
            self.pushed
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, event)| event.event.as_deref() == Some(name))
                .count()
        }
    }

    impl NotificationGateway for RecordingGateway {
        fn connections_for(&self, user_id: Uuid) -> Vec<Uuid> {
            self.connections
                .get(&user_id)
                .map(|ids| ids.clone())
                .unwrap_or_default()
        }

        fn push(&self, connection_id: Uuid, event: &ServerEvent) -> bool {
            self.pushed
                .lock()
                .unwrap()
                .push((connection_id, event.clone()));
            true
        }
    }

    struct Fixture {
        state: SharedState,
        store: Arc<dyn QuestStore>,
        gateway: Arc<RecordingGateway>,
        team: TeamEntity,
        quests: Vec<QuestEntity>,
    }

    fn quest(name: &str, time_limit_minutes: u32, xp_reward: i64) -> QuestEntity {
        let now = SystemTime::now();
        QuestEntity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            place: "market square".into(),
            clue: "ask the innkeeper".into(),
            lore: String::new(),
            time_limit_minutes,
            xp_reward,
            proctor_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn fixture(catalog: Vec<QuestEntity>, member_count: usize) -> Fixture {
        let gateway = Arc::new(RecordingGateway::default());
        let state = AppState::with_gateway(AppConfig::default(), gateway.clone());

        let store: Arc<dyn QuestStore> = Arc::new(MemoryQuestStore::new());
        state.install_quest_store(store.clone()).await;

        let members: Vec<Uuid> = (0..member_count).map(|_| Uuid::new_v4()).collect();
        for member in &members {
            gateway.connect_user(*member);
        }

        let now = SystemTime::now();
        let team = TeamEntity {
            id: Uuid::new_v4(),
            name: "night owls".into(),
            members,
            xp: 0,
            status: TeamStatus::Playing,
            created_at: now,
            updated_at: now,
        };
        store.save_team(team.clone()).await.unwrap();

        for quest in &catalog {
            store.save_quest(quest.clone()).await.unwrap();
        }

        Fixture {
            state,
            store,
            gateway,
            team,
            quests: catalog,
        }
    }

    async fn running_record(fx: &Fixture) -> Option<ActiveQuestEntity> {
        fx.store
            .list_active_quests_by_team(fx.team.id)
            .await
            .unwrap()
            .into_iter()
            .find(ActiveQuestEntity::is_running)
    }

    #[tokio::test]
    async fn assign_creates_a_running_record_from_the_catalog() {
        let catalog = vec![
            quest("first", 10, 100),
            quest("second", 20, 150),
            quest("third", 30, 200),
        ];
        let fx = fixture(catalog, 2).await;

        let before = SystemTime::now();
        let outcome = assign_next(&fx.state, fx.team.id).await.unwrap();
        let AssignOutcome::Assigned { record, quest } = outcome else {
            panic!("expected an assignment");
        };

        assert!(fx.quests.iter().any(|q| q.id == quest.id));
        assert_eq!(record.team_id, fx.team.id);
        assert_eq!(record.quest_id, quest.id);
        assert!(record.is_running());

        // end = assignment time + quest duration, with a little scheduling slack
        let lower = before + quest.time_limit();
        let upper = SystemTime::now() + quest.time_limit() + Duration::from_secs(1);
        assert!(record.ends_at >= lower && record.ends_at <= upper);

        assert!(fx.state.timers().is_armed(record.id));

        // one push per live member connection
        assert_eq!(fx.gateway.pushed_events("quest.assigned"), 2);
        assert_eq!(fx.gateway.pushed_events("quest.exhausted"), 0);
    }

    #[tokio::test]
    async fn assign_rejects_while_a_record_is_running() {
        let fx = fixture(vec![quest("only", 10, 100), quest("spare", 10, 100)], 1).await;

        assign_next(&fx.state, fx.team.id).await.unwrap();
        let err = assign_next(&fx.state, fx.team.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let history = fx
            .store
            .list_active_quests_by_team(fx.team.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn assign_on_unknown_team_is_not_found() {
        let fx = fixture(vec![quest("only", 10, 100)], 1).await;
        let err = assign_next(&fx.state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn assign_marks_the_team_finished_once_exhausted() {
        let fx = fixture(vec![quest("first", 10, 100), quest("second", 10, 100)], 2).await;

        // Burn through the whole catalog.
        for _ in 0..fx.quests.len() {
            let AssignOutcome::Assigned { record, .. } =
                assign_next(&fx.state, fx.team.id).await.unwrap()
            else {
                panic!("catalog should not be exhausted yet");
            };
            fx.store
                .complete_active_quest(record.id, true)
                .await
                .unwrap();
        }

        let outcome = assign_next(&fx.state, fx.team.id).await.unwrap();
        assert!(matches!(outcome, AssignOutcome::Exhausted));

        let team = fx.store.find_team(fx.team.id).await.unwrap().unwrap();
        assert_eq!(team.status, TeamStatus::Finished);

        let history = fx
            .store
            .list_active_quests_by_team(fx.team.id)
            .await
            .unwrap();
        assert_eq!(history.len(), fx.quests.len(), "exhaustion must not create a record");
        assert_eq!(fx.gateway.pushed_events("quest.exhausted"), 2);
    }

    #[tokio::test]
    async fn finish_before_the_deadline_validates_and_reassigns() {
        let fx = fixture(vec![quest("first", 10, 100), quest("second", 10, 150)], 1).await;

        let AssignOutcome::Assigned { record, quest } =
            assign_next(&fx.state, fx.team.id).await.unwrap()
        else {
            panic!("expected an assignment");
        };

        let outcome = finish_manual(&fx.state, record.id, true).await.unwrap();
        let FinishOutcome::Finished { record: finished } = outcome else {
            panic!("expected the finish to win");
        };
        assert_eq!(finished.status, ActiveQuestStatus::Finished);
        assert!(finished.validated);
        assert!(!fx.state.timers().is_armed(record.id));

        let team = fx.store.find_team(fx.team.id).await.unwrap().unwrap();
        assert_eq!(team.xp, quest.xp_reward);

        let next = running_record(&fx).await.expect("next quest assigned");
        assert_ne!(next.quest_id, quest.id);
        assert!(fx.state.timers().is_armed(next.id));
    }

    #[tokio::test]
    async fn late_finish_is_recorded_as_not_validated() {
        let fx = fixture(vec![quest("first", 10, 100)], 1).await;

        let overdue = fx
            .store
            .create_active_quest(
                fx.quests[0].id,
                fx.team.id,
                SystemTime::now() - Duration::from_secs(1),
            )
            .await
            .unwrap();

        let outcome = finish_manual(&fx.state, overdue.id, true).await.unwrap();
        let FinishOutcome::Finished { record } = outcome else {
            panic!("expected the finish to win");
        };
        assert!(!record.validated, "a late finish cannot count as on-time");

        let team = fx.store.find_team(fx.team.id).await.unwrap().unwrap();
        assert_eq!(team.xp, 0, "no xp for an invalidated attempt");
    }

    #[tokio::test]
    async fn repeated_finish_is_an_idempotent_noop() {
        let fx = fixture(vec![quest("first", 10, 100), quest("second", 10, 100)], 1).await;

        let AssignOutcome::Assigned { record, .. } =
            assign_next(&fx.state, fx.team.id).await.unwrap()
        else {
            panic!("expected an assignment");
        };

        let first = finish_manual(&fx.state, record.id, true).await.unwrap();
        assert!(matches!(first, FinishOutcome::Finished { .. }));
        let snapshot = fx
            .store
            .find_active_quest(record.id)
            .await
            .unwrap()
            .unwrap();

        let second = finish_manual(&fx.state, record.id, false).await.unwrap();
        assert!(matches!(second, FinishOutcome::AlreadyFinished));

        let unchanged = fx
            .store
            .find_active_quest(record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged, snapshot, "a stale finish must not alter the record");
    }

    #[tokio::test]
    async fn finish_on_unknown_record_is_not_found() {
        let fx = fixture(vec![quest("first", 10, 100)], 1).await;
        let err = finish_manual(&fx.state, Uuid::new_v4(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn expire_resolves_an_overdue_record_and_reassigns() {
        let fx = fixture(vec![quest("first", 10, 100), quest("second", 10, 100)], 1).await;

        let overdue = fx
            .store
            .create_active_quest(
                fx.quests[0].id,
                fx.team.id,
                SystemTime::now() - Duration::from_secs(5),
            )
            .await
            .unwrap();

        expire(&fx.state, overdue.id).await.unwrap();

        let record = fx
            .store
            .find_active_quest(overdue.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ActiveQuestStatus::Finished);
        assert!(!record.validated);

        let next = running_record(&fx).await.expect("next quest assigned");
        assert_eq!(next.quest_id, fx.quests[1].id);
    }

    #[tokio::test]
    async fn expire_before_the_deadline_is_a_noop() {
        let fx = fixture(vec![quest("first", 10, 100)], 1).await;

        let AssignOutcome::Assigned { record, .. } =
            assign_next(&fx.state, fx.team.id).await.unwrap()
        else {
            panic!("expected an assignment");
        };

        expire(&fx.state, record.id).await.unwrap();

        let unchanged = fx
            .store
            .find_active_quest(record.id)
            .await
            .unwrap()
            .unwrap();
        assert!(unchanged.is_running(), "an early expiration must not transition");
    }

    #[tokio::test]
    async fn expire_after_a_manual_finish_is_a_noop() {
        let fx = fixture(vec![quest("first", 10, 100), quest("second", 10, 100)], 1).await;

        let AssignOutcome::Assigned { record, .. } =
            assign_next(&fx.state, fx.team.id).await.unwrap()
        else {
            panic!("expected an assignment");
        };

        finish_manual(&fx.state, record.id, true).await.unwrap();
        expire(&fx.state, record.id).await.unwrap();

        let unchanged = fx
            .store
            .find_active_quest(record.id)
            .await
            .unwrap()
            .unwrap();
        assert!(unchanged.validated, "the stale expiration must not overwrite the outcome");

        let history = fx
            .store
            .list_active_quests_by_team(fx.team.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 2, "only the finish path may reassign");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_finish_and_expire_transition_exactly_once() {
        for _ in 0..20 {
            let fx = fixture(vec![quest("first", 10, 100), quest("second", 10, 100)], 1).await;

            // Overdue so the expiration path passes its due check.
            let contested = fx
                .store
                .create_active_quest(
                    fx.quests[0].id,
                    fx.team.id,
                    SystemTime::now() - Duration::from_secs(1),
                )
                .await
                .unwrap();

            let finish_state = fx.state.clone();
            let expire_state = fx.state.clone();
            let (finish_result, expire_result) = tokio::join!(
                tokio::spawn(async move { finish_manual(&finish_state, contested.id, true).await }),
                tokio::spawn(async move { expire(&expire_state, contested.id).await }),
            );
            finish_result.unwrap().unwrap();
            expire_result.unwrap().unwrap();

            let history = fx
                .store
                .list_active_quests_by_team(fx.team.id)
                .await
                .unwrap();
            assert_eq!(history.len(), 2, "exactly one reassignment must happen");

            let running: Vec<_> = history
                .iter()
                .filter(|record| record.is_running())
                .collect();
            assert_eq!(running.len(), 1, "one running record per team");
            assert_eq!(running[0].quest_id, fx.quests[1].id);

            let contested_after = fx
                .store
                .find_active_quest(contested.id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(contested_after.status, ActiveQuestStatus::Finished);
            assert!(!contested_after.validated, "overdue finish can never validate");

            // Exactly one assignment fan-out reached the single connection.
            assert_eq!(fx.gateway.pushed_events("quest.assigned"), 1);
        }
    }
}
