//! In-process storage backend.
//!
//! Used when the server runs without a database (small events, local
//! development) and by the engine's tests. Iteration order is insertion
//! order so list operations stay deterministic.

use std::sync::Arc;
use std::time::SystemTime;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::models::{ActiveQuestEntity, ActiveQuestStatus, QuestEntity, TeamEntity, TeamStatus};
use crate::dao::quest_store::QuestStore;
use crate::dao::storage::{StorageError, StorageResult};

/// Quest store keeping all records in process memory.
#[derive(Clone, Default)]
pub struct MemoryQuestStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    quests: IndexMap<Uuid, QuestEntity>,
    teams: IndexMap<Uuid, TeamEntity>,
    active_quests: IndexMap<Uuid, ActiveQuestEntity>,
}

impl MemoryQuestStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuestStore for MemoryQuestStore {
    fn save_quest(&self, quest: QuestEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inner = store.inner.write().await;
            inner.quests.insert(quest.id, quest);
            Ok(())
        })
    }

    fn find_quest(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let inner = store.inner.read().await;
            Ok(inner.quests.get(&id).cloned())
        })
    }

    fn list_quests(&self) -> BoxFuture<'static, StorageResult<Vec<QuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let inner = store.inner.read().await;
            Ok(inner.quests.values().cloned().collect())
        })
    }

    fn save_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inner = store.inner.write().await;
            inner.teams.insert(team.id, team);
            Ok(())
        })
    }

    fn find_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let inner = store.inner.read().await;
            Ok(inner.teams.get(&id).cloned())
        })
    }

    fn team_members(&self, team_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            let inner = store.inner.read().await;
            inner
                .teams
                .get(&team_id)
                .map(|team| team.members.clone())
                .ok_or(StorageError::Missing {
                    entity: "team",
                    id: team_id,
                })
        })
    }

    fn add_team_xp(&self, team_id: Uuid, amount: i64) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inner = store.inner.write().await;
            let team = inner.teams.get_mut(&team_id).ok_or(StorageError::Missing {
                entity: "team",
                id: team_id,
            })?;
            team.xp += amount;
            team.updated_at = SystemTime::now();
            Ok(team.xp)
        })
    }

    fn set_team_status(
        &self,
        team_id: Uuid,
        status: TeamStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inner = store.inner.write().await;
            let team = inner.teams.get_mut(&team_id).ok_or(StorageError::Missing {
                entity: "team",
                id: team_id,
            })?;
            team.status = status;
            team.updated_at = SystemTime::now();
            Ok(())
        })
    }

    fn create_active_quest(
        &self,
        quest_id: Uuid,
        team_id: Uuid,
        ends_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ActiveQuestEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let now = SystemTime::now();
            let record = ActiveQuestEntity {
                id: Uuid::new_v4(),
                quest_id,
                team_id,
                ends_at,
                status: ActiveQuestStatus::Running,
                validated: false,
                created_at: now,
                updated_at: now,
            };
            let mut inner = store.inner.write().await;
            inner.active_quests.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn find_active_quest(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let inner = store.inner.read().await;
            Ok(inner.active_quests.get(&id).cloned())
        })
    }

    fn list_active_quests_by_team(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let inner = store.inner.read().await;
            Ok(inner
                .active_quests
                .values()
                .filter(|record| record.team_id == team_id)
                .cloned()
                .collect())
        })
    }

    fn list_active_quests_by_status(
        &self,
        status: ActiveQuestStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let inner = store.inner.read().await;
            Ok(inner
                .active_quests
                .values()
                .filter(|record| record.status == status)
                .cloned()
                .collect())
        })
    }

    fn complete_active_quest(
        &self,
        id: Uuid,
        validated: bool,
    ) -> BoxFuture<'static, StorageResult<Option<ActiveQuestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            // The whole check-and-transition happens under the write lock, so
            // concurrent finish/expire callers observe exactly one winner.
            let mut inner = store.inner.write().await;
            let Some(record) = inner.active_quests.get_mut(&id) else {
                return Ok(None);
            };
            if record.status != ActiveQuestStatus::Running {
                return Ok(None);
            }
            record.status = ActiveQuestStatus::Finished;
            record.validated = validated;
            record.updated_at = SystemTime::now();
            Ok(Some(record.clone()))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn quest(name: &str) -> QuestEntity {
        let now = SystemTime::now();
        QuestEntity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            place: "courtyard".into(),
            clue: "under the old oak".into(),
            lore: String::new(),
            time_limit_minutes: 10,
            xp_reward: 100,
            proctor_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn complete_transitions_a_running_record_exactly_once() {
        let store = MemoryQuestStore::new();
        let team_id = Uuid::new_v4();
        let record = store
            .create_active_quest(Uuid::new_v4(), team_id, SystemTime::now())
            .await
            .unwrap();

        let first = store.complete_active_quest(record.id, true).await.unwrap();
        let winner = first.expect("first completion should win");
        assert_eq!(winner.status, ActiveQuestStatus::Finished);
        assert!(winner.validated);

        let second = store.complete_active_quest(record.id, false).await.unwrap();
        assert!(second.is_none(), "terminal records must not transition again");

        let stored = store
            .find_active_quest(record.id)
            .await
            .unwrap()
            .expect("record still stored");
        assert!(stored.validated, "losing caller must not overwrite the outcome");
    }

    #[tokio::test]
    async fn complete_on_unknown_record_is_none() {
        let store = MemoryQuestStore::new();
        let outcome = store
            .complete_active_quest(Uuid::new_v4(), false)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn status_listing_filters_records() {
        let store = MemoryQuestStore::new();
        let team_id = Uuid::new_v4();
        let ends_at = SystemTime::now() + Duration::from_secs(60);
        let running = store
            .create_active_quest(Uuid::new_v4(), team_id, ends_at)
            .await
            .unwrap();
        let finished = store
            .create_active_quest(Uuid::new_v4(), team_id, ends_at)
            .await
            .unwrap();
        store
            .complete_active_quest(finished.id, false)
            .await
            .unwrap();

        let listed = store
            .list_active_quests_by_status(ActiveQuestStatus::Running)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, running.id);

        let by_team = store.list_active_quests_by_team(team_id).await.unwrap();
        assert_eq!(by_team.len(), 2);
    }

    #[tokio::test]
    async fn xp_increments_accumulate() {
        let store = MemoryQuestStore::new();
        let q = quest("warmup");
        store.save_quest(q).await.unwrap();

        let now = SystemTime::now();
        let team = TeamEntity {
            id: Uuid::new_v4(),
            name: "red".into(),
            members: vec![Uuid::new_v4()],
            xp: 0,
            status: TeamStatus::Playing,
            created_at: now,
            updated_at: now,
        };
        store.save_team(team.clone()).await.unwrap();

        assert_eq!(store.add_team_xp(team.id, 100).await.unwrap(), 100);
        assert_eq!(store.add_team_xp(team.id, 50).await.unwrap(), 150);
    }
}
