pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{ActiveQuestEntity, ActiveQuestStatus, QuestEntity, TeamEntity, TeamStatus};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for quests, teams, and active-quest
/// records.
///
/// `save_quest`/`save_team` are seeding hooks for the surrounding CRUD system;
/// the lifecycle engine itself only reads the catalog and the rosters.
/// `complete_active_quest` is the conditional write the race-resolution policy
/// relies on: it transitions a record out of `Running` at most once.
pub trait QuestStore: Send + Sync {
    /// Insert or replace a catalog quest.
    fn save_quest(&self, quest: QuestEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a catalog quest by id.
    fn find_quest(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestEntity>>>;
    /// Fetch the whole quest catalog.
    fn list_quests(&self) -> BoxFuture<'static, StorageResult<Vec<QuestEntity>>>;
    /// Insert or replace a team.
    fn save_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a team by id.
    fn find_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>>;
    /// User ids of the members of a team.
    fn team_members(&self, team_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;
    /// Atomically add `amount` to the team's xp counter, returning the new total.
    fn add_team_xp(&self, team_id: Uuid, amount: i64) -> BoxFuture<'static, StorageResult<i64>>;
    /// Update the team's event participation status.
    fn set_team_status(
        &self,
        team_id: Uuid,
        status: TeamStatus,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Create a new running active-quest record with the given deadline.
    fn create_active_quest(
        &self,
        quest_id: Uuid,
        team_id: Uuid,
        ends_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ActiveQuestEntity>>;
    /// Fetch an active-quest record by id.
    fn find_active_quest(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ActiveQuestEntity>>>;
    /// Every record ever created for a team, any status.
    fn list_active_quests_by_team(
        &self,
        team_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ActiveQuestEntity>>>;
    /// Every record currently in the given status, across all teams.
    fn list_active_quests_by_status(
        &self,
        status: ActiveQuestStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<ActiveQuestEntity>>>;
    /// Conditionally transition a record from `Running` to `Finished`.
    ///
    /// Returns the updated record when the caller won the transition, `None`
    /// when the record is unknown or had already left the running state.
    fn complete_active_quest(
        &self,
        id: Uuid,
        validated: bool,
    ) -> BoxFuture<'static, StorageResult<Option<ActiveQuestEntity>>>;
    /// Ping the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish a lost backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
