use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{ActiveQuestEntity, ActiveQuestStatus, QuestEntity, TeamEntity},
    dto::format_system_time,
};

/// Catalog quest as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestSnapshot {
    /// Quest identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Physical location of the quest.
    pub place: String,
    /// Hint handed to the team.
    pub clue: String,
    /// Flavor text.
    pub lore: String,
    /// Time allowed, in minutes.
    pub time_limit_minutes: u32,
    /// XP awarded on a validated completion.
    pub xp_reward: i64,
    /// Optional proctor supervising the quest.
    pub proctor_id: Option<Uuid>,
}

impl From<QuestEntity> for QuestSnapshot {
    fn from(value: QuestEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            place: value.place,
            clue: value.clue,
            lore: value.lore,
            time_limit_minutes: value.time_limit_minutes,
            xp_reward: value.xp_reward,
            proctor_id: value.proctor_id,
        }
    }
}

/// Active-quest record as exposed to clients, timestamps in RFC 3339.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveQuestSnapshot {
    /// Record identifier.
    pub id: Uuid,
    /// Quest being attempted.
    pub quest_id: Uuid,
    /// Team attempting the quest.
    pub team_id: Uuid,
    /// Deadline of the attempt.
    pub ends_at: String,
    /// Lifecycle status.
    pub status: ActiveQuestStatus,
    /// Whether the attempt counted (meaningful once finished).
    pub validated: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
}

impl From<ActiveQuestEntity> for ActiveQuestSnapshot {
    fn from(value: ActiveQuestEntity) -> Self {
        Self {
            id: value.id,
            quest_id: value.quest_id,
            team_id: value.team_id,
            ends_at: format_system_time(value.ends_at),
            status: value.status,
            validated: value.validated,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Outcome discriminant of an assignment request.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssignOutcomeKind {
    /// A new quest was assigned to the team.
    Assigned,
    /// Every catalog quest has been attempted; the team is done.
    Exhausted,
}

/// Response of `POST /teams/{team_id}/quests/next`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AssignQuestResponse {
    /// Outcome of the assignment.
    pub outcome: AssignOutcomeKind,
    /// The created record, absent on exhaustion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_quest: Option<ActiveQuestSnapshot>,
    /// The assigned quest, absent on exhaustion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quest: Option<QuestSnapshot>,
}

/// Body of `POST /active-quests/{id}/finish`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct FinishQuestRequest {
    /// Whether the proctor validated the attempt. A finish arriving past the
    /// deadline is recorded as not validated regardless of this flag.
    pub validated: bool,
}

/// Outcome discriminant of a finish request.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishOutcomeKind {
    /// This request performed the running→finished transition.
    Finished,
    /// The record had already left the running state; nothing changed.
    AlreadyFinished,
}

/// Response of `POST /active-quests/{id}/finish`.
#[derive(Debug, Serialize, ToSchema)]
pub struct FinishQuestResponse {
    /// Outcome of the finish request.
    pub outcome: FinishOutcomeKind,
    /// The record after the transition, absent on a stale no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_quest: Option<ActiveQuestSnapshot>,
}

/// A team's current running quest with its catalog details.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeamQuestView {
    /// The running record.
    pub active_quest: ActiveQuestSnapshot,
    /// Catalog details of the quest being attempted.
    pub quest: QuestSnapshot,
    /// Team identifier.
    pub team_id: Uuid,
    /// Current aggregate team xp.
    pub team_xp: i64,
    /// User ids of the team members.
    pub members: Vec<Uuid>,
}

impl TeamQuestView {
    /// Assemble the view from its persisted parts.
    pub fn new(record: ActiveQuestEntity, quest: QuestEntity, team: TeamEntity) -> Self {
        Self {
            active_quest: record.into(),
            quest: quest.into(),
            team_id: team.id,
            team_xp: team.xp,
            members: team.members,
        }
    }
}
