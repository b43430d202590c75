use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Catalog quest definition created by event administrators.
///
/// Quests are immutable as far as the lifecycle engine is concerned: once an
/// active-quest record references one, the catalog entry stays in place (the
/// store exposes no quest deletion).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestEntity {
    /// Stable identifier for the quest.
    pub id: Uuid,
    /// Display name shown to players.
    pub name: String,
    /// Physical location where the quest takes place.
    pub place: String,
    /// Hint handed to the team when the quest is assigned.
    pub clue: String,
    /// Flavor text accompanying the quest.
    pub lore: String,
    /// Time allowed to complete the quest, in minutes.
    pub time_limit_minutes: u32,
    /// XP awarded to the team on a validated completion.
    pub xp_reward: i64,
    /// Optional proctor (staff referent) supervising the quest on site.
    pub proctor_id: Option<Uuid>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the quest definition was updated.
    pub updated_at: SystemTime,
}

impl QuestEntity {
    /// Time limit expressed as a [`Duration`].
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(u64::from(self.time_limit_minutes) * 60)
    }
}

/// Lifecycle status of an active-quest record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActiveQuestStatus {
    /// The team is currently attempting the quest.
    Running,
    /// The attempt is over; `validated` tells whether it counted.
    Finished,
}

impl ActiveQuestStatus {
    /// Canonical string form used by storage backends in filters.
    pub fn as_str(self) -> &'static str {
        match self {
            ActiveQuestStatus::Running => "running",
            ActiveQuestStatus::Finished => "finished",
        }
    }
}

/// One team's attempt at one quest, with a deadline and a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveQuestEntity {
    /// Primary key of the record.
    pub id: Uuid,
    /// Quest being attempted.
    pub quest_id: Uuid,
    /// Team attempting the quest.
    pub team_id: Uuid,
    /// Deadline computed at assignment time; never mutated afterwards.
    pub ends_at: SystemTime,
    /// Current lifecycle status.
    pub status: ActiveQuestStatus,
    /// Whether the attempt counted as a success (meaningful once finished).
    pub validated: bool,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last mutation timestamp.
    pub updated_at: SystemTime,
}

impl ActiveQuestEntity {
    /// True while the record has not reached its terminal status.
    pub fn is_running(&self) -> bool {
        self.status == ActiveQuestStatus::Running
    }
}

/// Participation status of a team for the whole event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// The team still has quests to attempt.
    Playing,
    /// The team attempted every catalog quest; terminal for the event.
    Finished,
}

/// Team roster and aggregate progress shared across layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Display name chosen for the team.
    pub name: String,
    /// User ids of the team members.
    pub members: Vec<Uuid>,
    /// Aggregate experience counter; the engine only increments it.
    pub xp: i64,
    /// Event participation status.
    pub status: TeamStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last mutation timestamp.
    pub updated_at: SystemTime,
}
