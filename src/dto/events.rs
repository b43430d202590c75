use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::quest::{ActiveQuestSnapshot, QuestSnapshot};

#[derive(Clone, Debug)]
/// Dispatched payload carried by the notification and feed channels.
pub struct ServerEvent {
    /// Optional event name.
    pub event: Option<String>,
    /// Serialized payload.
    pub data: serde_json::Value,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the event data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_value(payload)?,
        })
    }
}

/// Whole-event status echoed in lifecycle payloads.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// The team still has quests ahead.
    InProgress,
    /// The team has attempted every quest.
    Finished,
}

#[derive(Debug, Serialize, ToSchema)]
/// Pushed to every team member when a new quest is assigned.
pub struct QuestAssignedEvent {
    /// The newly created running record.
    pub active_quest: ActiveQuestSnapshot,
    /// Catalog details of the assigned quest.
    pub quest: QuestSnapshot,
    /// Current aggregate team xp.
    pub team_xp: i64,
    /// Whole-event status for the team.
    pub game_status: GameStatus,
}

#[derive(Debug, Serialize, ToSchema)]
/// Terminal marker pushed when a team has attempted every catalog quest.
pub struct QuestExhaustedEvent {
    /// Team that ran out of quests.
    pub team_id: Uuid,
    /// Current aggregate team xp.
    pub team_xp: i64,
    /// Whole-event status for the team (always `finished`).
    pub game_status: GameStatus,
}
