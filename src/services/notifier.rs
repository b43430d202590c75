//! Fan-out of lifecycle transitions to connected clients.
//!
//! Invoked only after the corresponding durable transition succeeded; the
//! push is a best-effort real-time hint. Members without a live connection
//! are skipped silently, and clients reconcile authoritative state through
//! the pull endpoints on reconnect. Every event is mirrored onto the public
//! SSE feed for event dashboards.

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dao::models::{ActiveQuestEntity, QuestEntity, TeamEntity},
    dto::events::{GameStatus, QuestAssignedEvent, QuestExhaustedEvent, ServerEvent},
    state::SharedState,
};

const EVENT_QUEST_ASSIGNED: &str = "quest.assigned";
const EVENT_QUEST_EXHAUSTED: &str = "quest.exhausted";

/// Push a new assignment to every member of the team.
pub async fn notify_assignment(
    state: &SharedState,
    team: &TeamEntity,
    record: &ActiveQuestEntity,
    quest: &QuestEntity,
) {
    let payload = QuestAssignedEvent {
        active_quest: record.clone().into(),
        quest: quest.clone().into(),
        team_xp: team.xp,
        game_status: GameStatus::InProgress,
    };
    send_team_event(state, team, EVENT_QUEST_ASSIGNED, &payload);
}

/// Push the terminal marker to every member of a team that ran out of quests.
pub async fn notify_exhausted(state: &SharedState, team: &TeamEntity) {
    let payload = QuestExhaustedEvent {
        team_id: team.id,
        team_xp: team.xp,
        game_status: GameStatus::Finished,
    };
    send_team_event(state, team, EVENT_QUEST_EXHAUSTED, &payload);
}

fn send_team_event(state: &SharedState, team: &TeamEntity, event: &str, payload: &impl Serialize) {
    let event = match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "failed to serialize lifecycle event payload");
            return;
        }
    };

    state.feed().broadcast(event.clone());

    let gateway = state.notifications();
    let mut delivered = 0usize;
    for member in &team.members {
        for connection_id in gateway.connections_for(*member) {
            if gateway.push(connection_id, &event) {
                delivered += 1;
            }
        }
    }

    debug!(
        team_id = %team.id,
        event = event.event.as_deref().unwrap_or_default(),
        members = team.members.len(),
        delivered,
        "pushed lifecycle event to team connections"
    );
}
