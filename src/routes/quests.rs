use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::quest::{
        ActiveQuestSnapshot, AssignOutcomeKind, AssignQuestResponse, FinishOutcomeKind,
        FinishQuestRequest, FinishQuestResponse, TeamQuestView,
    },
    error::{AppError, ServiceError},
    services::lifecycle::{self, AssignOutcome, FinishOutcome},
    state::SharedState,
};

/// Routes exposing the quest lifecycle operations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/teams/{team_id}/quests/next", post(assign_next_quest))
        .route("/teams/{team_id}/active-quest", get(team_active_quest))
        .route("/active-quests/{id}", get(get_active_quest))
        .route("/active-quests/{id}/finish", post(finish_active_quest))
}

/// Hand the next quest to a team, or mark it finished when none remain.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/quests/next",
    tag = "quests",
    params(("team_id" = Uuid, Path, description = "Identifier of the team")),
    responses(
        (status = 200, description = "Assignment outcome", body = AssignQuestResponse),
        (status = 404, description = "Unknown team"),
        (status = 409, description = "The team already has a quest in progress")
    )
)]
pub async fn assign_next_quest(
    State(state): State<SharedState>,
    Path(team_id): Path<Uuid>,
) -> Result<Json<AssignQuestResponse>, AppError> {
    let response = match lifecycle::assign_next(&state, team_id).await? {
        AssignOutcome::Assigned { record, quest } => AssignQuestResponse {
            outcome: AssignOutcomeKind::Assigned,
            active_quest: Some(record.into()),
            quest: Some(quest.into()),
        },
        AssignOutcome::Exhausted => AssignQuestResponse {
            outcome: AssignOutcomeKind::Exhausted,
            active_quest: None,
            quest: None,
        },
    };
    Ok(Json(response))
}

/// Finish a running quest attempt on behalf of a proctor or admin.
#[utoipa::path(
    post,
    path = "/active-quests/{id}/finish",
    tag = "quests",
    params(("id" = Uuid, Path, description = "Identifier of the active-quest record")),
    request_body = FinishQuestRequest,
    responses(
        (status = 200, description = "Finish outcome", body = FinishQuestResponse),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn finish_active_quest(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FinishQuestRequest>,
) -> Result<Json<FinishQuestResponse>, AppError> {
    let response = match lifecycle::finish_manual(&state, id, payload.validated).await? {
        FinishOutcome::Finished { record } => FinishQuestResponse {
            outcome: FinishOutcomeKind::Finished,
            active_quest: Some(record.into()),
        },
        FinishOutcome::AlreadyFinished => FinishQuestResponse {
            outcome: FinishOutcomeKind::AlreadyFinished,
            active_quest: None,
        },
    };
    Ok(Json(response))
}

/// Fetch one active-quest record; clients use this to reconcile after a reconnect.
#[utoipa::path(
    get,
    path = "/active-quests/{id}",
    tag = "quests",
    params(("id" = Uuid, Path, description = "Identifier of the active-quest record")),
    responses(
        (status = 200, description = "The record", body = ActiveQuestSnapshot),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn get_active_quest(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActiveQuestSnapshot>, AppError> {
    let store = state.require_quest_store().await?;
    let record = store.find_active_quest(id).await.map_err(ServiceError::from)?;
    match record {
        Some(record) => Ok(Json(record.into())),
        None => Err(AppError::NotFound(format!("active quest `{id}` not found"))),
    }
}

/// The team's current running quest with catalog details, or null.
#[utoipa::path(
    get,
    path = "/teams/{team_id}/active-quest",
    tag = "quests",
    params(("team_id" = Uuid, Path, description = "Identifier of the team")),
    responses(
        (status = 200, description = "Current quest view, null when the team is idle", body = TeamQuestView),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn team_active_quest(
    State(state): State<SharedState>,
    Path(team_id): Path<Uuid>,
) -> Result<Json<Option<TeamQuestView>>, AppError> {
    let view = lifecycle::current_for_team(&state, team_id)
        .await?
        .map(|(record, quest, team)| TeamQuestView::new(record, quest, team));
    Ok(Json(view))
}
