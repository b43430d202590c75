use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Questline Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quests::assign_next_quest,
        crate::routes::quests::finish_active_quest,
        crate::routes::quests::get_active_quest,
        crate::routes::quests::team_active_quest,
        crate::routes::sse::feed_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::quest::QuestSnapshot,
            crate::dto::quest::ActiveQuestSnapshot,
            crate::dto::quest::AssignQuestResponse,
            crate::dto::quest::FinishQuestRequest,
            crate::dto::quest::FinishQuestResponse,
            crate::dto::quest::TeamQuestView,
            crate::dto::events::QuestAssignedEvent,
            crate::dto::events::QuestExhaustedEvent,
            crate::dto::events::GameStatus,
            crate::dto::ws::ClientInboundMessage,
            crate::dto::ws::ClientAck,
            crate::dao::models::ActiveQuestStatus,
            crate::dao::models::TeamStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quests", description = "Quest lifecycle operations"),
        (name = "sse", description = "Server-sent event feed"),
        (name = "clients", description = "WebSocket operations for player clients"),
    )
)]
pub struct ApiDoc;
