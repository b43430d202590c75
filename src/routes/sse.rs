use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/feed",
    tag = "sse",
    responses((status = 200, description = "Lifecycle event feed", content_type = "text/event-stream", body = String))
)]
/// Stream every quest lifecycle event to dashboards and monitors.
pub async fn feed_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_feed(&state);
    info!("new event feed SSE connection");
    sse_service::to_sse_stream(receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/feed", get(feed_stream))
}
