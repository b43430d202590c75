/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Lifecycle coordinator: assign, finish, and expire operations.
pub mod lifecycle;
/// Fan-out of lifecycle transitions to connected clients.
pub mod notifier;
/// Random selection of the next quest for a team.
pub mod quest_picker;
/// Expiration timers and durable-state reconciliation.
pub mod scheduler;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervision.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod ws_service;
