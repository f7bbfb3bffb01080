//! Live file events over Server-Sent Events.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::auth::Caller;
use crate::file::FileEvent;
use crate::web::dto::FileEventResponse;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// Interval between keep-alive comments.
const KEEP_ALIVE_SECS: u64 = 15;

/// Encode an event for `caller`, or `None` if they may not see it.
fn to_sse(event: &FileEvent, caller: &Caller) -> Option<Event> {
    if !event.visible_to(caller) {
        return None;
    }
    match Event::default()
        .event(event.kind.as_str())
        .json_data(FileEventResponse::from(event))
    {
        Ok(sse) => Some(sse),
        Err(e) => {
            tracing::warn!(file_id = event.file.id, error = %e, "Failed to encode file event");
            None
        }
    }
}

/// GET /api/files/events - Stream file changes.
///
/// Members receive events for their own files only. A subscriber that
/// falls behind skips the missed events and stays connected.
#[utoipa::path(
    get,
    path = "/api/files/events",
    tag = "files",
    responses(
        (status = 200, description = "Event stream of created, updated and deleted files", content_type = "text/event-stream", body = FileEventResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn file_events(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.library.feed().subscribe();
    tracing::debug!(user_id = %caller.user_id, "Event stream opened");

    let stream = BroadcastStream::new(receiver).filter_map(move |message| match message {
        Ok(event) => to_sse(&event, &caller).map(Ok),
        Err(e) => {
            tracing::debug!(error = %e, "Event subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}
