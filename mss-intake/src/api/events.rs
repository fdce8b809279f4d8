//! Server-Sent Events (SSE) for placeholder lifecycle events
//!
//! Streams `PlaceholderCreated`, `PlaceholderReused`, `PlaceholderFinalized`
//! and `PlaceholderAbandoned` for the caller's tenant only.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::session::SessionContext;
use crate::AppState;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    session: SessionContext,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let tenant_id = session.tenant_id();
    info!(tenant_id, "New SSE client connected to placeholder events");

    let mut rx = state.service.events().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) if event.tenant_id() == tenant_id => {
                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Sending {} to tenant {}", event_type, tenant_id);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
                Ok(_) => {
                    // Another tenant's event
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(tenant_id, skipped, "SSE client lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("SSE: Event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
