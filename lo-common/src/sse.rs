//! Server-Sent Events (SSE) utilities

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::bus::PublishBus;

/// Stream every published external state to one SSE client
///
/// Each state is sent as a `PublishedState` event with a JSON body. A client
/// that falls behind the bus capacity skips the missed states and keeps going.
pub fn published_state_stream(
    bus: &PublishBus,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} published states", service_name);
    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(state) => match serde_json::to_string(&state) {
                    Ok(body) => yield Ok(Event::default().event("PublishedState").data(body)),
                    Err(e) => warn!("SSE: failed to encode published state: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!("SSE: client lagged, skipped {} states", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
