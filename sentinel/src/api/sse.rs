//! SSE bridge over the internal [`EventBus`]. Grounded on
//! `wkmp-ap/src/sse/broadcaster.rs::handle_sse_connection`; the event
//! envelope here is `SentinelEvent` directly rather than a separate
//! `SseEvent` wrapper type, since `SentinelEvent`'s internal `#[serde(tag =
//! "event")]` already carries the discriminant the teacher's `SseEvent`
//! stored in a side field.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use super::server::AppContext;

pub async fn event_stream(State(ctx): State<AppContext>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(subscribers = ctx.events.subscriber_count() + 1, "new SSE client connected");
    let stream = BroadcastStream::new(ctx.events.subscribe()).filter_map(|result| async move {
        let event = match result {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "SSE client lagged, dropping to resync");
                return None;
            }
        };
        let payload = serde_json::to_value(&event).ok()?;
        let name = payload.get("event").and_then(|v| v.as_str()).unwrap_or("status");
        Event::default().event(name).json_data(&payload).ok().map(Ok)
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keep-alive"))
}
