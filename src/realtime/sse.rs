//! Server-Sent Events framing for relay subscriptions.

use super::relay::{LetterChange, Subscription};
use actix_web::web::Bytes;
use futures::stream::{self, Stream};
use std::time::Duration;

pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Formats one SSE frame; multi-line data is split over several `data:` lines.
pub fn sse_frame(event: &str, data: &str) -> String {
    let mut frame = format!("event: {}\n", event);
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

pub fn keep_alive_frame() -> &'static str {
    ": keep-alive\n\n"
}

fn change_frame(change: &LetterChange) -> Option<String> {
    match serde_json::to_string(change) {
        Ok(json) => Some(sse_frame(change.kind.event_name(), &json)),
        Err(e) => {
            log::error!("❌ Failed to serialize change: {}", e);
            None
        }
    }
}

/// Turns a subscription into an SSE byte stream: a `connected` frame carrying
/// the client id, then one frame per change, with keep-alive comments while idle.
pub fn event_stream(
    subscription: Subscription,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    let hello = serde_json::json!({
        "client_id": subscription.client_id(),
        "letter_id": subscription.letter_id(),
    });
    let connected = stream::once(async move {
        Ok::<_, actix_web::Error>(Bytes::from(sse_frame("connected", &hello.to_string())))
    });

    let changes = stream::unfold(subscription, move |mut subscription| async move {
        loop {
            match tokio::time::timeout(keep_alive, subscription.next()).await {
                Ok(Some(change)) => {
                    if let Some(frame) = change_frame(&change) {
                        return Some((Ok(Bytes::from(frame)), subscription));
                    }
                }
                Ok(None) => {
                    log::info!("🔌 Ending stream for {}", subscription.client_id());
                    return None;
                }
                Err(_) => {
                    return Some((Ok(Bytes::from_static(keep_alive_frame().as_bytes())), subscription));
                }
            }
        }
    });

    futures::StreamExt::chain(connected, changes)
}
