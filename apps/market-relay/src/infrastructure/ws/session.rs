//! Client Session Handler
//!
//! Runs one downstream WebSocket session: subscribe, send the history
//! snapshot, then forward live events until the client leaves, falls
//! behind, or the relay shuts down. Idle sessions get periodic heartbeat
//! messages so clients can tell a quiet stream from a dead connection.
//!
//! Events reach the session through a bounded queue; the registry's
//! fan-out only does a `try_send` into it, so one slow client never
//! stalls delivery to the others. When the queue overflows the registry
//! detaches the sink, the queue closes, and the session ends with an
//! error message.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use uuid::Uuid;

use super::messages::{ErrorMessage, HeartbeatMessage, SnapshotMessage, UpdateMessage};
use crate::application::relay::{RelayService, SubscribeRequest, Subscription};
use crate::domain::event::NormalizedEvent;
use crate::domain::registry::{DeliveryOutcome, EventSink};
use crate::infrastructure::config::SessionSettings;
use crate::infrastructure::metrics;

/// Non-blocking sink backed by the session's bounded queue.
struct QueueSink {
    tx: mpsc::Sender<Arc<NormalizedEvent>>,
}

impl EventSink for QueueSink {
    fn deliver(&self, event: Arc<NormalizedEvent>) -> DeliveryOutcome {
        match self.tx.try_send(event) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => DeliveryOutcome::Overflow,
            Err(TrySendError::Closed(_)) => DeliveryOutcome::Closed,
        }
    }
}

/// Send an error message and close the socket without subscribing.
pub async fn reject(socket: WebSocket, reason: String) {
    let (mut ws_tx, _ws_rx) = socket.split();
    let _ = send_json(&mut ws_tx, &ErrorMessage::new(reason)).await;
    let _ = ws_tx.close().await;
}

/// Run one client session to completion.
pub async fn run(
    socket: WebSocket,
    relay: Arc<RelayService>,
    settings: SessionSettings,
    request: SubscribeRequest,
) {
    let session_id = Uuid::new_v4();
    let (mut ws_tx, ws_rx) = socket.split();

    let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
    let sink = Arc::new(QueueSink {
        tx,
    });

    let subscription = match relay.subscribe(&request, sink) {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::debug!(%session_id, error = %e, "Rejecting subscription");
            let _ = send_json(&mut ws_tx, &ErrorMessage::new(e.to_string())).await;
            let _ = ws_tx.close().await;
            return;
        }
    };

    tracing::info!(
        %session_id,
        stream = %subscription.key,
        snapshot_len = subscription.snapshot.len(),
        "Client session started"
    );
    metrics::set_client_sessions(to_gauge(relay.subscriber_count()));
    metrics::set_streams_active(to_gauge(relay.stream_count()));

    let snapshot = SnapshotMessage::new(
        request.kind,
        subscription.key.display_symbol(),
        &subscription.snapshot,
    );
    if send_json(&mut ws_tx, &snapshot).await.is_ok() {
        stream_events(&relay, &settings, &request, &subscription, &mut ws_tx, ws_rx, rx).await;
    }

    relay.unsubscribe(&subscription.key, subscription.id);
    metrics::set_client_sessions(to_gauge(relay.subscriber_count()));
    metrics::set_streams_active(to_gauge(relay.stream_count()));
    tracing::info!(%session_id, stream = %subscription.key, "Client session ended");
}

/// Forward events, heartbeats, and shutdown until the session ends.
async fn stream_events(
    relay: &Arc<RelayService>,
    settings: &SessionSettings,
    request: &SubscribeRequest,
    subscription: &Subscription,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut rx: mpsc::Receiver<Arc<NormalizedEvent>>,
) {
    let shutdown = relay.shutdown_token();
    let mut idle_deadline = Instant::now() + settings.heartbeat_interval;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = send_json(ws_tx, &ErrorMessage::new("server shutting down")).await;
                break;
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        let update = UpdateMessage::new(request.kind, &event);
                        if send_json(ws_tx, &update).await.is_err() {
                            break;
                        }
                        metrics::record_events_delivered(request.kind, 1);
                        idle_deadline = Instant::now() + settings.heartbeat_interval;
                    }
                    // The registry detached this sink after an overflow.
                    None => {
                        let _ = send_json(
                            ws_tx,
                            &ErrorMessage::new("disconnected: client not keeping up"),
                        )
                        .await;
                        break;
                    }
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // The protocol is server-push only; inbound frames
                    // other than close are ignored.
                    Some(Ok(_)) => {}
                }
            }
            () = tokio::time::sleep_until(idle_deadline) => {
                let heartbeat = HeartbeatMessage::new(subscription.key.display_symbol());
                if send_json(ws_tx, &heartbeat).await.is_err() {
                    break;
                }
                idle_deadline = Instant::now() + settings.heartbeat_interval;
            }
        }
    }

    let _ = ws_tx.close().await;
}

async fn send_json<T: Serialize>(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message)
        .map_err(|e| axum::Error::new(std::io::Error::other(e)))?;
    ws_tx.send(Message::Text(json.into())).await
}

#[allow(clippy::cast_precision_loss)]
fn to_gauge(count: usize) -> f64 {
    count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal::Decimal;

    use crate::domain::event::Side;

    fn event() -> Arc<NormalizedEvent> {
        Arc::new(NormalizedEvent::new(
            "BTCUSDT",
            Side::Buy,
            Decimal::ONE,
            Decimal::from(100),
            1,
        ))
    }

    #[tokio::test]
    async fn queue_sink_reports_delivery_outcomes() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = QueueSink {
            tx,
        };

        assert_eq!(sink.deliver(event()), DeliveryOutcome::Delivered);
        // Queue full.
        assert_eq!(sink.deliver(event()), DeliveryOutcome::Overflow);

        rx.recv().await.unwrap();
        assert_eq!(sink.deliver(event()), DeliveryOutcome::Delivered);

        rx.close();
        drop(rx);
        assert_eq!(sink.deliver(event()), DeliveryOutcome::Closed);
    }
}
