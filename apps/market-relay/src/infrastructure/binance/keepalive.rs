//! Upstream Keepalive
//!
//! Emits a periodic ping request so the provider does not drop an
//! otherwise quiet connection. The connection loop owns the socket writer,
//! so the keepalive task only signals over a channel and the loop sends
//! the actual ping frame.
//!
//! The task observes a child of the connection's cancellation token;
//! stopping the connection always stops its keepalive.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How often to ping the provider on an idle connection.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(180);

/// Requests emitted by the keepalive task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveEvent {
    /// The connection loop should send a ping frame now.
    SendPing,
}

/// Periodic ping scheduler for one upstream connection.
pub struct KeepaliveManager {
    interval: Duration,
    event_tx: mpsc::Sender<KeepaliveEvent>,
    cancel: CancellationToken,
}

impl KeepaliveManager {
    /// Create a manager that requests a ping every `interval`.
    #[must_use]
    pub const fn new(
        interval: Duration,
        event_tx: mpsc::Sender<KeepaliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            interval,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or the connection loop drops its receiver.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so the first ping
        // lands one full interval after connect.
        interval.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keepalive cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.event_tx.send(KeepaliveEvent::SendPing).await.is_err() {
                        tracing::debug!("Keepalive channel closed, stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_ping_requests_on_the_interval() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let manager = KeepaliveManager::new(Duration::from_secs(180), tx, cancel.clone());
        tokio::spawn(manager.run());

        tokio::time::advance(Duration::from_secs(181)).await;
        assert_eq!(rx.recv().await, Some(KeepaliveEvent::SendPing));

        tokio::time::advance(Duration::from_secs(180)).await;
        assert_eq!(rx.recv().await, Some(KeepaliveEvent::SendPing));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancellation() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let manager = KeepaliveManager::new(Duration::from_secs(180), tx, cancel.clone());
        let task = tokio::spawn(manager.run());

        cancel.cancel();
        task.await.unwrap();

        assert_eq!(rx.recv().await, None);
    }
}
