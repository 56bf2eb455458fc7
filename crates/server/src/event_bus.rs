// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: database pub/sub bridged to in-process subscribers.
//!
//! One listener connection per process receives LISTEN/NOTIFY traffic and
//! fans each notification out to every live subscriber of its channel by
//! non-blocking send (full buffers drop). Delivery is at-most-once: a
//! listener outage loses the events that happened during it, and
//! subscribers are expected to have a periodic tick as their correctness
//! floor.

use parking_lot::Mutex;
use sqlx::postgres::{PgListener, PgPool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-subscriber buffer; a subscriber that falls this far behind starts
/// losing events.
const SUBSCRIBER_BUFFER: usize = 64;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<String>,
}

struct Inner {
    pool: PgPool,
    channels: Vec<String>,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

/// Cloneable handle; all clones share the subscriber registry and the
/// single listener connection.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

/// Disposer returned by subscribe; dropping it detaches the subscriber.
pub struct Subscription {
    inner: Arc<Inner>,
    channel: String,
    id: u64,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subscribers = self.inner.subscribers.lock();
        if let Some(list) = subscribers.get_mut(&self.channel) {
            list.retain(|s| s.id != self.id);
        }
    }
}

impl EventBus {
    pub fn new(pool: PgPool, channels: &[&str]) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                channels: channels.iter().map(|c| c.to_string()).collect(),
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a subscriber on a channel. Returns the bounded receive
    /// stream and its disposer.
    pub fn subscribe(&self, channel: &str) -> (mpsc::Receiver<String>, Subscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        (rx, Subscription { inner: Arc::clone(&self.inner), channel: channel.to_string(), id })
    }

    /// Publish fire-and-forget: the payload rides pg_notify so it reaches
    /// every replica's bus. Errors are logged and swallowed.
    pub async fn publish(&self, channel: &str, payload: &str) {
        let result = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.inner.pool)
            .await;
        if let Err(error) = result {
            tracing::warn!(channel, %error, "event publish failed");
        }
    }

    /// Fan a notification out to the channel's subscribers. Non-blocking:
    /// a full or closed subscriber loses this event, and closed ones are
    /// pruned.
    fn dispatch(&self, channel: &str, payload: &str) {
        let mut subscribers = self.inner.subscribers.lock();
        let Some(list) = subscribers.get_mut(channel) else {
            return;
        };
        list.retain(|subscriber| match subscriber.tx.try_send(payload.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(channel, "subscriber buffer full; dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Listener loop: owns the process's one listener connection,
    /// reconnecting with bounded backoff on loss.
    pub async fn run(self, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.connect_listener().await {
                Ok(mut listener) => {
                    tracing::debug!(channels = ?self.inner.channels, "event bus listening");
                    backoff = INITIAL_BACKOFF;
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            received = listener.try_recv() => match received {
                                Ok(Some(notification)) => {
                                    self.dispatch(notification.channel(), notification.payload());
                                }
                                Ok(None) => {
                                    // Connection dropped and was re-established
                                    // inside the driver; events in the gap are lost.
                                    tracing::warn!("event bus connection lapsed; events may be lost");
                                }
                                Err(error) => {
                                    tracing::warn!(%error, "event bus listener error; reconnecting");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "event bus failed to connect listener");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect_listener(&self) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.inner.pool).await?;
        listener
            .listen_all(self.inner.channels.iter().map(String::as_str))
            .await?;
        Ok(listener)
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
