//! Live event subscription for the open conversation
//!
//! A [`LiveFeed`] joins one conversation's room and pushes decoded
//! [`LiveEvent`]s into a channel until the receiving side goes away.
//! [`SocketFeed`] is the WebSocket implementation with reconnection.

pub mod event;
pub mod socket;

use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;

pub use event::{decode_frame, LiveEvent};
use socket::LiveSocket;

use crate::config::Config;
use crate::models::ConversationId;

const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 64;
/// A session that lasted this long resets the backoff.
const STABLE_AFTER: Duration = Duration::from_secs(60);
const HEARTBEAT_EVERY: Duration = Duration::from_secs(30);

/// What a feed reports to its subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Event(LiveEvent),
    /// The transport came back after a drop; events in between may be lost.
    Reconnected,
}

/// Source of live events for one conversation at a time.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Deliver events for `conversation` into `sink` until it is closed.
    async fn run(
        &self,
        conversation: ConversationId,
        sink: mpsc::UnboundedSender<FeedEvent>,
    ) -> Result<()>;
}

/// Reason the inner connection loop exited.
enum DisconnectReason {
    /// The subscriber dropped its receiver. Do not reconnect.
    Unsubscribed,
    /// Error or server-initiated close. Should reconnect.
    Error(anyhow::Error),
}

/// WebSocket-backed live feed.
pub struct SocketFeed {
    url: String,
    token: Option<String>,
}

impl SocketFeed {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            url: config.live_url()?,
            token: config.api_token.clone(),
        })
    }

    /// One connection: join, pump frames, heartbeat.
    ///
    /// Returns `Ok` when the session either ended by unsubscribe or stayed up
    /// long enough to count as stable; `Err` for a quick failure.
    async fn run_once(
        &self,
        conversation: &ConversationId,
        sink: &mpsc::UnboundedSender<FeedEvent>,
        reconnect: bool,
    ) -> Result<DisconnectReason> {
        let mut ws = LiveSocket::connect(&self.url, self.token.as_deref()).await?;
        ws.join(conversation).await?;
        tracing::info!("Subscribed to conversation {}", conversation);
        if reconnect && sink.send(FeedEvent::Reconnected).is_err() {
            return Ok(DisconnectReason::Unsubscribed);
        }

        let connected_at = Instant::now();
        let mut heartbeat = time::interval(HEARTBEAT_EVERY);
        heartbeat.tick().await; // skip first immediate tick

        let disconnect_reason = loop {
            tokio::select! {
                frame = ws.recv_frame() => {
                    match frame {
                        Ok(Some(text)) => {
                            let Some(event) = decode_frame(&text) else { continue };
                            tracing::debug!("Live {} for {}", event.kind(), event.message_id());
                            if sink.send(FeedEvent::Event(event)).is_err() {
                                break DisconnectReason::Unsubscribed;
                            }
                        }
                        Ok(None) => {
                            break DisconnectReason::Error(anyhow::anyhow!("WebSocket closed by server"));
                        }
                        Err(e) => {
                            break DisconnectReason::Error(e.context("WebSocket recv error"));
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = ws.heartbeat().await {
                        break DisconnectReason::Error(e.context("Heartbeat send failed"));
                    }
                }
                _ = sink.closed() => {
                    break DisconnectReason::Unsubscribed;
                }
            }
        };

        if let DisconnectReason::Unsubscribed = disconnect_reason {
            if let Err(e) = ws.leave(conversation).await {
                tracing::debug!("Leave on unsubscribe failed: {:#}", e);
            }
            tracing::info!("Unsubscribed from conversation {}", conversation);
            return Ok(DisconnectReason::Unsubscribed);
        }

        if is_stable(connected_at.elapsed()) {
            return Ok(disconnect_reason);
        }
        match disconnect_reason {
            DisconnectReason::Unsubscribed => Ok(DisconnectReason::Unsubscribed),
            DisconnectReason::Error(e) => Err(e),
        }
    }
}

#[async_trait]
impl LiveFeed for SocketFeed {
    /// Keep the subscription alive with automatic reconnection.
    ///
    /// Quick failures back off exponentially (1s, 2s, 4s, ... capped at 64s);
    /// a drop after a stable session retries after 1s. Missed events are not
    /// replayed; the subscriber is told via [`FeedEvent::Reconnected`].
    async fn run(
        &self,
        conversation: ConversationId,
        sink: mpsc::UnboundedSender<FeedEvent>,
    ) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut reconnect = false;

        loop {
            let (stable, error) = match self.run_once(&conversation, &sink, reconnect).await {
                Ok(DisconnectReason::Unsubscribed) => return Ok(()),
                Ok(DisconnectReason::Error(e)) => (true, e),
                Err(e) => (false, e),
            };
            let (delay, next) = reconnect_delay(backoff, stable);
            backoff = next;
            if stable {
                tracing::warn!(
                    "Live stream dropped after stable session: {:#}. Reconnecting in {}s...",
                    error,
                    delay
                );
            } else {
                tracing::warn!(
                    "Live stream disconnected: {:#}. Reconnecting in {}s...",
                    error,
                    delay
                );
            }

            reconnect = true;

            tokio::select! {
                _ = time::sleep(Duration::from_secs(delay)) => {}
                _ = sink.closed() => return Ok(()),
            }
        }
    }
}

fn is_stable(connected_for: Duration) -> bool {
    connected_for >= STABLE_AFTER
}

/// Seconds to wait before the next attempt, and the backoff carried into the
/// attempt after that.
fn reconnect_delay(backoff: u64, stable: bool) -> (u64, u64) {
    if stable {
        return (INITIAL_BACKOFF_SECS, INITIAL_BACKOFF_SECS);
    }
    (backoff, (backoff * 2).min(MAX_BACKOFF_SECS))
}
