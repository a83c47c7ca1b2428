//! Arena feed client
//!
//! Consumes the arena WebSocket, normalizes each message into observation
//! events and forwards them over an mpsc channel. Connection loss is never
//! fatal: the client reconnects with exponential backoff and jitter, and
//! re-subscribes on every new connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::error::{Result, SynthesisError};
use crate::ingest;
use crate::observability::{metrics, MetricsCollector};
use crate::types::ObservationEvent;

#[derive(Debug, Clone, Serialize)]
pub struct FeedStats {
    pub url: String,
    pub connected: bool,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub events_forwarded: u64,
    pub reconnects: u64,
}

#[derive(Clone, Default)]
struct FeedCounters {
    connected: Arc<AtomicBool>,
    received: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    forwarded: Arc<AtomicU64>,
    reconnects: Arc<AtomicU64>,
}

/// How a connected session ended
enum SessionEnd {
    Shutdown,
    Disconnected,
    ChannelClosed,
}

#[derive(Clone)]
pub struct ArenaFeedClient {
    config: FeedConfig,
    event_tx: mpsc::Sender<ObservationEvent>,
    metrics: MetricsCollector,
    counters: FeedCounters,
}

impl ArenaFeedClient {
    pub fn new(config: FeedConfig, event_tx: mpsc::Sender<ObservationEvent>, metrics: MetricsCollector) -> Self {
        Self {
            config,
            event_tx,
            metrics,
            counters: FeedCounters::default(),
        }
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            url: self.config.url.clone(),
            connected: self.counters.connected.load(Ordering::Relaxed),
            messages_received: self.counters.received.load(Ordering::Relaxed),
            messages_dropped: self.counters.dropped.load(Ordering::Relaxed),
            events_forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Exponential backoff with ±jitter_factor jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let clamped = base.min(self.config.max_delay_ms as f64);

        let jitter_range = clamped * self.config.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((clamped + jitter).max(0.0) as u64)
    }

    fn subscribe_message(&self) -> Message {
        let msg = serde_json::json!({
            "type": "subscribe",
            "channels": self.config.channels,
        });
        Message::Text(msg.to_string())
    }

    /// Run until shutdown is signalled or the event channel closes
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.session(&mut shutdown).await {
                Ok(SessionEnd::Shutdown) | Ok(SessionEnd::ChannelClosed) => break,
                Ok(SessionEnd::Disconnected) => {
                    // the connection worked, start the backoff over
                    attempt = 0;
                }
                Err(e) => {
                    error!(url = %self.config.url, error = %e, attempt, "Arena feed connection failed");
                }
            }
            self.counters.connected.store(false, Ordering::Relaxed);

            let delay = self.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            self.metrics.increment(metrics::FEED_RECONNECTS, 1).await;
            info!(delay_ms = delay.as_millis() as u64, attempt, "Reconnecting to arena feed");

            tokio::select! {
                _ = sleep(delay) => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.counters.connected.store(false, Ordering::Relaxed);
        info!("Arena feed client stopped");
    }

    async fn session(&self, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd> {
        let (ws_stream, _) = tokio::select! {
            res = connect_async(self.config.url.as_str()) => {
                res.map_err(|e| SynthesisError::Feed(format!("WebSocket connection failed: {}", e)))?
            }
            _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
        };
        info!(url = %self.config.url, "Connected to arena feed");

        // split so pongs and the close frame never wait on the reader
        let (mut sink, mut reader) = ws_stream.split();
        sink.send(self.subscribe_message())
            .await
            .map_err(|e| SynthesisError::Feed(format!("Failed to subscribe: {}", e)))?;
        self.counters.connected.store(true, Ordering::Relaxed);
        info!(channels = ?self.config.channels, "Subscribed to arena channels");

        loop {
            let msg = tokio::select! {
                msg = reader.next() => msg,
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            debug!(error = %e, "Close frame not delivered");
                        }
                        return Ok(SessionEnd::Shutdown);
                    }
                    continue;
                }
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    if !self.handle_text(&text).await {
                        return Ok(SessionEnd::ChannelClosed);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        error!(error = %e, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Arena feed closed by server");
                    return Ok(SessionEnd::Disconnected);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Arena feed error");
                    return Ok(SessionEnd::Disconnected);
                }
                None => {
                    info!("Arena feed stream ended");
                    return Ok(SessionEnd::Disconnected);
                }
                _ => {}
            }
        }
    }

    /// Returns false once the downstream channel is closed
    async fn handle_text(&self, text: &str) -> bool {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let events = match ingest::normalize(text, &self.config.source_name) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Dropping malformed feed message");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.increment(metrics::MESSAGES_DROPPED, 1).await;
                return true;
            }
        };

        for event in events {
            if self.event_tx.send(event).await.is_err() {
                warn!("Event channel closed, stopping feed");
                return false;
            }
            self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
        }
        true
    }
}
