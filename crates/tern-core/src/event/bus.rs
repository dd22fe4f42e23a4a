//! In-process publish/subscribe event bus keyed by session identifier.
//!
//! One process-scoped registry object fans structured frames out to any
//! number of live subscribers. Fan-out is in-memory and at-most-once per
//! connected subscriber; there is no durable replay for late joiners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::frame::{EventFrame, EventPayload};

/// Default per-session broadcast buffer. Slow subscribers lag past this
/// many frames and skip forward rather than stalling the publisher.
const DEFAULT_CAPACITY: usize = 1024;

/// Default keepalive interval for idle connections.
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// State shared between publishers, subscribers, and the heartbeat task
/// of a single session channel.
///
/// Sequence assignment and send happen under one lock so subscribers
/// always observe strictly increasing, gap-free sequence numbers even
/// with the heartbeat task publishing concurrently.
struct ChannelInner {
    session_id: String,
    tx: broadcast::Sender<EventFrame>,
    last_sequence: Mutex<u64>,
}

impl ChannelInner {
    fn emit(&self, payload: EventPayload) -> EventFrame {
        let mut seq = self
            .last_sequence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *seq += 1;
        let frame = EventFrame::new(*seq, self.session_id.clone(), payload);
        // No receivers is fine; the run proceeds regardless of observers.
        let _ = self.tx.send(frame.clone());
        frame
    }
}

struct SessionChannel {
    inner: Arc<ChannelInner>,
    heartbeat: Option<JoinHandle<()>>,
}

impl SessionChannel {
    fn close(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

/// Process-scoped event registry.
///
/// Construct one per engine instance and pass it by `Arc` to publishers
/// and subscribers. `drain_session` and `shutdown` tear channels down
/// explicitly, enabling isolated construct -> run -> assert -> drain tests.
pub struct EventBus {
    channels: RwLock<HashMap<String, SessionChannel>>,
    capacity: usize,
    heartbeat_interval: Duration,
}

impl EventBus {
    /// Creates a bus with default capacity and a 30s heartbeat.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_CAPACITY, DEFAULT_HEARTBEAT)
    }

    /// Creates a bus with explicit capacity and heartbeat interval.
    ///
    /// A zero `heartbeat_interval` disables heartbeats, which keeps test
    /// event logs deterministic.
    pub fn with_options(capacity: usize, heartbeat_interval: Duration) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
            heartbeat_interval,
        }
    }

    /// Publishes a payload to a session, assigning the next sequence number.
    ///
    /// Returns the emitted frame. Frames published to sessions without
    /// subscribers are dropped after sequence assignment; sequences are
    /// never reused.
    pub fn publish(&self, session_id: &str, payload: EventPayload) -> EventFrame {
        let inner = self.channel(session_id);
        let frame = inner.emit(payload);
        tracing::trace!(
            target: "tern::events",
            session_id,
            sequence = frame.sequence,
            kind = frame.payload.kind(),
            "published event"
        );
        frame
    }

    /// Subscribes to a session's live event stream.
    ///
    /// Subscribing mid-run yields only events from this point forward.
    pub fn subscribe(&self, session_id: &str) -> EventStream {
        let inner = self.channel(session_id);
        EventStream {
            rx: inner.tx.subscribe(),
        }
    }

    /// Number of live subscribers for a session.
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(|p| p.into_inner());
        channels
            .get(session_id)
            .map(|c| c.inner.tx.receiver_count())
            .unwrap_or(0)
    }

    /// Tears down a session channel, closing all of its streams and
    /// stopping its heartbeat.
    pub fn drain_session(&self, session_id: &str) {
        let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
        if let Some(mut channel) = channels.remove(session_id) {
            channel.close();
        }
    }

    /// Tears down every channel. Intended for engine shutdown.
    pub fn shutdown(&self) {
        let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
        for (_, mut channel) in channels.drain() {
            channel.close();
        }
    }

    /// Returns the shared channel state for a session, creating the
    /// channel (and its heartbeat task) on first use.
    fn channel(&self, session_id: &str) -> Arc<ChannelInner> {
        {
            let channels = self.channels.read().unwrap_or_else(|p| p.into_inner());
            if let Some(channel) = channels.get(session_id) {
                return Arc::clone(&channel.inner);
            }
        }

        let mut channels = self.channels.write().unwrap_or_else(|p| p.into_inner());
        // Double-checked: another caller may have created it meanwhile.
        if let Some(channel) = channels.get(session_id) {
            return Arc::clone(&channel.inner);
        }

        let (tx, _) = broadcast::channel(self.capacity);
        let inner = Arc::new(ChannelInner {
            session_id: session_id.to_string(),
            tx,
            last_sequence: Mutex::new(0),
        });
        let heartbeat = if self.heartbeat_interval.is_zero() {
            None
        } else {
            Some(spawn_heartbeat(Arc::clone(&inner), self.heartbeat_interval))
        };
        channels.insert(
            session_id.to_string(),
            SessionChannel {
                inner: Arc::clone(&inner),
                heartbeat,
            },
        );
        inner
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut channels) = self.channels.write() {
            for (_, mut channel) in channels.drain() {
                channel.close();
            }
        }
    }
}

fn spawn_heartbeat(inner: Arc<ChannelInner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; a fresh channel does not need
        // an instant keepalive.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            inner.emit(EventPayload::Heartbeat {});
        }
    })
}

/// A live subscription to one session's events.
///
/// Dropping the stream unsubscribes. A slow consumer that falls behind
/// the channel buffer skips forward instead of poisoning the stream;
/// delivery failure to one subscriber never affects others.
pub struct EventStream {
    rx: broadcast::Receiver<EventFrame>,
}

impl EventStream {
    /// Waits for the next frame. Returns `None` once the session channel
    /// has been drained and no buffered frames remain.
    pub async fn next(&mut self) -> Option<EventFrame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "tern::events",
                        skipped,
                        "subscriber lagged; skipping ahead"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(message: &str) -> EventPayload {
        EventPayload::Status {
            status: "started".into(),
            message: message.into(),
            has_environment: false,
        }
    }

    #[tokio::test]
    async fn test_sequences_start_at_one_and_increase() {
        let bus = EventBus::with_options(16, Duration::ZERO);
        let mut stream = bus.subscribe("s-1");

        for i in 0..3 {
            bus.publish("s-1", status(&format!("m{i}")));
        }

        for expected in 1..=3u64 {
            let frame = stream.next().await.unwrap();
            assert_eq!(frame.sequence, expected);
            assert_eq!(frame.session_id, "s-1");
        }
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let bus = EventBus::with_options(16, Duration::ZERO);
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");

        bus.publish("a", status("a1"));
        bus.publish("b", status("b1"));

        assert_eq!(a.next().await.unwrap().sequence, 1);
        assert_eq!(b.next().await.unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_events() {
        let bus = EventBus::with_options(16, Duration::ZERO);
        // Keep one subscriber so early frames are actually fanned out.
        let _early = bus.subscribe("s-2");
        bus.publish("s-2", status("before"));

        let mut late = bus.subscribe("s-2");
        bus.publish("s-2", status("after"));

        let frame = late.next().await.unwrap();
        assert_eq!(frame.sequence, 2);
    }

    #[tokio::test]
    async fn test_drain_closes_streams() {
        let bus = EventBus::with_options(16, Duration::ZERO);
        let mut stream = bus.subscribe("s-3");
        bus.publish("s-3", status("one"));
        bus.drain_session("s-3");

        // Buffered frame is still delivered, then the stream ends.
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::with_options(16, Duration::ZERO);
        let frame = bus.publish("nobody", status("void"));
        assert_eq!(frame.sequence, 1);
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_emits_frames() {
        let bus = EventBus::with_options(16, Duration::from_millis(20));
        let mut stream = bus.subscribe("hb");
        let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("heartbeat within deadline")
            .unwrap();
        assert_eq!(frame.payload.kind(), "heartbeat");
        bus.drain_session("hb");
    }
}
