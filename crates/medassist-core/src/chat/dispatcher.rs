//! Delivery of message snapshots to observers, by push or by polling

use super::conversation::{Message, MessageId, Session, TurnEvent};
use crate::config::DispatcherConfig;
use crate::llm::Role;
use crate::search::SourceRecord;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

/// What an observer sees of one message at one moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub generating: bool,
    pub status: Option<String>,
    pub sources: Option<Vec<SourceRecord>>,
}

impl MessageSnapshot {
    pub fn from_message(id: MessageId, message: &Message) -> Self {
        Self {
            id,
            role: message.role,
            content: message.content.clone(),
            generating: message.generating,
            status: message.status.clone(),
            sources: message.attached_sources.clone(),
        }
    }
}

/// Produces finite snapshot streams for a message.
///
/// Streams yield only snapshots that differ from the previous one and end
/// right after the first snapshot with `generating = false`. An unknown
/// message id gives an empty stream.
#[derive(Debug, Clone)]
pub struct StreamDispatcher {
    poll_interval: Duration,
}

impl Default for StreamDispatcher {
    fn default() -> Self {
        Self::new(&DispatcherConfig::default())
    }
}

struct Cursor {
    session: Arc<Session>,
    id: MessageId,
    last: Option<MessageSnapshot>,
    done: bool,
}

impl Cursor {
    fn new(session: Arc<Session>, id: MessageId) -> Self {
        Self {
            session,
            id,
            last: None,
            done: false,
        }
    }

    /// Read the message; `None` means the stream should end
    fn read(&self) -> Option<MessageSnapshot> {
        self.session
            .message(self.id)
            .map(|m| MessageSnapshot::from_message(self.id, &m))
    }

    /// Returns the snapshot if it should be yielded
    fn advance(&mut self, snapshot: MessageSnapshot) -> Option<MessageSnapshot> {
        if self.last.as_ref() == Some(&snapshot) {
            return None;
        }
        if !snapshot.generating {
            self.done = true;
        }
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }
}

impl StreamDispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Push strategy: wake on every session mutation
    pub fn subscribe(
        &self,
        session: Arc<Session>,
        id: MessageId,
    ) -> BoxStream<'static, MessageSnapshot> {
        let rx = session.watch();
        let state = (Cursor::new(session, id), rx);

        futures::stream::unfold(state, |(mut cursor, mut rx): (Cursor, watch::Receiver<u64>)| async move {
            loop {
                if cursor.done {
                    return None;
                }
                // Mark seen before reading so no mutation slips between the two
                rx.borrow_and_update();
                let snapshot = cursor.read()?;
                if let Some(out) = cursor.advance(snapshot) {
                    return Some((out, (cursor, rx)));
                }
                if rx.changed().await.is_err() {
                    let snapshot = cursor.read()?;
                    cursor.done = true;
                    return cursor.advance(snapshot).map(|out| (out, (cursor, rx)));
                }
            }
        })
        .boxed()
    }

    /// Pull strategy at the configured interval
    pub fn poll(&self, session: Arc<Session>, id: MessageId) -> BoxStream<'static, MessageSnapshot> {
        Self::poll_every(session, id, self.poll_interval)
    }

    /// Pull strategy: re-read the message every `interval`
    pub fn poll_every(
        session: Arc<Session>,
        id: MessageId,
        interval: Duration,
    ) -> BoxStream<'static, MessageSnapshot> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let state = (Cursor::new(session, id), ticker);

        futures::stream::unfold(state, |(mut cursor, mut ticker)| async move {
            loop {
                if cursor.done {
                    return None;
                }
                ticker.tick().await;
                let snapshot = cursor.read()?;
                if let Some(out) = cursor.advance(snapshot) {
                    return Some((out, (cursor, ticker)));
                }
            }
        })
        .boxed()
    }

    /// Raw turn events of a session
    pub fn events(&self, session: &Session) -> broadcast::Receiver<TurnEvent> {
        session.events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_turn() -> (Arc<Session>, MessageId) {
        let session = Arc::new(Session::new("s", "sys"));
        let (_, assistant) = session.update(|c| c.begin_turn("hi")).unwrap();
        (session, assistant)
    }

    #[tokio::test]
    async fn test_unknown_message_gives_empty_stream() {
        let session = Arc::new(Session::new("s", "sys"));
        let dispatcher = StreamDispatcher::default();
        let pushed: Vec<_> = dispatcher.subscribe(Arc::clone(&session), MessageId(9)).collect().await;
        let polled: Vec<_> = dispatcher.poll(session, MessageId(9)).collect().await;
        assert!(pushed.is_empty());
        assert!(polled.is_empty());
    }

    #[tokio::test]
    async fn test_finished_message_yields_single_snapshot() {
        let session = Arc::new(Session::new("s", "sys"));
        let dispatcher = StreamDispatcher::default();
        let snapshots: Vec<_> = dispatcher.subscribe(session, MessageId(0)).collect().await;
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].generating);
        assert_eq!(snapshots[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_subscribe_follows_mutations_until_done() {
        let (session, assistant) = session_with_turn();
        let dispatcher = StreamDispatcher::default();
        let stream = dispatcher.subscribe(Arc::clone(&session), assistant);

        let writer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                for part in ["Drink ", "water ", "often."] {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    session.update(|c| c.append_content(assistant, part)).unwrap();
                }
                session.update(|c| c.finish(assistant)).unwrap();
            })
        };

        let snapshots: Vec<_> = stream.collect().await;
        writer.await.unwrap();

        let last = snapshots.last().unwrap();
        assert!(!last.generating);
        assert_eq!(last.content, "Drink water often.");
        assert_eq!(snapshots.iter().filter(|s| !s.generating).count(), 1);
        for pair in snapshots.windows(2) {
            assert!(pair[1].content.starts_with(&pair[0].content));
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_skips_unchanged_snapshots() {
        let (session, assistant) = session_with_turn();
        let stream = StreamDispatcher::poll_every(Arc::clone(&session), assistant, Duration::from_millis(50));

        let writer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(120)).await;
                session.update(|c| c.append_content(assistant, "Hello")).unwrap();
                tokio::time::sleep(Duration::from_millis(300)).await;
                session.update(|c| c.finish(assistant)).unwrap();
            })
        };

        let snapshots: Vec<_> = stream.collect().await;
        writer.await.unwrap();

        let contents: Vec<(&str, bool)> = snapshots
            .iter()
            .map(|s| (s.content.as_str(), s.generating))
            .collect();
        assert_eq!(contents, vec![("", true), ("Hello", true), ("Hello", false)]);
    }
}
