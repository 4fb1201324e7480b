//! Internal event bus.
//!
//! Every inbound platform event (native messages, edits, deletes, typing and
//! all translated IRC protocol events) is published here so the relay engine
//! and any awaiting caller can observe it without polling.

use std::time::Duration;

use {
    rift_common::types::{MessageId, UserRef},
    serde::Serialize,
    tokio::sync::broadcast,
    tracing::warn,
};

use crate::{destination::DestinationId, message::InboundMessage};

const DEFAULT_CAPACITY: usize = 1024;

/// A protocol event from one IRC network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrcEvent {
    pub domain: String,
    pub kind: IrcEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IrcEventKind {
    /// Registration finished; `nick` is the nick the server accepted.
    Connected { nick: String },
    Disconnected { expected: bool },
    Joined { channel: String, nick: String },
    Parted {
        channel: String,
        nick: String,
        reason: Option<String>,
    },
    Message {
        target: String,
        nick: String,
        text: String,
        id: MessageId,
    },
}

/// Everything the relay reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RiftEvent {
    Message(InboundMessage),
    /// The message with this id now has new content.
    Edited(InboundMessage),
    Deleted {
        location: DestinationId,
        id: MessageId,
    },
    BulkDeleted {
        location: DestinationId,
        ids: Vec<MessageId>,
    },
    Typing {
        location: DestinationId,
        user: UserRef,
        is_bot: bool,
    },
    Irc(IrcEvent),
}

/// Broadcast bus shared by platform adapters and the relay engine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RiftEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: RiftEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A receiver on the [`EventBus`].
pub struct EventSubscription {
    rx: broadcast::Receiver<RiftEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once the bus is gone. Lagging skips the missed
    /// events with a warning.
    pub async fn recv(&mut self) -> Option<RiftEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the first event matching `pred`, giving up after `timeout`.
    pub async fn wait_for<F>(&mut self, mut pred: F, timeout: Duration) -> Option<RiftEvent>
    where
        F: FnMut(&RiftEvent) -> bool,
    {
        tokio::time::timeout(timeout, async {
            while let Some(event) = self.recv().await {
                if pred(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn joined(channel: &str) -> RiftEvent {
        RiftEvent::Irc(IrcEvent {
            domain: "irc.libera.chat".into(),
            kind: IrcEventKind::Joined {
                channel: channel.into(),
                nick: "rift".into(),
            },
        })
    }

    #[test]
    fn events_serialize_with_their_tag() {
        let json = serde_json::to_value(RiftEvent::Deleted {
            location: DestinationId::channel(1u64, 2u64),
            id: MessageId(7),
        })
        .unwrap();
        assert_eq!(json["event"], "deleted");
        assert_eq!(json["id"], 7);

        let json = serde_json::to_value(joined("#a")).unwrap();
        assert_eq!(json["event"], "irc");
        assert_eq!(json["kind"]["type"], "joined");
        assert_eq!(json["kind"]["channel"], "#a");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(joined("#a"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn wait_for_skips_non_matching() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.publish(joined("#a"));
        bus.publish(joined("#b"));
        let got = sub
            .wait_for(
                |e| matches!(e, RiftEvent::Irc(IrcEvent { kind: IrcEventKind::Joined { channel, .. }, .. }) if channel == "#b"),
                Duration::from_secs(1),
            )
            .await;
        assert_eq!(got, Some(joined("#b")));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.publish(joined("#a"));
        let got = sub
            .wait_for(|e| *e == joined("#z"), Duration::from_secs(30))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn lagged_subscriber_keeps_receiving() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for c in ["#1", "#2", "#3", "#4"] {
            bus.publish(joined(c));
        }
        assert_eq!(sub.recv().await, Some(joined("#3")));
        assert_eq!(sub.recv().await, Some(joined("#4")));
    }
}
