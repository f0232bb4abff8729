//! Live change feed for the posts and notifications tables
//!
//! The websocket client decodes raw row changes into typed [`ChangeEvent`]s and
//! delivers them through a [`Subscription`]. Dropping the subscription leaves
//! the channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{SyncError, SyncResult};
use crate::models::{Notification, NotificationId, PostId, PostRecord, UserId};

pub mod client;
pub mod messages;

pub use client::RealtimeClient;

pub const POSTS_TABLE: &str = "posts";
pub const NOTIFICATIONS_TABLE: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// Row change as delivered on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "type", alias = "eventType")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default, alias = "new")]
    pub record: Option<Value>,
    #[serde(default, alias = "old")]
    pub old_record: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RowKey {
    id: PostId,
}

#[derive(Debug, Deserialize)]
struct OldNotification {
    id: NotificationId,
    #[serde(default)]
    seen: Option<bool>,
}

/// Typed change for the tables the client follows
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    PostInserted(PostRecord),
    PostUpdated(PostRecord),
    PostDeleted(PostId),
    NotificationInserted(Notification),
    NotificationUpdated {
        notification: Notification,
        /// Previous seen flag when the old row carries it
        was_seen: Option<bool>,
    },
    NotificationDeleted(NotificationId),
}

impl ChangeEvent {
    /// Decode a raw change; `None` for tables the client does not follow
    pub fn decode(raw: RawChange) -> SyncResult<Option<Self>> {
        let event = match (raw.table.as_str(), raw.kind) {
            (POSTS_TABLE, ChangeKind::Insert) => {
                ChangeEvent::PostInserted(decode_row(raw.record, "record")?)
            }
            (POSTS_TABLE, ChangeKind::Update) => {
                ChangeEvent::PostUpdated(decode_row(raw.record, "record")?)
            }
            (POSTS_TABLE, ChangeKind::Delete) => {
                let key: RowKey = decode_row(raw.old_record, "old_record")?;
                ChangeEvent::PostDeleted(key.id)
            }
            (NOTIFICATIONS_TABLE, ChangeKind::Insert) => {
                ChangeEvent::NotificationInserted(decode_row(raw.record, "record")?)
            }
            (NOTIFICATIONS_TABLE, ChangeKind::Update) => {
                let was_seen = raw
                    .old_record
                    .and_then(|old| serde_json::from_value::<OldNotification>(old).ok())
                    .and_then(|old| old.seen);
                ChangeEvent::NotificationUpdated {
                    notification: decode_row(raw.record, "record")?,
                    was_seen,
                }
            }
            (NOTIFICATIONS_TABLE, ChangeKind::Delete) => {
                let old: OldNotification = decode_row(raw.old_record, "old_record")?;
                ChangeEvent::NotificationDeleted(old.id)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn table(&self) -> &'static str {
        match self {
            ChangeEvent::PostInserted(_)
            | ChangeEvent::PostUpdated(_)
            | ChangeEvent::PostDeleted(_) => POSTS_TABLE,
            _ => NOTIFICATIONS_TABLE,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::PostInserted(_) | ChangeEvent::NotificationInserted(_) => {
                ChangeKind::Insert
            }
            ChangeEvent::PostUpdated(_) | ChangeEvent::NotificationUpdated { .. } => {
                ChangeKind::Update
            }
            ChangeEvent::PostDeleted(_) | ChangeEvent::NotificationDeleted(_) => {
                ChangeKind::Delete
            }
        }
    }
}

fn decode_row<T: serde::de::DeserializeOwned>(row: Option<Value>, field: &str) -> SyncResult<T> {
    let row = row
        .filter(|v| !v.is_null())
        .ok_or_else(|| SyncError::Realtime(format!("change without {}", field)))?;
    Ok(serde_json::from_value(row)?)
}

/// What a subscription listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionScope {
    /// Every change on the posts table
    Posts,
    /// Notification changes addressed to one receiver
    Notifications { receiver: UserId },
}

impl SubscriptionScope {
    pub fn table(&self) -> &'static str {
        match self {
            SubscriptionScope::Posts => POSTS_TABLE,
            SubscriptionScope::Notifications { .. } => NOTIFICATIONS_TABLE,
        }
    }

    /// Server-side row filter, if any
    pub fn filter(&self) -> Option<String> {
        match self {
            SubscriptionScope::Posts => None,
            SubscriptionScope::Notifications { receiver } => {
                Some(format!("receiverId=eq.{}", receiver))
            }
        }
    }

    pub fn topic(&self) -> String {
        match self {
            SubscriptionScope::Posts => format!("realtime:{}", POSTS_TABLE),
            SubscriptionScope::Notifications { receiver } => {
                format!("realtime:{}:{}", NOTIFICATIONS_TABLE, receiver)
            }
        }
    }

    /// Whether an event belongs to this scope
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (SubscriptionScope::Posts, event) => event.table() == POSTS_TABLE,
            (SubscriptionScope::Notifications { receiver }, event) => match event {
                ChangeEvent::NotificationInserted(n)
                | ChangeEvent::NotificationUpdated { notification: n, .. } => {
                    n.receiver_id == *receiver
                }
                // Delete payloads carry only the key
                ChangeEvent::NotificationDeleted(_) => true,
                _ => false,
            },
        }
    }
}

/// Stream of typed events for one scope
///
/// Dropping or [`unsubscribe`](Subscription::unsubscribe)-ing stops delivery.
#[derive(Debug)]
pub struct Subscription {
    scope: SubscriptionScope,
    events: mpsc::Receiver<ChangeEvent>,
    stop: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(
        scope: SubscriptionScope,
        events: mpsc::Receiver<ChangeEvent>,
        stop: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            scope,
            events,
            stop,
        }
    }

    pub fn scope(&self) -> SubscriptionScope {
        self.scope
    }

    /// Next event, `None` once the channel is closed
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.stop_channel();
    }

    fn stop_channel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.events.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop_channel();
    }
}

/// Source of live change events
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription>;
}
