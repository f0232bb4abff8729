//! Unseen-notification counter and the notification inbox
//!
//! The counter tracks the set of unseen notification ids rather than a bare
//! integer, so repeated or out-of-order events can never push it below zero or
//! count the same notification twice.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::live::{spawn_pump, LiveHandle};
use crate::auth::SessionHandle;
use crate::error::{SyncError, SyncResult};
use crate::metrics;
use crate::models::{Notification, NotificationId, UserId};
use crate::realtime::{ChangeEvent, Subscription};
use crate::store::NotificationStore;

#[derive(Debug, Clone)]
pub struct NotificationCounter {
    receiver: UserId,
    unseen: HashSet<NotificationId>,
}

impl NotificationCounter {
    pub fn new(receiver: UserId) -> Self {
        Self {
            receiver,
            unseen: HashSet::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.unseen.len()
    }

    pub fn receiver(&self) -> UserId {
        self.receiver
    }

    /// Full recount from a freshly fetched list
    pub fn recount(&mut self, notifications: &[Notification]) {
        self.unseen = notifications
            .iter()
            .filter(|n| n.receiver_id == self.receiver && !n.seen)
            .map(|n| n.id.clone())
            .collect();
    }

    /// Apply a live event. Returns whether the count changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::NotificationInserted(n) if n.receiver_id == self.receiver && !n.seen => {
                self.unseen.insert(n.id.clone())
            }
            ChangeEvent::NotificationUpdated { notification, .. } if notification.seen => {
                self.unseen.remove(&notification.id)
            }
            ChangeEvent::NotificationUpdated { notification, .. }
                if notification.receiver_id == self.receiver =>
            {
                self.unseen.insert(notification.id.clone())
            }
            ChangeEvent::NotificationDeleted(id) => self.unseen.remove(id),
            _ => false,
        }
    }

    pub fn mark_seen(&mut self, id: &NotificationId) -> bool {
        self.unseen.remove(id)
    }

    fn mark_unseen(&mut self, id: &NotificationId) -> bool {
        self.unseen.insert(id.clone())
    }
}

#[derive(Debug)]
struct InboxState {
    items: Vec<Notification>,
    counter: NotificationCounter,
}

/// Notifications addressed to the signed-in user, kept in step with live events
#[derive(Clone)]
pub struct NotificationInbox {
    store: Arc<dyn NotificationStore>,
    state: Arc<Mutex<InboxState>>,
}

impl NotificationInbox {
    /// Inbox for the session's user
    pub fn new(store: Arc<dyn NotificationStore>, session: &SessionHandle) -> SyncResult<Self> {
        let receiver = session.require_user()?;
        Ok(Self {
            store,
            state: Arc::new(Mutex::new(InboxState {
                items: Vec::new(),
                counter: NotificationCounter::new(receiver),
            })),
        })
    }

    pub async fn receiver(&self) -> UserId {
        self.state.lock().await.counter.receiver()
    }

    pub async fn unseen_count(&self) -> usize {
        self.state.lock().await.counter.count()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.items.clone()
    }

    /// Fetch every notification and recount
    pub async fn refresh(&self) -> SyncResult<Vec<Notification>> {
        let receiver = self.receiver().await;
        let items = self.store.fetch_notifications(receiver, false).await?;

        let mut state = self.state.lock().await;
        state.counter.recount(&items);
        state.items = items.clone();
        metrics::set_unseen_notifications(state.counter.count());
        debug!(total = items.len(), unseen = state.counter.count(), "Notifications refreshed");
        Ok(items)
    }

    /// Recount from the unseen notifications only, leaving the list alone
    pub async fn refresh_count(&self) -> SyncResult<usize> {
        let receiver = self.receiver().await;
        let unseen = self.store.fetch_notifications(receiver, true).await?;

        let mut state = self.state.lock().await;
        state.counter.recount(&unseen);
        metrics::set_unseen_notifications(state.counter.count());
        Ok(state.counter.count())
    }

    /// Apply a live notification event to the list and the counter
    pub async fn apply_remote_event(&self, event: ChangeEvent) -> bool {
        let mut state = self.state.lock().await;
        let receiver = state.counter.receiver();
        let counted = state.counter.apply(&event);

        let listed = match event {
            ChangeEvent::NotificationInserted(n) if n.receiver_id == receiver => {
                if state.items.iter().any(|i| i.id == n.id) {
                    false
                } else {
                    state.items.insert(0, n);
                    true
                }
            }
            ChangeEvent::NotificationUpdated { notification, .. } => {
                match state.items.iter_mut().find(|i| i.id == notification.id) {
                    Some(existing) => {
                        let sender = existing.sender.take();
                        *existing = notification;
                        existing.sender = sender;
                        true
                    }
                    None => false,
                }
            }
            ChangeEvent::NotificationDeleted(id) => {
                let before = state.items.len();
                state.items.retain(|i| i.id != id);
                state.items.len() != before
            }
            _ => false,
        };

        if counted {
            metrics::set_unseen_notifications(state.counter.count());
        }
        counted || listed
    }

    /// Mark one notification seen: local first, reverted if the backend refuses
    pub async fn mark_seen(&self, id: &NotificationId) -> SyncResult<Notification> {
        let snapshot = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let item = state
                .items
                .iter_mut()
                .find(|i| &i.id == id)
                .ok_or_else(|| SyncError::NotFound(format!("notification {}", id)))?;
            let snapshot = item.clone();
            item.seen = true;
            state.counter.mark_seen(id);
            metrics::set_unseen_notifications(state.counter.count());
            snapshot
        };

        match self.store.mark_seen(&snapshot).await {
            Ok(saved) => Ok(saved),
            Err(e) => {
                warn!(notification_id = %id, error = %e, "Mark seen failed, reverting");
                metrics::record_revert("mark_seen");
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                if let Some(item) = state.items.iter_mut().find(|i| &i.id == id) {
                    item.seen = snapshot.seen;
                    if !snapshot.seen {
                        state.counter.mark_unseen(id);
                    }
                }
                metrics::set_unseen_notifications(state.counter.count());
                Err(e)
            }
        }
    }

    /// Apply every event from `subscription` until the handle is dropped
    pub fn run_live(&self, subscription: Subscription) -> LiveHandle {
        let inbox = self.clone();
        spawn_pump(subscription, move |event| {
            let inbox = inbox.clone();
            async move {
                inbox.apply_remote_event(event).await;
            }
        })
    }

    /// Delete a notification remotely, then drop it locally
    pub async fn remove(&self, id: &NotificationId) -> SyncResult<()> {
        self.store.delete_notification(id).await?;
        let mut state = self.state.lock().await;
        state.items.retain(|i| &i.id != id);
        state.counter.mark_seen(id);
        metrics::set_unseen_notifications(state.counter.count());
        Ok(())
    }
}
