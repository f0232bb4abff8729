//! In-memory collaborators for integration tests
//!
//! `MockBackend` implements every store trait over shared vectors, with
//! per-operation failure injection and per-operation gates that hold calls
//! in flight until released. `ChannelFeed` hands out subscriptions fed by the test.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use sharebook_sync::auth::{Session, SessionHandle};
use sharebook_sync::models::{
    Comment, CommentDraft, CommentId, Like, LikeId, MediaKind, Notification, NotificationDraft,
    NotificationId, Post, PostId, PostRecord, PostUpsert, User, UserId,
};
use sharebook_sync::realtime::{ChangeEvent, ChangeFeed, Subscription, SubscriptionScope};
use sharebook_sync::{
    MediaStore, NotificationStore, PageRequest, PostStore, SyncError, SyncResult, UserStore,
};

pub fn user_id(n: u128) -> UserId {
    Uuid::from_u128(n)
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

pub fn record(id: i64, owner: UserId, minutes: i64) -> PostRecord {
    PostRecord {
        id: PostId::from(id),
        user_id: owner,
        created_at: base_time() + Duration::minutes(minutes),
        body: format!("<p>post {}</p>", id),
        file: None,
    }
}

/// Post whose creation time grows with its id
pub fn post(id: i64, owner: UserId) -> Post {
    Post::from(record(id, owner, id))
}

pub fn user(id: UserId, name: &str) -> User {
    User {
        id,
        name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase())),
        image: None,
        bio: None,
        address: None,
        phone_number: None,
        expo_push_token: None,
    }
}

pub fn notification(id: i64, receiver: UserId, seen: bool) -> Notification {
    Notification {
        id: NotificationId::from(id),
        sender_id: user_id(99),
        receiver_id: receiver,
        title: "commented on your post".to_string(),
        data: r#"{"postId":1}"#.to_string(),
        seen,
        created_at: Some(base_time() + Duration::minutes(id)),
        sender: None,
    }
}

pub fn session_for(user: UserId) -> SessionHandle {
    SessionHandle::signed_in(Session {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        user_id: user,
        email: None,
        expires_at: Utc::now() + Duration::hours(1),
    })
}

/// Posts sorted newest-first, as the backend orders them
pub fn is_newest_first(posts: &[Post]) -> bool {
    posts.windows(2).all(|w| w[0].created_at >= w[1].created_at)
}

#[derive(Default)]
struct Inner {
    posts: Vec<Post>,
    users: HashMap<UserId, User>,
    notifications: Vec<Notification>,
    uploads: HashMap<String, Vec<u8>>,
    next_id: i64,
    failures: HashMap<&'static str, usize>,
    calls: HashMap<&'static str, usize>,
    page_requests: Vec<PageRequest>,
}

/// Shared in-memory backend
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<Inner>>,
    gates: Arc<Mutex<HashMap<&'static str, watch::Sender<bool>>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.inner.lock().unwrap().next_id = 1000;
        backend
    }

    pub fn with_posts(posts: Vec<Post>) -> Self {
        let backend = Self::new();
        backend.inner.lock().unwrap().posts = posts;
        backend
    }

    pub fn add_post(&self, post: Post) {
        self.inner.lock().unwrap().posts.push(post);
    }

    pub fn add_user(&self, user: User) {
        self.inner.lock().unwrap().users.insert(user.id, user);
    }

    pub fn add_notification(&self, notification: Notification) {
        self.inner.lock().unwrap().notifications.push(notification);
    }

    /// Make the next `times` calls of `operation` fail with a transport error
    pub fn fail_next(&self, operation: &'static str, times: usize) {
        self.inner.lock().unwrap().failures.insert(operation, times);
    }

    pub fn calls(&self, operation: &'static str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.inner.lock().unwrap().page_requests.clone()
    }

    pub fn likes_of(&self, post_id: &PostId) -> Vec<Like> {
        let inner = self.inner.lock().unwrap();
        inner
            .posts
            .iter()
            .find(|p| &p.id == post_id)
            .map(|p| p.post_likes.clone())
            .unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().notifications.clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.inner.lock().unwrap().uploads.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Write a like straight into the store, as another session would
    pub fn store_like(&self, like: Like) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(post) = inner
            .posts
            .iter_mut()
            .find(|p| Some(&p.id) == like.post_id.as_ref())
        {
            post.post_likes.push(like);
        }
    }

    pub fn stored_post(&self, post_id: &PostId) -> Option<Post> {
        let inner = self.inner.lock().unwrap();
        inner.posts.iter().find(|p| &p.id == post_id).cloned()
    }

    /// Park every later call of `operation` until [`MockBackend::release`]
    pub fn hold(&self, operation: &'static str) {
        let (gate, _) = watch::channel(false);
        self.gates.lock().unwrap().insert(operation, gate);
    }

    pub fn release(&self, operation: &'static str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(operation) {
            gate.send_replace(true);
        }
    }

    /// Hold every page fetch until [`MockBackend::release_fetches`]
    pub fn hold_fetches(&self) {
        self.hold("fetch_posts");
    }

    pub fn release_fetches(&self) {
        self.release("fetch_posts");
    }

    async fn pass_gate(&self, operation: &'static str) {
        let gate = self.gates.lock().unwrap().get(operation).map(|g| g.subscribe());
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
    }

    /// Count the call and consume one injected failure, if any
    fn enter(&self, operation: &'static str) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        *inner.calls.entry(operation).or_default() += 1;
        if let Some(remaining) = inner.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SyncError::Transport(format!("{} unavailable", operation)));
            }
        }
        Ok(())
    }

    fn next_id(&self) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        inner.next_id
    }
}

#[async_trait]
impl PostStore for MockBackend {
    async fn fetch_posts(&self, request: &PageRequest) -> SyncResult<Vec<Post>> {
        self.enter("fetch_posts")?;
        let page = {
            let mut inner = self.inner.lock().unwrap();
            inner.page_requests.push(*request);
            let mut posts: Vec<Post> = inner
                .posts
                .iter()
                .filter(|p| request.owner.map_or(true, |owner| p.user_id == owner))
                .cloned()
                .collect();
            posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            posts
                .into_iter()
                .skip(request.offset())
                .take(request.page_size)
                .collect::<Vec<_>>()
        };

        self.pass_gate("fetch_posts").await;
        Ok(page)
    }

    async fn fetch_post(&self, post_id: &PostId) -> SyncResult<Post> {
        self.enter("fetch_post")?;
        self.stored_post(post_id)
            .ok_or_else(|| SyncError::NotFound(format!("post {}", post_id)))
    }

    async fn upsert_post(&self, upsert: &PostUpsert) -> SyncResult<PostRecord> {
        self.enter("upsert_post")?;
        let id = match &upsert.id {
            Some(id) => id.clone(),
            None => PostId::from(self.next_id()),
        };
        let mut inner = self.inner.lock().unwrap();
        let record = match inner.posts.iter_mut().find(|p| p.id == id) {
            Some(existing) => {
                existing.body = upsert.body.clone();
                existing.file = upsert.file.clone();
                PostRecord {
                    id: existing.id.clone(),
                    user_id: existing.user_id,
                    created_at: existing.created_at,
                    body: existing.body.clone(),
                    file: existing.file.clone(),
                }
            }
            None => {
                let record = PostRecord {
                    id,
                    user_id: upsert.user_id,
                    created_at: Utc::now(),
                    body: upsert.body.clone(),
                    file: upsert.file.clone(),
                };
                inner.posts.push(Post::from(record.clone()));
                record
            }
        };
        Ok(record)
    }

    async fn delete_post(&self, post_id: &PostId) -> SyncResult<()> {
        self.enter("delete_post")?;
        self.inner.lock().unwrap().posts.retain(|p| &p.id != post_id);
        Ok(())
    }

    async fn insert_like(&self, user_id: UserId, post_id: &PostId) -> SyncResult<Like> {
        self.enter("insert_like")?;
        self.pass_gate("insert_like").await;
        let like = Like {
            id: LikeId::from(self.next_id()),
            user_id,
            post_id: Some(post_id.clone()),
            created_at: Some(Utc::now()),
        };
        let mut inner = self.inner.lock().unwrap();
        let post = inner
            .posts
            .iter_mut()
            .find(|p| &p.id == post_id)
            .ok_or_else(|| SyncError::NotFound(format!("post {}", post_id)))?;
        if post.post_likes.iter().any(|l| l.user_id == user_id) {
            return Err(SyncError::Backend {
                status: 409,
                message: "duplicate like".to_string(),
            });
        }
        post.post_likes.push(like.clone());
        Ok(like)
    }

    async fn delete_like(&self, user_id: UserId, post_id: &PostId) -> SyncResult<()> {
        self.enter("delete_like")?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(post) = inner.posts.iter_mut().find(|p| &p.id == post_id) {
            post.post_likes.retain(|l| l.user_id != user_id);
        }
        Ok(())
    }

    async fn insert_comment(&self, draft: &CommentDraft) -> SyncResult<Comment> {
        self.enter("insert_comment")?;
        let id = CommentId::from(self.next_id());
        let mut inner = self.inner.lock().unwrap();
        let author = inner.users.get(&draft.user_id).map(|u| u.author());
        let comment = Comment {
            id,
            post_id: draft.post_id.clone(),
            user_id: draft.user_id,
            text: draft.text.clone(),
            created_at: Utc::now(),
            user: author,
        };
        if let Some(post) = inner.posts.iter_mut().find(|p| p.id == draft.post_id) {
            post.comments.push(comment.clone());
        }
        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: &CommentId) -> SyncResult<()> {
        self.enter("delete_comment")?;
        let mut inner = self.inner.lock().unwrap();
        for post in inner.posts.iter_mut() {
            post.comments.retain(|c| &c.id != comment_id);
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MockBackend {
    async fn fetch_user(&self, user_id: UserId) -> SyncResult<User> {
        self.enter("fetch_user")?;
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("user {}", user_id)))
    }

    async fn update_user(&self, user: &User) -> SyncResult<User> {
        self.enter("update_user")?;
        self.inner
            .lock()
            .unwrap()
            .users
            .insert(user.id, user.clone());
        Ok(user.clone())
    }
}

#[async_trait]
impl NotificationStore for MockBackend {
    async fn fetch_notifications(
        &self,
        receiver: UserId,
        unseen_only: bool,
    ) -> SyncResult<Vec<Notification>> {
        self.enter("fetch_notifications")?;
        let mut list: Vec<Notification> = self
            .inner
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| n.receiver_id == receiver && (!unseen_only || !n.seen))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn insert_notification(&self, draft: &NotificationDraft) -> SyncResult<Notification> {
        self.enter("insert_notification")?;
        let notification = Notification {
            id: NotificationId::from(self.next_id()),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            title: draft.title.clone(),
            data: draft.data.clone(),
            seen: false,
            created_at: Some(Utc::now()),
            sender: None,
        };
        self.inner
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn mark_seen(&self, notification: &Notification) -> SyncResult<Notification> {
        self.enter("mark_seen")?;
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == notification.id)
            .ok_or_else(|| SyncError::NotFound(format!("notification {}", notification.id)))?;
        stored.seen = true;
        Ok(stored.clone())
    }

    async fn delete_notification(&self, notification_id: &NotificationId) -> SyncResult<()> {
        self.enter("delete_notification")?;
        self.inner
            .lock()
            .unwrap()
            .notifications
            .retain(|n| &n.id != notification_id);
        Ok(())
    }
}

#[async_trait]
impl MediaStore for MockBackend {
    async fn upload(&self, path: &str, bytes: Vec<u8>, _kind: MediaKind) -> SyncResult<String> {
        self.enter("upload")?;
        let mut inner = self.inner.lock().unwrap();
        if inner.uploads.contains_key(path) {
            return Err(SyncError::Backend {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }
        inner.uploads.insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    async fn download(&self, path: &str) -> SyncResult<Vec<u8>> {
        self.enter("download")?;
        self.inner
            .lock()
            .unwrap()
            .uploads
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(path.to_string()))
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://mock.local/storage/v1/object/public/uploads/{}", path)
    }
}

/// Change feed driven by the test through [`ChannelFeed::emit`]
#[derive(Clone, Default)]
pub struct ChannelFeed {
    senders: Arc<Mutex<Vec<(SubscriptionScope, mpsc::Sender<ChangeEvent>)>>>,
}

impl ChannelFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every open subscription whose scope accepts it
    pub async fn emit(&self, event: ChangeEvent) -> usize {
        let targets: Vec<_> = {
            let mut senders = self.senders.lock().unwrap();
            senders.retain(|(_, tx)| !tx.is_closed());
            senders
                .iter()
                .filter(|(scope, _)| scope.accepts(&event))
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        let mut delivered = 0;
        for tx in targets {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn open_subscriptions(&self) -> usize {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|(_, tx)| !tx.is_closed());
        senders.len()
    }
}

#[async_trait]
impl ChangeFeed for ChannelFeed {
    async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription> {
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().unwrap().push((scope, tx));
        Ok(Subscription::new(scope, rx, None))
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
