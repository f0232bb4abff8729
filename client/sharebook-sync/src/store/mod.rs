//! Remote collaborators: tables, storage and their HTTP implementation
//!
//! Each concern is an object-safe async trait so the synchronizer can hold
//! `Arc<dyn PostStore>` and tests can substitute in-memory backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::models::{
    Comment, CommentDraft, CommentId, Like, MediaKind, Notification, NotificationDraft,
    NotificationId, Post, PostId, PostRecord, PostUpsert, User, UserId,
};

pub mod rest;

pub use rest::RestClient;

/// One page of a feed, newest-first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    pub page_size: usize,
    /// Restrict to one author's posts
    pub owner: Option<UserId>,
}

impl PageRequest {
    /// First row index covered by this page
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size
    }

    /// Inclusive row range `[from, to]` covered by this page
    pub fn range(&self) -> (usize, usize) {
        let from = self.offset();
        (from, from + self.page_size.saturating_sub(1))
    }
}

/// Posts, likes and comments
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Page of posts ordered by creation time descending, with author, likes and comments
    async fn fetch_posts(&self, request: &PageRequest) -> SyncResult<Vec<Post>>;

    /// A single post with its comments ordered newest-first
    async fn fetch_post(&self, post_id: &PostId) -> SyncResult<Post>;

    async fn upsert_post(&self, post: &PostUpsert) -> SyncResult<PostRecord>;

    async fn delete_post(&self, post_id: &PostId) -> SyncResult<()>;

    async fn insert_like(&self, user_id: UserId, post_id: &PostId) -> SyncResult<Like>;

    /// Remove every like of `user_id` on `post_id`
    async fn delete_like(&self, user_id: UserId, post_id: &PostId) -> SyncResult<()>;

    async fn insert_comment(&self, comment: &CommentDraft) -> SyncResult<Comment>;

    async fn delete_comment(&self, comment_id: &CommentId) -> SyncResult<()>;
}

/// User profiles
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn fetch_user(&self, user_id: UserId) -> SyncResult<User>;

    async fn update_user(&self, user: &User) -> SyncResult<User>;
}

/// Notifications addressed to a receiver
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Newest-first; `unseen_only` restricts to `seen = false`
    async fn fetch_notifications(
        &self,
        receiver: UserId,
        unseen_only: bool,
    ) -> SyncResult<Vec<Notification>>;

    async fn insert_notification(&self, draft: &NotificationDraft) -> SyncResult<Notification>;

    /// Persist `seen = true` for the notification
    async fn mark_seen(&self, notification: &Notification) -> SyncResult<Notification>;

    async fn delete_notification(&self, notification_id: &NotificationId) -> SyncResult<()>;
}

/// Object storage for post media and profile images
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload bytes to `path`, returning the stored path
    async fn upload(&self, path: &str, bytes: Vec<u8>, kind: MediaKind) -> SyncResult<String>;

    async fn download(&self, path: &str) -> SyncResult<Vec<u8>>;

    fn public_url(&self, path: &str) -> String;
}
