use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use super::likes::{self, LikeAction};
use super::synchronizer::LikeOutcome;
use crate::auth::SessionHandle;
use crate::error::{SyncError, SyncResult};
use crate::metrics;
use crate::models::{Comment, CommentId, Post, PostId};
use crate::realtime::ChangeEvent;
use crate::services::CommentService;
use crate::store::PostStore;

#[derive(Debug, Default)]
struct DetailState {
    post: Option<Post>,
    /// Posts with a like change still awaiting the backend, kept across reloads
    pending_likes: HashSet<PostId>,
}

/// Single-post view with its full comment list
#[derive(Clone)]
pub struct PostDetails {
    posts: Arc<dyn PostStore>,
    comments: CommentService,
    session: SessionHandle,
    state: Arc<Mutex<DetailState>>,
}

impl PostDetails {
    pub fn new(posts: Arc<dyn PostStore>, comments: CommentService, session: SessionHandle) -> Self {
        Self {
            posts,
            comments,
            session,
            state: Arc::default(),
        }
    }

    pub async fn post(&self) -> Option<Post> {
        self.state.lock().await.post.clone()
    }

    /// Fetch the post, comments newest-first
    pub async fn load(&self, post_id: &PostId) -> SyncResult<Post> {
        let mut post = self.posts.fetch_post(post_id).await?;
        post.recompute_like_owner(self.session.user_id());
        post.sort_comments();

        let mut state = self.state.lock().await;
        state.post = Some(post.clone());
        Ok(post)
    }

    fn not_loaded() -> SyncError {
        SyncError::NotFound("no post loaded".to_string())
    }

    pub async fn add_comment(&self, text: &str) -> SyncResult<Comment> {
        let (post_id, owner) = {
            let state = self.state.lock().await;
            let post = state.post.as_ref().ok_or_else(Self::not_loaded)?;
            (post.id.clone(), post.user_id)
        };

        let comment = self.comments.comment(&post_id, owner, text).await?;

        let mut state = self.state.lock().await;
        if let Some(post) = state.post.as_mut().filter(|p| p.id == post_id) {
            if !post.comments.iter().any(|c| c.id == comment.id) {
                post.comments.insert(0, comment.clone());
            }
        }
        Ok(comment)
    }

    pub async fn remove_comment(&self, comment_id: &CommentId) -> SyncResult<()> {
        self.comments.remove(comment_id).await?;
        if let Some(post) = self.state.lock().await.post.as_mut() {
            post.comments.retain(|c| &c.id != comment_id);
        }
        Ok(())
    }

    pub async fn toggle_like(&self) -> SyncResult<LikeOutcome> {
        let user_id = self.session.require_user()?;
        let ticket = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let post = state.post.as_mut().ok_or_else(Self::not_loaded)?;
            if state.pending_likes.contains(&post.id) {
                return Ok(LikeOutcome::Unchanged);
            }
            let action = if post.is_like_owner {
                LikeAction::Unlike
            } else {
                LikeAction::Like
            };
            match likes::begin(post, user_id, action) {
                Some(ticket) => {
                    state.pending_likes.insert(ticket.post_id.clone());
                    ticket
                }
                None => return Ok(LikeOutcome::Unchanged),
            }
        };

        let result = match ticket.action {
            LikeAction::Like => self
                .posts
                .insert_like(user_id, &ticket.post_id)
                .await
                .map(Some),
            LikeAction::Unlike => self
                .posts
                .delete_like(user_id, &ticket.post_id)
                .await
                .map(|_| None),
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.pending_likes.remove(&ticket.post_id);
        let post = state.post.as_mut().filter(|p| p.id == ticket.post_id);
        match result {
            Ok(server_like) => {
                if let Some(post) = post {
                    likes::confirm(post, &ticket, server_like);
                }
                Ok(LikeOutcome::Confirmed {
                    liked: ticket.action == LikeAction::Like,
                })
            }
            Err(e) => {
                if let Some(post) = post {
                    likes::revert(post, &ticket);
                }
                metrics::record_revert(ticket.action.as_str());
                warn!(post_id = %ticket.post_id, error = %e, "Like change failed, reverted");
                Err(e)
            }
        }
    }

    /// Keep the open post in step with live post events
    pub async fn apply_remote_event(&self, event: ChangeEvent) -> bool {
        let mut state = self.state.lock().await;
        match event {
            ChangeEvent::PostUpdated(record) => match state.post.as_mut() {
                Some(post) if post.id == record.id => {
                    post.apply_record(record);
                    true
                }
                _ => false,
            },
            ChangeEvent::PostDeleted(id) => {
                if state.post.as_ref().map_or(false, |p| p.id == id) {
                    state.post = None;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}
