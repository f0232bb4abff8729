//! Async driver around [`FeedState`]
//!
//! The lock is never held across a backend call: each operation takes the
//! lock to read or claim, releases it for the I/O, then takes it again to
//! apply the result. Results that arrive after a reset are dropped.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::cursor::{EndOfDataPolicy, FeedCursor};
use super::feed::{FeedChange, FeedState, LoadOutcome, LoadStart};
use super::likes::LikeAction;
use super::live::{spawn_pump, LiveHandle};
use crate::auth::SessionHandle;
use crate::error::{SyncError, SyncResult};
use crate::metrics;
use crate::models::{Comment, CommentId, Post, PostId, UserId};
use crate::realtime::{ChangeEvent, Subscription};
use crate::services::CommentService;
use crate::store::{PostStore, UserStore};

/// Paging options for one feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    pub page_size: usize,
    pub end_of_data: EndOfDataPolicy,
    pub owner: Option<UserId>,
}

impl FeedOptions {
    pub fn global(page_size: usize, end_of_data: EndOfDataPolicy) -> Self {
        Self {
            page_size,
            end_of_data,
            owner: None,
        }
    }

    pub fn for_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Outcome of a like toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Backend confirmed; the flag now reads `liked`
    Confirmed { liked: bool },
    /// Already in the requested state, or a change for this post is still pending
    Unchanged,
}

/// One feed view: its list, its cursor and the collaborators that fill them
#[derive(Clone)]
pub struct FeedSynchronizer {
    posts: Arc<dyn PostStore>,
    users: Arc<dyn UserStore>,
    session: SessionHandle,
    state: Arc<Mutex<FeedState>>,
}

impl FeedSynchronizer {
    pub fn new(
        posts: Arc<dyn PostStore>,
        users: Arc<dyn UserStore>,
        session: SessionHandle,
        options: FeedOptions,
    ) -> Self {
        let state = FeedState::new(
            session.user_id(),
            options.page_size,
            options.owner,
            options.end_of_data,
        );
        Self {
            posts,
            users,
            session,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current list
    pub async fn snapshot(&self) -> Vec<Post> {
        self.state.lock().await.posts().to_vec()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    pub async fn cursor(&self) -> FeedCursor {
        self.state.lock().await.cursor().clone()
    }

    pub async fn post(&self, post_id: &PostId) -> Option<Post> {
        self.state.lock().await.get(post_id).cloned()
    }

    /// Fetch and append the next page
    ///
    /// A failed fetch leaves the cursor untouched, so calling again retries the same page.
    #[instrument(skip(self))]
    pub async fn load_next_page(&self) -> SyncResult<LoadOutcome> {
        let ticket = {
            let mut state = self.state.lock().await;
            if state.viewer() != self.session.user_id() {
                state.set_viewer(self.session.user_id());
            }
            match state.begin_load() {
                LoadStart::Fetch(ticket) => ticket,
                LoadStart::Exhausted => {
                    metrics::record_page("exhausted");
                    return Ok(LoadOutcome::Exhausted);
                }
                LoadStart::InFlight => return Ok(LoadOutcome::InFlight),
            }
        };

        let started = Instant::now();
        let result = self.posts.fetch_posts(&ticket.request).await;
        metrics::observe_page_fetch(
            if result.is_ok() { "ok" } else { "error" },
            started.elapsed(),
        );

        let mut state = self.state.lock().await;
        match result {
            Ok(page) => {
                let outcome = state.complete_load(&ticket, page);
                match outcome {
                    LoadOutcome::Loaded {
                        page,
                        appended,
                        end_of_data,
                        ..
                    } => {
                        metrics::record_page("loaded");
                        debug!(page, appended, end_of_data, total = state.len(), "Page applied");
                    }
                    LoadOutcome::Discarded => {
                        metrics::record_page("discarded");
                        debug!(page = ticket.request.page, "Discarded page from a previous feed");
                    }
                    _ => {}
                }
                Ok(outcome)
            }
            Err(e) => {
                state.fail_load(&ticket);
                metrics::record_page("failed");
                warn!(page = ticket.request.page, error = %e, "Page fetch failed");
                Err(e)
            }
        }
    }

    /// Apply one live change to the list
    ///
    /// Inserts are enriched with the author's profile first. A failed author
    /// lookup still shows the post, without author fields.
    pub async fn apply_remote_event(&self, event: ChangeEvent) -> SyncResult<FeedChange> {
        metrics::record_live_event(event.table(), event.kind().as_str());

        let change = match event {
            ChangeEvent::PostInserted(record) => {
                if !self.state.lock().await.accepts_insert(&record) {
                    return Ok(FeedChange::Ignored);
                }
                let author = match self.users.fetch_user(record.user_id).await {
                    Ok(user) => Some(user.author()),
                    Err(e) => {
                        warn!(post_id = %record.id, error = %e, "Author lookup failed for live post");
                        None
                    }
                };
                self.state.lock().await.apply_insert(record, author)
            }
            other => self.state.lock().await.apply_event(other),
        };

        if change != FeedChange::Ignored {
            debug!(change = ?change, "Live change applied");
        }
        Ok(change)
    }

    /// Like or unlike depending on the current flag
    pub async fn toggle_like(&self, post_id: &PostId) -> SyncResult<LikeOutcome> {
        let liked = self
            .post(post_id)
            .await
            .map(|p| p.is_like_owner)
            .ok_or_else(|| SyncError::NotFound(format!("post {} is not in this feed", post_id)))?;
        let action = if liked {
            LikeAction::Unlike
        } else {
            LikeAction::Like
        };
        self.set_like(post_id, action).await
    }

    pub async fn like(&self, post_id: &PostId) -> SyncResult<LikeOutcome> {
        self.set_like(post_id, LikeAction::Like).await
    }

    pub async fn unlike(&self, post_id: &PostId) -> SyncResult<LikeOutcome> {
        self.set_like(post_id, LikeAction::Unlike).await
    }

    /// Optimistic like change, confirmed or reverted once the backend answers
    async fn set_like(&self, post_id: &PostId, action: LikeAction) -> SyncResult<LikeOutcome> {
        let user_id = self.session.require_user()?;
        let ticket = {
            let mut state = self.state.lock().await;
            if state.viewer() != Some(user_id) {
                state.set_viewer(Some(user_id));
            }
            match state.begin_like(post_id, action)? {
                Some(ticket) => ticket,
                None => return Ok(LikeOutcome::Unchanged),
            }
        };

        let result = match action {
            LikeAction::Like => self.posts.insert_like(user_id, post_id).await.map(Some),
            LikeAction::Unlike => self.posts.delete_like(user_id, post_id).await.map(|_| None),
        };

        let mut state = self.state.lock().await;
        match result {
            Ok(server_like) => {
                state.confirm_like(&ticket, server_like);
                Ok(LikeOutcome::Confirmed {
                    liked: action == LikeAction::Like,
                })
            }
            Err(e) => {
                state.revert_like(&ticket);
                metrics::record_revert(action.as_str());
                warn!(post_id = %post_id, action = action.as_str(), error = %e, "Like change failed, reverted");
                Err(e)
            }
        }
    }

    /// Comment on a post in this feed; the comment shows once the backend accepts it
    pub async fn add_comment(
        &self,
        comments: &CommentService,
        post_id: &PostId,
        text: &str,
    ) -> SyncResult<Comment> {
        let owner = self
            .post(post_id)
            .await
            .map(|p| p.user_id)
            .ok_or_else(|| SyncError::NotFound(format!("post {} is not in this feed", post_id)))?;
        let comment = comments.comment(post_id, owner, text).await?;
        self.apply_comment_added(post_id, comment.clone()).await;
        Ok(comment)
    }

    pub async fn remove_comment(
        &self,
        comments: &CommentService,
        post_id: &PostId,
        comment_id: &CommentId,
    ) -> SyncResult<()> {
        comments.remove(comment_id).await?;
        self.apply_comment_removed(post_id, comment_id).await;
        Ok(())
    }

    /// Record a comment the backend has accepted
    pub async fn apply_comment_added(&self, post_id: &PostId, comment: Comment) -> bool {
        self.state.lock().await.add_comment(post_id, comment)
    }

    pub async fn apply_comment_removed(&self, post_id: &PostId, comment_id: &CommentId) -> bool {
        self.state.lock().await.remove_comment(post_id, comment_id)
    }

    /// Delete a post remotely, then drop it from the list
    pub async fn remove_post(&self, post_id: &PostId) -> SyncResult<()> {
        self.posts.delete_post(post_id).await?;
        self.state.lock().await.remove_post(post_id);
        info!(post_id = %post_id, "Post removed");
        Ok(())
    }

    /// Start over from page one, scoped to `owner`
    pub async fn switch_owner(&self, owner: Option<UserId>) {
        let mut state = self.state.lock().await;
        state.reset(owner);
        state.set_viewer(self.session.user_id());
        info!(owner = ?owner, "Feed reset");
    }

    /// Apply every event from `subscription` until the handle is dropped
    pub fn run_live(&self, subscription: Subscription) -> LiveHandle {
        let sync = self.clone();
        spawn_pump(subscription, move |event| {
            let sync = sync.clone();
            async move {
                if let Err(e) = sync.apply_remote_event(event).await {
                    warn!(error = %e, "Failed to apply live change");
                }
            }
        })
    }
}
