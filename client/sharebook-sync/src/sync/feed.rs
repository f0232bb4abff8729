//! Feed state as a pure reducer
//!
//! Everything here is synchronous: the synchronizer does the I/O, takes the
//! lock and calls into [`FeedState`]. Pages append at the tail and live
//! inserts prepend at the head, with identity-based de-duplication on both.

use std::collections::HashSet;

use serde::Serialize;

use super::cursor::{EndOfDataPolicy, FeedCursor};
use super::likes::{self, LikeAction, LikeTicket};
use crate::error::{SyncError, SyncResult};
use crate::models::{Author, Comment, CommentId, Like, Post, PostId, PostRecord, UserId};
use crate::realtime::ChangeEvent;
use crate::store::PageRequest;

/// Page fetch handed out by [`FeedState::begin_load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    pub request: PageRequest,
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStart {
    Fetch(PageTicket),
    /// End of data already reached; nothing to fetch
    Exhausted,
    /// Another page fetch has not finished yet
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded {
        page: u32,
        appended: usize,
        duplicates: usize,
        end_of_data: bool,
    },
    Exhausted,
    InFlight,
    /// The feed was reset while the page was in flight
    Discarded,
}

/// Result of applying a live event to the list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedChange {
    Prepended(PostId),
    Updated(PostId),
    Removed(PostId),
    Ignored,
}

/// Ordered, duplicate-free post list for one screen context
#[derive(Debug, Clone)]
pub struct FeedState {
    posts: Vec<Post>,
    ids: HashSet<PostId>,
    cursor: FeedCursor,
    viewer: Option<UserId>,
    epoch: u64,
    loading: bool,
    pending_likes: HashSet<PostId>,
}

impl FeedState {
    pub fn new(
        viewer: Option<UserId>,
        page_size: usize,
        owner: Option<UserId>,
        policy: EndOfDataPolicy,
    ) -> Self {
        Self {
            posts: Vec::new(),
            ids: HashSet::new(),
            cursor: FeedCursor::new(page_size, owner, policy),
            viewer,
            epoch: 0,
            loading: false,
            pending_likes: HashSet::new(),
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn get(&self, post_id: &PostId) -> Option<&Post> {
        self.posts.iter().find(|p| &p.id == post_id)
    }

    fn get_mut(&mut self, post_id: &PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| &p.id == post_id)
    }

    pub fn cursor(&self) -> &FeedCursor {
        &self.cursor
    }

    pub fn owner(&self) -> Option<UserId> {
        self.cursor.owner()
    }

    pub fn viewer(&self) -> Option<UserId> {
        self.viewer
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Change the viewing user and recompute every like flag
    pub fn set_viewer(&mut self, viewer: Option<UserId>) {
        self.viewer = viewer;
        for post in &mut self.posts {
            post.recompute_like_owner(viewer);
        }
    }

    /// Clear the list and cursor, optionally re-scoping to another owner
    ///
    /// Any page fetch still in flight belongs to the previous epoch and will be discarded.
    /// Pending like changes stay claimed until their tickets settle.
    pub fn reset(&mut self, owner: Option<UserId>) {
        self.posts.clear();
        self.ids.clear();
        self.cursor.reset(owner);
        self.loading = false;
        self.epoch += 1;
    }

    /// Claim the next page fetch
    pub fn begin_load(&mut self) -> LoadStart {
        if self.loading {
            return LoadStart::InFlight;
        }
        match self.cursor.next_request() {
            Some(request) => {
                self.loading = true;
                LoadStart::Fetch(PageTicket {
                    request,
                    epoch: self.epoch,
                })
            }
            None => LoadStart::Exhausted,
        }
    }

    /// Apply a fetched page; stale tickets from before a reset change nothing
    pub fn complete_load(&mut self, ticket: &PageTicket, page: Vec<Post>) -> LoadOutcome {
        if ticket.epoch != self.epoch {
            return LoadOutcome::Discarded;
        }
        self.loading = false;

        let returned = page.len();
        let mut appended = 0;
        for mut post in page {
            if self.ids.contains(&post.id) {
                continue;
            }
            post.recompute_like_owner(self.viewer);
            self.ids.insert(post.id.clone());
            self.posts.push(post);
            appended += 1;
        }
        let end_of_data = self.cursor.commit(&ticket.request, returned);

        LoadOutcome::Loaded {
            page: ticket.request.page,
            appended,
            duplicates: returned - appended,
            end_of_data,
        }
    }

    /// Release a failed fetch without touching the cursor
    pub fn fail_load(&mut self, ticket: &PageTicket) {
        if ticket.epoch == self.epoch {
            self.loading = false;
        }
    }

    /// Whether a freshly inserted post would be shown in this feed
    pub fn accepts_insert(&self, record: &PostRecord) -> bool {
        let owner_ok = self.owner().map_or(true, |owner| owner == record.user_id);
        owner_ok && !self.ids.contains(&record.id)
    }

    /// Prepend a live-inserted post
    pub fn apply_insert(&mut self, record: PostRecord, author: Option<Author>) -> FeedChange {
        if !self.accepts_insert(&record) {
            return FeedChange::Ignored;
        }
        let post = Post::from(record).with_author(author);
        let id = post.id.clone();
        self.ids.insert(id.clone());
        self.posts.insert(0, post);
        FeedChange::Prepended(id)
    }

    /// Apply a live post event; inserts should go through [`FeedState::apply_insert`]
    /// once the author is known
    pub fn apply_event(&mut self, event: ChangeEvent) -> FeedChange {
        match event {
            ChangeEvent::PostInserted(record) => self.apply_insert(record, None),
            ChangeEvent::PostUpdated(record) => {
                let id = record.id.clone();
                match self.get_mut(&id) {
                    Some(post) => {
                        post.apply_record(record);
                        FeedChange::Updated(id)
                    }
                    None => FeedChange::Ignored,
                }
            }
            ChangeEvent::PostDeleted(id) => self.remove_post(&id),
            _ => FeedChange::Ignored,
        }
    }

    pub fn remove_post(&mut self, post_id: &PostId) -> FeedChange {
        if !self.ids.remove(post_id) {
            return FeedChange::Ignored;
        }
        self.posts.retain(|p| &p.id != post_id);
        FeedChange::Removed(post_id.clone())
    }

    /// Start an optimistic like change on a post in this feed
    ///
    /// `Ok(None)` when the post is already in the requested state or a change
    /// for it is still pending.
    pub fn begin_like(
        &mut self,
        post_id: &PostId,
        action: LikeAction,
    ) -> SyncResult<Option<LikeTicket>> {
        let viewer = self
            .viewer
            .ok_or_else(|| SyncError::Unauthenticated("liking requires a session".to_string()))?;
        if self.pending_likes.contains(post_id) {
            return Ok(None);
        }
        let post = self
            .get_mut(post_id)
            .ok_or_else(|| SyncError::NotFound(format!("post {} is not in this feed", post_id)))?;
        let ticket = likes::begin(post, viewer, action);
        if ticket.is_some() {
            self.pending_likes.insert(post_id.clone());
        }
        Ok(ticket)
    }

    /// Settle a like ticket with the server's answer. False if the post has left the feed.
    pub fn confirm_like(&mut self, ticket: &LikeTicket, server_like: Option<Like>) -> bool {
        self.pending_likes.remove(&ticket.post_id);
        match self.get_mut(&ticket.post_id) {
            Some(post) => {
                likes::confirm(post, ticket, server_like);
                true
            }
            None => false,
        }
    }

    /// Undo a failed like change. False if the post has left the feed.
    pub fn revert_like(&mut self, ticket: &LikeTicket) -> bool {
        self.pending_likes.remove(&ticket.post_id);
        match self.get_mut(&ticket.post_id) {
            Some(post) => {
                likes::revert(post, ticket);
                true
            }
            None => false,
        }
    }

    /// Record a confirmed comment at the head of the post's comments
    pub fn add_comment(&mut self, post_id: &PostId, comment: Comment) -> bool {
        match self.get_mut(post_id) {
            Some(post) => {
                if post.comments.iter().any(|c| c.id == comment.id) {
                    return false;
                }
                post.comments.insert(0, comment);
                true
            }
            None => false,
        }
    }

    pub fn remove_comment(&mut self, post_id: &PostId, comment_id: &CommentId) -> bool {
        match self.get_mut(post_id) {
            Some(post) => {
                let before = post.comments.len();
                post.comments.retain(|c| &c.id != comment_id);
                post.comments.len() != before
            }
            None => false,
        }
    }
}
