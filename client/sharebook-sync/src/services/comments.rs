use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::SessionHandle;
use crate::error::{SyncError, SyncResult};
use crate::models::{
    Comment, CommentDraft, CommentId, NotificationDraft, NotificationPayload, PostId, UserId,
};
use crate::store::{NotificationStore, PostStore};

/// Comment writes plus the owner notification that goes with them
#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostStore>,
    notifications: Arc<dyn NotificationStore>,
    session: SessionHandle,
}

impl CommentService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        notifications: Arc<dyn NotificationStore>,
        session: SessionHandle,
    ) -> Self {
        Self {
            posts,
            notifications,
            session,
        }
    }

    /// Comment on a post as the signed-in user
    ///
    /// The post owner is notified unless they wrote the comment. A failed
    /// notification is logged and does not fail the comment.
    pub async fn comment(&self, post_id: &PostId, post_owner: UserId, text: &str) -> SyncResult<Comment> {
        let user_id = self.session.require_user()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidInput("comment text is empty".to_string()));
        }

        let draft = CommentDraft {
            user_id,
            post_id: post_id.clone(),
            text: text.to_string(),
        };
        let comment = self.posts.insert_comment(&draft).await?;
        info!(post_id = %post_id, comment_id = %comment.id, "Comment added");

        if post_owner != user_id {
            if let Err(e) = self.notify_owner(user_id, post_owner, &comment).await {
                warn!(post_id = %post_id, error = %e, "Failed to notify post owner");
            }
        }
        Ok(comment)
    }

    async fn notify_owner(&self, sender: UserId, owner: UserId, comment: &Comment) -> SyncResult<()> {
        let payload = NotificationPayload {
            post_id: comment.post_id.clone(),
            comment_id: Some(comment.id.clone()),
        };
        let draft = NotificationDraft::commented(sender, owner, &payload)?;
        self.notifications.insert_notification(&draft).await?;
        Ok(())
    }

    pub async fn remove(&self, comment_id: &CommentId) -> SyncResult<()> {
        self.session.require_user()?;
        self.posts.delete_comment(comment_id).await?;
        info!(comment_id = %comment_id, "Comment removed");
        Ok(())
    }
}
