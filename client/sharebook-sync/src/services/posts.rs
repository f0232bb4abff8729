use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::auth::SessionHandle;
use crate::error::{SyncError, SyncResult};
use crate::models::{post_media_path, MediaSource, PostDraft, PostId, PostRecord, PostUpsert};
use crate::store::{MediaStore, PostStore};

/// Post writes, including the media upload that precedes them
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    media: Arc<dyn MediaStore>,
    session: SessionHandle,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>, media: Arc<dyn MediaStore>, session: SessionHandle) -> Self {
        Self {
            posts,
            media,
            session,
        }
    }

    /// Create (no id) or update (with id) a post
    ///
    /// Local media is uploaded first; if the upload fails nothing is written.
    pub async fn create_or_update(&self, draft: PostDraft) -> SyncResult<PostRecord> {
        let user_id = self.session.require_user()?;
        if draft.user_id != user_id {
            return Err(SyncError::InvalidInput(
                "posts can only be written by their author".to_string(),
            ));
        }
        if draft.body.trim().is_empty() && draft.media == MediaSource::None {
            return Err(SyncError::InvalidInput(
                "post needs a body or media".to_string(),
            ));
        }

        let file = match draft.media {
            MediaSource::None => None,
            MediaSource::Stored(path) => Some(path),
            MediaSource::Local { bytes, kind } => {
                let path = post_media_path(kind, Utc::now().timestamp_millis());
                debug!(path = %path, size = bytes.len(), "Uploading post media");
                Some(self.media.upload(&path, bytes, kind).await?)
            }
        };

        let upsert = PostUpsert {
            id: draft.id,
            user_id,
            body: draft.body,
            file,
        };
        let record = self.posts.upsert_post(&upsert).await?;
        info!(post_id = %record.id, updated = upsert.id.is_some(), "Post saved");
        Ok(record)
    }

    pub async fn remove(&self, post_id: &PostId) -> SyncResult<()> {
        self.session.require_user()?;
        self.posts.delete_post(post_id).await?;
        info!(post_id = %post_id, "Post removed");
        Ok(())
    }

    /// Public URL for a post's stored media
    pub fn media_url(&self, path: &str) -> String {
        self.media.public_url(path)
    }
}
