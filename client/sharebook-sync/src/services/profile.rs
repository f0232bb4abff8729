use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::auth::SessionHandle;
use crate::error::{SyncError, SyncResult};
use crate::models::media::{storage_path, PROFILE_FOLDER};
use crate::models::{MediaKind, User, UserId};
use crate::store::{MediaStore, UserStore};

#[derive(Clone)]
pub struct ProfileService {
    users: Arc<dyn UserStore>,
    media: Arc<dyn MediaStore>,
    session: SessionHandle,
}

impl ProfileService {
    pub fn new(users: Arc<dyn UserStore>, media: Arc<dyn MediaStore>, session: SessionHandle) -> Self {
        Self {
            users,
            media,
            session,
        }
    }

    pub async fn load(&self, user_id: UserId) -> SyncResult<User> {
        self.users.fetch_user(user_id).await
    }

    /// Profile of the signed-in user
    pub async fn me(&self) -> SyncResult<User> {
        let user_id = self.session.require_user()?;
        self.users.fetch_user(user_id).await
    }

    /// Save the signed-in user's profile, uploading a new avatar first when given
    pub async fn update(&self, mut user: User, avatar: Option<Vec<u8>>) -> SyncResult<User> {
        let user_id = self.session.require_user()?;
        if user.id != user_id {
            return Err(SyncError::InvalidInput(
                "only your own profile can be edited".to_string(),
            ));
        }

        if let Some(bytes) = avatar {
            let path = storage_path(PROFILE_FOLDER, MediaKind::Image, Utc::now().timestamp_millis());
            user.image = Some(self.media.upload(&path, bytes, MediaKind::Image).await?);
        }

        let saved = self.users.update_user(&user).await?;
        info!(user_id = %saved.id, "Profile updated");
        Ok(saved)
    }

    pub fn image_url(&self, path: &str) -> String {
        self.media.public_url(path)
    }
}
