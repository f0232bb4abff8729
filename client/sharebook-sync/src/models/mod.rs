use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod media;
pub(crate) mod wire;

pub use media::{post_media_path, public_url, strip_html_tags, MediaKind};

use crate::error::{SyncError, SyncResult};
use wire::{null_as_default, record_id, text_or_json, timestamp};

/// Auth user id, shared by the `users` table
pub type UserId = Uuid;

record_id!(
    /// Row id of a post
    PostId
);
record_id!(
    /// Row id of a post like
    LikeId
);
record_id!(
    /// Row id of a comment
    CommentId
);
record_id!(
    /// Row id of a notification
    NotificationId
);

/// Title the backend gives comment notifications
pub const COMMENTED_ON_POST: &str = "commented on your post";

/// Denormalized author fields embedded in posts, comments and notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Full `users` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub expo_push_token: Option<String>,
}

impl User {
    pub fn author(&self) -> Author {
        Author {
            id: self.id,
            name: self.name.clone(),
            image: self.image.clone(),
        }
    }
}

/// A like as embedded in a post (`postLikes(id, userId)`) or returned by an insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: LikeId,
    pub user_id: UserId,
    #[serde(default)]
    pub post_id: Option<PostId>,
    #[serde(
        rename = "created_at",
        default,
        deserialize_with = "timestamp::deserialize_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(rename = "created_at", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<Author>,
}

/// Raw `posts` row, as carried by live events and returned by upserts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub id: PostId,
    pub user_id: UserId,
    #[serde(rename = "created_at", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub file: Option<String>,
}

/// Post as shown in a feed: the row plus author, likes, comments and the viewer's like flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    #[serde(rename = "created_at", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub user: Option<Author>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub post_likes: Vec<Like>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
    /// Whether the viewing user has liked this post; computed client-side
    #[serde(default, skip_serializing)]
    pub is_like_owner: bool,
}

impl From<PostRecord> for Post {
    fn from(record: PostRecord) -> Self {
        Post {
            id: record.id,
            user_id: record.user_id,
            created_at: record.created_at,
            body: record.body,
            file: record.file,
            user: None,
            post_likes: Vec::new(),
            comments: Vec::new(),
            is_like_owner: false,
        }
    }
}

impl Post {
    pub fn with_author(mut self, author: Option<Author>) -> Self {
        self.user = author;
        self
    }

    /// Recompute the viewer's like flag from the like list
    pub fn recompute_like_owner(&mut self, viewer: Option<UserId>) {
        self.is_like_owner = viewer
            .map(|viewer| self.post_likes.iter().any(|like| like.user_id == viewer))
            .unwrap_or(false);
    }

    pub fn like_count(&self) -> usize {
        self.post_likes.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.file.as_deref().and_then(MediaKind::from_path)
    }

    /// Replace the row fields from a live update, keeping likes, comments and author
    pub fn apply_record(&mut self, record: PostRecord) {
        self.user_id = record.user_id;
        self.created_at = record.created_at;
        self.body = record.body;
        self.file = record.file;
    }

    /// Sort comments newest-first
    pub fn sort_comments(&mut self) {
        self.comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

/// Notification title classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTitle {
    CommentedOnPost,
    Other(String),
}

impl NotificationTitle {
    pub fn parse(title: &str) -> Self {
        if title == COMMENTED_ON_POST {
            NotificationTitle::CommentedOnPost
        } else {
            NotificationTitle::Other(title.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationTitle::CommentedOnPost => COMMENTED_ON_POST,
            NotificationTitle::Other(title) => title,
        }
    }
}

/// Document carried in a notification's `data` column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<CommentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "text_or_json")]
    pub data: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub seen: bool,
    #[serde(
        rename = "created_at",
        default,
        deserialize_with = "timestamp::deserialize_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub sender: Option<Author>,
}

impl Notification {
    pub fn title_kind(&self) -> NotificationTitle {
        NotificationTitle::parse(&self.title)
    }

    pub fn payload(&self) -> SyncResult<NotificationPayload> {
        serde_json::from_str(&self.data).map_err(SyncError::from)
    }
}

/// Where a post's media comes from
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MediaSource {
    #[default]
    None,
    /// Already in storage
    Stored(String),
    /// Local file contents still to be uploaded
    Local { bytes: Vec<u8>, kind: MediaKind },
}

/// Post to create (no id) or update (with id)
#[derive(Debug, Clone, PartialEq)]
pub struct PostDraft {
    pub id: Option<PostId>,
    pub user_id: UserId,
    pub body: String,
    pub media: MediaSource,
}

/// Body of a `posts` upsert
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpsert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<PostId>,
    pub user_id: UserId,
    pub body: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeDraft {
    pub user_id: UserId,
    pub post_id: PostId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDraft {
    pub user_id: UserId,
    pub post_id: PostId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub title: String,
    pub data: String,
}

impl NotificationDraft {
    /// Notification telling a post owner about a new comment
    pub fn commented(
        sender_id: UserId,
        receiver_id: UserId,
        payload: &NotificationPayload,
    ) -> SyncResult<Self> {
        Ok(Self {
            sender_id,
            receiver_id,
            title: COMMENTED_ON_POST.to_string(),
            data: serde_json::to_string(payload)?,
        })
    }
}
