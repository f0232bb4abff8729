//! PostgREST tables and object storage over HTTP
//!
//! Reads retry transient failures; writes do not, because a lost response may
//! still have committed the row.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use resilience::{
    rest_read_config, rest_write_config, storage_config, with_retry_if, with_timeout_or,
    RetryConfig, ServiceConfig,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{MediaStore, NotificationStore, PageRequest, PostStore, UserStore};
use crate::auth::SessionHandle;
use crate::config::BackendConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::{
    public_url, Comment, CommentDraft, CommentId, Like, LikeDraft, MediaKind, Notification,
    NotificationDraft, NotificationId, Post, PostId, PostRecord, PostUpsert, User, UserId,
};

const POST_FEED_SELECT: &str =
    "*,user:users(id,name,image),postLikes(id,userId),comments(*,user:users(id,name,image))";
const POST_DETAIL_SELECT: &str =
    "*,user:users(id,name,image,expoPushToken),postLikes(*),comments(*,user:users(id,name,image))";
const COMMENT_SELECT: &str = "*,user:users(id,name,image)";
const NOTIFICATION_SELECT: &str = "*,sender:senderId(id,name,image)";

/// Accept header asking PostgREST for a single object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// HTTP implementation of every store trait
pub struct RestClient {
    http: Client,
    base_url: String,
    anon_key: String,
    bucket: String,
    session: SessionHandle,
    read_policy: ServiceConfig,
    write_policy: ServiceConfig,
    storage_policy: ServiceConfig,
}

impl RestClient {
    pub fn new(config: &BackendConfig, session: SessionHandle) -> SyncResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut read_policy = rest_read_config();
        read_policy.timeout.duration = config.http_timeout();
        read_policy.retry = Some(RetryConfig {
            max_retries: config.http_max_retries,
            ..read_policy.retry.unwrap_or_default()
        });
        let mut write_policy = rest_write_config();
        write_policy.timeout.duration = config.http_timeout();

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            bucket: config.storage_bucket.clone(),
            session,
            read_policy,
            write_policy,
            storage_policy: storage_config(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    /// Request carrying the anon key and, when signed in, the user's token
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = self
            .session
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    /// Idempotent call: per-attempt timeout, retried while the error is transient
    async fn read<T, F>(&self, build: F) -> SyncResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let timeout = self.read_policy.timeout.duration;
        let retry = self.read_policy.retry.clone().unwrap_or_else(RetryConfig::none);
        with_retry_if(retry, SyncError::is_retryable, || {
            with_timeout_or(timeout, fetch_json(build()), elapsed)
        })
        .await
    }

    async fn write<T: DeserializeOwned>(&self, builder: RequestBuilder) -> SyncResult<T> {
        with_timeout_or(self.write_policy.timeout.duration, fetch_json(builder), elapsed).await
    }

    async fn execute(&self, builder: RequestBuilder) -> SyncResult<()> {
        with_timeout_or(
            self.write_policy.timeout.duration,
            async {
                check_status(builder.send().await?).await?;
                Ok(())
            },
            elapsed,
        )
        .await
    }

    /// Insert (or merge on primary key) a row and return it
    async fn upsert_row<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        select: &str,
        body: &B,
    ) -> SyncResult<T> {
        let builder = self
            .request(Method::POST, &self.table_url(table))
            .query(&[("select", select)])
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(body);
        self.write(builder).await
    }

    async fn insert_row<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        select: &str,
        body: &B,
    ) -> SyncResult<T> {
        let builder = self
            .request(Method::POST, &self.table_url(table))
            .query(&[("select", select)])
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(body);
        self.write(builder).await
    }
}

fn elapsed(duration: Duration) -> SyncError {
    SyncError::Transport(format!("request timed out after {:?}", duration))
}

fn eq<T: std::fmt::Display>(value: T) -> String {
    format!("eq.{}", value)
}

async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(SyncError::from_status(status.as_u16(), body))
}

async fn fetch_json<T: DeserializeOwned>(builder: RequestBuilder) -> SyncResult<T> {
    let response = check_status(builder.send().await?).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl PostStore for RestClient {
    #[instrument(skip(self), fields(page = request.page, owner = ?request.owner))]
    async fn fetch_posts(&self, request: &PageRequest) -> SyncResult<Vec<Post>> {
        let url = self.table_url("posts");
        let offset = request.offset().to_string();
        let limit = request.page_size.to_string();
        let owner = request.owner.map(eq);
        let posts: Vec<Post> = self
            .read(|| {
                let mut builder = self.request(Method::GET, &url).query(&[
                    ("select", POST_FEED_SELECT),
                    ("order", "created_at.desc"),
                    ("offset", offset.as_str()),
                    ("limit", limit.as_str()),
                ]);
                if let Some(owner) = &owner {
                    builder = builder.query(&[("userId", owner.as_str())]);
                }
                builder
            })
            .await?;
        debug!(count = posts.len(), "Fetched posts page");
        Ok(posts)
    }

    #[instrument(skip(self))]
    async fn fetch_post(&self, post_id: &PostId) -> SyncResult<Post> {
        let url = self.table_url("posts");
        let id = eq(post_id);
        self.read(|| {
            self.request(Method::GET, &url)
                .query(&[
                    ("select", POST_DETAIL_SELECT),
                    ("id", id.as_str()),
                    ("comments.order", "created_at.desc"),
                ])
                .header(header::ACCEPT, SINGLE_OBJECT)
        })
        .await
    }

    async fn upsert_post(&self, post: &PostUpsert) -> SyncResult<PostRecord> {
        self.upsert_row("posts", "*", post).await
    }

    async fn delete_post(&self, post_id: &PostId) -> SyncResult<()> {
        let builder = self
            .request(Method::DELETE, &self.table_url("posts"))
            .query(&[("id", eq(post_id))]);
        self.execute(builder).await
    }

    async fn insert_like(&self, user_id: UserId, post_id: &PostId) -> SyncResult<Like> {
        let draft = LikeDraft {
            user_id,
            post_id: post_id.clone(),
        };
        self.insert_row("postLikes", "*", &draft).await
    }

    async fn delete_like(&self, user_id: UserId, post_id: &PostId) -> SyncResult<()> {
        let builder = self
            .request(Method::DELETE, &self.table_url("postLikes"))
            .query(&[("userId", eq(user_id)), ("postId", eq(post_id))]);
        self.execute(builder).await
    }

    async fn insert_comment(&self, comment: &CommentDraft) -> SyncResult<Comment> {
        self.insert_row("comments", COMMENT_SELECT, comment).await
    }

    async fn delete_comment(&self, comment_id: &CommentId) -> SyncResult<()> {
        let builder = self
            .request(Method::DELETE, &self.table_url("comments"))
            .query(&[("id", eq(comment_id))]);
        self.execute(builder).await
    }
}

#[async_trait]
impl UserStore for RestClient {
    async fn fetch_user(&self, user_id: UserId) -> SyncResult<User> {
        let url = self.table_url("users");
        let id = eq(user_id);
        self.read(|| {
            self.request(Method::GET, &url)
                .query(&[("select", "*"), ("id", id.as_str())])
                .header(header::ACCEPT, SINGLE_OBJECT)
        })
        .await
    }

    async fn update_user(&self, user: &User) -> SyncResult<User> {
        let builder = self
            .request(Method::PATCH, &self.table_url("users"))
            .query(&[("id", eq(user.id)), ("select", "*".to_string())])
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(user);
        self.write(builder).await
    }
}

#[async_trait]
impl NotificationStore for RestClient {
    async fn fetch_notifications(
        &self,
        receiver: UserId,
        unseen_only: bool,
    ) -> SyncResult<Vec<Notification>> {
        let url = self.table_url("notifications");
        let receiver = eq(receiver);
        self.read(|| {
            let mut builder = self.request(Method::GET, &url).query(&[
                ("select", NOTIFICATION_SELECT),
                ("receiverId", receiver.as_str()),
                ("order", "created_at.desc"),
            ]);
            if unseen_only {
                builder = builder.query(&[("seen", "eq.false")]);
            }
            builder
        })
        .await
    }

    async fn insert_notification(&self, draft: &NotificationDraft) -> SyncResult<Notification> {
        self.insert_row("notifications", "*", draft).await
    }

    async fn mark_seen(&self, notification: &Notification) -> SyncResult<Notification> {
        let body = serde_json::json!({
            "id": notification.id,
            "senderId": notification.sender_id,
            "receiverId": notification.receiver_id,
            "title": notification.title,
            "data": notification.data,
            "seen": true,
        });
        self.upsert_row("notifications", "*", &body).await
    }

    async fn delete_notification(&self, notification_id: &NotificationId) -> SyncResult<()> {
        let builder = self
            .request(Method::DELETE, &self.table_url("notifications"))
            .query(&[("id", eq(notification_id))]);
        self.execute(builder).await
    }
}

#[derive(serde::Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
}

#[async_trait]
impl MediaStore for RestClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, path: &str, bytes: Vec<u8>, kind: MediaKind) -> SyncResult<String> {
        let builder = self
            .request(Method::POST, &self.object_url(path))
            .header(header::CONTENT_TYPE, kind.content_type())
            .header(header::CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);
        let response: UploadResponse = with_timeout_or(
            self.storage_policy.timeout.duration,
            fetch_json(builder),
            elapsed,
        )
        .await?;
        debug!(key = ?response.key, "Uploaded media");
        Ok(path.trim_start_matches('/').to_string())
    }

    async fn download(&self, path: &str) -> SyncResult<Vec<u8>> {
        let builder = self.request(Method::GET, &self.object_url(path));
        with_timeout_or(
            self.storage_policy.timeout.duration,
            async {
                let response = check_status(builder.send().await?).await?;
                Ok(response.bytes().await?.to_vec())
            },
            elapsed,
        )
        .await
    }

    fn public_url(&self, path: &str) -> String {
        public_url(&self.base_url, &self.bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn client() -> RestClient {
        let config = Config::local("https://demo.supabase.co/", "anon");
        RestClient::new(&config.backend, SessionHandle::new()).unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.table_url("posts"),
            "https://demo.supabase.co/rest/v1/posts"
        );
        assert_eq!(
            client.object_url("/postImages/1.png"),
            "https://demo.supabase.co/storage/v1/object/uploads/postImages/1.png"
        );
        assert_eq!(
            MediaStore::public_url(&client, "postImages/1.png"),
            "https://demo.supabase.co/storage/v1/object/public/uploads/postImages/1.png"
        );
    }

    #[test]
    fn test_anonymous_requests_use_anon_key() {
        let client = client();
        let request = client
            .request(Method::GET, &client.table_url("posts"))
            .build()
            .unwrap();
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()[header::AUTHORIZATION], "Bearer anon");
    }

    #[test]
    fn test_read_policy_follows_config() {
        let client = client();
        assert_eq!(client.read_policy.timeout.duration, Duration::from_secs(15));
        assert_eq!(client.read_policy.retry.as_ref().unwrap().max_retries, 2);
        assert!(client.write_policy.retry.is_none());
    }
}
