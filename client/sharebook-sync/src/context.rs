use std::sync::Arc;

use crate::auth::{spawn_auto_refresh, AuthClient, AutoRefresh, SessionHandle};
use crate::config::Config;
use crate::error::SyncResult;
use crate::models::UserId;
use crate::realtime::{ChangeFeed, RealtimeClient, Subscription, SubscriptionScope};
use crate::services::{CommentService, PostService, ProfileService};
use crate::store::RestClient;
use crate::sync::{FeedOptions, FeedSynchronizer, NotificationInbox, PostDetails};

/// Shared clients for one signed-in user, and factories for the views built on them
pub struct AppContext {
    pub config: Config,
    pub session: SessionHandle,
    pub auth: Arc<AuthClient>,
    pub rest: Arc<RestClient>,
    pub realtime: RealtimeClient,
}

impl AppContext {
    pub fn new(config: Config) -> SyncResult<Self> {
        let session = SessionHandle::new();
        let auth = Arc::new(AuthClient::new(&config.backend, session.clone())?);
        let rest = Arc::new(RestClient::new(&config.backend, session.clone())?);
        let realtime = RealtimeClient::new(&config, session.clone())?;
        Ok(Self {
            config,
            session,
            auth,
            rest,
            realtime,
        })
    }

    /// Keep the session's access token fresh until the handle is dropped
    pub fn start_session_refresh(&self) -> AutoRefresh {
        spawn_auto_refresh(
            self.auth.clone(),
            self.session.clone(),
            self.config.auth.refresh_check_interval(),
            self.config.auth.refresh_margin(),
        )
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions::global(self.config.feed.page_size, self.config.feed.end_of_data)
    }

    /// Global feed, or one user's posts when `owner` is set
    pub fn feed(&self, owner: Option<UserId>) -> FeedSynchronizer {
        let mut options = self.feed_options();
        options.owner = owner;
        FeedSynchronizer::new(self.rest.clone(), self.rest.clone(), self.session.clone(), options)
    }

    pub fn comments(&self) -> CommentService {
        CommentService::new(self.rest.clone(), self.rest.clone(), self.session.clone())
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.rest.clone(), self.rest.clone(), self.session.clone())
    }

    pub fn profiles(&self) -> ProfileService {
        ProfileService::new(self.rest.clone(), self.rest.clone(), self.session.clone())
    }

    pub fn details(&self) -> PostDetails {
        PostDetails::new(self.rest.clone(), self.comments(), self.session.clone())
    }

    /// Inbox for the signed-in user
    pub fn inbox(&self) -> SyncResult<NotificationInbox> {
        NotificationInbox::new(self.rest.clone(), &self.session)
    }

    pub async fn subscribe(&self, scope: SubscriptionScope) -> SyncResult<Subscription> {
        self.realtime.subscribe(scope).await
    }
}
