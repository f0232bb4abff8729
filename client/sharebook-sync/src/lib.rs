//! ShareBook feed synchronization client
//!
//! Keeps a paged, live-updated post feed and the unseen-notification count in
//! step with the hosted backend.
//!
//! # Layout
//!
//! - [`store`]: table, storage and user collaborators plus their HTTP implementation
//! - [`realtime`]: live change feed over the realtime websocket
//! - [`sync`]: the feed reducer, optimistic like handling and notification counting
//! - [`services`]: post, comment and profile writes that span collaborators
//!
//! Operations return [`SyncResult`]. Callers rendering a UI convert each result
//! into an [`ApiResponse`] with [`Respond::respond`], which logs the failure and
//! keeps only a message and an [`ErrorKind`].
//!
//! # Example
//!
//! ```no_run
//! use sharebook_sync::{AppContext, Config, LoadOutcome};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let ctx = AppContext::new(Config::from_env()?)?;
//! ctx.auth.sign_in_with_password("me@example.com", "secret").await?;
//!
//! let feed = ctx.feed(None);
//! while let LoadOutcome::Loaded { end_of_data: false, .. } = feed.load_next_page().await? {}
//! println!("{} posts", feed.len().await);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod models;
pub mod realtime;
pub mod services;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use auth::{AuthClient, AutoRefresh, Session, SessionHandle, SessionRefresher};
pub use config::Config;
pub use context::AppContext;
pub use error::{tasks, ApiResponse, ErrorKind, Respond, SyncError, SyncResult};
pub use realtime::{ChangeEvent, ChangeFeed, RealtimeClient, Subscription, SubscriptionScope};
pub use store::{MediaStore, NotificationStore, PageRequest, PostStore, RestClient, UserStore};
pub use sync::{
    EndOfDataPolicy, FeedChange, FeedOptions, FeedState, FeedSynchronizer, LikeOutcome,
    LiveHandle, LoadOutcome, NotificationCounter, NotificationInbox, PostDetails,
};
