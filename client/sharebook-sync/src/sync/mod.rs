//! Feed synchronization and counter reconciliation

pub mod cursor;
pub mod details;
pub mod feed;
pub mod likes;
pub mod live;
pub mod notifications;
pub mod synchronizer;

pub use cursor::{EndOfDataPolicy, FeedCursor};
pub use details::PostDetails;
pub use feed::{FeedChange, FeedState, LoadOutcome, LoadStart, PageTicket};
pub use likes::{LikeAction, LikeTicket};
pub use live::{spawn_pump, LiveHandle};
pub use notifications::{NotificationCounter, NotificationInbox};
pub use synchronizer::{FeedOptions, FeedSynchronizer, LikeOutcome};
