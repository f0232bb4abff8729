//! Integration Tests: Optimistic Likes
//!
//! Coverage:
//! - Repeated likes never produce a second like record for the viewer
//! - Failed likes and unlikes restore the previous state
//! - Toggling from the feed and from the single-post view
//! - Likes still in flight across a reload or an owner switch

mod common;

use std::sync::Arc;

use common::{eventually, post, session_for, user_id, MockBackend};
use sharebook_sync::models::{Like, LikeId, PostId};
use sharebook_sync::services::CommentService;
use sharebook_sync::{
    EndOfDataPolicy, ErrorKind, FeedOptions, FeedSynchronizer, LikeOutcome, PostDetails,
    SessionHandle,
};

const VIEWER: u128 = 1;

async fn loaded_feed(backend: &MockBackend) -> FeedSynchronizer {
    let feed = FeedSynchronizer::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        session_for(user_id(VIEWER)),
        FeedOptions::global(5, EndOfDataPolicy::ShortPage),
    );
    feed.load_next_page().await.unwrap();
    feed
}

fn details_view(backend: &MockBackend) -> PostDetails {
    let session = session_for(user_id(VIEWER));
    let comments = CommentService::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        session.clone(),
    );
    PostDetails::new(Arc::new(backend.clone()), comments, session)
}

fn viewer_likes(post: &sharebook_sync::models::Post) -> usize {
    post.post_likes
        .iter()
        .filter(|l| l.user_id == user_id(VIEWER))
        .count()
}

fn liked_post(id: i64) -> sharebook_sync::models::Post {
    let mut liked = post(id, user_id(2));
    liked.post_likes.push(Like {
        id: LikeId::from(500),
        user_id: user_id(VIEWER),
        post_id: Some(PostId::from(id)),
        created_at: None,
    });
    liked.post_likes.push(Like {
        id: LikeId::from(501),
        user_id: user_id(3),
        post_id: Some(PostId::from(id)),
        created_at: None,
    });
    liked
}

#[tokio::test]
async fn test_like_twice_keeps_one_record() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let feed = loaded_feed(&backend).await;
    let id = PostId::from(1);

    assert_eq!(
        feed.like(&id).await.unwrap(),
        LikeOutcome::Confirmed { liked: true }
    );
    assert_eq!(feed.like(&id).await.unwrap(), LikeOutcome::Unchanged);

    let local = feed.post(&id).await.unwrap();
    assert!(local.is_like_owner);
    assert_eq!(viewer_likes(&local), 1);
    assert_eq!(backend.likes_of(&id).len(), 1);
    assert_eq!(backend.calls("insert_like"), 1);
}

#[tokio::test]
async fn test_concurrent_likes_keep_one_record() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let feed = loaded_feed(&backend).await;
    let id = PostId::from(1);

    let (first, second) = tokio::join!(feed.like(&id), feed.like(&id));
    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == LikeOutcome::Confirmed { liked: true })
            .count(),
        1
    );

    let local = feed.post(&id).await.unwrap();
    assert_eq!(viewer_likes(&local), 1);
    assert_eq!(backend.calls("insert_like"), 1);
}

#[tokio::test]
async fn test_failed_like_reverts() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let feed = loaded_feed(&backend).await;
    let id = PostId::from(1);

    backend.fail_next("insert_like", 1);
    let err = feed.like(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Retryable);

    let local = feed.post(&id).await.unwrap();
    assert!(!local.is_like_owner);
    assert!(local.post_likes.is_empty());

    // Nothing left pending, so a retry goes through
    assert_eq!(
        feed.like(&id).await.unwrap(),
        LikeOutcome::Confirmed { liked: true }
    );
}

#[tokio::test]
async fn test_failed_unlike_restores_record() {
    let backend = MockBackend::with_posts(vec![liked_post(1)]);
    let feed = loaded_feed(&backend).await;
    let id = PostId::from(1);
    assert!(feed.post(&id).await.unwrap().is_like_owner);

    backend.fail_next("delete_like", 1);
    assert!(feed.unlike(&id).await.is_err());

    let local = feed.post(&id).await.unwrap();
    assert!(local.is_like_owner);
    assert_eq!(local.post_likes.len(), 2);
    assert_eq!(viewer_likes(&local), 1);
}

#[tokio::test]
async fn test_toggle_round_trip() {
    let backend = MockBackend::with_posts(vec![liked_post(1)]);
    let feed = loaded_feed(&backend).await;
    let id = PostId::from(1);

    assert_eq!(
        feed.toggle_like(&id).await.unwrap(),
        LikeOutcome::Confirmed { liked: false }
    );
    let local = feed.post(&id).await.unwrap();
    assert!(!local.is_like_owner);
    assert_eq!(viewer_likes(&local), 0);
    assert_eq!(local.post_likes.len(), 1);
    assert_eq!(backend.likes_of(&id).len(), 1);

    assert_eq!(
        feed.toggle_like(&id).await.unwrap(),
        LikeOutcome::Confirmed { liked: true }
    );
    let local = feed.post(&id).await.unwrap();
    assert!(local.is_like_owner);
    assert_eq!(viewer_likes(&local), 1);
    assert_eq!(backend.likes_of(&id).len(), 2);
}

#[tokio::test]
async fn test_like_unknown_post_is_not_found() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let feed = loaded_feed(&backend).await;

    let err = feed.like(&PostId::from(77)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(backend.calls("insert_like"), 0);
}

#[tokio::test]
async fn test_like_requires_session() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let feed = FeedSynchronizer::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        SessionHandle::new(),
        FeedOptions::global(5, EndOfDataPolicy::ShortPage),
    );
    feed.load_next_page().await.unwrap();

    let err = feed.like(&PostId::from(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert_eq!(backend.calls("insert_like"), 0);
}

#[tokio::test]
async fn test_details_toggle_and_revert() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let details = details_view(&backend);
    let id = PostId::from(1);

    details.load(&id).await.unwrap();
    assert_eq!(
        details.toggle_like().await.unwrap(),
        LikeOutcome::Confirmed { liked: true }
    );
    let shown = details.post().await.unwrap();
    assert!(shown.is_like_owner);
    assert_eq!(viewer_likes(&shown), 1);

    backend.fail_next("delete_like", 1);
    assert!(details.toggle_like().await.is_err());
    let shown = details.post().await.unwrap();
    assert!(shown.is_like_owner);
    assert_eq!(viewer_likes(&shown), 1);
}

#[tokio::test]
async fn test_details_reload_keeps_like_in_flight() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let details = details_view(&backend);
    let id = PostId::from(1);
    details.load(&id).await.unwrap();

    backend.hold("insert_like");
    let first = tokio::spawn({
        let details = details.clone();
        async move { details.toggle_like().await }
    });
    let held = &backend;
    assert!(eventually(|| async move { held.calls("insert_like") == 1 }).await);

    // The reload lands before the like is stored
    let reloaded = details.load(&id).await.unwrap();
    assert!(!reloaded.is_like_owner);
    assert_eq!(details.toggle_like().await.unwrap(), LikeOutcome::Unchanged);

    backend.release("insert_like");
    assert_eq!(
        first.await.unwrap().unwrap(),
        LikeOutcome::Confirmed { liked: true }
    );
    assert_eq!(backend.calls("insert_like"), 1);
    assert_eq!(backend.likes_of(&id).len(), 1);

    let shown = details.post().await.unwrap();
    assert!(shown.is_like_owner);
    assert_eq!(viewer_likes(&shown), 1);
}

#[tokio::test]
async fn test_failed_like_after_reload_matches_records() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2))]);
    let details = details_view(&backend);
    let id = PostId::from(1);
    details.load(&id).await.unwrap();

    backend.hold("insert_like");
    let first = tokio::spawn({
        let details = details.clone();
        async move { details.toggle_like().await }
    });
    let held = &backend;
    assert!(eventually(|| async move { held.calls("insert_like") == 1 }).await);

    // Another session of the same viewer likes the post meanwhile
    backend.store_like(Like {
        id: LikeId::from(900),
        user_id: user_id(VIEWER),
        post_id: Some(id.clone()),
        created_at: None,
    });
    assert!(details.load(&id).await.unwrap().is_like_owner);

    backend.release("insert_like");
    let err = first.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);

    let shown = details.post().await.unwrap();
    assert!(shown.is_like_owner);
    assert_eq!(viewer_likes(&shown), 1);
    assert_eq!(backend.likes_of(&id).len(), 1);
}

#[tokio::test]
async fn test_switch_owner_keeps_like_in_flight() {
    let backend = MockBackend::with_posts(vec![post(1, user_id(2)), post(2, user_id(3))]);
    let feed = loaded_feed(&backend).await;
    let id = PostId::from(1);

    backend.hold("insert_like");
    let first = tokio::spawn({
        let feed = feed.clone();
        let id = id.clone();
        async move { feed.like(&id).await }
    });
    let held = &backend;
    assert!(eventually(|| async move { held.calls("insert_like") == 1 }).await);

    feed.switch_owner(Some(user_id(2))).await;
    feed.load_next_page().await.unwrap();
    assert!(!feed.post(&id).await.unwrap().is_like_owner);
    assert_eq!(feed.like(&id).await.unwrap(), LikeOutcome::Unchanged);

    backend.release("insert_like");
    assert_eq!(
        first.await.unwrap().unwrap(),
        LikeOutcome::Confirmed { liked: true }
    );
    assert_eq!(backend.calls("insert_like"), 1);

    let local = feed.post(&id).await.unwrap();
    assert!(local.is_like_owner);
    assert_eq!(viewer_likes(&local), 1);
    assert_eq!(backend.likes_of(&id).len(), 1);
}
