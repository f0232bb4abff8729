//! Optimistic like/unlike against a single post
//!
//! [`begin`] flips the viewer's flag immediately and hands back a ticket.
//! The ticket is later settled with [`confirm`] when the backend call succeeds
//! or [`revert`] when it fails. `begin` refuses to act when the post is already
//! in the requested state, which is what keeps repeated likes from producing
//! duplicate like records.

use serde::{Deserialize, Serialize};

use crate::models::{Like, Post, PostId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeAction::Like => "like",
            LikeAction::Unlike => "unlike",
        }
    }
}

/// Pending optimistic like change
#[derive(Debug, Clone, PartialEq)]
pub struct LikeTicket {
    pub post_id: PostId,
    pub user_id: UserId,
    pub action: LikeAction,
    /// The viewer's like records removed by an unlike
    removed: Vec<Like>,
}

/// Apply the optimistic half of a like change
pub fn begin(post: &mut Post, user_id: UserId, action: LikeAction) -> Option<LikeTicket> {
    let has_record = post.post_likes.iter().any(|l| l.user_id == user_id);
    let already = match action {
        LikeAction::Like => post.is_like_owner || has_record,
        LikeAction::Unlike => !post.is_like_owner && !has_record,
    };
    if already {
        return None;
    }

    let mut removed = Vec::new();
    match action {
        LikeAction::Like => post.is_like_owner = true,
        LikeAction::Unlike => {
            post.is_like_owner = false;
            let (mine, others): (Vec<_>, Vec<_>) = post
                .post_likes
                .drain(..)
                .partition(|l| l.user_id == user_id);
            post.post_likes = others;
            removed = mine;
        }
    }

    Some(LikeTicket {
        post_id: post.id.clone(),
        user_id,
        action,
        removed,
    })
}

/// Settle a ticket with the backend's answer
///
/// A confirmed like records the server's like exactly once; a confirmed unlike
/// leaves no record for the viewer.
pub fn confirm(post: &mut Post, ticket: &LikeTicket, server_like: Option<Like>) {
    post.post_likes.retain(|l| l.user_id != ticket.user_id);
    match ticket.action {
        LikeAction::Like => {
            if let Some(mut like) = server_like {
                like.user_id = ticket.user_id;
                post.post_likes.push(like);
            }
            post.is_like_owner = true;
        }
        LikeAction::Unlike => post.is_like_owner = false,
    }
}

/// Undo the optimistic half of a failed change
///
/// The flag is recomputed from the records the post holds now, which may have
/// been reloaded since the ticket was taken.
pub fn revert(post: &mut Post, ticket: &LikeTicket) {
    if ticket.action == LikeAction::Unlike {
        for like in &ticket.removed {
            if !post.post_likes.iter().any(|l| l.id == like.id) {
                post.post_likes.push(like.clone());
            }
        }
    }
    post.is_like_owner = post.post_likes.iter().any(|l| l.user_id == ticket.user_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LikeId, PostRecord};
    use chrono::Utc;
    use uuid::Uuid;

    fn viewer() -> UserId {
        Uuid::from_u128(2)
    }

    fn post() -> Post {
        Post::from(PostRecord {
            id: PostId::from(1),
            user_id: Uuid::from_u128(1),
            created_at: Utc::now(),
            body: "hello".into(),
            file: None,
        })
    }

    fn like(id: i64, user_id: UserId) -> Like {
        Like {
            id: LikeId::from(id),
            user_id,
            post_id: Some(PostId::from(1)),
            created_at: None,
        }
    }

    #[test]
    fn test_like_then_confirm_adds_single_record() {
        let mut post = post();
        let ticket = begin(&mut post, viewer(), LikeAction::Like).unwrap();
        assert!(post.is_like_owner);
        assert_eq!(post.like_count(), 0);

        confirm(&mut post, &ticket, Some(like(10, viewer())));
        assert!(post.is_like_owner);
        assert_eq!(post.like_count(), 1);
    }

    #[test]
    fn test_second_like_is_refused() {
        let mut post = post();
        let ticket = begin(&mut post, viewer(), LikeAction::Like).unwrap();
        assert!(begin(&mut post, viewer(), LikeAction::Like).is_none());

        confirm(&mut post, &ticket, Some(like(10, viewer())));
        assert!(begin(&mut post, viewer(), LikeAction::Like).is_none());
        assert_eq!(post.like_count(), 1);
    }

    #[test]
    fn test_failed_like_reverts() {
        let mut post = post();
        let ticket = begin(&mut post, viewer(), LikeAction::Like).unwrap();
        revert(&mut post, &ticket);
        assert!(!post.is_like_owner);
        assert_eq!(post.like_count(), 0);
    }

    #[test]
    fn test_unlike_keeps_other_users_likes() {
        let mut post = post();
        post.post_likes = vec![like(10, viewer()), like(11, Uuid::from_u128(3))];
        post.recompute_like_owner(Some(viewer()));

        let ticket = begin(&mut post, viewer(), LikeAction::Unlike).unwrap();
        assert!(!post.is_like_owner);
        assert_eq!(post.like_count(), 1);

        confirm(&mut post, &ticket, None);
        assert_eq!(post.like_count(), 1);
        assert_eq!(post.post_likes[0].id, LikeId::from(11));
    }

    #[test]
    fn test_failed_unlike_restores_record() {
        let mut post = post();
        post.post_likes = vec![like(10, viewer())];
        post.recompute_like_owner(Some(viewer()));

        let ticket = begin(&mut post, viewer(), LikeAction::Unlike).unwrap();
        revert(&mut post, &ticket);
        assert!(post.is_like_owner);
        assert_eq!(post.post_likes, vec![like(10, viewer())]);
    }

    #[test]
    fn test_revert_follows_current_records() {
        let mut post = post();
        let ticket = begin(&mut post, viewer(), LikeAction::Like).unwrap();

        // The post was reloaded with the viewer's like already stored
        post.post_likes = vec![like(10, viewer())];
        revert(&mut post, &ticket);
        assert!(post.is_like_owner);
        assert_eq!(post.like_count(), 1);
    }

    #[test]
    fn test_unlike_without_like_is_noop() {
        let mut post = post();
        assert!(begin(&mut post, viewer(), LikeAction::Unlike).is_none());
    }
}
