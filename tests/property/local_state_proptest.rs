//! Property-based tests for optimistic apply and rollback

use chrono::{TimeZone, Utc};
use community_sync::client::offline::{Action, LocalState};
use community_sync::shared::models::{Like, Post};
use proptest::prelude::*;

const USER: &str = "u1";

fn post(n: usize, liked: bool) -> Post {
    let mut post: Post = serde_json::from_value(serde_json::json!({
        "id": format!("p{}", n),
        "authorId": "u2",
        "content": format!("post {}", n),
        "createdAt": "2024-05-01T09:00:00Z"
    }))
    .unwrap();
    if liked {
        post.likes.push(Like {
            user_id: USER.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single(),
        });
        post.likes_count = 1;
        post.is_liked = true;
    }
    post
}

/// What the member sees of a post's likes
fn like_view(state: &LocalState) -> Vec<(String, bool, i64)> {
    state
        .posts()
        .iter()
        .map(|p| (p.id.clone(), p.liked_by(USER), p.likes_count))
        .collect()
}

proptest! {
    #[test]
    fn test_rollback_in_reverse_restores_likes(
        liked in prop::collection::vec(any::<bool>(), 1..6),
        targets in prop::collection::vec(0usize..6, 0..30),
    ) {
        let mut state = LocalState::new(Some(USER.to_string()));
        let posts: Vec<Post> = liked.iter().enumerate().map(|(n, l)| post(n, *l)).collect();
        state.rebase_posts(posts, &[]);
        let before = like_view(&state);

        // Each click flips what the member currently sees, as the dashboard does
        let mut actions = Vec::new();
        for n in targets.iter().filter(|n| **n < liked.len()) {
            let post_id = format!("p{}", n);
            let wants_like = !state.post(&post_id).is_some_and(|p| p.is_liked);
            let action = Action::LikePost { post_id, liked: wants_like };
            prop_assert!(state.apply(&action));
            actions.push(action);
        }
        for action in actions.iter().rev() {
            state.rollback(action);
        }

        prop_assert_eq!(like_view(&state), before);
    }
}
