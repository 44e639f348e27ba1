//! Property-based tests for the pure post-assembly merge.

use std::collections::HashSet;

use chrono::Utc;
use fursat_core::{assemble_posts, ANONYMOUS_USERNAME};
use fursat_core::types::{LikeRecord, PostRecord, ProfileRecord};
use proptest::prelude::*;

fn post(id: usize, author: usize) -> PostRecord {
    PostRecord {
        id: format!("p{}", id),
        user_id: format!("u{}", author),
        content: format!("post {}", id),
        image_url: None,
        circle_id: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn profile(author: usize) -> ProfileRecord {
    ProfileRecord {
        id: format!("u{}", author),
        email: format!("u{}@campus.edu", author),
        username: Some(format!("user{}", author)),
        full_name: None,
        bio: None,
        avatar_url: None,
        headline: None,
        location: None,
        website: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn like(n: usize, post_id: usize, user: usize) -> LikeRecord {
    LikeRecord {
        id: format!("l{}", n),
        user_id: format!("u{}", user),
        post_id: format!("p{}", post_id),
        created_at: Utc::now(),
    }
}

proptest! {
    /// Each post's like count equals the number of like rows carrying its
    /// id, for arbitrary like distributions.
    #[test]
    fn likes_count_matches_group_size(
        post_count in 1..8usize,
        like_targets in prop::collection::vec((0..8usize, 0..16usize), 0..64),
    ) {
        let posts: Vec<PostRecord> = (0..post_count).map(|i| post(i, i)).collect();
        let likes: Vec<LikeRecord> = like_targets
            .iter()
            .enumerate()
            .filter(|(_, (target, _))| *target < post_count)
            .map(|(n, (target, user))| like(n, *target, *user))
            .collect();

        let assembled = assemble_posts(
            posts.clone(),
            &[],
            &likes,
            &HashSet::new(),
            &HashSet::new(),
        );

        prop_assert_eq!(assembled.len(), posts.len());
        for view in &assembled {
            let expected = likes.iter().filter(|l| l.post_id == view.id).count() as u64;
            prop_assert_eq!(view.likes_count, expected);
        }
    }

    /// Viewer flags come only from the viewer sets, never from the like
    /// rows of other users.
    #[test]
    fn viewer_flags_follow_viewer_sets(
        liked in prop::collection::hash_set(0..6usize, 0..6),
        saved in prop::collection::hash_set(0..6usize, 0..6),
    ) {
        let posts: Vec<PostRecord> = (0..6).map(|i| post(i, 0)).collect();
        let viewer_likes: HashSet<String> = liked.iter().map(|i| format!("p{}", i)).collect();
        let viewer_saves: HashSet<String> = saved.iter().map(|i| format!("p{}", i)).collect();

        // Someone else's like rows everywhere.
        let likes: Vec<LikeRecord> = (0..6).map(|i| like(i, i, 99)).collect();

        let assembled = assemble_posts(posts, &[profile(0)], &likes, &viewer_likes, &viewer_saves);
        for view in &assembled {
            prop_assert_eq!(view.is_liked, viewer_likes.contains(&view.id));
            prop_assert_eq!(view.is_saved, viewer_saves.contains(&view.id));
            prop_assert_eq!(&view.author.username, "user0");
        }
    }

    /// Input order is preserved and unresolvable authors degrade to the
    /// anonymous placeholder instead of dropping the post.
    #[test]
    fn order_preserved_and_missing_author_is_anonymous(post_count in 0..8usize) {
        let posts: Vec<PostRecord> = (0..post_count).map(|i| post(i, i)).collect();
        // Only even-numbered authors have profiles.
        let profiles: Vec<ProfileRecord> =
            (0..post_count).filter(|i| i % 2 == 0).map(profile).collect();

        let assembled =
            assemble_posts(posts, &profiles, &[], &HashSet::new(), &HashSet::new());

        for (i, view) in assembled.iter().enumerate() {
            prop_assert_eq!(&view.id, &format!("p{}", i));
            if i % 2 == 0 {
                prop_assert_eq!(&view.author.username, &format!("user{}", i));
            } else {
                prop_assert_eq!(&view.author.username, ANONYMOUS_USERNAME);
            }
        }
    }
}
