//! Resource accessors
//!
//! One module per entity, translating domain operations into gateway calls
//! and assembling denormalized view models. The gateway returns flat rows,
//! so joins happen here, client-side; the assembly steps are pure functions
//! of the fetched row sets so they can be tested without a gateway.

mod circles;
mod likes;
mod messages;
mod news;
mod posts;
mod profiles;
mod projects;
mod saves;
mod skills;
mod stories;

pub use circles::Circles;
pub use likes::Likes;
pub use messages::Messages;
pub use news::{NewNewsPost, News, NewsPatch};
pub use posts::{assemble_posts, FeedScope, Posts};
pub use profiles::{ProfilePatch, Profiles};
pub use projects::{NewProject, ProjectPatch, Projects};
pub use saves::Saves;
pub use skills::Skills;
pub use stories::{group_stories, Stories};

use bytes::Bytes;

/// An image payload to upload alongside a post or story.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub bytes: Bytes,
    /// File extension without the dot, e.g. `jpg`.
    pub extension: String,
}

impl NewImage {
    pub fn new(bytes: impl Into<Bytes>, extension: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            extension: extension.into(),
        }
    }
}

/// Recover a blob storage path from its public URL.
///
/// Public URLs embed the bucket segment, so the storage path is everything
/// after `/{bucket}/`. Returns `None` for URLs that do not reference the
/// bucket, in which case callers skip blob removal.
pub(crate) fn blob_path_from_url(url: &str, bucket: &str) -> Option<String> {
    let marker = format!("/{}/", bucket);
    url.split_once(&marker).map(|(_, path)| path.to_string())
}
