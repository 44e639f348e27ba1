//! Fursat Synchronization Core
//!
//! Client-side real-time data layer for the Fursat campus network: feed
//! posts, 24-hour stories, circles, direct messages, profiles, and news,
//! kept current against a hosted backend reached through the [`Gateway`]
//! capability trait.
//!
//! ## Overview
//!
//! The core is organized in four layers:
//!
//! - **Gateway** ([`gateway`]): the narrow seam to the backend (row
//!   queries/mutations, blobs, change subscriptions, identity). Tests run
//!   against the in-memory [`MemoryGateway`].
//! - **Resource accessors** ([`resources`]): typed operations per domain
//!   table, assembling denormalized view models client-side.
//! - **Synchronization hooks** ([`sync`]): live streams (feed, inbox, chat,
//!   story rail) that re-fetch or incrementally merge on change events,
//!   with last-scope-wins semantics across scope switches.
//! - **Action controllers** ([`actions`]): duplicate suppression and
//!   failure notices for user-triggered mutations.
//!
//! Story viewing state is device-local and persisted ([`story`]); session
//! identity/profile state is an explicit object ([`session::Session`]),
//! never an ambient global.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fursat_core::{FeedScope, MemoryGateway, PostFeed, Posts};
//!
//! #[tokio::main]
//! async fn main() -> fursat_core::FursatResult<()> {
//!     let gateway = Arc::new(MemoryGateway::new());
//!     gateway.sign_in("ada", "ada@campus.edu");
//!
//!     Posts::new(gateway.clone())
//!         .create_post("hello campus", None, None)
//!         .await?;
//!
//!     let feed = PostFeed::new(gateway, FeedScope::Global);
//!     feed.start().await;
//!     for post in feed.snapshot().items {
//!         println!("{}: {}", post.author.username, post.content);
//!     }
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod error;
pub mod gateway;
pub mod resources;
pub mod session;
pub mod story;
pub mod sync;
pub mod types;

// Re-exports
pub use actions::{ActionController, Notice, NoticeSeverity, PostActions, StoryActions};
pub use error::{FursatError, FursatResult};
pub use gateway::{
    AuthUser, ChangeEvent, ChangeKind, Filter, Gateway, MemoryGateway, OrderBy, TableEvents,
};
pub use resources::{
    assemble_posts, group_stories, Circles, FeedScope, Likes, Messages, NewImage, News, Posts,
    Profiles, Projects, Saves, Skills, Stories,
};
pub use session::{Session, SessionState};
pub use story::{purge_expired_stories, PlaybackStatus, StoryPlayback, ViewedStories};
pub use sync::{ChatStream, ConversationList, PostFeed, Snapshot, StoryRail};
pub use types::{
    AuthorProfile, Circle, Conversation, Post, Story, StoryGroup, ANONYMOUS_USERNAME,
};
