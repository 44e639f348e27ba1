//! Story lifecycle pieces that live outside the accessor: the device-local
//! viewed-set, the viewer playback sequencer, and the expired-record purge
//! job.

mod playback;
mod purge;
mod viewed;

pub use playback::{PlaybackStatus, StoryPlayback, STORY_DURATION};
pub use purge::purge_expired_stories;
pub use viewed::ViewedStories;
