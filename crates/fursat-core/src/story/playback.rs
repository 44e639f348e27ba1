//! Story viewer playback sequencer.
//!
//! Pure state machine over a story count: no timers of its own, no story
//! data. The caller drives it with `tick(now)` at whatever frame rate it
//! renders at and supplies `Instant`s for every transition, which is what
//! makes the machine fully testable without sleeping.

use std::time::{Duration, Instant};

/// How long each story plays before auto-advancing.
pub const STORY_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    /// The viewer is done; the caller should close the overlay.
    Closed,
}

/// Playback position over a sequence of stories.
#[derive(Debug, Clone)]
pub struct StoryPlayback {
    count: usize,
    index: usize,
    status: PlaybackStatus,
    /// When the current play segment started; meaningless while paused.
    segment_start: Instant,
    /// Play time accumulated before the current segment (across pauses).
    accumulated: Duration,
}

impl StoryPlayback {
    /// Start playing the first of `count` stories. An empty sequence is
    /// closed immediately.
    pub fn new(count: usize, now: Instant) -> Self {
        Self {
            count,
            index: 0,
            status: if count == 0 {
                PlaybackStatus::Closed
            } else {
                PlaybackStatus::Playing
            },
            segment_start: now,
            accumulated: Duration::ZERO,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        self.status == PlaybackStatus::Closed
    }

    /// Progress through the current story, 0 to 100. Frozen while paused.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.status == PlaybackStatus::Closed {
            return 0.0;
        }
        let elapsed = self.elapsed(now);
        (elapsed.as_secs_f64() / STORY_DURATION.as_secs_f64() * 100.0).min(100.0)
    }

    /// Advance time. Auto-advances to the next story when the current one
    /// has played out; advancing past the last story closes playback.
    pub fn tick(&mut self, now: Instant) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        if self.elapsed(now) >= STORY_DURATION {
            self.advance(now);
        }
    }

    /// Freeze progress where it is.
    pub fn pause(&mut self, now: Instant) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        self.accumulated += now - self.segment_start;
        self.status = PlaybackStatus::Paused;
    }

    /// Continue from the frozen position.
    pub fn resume(&mut self, now: Instant) {
        if self.status != PlaybackStatus::Paused {
            return;
        }
        self.segment_start = now;
        self.status = PlaybackStatus::Playing;
    }

    /// Skip to the next story (or close after the last). Resumes playing
    /// even when invoked while paused.
    pub fn next(&mut self, now: Instant) {
        if self.status == PlaybackStatus::Closed {
            return;
        }
        self.advance(now);
    }

    /// Restart the previous story, or the current one when already at the
    /// first. Resumes playing.
    pub fn previous(&mut self, now: Instant) {
        if self.status == PlaybackStatus::Closed {
            return;
        }
        self.index = self.index.saturating_sub(1);
        self.restart_segment(now);
        self.status = PlaybackStatus::Playing;
    }

    /// The story at `removed_index` was deleted out from under the viewer.
    ///
    /// The sequence shrinks by one and the position clamps to what is now
    /// showing; progress restarts for it. A pause stays a pause: the viewer
    /// deleted while holding, and release is what resumes. Removing the
    /// only story closes playback.
    pub fn note_deleted(&mut self, removed_index: usize, now: Instant) {
        if self.status == PlaybackStatus::Closed || removed_index >= self.count {
            return;
        }
        self.count -= 1;
        if self.count == 0 {
            self.status = PlaybackStatus::Closed;
            return;
        }
        if removed_index < self.index {
            self.index -= 1;
        } else {
            self.index = self.index.min(self.count - 1);
            self.restart_segment(now);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        match self.status {
            PlaybackStatus::Playing => self.accumulated + (now - self.segment_start),
            _ => self.accumulated,
        }
    }

    fn advance(&mut self, now: Instant) {
        if self.index + 1 >= self.count {
            self.status = PlaybackStatus::Closed;
            return;
        }
        self.index += 1;
        self.restart_segment(now);
        self.status = PlaybackStatus::Playing;
    }

    fn restart_segment(&mut self, now: Instant) {
        self.segment_start = now;
        self.accumulated = Duration::ZERO;
    }
}
