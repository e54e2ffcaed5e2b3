//! Windowed playback: which post the wall shows on each tick.
//!
//! The scheduler walks the post log in windows of `window_size` posts. When a
//! window is exhausted the window start moves forward by `stride`, so
//! consecutive windows overlap by `window_size - stride` posts. A trailing
//! partial window is still played so no live post is skipped. Once nothing is
//! left ahead, playback loops over the newest `loop_tail` posts.
//!
//! The scheduler never caches log bounds between ticks: every tick re-reads
//! the slice it is handed, recomputes the window and clamps the cursor into
//! it. The log may have grown (or, after a bootstrap replace, changed) since
//! the previous tick.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::engagement::Engagement;
use crate::error::ErrorCode;
use crate::post::Post;

/// Posts per window.
pub const WINDOW_SIZE: usize = 15;
/// Positions the window start advances once a window is exhausted.
pub const STRIDE: usize = 5;
/// How long each post stays on screen.
pub const TICK_PERIOD: Duration = Duration::from_secs(8);
/// Newest posts cycled through once playback has caught up.
pub const LOOP_TAIL: usize = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("window size must be at least 1")]
    EmptyWindow,

    #[error("stride {stride} must be between 1 and the window size {window_size}")]
    StrideOutOfRange { stride: usize, window_size: usize },
}

impl ParamsError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidPlaybackParams
    }
}

/// Window geometry and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackParams {
    window_size: usize,
    stride: usize,
    tick_period: Duration,
    loop_tail: usize,
}

impl PlaybackParams {
    /// # Errors
    ///
    /// Returns [`ParamsError`] unless `1 <= stride <= window_size`.
    pub const fn new(
        window_size: usize,
        stride: usize,
        tick_period: Duration,
        loop_tail: usize,
    ) -> Result<Self, ParamsError> {
        if window_size == 0 {
            return Err(ParamsError::EmptyWindow);
        }
        if stride == 0 || stride > window_size {
            return Err(ParamsError::StrideOutOfRange {
                stride,
                window_size,
            });
        }
        Ok(Self {
            window_size,
            stride,
            tick_period,
            loop_tail,
        })
    }

    #[must_use]
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        self.tick_period
    }

    #[must_use]
    pub const fn loop_tail(&self) -> usize {
        self.loop_tail
    }
}

impl Default for PlaybackParams {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            stride: STRIDE,
            tick_period: TICK_PERIOD,
            loop_tail: LOOP_TAIL,
        }
    }
}

/// Playback position. Only the scheduler mutates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub window_start: usize,
    pub index_in_window: usize,
}

impl Cursor {
    #[must_use]
    pub const fn new(window_start: usize, index_in_window: usize) -> Self {
        Self {
            window_start,
            index_in_window,
        }
    }

    #[must_use]
    pub const fn global_index(&self) -> usize {
        self.window_start + self.index_in_window
    }

    /// 1-based window number for a given stride.
    #[must_use]
    pub const fn window_number(&self, stride: usize) -> usize {
        self.window_start / stride + 1
    }
}

/// One displayed post and where it sits in the playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub post: Post,
    /// 1-based position within the current window.
    pub position: usize,
    pub window_len: usize,
    pub window_number: usize,
    pub global_index: usize,
    pub engagement: Engagement,
}

impl Frame {
    /// `"3/15 · Window 2"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{}/{} · Window {}",
            self.position, self.window_len, self.window_number
        )
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The log is empty; nothing to show.
    Empty,
    /// The cursor pointed past the log and was reset; nothing shown this tick.
    Resynced,
    Show(Frame),
}

impl Tick {
    #[must_use]
    pub const fn frame(&self) -> Option<&Frame> {
        match self {
            Self::Show(frame) => Some(frame),
            Self::Empty | Self::Resynced => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    params: PlaybackParams,
    cursor: Cursor,
}

impl Scheduler {
    #[must_use]
    pub fn new(params: PlaybackParams) -> Self {
        Self {
            params,
            cursor: Cursor::default(),
        }
    }

    /// Start from an arbitrary position, e.g. a cursor restored by a test.
    #[must_use]
    pub const fn with_cursor(params: PlaybackParams, cursor: Cursor) -> Self {
        Self { params, cursor }
    }

    #[must_use]
    pub const fn params(&self) -> &PlaybackParams {
        &self.params
    }

    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Pick the post to show now and advance the cursor.
    pub fn tick(&mut self, log: &[Post]) -> Tick {
        let len = log.len();
        if len == 0 {
            return Tick::Empty;
        }

        let start = self.cursor.window_start;
        let end = start.saturating_add(self.params.window_size).min(len);
        let Some(window) = log.get(start..end).filter(|w| !w.is_empty()) else {
            tracing::debug!(window_start = start, len, "cursor past end of log, resetting");
            self.cursor = Cursor::default();
            return Tick::Resynced;
        };

        let safe_index = self.cursor.index_in_window.min(window.len() - 1);
        let frame = Frame {
            post: window[safe_index].clone(),
            position: safe_index + 1,
            window_len: window.len(),
            window_number: self.cursor.window_number(self.params.stride),
            global_index: start + safe_index,
            engagement: Engagement::for_index(start + safe_index),
        };

        self.cursor = self.advance(safe_index, window.len(), len);
        Tick::Show(frame)
    }

    fn advance(&self, safe_index: usize, window_len: usize, len: usize) -> Cursor {
        let start = self.cursor.window_start;
        if safe_index + 1 < window_len {
            return Cursor::new(start, safe_index + 1);
        }

        let next_start = start + self.params.stride;
        if next_start < len {
            Cursor::new(next_start, 0)
        } else {
            let loop_start = len.saturating_sub(self.params.loop_tail);
            tracing::debug!(loop_start, len, "caught up with the live edge, looping");
            Cursor::new(loop_start, 0)
        }
    }
}
