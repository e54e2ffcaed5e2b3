//! Terminal user interface (TUI) for xwall.
//!
//! ## Entry points
//!
//! - [`wall::WallScreen`] - full-screen wall: agenda, current post, playback position.

pub mod wall;
