//! xwall-core library: ingestion sync and windowed playback for the event wall.
//!
//! # Conventions
//!
//! - **Errors**: typed [`error::StoreError`] at the store seam, `anyhow::Result`
//!   for config loading and the runtime's surface boundary.
//! - **Logging**: `tracing` macros with structured fields; failures carry an
//!   `code = E####` field from [`error::ErrorCode`].

pub mod agenda;
pub mod cadence;
pub mod config;
pub mod engagement;
pub mod error;
pub mod log;
pub mod playback;
pub mod post;
pub mod store;
pub mod sync;
pub mod wall;
