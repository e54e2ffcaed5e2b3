use std::fmt;

use thiserror::Error;

/// Machine-readable error codes attached to every logged failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    StoreNotConfigured,
    StoreUnreachable,
    StoreRejected,
    RowDecodeFailed,
    SubscriptionFailed,
    InvalidPlaybackParams,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::StoreNotConfigured => "E1002",
            Self::StoreUnreachable => "E2001",
            Self::StoreRejected => "E2002",
            Self::RowDecodeFailed => "E2003",
            Self::SubscriptionFailed => "E2004",
            Self::InvalidPlaybackParams => "E3001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::StoreNotConfigured => "Post store not configured",
            Self::StoreUnreachable => "Post store unreachable",
            Self::StoreRejected => "Post store rejected the request",
            Self::RowDecodeFailed => "Post row could not be decoded",
            Self::SubscriptionFailed => "Realtime subscription failed",
            Self::InvalidPlaybackParams => "Invalid playback parameters",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint for whoever is looking at the logs.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in xwall.toml and restart."),
            Self::StoreNotConfigured => {
                Some("Set SUPABASE_URL and SUPABASE_KEY, or pass --from-file.")
            }
            Self::StoreUnreachable => Some("Check network access; the next poll retries."),
            Self::StoreRejected => Some("Verify the API key and table name."),
            Self::RowDecodeFailed => Some("Rows need created_at and an id or source_id."),
            Self::SubscriptionFailed => Some("Realtime reconnects automatically; polling continues."),
            Self::InvalidPlaybackParams => Some("Stride must be between 1 and the window size."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures talking to the remote post store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store not configured: {0}")]
    NotConfigured(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode post row: {0}")]
    Decode(String),

    #[error("subscription error: {0}")]
    Subscribe(String),
}

impl StoreError {
    /// The [`ErrorCode`] logged alongside this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotConfigured(_) => ErrorCode::StoreNotConfigured,
            Self::Transport(_) => ErrorCode::StoreUnreachable,
            Self::Status { .. } => ErrorCode::StoreRejected,
            Self::Decode(_) => ErrorCode::RowDecodeFailed,
            Self::Subscribe(_) => ErrorCode::SubscriptionFailed,
        }
    }
}
