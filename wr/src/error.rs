//! Error types for the widget fetch lifecycle
//!
//! Every failure a widget can hit ends up in the same place: `error=true` in its
//! [`PresentationState`](crate::state::PresentationState). The concrete error is
//! still kept here so `on_error` hooks, callers awaiting a fetch, and the logs
//! can tell the causes apart.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Where in the lifecycle a customization hook ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    BeforeRequest,
    AfterResponse,
    OnError,
    EventHandler,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::BeforeRequest => write!(f, "before_request"),
            HookPoint::AfterResponse => write!(f, "after_response"),
            HookPoint::OnError => write!(f, "on_error"),
            HookPoint::EventHandler => write!(f, "event handler"),
        }
    }
}

/// Failure raised by consumer customization code
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl HookError {
    /// Convenience constructor for hook authors
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed(message.into())
    }
}

/// Errors from the transport collaborator
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport task aborted: {0}")]
    Aborted(String),
}

/// Malformed descriptor mutation or datasource definition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("{field} index {index} out of range (len {len})")]
    OutOfRange {
        field: &'static str,
        index: usize,
        len: usize,
    },

    #[error("datasource has no time window (start_absolute or start_relative required)")]
    MissingWindow,

    #[error("datasource sets both an absolute and a relative time window")]
    ConflictingWindow,

    #[error("invalid relative time '{0}'")]
    InvalidRelativeTime(String),

    #[error("option '{0}' is reserved, use the typed setter")]
    ReservedOption(String),
}

/// Coarse classification of a [`WidgetError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Hook,
    Transport,
    OutOfRange,
    InvalidDescriptor,
}

/// Any failure that can mark a widget as errored
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("{point} hook failed: {source}")]
    Hook {
        point: HookPoint,
        #[source]
        source: HookError,
    },

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}

impl WidgetError {
    pub fn hook(point: HookPoint, source: HookError) -> Self {
        WidgetError::Hook { point, source }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WidgetError::Hook { .. } => ErrorKind::Hook,
            WidgetError::Transport(_) => ErrorKind::Transport,
            WidgetError::Descriptor(DescriptorError::OutOfRange { .. }) => ErrorKind::OutOfRange,
            WidgetError::Descriptor(_) => ErrorKind::InvalidDescriptor,
        }
    }
}
