use std::time::Duration;

use rift_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A line from the server could not be parsed.
    #[error("malformed IRC line {line:?}: {reason}")]
    Parse { line: String, reason: &'static str },

    #[error("line of {actual} bytes exceeds the {limit}-byte limit")]
    LineTooLong { actual: usize, limit: usize },

    /// Registration did not finish within the bound.
    #[error("timed out after {after:?} connecting to {domain}")]
    ConnectionTimeout { domain: String, after: Duration },

    /// The server did not acknowledge a JOIN within the bound.
    #[error("timed out after {after:?} joining {channel} on {domain}")]
    JoinTimeout {
        domain: String,
        channel: String,
        after: Duration,
    },

    /// The server refused a JOIN (banned, invite-only, bad key, full).
    #[error("cannot join {channel} on {domain}: {reason}")]
    JoinRejected {
        domain: String,
        channel: String,
        reason: String,
    },

    #[error("connection to {domain} closed")]
    Disconnected { domain: String },

    #[error(transparent)]
    Channels(#[from] rift_channels::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn parse(line: impl Into<String>, reason: &'static str) -> Self {
        Self::Parse {
            line: line.into(),
            reason,
        }
    }

    #[must_use]
    pub fn disconnected(domain: impl Into<String>) -> Self {
        Self::Disconnected {
            domain: domain.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::JoinTimeout { .. }
        )
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

rift_common::impl_context!();

impl From<Error> for rift_channels::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Channels(inner) => inner,
            other => Self::external("irc bridge", other),
        }
    }
}
