use std::time::Duration;

use {rift_channels::DestinationId, rift_common::FromMessage};

/// Why a destination reference could not be turned into a destination.
#[derive(Debug, thiserror::Error)]
pub enum Resolution {
    #[error("No destinations found.")]
    NotFound { query: String },

    #[error("No destination selected.")]
    NoSelection,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Resolution(#[from] Resolution),

    /// The sender fails the access policy of every hop.
    #[error("You are not permitted to send messages to {destination}.")]
    PolicyDenied { destination: DestinationId },

    /// The user is refused by the bot-wide allow/deny list.
    #[error("You are not permitted to use the bot here.")]
    NotPermitted,

    #[error("{destination} is blocklisted.")]
    Blocklisted { destination: DestinationId },

    #[error("Timed out after {after:?} connecting to {domain}.")]
    ConnectionTimeout { domain: String, after: Duration },

    #[error("Timed out after {after:?} joining {channel} on {domain}.")]
    JoinTimeout {
        domain: String,
        channel: String,
        after: Duration,
    },

    /// Nothing survives adaptation for this hop.
    #[error("Nothing to send.")]
    NothingToRelay,

    #[error("Too many files.")]
    TooManyAttachments { count: usize, limit: usize },

    #[error("I am not allowed to send messages to {destination}.")]
    Forbidden { destination: DestinationId },

    /// Sending to one neighbor failed.
    #[error("I couldn't send your message to {destination}: {source}")]
    Dispatch {
        destination: DestinationId,
        #[source]
        source: rift_channels::Error,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Irc(rift_irc::Error),

    #[error(transparent)]
    Channels(#[from] rift_channels::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    #[must_use]
    pub fn not_found(query: impl Into<String>) -> Self {
        Self::Resolution(Resolution::NotFound {
            query: query.into(),
        })
    }

    #[must_use]
    pub fn dispatch(destination: &DestinationId, source: rift_channels::Error) -> Self {
        if source.is_forbidden() {
            return Self::Forbidden {
                destination: destination.clone(),
            };
        }
        Self::Dispatch {
            destination: destination.clone(),
            source,
        }
    }

    /// Whether the invoker should be told about this error. Failures local
    /// to one hop stay in the logs.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Self::NothingToRelay | Self::Dispatch { .. } | Self::Forbidden { .. }
        )
    }
}

impl From<rift_irc::Error> for Error {
    fn from(err: rift_irc::Error) -> Self {
        match err {
            rift_irc::Error::ConnectionTimeout { domain, after } => {
                Self::ConnectionTimeout { domain, after }
            },
            rift_irc::Error::JoinTimeout {
                domain,
                channel,
                after,
            } => Self::JoinTimeout {
                domain,
                channel,
                after,
            },
            rift_irc::Error::Channels(inner) => Self::Channels(inner),
            other => Self::Irc(other),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

rift_common::impl_context!();
