//! Identity types shared by every crate in the relay.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{casemap::irc_to_lower, error::Error};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| Error::invalid_id($kind, s))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake!(
    /// A user on the native chat platform.
    UserId,
    "user id"
);
snowflake!(
    /// A guild (server) on the native chat platform.
    GuildId,
    "guild id"
);
snowflake!(
    /// A text channel or direct-message channel on the native chat platform.
    ChannelId,
    "channel id"
);
snowflake!(
    /// A message identifier. Native messages carry the platform snowflake;
    /// IRC messages get a synthetic id allocated by the bridge.
    MessageId,
    "message id"
);

/// A user identity usable in access lists, regardless of protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserRef {
    Native { id: UserId },
    /// A nick on a specific IRC network. The nick is stored casemapped.
    Irc { domain: String, nick: String },
}

impl UserRef {
    #[must_use]
    pub fn native(id: impl Into<UserId>) -> Self {
        Self::Native { id: id.into() }
    }

    #[must_use]
    pub fn irc(domain: impl Into<String>, nick: impl Into<String>) -> Self {
        Self::Irc {
            domain: domain.into().to_ascii_lowercase(),
            nick: irc_to_lower(&nick.into()),
        }
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native { id } => write!(f, "<@{id}>"),
            Self::Irc { domain, nick } => write!(f, "{nick}@{domain}"),
        }
    }
}

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Attachment {
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_parses_and_displays() {
        let id: ChannelId = " 1234 ".parse().unwrap();
        assert_eq!(id, ChannelId(1234));
        assert_eq!(id.to_string(), "1234");
        assert!("general".parse::<ChannelId>().is_err());
    }

    #[test]
    fn irc_user_is_casemapped() {
        assert_eq!(
            UserRef::irc("IRC.Libera.Chat", "Nick[m]"),
            UserRef::irc("irc.libera.chat", "nick{m}")
        );
    }

    #[test]
    fn user_ref_serializes_tagged() {
        let json = serde_json::to_value(UserRef::native(7u64)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "native", "id": 7}));
    }

    #[test]
    fn attachment_image_detection() {
        let a = Attachment {
            filename: "cat.png".into(),
            url: "https://cdn.example/cat.png".into(),
            size: 10,
            content_type: Some("image/png".into()),
        };
        assert!(a.is_image());
    }
}
