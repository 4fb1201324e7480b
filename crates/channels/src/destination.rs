//! Destination addressing.
//!
//! A [`DestinationId`] is the identity of one graph vertex. Equality and
//! hashing are by (variant, address), so the same logical place always maps
//! to one vertex regardless of how it was spelled.

use std::{fmt, str::FromStr};

use {
    rift_common::{
        casemap::irc_to_lower,
        types::{ChannelId, GuildId, UserId},
    },
    serde::{Deserialize, Serialize},
};

use crate::error::Error;

/// Which outbound path serves a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Native,
    Irc,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Irc => f.write_str("irc"),
        }
    }
}

/// An address on the primary chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeAddress {
    /// A guild text channel.
    Channel { guild: GuildId, channel: ChannelId },
    /// A direct conversation with a user.
    Direct { user: UserId },
    /// One author inside a guild channel. Only that author's messages flow
    /// out of this vertex; sends land in the channel.
    Scoped {
        guild: GuildId,
        channel: ChannelId,
        user: UserId,
    },
}

impl NativeAddress {
    pub fn guild(&self) -> Option<GuildId> {
        match self {
            Self::Channel { guild, .. } | Self::Scoped { guild, .. } => Some(*guild),
            Self::Direct { .. } => None,
        }
    }

    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Self::Channel { channel, .. } | Self::Scoped { channel, .. } => Some(*channel),
            Self::Direct { .. } => None,
        }
    }

    /// The address where messages sent here physically live.
    #[must_use]
    pub fn home(&self) -> Self {
        match *self {
            Self::Scoped { guild, channel, .. } => Self::Channel { guild, channel },
            other => other,
        }
    }
}

/// A channel or user on one IRC network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrcAddress {
    domain: String,
    target: String,
}

impl IrcAddress {
    /// Build a normalised address: the domain is lowercased and the target is
    /// casemapped with `rfc1459`.
    pub fn new(domain: impl AsRef<str>, target: impl AsRef<str>) -> Self {
        Self {
            domain: domain.as_ref().trim().to_ascii_lowercase(),
            target: irc_to_lower(target.as_ref().trim()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_channel(&self) -> bool {
        self.target.starts_with(['#', '&', '+', '!'])
    }
}

/// One vertex of the relay graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationId {
    Native(NativeAddress),
    Irc(IrcAddress),
}

impl DestinationId {
    pub fn channel(guild: impl Into<GuildId>, channel: impl Into<ChannelId>) -> Self {
        Self::Native(NativeAddress::Channel {
            guild: guild.into(),
            channel: channel.into(),
        })
    }

    pub fn direct(user: impl Into<UserId>) -> Self {
        Self::Native(NativeAddress::Direct { user: user.into() })
    }

    pub fn scoped(
        guild: impl Into<GuildId>,
        channel: impl Into<ChannelId>,
        user: impl Into<UserId>,
    ) -> Self {
        Self::Native(NativeAddress::Scoped {
            guild: guild.into(),
            channel: channel.into(),
            user: user.into(),
        })
    }

    pub fn irc(domain: impl AsRef<str>, target: impl AsRef<str>) -> Self {
        Self::Irc(IrcAddress::new(domain, target))
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Self::Native(_) => DestinationKind::Native,
            Self::Irc(_) => DestinationKind::Irc,
        }
    }

    pub fn as_native(&self) -> Option<&NativeAddress> {
        match self {
            Self::Native(addr) => Some(addr),
            Self::Irc(_) => None,
        }
    }

    pub fn as_irc(&self) -> Option<&IrcAddress> {
        match self {
            Self::Irc(addr) => Some(addr),
            Self::Native(_) => None,
        }
    }

    pub fn guild(&self) -> Option<GuildId> {
        self.as_native().and_then(NativeAddress::guild)
    }

    /// The address where messages sent here physically live (Scoped
    /// vertices collapse to their channel).
    #[must_use]
    pub fn home(&self) -> Self {
        match self {
            Self::Native(addr) => Self::Native(addr.home()),
            Self::Irc(_) => self.clone(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(
            self,
            Self::Native(NativeAddress::Direct { .. })
        ) || self.as_irc().is_some_and(|a| !a.is_channel())
    }
}

impl From<NativeAddress> for DestinationId {
    fn from(addr: NativeAddress) -> Self {
        Self::Native(addr)
    }
}

impl From<IrcAddress> for DestinationId {
    fn from(addr: IrcAddress) -> Self {
        Self::Irc(addr)
    }
}

/// Canonical textual form, accepted back by [`FromStr`]:
/// `channel:<guild>/<channel>`, `dm:<user>`, `scoped:<guild>/<channel>/<user>`,
/// `irc:<domain>/<target>`.
impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(NativeAddress::Channel { guild, channel }) => {
                write!(f, "channel:{guild}/{channel}")
            },
            Self::Native(NativeAddress::Direct { user }) => write!(f, "dm:{user}"),
            Self::Native(NativeAddress::Scoped {
                guild,
                channel,
                user,
            }) => write!(f, "scoped:{guild}/{channel}/{user}"),
            Self::Irc(addr) => write!(f, "irc:{}/{}", addr.domain, addr.target),
        }
    }
}

impl FromStr for DestinationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid_input(format!("missing scheme in {s:?}")))?;
        let parts: Vec<&str> = rest.splitn(3, '/').collect();
        let bad = || Error::invalid_input(format!("malformed {scheme} destination {s:?}"));
        match (scheme, parts.as_slice()) {
            ("channel", [guild, channel]) => Ok(Self::channel(
                guild.parse::<GuildId>()?,
                channel.parse::<ChannelId>()?,
            )),
            ("dm", [user]) => Ok(Self::direct(user.parse::<UserId>()?)),
            ("scoped", [guild, channel, user]) => Ok(Self::scoped(
                guild.parse::<GuildId>()?,
                channel.parse::<ChannelId>()?,
                user.parse::<UserId>()?,
            )),
            ("irc", [domain, target]) if !domain.is_empty() && !target.is_empty() => {
                Ok(Self::irc(domain, target))
            },
            ("irc", _) | ("channel", _) | ("dm", _) | ("scoped", _) => Err(bad()),
            _ => Err(Error::invalid_input(format!(
                "unknown destination scheme {scheme:?}"
            ))),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, std::collections::HashSet};

    #[rstest]
    #[case("channel:1/2")]
    #[case("dm:42")]
    #[case("scoped:1/2/3")]
    #[case("irc:irc.libera.chat/#rust")]
    fn canonical_form_parses_back(#[case] input: &str) {
        let dest: DestinationId = input.parse().unwrap();
        assert_eq!(dest.to_string(), input);
    }

    #[rstest]
    #[case("general")]
    #[case("slack:#x")]
    #[case("channel:1")]
    #[case("irc:irc.libera.chat")]
    #[case("dm:abc")]
    fn malformed_destinations_rejected(#[case] input: &str) {
        assert!(input.parse::<DestinationId>().is_err());
    }

    #[test]
    fn irc_addresses_are_casemapped() {
        let a = DestinationId::irc("IRC.Libera.Chat", "#Rust[1]");
        let b: DestinationId = "irc:irc.libera.chat/#rust{1}".parse().unwrap();
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn scoped_home_is_channel() {
        let scoped = DestinationId::scoped(1u64, 2u64, 3u64);
        assert_eq!(scoped.home(), DestinationId::channel(1u64, 2u64));
        assert_ne!(scoped, scoped.home());
    }

    #[test]
    fn direct_detection() {
        assert!(DestinationId::direct(5u64).is_direct());
        assert!(DestinationId::irc("irc.libera.chat", "someone").is_direct());
        assert!(!DestinationId::irc("irc.libera.chat", "#chan").is_direct());
        assert!(!DestinationId::channel(1u64, 2u64).is_direct());
    }
}
