//! Message model flowing in and out of destinations.

use {
    rift_common::types::{Attachment, MessageId, UserRef},
    serde::{Deserialize, Serialize},
};

use crate::destination::DestinationId;

/// Channel privilege of a message author, in ascending order.
///
/// On IRC this comes from channel modes; on the native platform it is
/// derived from the author's permissions in the source channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    #[default]
    None,
    Voice,
    HalfOp,
    Operator,
    Admin,
    Owner,
}

impl Rank {
    /// Single-character marker shown before the author name on IRC.
    pub fn marker(self) -> Option<char> {
        match self {
            Self::Owner => Some('~'),
            Self::Admin => Some('&'),
            Self::Operator => Some('@'),
            Self::HalfOp => Some('%'),
            Self::Voice => Some('+'),
            Self::None => None,
        }
    }

    /// Rank for a `NAMES` prefix character.
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            '~' => Some(Self::Owner),
            '&' => Some(Self::Admin),
            '@' => Some(Self::Operator),
            '%' => Some(Self::HalfOp),
            '+' => Some(Self::Voice),
            _ => None,
        }
    }

    /// Rank for a channel membership mode letter (`MODE #c +o nick`).
    pub fn from_mode(mode: char) -> Option<Self> {
        match mode {
            'q' => Some(Self::Owner),
            'a' => Some(Self::Admin),
            'o' => Some(Self::Operator),
            'h' => Some(Self::HalfOp),
            'v' => Some(Self::Voice),
            _ => None,
        }
    }
}

/// Who wrote an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub user: UserRef,
    /// Account name (`name#discrim` style tag on the native side, nick on IRC).
    pub name: String,
    pub display_name: String,
    pub is_bot: bool,
    pub avatar_url: Option<String>,
    pub color: Option<u32>,
    /// `"{top role} in {guild}"`-style subheader, when the author has one.
    pub subheader: Option<String>,
    pub rank: Rank,
}

impl Author {
    /// Minimal author for an IRC nick.
    pub fn irc(domain: &str, nick: &str) -> Self {
        Self {
            user: UserRef::irc(domain, nick),
            name: nick.to_string(),
            display_name: nick.to_string(),
            is_bot: false,
            avatar_url: None,
            color: None,
            subheader: None,
            rank: Rank::None,
        }
    }
}

/// A message observed in a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    /// Where the message was posted (a channel, a DM, or an IRC target).
    pub location: DestinationId,
    pub author: Author,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// Message this one replies to, in the same location.
    pub reference: Option<MessageId>,
    /// Whether the reply pings the replied-to author.
    pub mentions_replied: bool,
    pub jump_url: Option<String>,
}

impl InboundMessage {
    pub fn has_payload(&self) -> bool {
        !self.content.is_empty() || !self.attachments.is_empty()
    }
}

/// Which mentions a relayed message may trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedMentions {
    All,
    #[default]
    UsersOnly,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Platform-neutral rich embed. Rendering to the native wire type is the
/// platform collaborator's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub author_name: Option<String>,
    pub author_icon_url: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub image_url: Option<String>,
    pub fields: Vec<EmbedField>,
}

/// What gets sent to one destination after adaptation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
    pub allowed_mentions: AllowedMentions,
    pub reply_to: Option<MessageId>,
    pub mention_replied: bool,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.embeds.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case('~', Rank::Owner)]
    #[case('&', Rank::Admin)]
    #[case('@', Rank::Operator)]
    #[case('%', Rank::HalfOp)]
    #[case('+', Rank::Voice)]
    fn prefix_and_marker_agree(#[case] prefix: char, #[case] rank: Rank) {
        assert_eq!(Rank::from_prefix(prefix), Some(rank));
        assert_eq!(rank.marker(), Some(prefix));
    }

    #[test]
    fn ranks_are_ordered_by_privilege() {
        assert!(Rank::Owner > Rank::Admin);
        assert!(Rank::Admin > Rank::Operator);
        assert!(Rank::Operator > Rank::HalfOp);
        assert!(Rank::HalfOp > Rank::Voice);
        assert!(Rank::Voice > Rank::None);
        assert_eq!(Rank::None.marker(), None);
    }

    #[test]
    fn empty_outbound() {
        assert!(OutboundMessage::text("  ").is_empty());
        assert!(!OutboundMessage::text("hi").is_empty());
        let embed_only = OutboundMessage {
            embeds: vec![Embed::default()],
            ..Default::default()
        };
        assert!(!embed_only.is_empty());
    }
}
