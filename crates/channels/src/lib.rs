//! Destinations and the seams around them.
//!
//! A destination is anything messages can be relayed to: a channel, DM or
//! author-scoped channel on the native platform, or a channel/nick on an IRC
//! network. Each kind has a [`DestinationOutbound`] registered in an
//! [`OutboundRouter`]; inbound traffic arrives on the [`EventBus`].

pub mod destination;
pub mod error;
pub mod event;
pub mod message;
pub mod native;
pub mod outbound;
pub mod registry;
pub mod store;

pub use {
    destination::{DestinationId, DestinationKind, IrcAddress, NativeAddress},
    error::{Error, Result},
    event::{EventBus, EventSubscription, IrcEvent, IrcEventKind, RiftEvent},
    message::{
        AllowedMentions, Author, Embed, EmbedField, InboundMessage, OutboundMessage, Rank,
    },
    native::{ChannelInfo, GuildInfo, MemberInfo, NativeOutbound, NativePlatform, Permissions},
    outbound::DestinationOutbound,
    registry::OutboundRouter,
    store::{InMemoryRiftStore, RiftStore},
};
