//! IRC bridge adapter.
//!
//! Owns one connection per network domain, translates protocol traffic into
//! [`rift_channels::RiftEvent`]s on the shared bus, and exposes IRC channels
//! and nicks as relay destinations through [`IrcOutbound`].

pub mod bridge;
pub mod codec;
pub mod connection;
pub mod error;
mod handlers;
pub mod message;
pub mod outbound;
pub mod state;

pub use {
    bridge::{BridgeTimeouts, IrcBridge},
    connection::{ConnectionSettings, IrcConnection},
    error::{Error, Result},
    message::IrcMessage,
    outbound::{IrcOutbound, split_message},
    state::{ConnectionState, Member},
};
