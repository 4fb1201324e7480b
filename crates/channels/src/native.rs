//! Native chat platform collaborator.
//!
//! The gateway connection, login and wire rendering of the primary platform
//! live outside this workspace. The relay only talks to it through
//! [`NativePlatform`].

use std::sync::Arc;

use {
    async_trait::async_trait,
    rift_common::types::{ChannelId, GuildId, MessageId, UserId},
    serde::{Deserialize, Serialize},
};

use crate::{
    destination::{DestinationId, DestinationKind, NativeAddress},
    error::{Error, Result},
    message::OutboundMessage,
    outbound::DestinationOutbound,
};

/// Effective permissions of a user in one place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub read_messages: bool,
    pub send_messages: bool,
    pub embed_links: bool,
    pub attach_files: bool,
    pub mention_everyone: bool,
    pub manage_messages: bool,
    pub manage_channels: bool,
    pub administrator: bool,
}

impl Permissions {
    pub const fn all() -> Self {
        Self {
            read_messages: true,
            send_messages: true,
            embed_links: true,
            attach_files: true,
            mention_everyone: true,
            manage_messages: true,
            manage_channels: true,
            administrator: true,
        }
    }

    /// Permissions granted by both sides.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self {
            read_messages: self.read_messages && other.read_messages,
            send_messages: self.send_messages && other.send_messages,
            embed_links: self.embed_links && other.embed_links,
            attach_files: self.attach_files && other.attach_files,
            mention_everyone: self.mention_everyone && other.mention_everyone,
            manage_messages: self.manage_messages && other.manage_messages,
            manage_channels: self.manage_channels && other.manage_channels,
            administrator: self.administrator && other.administrator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub guild: GuildId,
    pub name: String,
    pub topic: Option<String>,
}

/// A platform user, optionally seen through one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: UserId,
    /// Account name, e.g. `name#0001`.
    pub name: String,
    /// Unique account tag; equals `name` on platforms without discriminators.
    pub tag: String,
    pub display_name: String,
    pub is_bot: bool,
    pub guild: Option<GuildId>,
    pub top_role: Option<String>,
}

/// What the relay needs from the primary chat platform.
#[async_trait]
pub trait NativePlatform: Send + Sync {
    /// The relay bot's own user.
    fn bot_user(&self) -> UserId;

    async fn send(&self, to: &NativeAddress, message: &OutboundMessage) -> Result<MessageId>;

    async fn edit(&self, to: &NativeAddress, id: MessageId, message: &OutboundMessage)
    -> Result<()>;

    async fn delete(&self, to: &NativeAddress, id: MessageId) -> Result<()>;

    async fn typing(&self, to: &NativeAddress) -> Result<()>;

    /// Effective permissions of `user` at `at`. Users that are not members
    /// get the guild's default permissions.
    async fn permissions(&self, at: &NativeAddress, user: UserId) -> Result<Permissions>;

    async fn bot_permissions(&self, at: &NativeAddress) -> Result<Permissions>;

    async fn member(&self, guild: GuildId, user: UserId) -> Result<Option<MemberInfo>>;

    async fn user(&self, user: UserId) -> Result<Option<MemberInfo>>;

    /// Bot owners / privileged operators.
    async fn is_operator(&self, user: UserId) -> bool;

    /// Bot-wide allow/deny list check.
    async fn user_allowed(&self, user: UserId) -> bool;

    /// Whether messages relayed to `at` should use rich embeds.
    async fn embeds_requested(&self, at: &NativeAddress) -> bool;

    async fn guilds(&self) -> Result<Vec<GuildInfo>>;

    async fn text_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>>;

    async fn members(&self, guild: GuildId) -> Result<Vec<MemberInfo>>;

    async fn channel_name(&self, at: &NativeAddress) -> Option<String>;
}

/// Adapts a [`NativePlatform`] into the outbound router.
///
/// Scoped destinations are delivered to their channel.
pub struct NativeOutbound {
    platform: Arc<dyn NativePlatform>,
}

impl NativeOutbound {
    pub fn new(platform: Arc<dyn NativePlatform>) -> Self {
        Self { platform }
    }

    fn address(to: &DestinationId) -> Result<NativeAddress> {
        to.as_native()
            .map(NativeAddress::home)
            .ok_or_else(|| Error::invalid_input(format!("{to} is not a native destination")))
    }
}

#[async_trait]
impl DestinationOutbound for NativeOutbound {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Native
    }

    async fn send(&self, to: &DestinationId, message: &OutboundMessage) -> Result<MessageId> {
        self.platform.send(&Self::address(to)?, message).await
    }

    async fn edit(
        &self,
        to: &DestinationId,
        id: MessageId,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.platform.edit(&Self::address(to)?, id, message).await
    }

    async fn delete(&self, to: &DestinationId, id: MessageId) -> Result<()> {
        self.platform.delete(&Self::address(to)?, id).await
    }

    async fn typing(&self, to: &DestinationId) -> Result<()> {
        self.platform.typing(&Self::address(to)?).await
    }

    async fn describe(&self, to: &DestinationId) -> String {
        let Some(addr) = to.as_native() else {
            return to.to_string();
        };
        match addr {
            NativeAddress::Direct { user } => match self.platform.user(*user).await {
                Ok(Some(info)) => info.tag,
                _ => format!("<@{user}>"),
            },
            NativeAddress::Channel { .. } => self
                .platform
                .channel_name(addr)
                .await
                .map(|name| format!("#{name}"))
                .unwrap_or_else(|| to.to_string()),
            NativeAddress::Scoped { guild, user, .. } => {
                let channel = self
                    .platform
                    .channel_name(addr)
                    .await
                    .map(|name| format!("#{name}"))
                    .unwrap_or_else(|| addr.home().channel().map_or_else(String::new, |c| c.to_string()));
                match self.platform.member(*guild, *user).await {
                    Ok(Some(member)) => format!("{} in {channel}", member.display_name),
                    _ => format!("<@{user}> in {channel}"),
                }
            },
        }
    }
}
