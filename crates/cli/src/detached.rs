//! Native platform stand-in for runs without a native gateway attached.
//!
//! Every native send is refused as unavailable, so only IRC destinations
//! carry traffic.

use {
    async_trait::async_trait,
    rift_channels::{
        ChannelInfo, Error, GuildInfo, MemberInfo, NativeAddress, NativePlatform, OutboundMessage,
        Permissions, Result,
    },
    rift_common::types::{GuildId, MessageId, UserId},
};

pub struct DetachedPlatform;

fn detached() -> Error {
    Error::unavailable("no native platform attached")
}

#[async_trait]
impl NativePlatform for DetachedPlatform {
    fn bot_user(&self) -> UserId {
        UserId(0)
    }

    async fn send(&self, _to: &NativeAddress, _message: &OutboundMessage) -> Result<MessageId> {
        Err(detached())
    }

    async fn edit(
        &self,
        _to: &NativeAddress,
        _id: MessageId,
        _message: &OutboundMessage,
    ) -> Result<()> {
        Err(detached())
    }

    async fn delete(&self, _to: &NativeAddress, _id: MessageId) -> Result<()> {
        Err(detached())
    }

    async fn typing(&self, _to: &NativeAddress) -> Result<()> {
        Ok(())
    }

    async fn permissions(&self, _at: &NativeAddress, _user: UserId) -> Result<Permissions> {
        Err(detached())
    }

    async fn bot_permissions(&self, _at: &NativeAddress) -> Result<Permissions> {
        Err(detached())
    }

    async fn member(&self, _guild: GuildId, _user: UserId) -> Result<Option<MemberInfo>> {
        Ok(None)
    }

    async fn user(&self, _user: UserId) -> Result<Option<MemberInfo>> {
        Ok(None)
    }

    async fn is_operator(&self, _user: UserId) -> bool {
        false
    }

    async fn user_allowed(&self, _user: UserId) -> bool {
        true
    }

    async fn embeds_requested(&self, _at: &NativeAddress) -> bool {
        false
    }

    async fn guilds(&self) -> Result<Vec<GuildInfo>> {
        Ok(Vec::new())
    }

    async fn text_channels(&self, _guild: GuildId) -> Result<Vec<ChannelInfo>> {
        Ok(Vec::new())
    }

    async fn members(&self, _guild: GuildId) -> Result<Vec<MemberInfo>> {
        Ok(Vec::new())
    }

    async fn channel_name(&self, _at: &NativeAddress) -> Option<String> {
        None
    }
}
