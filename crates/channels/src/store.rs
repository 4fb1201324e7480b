use {
    async_trait::async_trait,
    rift_common::types::{ChannelId, GuildId, UserId},
    std::{collections::HashSet, sync::RwLock},
};

use crate::{
    destination::{DestinationId, NativeAddress},
    error::Result,
};

/// Persistent relay flags: blocklists and the operator notify toggle.
///
/// Lookups have no side effects. A destination is blocklisted when its own
/// flag is set or, for guild channels, when its guild is.
#[async_trait]
pub trait RiftStore: Send + Sync {
    async fn is_channel_blocklisted(&self, channel: ChannelId) -> Result<bool>;
    async fn is_guild_blocklisted(&self, guild: GuildId) -> Result<bool>;
    async fn is_user_blocklisted(&self, user: UserId) -> Result<bool>;

    /// Flip the flag and return the new value.
    async fn toggle_channel(&self, channel: ChannelId) -> Result<bool>;
    async fn toggle_guild(&self, guild: GuildId) -> Result<bool>;
    async fn toggle_user(&self, user: UserId) -> Result<bool>;

    async fn notify(&self) -> Result<bool>;
    async fn set_notify(&self, notify: bool) -> Result<()>;

    async fn is_destination_blocklisted(&self, destination: &DestinationId) -> Result<bool> {
        match destination {
            DestinationId::Native(NativeAddress::Direct { user }) => {
                self.is_user_blocklisted(*user).await
            },
            DestinationId::Native(
                NativeAddress::Channel { guild, channel } | NativeAddress::Scoped { guild, channel, .. },
            ) => Ok(self.is_guild_blocklisted(*guild).await?
                || self.is_channel_blocklisted(*channel).await?),
            DestinationId::Irc(_) => Ok(false),
        }
    }
}

/// Process-local [`RiftStore`].
pub struct InMemoryRiftStore {
    channels: RwLock<HashSet<ChannelId>>,
    guilds: RwLock<HashSet<GuildId>>,
    users: RwLock<HashSet<UserId>>,
    notify: RwLock<bool>,
}

impl InMemoryRiftStore {
    pub fn new(notify: bool) -> Self {
        Self {
            channels: RwLock::default(),
            guilds: RwLock::default(),
            users: RwLock::default(),
            notify: RwLock::new(notify),
        }
    }
}

impl Default for InMemoryRiftStore {
    fn default() -> Self {
        Self::new(true)
    }
}

fn contains<T: Eq + std::hash::Hash>(set: &RwLock<HashSet<T>>, value: &T) -> bool {
    set.read()
        .unwrap_or_else(|e| e.into_inner())
        .contains(value)
}

fn toggle<T: Eq + std::hash::Hash>(set: &RwLock<HashSet<T>>, value: T) -> bool {
    let mut set = set.write().unwrap_or_else(|e| e.into_inner());
    if set.remove(&value) {
        false
    } else {
        set.insert(value);
        true
    }
}

#[async_trait]
impl RiftStore for InMemoryRiftStore {
    async fn is_channel_blocklisted(&self, channel: ChannelId) -> Result<bool> {
        Ok(contains(&self.channels, &channel))
    }

    async fn is_guild_blocklisted(&self, guild: GuildId) -> Result<bool> {
        Ok(contains(&self.guilds, &guild))
    }

    async fn is_user_blocklisted(&self, user: UserId) -> Result<bool> {
        Ok(contains(&self.users, &user))
    }

    async fn toggle_channel(&self, channel: ChannelId) -> Result<bool> {
        Ok(toggle(&self.channels, channel))
    }

    async fn toggle_guild(&self, guild: GuildId) -> Result<bool> {
        Ok(toggle(&self.guilds, guild))
    }

    async fn toggle_user(&self, user: UserId) -> Result<bool> {
        Ok(toggle(&self.users, user))
    }

    async fn notify(&self) -> Result<bool> {
        Ok(*self.notify.read().unwrap_or_else(|e| e.into_inner()))
    }

    async fn set_notify(&self, notify: bool) -> Result<()> {
        *self.notify.write().unwrap_or_else(|e| e.into_inner()) = notify;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggles_flip() {
        let store = InMemoryRiftStore::default();
        assert!(store.toggle_channel(ChannelId(2)).await.unwrap());
        assert!(store.is_channel_blocklisted(ChannelId(2)).await.unwrap());
        assert!(!store.toggle_channel(ChannelId(2)).await.unwrap());
        assert!(!store.is_channel_blocklisted(ChannelId(2)).await.unwrap());
    }

    #[tokio::test]
    async fn guild_flag_covers_its_channels() {
        let store = InMemoryRiftStore::default();
        store.toggle_guild(GuildId(1)).await.unwrap();
        let channel = DestinationId::channel(1u64, 2u64);
        let scoped = DestinationId::scoped(1u64, 2u64, 3u64);
        let other = DestinationId::channel(9u64, 2u64);
        assert!(store.is_destination_blocklisted(&channel).await.unwrap());
        assert!(store.is_destination_blocklisted(&scoped).await.unwrap());
        assert!(!store.is_destination_blocklisted(&other).await.unwrap());
    }

    #[tokio::test]
    async fn user_flag_covers_dms_only() {
        let store = InMemoryRiftStore::default();
        store.toggle_user(UserId(5)).await.unwrap();
        assert!(
            store
                .is_destination_blocklisted(&DestinationId::direct(5u64))
                .await
                .unwrap()
        );
        assert!(
            !store
                .is_destination_blocklisted(&DestinationId::irc("irc.libera.chat", "#a"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn notify_round_trips() {
        let store = InMemoryRiftStore::new(false);
        assert!(!store.notify().await.unwrap());
        store.set_notify(true).await.unwrap();
        assert!(store.notify().await.unwrap());
    }
}
