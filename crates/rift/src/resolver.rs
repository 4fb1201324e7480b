//! Turning user-supplied text into destinations.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    rift_channels::{
        DestinationId, EventBus, NativePlatform, OutboundMessage, OutboundRouter, RiftEvent,
        RiftStore,
    },
    rift_common::types::UserRef,
    rift_irc::IrcBridge,
    tracing::debug,
};

use crate::{
    commands::Invocation,
    error::{Error, Resolution, Result},
};

pub struct Resolver {
    platform: Arc<dyn NativePlatform>,
    store: Arc<dyn RiftStore>,
    router: OutboundRouter,
    bus: EventBus,
    bridge: Option<Arc<IrcBridge>>,
    timeout: Duration,
}

impl Resolver {
    pub fn new(
        platform: Arc<dyn NativePlatform>,
        store: Arc<dyn RiftStore>,
        router: OutboundRouter,
        bus: EventBus,
        timeout: Duration,
    ) -> Self {
        Self {
            platform,
            store,
            router,
            bus,
            bridge: None,
            timeout,
        }
    }

    /// Accept `irc:<domain>/<target>` queries through `bridge`.
    #[must_use]
    pub fn with_bridge(mut self, bridge: Arc<IrcBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Destinations matching `query`. Operators always search every guild;
    /// everyone else only the current one unless `globally`. IRC queries
    /// connect and join before returning.
    pub async fn search(
        &self,
        invocation: &Invocation,
        query: &str,
        globally: bool,
    ) -> Result<Vec<DestinationId>> {
        let query = query.trim();
        if query.starts_with("irc:") {
            let destination: DestinationId =
                query.parse().map_err(|_| Error::not_found(query))?;
            self.prepare_irc(&destination).await?;
            return Ok(vec![destination]);
        }

        let is_operator = match &invocation.author.user {
            UserRef::Native { id } => self.platform.is_operator(*id).await,
            UserRef::Irc { .. } => false,
        };
        let current = invocation.location.guild();
        let guilds = if globally || is_operator {
            self.platform
                .guilds()
                .await?
                .into_iter()
                .map(|g| g.id)
                .collect()
        } else {
            match current {
                Some(guild) => vec![guild],
                None => return Ok(Vec::new()),
            }
        };

        let channel_query = query.trim_start_matches('#');
        let user_query = query.trim_start_matches('@');
        let mut found: Vec<DestinationId> = Vec::new();
        for guild in guilds {
            if self.store.is_guild_blocklisted(guild).await? {
                continue;
            }
            for channel in self.platform.text_channels(guild).await? {
                let destination = DestinationId::channel(guild, channel.id);
                if destination == invocation.location
                    || self.store.is_channel_blocklisted(channel.id).await?
                {
                    continue;
                }
                let id = channel.id.to_string();
                if channel_query == id
                    || query == format!("<#{id}>")
                    || channel_query == channel.name
                {
                    found.push(destination);
                }
            }
            for member in self.platform.members(guild).await? {
                if member.is_bot
                    || invocation.author.user == UserRef::native(member.id)
                    || self.store.is_user_blocklisted(member.id).await?
                {
                    continue;
                }
                let id = member.id.to_string();
                let matches = user_query == id
                    || user_query == format!("<@{id}>")
                    || user_query == format!("<@!{id}>")
                    || user_query == member.tag
                    || user_query == member.name
                    || (current == Some(guild) && user_query == member.display_name);
                let destination = DestinationId::direct(member.id);
                if matches
                    && !found.contains(&destination)
                    && self.platform.user_allowed(member.id).await
                {
                    found.push(destination);
                }
            }
        }
        debug!(query, results = found.len(), "destination search");
        Ok(found)
    }

    async fn prepare_irc(&self, destination: &DestinationId) -> Result<()> {
        let (Some(addr), Some(bridge)) = (destination.as_irc(), self.bridge.as_ref()) else {
            return Err(Error::invalid_input("IRC destinations are not available."));
        };
        if addr.is_channel() {
            bridge.ensure_joined(addr.domain(), addr.target()).await?;
        } else {
            bridge.ensure_connected(addr.domain()).await?;
        }
        Ok(())
    }

    /// Pick one destination: none is an error, one is taken as is, several
    /// prompt the invoker for a numeric choice.
    pub async fn disambiguate(
        &self,
        invocation: &Invocation,
        query: &str,
        mut candidates: Vec<DestinationId>,
    ) -> Result<DestinationId> {
        match candidates.len() {
            0 => return Err(Error::not_found(query)),
            1 => return Ok(candidates.remove(0)),
            _ => {},
        }

        let guild_names: HashMap<_, _> = self
            .platform
            .guilds()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|g| (g.id, g.name))
            .collect();
        let mut lines = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let name = self.router.describe(candidate).await;
            let line = match candidate.guild().and_then(|g| guild_names.get(&g)) {
                Some(guild) => format!("{i}: {name} ({candidate}), in {guild}"),
                None => format!("{i}: {name} ({candidate})"),
            };
            lines.push(line);
        }

        // subscribe before prompting so a quick reply is not missed
        let mut events = self.bus.subscribe();
        self.router
            .send(
                &invocation.location,
                &OutboundMessage::text(format!(
                    "Multiple results found. Choose a destination:\n\n{}",
                    lines.join("\n")
                )),
            )
            .await?;

        let count = candidates.len();
        let choice = |event: &RiftEvent| match event {
            RiftEvent::Message(m)
                if m.author.user == invocation.author.user
                    && m.location == invocation.location =>
            {
                m.content.trim().parse::<usize>().ok().filter(|i| *i < count)
            },
            _ => None,
        };
        let index = events
            .wait_for(|event| choice(event).is_some(), self.timeout)
            .await
            .as_ref()
            .and_then(choice);
        match index.and_then(|i| candidates.get(i)) {
            Some(picked) => Ok(picked.clone()),
            None => {
                debug!(query, "no destination selected");
                Err(Resolution::NoSelection.into())
            },
        }
    }

    pub async fn resolve(
        &self,
        invocation: &Invocation,
        query: &str,
        globally: bool,
    ) -> Result<DestinationId> {
        let candidates = self.search(invocation, query, globally).await?;
        self.disambiguate(invocation, query, candidates).await
    }

    /// Resolve several queries one after another, dropping duplicates.
    pub async fn resolve_all(
        &self,
        invocation: &Invocation,
        queries: &[String],
        globally: bool,
    ) -> Result<Vec<DestinationId>> {
        let mut out = Vec::with_capacity(queries.len());
        for query in queries {
            let destination = self.resolve(invocation, query, globally).await?;
            if !out.contains(&destination) {
                out.push(destination);
            }
        }
        Ok(out)
    }
}
