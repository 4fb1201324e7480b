//! User-facing relay operations. Destinations arrive already resolved;
//! every operation returns the confirmation text for the invoker.

use std::{collections::BTreeSet, fmt, str::FromStr, sync::Arc};

use {
    futures::future::join_all,
    rift_channels::{Author, DestinationId, InboundMessage, NativeAddress},
    rift_common::types::UserRef,
    serde::Serialize,
    tracing::{debug, info},
};

use crate::{
    engine::{RelayEngine, scoped_vertex},
    error::{Error, Result},
    link::{ListChange, PolicyList},
};

/// Who invoked a command, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub author: Author,
    pub location: DestinationId,
}

impl Invocation {
    pub fn new(author: Author, location: DestinationId) -> Self {
        Self { author, location }
    }

    /// The vertex the invoker's own messages flow out of: scoped in guild
    /// channels, the location elsewhere.
    pub fn personal_source(&self) -> DestinationId {
        scoped_vertex(&self.location, &self.author.user).unwrap_or_else(|| self.location.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Author,
    Channel,
    Guild,
    Global,
}

impl FromStr for SearchScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" | "member" | "author" => Ok(Self::Author),
            "channel" => Ok(Self::Channel),
            "guild" | "server" => Ok(Self::Guild),
            "global" => Ok(Self::Global),
            _ => Err(Error::invalid_input(
                "Invalid scope. Scope must be author, channel, guild, server, or global.",
            )),
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Author => "author",
            Self::Channel => "channel",
            Self::Guild => "guild",
            Self::Global => "global",
        })
    }
}

/// One open rift found by [`RiftCommands::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiftInfo {
    pub source: DestinationId,
    pub destination: DestinationId,
    pub bidirectional: bool,
}

pub struct RiftCommands {
    engine: Arc<RelayEngine>,
}

fn blocklist_state(now: bool) -> &'static str {
    if now { "now" } else { "no longer" }
}

fn rifts_closed(closed: usize) -> String {
    if closed == 0 {
        "No rifts were found that lead to here.".to_string()
    } else {
        format!("{closed} rifts that lead here have been closed.")
    }
}

impl RiftCommands {
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RelayEngine> {
        &self.engine
    }

    async fn require_closer(&self, invocation: &Invocation) -> Result<()> {
        if self
            .engine
            .can_close(&invocation.location, &invocation.author)
            .await
        {
            Ok(())
        } else {
            Err(Error::message(
                "You need the Manage Channels permission here to do that.",
            ))
        }
    }

    async fn require_operator(&self, invocation: &Invocation) -> Result<()> {
        if self.engine.is_operator(&invocation.author.user).await {
            Ok(())
        } else {
            Err(Error::message("Only bot operators can do that."))
        }
    }

    async fn is_admin(&self, invocation: &Invocation) -> bool {
        let UserRef::Native { id } = &invocation.author.user else {
            return false;
        };
        if self.engine.platform().is_operator(*id).await {
            return true;
        }
        match invocation.location.as_native() {
            Some(at) => self
                .engine
                .platform()
                .permissions(&at.home(), *id)
                .await
                .is_ok_and(|p| p.administrator),
            None => false,
        }
    }

    /// Drop the invoker's own location, duplicates and blocklisted targets.
    async fn admissible(
        &self,
        invocation: &Invocation,
        targets: &[DestinationId],
    ) -> Result<Vec<DestinationId>> {
        let home = invocation.location.home();
        let mut out: Vec<DestinationId> = Vec::with_capacity(targets.len());
        for target in targets {
            if target.home() == home || out.contains(target) {
                continue;
            }
            if self.engine.store().is_destination_blocklisted(target).await? {
                if targets.len() == 1 {
                    return Err(Error::Blocklisted {
                        destination: target.clone(),
                    });
                }
                debug!(destination = %target, "skipping blocklisted destination");
                continue;
            }
            out.push(target.clone());
        }
        if out.is_empty() {
            let query = targets
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::not_found(query));
        }
        Ok(out)
    }

    async fn describe_all(&self, destinations: &[DestinationId]) -> String {
        let names = join_all(destinations.iter().map(|d| self.engine.router().describe(d))).await;
        names.join(", ")
    }

    /// Operators with notify off stay silent towards places they can read.
    async fn should_notify(&self, invocation: &Invocation, target: &DestinationId) -> bool {
        let UserRef::Native { id } = &invocation.author.user else {
            return true;
        };
        if !self.engine.platform().is_operator(*id).await
            || self.engine.store().notify().await.unwrap_or(true)
        {
            return true;
        }
        let can_read = match target.as_native() {
            Some(NativeAddress::Direct { user }) => user == id,
            Some(addr) => self
                .engine
                .platform()
                .permissions(&addr.home(), *id)
                .await
                .is_ok_and(|p| p.read_messages),
            None => false,
        };
        !can_read
    }

    async fn announce(&self, invocation: &Invocation, notices: Vec<(DestinationId, String)>) {
        join_all(notices.into_iter().map(|(at, text)| async move {
            if self.should_notify(invocation, &at).await {
                self.engine.notice(&at, text).await;
            }
        }))
        .await;
    }

    /// Relay the invoker's messages to `targets`, and their responses back
    /// unless `one_way`.
    pub async fn open(
        &self,
        invocation: &Invocation,
        targets: &[DestinationId],
        one_way: bool,
    ) -> Result<String> {
        let source = invocation.personal_source();
        let targets = self.admissible(invocation, targets).await?;
        self.engine.add_edges(&source, &targets, !one_way);
        info!(source = %source, targets = targets.len(), one_way, "rift opened");

        let from = self.engine.router().describe(&source).await;
        let opener = &invocation.author.display_name;
        let notices = targets
            .iter()
            .map(|t| (t.clone(), format!("{opener} has opened a rift to here from {from}.")))
            .collect();
        self.announce(invocation, notices).await;

        let names = self.describe_all(&targets).await;
        let mut reply = format!(
            "A rift has been opened to {names}! Everything you say will be relayed there."
        );
        if !one_way {
            reply.push_str("\nResponses will be relayed here.");
        }
        reply.push_str(&format!(
            "\nType `{}` to quit.",
            self.engine.config().exit_keyword
        ));
        Ok(reply)
    }

    /// Like [`Self::open`] with the whole channel as the source.
    pub async fn link(
        &self,
        invocation: &Invocation,
        targets: &[DestinationId],
        one_way: bool,
    ) -> Result<String> {
        self.require_closer(invocation).await?;
        let source = invocation.location.clone();
        let targets = self.admissible(invocation, targets).await?;
        self.engine.add_edges(&source, &targets, !one_way);
        info!(source = %source, targets = targets.len(), one_way, "channel linked");

        let from = self.engine.router().describe(&source).await;
        let opener = &invocation.author.display_name;
        let notices = targets
            .iter()
            .map(|t| (t.clone(), format!("{opener} has linked a rift to here from {from}.")))
            .collect();
        self.announce(invocation, notices).await;

        let names = self.describe_all(&targets).await;
        let mut reply = format!(
            "A rift has been linked to {names}! Everything said in this channel will be relayed there."
        );
        if !one_way {
            reply.push_str("\nResponses will be relayed here.");
        }
        Ok(reply)
    }

    /// Fully interconnect the invoker's source with every target.
    pub async fn web(&self, invocation: &Invocation, targets: &[DestinationId]) -> Result<String> {
        self.require_operator(invocation).await?;
        let source = invocation.personal_source();
        let targets = self.admissible(invocation, targets).await?;
        let mut members = vec![source.clone()];
        members.extend(targets.iter().cloned());
        self.engine.link_all(&members);
        info!(members = members.len(), "web opened");

        let opener = &invocation.author.display_name;
        let mut notices = Vec::with_capacity(targets.len());
        for target in &targets {
            let others: Vec<_> = members.iter().filter(|m| *m != target).cloned().collect();
            let others = self.describe_all(&others).await;
            notices.push((
                target.clone(),
                format!("{opener} has opened a web to here, connecting you to {others}."),
            ));
        }
        self.announce(invocation, notices).await;

        let names = self.describe_all(&targets).await;
        Ok(format!(
            "A web has been opened to {names}! Everything you say will be relayed there.\nResponses will be relayed here.\nType `{}` to quit.",
            self.engine.config().exit_keyword
        ))
    }

    /// Relay one message to explicit targets. Edits and deletes of the
    /// message follow it there.
    pub async fn send(&self, message: &InboundMessage, targets: &[DestinationId]) -> Result<String> {
        let invocation = Invocation::new(message.author.clone(), message.location.clone());
        let targets = self.admissible(&invocation, targets).await?;
        let outcome = self.engine.relay(message, &targets).await?;
        if let Some((_, error)) = outcome.failed.first()
            && outcome.delivered.is_empty()
        {
            return Err(Error::message(error.to_string()));
        }
        if outcome.delivered.len() == targets.len() {
            Ok("Your message has been sent.".to_string())
        } else {
            Ok(format!(
                "Your message was sent to {} of {} destinations.",
                outcome.delivered.len(),
                targets.len()
            ))
        }
    }

    /// Close the rifts leading to the invoker's location, or only their own
    /// when they may not close the channel's.
    pub async fn close(&self, invocation: &Invocation) -> Result<String> {
        let target = if self
            .engine
            .can_close(&invocation.location, &invocation.author)
            .await
        {
            invocation.location.clone()
        } else {
            invocation.personal_source()
        };
        let closed = self.engine.close_rifts(&invocation.author, &[target]).await;
        Ok(rifts_closed(closed))
    }

    /// Close rifts to every text channel of the invoker's guild.
    pub async fn close_guild(&self, invocation: &Invocation) -> Result<String> {
        self.require_closer(invocation).await?;
        let channels = self.guild_channels(invocation).await?;
        let closed = self.engine.close_rifts(&invocation.author, &channels).await;
        Ok(rifts_closed(closed))
    }

    async fn guild_channels(&self, invocation: &Invocation) -> Result<Vec<DestinationId>> {
        let guild = invocation
            .location
            .guild()
            .ok_or_else(|| Error::invalid_input("This command can only be used in a server."))?;
        Ok(self
            .engine
            .platform()
            .text_channels(guild)
            .await?
            .into_iter()
            .map(|c| DestinationId::channel(guild, c.id))
            .collect())
    }

    /// Set, or toggle when `notify` is `None`, operator notifications.
    pub async fn set_notify(&self, invocation: &Invocation, notify: Option<bool>) -> Result<String> {
        self.require_operator(invocation).await?;
        let store = self.engine.store();
        let notify = match notify {
            Some(notify) => notify,
            None => !store.notify().await?,
        };
        store.set_notify(notify).await?;
        Ok(if notify {
            "Destinations will be notified when you open or close rifts.".to_string()
        } else {
            "Destinations you can read will no longer be notified when you open or close rifts."
                .to_string()
        })
    }

    /// Toggle the blocklist flag of a channel (the invoker's by default).
    /// Becoming blocklisted closes its rifts.
    pub async fn blocklist_channel(
        &self,
        invocation: &Invocation,
        channel: Option<&DestinationId>,
    ) -> Result<String> {
        self.require_closer(invocation).await?;
        let target = channel.unwrap_or(&invocation.location);
        let Some(NativeAddress::Channel { channel, .. }) = target.as_native() else {
            return Err(Error::invalid_input("Only server channels can be blocklisted."));
        };
        let now = self.engine.store().toggle_channel(*channel).await?;
        if now {
            self.engine
                .close_rifts(&invocation.author, std::slice::from_ref(target))
                .await;
        }
        Ok(format!("Channel is {} blocklisted.", blocklist_state(now)))
    }

    pub async fn blocklist_guild(&self, invocation: &Invocation) -> Result<String> {
        self.require_closer(invocation).await?;
        let guild = invocation
            .location
            .guild()
            .ok_or_else(|| Error::invalid_input("This command can only be used in a server."))?;
        let now = self.engine.store().toggle_guild(guild).await?;
        if now {
            let channels = self.guild_channels(invocation).await?;
            self.engine.close_rifts(&invocation.author, &channels).await;
        }
        Ok(format!("Server is {} blocklisted.", blocklist_state(now)))
    }

    /// Toggle whether the invoker can be reached through rifts in DMs.
    pub async fn blocklist_user(&self, invocation: &Invocation) -> Result<String> {
        let UserRef::Native { id } = &invocation.author.user else {
            return Err(Error::invalid_input("Only native users can be blocklisted."));
        };
        let now = self.engine.store().toggle_user(*id).await?;
        if now {
            self.engine
                .close_rifts(&invocation.author, &[DestinationId::direct(*id)])
                .await;
        }
        Ok(format!("You are {} blocklisted.", blocklist_state(now)))
    }

    /// Edit the whitelist or blacklist of `destination`.
    pub async fn edit_policy(
        &self,
        invocation: &Invocation,
        destination: &DestinationId,
        list: PolicyList,
        change: &ListChange,
    ) -> Result<String> {
        self.require_policy_editor(invocation, destination).await?;
        let name = self.engine.router().describe(destination).await;
        if self.engine.link(destination).edit(list, change) {
            Ok(format!("Access list updated for {name}."))
        } else {
            Ok("Nothing to change.".to_string())
        }
    }

    pub async fn set_one_way(
        &self,
        invocation: &Invocation,
        destination: &DestinationId,
        one_way: bool,
    ) -> Result<String> {
        self.require_policy_editor(invocation, destination).await?;
        self.engine.link(destination).set_one_way(one_way);
        let name = self.engine.router().describe(destination).await;
        Ok(format!(
            "{name} is {} one-way.",
            if one_way { "now" } else { "no longer" }
        ))
    }

    /// Operators edit any policy; closers only their own location's.
    async fn require_policy_editor(
        &self,
        invocation: &Invocation,
        destination: &DestinationId,
    ) -> Result<()> {
        if self.engine.is_operator(&invocation.author.user).await {
            return Ok(());
        }
        if destination.home() != invocation.location.home() {
            return Err(Error::message(
                "You can only change the access policy of this channel.",
            ));
        }
        self.require_closer(invocation).await
    }

    /// Open rifts touching `scope`, each pair listed once.
    pub async fn search(&self, invocation: &Invocation, scope: SearchScope) -> Result<Vec<RiftInfo>> {
        let guild = match scope {
            SearchScope::Global => {
                self.require_operator(invocation).await?;
                None
            },
            SearchScope::Guild => {
                if !self.is_admin(invocation).await {
                    return Err(Error::message(
                        "You need to be an administrator to search this server.",
                    ));
                }
                Some(invocation.location.guild().ok_or_else(|| {
                    Error::invalid_input("This command can only be used in a server.")
                })?)
            },
            SearchScope::Author | SearchScope::Channel => None,
        };
        let personal = invocation.personal_source();
        let home = invocation.location.home();
        let in_scope = |v: &DestinationId| match scope {
            SearchScope::Author => *v == personal,
            SearchScope::Channel => v.home() == home,
            SearchScope::Guild => v.guild() == guild,
            SearchScope::Global => true,
        };

        let edges = self.engine.edges();
        let all: BTreeSet<_> = edges.iter().cloned().collect();
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for (from, to) in edges {
            if !(in_scope(&from) || in_scope(&to)) || seen.contains(&(to.clone(), from.clone())) {
                continue;
            }
            found.push(RiftInfo {
                source: from.clone(),
                destination: to.clone(),
                bidirectional: all.contains(&(to.clone(), from.clone())),
            });
            seen.insert((from, to));
        }
        Ok(found)
    }

    /// [`Self::search`] rendered one rift per line.
    pub async fn search_text(&self, invocation: &Invocation, scope: SearchScope) -> Result<String> {
        let found = self.search(invocation, scope).await?;
        if found.is_empty() {
            return Ok(format!("No rifts are connected to this {scope}."));
        }
        let router = self.engine.router();
        let mut lines = Vec::with_capacity(found.len());
        for rift in &found {
            let arrow = if rift.bidirectional { "⟷" } else { "⟶" };
            lines.push(format!(
                "{} {arrow} {}",
                router.describe(&rift.source).await,
                router.describe(&rift.destination).await
            ));
        }
        Ok(lines.join("\n"))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("user", SearchScope::Author)]
    #[case("Member", SearchScope::Author)]
    #[case("channel", SearchScope::Channel)]
    #[case("server", SearchScope::Guild)]
    #[case("GLOBAL", SearchScope::Global)]
    fn scopes_parse(#[case] raw: &str, #[case] scope: SearchScope) {
        assert_eq!(raw.parse::<SearchScope>().unwrap(), scope);
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let err = "planet".parse::<SearchScope>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid scope. Scope must be author, channel, guild, server, or global."
        );
    }

    #[test]
    fn close_replies() {
        assert_eq!(rifts_closed(0), "No rifts were found that lead to here.");
        assert_eq!(rifts_closed(2), "2 rifts that lead here have been closed.");
    }
}
