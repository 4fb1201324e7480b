//! The relay engine: turns inbound events into relayed sends, edits and
//! deletes along the topology graph.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use {
    futures::future::join_all,
    rift_channels::{
        Author, DestinationId, EventSubscription, InboundMessage, NativeAddress, NativePlatform,
        OutboundMessage, OutboundRouter, Permissions, Rank, RiftEvent, RiftStore,
    },
    rift_common::types::{MessageId, UserRef},
    rift_config::RelayConfig,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    adapt::{self, NativeHop},
    error::{Error, Result},
    format::rank_from_permissions,
    graph::Graph,
    link::{Link, LinkRegistry},
    nexus::SourcedNexus,
    provenance::{MessageKey, ProvenanceStore},
};

/// Result of relaying one message.
#[derive(Debug, Default)]
pub struct RelayOutcome {
    pub delivered: Vec<(DestinationId, MessageId)>,
    pub failed: Vec<(DestinationId, Error)>,
    /// Hops skipped by access policy.
    pub denied: Vec<DestinationId>,
}

#[derive(Default)]
struct Topology {
    graph: Graph<DestinationId>,
    /// Links of every vertex with an edge, held so the registry keeps them.
    pinned: HashMap<DestinationId, Arc<Link>>,
}

pub struct RelayEngine {
    config: RelayConfig,
    router: OutboundRouter,
    platform: Arc<dyn NativePlatform>,
    store: Arc<dyn RiftStore>,
    links: LinkRegistry,
    topology: RwLock<Topology>,
    provenance: Mutex<ProvenanceStore>,
}

/// The author-scoped vertex of `user` in a guild channel.
pub(crate) fn scoped_vertex(location: &DestinationId, user: &UserRef) -> Option<DestinationId> {
    match (location.as_native(), user) {
        (Some(NativeAddress::Channel { guild, channel }), UserRef::Native { id }) => {
            Some(DestinationId::scoped(*guild, *channel, *id))
        },
        _ => None,
    }
}

/// Vertices a message posted at `location` by `user` flows out of: the
/// author's scoped vertex, if any, then the location itself.
fn sources_of(location: &DestinationId, user: &UserRef) -> Vec<DestinationId> {
    scoped_vertex(location, user)
        .into_iter()
        .chain([location.clone()])
        .collect()
}

impl RelayEngine {
    pub fn new(
        config: RelayConfig,
        router: OutboundRouter,
        platform: Arc<dyn NativePlatform>,
        store: Arc<dyn RiftStore>,
    ) -> Self {
        let provenance = ProvenanceStore::new(config.provenance_capacity);
        Self {
            config,
            router,
            platform,
            store,
            links: LinkRegistry::new(),
            topology: RwLock::new(Topology::default()),
            provenance: Mutex::new(provenance),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn router(&self) -> &OutboundRouter {
        &self.router
    }

    pub fn platform(&self) -> &Arc<dyn NativePlatform> {
        &self.platform
    }

    pub fn store(&self) -> &Arc<dyn RiftStore> {
        &self.store
    }

    /// The access policy object of `destination`.
    pub fn link(&self, destination: &DestinationId) -> Arc<Link> {
        self.links.link(destination)
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    fn provenance(&self) -> MutexGuard<'_, ProvenanceStore> {
        self.provenance.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Topology ────────────────────────────────────────────────────────────

    /// Apply one graph mutation atomically, then re-pin Links so exactly the
    /// vertices with edges keep theirs.
    fn mutate<R>(&self, f: impl FnOnce(&mut Graph<DestinationId>) -> R) -> R {
        let out = {
            let mut guard = self.topology.write().unwrap_or_else(|e| e.into_inner());
            let topology = &mut *guard;
            let out = f(&mut topology.graph);
            let vertices = topology.graph.vertices();
            topology.pinned.retain(|d, _| vertices.contains(d));
            for vertex in vertices {
                if !topology.pinned.contains_key(&vertex) {
                    let link = self.links.link(&vertex);
                    topology.pinned.insert(vertex, link);
                }
            }
            out
        };
        self.links.sweep();
        out
    }

    pub fn add_edges(&self, source: &DestinationId, targets: &[DestinationId], two_way: bool) {
        debug!(source = %source, targets = targets.len(), two_way, "adding edges");
        self.mutate(|graph| graph.add_edges(source, targets, two_way));
    }

    pub fn link_all(&self, vertices: &[DestinationId]) {
        debug!(vertices = vertices.len(), "linking web");
        self.mutate(|graph| graph.link_all(vertices));
    }

    pub fn unlink_all<'a>(&self, vertices: impl IntoIterator<Item = &'a DestinationId>) {
        self.mutate(|graph| graph.unlink_all(vertices));
    }

    pub fn neighbors_of(&self, vertex: &DestinationId) -> BTreeSet<DestinationId> {
        self.topology
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .graph
            .neighbors_of(vertex)
    }

    pub fn has_edge(&self, from: &DestinationId, to: &DestinationId) -> bool {
        self.topology
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .graph
            .has_edge(from, to)
    }

    pub fn edges(&self) -> Vec<(DestinationId, DestinationId)> {
        self.topology
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .graph
            .edges()
    }

    pub fn vertices(&self) -> BTreeSet<DestinationId> {
        self.topology
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .graph
            .vertices()
    }

    /// Where a message posted at `location` by `user` is relayed to. Never
    /// includes the location itself.
    pub fn destinations_for(&self, location: &DestinationId, user: &UserRef) -> Vec<DestinationId> {
        let topology = self.topology.read().unwrap_or_else(|e| e.into_inner());
        let home = location.home();
        let mut out: Vec<DestinationId> = Vec::new();
        for source in sources_of(location, user) {
            for neighbor in topology.graph.neighbors_of(&source) {
                if neighbor.home() != home && !out.contains(&neighbor) {
                    out.push(neighbor);
                }
            }
        }
        out
    }

    // ── Provenance ──────────────────────────────────────────────────────────

    /// Copies relayed from the message `id` posted at `location`.
    pub fn copies_of(&self, location: &DestinationId, id: MessageId) -> Vec<MessageKey> {
        self.provenance().copies(&(location.clone(), id))
    }

    pub(crate) fn record(&self, origin: MessageKey, copy: MessageKey) {
        self.provenance().record(origin, copy);
    }

    // ── Event loop ──────────────────────────────────────────────────────────

    /// Consume events until the bus closes or `cancel` fires. Each event is
    /// handled on its own task so slow hops never stall the loop.
    pub async fn run(self: Arc<Self>, mut events: EventSubscription, cancel: CancellationToken) {
        info!("relay engine started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let engine = Arc::clone(&self);
            tokio::spawn(async move { engine.handle_event(event).await });
        }
        info!("relay engine stopped");
    }

    pub async fn handle_event(&self, event: RiftEvent) {
        match event {
            RiftEvent::Message(message) => self.on_message(&message).await,
            RiftEvent::Edited(message) => self.on_edit(&message).await,
            RiftEvent::Deleted { location, id } => self.on_delete(&location, id).await,
            RiftEvent::BulkDeleted { location, ids } => {
                join_all(ids.iter().map(|id| self.on_delete(&location, *id))).await;
            },
            RiftEvent::Typing {
                location,
                user,
                is_bot,
            } => {
                if !is_bot {
                    self.on_typing(&location, &user).await;
                }
            },
            RiftEvent::Irc(_) => {},
        }
    }

    fn is_exit(&self, content: &str) -> bool {
        is_exit_keyword(content, &self.config.exit_keyword)
    }

    async fn on_message(&self, message: &InboundMessage) {
        if message.author.is_bot || !message.has_payload() {
            return;
        }
        let destinations = self.destinations_for(&message.location, &message.author.user);
        if destinations.is_empty() {
            return;
        }

        if self.is_exit(&message.content) {
            let target = if self.can_close(&message.location, &message.author).await {
                Some(message.location.clone())
            } else {
                scoped_vertex(&message.location, &message.author.user)
            };
            if let Some(target) = target {
                let closed = self.close_rifts(&message.author, &[target]).await;
                if closed > 0 {
                    self.notice(&message.location, format!("{closed} rifts closed."))
                        .await;
                    return;
                }
            }
        }

        match self.relay(message, &destinations).await {
            Ok(outcome) => debug!(
                location = %message.location,
                message_id = %message.id,
                delivered = outcome.delivered.len(),
                failed = outcome.failed.len(),
                denied = outcome.denied.len(),
                "relayed message"
            ),
            Err(e) if e.is_user_visible() => self.notice(&message.location, e.to_string()).await,
            Err(e) => debug!(location = %message.location, error = %e, "relay skipped"),
        }
    }

    /// Relay `message` to `destinations`, recording provenance for every
    /// copy. Hop failures are logged and collected, never propagated; the
    /// relay only fails when the sender may not use it at all or the single
    /// hop refuses them.
    pub async fn relay(
        &self,
        message: &InboundMessage,
        destinations: &[DestinationId],
    ) -> Result<RelayOutcome> {
        let user = &message.author.user;
        if let UserRef::Native { id } = user
            && !self.platform.user_allowed(*id).await
        {
            return Err(Error::NotPermitted);
        }

        let nexus = SourcedNexus::new(
            self.links.link(&message.location),
            destinations.iter().map(|d| self.links.link(d)),
            self.config.one_way,
        );
        if !nexus.can_send(user) {
            debug!(location = %message.location, %user, "sender denied at source");
            return Err(Error::PolicyDenied {
                destination: message.location.clone(),
            });
        }

        let results = nexus
            .forward(user, |to| async move { self.deliver(message, &to).await })
            .await;

        let mut outcome = RelayOutcome {
            denied: destinations
                .iter()
                .filter(|d| !results.iter().any(|(to, _)| to == *d))
                .cloned()
                .collect(),
            ..Default::default()
        };
        let origin: MessageKey = (message.location.clone(), message.id);
        for (to, result) in results {
            match result {
                Ok(id) => {
                    // keyed by where the copy is visible, so replies to it resolve
                    self.record(origin.clone(), (to.home(), id));
                    outcome.delivered.push((to, id));
                },
                Err(e) => {
                    self.hop_failed(message, &to, &e).await;
                    outcome.failed.push((to, e));
                },
            }
        }

        if let [only] = outcome.denied.as_slice()
            && destinations.len() == 1
        {
            debug!(destination = %only, %user, "only hop denied by policy");
            return Err(Error::PolicyDenied {
                destination: only.clone(),
            });
        }
        Ok(outcome)
    }

    async fn deliver(&self, message: &InboundMessage, to: &DestinationId) -> Result<MessageId> {
        let outbound = self.adapt(message, to).await?;
        self.router
            .send(to, &outbound)
            .await
            .map_err(|e| Error::dispatch(to, e))
    }

    /// Adapt `message` for the kind of `to`.
    pub(crate) async fn adapt(
        &self,
        message: &InboundMessage,
        to: &DestinationId,
    ) -> Result<OutboundMessage> {
        match to.as_native() {
            Some(addr) => {
                let hop = self.native_hop(message, addr, to).await?;
                adapt::for_native(message, &hop)
            },
            None => adapt::for_irc(message, self.rank_of(message).await, self.config.max_attachments),
        }
    }

    async fn native_hop(
        &self,
        message: &InboundMessage,
        addr: &NativeAddress,
        to: &DestinationId,
    ) -> Result<NativeHop> {
        let home = addr.home();
        let bot = self.platform.bot_permissions(&home).await?;
        let (is_operator, author) = match &message.author.user {
            UserRef::Native { id } => {
                if self.platform.is_operator(*id).await {
                    (true, Permissions::all())
                } else {
                    (false, self.platform.permissions(&home, *id).await?)
                }
            },
            UserRef::Irc { .. } => (false, Permissions::default()),
        };
        let embeds = bot.embed_links && self.platform.embeds_requested(&home).await;
        let reply_to = message.reference.and_then(|reference| {
            self.provenance()
                .counterpart(&(message.location.clone(), reference), to)
        });
        Ok(NativeHop {
            is_operator,
            author,
            both: author.intersect(bot),
            embeds,
            max_attachments: self.config.max_attachments,
            reply_to,
        })
    }

    /// Rank marker source: IRC channel modes as reported, native permissions
    /// at the source otherwise.
    async fn rank_of(&self, message: &InboundMessage) -> Rank {
        let author = &message.author;
        let (UserRef::Native { id }, Some(at)) = (&author.user, message.location.as_native())
        else {
            return author.rank;
        };
        if author.rank != Rank::None {
            return author.rank;
        }
        let is_operator = self.platform.is_operator(*id).await;
        let permissions = self
            .platform
            .permissions(&at.home(), *id)
            .await
            .unwrap_or_default();
        rank_from_permissions(permissions, is_operator)
    }

    async fn hop_failed(&self, message: &InboundMessage, to: &DestinationId, error: &Error) {
        match error {
            Error::NothingToRelay => {
                debug!(destination = %to, message_id = %message.id, "nothing to relay");
                return;
            },
            Error::Forbidden { .. } => {
                info!(destination = %to, "relay forbidden");
                self.forget_unreachable(to).await;
                return;
            },
            _ => warn!(destination = %to, message_id = %message.id, error = %error, "relay failed"),
        }
        if self.config.report_failures || error.is_user_visible() {
            let reason = match error {
                Error::Dispatch { source, .. } => source.to_string(),
                other => other.to_string(),
            };
            let name = self.router.describe(to).await;
            self.notice(
                &message.location,
                format!("I couldn't send your message to {name}: {reason}"),
            )
            .await;
        }
    }

    /// Drop `to` from the graph when the bot can no longer post there.
    async fn forget_unreachable(&self, to: &DestinationId) {
        let unreachable = match to.as_native() {
            Some(NativeAddress::Direct { .. }) => true,
            Some(addr) => self
                .platform
                .bot_permissions(&addr.home())
                .await
                .map(|p| !p.send_messages)
                .unwrap_or(true),
            None => false,
        };
        if unreachable {
            info!(destination = %to, "removing unreachable destination");
            self.unlink_all([to]);
        }
    }

    async fn on_edit(&self, message: &InboundMessage) {
        if message.author.is_bot {
            return;
        }
        let copies = self.copies_of(&message.location, message.id);
        if copies.is_empty() {
            return;
        }
        let edits = copies.iter().map(|(to, id)| async move {
            let result = match self.adapt(message, to).await {
                Ok(outbound) => self
                    .router
                    .edit(to, *id, &outbound)
                    .await
                    .map_err(|e| Error::dispatch(to, e)),
                Err(e) => Err(e),
            };
            (to, result)
        });
        for (to, result) in join_all(edits).await {
            match result {
                Ok(()) => {},
                Err(Error::Dispatch { source, .. }) if source.is_unsupported() => {
                    debug!(destination = %to, "edit not supported");
                },
                Err(e) => warn!(destination = %to, error = %e, "edit replay failed"),
            }
        }
    }

    async fn on_delete(&self, location: &DestinationId, id: MessageId) {
        let copies = self.provenance().take(&(location.clone(), id));
        let deletes = copies
            .iter()
            .map(|(to, copy)| async move { (to, self.router.delete(to, *copy).await) });
        for (to, result) in join_all(deletes).await {
            match result {
                Ok(()) => {},
                Err(e) if e.is_unsupported() => debug!(destination = %to, "delete not supported"),
                Err(e) => warn!(destination = %to, error = %e, "delete replay failed"),
            }
        }
    }

    async fn on_typing(&self, location: &DestinationId, user: &UserRef) {
        let destinations = self.destinations_for(location, user);
        join_all(destinations.iter().map(|to| self.router.typing(to))).await;
    }

    // ── Shared with commands ────────────────────────────────────────────────

    pub(crate) async fn notice(&self, to: &DestinationId, text: impl Into<String>) {
        if let Err(e) = self.router.send(to, &OutboundMessage::text(text)).await {
            debug!(destination = %to, error = %e, "notice not delivered");
        }
    }

    pub(crate) async fn is_operator(&self, user: &UserRef) -> bool {
        match user {
            UserRef::Native { id } => self.platform.is_operator(*id).await,
            UserRef::Irc { .. } => false,
        }
    }

    /// Whether `author` may close every rift of `location` rather than only
    /// their own.
    pub(crate) async fn can_close(&self, location: &DestinationId, author: &Author) -> bool {
        if location.is_direct() {
            return true;
        }
        match (&author.user, location.as_native()) {
            (UserRef::Native { id }, Some(at)) => {
                if self.platform.is_operator(*id).await {
                    return true;
                }
                self.platform
                    .permissions(&at.home(), *id)
                    .await
                    .is_ok_and(|p| p.administrator || p.manage_channels)
            },
            (UserRef::Native { id }, None) => self.platform.is_operator(*id).await,
            (UserRef::Irc { .. }, _) => author.rank >= Rank::Operator,
        }
    }

    /// Close every rift touching `destinations` and return how many distinct
    /// rifts were closed (`A <-> B` counts once). Closing a channel also
    /// closes the scoped vertices inside it. The far side of each rift is
    /// told who closed it unless an operator closed it with notify off.
    pub async fn close_rifts(&self, closer: &Author, destinations: &[DestinationId]) -> usize {
        let notify = if self.is_operator(&closer.user).await {
            self.store.notify().await.unwrap_or(true)
        } else {
            true
        };

        let (targets, closed, notices) = {
            let topology = self.topology.read().unwrap_or_else(|e| e.into_inner());
            let mut targets: BTreeSet<DestinationId> = destinations.iter().cloned().collect();
            for vertex in topology.graph.vertices() {
                if matches!(vertex.as_native(), Some(NativeAddress::Scoped { .. }))
                    && destinations.contains(&vertex.home())
                {
                    targets.insert(vertex);
                }
            }

            let mut seen = BTreeSet::new();
            let mut closed = 0usize;
            let mut notices = Vec::new();
            for (from, to) in topology.graph.edges() {
                if seen.contains(&(to.clone(), from.clone())) {
                    continue;
                }
                let far_side = if targets.contains(&from) {
                    Some((to.clone(), from.clone()))
                } else if targets.contains(&to) {
                    Some((from.clone(), to.clone()))
                } else {
                    None
                };
                if let Some(notice) = far_side {
                    closed += 1;
                    if notify {
                        notices.push(notice);
                    }
                }
                seen.insert((from, to));
            }
            (targets, closed, notices)
        };

        self.unlink_all(&targets);
        info!(closer = %closer.user, closed, "closed rifts");

        let closer_name = &closer.display_name;
        join_all(notices.iter().map(|(at, source)| async move {
            let source = self.router.describe(source).await;
            self.notice(at, format!("{closer_name} has closed a rift to here from {source}."))
                .await;
        }))
        .await;
        closed
    }
}

/// Whether `content` is the bare exit keyword. Surrounding whitespace is
/// ignored and case is folded with full Unicode lowercasing.
fn is_exit_keyword(content: &str, keyword: &str) -> bool {
    content.trim().to_lowercase() == keyword.to_lowercase()
}
