//! Broadcast groups: which Links may send and which receive in one relay.

use std::sync::Arc;

use {
    futures::future::join_all,
    rift_channels::DestinationId,
    rift_common::types::UserRef,
    rift_config::OneWayMode,
};

use crate::link::Link;

/// A set of Links forming one broadcast domain. Membership is by identity.
#[derive(Clone)]
pub struct Nexus {
    links: Vec<Arc<Link>>,
    one_way: OneWayMode,
}

impl Nexus {
    pub fn new(links: impl IntoIterator<Item = Arc<Link>>, one_way: OneWayMode) -> Self {
        let mut nexus = Self {
            links: Vec::new(),
            one_way,
        };
        for link in links {
            nexus.insert(link);
        }
        nexus
    }

    pub fn insert(&mut self, link: Arc<Link>) {
        if !self.contains(&link) {
            self.links.push(link);
        }
    }

    pub fn contains(&self, link: &Arc<Link>) -> bool {
        self.links.iter().any(|l| Arc::ptr_eq(l, link))
    }

    pub fn links(&self) -> &[Arc<Link>] {
        &self.links
    }

    /// `from` is a member, passes its own policy and, under
    /// [`OneWayMode::SuppressOutbound`], is not flagged one-way.
    pub fn can_send(&self, from: &Arc<Link>, user: &UserRef) -> bool {
        if !self.contains(from) || !from.policy_allows(user) {
            return false;
        }
        !(self.one_way == OneWayMode::SuppressOutbound && from.is_one_way())
    }

    fn accepts(&self, link: &Arc<Link>, user: &UserRef) -> bool {
        if self.one_way == OneWayMode::SuppressInbound && link.is_one_way() {
            return false;
        }
        link.policy_allows(user)
    }

    /// Members other than `from` that admit `user`.
    pub fn receivers(&self, from: &Arc<Link>, user: &UserRef) -> Vec<Arc<Link>> {
        if !self.can_send(from, user) {
            return Vec::new();
        }
        self.links
            .iter()
            .filter(|l| !Arc::ptr_eq(l, from) && self.accepts(l, user))
            .cloned()
            .collect()
    }

    /// Run `send` for every receiver concurrently and collect each outcome.
    pub async fn forward<F, Fut, T>(
        &self,
        from: &Arc<Link>,
        user: &UserRef,
        send: F,
    ) -> Vec<(DestinationId, T)>
    where
        F: Fn(DestinationId) -> Fut,
        Fut: Future<Output = T>,
    {
        let sends = self.receivers(from, user).into_iter().map(|link| {
            let destination = link.destination().clone();
            let fut = send(destination.clone());
            async move { (destination, fut.await) }
        });
        join_all(sends).await
    }
}

/// A [`Nexus`] with one canonical origin.
#[derive(Clone)]
pub struct SourcedNexus {
    nexus: Nexus,
    source: Arc<Link>,
}

impl SourcedNexus {
    /// The source becomes a member if it is not one already.
    pub fn new(
        source: Arc<Link>,
        links: impl IntoIterator<Item = Arc<Link>>,
        one_way: OneWayMode,
    ) -> Self {
        let mut nexus = Nexus::new(links, one_way);
        nexus.insert(Arc::clone(&source));
        Self { nexus, source }
    }

    pub fn source(&self) -> &Arc<Link> {
        &self.source
    }

    pub fn can_send(&self, user: &UserRef) -> bool {
        self.nexus.can_send(&self.source, user)
    }

    pub fn receivers(&self, user: &UserRef) -> Vec<Arc<Link>> {
        self.nexus.receivers(&self.source, user)
    }

    /// Members other than the source.
    pub fn targets(&self) -> usize {
        self.nexus.links().len() - 1
    }

    pub async fn forward<F, Fut, T>(&self, user: &UserRef, send: F) -> Vec<(DestinationId, T)>
    where
        F: Fn(DestinationId) -> Fut,
        Fut: Future<Output = T>,
    {
        self.nexus.forward(&self.source, user, send).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::link::{LinkRegistry, ListChange},
    };

    fn user(id: u64) -> UserRef {
        UserRef::native(id)
    }

    fn three(registry: &LinkRegistry) -> (Arc<Link>, Arc<Link>, Arc<Link>) {
        (
            registry.link(&DestinationId::channel(1u64, 1u64)),
            registry.link(&DestinationId::channel(1u64, 2u64)),
            registry.link(&DestinationId::irc("irc.libera.chat", "#rift")),
        )
    }

    #[test]
    fn source_must_be_a_member_and_pass_its_policy() {
        let registry = LinkRegistry::new();
        let (a, b, c) = three(&registry);
        let nexus = Nexus::new([Arc::clone(&a), Arc::clone(&b)], OneWayMode::default());
        assert!(nexus.can_send(&a, &user(1)));
        assert!(!nexus.can_send(&c, &user(1)));

        a.blacklist(&ListChange::default().add(user(1)));
        assert!(!nexus.can_send(&a, &user(1)));
    }

    #[test]
    fn receivers_skip_source_and_denying_links() {
        let registry = LinkRegistry::new();
        let (a, b, c) = three(&registry);
        c.whitelist(&ListChange::default().add(user(2)));
        let nexus = SourcedNexus::new(Arc::clone(&a), [b, c], OneWayMode::default());
        assert_eq!(nexus.targets(), 2);

        let to: Vec<_> = nexus
            .receivers(&user(1))
            .iter()
            .map(|l| l.destination().clone())
            .collect();
        assert_eq!(to, vec![DestinationId::channel(1u64, 2u64)]);
        assert_eq!(nexus.receivers(&user(2)).len(), 2);
    }

    #[test]
    fn one_way_modes() {
        let registry = LinkRegistry::new();
        let (a, b, _) = three(&registry);
        b.set_one_way(true);

        let inbound = Nexus::new([Arc::clone(&a), Arc::clone(&b)], OneWayMode::SuppressInbound);
        assert!(inbound.receivers(&a, &user(1)).is_empty());
        assert_eq!(inbound.receivers(&b, &user(1)).len(), 1);

        let outbound = Nexus::new([Arc::clone(&a), Arc::clone(&b)], OneWayMode::SuppressOutbound);
        assert_eq!(outbound.receivers(&a, &user(1)).len(), 1);
        assert!(!outbound.can_send(&b, &user(1)));
    }

    #[test]
    fn duplicate_links_are_one_member() {
        let registry = LinkRegistry::new();
        let (a, _, _) = three(&registry);
        let again = registry.link(a.destination());
        let nexus = Nexus::new([Arc::clone(&a), again], OneWayMode::default());
        assert_eq!(nexus.links().len(), 1);
    }

    #[tokio::test]
    async fn forward_collects_every_outcome() {
        let registry = LinkRegistry::new();
        let (a, b, c) = three(&registry);
        let nexus = SourcedNexus::new(a, [b, c], OneWayMode::default());
        let mut results = nexus
            .forward(&user(1), |to| async move { to.is_direct() })
            .await;
        results.sort();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, direct)| !direct));
    }
}
