//! Per-destination access policy and its identity-deduplicated registry.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, RwLock, Weak},
};

use {
    rift_channels::DestinationId,
    rift_common::types::UserRef,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

/// A batch of list edits. Built from single users or batches; see
/// [`Link::whitelist`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChange {
    pub add: BTreeSet<UserRef>,
    pub remove: BTreeSet<UserRef>,
}

impl ListChange {
    #[must_use]
    pub fn add(mut self, user: UserRef) -> Self {
        self.add.insert(user);
        self
    }

    #[must_use]
    pub fn add_all(mut self, users: impl IntoIterator<Item = UserRef>) -> Self {
        self.add.extend(users);
        self
    }

    #[must_use]
    pub fn remove(mut self, user: UserRef) -> Self {
        self.remove.insert(user);
        self
    }

    #[must_use]
    pub fn remove_all(mut self, users: impl IntoIterator<Item = UserRef>) -> Self {
        self.remove.extend(users);
        self
    }

    /// Adding and removing the same users is nonsensical and ignored.
    pub fn is_noop(&self) -> bool {
        self.add == self.remove
    }

    fn apply(&self, list: &mut BTreeSet<UserRef>) -> bool {
        if self.is_noop() {
            return false;
        }
        list.extend(self.add.iter().cloned());
        for user in &self.remove {
            list.remove(user);
        }
        true
    }
}

/// Which access list an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyList {
    Whitelist,
    Blacklist,
}

#[derive(Debug, Default)]
struct Policy {
    whitelist: BTreeSet<UserRef>,
    blacklist: BTreeSet<UserRef>,
    one_way: bool,
}

/// Access policy of one destination.
#[derive(Debug)]
pub struct Link {
    destination: DestinationId,
    policy: RwLock<Policy>,
}

impl Link {
    fn new(destination: DestinationId) -> Self {
        Self {
            destination,
            policy: RwLock::new(Policy::default()),
        }
    }

    pub fn destination(&self) -> &DestinationId {
        &self.destination
    }

    /// A non-empty whitelist admits only its members; otherwise a non-empty
    /// blacklist rejects its members; otherwise everyone passes.
    pub fn policy_allows(&self, user: &UserRef) -> bool {
        let policy = self.policy.read().unwrap_or_else(|e| e.into_inner());
        if !policy.whitelist.is_empty() {
            return policy.whitelist.contains(user);
        }
        !policy.blacklist.contains(user)
    }

    /// Apply `change` to the whitelist. Returns whether anything was applied.
    pub fn whitelist(&self, change: &ListChange) -> bool {
        self.edit(PolicyList::Whitelist, change)
    }

    /// Apply `change` to the blacklist. Returns whether anything was applied.
    pub fn blacklist(&self, change: &ListChange) -> bool {
        self.edit(PolicyList::Blacklist, change)
    }

    pub fn edit(&self, list: PolicyList, change: &ListChange) -> bool {
        let mut policy = self.policy.write().unwrap_or_else(|e| e.into_inner());
        let target = match list {
            PolicyList::Whitelist => &mut policy.whitelist,
            PolicyList::Blacklist => &mut policy.blacklist,
        };
        let applied = change.apply(target);
        debug!(destination = %self.destination, ?list, applied, "access list edited");
        applied
    }

    pub fn whitelisted(&self) -> Vec<UserRef> {
        let policy = self.policy.read().unwrap_or_else(|e| e.into_inner());
        policy.whitelist.iter().cloned().collect()
    }

    pub fn blacklisted(&self) -> Vec<UserRef> {
        let policy = self.policy.read().unwrap_or_else(|e| e.into_inner());
        policy.blacklist.iter().cloned().collect()
    }

    pub fn is_one_way(&self) -> bool {
        self.policy.read().unwrap_or_else(|e| e.into_inner()).one_way
    }

    pub fn set_one_way(&self, one_way: bool) {
        self.policy.write().unwrap_or_else(|e| e.into_inner()).one_way = one_way;
    }
}

/// Hands out at most one live [`Link`] per destination.
///
/// Entries are weak: a Link lives as long as someone holds it (the engine
/// pins Links of every graph vertex). Dead entries are dropped by
/// [`LinkRegistry::sweep`] and on lookup.
#[derive(Default)]
pub struct LinkRegistry {
    links: Mutex<HashMap<DestinationId, Weak<Link>>>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live Link for `destination`, created when there is none.
    pub fn link(&self, destination: &DestinationId) -> Arc<Link> {
        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = links.get(destination).and_then(Weak::upgrade) {
            return existing;
        }
        let link = Arc::new(Link::new(destination.clone()));
        links.insert(destination.clone(), Arc::downgrade(&link));
        link
    }

    /// The live Link for `destination`, without creating one.
    pub fn get(&self, destination: &DestinationId) -> Option<Arc<Link>> {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(destination)
            .and_then(Weak::upgrade)
    }

    /// Forget entries whose Link is gone. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        let before = links.len();
        links.retain(|_, link| link.strong_count() > 0);
        before - links.len()
    }

    /// Number of live Links.
    pub fn len(&self) -> usize {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|link| link.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
