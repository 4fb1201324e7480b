//! Which relayed copies each origin message produced.

use std::collections::{HashMap, VecDeque};

use {rift_channels::DestinationId, rift_common::types::MessageId};

/// A message as seen in one destination.
pub type MessageKey = (DestinationId, MessageId);

/// Bounded origin -> copies map with reverse lookup.
///
/// When more than `capacity` origins are tracked the oldest is evicted along
/// with its copies.
#[derive(Debug)]
pub struct ProvenanceStore {
    capacity: usize,
    copies: HashMap<MessageKey, Vec<MessageKey>>,
    origins: HashMap<MessageKey, MessageKey>,
    order: VecDeque<MessageKey>,
}

impl ProvenanceStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            copies: HashMap::new(),
            origins: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn record(&mut self, origin: MessageKey, copy: MessageKey) {
        if !self.copies.contains_key(&origin) {
            self.order.push_back(origin.clone());
        }
        self.origins.insert(copy.clone(), origin.clone());
        self.copies.entry(origin).or_default().push(copy);

        while self.copies.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.forget(&oldest);
        }
    }

    pub fn copies(&self, origin: &MessageKey) -> Vec<MessageKey> {
        self.copies.get(origin).cloned().unwrap_or_default()
    }

    /// Remove and return the copies of `origin`.
    pub fn take(&mut self, origin: &MessageKey) -> Vec<MessageKey> {
        let copies = self.forget(origin);
        if !copies.is_empty() {
            self.order.retain(|key| key != origin);
        }
        copies
    }

    fn forget(&mut self, origin: &MessageKey) -> Vec<MessageKey> {
        let copies = self.copies.remove(origin).unwrap_or_default();
        for copy in &copies {
            self.origins.remove(copy);
        }
        copies
    }

    pub fn origin_of(&self, copy: &MessageKey) -> Option<&MessageKey> {
        self.origins.get(copy)
    }

    /// The message standing for `reference` at `at`: its copy there, its
    /// origin when the origin lives there, or a sibling copy.
    pub fn counterpart(&self, reference: &MessageKey, at: &DestinationId) -> Option<MessageId> {
        let at = at.home();
        let in_copies = |origin: &MessageKey| {
            self.copies.get(origin).and_then(|copies| {
                copies
                    .iter()
                    .find(|(dest, _)| dest.home() == at)
                    .map(|(_, id)| *id)
            })
        };
        if let Some(id) = in_copies(reference) {
            return Some(id);
        }
        let origin = self.origins.get(reference)?;
        if origin.0.home() == at {
            return Some(origin.1);
        }
        in_copies(origin)
    }

    pub fn len(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }
}
