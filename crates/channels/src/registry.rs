use {
    rift_common::types::MessageId,
    std::{collections::HashMap, sync::Arc},
    tracing::trace,
};

use crate::{
    destination::{DestinationId, DestinationKind},
    error::{Error, Result},
    message::OutboundMessage,
    outbound::DestinationOutbound,
};

/// Routes destination operations to the outbound registered for the
/// destination's kind.
#[derive(Clone, Default)]
pub struct OutboundRouter {
    outbounds: HashMap<DestinationKind, Arc<dyn DestinationOutbound>>,
}

impl OutboundRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outbound, replacing any previous one of the same kind.
    pub fn register(&mut self, outbound: Arc<dyn DestinationOutbound>) {
        self.outbounds.insert(outbound.kind(), outbound);
    }

    #[must_use]
    pub fn with(mut self, outbound: Arc<dyn DestinationOutbound>) -> Self {
        self.register(outbound);
        self
    }

    pub fn get(&self, kind: DestinationKind) -> Option<&Arc<dyn DestinationOutbound>> {
        self.outbounds.get(&kind)
    }

    pub fn kinds(&self) -> Vec<DestinationKind> {
        self.outbounds.keys().copied().collect()
    }

    fn route(&self, to: &DestinationId) -> Result<&Arc<dyn DestinationOutbound>> {
        self.get(to.kind())
            .ok_or_else(|| Error::unavailable(format!("no {} outbound registered", to.kind())))
    }

    pub async fn send(&self, to: &DestinationId, message: &OutboundMessage) -> Result<MessageId> {
        trace!(destination = %to, "routing send");
        self.route(to)?.send(to, message).await
    }

    pub async fn edit(
        &self,
        to: &DestinationId,
        id: MessageId,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.route(to)?.edit(to, id, message).await
    }

    pub async fn delete(&self, to: &DestinationId, id: MessageId) -> Result<()> {
        self.route(to)?.delete(to, id).await
    }

    pub async fn typing(&self, to: &DestinationId) -> Result<()> {
        self.route(to)?.typing(to).await
    }

    /// Describe a destination, falling back to its canonical form when no
    /// outbound is registered for it.
    pub async fn describe(&self, to: &DestinationId) -> String {
        match self.get(to.kind()) {
            Some(outbound) => outbound.describe(to).await,
            None => to.to_string(),
        }
    }
}
