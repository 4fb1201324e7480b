use {async_trait::async_trait, rift_common::types::MessageId};

use crate::{
    destination::{DestinationId, DestinationKind},
    error::Result,
    message::OutboundMessage,
};

/// Send path for one kind of destination.
#[async_trait]
pub trait DestinationOutbound: Send + Sync {
    /// The destination kind this outbound serves.
    fn kind(&self) -> DestinationKind;

    /// Post a message, returning the identifier it got at the destination.
    async fn send(&self, to: &DestinationId, message: &OutboundMessage) -> Result<MessageId>;

    async fn edit(&self, to: &DestinationId, id: MessageId, message: &OutboundMessage)
    -> Result<()>;

    async fn delete(&self, to: &DestinationId, id: MessageId) -> Result<()>;

    /// Show a typing indicator. No-op by default.
    async fn typing(&self, _to: &DestinationId) -> Result<()> {
        Ok(())
    }

    /// Human-readable name used in notices and search output.
    async fn describe(&self, to: &DestinationId) -> String {
        to.to_string()
    }
}
