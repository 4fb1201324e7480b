use std::error::Error as StdError;

use crate::destination::DestinationId;

/// Crate-wide result type for destination operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by every outbound path and collaborator trait.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid destination input: {message}")]
    InvalidInput { message: String },

    /// Operation is currently unavailable (not configured/ready).
    #[error("destination operation unavailable: {message}")]
    Unavailable { message: String },

    /// The destination kind cannot perform this operation at all.
    #[error("{operation} is not supported for {destination}")]
    Unsupported {
        operation: &'static str,
        destination: DestinationId,
    },

    /// The platform refused the operation for lack of permission.
    #[error("missing permissions to reach {destination}")]
    Forbidden { destination: DestinationId },

    /// The destination or message no longer exists.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Wrapped source error from an external dependency.
    #[error("destination operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Common(#[from] rift_common::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unsupported(operation: &'static str, destination: &DestinationId) -> Self {
        Self::Unsupported {
            operation,
            destination: destination.clone(),
        }
    }

    #[must_use]
    pub fn forbidden(destination: &DestinationId) -> Self {
        Self::Forbidden {
            destination: destination.clone(),
        }
    }

    #[must_use]
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what: what.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
