//! Rift relay core.
//!
//! Rifts are directed edges between destinations. Messages arriving at a
//! vertex are adapted per hop and relayed to its neighbors, subject to each
//! endpoint's access policy. Edits and deletes follow the copies through a
//! bounded provenance record.

pub mod adapt;
pub mod commands;
pub mod engine;
pub mod error;
pub mod format;
pub mod graph;
pub mod link;
pub mod nexus;
pub mod provenance;
pub mod resolver;

pub use {
    commands::{Invocation, RiftCommands, RiftInfo, SearchScope},
    engine::{RelayEngine, RelayOutcome},
    error::{Error, Resolution, Result},
    graph::Graph,
    link::{Link, LinkRegistry, ListChange, PolicyList},
    nexus::{Nexus, SourcedNexus},
    provenance::{MessageKey, ProvenanceStore},
    resolver::Resolver,
};
