//! Shared types, error definitions, and utilities used across all rift crates.

pub mod casemap;
pub mod error;
pub mod types;

pub use error::{Error, FromMessage, Result};
