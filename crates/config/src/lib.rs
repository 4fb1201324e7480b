//! Configuration loading, validation and env substitution.
//!
//! Config files: `rift.toml`, `rift.yaml`, or `rift.json`
//! Searched in `./` then `~/.config/rift/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        DEFAULT_IRC_PORT, IrcConfig, IrcNetworkConfig, OneWayMode, RelayConfig, RiftConfig,
        StaticRift, TimeoutsConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
