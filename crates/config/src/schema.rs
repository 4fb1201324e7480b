//! Config schema types (relay behaviour, timeouts, IRC networks, static rifts).
use std::{collections::HashMap, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiftConfig {
    pub relay: RelayConfig,
    pub timeouts: TimeoutsConfig,
    pub irc: IrcConfig,
    /// Webs opened at startup. Each entry is a list of destination strings
    /// (e.g. `irc:irc.libera.chat/#rust`) that are fully interconnected.
    pub rifts: Vec<StaticRift>,
}

/// How a Link flagged one-way restricts traffic.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OneWayMode {
    /// The flagged destination sends into the rift but receives nothing.
    #[default]
    SuppressInbound,
    /// The flagged destination receives from the rift but its messages are
    /// not forwarded.
    SuppressOutbound,
}

/// Relay engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Notify destinations when an operator opens or closes a rift to them.
    /// Non-operators always notify.
    pub notify: bool,
    /// A message consisting only of this token (case-insensitive) closes the
    /// rifts of its destination instead of being relayed.
    pub exit_keyword: String,
    /// Maximum number of origin messages whose relayed copies are remembered
    /// for edit/delete replay. Oldest entries are evicted first.
    pub provenance_capacity: usize,
    /// Maximum attachments relayed from one message.
    pub max_attachments: usize,
    /// Interpretation of the one-way flag on a Link.
    pub one_way: OneWayMode,
    /// Report per-destination send failures back to the source.
    pub report_failures: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            notify: true,
            exit_keyword: "exit".into(),
            provenance_capacity: 10_000,
            max_attachments: 25,
            one_way: OneWayMode::default(),
            report_failures: false,
        }
    }
}

/// Bounds on every suspension point of a relay operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Seconds to wait for an IRC network to finish registration.
    pub connect_secs: u64,
    /// Seconds to wait for an IRC JOIN to be acknowledged.
    pub join_secs: u64,
    /// Seconds to wait for the invoker to pick among ambiguous destinations.
    pub disambiguation_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_secs: 60,
            join_secs: 30,
            disambiguation_secs: 30,
        }
    }
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn join(&self) -> Duration {
        Duration::from_secs(self.join_secs)
    }

    pub fn disambiguation(&self) -> Duration {
        Duration::from_secs(self.disambiguation_secs)
    }
}

/// IRC bridge identity and per-network overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    /// Maximum bytes of text per outgoing PRIVMSG line.
    pub message_limit: usize,
    /// Keyed by network domain (e.g. `irc.libera.chat`).
    pub networks: HashMap<String, IrcNetworkConfig>,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            nickname: "rift".into(),
            username: "rift".into(),
            realname: "rift relay".into(),
            message_limit: 400,
            networks: HashMap::new(),
        }
    }
}

impl IrcConfig {
    /// Resolve connection parameters for `domain`, falling back to the
    /// domain itself on the default port when it is not configured.
    pub fn network(&self, domain: &str) -> IrcNetworkConfig {
        let key = domain.to_ascii_lowercase();
        if let Some(cfg) = self
            .networks
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, v)| v)
        {
            return cfg.clone();
        }
        match key.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => IrcNetworkConfig {
                host: Some(host.to_string()),
                port: port.parse().unwrap_or(DEFAULT_IRC_PORT),
                ..Default::default()
            },
            _ => IrcNetworkConfig::default(),
        }
    }
}

pub const DEFAULT_IRC_PORT: u16 = 6667;

/// Connection parameters for one IRC network.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcNetworkConfig {
    /// Host to dial. Defaults to the network domain.
    pub host: Option<String>,
    pub port: u16,
    /// Server password sent with `PASS`.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<Secret<String>>,
    /// Nickname override for this network.
    pub nickname: Option<String>,
}

impl Default for IrcNetworkConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_IRC_PORT,
            password: None,
            nickname: None,
        }
    }
}

impl std::fmt::Debug for IrcNetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcNetworkConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("nickname", &self.nickname)
            .finish()
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// A set of destinations wired together as a full mesh at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticRift {
    pub name: Option<String>,
    pub destinations: Vec<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RiftConfig::default();
        assert!(cfg.relay.notify);
        assert_eq!(cfg.relay.exit_keyword, "exit");
        assert_eq!(cfg.relay.provenance_capacity, 10_000);
        assert_eq!(cfg.relay.one_way, OneWayMode::SuppressInbound);
        assert_eq!(cfg.timeouts.connect(), Duration::from_secs(60));
        assert_eq!(cfg.irc.message_limit, 400);
    }

    #[test]
    fn deserialize_from_toml() {
        let raw = r##"
            [relay]
            notify = false
            one_way = "suppress_outbound"

            [irc]
            nickname = "bridge"

            [irc.networks."irc.libera.chat"]
            port = 6697
            password = "hunter2"

            [[rifts]]
            destinations = ["irc:irc.libera.chat/#a", "irc:irc.oftc.net/#b"]
        "##;
        let cfg: RiftConfig = toml::from_str(raw).unwrap();
        assert!(!cfg.relay.notify);
        assert_eq!(cfg.relay.one_way, OneWayMode::SuppressOutbound);
        assert_eq!(cfg.irc.nickname, "bridge");
        let net = cfg.irc.network("IRC.libera.chat");
        assert_eq!(net.port, 6697);
        assert_eq!(net.password.unwrap().expose_secret(), "hunter2");
        assert_eq!(cfg.rifts[0].destinations.len(), 2);
        // unspecified sections keep their defaults
        assert_eq!(cfg.timeouts.join_secs, 30);
    }

    #[test]
    fn unknown_network_uses_domain_and_inline_port() {
        let cfg = IrcConfig::default();
        assert_eq!(cfg.network("irc.example.org").port, DEFAULT_IRC_PORT);
        let net = cfg.network("irc.example.org:7000");
        assert_eq!(net.host.as_deref(), Some("irc.example.org"));
        assert_eq!(net.port, 7000);
    }

    #[test]
    fn debug_redacts_password() {
        let net = IrcNetworkConfig {
            password: Some(Secret::new("hunter2".into())),
            ..Default::default()
        };
        let dbg = format!("{net:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
