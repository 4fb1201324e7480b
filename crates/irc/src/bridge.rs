//! The IRC bridge adapter: at most one connection per network domain,
//! created lazily and awaited with a bound.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    futures::future::join_all,
    rift_channels::EventBus,
    rift_common::types::MessageId,
    rift_config::{IrcConfig, TimeoutsConfig},
    tracing::{debug, info},
};

use crate::{
    connection::{ConnectionSettings, IrcConnection},
    error::{Error, Result},
};

/// Bounds for the bridge's suspension points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTimeouts {
    pub connect: Duration,
    pub join: Duration,
}

impl From<&TimeoutsConfig> for BridgeTimeouts {
    fn from(config: &TimeoutsConfig) -> Self {
        Self {
            connect: config.connect(),
            join: config.join(),
        }
    }
}

impl Default for BridgeTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutsConfig::default())
    }
}

pub struct IrcBridge {
    config: IrcConfig,
    timeouts: BridgeTimeouts,
    bus: EventBus,
    connections: Mutex<HashMap<String, Arc<IrcConnection>>>,
    ids: Arc<AtomicU64>,
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

impl IrcBridge {
    pub fn new(config: IrcConfig, timeouts: BridgeTimeouts, bus: EventBus) -> Self {
        Self {
            config,
            timeouts,
            bus,
            connections: Mutex::new(HashMap::new()),
            ids: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn timeouts(&self) -> BridgeTimeouts {
        self.timeouts
    }

    /// Maximum bytes of text per outgoing PRIVMSG.
    pub fn message_limit(&self) -> usize {
        self.config.message_limit
    }

    /// Allocate an identifier for a message we relayed onto IRC.
    pub fn allocate_id(&self) -> MessageId {
        MessageId(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    fn settings(&self, domain: &str) -> ConnectionSettings {
        let network = self.config.network(domain);
        ConnectionSettings {
            domain: domain.to_string(),
            host: network.host.unwrap_or_else(|| domain.to_string()),
            port: network.port,
            nickname: network
                .nickname
                .unwrap_or_else(|| self.config.nickname.clone()),
            username: self.config.username.clone(),
            realname: self.config.realname.clone(),
            password: network.password,
        }
    }

    /// The live (not closed) connection for `domain`, if any.
    pub fn connection(&self, domain: &str) -> Option<Arc<IrcConnection>> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&normalize_domain(domain))
            .filter(|c| !c.is_closed())
            .cloned()
    }

    pub fn domains(&self) -> Vec<String> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, c)| !c.is_closed())
            .map(|(d, _)| d.clone())
            .collect()
    }

    pub fn is_joined(&self, domain: &str, channel: &str) -> bool {
        self.connection(domain)
            .is_some_and(|c| c.is_joined(channel))
    }

    /// Return a registered connection to `domain`, connecting first when
    /// there is none. Concurrent callers for one domain share one attempt.
    /// On failure or timeout the attempt is discarded; a later call starts a
    /// fresh one.
    pub async fn ensure_connected(&self, domain: &str) -> Result<Arc<IrcConnection>> {
        let domain = normalize_domain(domain);
        let conn = {
            let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            match connections.get(&domain) {
                Some(existing) if !existing.is_closed() => Arc::clone(existing),
                _ => {
                    let conn = IrcConnection::spawn(
                        self.settings(&domain),
                        self.bus.clone(),
                        Arc::clone(&self.ids),
                    );
                    connections.insert(domain.clone(), Arc::clone(&conn));
                    conn
                },
            }
        };

        match conn.wait_connected(self.timeouts.connect).await {
            Ok(()) => Ok(conn),
            Err(e) => {
                info!(domain = %domain, error = %e, "discarding failed connection");
                self.discard(&domain, &conn);
                Err(e)
            },
        }
    }

    fn discard(&self, domain: &str, conn: &Arc<IrcConnection>) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if connections
            .get(domain)
            .is_some_and(|current| Arc::ptr_eq(current, conn))
        {
            connections.remove(domain);
        }
        conn.abort();
    }

    /// Connect if needed, then join `channel` if not already joined.
    pub async fn ensure_joined(&self, domain: &str, channel: &str) -> Result<()> {
        let conn = self.ensure_connected(domain).await?;
        conn.join(channel, self.timeouts.join).await
    }

    /// Join several channels on one network in parallel.
    pub async fn ensure_joined_all(
        &self,
        domain: &str,
        channels: &[String],
    ) -> Vec<(String, Result<()>)> {
        let conn = match self.ensure_connected(domain).await {
            Ok(conn) => conn,
            Err(e) => {
                let reason = e.to_string();
                return channels
                    .iter()
                    .map(|c| (c.clone(), Err(Error::message(reason.clone()))))
                    .collect();
            },
        };
        let joins = channels.iter().map(|channel| {
            let conn = Arc::clone(&conn);
            let join = self.timeouts.join;
            async move { (channel.clone(), conn.join(channel, join).await) }
        });
        join_all(joins).await
    }

    /// Send `QUIT` to `domain` and drop the connection. Returns whether a
    /// connection existed.
    pub fn disconnect(&self, domain: &str) -> bool {
        let removed = self
            .connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&normalize_domain(domain));
        match removed {
            Some(conn) => {
                debug!(domain, "disconnecting");
                conn.disconnect("rift closing");
                true
            },
            None => false,
        }
    }

    /// Disconnect every network.
    pub fn shutdown(&self) {
        let connections: Vec<_> = self
            .connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (domain, conn) in connections {
            debug!(%domain, "disconnecting");
            conn.disconnect("rift shutting down");
        }
    }
}
