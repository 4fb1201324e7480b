//! One live session with one IRC network.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    futures::{SinkExt, StreamExt},
    rift_channels::{EventBus, IrcEvent, IrcEventKind, RiftEvent},
    rift_common::{casemap::irc_to_lower, types::MessageId},
    secrecy::{ExposeSecret, Secret},
    tokio::{
        net::TcpStream,
        sync::{mpsc, oneshot, watch},
    },
    tokio_util::{codec::Framed, sync::CancellationToken},
    tracing::{debug, info, warn},
};

use crate::{
    codec::LineCodec,
    error::{Error, Result},
    message::IrcMessage,
    state::{ConnectionState, Member, NetworkState},
};

/// Resolves with `Err(reason)` when the server refuses the JOIN.
pub(crate) type JoinWaiter = oneshot::Sender<std::result::Result<(), String>>;

/// Where and as whom to connect.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub domain: String,
    pub host: String,
    pub port: u16,
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub password: Option<Secret<String>>,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("domain", &self.domain)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("nickname", &self.nickname)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Handle to a network session. The socket is owned by a spawned driver
/// task; this handle queues outgoing lines and exposes session state.
pub struct IrcConnection {
    pub(crate) domain: String,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) network: RwLock<NetworkState>,
    pub(crate) pending_joins: Mutex<HashMap<String, Vec<JoinWaiter>>>,
    pub(crate) bus: EventBus,
    pub(crate) ids: Arc<AtomicU64>,
    outgoing: mpsc::UnboundedSender<IrcMessage>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for IrcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcConnection")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl IrcConnection {
    /// Start connecting in the background. The returned handle is in the
    /// `Connecting` state until registration completes or fails.
    pub fn spawn(settings: ConnectionSettings, bus: EventBus, ids: Arc<AtomicU64>) -> Arc<Self> {
        let (outgoing, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let conn = Arc::new(Self {
            domain: settings.domain.clone(),
            state,
            network: RwLock::new(NetworkState::new(settings.nickname.clone())),
            pending_joins: Mutex::new(HashMap::new()),
            bus,
            ids,
            outgoing,
            cancel: CancellationToken::new(),
        });
        let driver = Arc::clone(&conn);
        tokio::spawn(async move { driver.run(settings, rx).await });
        conn
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.borrow(), ConnectionState::Disconnected)
    }

    /// The nick the server currently knows us by.
    pub fn nick(&self) -> String {
        self.network
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .nick
            .clone()
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.network
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_joined(channel)
    }

    pub fn joined_channels(&self) -> Vec<String> {
        self.network
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .joined_channels()
    }

    pub fn members(&self, channel: &str) -> Vec<Member> {
        self.network
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .members(channel)
    }

    /// Queue a line for the server.
    pub fn send(&self, message: IrcMessage) -> Result<()> {
        self.outgoing
            .send(message)
            .map_err(|_| Error::disconnected(&self.domain))
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.send(IrcMessage::privmsg(target, text))
    }

    pub(crate) fn next_message_id(&self) -> MessageId {
        MessageId(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn publish(&self, kind: IrcEventKind) {
        self.bus.publish(RiftEvent::Irc(IrcEvent {
            domain: self.domain.clone(),
            kind,
        }));
    }

    /// Wait until registration completes.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| !matches!(s, ConnectionState::Connecting)),
        )
        .await;
        match waited {
            Err(_) => Err(Error::ConnectionTimeout {
                domain: self.domain.clone(),
                after: timeout,
            }),
            Ok(Ok(state)) if matches!(*state, ConnectionState::Connected { .. }) => Ok(()),
            Ok(_) => Err(Error::disconnected(&self.domain)),
        }
    }

    /// Join `channel` unless already joined, waiting for the server's JOIN
    /// echo. Concurrent joins of one channel share a single JOIN line.
    pub async fn join(&self, channel: &str, timeout: Duration) -> Result<()> {
        let key = irc_to_lower(channel);
        let (tx, rx) = oneshot::channel();
        let first = {
            let mut pending = self
                .pending_joins
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if self.is_joined(channel) {
                return Ok(());
            }
            let waiters = pending.entry(key.clone()).or_default();
            waiters.push(tx);
            waiters.len() == 1
        };
        if first {
            debug!(domain = %self.domain, channel, "joining channel");
            if let Err(e) = self.send(IrcMessage::join(channel)) {
                self.forget_closed_waiters(&key);
                return Err(e);
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(Error::JoinRejected {
                domain: self.domain.clone(),
                channel: channel.to_string(),
                reason,
            }),
            Ok(Err(_)) => Err(Error::disconnected(&self.domain)),
            Err(_) => {
                self.forget_closed_waiters(&key);
                warn!(domain = %self.domain, channel, ?timeout, "join timed out");
                Err(Error::JoinTimeout {
                    domain: self.domain.clone(),
                    channel: channel.to_string(),
                    after: timeout,
                })
            },
        }
    }

    fn forget_closed_waiters(&self, key: &str) {
        let mut pending = self
            .pending_joins
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(waiters) = pending.get_mut(key) {
            waiters.retain(|w| !w.is_closed());
            if waiters.is_empty() {
                pending.remove(key);
            }
        }
    }

    /// Resolve every waiter for `channel`.
    pub(crate) fn settle_join(&self, channel: &str, outcome: std::result::Result<(), String>) {
        let waiters = self
            .pending_joins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&irc_to_lower(channel))
            .unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Send `QUIT` and stop the driver.
    pub fn disconnect(&self, reason: &str) {
        let _ = self.send(IrcMessage::quit(reason));
        self.cancel.cancel();
    }

    /// Stop the driver without saying goodbye.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    async fn run(self: Arc<Self>, settings: ConnectionSettings, mut rx: mpsc::UnboundedReceiver<IrcMessage>) {
        if let Err(e) = self.drive(&settings, &mut rx).await {
            warn!(domain = %self.domain, error = %e, "irc connection failed");
        }
        let expected = self.cancel.is_cancelled();
        self.state.send_replace(ConnectionState::Disconnected);
        // dropping the senders wakes every waiter with a disconnect
        self.pending_joins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        info!(domain = %self.domain, expected, "client disconnected");
        self.publish(IrcEventKind::Disconnected { expected });
    }

    async fn drive(
        &self,
        settings: &ConnectionSettings,
        rx: &mut mpsc::UnboundedReceiver<IrcMessage>,
    ) -> Result<()> {
        info!(domain = %self.domain, host = %settings.host, port = settings.port, "connecting");
        let stream = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            stream = TcpStream::connect((settings.host.as_str(), settings.port)) => stream?,
        };
        let mut framed = Framed::new(stream, LineCodec::default());

        if let Some(password) = &settings.password {
            framed.send(IrcMessage::pass(password.expose_secret())).await?;
        }
        framed.send(IrcMessage::nick(&settings.nickname)).await?;
        framed
            .send(IrcMessage::user(&settings.username, &settings.realname))
            .await?;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    while let Ok(message) = rx.try_recv() {
                        let _ = framed.send(message).await;
                    }
                    return Ok(());
                },
                Some(message) = rx.recv() => match framed.send(message).await {
                    Err(Error::LineTooLong { actual, limit }) => {
                        warn!(domain = %self.domain, actual, limit, "dropping oversized outgoing line");
                    },
                    other => other?,
                },
                line = framed.next() => match line {
                    Some(Ok(line)) => self.handle_line(&line),
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            }
        }
    }
}
