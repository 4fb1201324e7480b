#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Bridge behaviour against a scripted loopback IRC server.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    rift_channels::{
        DestinationId, DestinationOutbound, EventBus, IrcEvent, IrcEventKind, OutboundMessage,
        Rank, RiftEvent,
    },
    rift_config::{IrcConfig, IrcNetworkConfig},
    rift_irc::{BridgeTimeouts, Error, IrcBridge, IrcOutbound},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, TcpStream},
        sync::mpsc,
    },
};

const DOMAIN: &str = "test.local";

#[derive(Clone, Copy, Default)]
struct Script {
    welcome: bool,
    ack_joins: bool,
    reject_joins: bool,
    nick_taken_once: bool,
}

impl Script {
    fn friendly() -> Self {
        Self {
            welcome: true,
            ack_joins: true,
            ..Default::default()
        }
    }
}

struct FakeServer {
    port: u16,
    lines: mpsc::UnboundedReceiver<String>,
    inject: mpsc::UnboundedSender<String>,
    accepted: Arc<AtomicUsize>,
}

impl FakeServer {
    async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (line_tx, lines) = mpsc::unbounded_channel();
        let (inject, inject_rx) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut inject_rx = Some(inject_rx);
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, script, line_tx.clone(), inject_rx.take()));
            }
        });
        Self {
            port,
            lines,
            inject,
            accepted,
        }
    }

    /// Wait for the first client line starting with `prefix`.
    async fn expect_line(&mut self, prefix: &str) -> String {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let line = self.lines.recv().await.expect("server gone");
                if line.starts_with(prefix) {
                    return line;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no line starting with {prefix:?}"))
    }

    fn send(&self, line: &str) {
        self.inject.send(line.to_string()).unwrap();
    }

    fn bridge(&self, timeouts: BridgeTimeouts) -> Arc<IrcBridge> {
        let mut config = IrcConfig::default();
        config.networks.insert(DOMAIN.into(), IrcNetworkConfig {
            host: Some("127.0.0.1".into()),
            port: self.port,
            ..Default::default()
        });
        Arc::new(IrcBridge::new(config, timeouts, EventBus::default()))
    }
}

async fn serve(
    socket: TcpStream,
    script: Script,
    lines: mpsc::UnboundedSender<String>,
    mut inject: Option<mpsc::UnboundedReceiver<String>>,
) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read).lines();
    let mut nick = String::new();
    let mut got_user = false;
    let mut welcomed = false;
    let mut refused_nick = false;

    loop {
        let line = tokio::select! {
            line = reader.next_line() => match line {
                Ok(Some(line)) => line,
                _ => return,
            },
            Some(out) = async {
                match inject.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                let _ = write.write_all(format!("{out}\r\n").as_bytes()).await;
                continue;
            },
        };
        let _ = lines.send(line.clone());

        let (command, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let mut replies = Vec::new();
        match command {
            "NICK" if script.nick_taken_once && !refused_nick => {
                refused_nick = true;
                replies.push(format!(":fake 433 * {arg} :Nickname is already in use"));
            },
            "NICK" => nick = arg.to_string(),
            "USER" => got_user = true,
            "JOIN" if script.reject_joins => {
                replies.push(format!(":fake 474 {nick} {arg} :Cannot join channel (+b)"));
            },
            "JOIN" if script.ack_joins => {
                replies.push(format!(":{nick}!u@h JOIN {arg}"));
                replies.push(format!(":fake 353 {nick} = {arg} :{nick} @alice +bob"));
                replies.push(format!(":fake 366 {nick} {arg} :End of /NAMES list."));
            },
            _ => {},
        }
        if script.welcome && got_user && !nick.is_empty() && !welcomed {
            welcomed = true;
            replies.push(format!(":fake 001 {nick} :Welcome to the fake network"));
        }
        for reply in replies {
            let _ = write.write_all(format!("{reply}\r\n").as_bytes()).await;
        }
    }
}

fn short(connect_ms: u64, join_ms: u64) -> BridgeTimeouts {
    BridgeTimeouts {
        connect: Duration::from_millis(connect_ms),
        join: Duration::from_millis(join_ms),
    }
}

#[tokio::test]
async fn registers_and_joins() {
    let mut server = FakeServer::start(Script::friendly()).await;
    let bridge = server.bridge(BridgeTimeouts::default());

    bridge.ensure_joined(DOMAIN, "#Rift").await.unwrap();

    assert_eq!(server.expect_line("NICK").await, "NICK rift");
    assert_eq!(server.expect_line("USER").await, "USER rift 0 * :rift relay");
    assert_eq!(server.expect_line("JOIN").await, "JOIN #Rift");
    assert!(bridge.is_joined(DOMAIN, "#rift"));
    assert_eq!(bridge.domains(), vec![DOMAIN.to_string()]);

    // already joined: no second JOIN line
    bridge.ensure_joined(DOMAIN, "#rift").await.unwrap();
    server.send("PING :marker");
    assert_eq!(server.expect_line("PONG").await, "PONG marker");
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() {
    let server = FakeServer::start(Script::friendly()).await;
    let bridge = server.bridge(BridgeTimeouts::default());

    let (a, b) = tokio::join!(
        bridge.ensure_connected(DOMAIN),
        bridge.ensure_connected(DOMAIN)
    );
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_timeout_discards_attempt() {
    let server = FakeServer::start(Script::default()).await;
    let bridge = server.bridge(short(200, 200));

    let err = bridge.ensure_connected(DOMAIN).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionTimeout { .. }), "{err}");
    assert!(bridge.domains().is_empty());
    assert!(bridge.connection(DOMAIN).is_none());
}

#[tokio::test]
async fn join_timeout_leaves_channel_unjoined() {
    let server = FakeServer::start(Script {
        welcome: true,
        ..Default::default()
    })
    .await;
    let bridge = server.bridge(short(5_000, 200));

    let err = bridge.ensure_joined(DOMAIN, "#test").await.unwrap_err();
    assert!(matches!(err, Error::JoinTimeout { .. }), "{err}");
    assert!(!bridge.is_joined(DOMAIN, "#test"));
    // the connection itself survives a join timeout
    assert!(bridge.connection(DOMAIN).is_some());
}

#[tokio::test]
async fn refused_join_fails_fast() {
    let server = FakeServer::start(Script {
        welcome: true,
        reject_joins: true,
        ..Default::default()
    })
    .await;
    let bridge = server.bridge(short(5_000, 5_000));

    let err = bridge.ensure_joined(DOMAIN, "#banned").await.unwrap_err();
    match err {
        Error::JoinRejected { channel, reason, .. } => {
            assert_eq!(channel, "#banned");
            assert!(reason.contains("+b"));
        },
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn joins_many_channels_in_parallel() {
    let server = FakeServer::start(Script::friendly()).await;
    let bridge = server.bridge(BridgeTimeouts::default());

    let channels = vec!["#a".to_string(), "#b".to_string(), "#c".to_string()];
    let results = bridge.ensure_joined_all(DOMAIN, &channels).await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    for channel in &channels {
        assert!(bridge.is_joined(DOMAIN, channel));
    }
}

#[tokio::test]
async fn nick_in_use_retries_with_suffix() {
    let mut server = FakeServer::start(Script {
        nick_taken_once: true,
        ..Script::friendly()
    })
    .await;
    let bridge = server.bridge(BridgeTimeouts::default());

    let conn = bridge.ensure_connected(DOMAIN).await.unwrap();
    assert_eq!(conn.nick(), "rift_");
    assert_eq!(server.expect_line("NICK").await, "NICK rift");
    assert_eq!(server.expect_line("NICK").await, "NICK rift_");
}

#[tokio::test]
async fn channel_messages_reach_the_bus_with_rank() {
    let server = FakeServer::start(Script::friendly()).await;
    let bridge = server.bridge(BridgeTimeouts::default());
    let mut events = bridge.bus().subscribe();

    bridge.ensure_joined(DOMAIN, "#rift").await.unwrap();
    server.send(":rift!u@h PRIVMSG #rift :our own echo");
    server.send(":alice!a@h PRIVMSG #rift :hello there");

    let event = events
        .wait_for(|e| matches!(e, RiftEvent::Message(_)), Duration::from_secs(5))
        .await
        .unwrap();
    let RiftEvent::Message(message) = event else {
        unreachable!()
    };
    assert_eq!(message.content, "hello there");
    assert_eq!(message.location, DestinationId::irc(DOMAIN, "#rift"));
    assert_eq!(message.author.name, "alice");
    assert_eq!(message.author.rank, Rank::Operator);
}

#[tokio::test]
async fn outbound_sends_one_privmsg_per_line() {
    let mut server = FakeServer::start(Script::friendly()).await;
    let bridge = server.bridge(BridgeTimeouts::default());
    let outbound = IrcOutbound::new(Arc::clone(&bridge));

    let to = DestinationId::irc(DOMAIN, "#rift");
    let first = outbound
        .send(&to, &OutboundMessage::text("line one\nline two"))
        .await
        .unwrap();
    let second = outbound
        .send(&to, &OutboundMessage::text("again"))
        .await
        .unwrap();
    assert_ne!(first, second);

    assert_eq!(server.expect_line("JOIN").await, "JOIN #rift");
    assert_eq!(server.expect_line("PRIVMSG").await, "PRIVMSG #rift :line one");
    assert_eq!(server.expect_line("PRIVMSG").await, "PRIVMSG #rift :line two");
    assert_eq!(server.expect_line("PRIVMSG").await, "PRIVMSG #rift again");
}

#[tokio::test]
async fn disconnect_quits_and_publishes() {
    let mut server = FakeServer::start(Script::friendly()).await;
    let bridge = server.bridge(BridgeTimeouts::default());
    let mut events = bridge.bus().subscribe();

    bridge.ensure_connected(DOMAIN).await.unwrap();
    assert!(bridge.disconnect(DOMAIN));
    assert!(!bridge.disconnect(DOMAIN));

    assert!(server.expect_line("QUIT").await.contains("rift closing"));
    let event = events
        .wait_for(
            |e| {
                matches!(
                    e,
                    RiftEvent::Irc(IrcEvent {
                        kind: IrcEventKind::Disconnected { .. },
                        ..
                    })
                )
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(
        event,
        RiftEvent::Irc(IrcEvent {
            domain: DOMAIN.into(),
            kind: IrcEventKind::Disconnected { expected: true },
        })
    );
}
