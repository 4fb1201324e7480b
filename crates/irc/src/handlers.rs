//! Translation of server lines into session state and bus events.

use std::sync::RwLockWriteGuard;

use {
    rift_channels::{Author, DestinationId, InboundMessage, IrcEventKind, RiftEvent},
    tracing::{debug, info, warn},
};

use crate::{
    connection::IrcConnection,
    message::IrcMessage,
    state::{ConnectionState, NetworkState},
};

const RPL_WELCOME: &str = "001";
const RPL_NAMREPLY: &str = "353";
const ERR_NICKNAMEINUSE: &str = "433";

/// Numerics that refuse a JOIN. The channel is the second parameter.
const JOIN_FAILURES: &[&str] = &["403", "405", "471", "473", "474", "475"];

pub(crate) fn is_channel_name(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Unwrap CTCP: `ACTION` becomes emphasised text, anything else is dropped.
pub(crate) fn ctcp_text(text: &str) -> Option<String> {
    let Some(inner) = text.strip_prefix('\u{1}') else {
        return Some(text.to_string());
    };
    let inner = inner.strip_suffix('\u{1}').unwrap_or(inner);
    inner
        .strip_prefix("ACTION ")
        .map(|action| format!("*{action}*"))
}

impl IrcConnection {
    pub(crate) fn handle_line(&self, line: &str) {
        let msg = match IrcMessage::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(domain = %self.domain, error = %e, "ignoring unparsable line");
                return;
            },
        };

        match msg.command.as_str() {
            "PING" => {
                let _ = self.send(IrcMessage::pong(&msg.params));
            },
            RPL_WELCOME => self.on_welcome(&msg),
            ERR_NICKNAMEINUSE => self.on_nick_in_use(),
            RPL_NAMREPLY => {
                if let (Some(channel), Some(names)) = (msg.param(2), msg.param(3)) {
                    self.network_mut().on_names(channel, names);
                }
            },
            "JOIN" => self.on_join(&msg),
            "PART" => self.on_part(&msg),
            "KICK" => self.on_kick(&msg),
            "QUIT" => self.on_quit(&msg),
            "NICK" => {
                if let (Some(old), Some(new)) = (msg.source_nick(), msg.param(0)) {
                    self.network_mut().on_nick(old, new);
                }
            },
            "MODE" => {
                if let (Some(target), Some(modes)) = (msg.param(0), msg.param(1))
                    && is_channel_name(target)
                {
                    self.network_mut().on_mode(target, modes, &msg.params[2..]);
                }
            },
            "PRIVMSG" => self.on_privmsg(&msg),
            "ERROR" => {
                warn!(domain = %self.domain, reason = msg.param(0).unwrap_or_default(), "server error");
            },
            cmd if JOIN_FAILURES.contains(&cmd) => {
                if let Some(channel) = msg.param(1) {
                    let reason = msg.params.last().cloned().unwrap_or_default();
                    debug!(domain = %self.domain, channel, %reason, "join refused");
                    self.settle_join(channel, Err(reason));
                }
            },
            _ => {},
        }
    }

    fn network_mut(&self) -> RwLockWriteGuard<'_, NetworkState> {
        self.network.write().unwrap_or_else(|e| e.into_inner())
    }

    fn on_welcome(&self, msg: &IrcMessage) {
        let nick = {
            let mut network = self.network_mut();
            if let Some(nick) = msg.param(0) {
                network.nick = nick.to_string();
            }
            network.registered = true;
            network.nick.clone()
        };
        info!(domain = %self.domain, %nick, "connected");
        self.state
            .send_replace(ConnectionState::Connected { nick: nick.clone() });
        self.publish(IrcEventKind::Connected { nick });
    }

    fn on_nick_in_use(&self) {
        let retry = {
            let mut network = self.network_mut();
            if network.registered {
                return;
            }
            network.nick.push('_');
            network.nick.clone()
        };
        debug!(domain = %self.domain, nick = %retry, "nick in use, retrying");
        let _ = self.send(IrcMessage::nick(&retry));
    }

    fn on_join(&self, msg: &IrcMessage) {
        let (Some(nick), Some(channel)) = (msg.source_nick(), msg.param(0)) else {
            return;
        };
        let is_me = {
            let mut network = self.network_mut();
            network.on_join(channel, nick);
            network.is_me(nick)
        };
        debug!(domain = %self.domain, user = nick, channel, "user joined channel");
        if is_me {
            self.settle_join(channel, Ok(()));
        }
        self.publish(IrcEventKind::Joined {
            channel: channel.to_string(),
            nick: nick.to_string(),
        });
    }

    fn on_part(&self, msg: &IrcMessage) {
        let (Some(nick), Some(channel)) = (msg.source_nick(), msg.param(0)) else {
            return;
        };
        self.parted(channel, nick, msg.param(1));
    }

    fn on_kick(&self, msg: &IrcMessage) {
        let (Some(channel), Some(kicked)) = (msg.param(0), msg.param(1)) else {
            return;
        };
        self.parted(channel, kicked, msg.param(2));
    }

    fn parted(&self, channel: &str, nick: &str, reason: Option<&str>) {
        self.network_mut().on_part(channel, nick);
        debug!(domain = %self.domain, user = nick, channel, ?reason, "user left channel");
        self.publish(IrcEventKind::Parted {
            channel: channel.to_string(),
            nick: nick.to_string(),
            reason: reason.map(str::to_string),
        });
    }

    fn on_quit(&self, msg: &IrcMessage) {
        let Some(nick) = msg.source_nick() else {
            return;
        };
        let channels = self.network_mut().on_quit(nick);
        for channel in channels {
            self.publish(IrcEventKind::Parted {
                channel,
                nick: nick.to_string(),
                reason: msg.param(0).map(str::to_string),
            });
        }
    }

    fn on_privmsg(&self, msg: &IrcMessage) {
        let (Some(nick), Some(target), Some(raw)) =
            (msg.source_nick(), msg.param(0), msg.param(1))
        else {
            return;
        };
        let (is_me, rank) = {
            let network = self.network.read().unwrap_or_else(|e| e.into_inner());
            (network.is_me(nick), network.rank_of(target, nick))
        };
        // echo-message and our own relays
        if is_me {
            return;
        }
        let Some(text) = ctcp_text(raw) else {
            return;
        };

        let id = self.next_message_id();
        let location = if is_channel_name(target) {
            DestinationId::irc(&self.domain, target)
        } else {
            DestinationId::irc(&self.domain, nick)
        };
        self.publish(IrcEventKind::Message {
            target: target.to_string(),
            nick: nick.to_string(),
            text: text.clone(),
            id,
        });
        self.bus.publish(RiftEvent::Message(InboundMessage {
            id,
            location,
            author: Author {
                rank,
                ..Author::irc(&self.domain, nick)
            },
            content: text,
            attachments: Vec::new(),
            reference: None,
            mentions_replied: false,
            jump_url: None,
        }));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("plain", Some("plain"))]
    #[case("\u{1}ACTION waves\u{1}", Some("*waves*"))]
    #[case("\u{1}VERSION\u{1}", None)]
    fn ctcp_unwrapping(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(ctcp_text(raw).as_deref(), expected);
    }

    #[test]
    fn channel_names() {
        assert!(is_channel_name("#rust"));
        assert!(is_channel_name("&local"));
        assert!(!is_channel_name("alice"));
    }
}
