use std::sync::Arc;

use {
    async_trait::async_trait,
    rift_channels::{
        DestinationId, DestinationKind, DestinationOutbound, Error as ChannelError,
        OutboundMessage, Result as ChannelResult,
    },
    rift_common::types::MessageId,
    tracing::debug,
};

use crate::bridge::IrcBridge;

/// The `<nick> ` author prefix of a relayed line, if it carries one.
fn author_prefix(line: &str) -> Option<&str> {
    let end = line.find("> ")?;
    let nick = line.strip_prefix('<')?.get(..end - 1)?;
    (!nick.is_empty() && !nick.contains(' ')).then(|| &line[..end + 2])
}

/// Cut `line` into pieces of at most `max_len` bytes on char boundaries,
/// preferring the last space.
fn split_line(line: &str, max_len: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = line;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            pieces.push(remaining);
            break;
        }
        let mut window = remaining.floor_char_boundary(max_len);
        if window == 0 {
            window = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }
        let split_at = match remaining[..window].rfind(' ') {
            Some(0) | None => window,
            Some(space) => space,
        };
        pieces.push(&remaining[..split_at]);
        remaining = remaining[split_at..].trim_start_matches(' ');
    }
    pieces
}

/// Split text into PRIVMSG-sized lines: one per input line, long lines cut
/// at `max_len` bytes. A `<nick> ` author prefix is repeated on every piece
/// of its line.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return Vec::new();
    }
    let mut lines = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        match author_prefix(line) {
            Some(prefix) if line.len() > max_len && prefix.len() * 2 <= max_len => {
                let body = line[prefix.len()..].trim_start_matches(' ');
                lines.extend(
                    split_line(body, max_len - prefix.len())
                        .into_iter()
                        .map(|piece| format!("{prefix}{piece}")),
                );
            },
            _ => lines.extend(split_line(line, max_len).into_iter().map(str::to_string)),
        }
    }
    lines
}

/// Outbound for IRC destinations. Sending connects and joins on demand.
/// IRC has no message identity, so edits and deletes are unsupported.
pub struct IrcOutbound {
    bridge: Arc<IrcBridge>,
}

impl IrcOutbound {
    pub fn new(bridge: Arc<IrcBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl DestinationOutbound for IrcOutbound {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Irc
    }

    async fn send(&self, to: &DestinationId, message: &OutboundMessage) -> ChannelResult<MessageId> {
        let addr = to
            .as_irc()
            .ok_or_else(|| ChannelError::invalid_input(format!("{to} is not an IRC destination")))?;
        let lines = split_message(&message.content, self.bridge.message_limit());
        if lines.is_empty() {
            return Err(ChannelError::invalid_input("nothing to send"));
        }

        let conn = self.bridge.ensure_connected(addr.domain()).await?;
        if addr.is_channel() {
            conn.join(addr.target(), self.bridge.timeouts().join).await?;
        }
        debug!(destination = %to, lines = lines.len(), "sending to IRC");
        for line in &lines {
            conn.privmsg(addr.target(), line)?;
        }
        Ok(self.bridge.allocate_id())
    }

    async fn edit(&self, to: &DestinationId, _: MessageId, _: &OutboundMessage) -> ChannelResult<()> {
        Err(ChannelError::unsupported("edit", to))
    }

    async fn delete(&self, to: &DestinationId, _: MessageId) -> ChannelResult<()> {
        Err(ChannelError::unsupported("delete", to))
    }

    async fn describe(&self, to: &DestinationId) -> String {
        match to.as_irc() {
            Some(addr) => format!("{} on {}", addr.target(), addr.domain()),
            None => to.to_string(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rift_channels::EventBus,
        rift_config::IrcConfig,
        crate::bridge::BridgeTimeouts,
    };

    #[test]
    fn short_text_is_one_line() {
        assert_eq!(split_message("hello", 400), vec!["hello"]);
    }

    #[test]
    fn newlines_become_separate_lines() {
        assert_eq!(split_message("a\n\nb\r\nc", 400), vec!["a", "b", "c"]);
    }

    #[test]
    fn long_lines_split_on_spaces() {
        let lines = split_message("aaaa bbbb cccc", 9);
        assert_eq!(lines, vec!["aaaa", "bbbb cccc"]);
        assert!(lines.iter().all(|l| l.len() <= 9));
    }

    #[test]
    fn author_prefix_repeats_on_continuations() {
        let lines = split_message("<@alice> one two three four", 20);
        assert_eq!(lines, vec!["<@alice> one two", "<@alice> three four"]);
        assert!(lines.iter().all(|l| l.len() <= 20));
    }

    #[test]
    fn text_without_author_is_split_plainly() {
        assert_eq!(split_message("plain words here", 11), vec!["plain", "words here"]);
        assert_eq!(author_prefix("<bob> hi"), Some("<bob> "));
        assert_eq!(author_prefix("<not a nick> hi"), None);
        assert_eq!(author_prefix("bob> hi"), None);
    }

    #[test]
    fn splits_respect_char_boundaries() {
        let text = "é".repeat(10);
        let lines = split_message(&text, 5);
        assert!(lines.iter().all(|l| l.len() <= 5));
        assert_eq!(lines.concat(), text);
    }

    #[tokio::test]
    async fn edit_and_delete_are_unsupported() {
        let bridge = Arc::new(IrcBridge::new(
            IrcConfig::default(),
            BridgeTimeouts::default(),
            EventBus::default(),
        ));
        let outbound = IrcOutbound::new(bridge);
        let to = DestinationId::irc("irc.example.org", "#a");
        let err = outbound
            .edit(&to, MessageId(1), &OutboundMessage::text("x"))
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(outbound.delete(&to, MessageId(1)).await.unwrap_err().is_unsupported());
        assert_eq!(outbound.describe(&to).await, "#a on irc.example.org");
    }

    #[tokio::test]
    async fn empty_content_is_rejected_before_connecting() {
        let bridge = Arc::new(IrcBridge::new(
            IrcConfig::default(),
            BridgeTimeouts::default(),
            EventBus::default(),
        ));
        let outbound = IrcOutbound::new(Arc::clone(&bridge));
        let to = DestinationId::irc("irc.example.org", "#a");
        let err = outbound.send(&to, &OutboundMessage::text("  ")).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidInput { .. }));
        assert!(bridge.domains().is_empty());
    }
}
