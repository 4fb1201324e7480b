//! Line codec for IRC streams.

use {
    bytes::{BufMut, BytesMut},
    tokio_util::codec::{Decoder, Encoder},
    tracing::warn,
};

use crate::{
    error::{Error, Result},
    message::IrcMessage,
};

/// 512 bytes of message plus the 8191 bytes IRCv3 allows for tags.
pub const MAX_INBOUND_LINE: usize = 512 + 8191;
const MAX_OUTBOUND_LINE: usize = 512;

/// Newline-delimited codec. Inbound lines are decoded lossily (networks
/// still carry latin-1 text) and oversized lines are dropped rather than
/// tearing down the connection.
pub struct LineCodec {
    /// Index of next byte to check for newline.
    next_index: usize,
    max_len: usize,
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::with_max_len(MAX_INBOUND_LINE)
    }
}

impl LineCodec {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }
}

impl Decoder for LineCodec {
    type Error = Error;
    type Item = String;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_len {
                    if !self.discarding {
                        warn!(limit = self.max_len, "dropping oversized IRC line");
                    }
                    src.clear();
                    self.discarding = true;
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if std::mem::take(&mut self.discarding) || line.len() > self.max_len {
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            return Ok(Some(text.to_string()));
        }
    }
}

impl Encoder<IrcMessage> for LineCodec {
    type Error = Error;

    fn encode(&mut self, msg: IrcMessage, dst: &mut BytesMut) -> Result<()> {
        let line = msg.to_string();
        if line.len() + 2 > MAX_OUTBOUND_LINE {
            return Err(Error::LineTooLong {
                actual: line.len() + 2,
                limit: MAX_OUTBOUND_LINE,
            });
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_lines() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :a\r\nPING :b\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :a"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :b"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn waits_for_partial_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"x\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :x"));
    }

    #[test]
    fn drops_oversized_line_and_recovers() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("this is way too long");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" still\r\nPING :ok\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :ok"));
    }

    #[test]
    fn decodes_invalid_utf8_lossily() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"PRIVMSG #a :caf\xe9\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #a :caf"));
    }

    #[test]
    fn encodes_with_crlf() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(IrcMessage::nick("rift"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK rift\r\n");
    }

    #[test]
    fn refuses_oversized_outbound() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        let err = codec
            .encode(IrcMessage::privmsg("#a", &"x".repeat(600)), &mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::LineTooLong { .. }));
        assert!(buf.is_empty());
    }
}
