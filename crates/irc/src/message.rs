//! IRC message parsing and serialization (RFC 1459 framing, IRCv3 tags
//! tolerated and kept raw).

use std::fmt;

use crate::error::{Error, Result};

/// Message source: `nick!user@host` or a bare server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    pub fn parse(raw: &str) -> Self {
        let (nick_user, host) = match raw.split_once('@') {
            Some((left, host)) => (left, Some(host.to_string())),
            None => (raw, None),
        };
        let (nick, user) = match nick_user.split_once('!') {
            Some((nick, user)) => (nick, Some(user.to_string())),
            None => (nick_user, None),
        };
        Self {
            nick: nick.to_string(),
            user,
            host,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: Option<String>,
    pub prefix: Option<Prefix>,
    /// Uppercased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn new<I, S>(command: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: None,
            prefix: None,
            command: command.to_ascii_uppercase(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn pass(password: &str) -> Self {
        Self::new("PASS", [password])
    }

    pub fn nick(nick: &str) -> Self {
        Self::new("NICK", [nick])
    }

    pub fn user(username: &str, realname: &str) -> Self {
        Self::new("USER", [username, "0", "*", realname])
    }

    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", [channel])
    }

    pub fn part(channel: &str) -> Self {
        Self::new("PART", [channel])
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", [target, text])
    }

    pub fn pong(params: &[String]) -> Self {
        Self::new("PONG", params.iter().cloned())
    }

    pub fn quit(reason: &str) -> Self {
        Self::new("QUIT", [reason])
    }

    /// Parse one line, with or without its trailing CRLF.
    pub fn parse(line: &str) -> Result<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return Err(Error::parse(line, "empty line"));
        }

        let mut tags = None;
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw, after) = stripped
                .split_once(' ')
                .ok_or_else(|| Error::parse(line, "tags without command"))?;
            tags = Some(raw.to_string());
            rest = after.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw, after) = stripped
                .split_once(' ')
                .ok_or_else(|| Error::parse(line, "prefix without command"))?;
            prefix = Some(Prefix::parse(raw));
            rest = after.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(Error::parse(line, "missing command"));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                },
                None => {
                    params.push(rest.to_string());
                    break;
                },
            }
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().map(|p| p.nick.as_str())
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Serializes without the trailing CRLF. CR, LF and NUL inside parameters
/// are replaced with spaces so a parameter can never smuggle a second
/// command onto the wire.
impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = &self.tags {
            write!(f, "@{tags} ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let clean: String = param
                .chars()
                .map(|c| if matches!(c, '\r' | '\n' | '\0') { ' ' } else { c })
                .collect();
            let needs_trailing = clean.is_empty() || clean.contains(' ') || clean.starts_with(':');
            if i == last && needs_trailing {
                write!(f, " :{clean}")?;
            } else {
                write!(f, " {}", clean.replace(' ', "_"))?;
            }
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn parses_privmsg_with_prefix() {
        let msg = IrcMessage::parse(":alice!al@host.example PRIVMSG #rust :hello there\r\n").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.source_nick(), Some("alice"));
        let prefix = msg.prefix.as_ref().unwrap();
        assert_eq!(prefix.user.as_deref(), Some("al"));
        assert_eq!(prefix.host.as_deref(), Some("host.example"));
        assert_eq!(msg.params, vec!["#rust", "hello there"]);
    }

    #[test]
    fn parses_tags_and_numeric() {
        let msg = IrcMessage::parse("@time=2024-01-01T00:00:00Z :irc.example 001 rift :Welcome").unwrap();
        assert_eq!(msg.tags.as_deref(), Some("time=2024-01-01T00:00:00Z"));
        assert_eq!(msg.command, "001");
        assert_eq!(msg.param(0), Some("rift"));
        assert_eq!(msg.source_nick(), Some("irc.example"));
    }

    #[test]
    fn parses_without_trailing() {
        let msg = IrcMessage::parse("PING irc.example").unwrap();
        assert_eq!(msg.params, vec!["irc.example"]);
        let names = IrcMessage::parse(":srv 353 rift = #rust :@alice +bob carol").unwrap();
        assert_eq!(names.param(2), Some("#rust"));
        assert_eq!(names.param(3), Some("@alice +bob carol"));
    }

    #[rstest]
    #[case("")]
    #[case("\r\n")]
    #[case(":prefixonly")]
    #[case("@tagsonly")]
    fn rejects_malformed(#[case] line: &str) {
        assert!(IrcMessage::parse(line).is_err());
    }

    #[test]
    fn serializes_trailing_param() {
        assert_eq!(
            IrcMessage::privmsg("#rust", "hi all").to_string(),
            "PRIVMSG #rust :hi all"
        );
        assert_eq!(IrcMessage::join("#rust").to_string(), "JOIN #rust");
        assert_eq!(IrcMessage::user("rift", "rift relay").to_string(), "USER rift 0 * :rift relay");
        assert_eq!(IrcMessage::privmsg("#a", "").to_string(), "PRIVMSG #a :");
    }

    #[test]
    fn serialization_strips_line_breaks() {
        let line = IrcMessage::privmsg("#rust", "one\r\nQUIT :bye").to_string();
        assert!(!line.contains('\r'));
        assert!(!line.contains('\n'));
        assert_eq!(line, "PRIVMSG #rust :one  QUIT :bye");
    }
}
