//! Per-network session state: registration phase, our nick, and channel
//! membership with ranks.

use std::collections::{BTreeSet, HashMap};

use {rift_channels::Rank, rift_common::casemap::irc_to_lower};

/// Connection lifecycle as observed by waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected { nick: String },
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Member {
    /// Nick as last seen on the wire (not casemapped).
    pub nick: String,
    pub ranks: BTreeSet<Rank>,
}

impl Member {
    pub fn rank(&self) -> Rank {
        self.ranks.iter().next_back().copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    /// Channel name as the server spelled it on JOIN.
    pub name: String,
    pub members: HashMap<String, Member>,
}

/// Session state. Channel and nick keys are casemapped.
#[derive(Debug, Clone, Default)]
pub struct NetworkState {
    pub nick: String,
    pub registered: bool,
    channels: HashMap<String, ChannelState>,
}

impl NetworkState {
    pub fn new(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            ..Default::default()
        }
    }

    pub fn is_me(&self, nick: &str) -> bool {
        irc_to_lower(nick) == irc_to_lower(&self.nick)
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels.contains_key(&irc_to_lower(channel))
    }

    pub fn joined_channels(&self) -> Vec<String> {
        self.channels.values().map(|c| c.name.clone()).collect()
    }

    pub fn channel(&self, channel: &str) -> Option<&ChannelState> {
        self.channels.get(&irc_to_lower(channel))
    }

    pub fn rank_of(&self, channel: &str, nick: &str) -> Rank {
        self.channel(channel)
            .and_then(|c| c.members.get(&irc_to_lower(nick)))
            .map(Member::rank)
            .unwrap_or_default()
    }

    pub fn members(&self, channel: &str) -> Vec<Member> {
        self.channel(channel)
            .map(|c| c.members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply a JOIN. Our own JOIN creates the channel entry.
    pub fn on_join(&mut self, channel: &str, nick: &str) {
        let key = irc_to_lower(channel);
        if self.is_me(nick) {
            self.channels.entry(key.clone()).or_insert_with(|| ChannelState {
                name: channel.to_string(),
                members: HashMap::new(),
            });
        }
        if let Some(state) = self.channels.get_mut(&key) {
            state
                .members
                .entry(irc_to_lower(nick))
                .or_insert_with(|| Member {
                    nick: nick.to_string(),
                    ranks: BTreeSet::new(),
                });
        }
    }

    /// Apply a PART or KICK. Returns whether the nick was a member.
    pub fn on_part(&mut self, channel: &str, nick: &str) -> bool {
        let key = irc_to_lower(channel);
        if self.is_me(nick) {
            return self.channels.remove(&key).is_some();
        }
        self.channels
            .get_mut(&key)
            .is_some_and(|c| c.members.remove(&irc_to_lower(nick)).is_some())
    }

    /// Apply a QUIT. Returns the channels the nick was in.
    pub fn on_quit(&mut self, nick: &str) -> Vec<String> {
        let key = irc_to_lower(nick);
        self.channels
            .values_mut()
            .filter_map(|c| c.members.remove(&key).map(|_| c.name.clone()))
            .collect()
    }

    pub fn on_nick(&mut self, old: &str, new: &str) {
        if self.is_me(old) {
            self.nick = new.to_string();
        }
        let old_key = irc_to_lower(old);
        let new_key = irc_to_lower(new);
        for channel in self.channels.values_mut() {
            if let Some(mut member) = channel.members.remove(&old_key) {
                member.nick = new.to_string();
                channel.members.insert(new_key.clone(), member);
            }
        }
    }

    /// Apply one `RPL_NAMREPLY` (353) names list.
    pub fn on_names(&mut self, channel: &str, names: &str) {
        let Some(state) = self.channels.get_mut(&irc_to_lower(channel)) else {
            return;
        };
        for entry in names.split_whitespace() {
            let nick_start = entry
                .find(|c: char| Rank::from_prefix(c).is_none())
                .unwrap_or(entry.len());
            let (prefixes, nick) = entry.split_at(nick_start);
            // multi-prefix hosts send `nick!user@host` with userhost-in-names
            let nick = nick.split('!').next().unwrap_or(nick);
            if nick.is_empty() {
                continue;
            }
            let member = state
                .members
                .entry(irc_to_lower(nick))
                .or_insert_with(|| Member {
                    nick: nick.to_string(),
                    ranks: BTreeSet::new(),
                });
            member.ranks.extend(prefixes.chars().filter_map(Rank::from_prefix));
        }
    }

    /// Apply a channel MODE change, tracking membership ranks only.
    pub fn on_mode(&mut self, channel: &str, modes: &str, args: &[String]) {
        let Some(state) = self.channels.get_mut(&irc_to_lower(channel)) else {
            return;
        };
        let mut adding = true;
        let mut args = args.iter();
        for mode in modes.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    if let Some(rank) = Rank::from_mode(mode) {
                        let Some(nick) = args.next() else {
                            return;
                        };
                        if let Some(member) = state.members.get_mut(&irc_to_lower(nick)) {
                            if adding {
                                member.ranks.insert(rank);
                            } else {
                                member.ranks.remove(&rank);
                            }
                        }
                    } else if matches!(mode, 'b' | 'e' | 'I' | 'k') || (adding && mode == 'l') {
                        args.next();
                    }
                },
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn joined() -> NetworkState {
        let mut state = NetworkState::new("rift");
        state.on_join("#Rust", "rift");
        state
    }

    #[test]
    fn own_join_creates_channel() {
        let state = joined();
        assert!(state.is_joined("#rust"));
        assert_eq!(state.joined_channels(), vec!["#Rust".to_string()]);
    }

    #[test]
    fn names_reply_sets_ranks() {
        let mut state = joined();
        state.on_names("#rust", "~owner @op +voice plain @+both");
        assert_eq!(state.rank_of("#rust", "owner"), Rank::Owner);
        assert_eq!(state.rank_of("#rust", "OP"), Rank::Operator);
        assert_eq!(state.rank_of("#rust", "voice"), Rank::Voice);
        assert_eq!(state.rank_of("#rust", "plain"), Rank::None);
        assert_eq!(state.rank_of("#rust", "both"), Rank::Operator);
        assert_eq!(state.rank_of("#rust", "stranger"), Rank::None);
    }

    #[test]
    fn mode_changes_update_ranks() {
        let mut state = joined();
        state.on_names("#rust", "alice bob");
        let args = vec!["*!*@spam".to_string(), "alice".to_string(), "bob".to_string()];
        state.on_mode("#rust", "+bo-v", &args);
        assert_eq!(state.rank_of("#rust", "alice"), Rank::Operator);
        state.on_mode("#rust", "-o+h", &["alice".to_string(), "alice".to_string()]);
        assert_eq!(state.rank_of("#rust", "alice"), Rank::HalfOp);
    }

    #[test]
    fn part_quit_and_nick() {
        let mut state = joined();
        state.on_join("#rust", "alice");
        state.on_join("#rust", "bob");
        state.on_nick("alice", "alicia");
        assert_eq!(state.members("#rust").len(), 3);
        assert!(state.on_part("#rust", "alicia"));
        assert_eq!(state.on_quit("bob"), vec!["#Rust".to_string()]);
        assert!(state.on_part("#rust", "rift"));
        assert!(!state.is_joined("#rust"));
    }

    #[test]
    fn own_nick_change_tracked() {
        let mut state = NetworkState::new("rift");
        state.on_nick("rift", "rift_");
        assert!(state.is_me("RIFT_"));
    }
}
