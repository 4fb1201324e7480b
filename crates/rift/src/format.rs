//! Text helpers for relayed content.

use std::sync::LazyLock;

use {
    regex::Regex,
    rift_channels::{Permissions, Rank},
    rift_common::types::Attachment,
};

#[allow(clippy::expect_used)]
static INVITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:https?://)?(?:www\.)?(?:discord(?:\.gg|\.io|\.me|\.li)|discord(?:app)?\.com/invite)/+[\w-]+",
    )
    .expect("invite pattern compiles")
});

pub const SANITIZED_INVITE: &str = "[SANITIZED_INVITE]";

/// Human-readable size with three decimals, stepping units above 900.
pub fn xbytes(size: u64) -> String {
    let mut value = size as f64;
    let mut suffix = "";
    for next in ["K", "M"] {
        if value <= 900.0 {
            break;
        }
        value /= 1024.0;
        suffix = next;
    }
    format!("{value:.3} {suffix}B")
}

/// Prefix every line with a block quote marker.
pub fn quote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn filter_invites(text: &str) -> String {
    INVITE.replace_all(text, SANITIZED_INVITE).into_owned()
}

/// Break `@everyone` and `@here` so they no longer ping.
pub fn neutralize_mass_mentions(text: &str) -> String {
    text.replace("@everyone", "@\u{200b}everyone")
        .replace("@here", "@\u{200b}here")
}

/// `"(size) url"` summary line for an attachment.
pub fn attachment_line(attachment: &Attachment) -> String {
    format!("({}) {}", xbytes(attachment.size), attachment.url)
}

/// Rank for a native author, checked in descending privilege order.
pub fn rank_from_permissions(permissions: Permissions, is_operator: bool) -> Rank {
    if is_operator {
        Rank::Owner
    } else if permissions.administrator {
        Rank::Admin
    } else if permissions.manage_channels {
        Rank::Operator
    } else if permissions.manage_messages {
        Rank::HalfOp
    } else {
        Rank::None
    }
}

/// `<@name>` style author prefix for plain-text destinations.
pub fn irc_author(rank: Rank, name: &str) -> String {
    match rank.marker() {
        Some(marker) => format!("<{marker}{name}>"),
        None => format!("<{name}>"),
    }
}
