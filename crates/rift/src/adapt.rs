//! Per-destination content adaptation.

use {
    rift_channels::{
        AllowedMentions, Embed, EmbedField, InboundMessage, OutboundMessage, Permissions, Rank,
    },
    rift_common::types::{Attachment, MessageId},
};

use crate::{
    error::{Error, Result},
    format::{attachment_line, filter_invites, irc_author, neutralize_mass_mentions, quote, xbytes},
};

/// What the engine learned about one native hop before adapting.
#[derive(Debug, Clone, Default)]
pub struct NativeHop {
    pub is_operator: bool,
    /// The author's permissions at the destination.
    pub author: Permissions,
    /// The author's permissions intersected with the bot's.
    pub both: Permissions,
    /// Rich embeds requested and allowed at the destination.
    pub embeds: bool,
    pub max_attachments: usize,
    pub reply_to: Option<MessageId>,
}

fn relayable_attachments(
    attachments: &[Attachment],
    allowed: bool,
    limit: usize,
) -> Result<&[Attachment]> {
    if !allowed {
        return Ok(&[]);
    }
    if attachments.len() > limit {
        return Err(Error::TooManyAttachments {
            count: attachments.len(),
            limit,
        });
    }
    Ok(attachments)
}

/// Fold attachments into an embed: the first image is shown, every file
/// becomes a field.
fn embed_attachments(embed: &mut Embed, attachments: &[Attachment]) {
    embed.image_url = attachments
        .iter()
        .find(|a| a.is_image())
        .map(|a| a.url.clone());
    embed.fields.extend(attachments.iter().map(|a| EmbedField {
        name: xbytes(a.size),
        value: format!("[📎`{}`]({})", a.filename, a.url),
        inline: true,
    }));
}

pub fn for_native(message: &InboundMessage, hop: &NativeHop) -> Result<OutboundMessage> {
    let author = &message.author;
    let attachments =
        relayable_attachments(&message.attachments, hop.author.attach_files, hop.max_attachments)?;
    if message.content.trim().is_empty() && attachments.is_empty() {
        return Err(Error::NothingToRelay);
    }

    let mut embeds = Vec::new();
    let mut content = if hop.embeds {
        let mut embed = Embed {
            author_name: Some(filter_invites(&author.display_name)),
            author_icon_url: author.avatar_url.clone(),
            url: message.jump_url.clone(),
            description: author.subheader.as_deref().map(filter_invites),
            color: author.color,
            ..Default::default()
        };
        embed_attachments(&mut embed, attachments);
        embeds.push(embed);
        message.content.clone()
    } else if hop.is_operator {
        message.content.clone()
    } else if message.content.is_empty() {
        author.display_name.clone()
    } else {
        format!("{}\n{}", author.display_name, quote(&message.content))
    };

    if !hop.embeds && !attachments.is_empty() {
        let lines: Vec<_> = attachments.iter().map(attachment_line).collect();
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&lines.join("\n"));
    }

    let privileged = hop.is_operator || hop.both.administrator;
    if !privileged {
        content = filter_invites(&content);
        if !hop.both.mention_everyone {
            content = neutralize_mass_mentions(&content);
        }
    }
    let allowed_mentions = if hop.is_operator || hop.both.mention_everyone {
        AllowedMentions::All
    } else {
        AllowedMentions::UsersOnly
    };

    Ok(OutboundMessage {
        content,
        embeds,
        allowed_mentions,
        reply_to: hop.reply_to,
        mention_replied: message.mentions_replied,
    })
}

/// Plain text with a `<@nick>`-style prefix on every line.
pub fn for_irc(message: &InboundMessage, rank: Rank, max_attachments: usize) -> Result<OutboundMessage> {
    let attachments = relayable_attachments(&message.attachments, true, max_attachments)?;
    let prefix = irc_author(rank, &message.author.display_name);
    let lines: Vec<String> = message
        .content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .chain(attachments.iter().map(attachment_line))
        .map(|line| format!("{prefix} {line}"))
        .collect();
    if lines.is_empty() {
        return Err(Error::NothingToRelay);
    }
    Ok(OutboundMessage {
        content: neutralize_mass_mentions(&lines.join("\n")),
        allowed_mentions: AllowedMentions::None,
        ..Default::default()
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rift_channels::{Author, DestinationId},
        rift_common::types::UserRef,
    };

    fn message(content: &str) -> InboundMessage {
        InboundMessage {
            id: MessageId(1),
            location: DestinationId::channel(1u64, 1u64),
            author: Author {
                user: UserRef::native(7u64),
                name: "alice#0001".into(),
                display_name: "Alice".into(),
                is_bot: false,
                avatar_url: Some("https://cdn.example/a.png".into()),
                color: Some(0xff0000),
                subheader: Some("Mod in Guild".into()),
                rank: Rank::None,
            },
            content: content.into(),
            attachments: Vec::new(),
            reference: None,
            mentions_replied: false,
            jump_url: Some("https://chat.example/1/1/1".into()),
        }
    }

    fn file(name: &str, content_type: &str) -> Attachment {
        Attachment {
            filename: name.into(),
            url: format!("https://cdn.example/{name}"),
            size: 2048,
            content_type: Some(content_type.into()),
        }
    }

    fn hop() -> NativeHop {
        NativeHop {
            author: Permissions {
                attach_files: true,
                ..Default::default()
            },
            max_attachments: 25,
            ..Default::default()
        }
    }

    #[test]
    fn plain_native_relay_quotes_under_the_author() {
        let out = for_native(&message("hello\nworld"), &hop()).unwrap();
        assert_eq!(out.content, "Alice\n> hello\n> world");
        assert_eq!(out.allowed_mentions, AllowedMentions::UsersOnly);
        assert!(out.embeds.is_empty());
    }

    #[test]
    fn operators_are_not_prefixed_or_sanitized() {
        let hop = NativeHop {
            is_operator: true,
            ..hop()
        };
        let out = for_native(&message("@everyone discord.gg/x"), &hop).unwrap();
        assert_eq!(out.content, "@everyone discord.gg/x");
        assert_eq!(out.allowed_mentions, AllowedMentions::All);
    }

    #[test]
    fn invites_and_mass_mentions_are_neutralized() {
        let out = for_native(&message("@here see discord.gg/abc"), &hop()).unwrap();
        assert!(out.content.contains("[SANITIZED_INVITE]"));
        assert!(!out.content.contains("@here"));
    }

    #[test]
    fn administrators_keep_invites() {
        let hop = NativeHop {
            both: Permissions::all(),
            ..hop()
        };
        let out = for_native(&message("discord.gg/abc"), &hop).unwrap();
        assert!(out.content.contains("discord.gg/abc"));
        assert_eq!(out.allowed_mentions, AllowedMentions::All);
    }

    #[test]
    fn embeds_carry_author_and_attachments() {
        let mut msg = message("look");
        msg.attachments = vec![file("notes.txt", "text/plain"), file("cat.png", "image/png")];
        let hop = NativeHop {
            embeds: true,
            ..hop()
        };
        let out = for_native(&msg, &hop).unwrap();
        assert_eq!(out.content, "look");
        let embed = &out.embeds[0];
        assert_eq!(embed.author_name.as_deref(), Some("Alice"));
        assert_eq!(embed.description.as_deref(), Some("Mod in Guild"));
        assert_eq!(embed.image_url.as_deref(), Some("https://cdn.example/cat.png"));
        assert_eq!(embed.fields.len(), 2);
        assert_eq!(embed.fields[0].name, "2.000 KB");
        assert_eq!(embed.fields[0].value, "[📎`notes.txt`](https://cdn.example/notes.txt)");
    }

    #[test]
    fn attachments_are_summarized_without_embeds() {
        let mut msg = message("");
        msg.attachments = vec![file("cat.png", "image/png")];
        let out = for_native(&msg, &hop()).unwrap();
        assert_eq!(out.content, "Alice\n(2.000 KB) https://cdn.example/cat.png");
    }

    #[test]
    fn attachments_need_permission() {
        let mut msg = message("");
        msg.attachments = vec![file("cat.png", "image/png")];
        let err = for_native(&msg, &NativeHop::default()).unwrap_err();
        assert!(matches!(err, Error::NothingToRelay));
    }

    #[test]
    fn too_many_attachments() {
        let mut msg = message("x");
        msg.attachments = (0..3).map(|i| file(&format!("{i}.txt"), "text/plain")).collect();
        let hop = NativeHop {
            max_attachments: 2,
            ..hop()
        };
        let err = for_native(&msg, &hop).unwrap_err();
        assert!(matches!(err, Error::TooManyAttachments { count: 3, limit: 2 }));
    }

    #[test]
    fn irc_lines_carry_rank_and_author() {
        let mut msg = message("hi @everyone\n\nsecond");
        msg.attachments = vec![file("cat.png", "image/png")];
        let out = for_irc(&msg, Rank::Operator, 25).unwrap();
        let lines: Vec<_> = out.content.lines().collect();
        assert_eq!(lines, vec![
            "<@Alice> hi @\u{200b}everyone",
            "<@Alice> second",
            "<@Alice> (2.000 KB) https://cdn.example/cat.png",
        ]);
        assert_eq!(out.allowed_mentions, AllowedMentions::None);
    }

    #[test]
    fn empty_irc_relay_is_nothing() {
        assert!(matches!(
            for_irc(&message("  "), Rank::None, 25),
            Err(Error::NothingToRelay)
        ));
    }
}
