use serenity::all::{
    ActionRow, ActionRowComponent, CreateActionRow, CreateButton, EmojiId, Message, MessageType,
    ReactionType, User,
};

use crate::pin::model::{
    AttachmentSnapshot, AuthorSnapshot, MessageKind, MessageRef, MessageSnapshot, ReactionCount,
    ReactionEmoji,
};

pub fn message_snapshot(message: &Message) -> MessageSnapshot {
    MessageSnapshot {
        id: message.id.get(),
        channel_id: message.channel_id.get(),
        guild_id: message.guild_id.map(|id| id.get()),
        kind: message_kind(message.kind),
        author: author_snapshot(&message.author),
        content: message.content.clone(),
        embeds: message.embeds.clone(),
        components: message.components.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|attachment| AttachmentSnapshot {
                id: attachment.id.get(),
                filename: attachment.filename.clone(),
                url: attachment.url.clone(),
                size: u64::from(attachment.size),
            })
            .collect(),
        sticker_urls: message
            .sticker_items
            .iter()
            .filter_map(|sticker| sticker.image_url())
            .collect(),
        reactions: message
            .reactions
            .iter()
            .map(|reaction| ReactionCount {
                emoji: reaction_emoji(&reaction.reaction_type),
                count: reaction.count,
            })
            .collect(),
        webhook_id: message.webhook_id.map(|id| id.get()),
        reference: message.message_reference.as_ref().and_then(|reference| {
            reference.message_id.map(|message_id| MessageRef {
                channel_id: reference.channel_id.get(),
                message_id: message_id.get(),
            })
        }),
        parent: message
            .referenced_message
            .as_deref()
            .map(|parent| Box::new(message_snapshot(parent))),
    }
}

pub fn author_snapshot(user: &User) -> AuthorSnapshot {
    AuthorSnapshot {
        id: user.id.get(),
        name: user.name.clone(),
        global_name: user.global_name.clone(),
        avatar_url: user.face(),
        bot: user.bot,
    }
}

pub fn message_kind(kind: MessageType) -> MessageKind {
    match kind {
        MessageType::Regular => MessageKind::Regular,
        MessageType::InlineReply => MessageKind::InlineReply,
        MessageType::ChatInputCommand => MessageKind::ChatInputCommand,
        MessageType::ContextMenuCommand => MessageKind::ContextMenuCommand,
        MessageType::ThreadStarterMessage => MessageKind::ThreadStarter,
        other => MessageKind::Other(u8::from(other)),
    }
}

pub fn reaction_emoji(reaction: &ReactionType) -> ReactionEmoji {
    match reaction {
        ReactionType::Custom { animated, id, name } => ReactionEmoji::Custom {
            id: id.get(),
            name: name.clone(),
            animated: *animated,
        },
        ReactionType::Unicode(value) => ReactionEmoji::Unicode(value.clone()),
        other => ReactionEmoji::Unicode(other.to_string()),
    }
}

pub fn reaction_type(emoji: &ReactionEmoji) -> ReactionType {
    match emoji {
        ReactionEmoji::Custom { id, name, animated } => ReactionType::Custom {
            animated: *animated,
            id: EmojiId::new(*id),
            name: name.clone(),
        },
        ReactionEmoji::Unicode(value) => ReactionType::Unicode(value.clone()),
    }
}

/// Only buttons can be rebuilt; rows without any are dropped.
pub fn action_rows(rows: &[ActionRow]) -> Vec<CreateActionRow> {
    rows.iter()
        .filter_map(|row| {
            let buttons: Vec<CreateButton> = row
                .components
                .iter()
                .filter_map(|component| match component {
                    ActionRowComponent::Button(button) => Some(CreateButton::from(button.clone())),
                    _ => None,
                })
                .collect();
            (!buttons.is_empty()).then_some(CreateActionRow::Buttons(buttons))
        })
        .collect()
}
