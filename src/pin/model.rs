use secrecy::SecretString;
use serenity::all::{ActionRow, Embed};

use crate::utils::formatting::message_link;

const SPOILER_PREFIX: &str = "SPOILER_";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReactionEmoji {
    Custom {
        id: u64,
        name: Option<String>,
        animated: bool,
    },
    Unicode(String),
}

impl ReactionEmoji {
    /// Custom emoji are keyed by id, unicode emoji by the emoji itself.
    pub fn key(&self) -> String {
        match self {
            ReactionEmoji::Custom { id, .. } => id.to_string(),
            ReactionEmoji::Unicode(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionCount {
    pub emoji: ReactionEmoji,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Regular,
    InlineReply,
    ChatInputCommand,
    ContextMenuCommand,
    ThreadStarter,
    Other(u8),
}

impl MessageKind {
    pub fn is_replicable(self) -> bool {
        !matches!(self, MessageKind::Other(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorSnapshot {
    pub id: u64,
    pub name: String,
    pub global_name: Option<String>,
    pub avatar_url: String,
    pub bot: bool,
}

impl AuthorSnapshot {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSnapshot {
    pub id: u64,
    pub filename: String,
    pub url: String,
    pub size: u64,
}

impl AttachmentSnapshot {
    pub fn is_spoiler(&self) -> bool {
        self.filename.starts_with(SPOILER_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Everything needed to replicate a message without fetching it again.
/// `parent` is filled when the platform delivered the replied-to message inline.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub kind: MessageKind,
    pub author: AuthorSnapshot,
    pub content: String,
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
    pub attachments: Vec<AttachmentSnapshot>,
    pub sticker_urls: Vec<String>,
    pub reactions: Vec<ReactionCount>,
    pub webhook_id: Option<u64>,
    pub reference: Option<MessageRef>,
    pub parent: Option<Box<MessageSnapshot>>,
}

impl MessageSnapshot {
    /// Link previews are regenerated by the client from the content, so only rich embeds are copied.
    pub fn rich_embeds(&self) -> Vec<Embed> {
        self.embeds
            .iter()
            .filter(|embed| matches!(embed.kind.as_deref(), None | Some("rich")))
            .cloned()
            .collect()
    }

    pub fn has_replicable_content(&self) -> bool {
        !self.content.trim().is_empty()
            || !self.attachments.is_empty()
            || !self.sticker_urls.is_empty()
            || !self.components.is_empty()
            || !self.rich_embeds().is_empty()
    }

    pub fn link(&self, guild_id: u64) -> String {
        message_link(guild_id, self.channel_id, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub display_name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u64,
    pub guild_id: Option<u64>,
    pub nsfw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: u64,
    pub premium_tier: u8,
}

/// Direct message telling an author where their message was copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinNotice {
    pub guild_id: u64,
    pub author_id: u64,
    pub source_message_id: u64,
    pub copy: PinLocation,
}

/// A posting endpoint as seen remotely, without its secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityBinding {
    pub id: u64,
    pub channel_id: Option<u64>,
    pub owner_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    pub id: u64,
    pub token: SecretString,
    pub channel_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl OutgoingFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// One message posted through a posting identity. Mentions are always suppressed.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: String,
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
    pub files: Vec<OutgoingFile>,
}

impl OutgoingMessage {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
            && self.embeds.is_empty()
            && self.components.is_empty()
            && self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinLocation {
    pub channel_id: u64,
    pub message_id: u64,
}

impl PinLocation {
    pub fn link(&self, guild_id: u64) -> String {
        message_link(guild_id, self.channel_id, self.message_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    Pinned(PinLocation),
    AlreadyPinned(PinLocation),
}

impl PinOutcome {
    pub fn location(&self) -> PinLocation {
        match self {
            PinOutcome::Pinned(location) | PinOutcome::AlreadyPinned(location) => *location,
        }
    }
}
