use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PinsConfig;
use crate::utils::formatting::{attachment_link, jump_footer, reply_preface};

use super::error::PinError;
use super::model::{MessageSnapshot, OutgoingFile, OutgoingMessage, PinLocation, RemoteIdentity};
use super::packaging::{AttachmentPacker, PackedAttachments, upload_ceiling};
use super::platform::PinPlatform;

const MAX_USERNAME_CHARS: usize = 80;
const UNKNOWN_USERNAME: &str = "Unknown";

/// Reproduces a source message in the pin channel through a posting identity.
pub struct Replicator {
    platform: Arc<dyn PinPlatform>,
    pins: PinsConfig,
}

#[derive(Debug, Clone)]
struct Poster {
    username: String,
    avatar_url: Option<String>,
}

impl Poster {
    fn message(&self, content: String) -> OutgoingMessage {
        OutgoingMessage {
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            content,
            ..OutgoingMessage::default()
        }
    }
}

impl Replicator {
    pub fn new(platform: Arc<dyn PinPlatform>, pins: PinsConfig) -> Self {
        Self { platform, pins }
    }

    /// Rejects message kinds that can never be cloned and messages that could be
    /// one of our own forwarded copies.
    pub async fn ensure_replicable(&self, message: &MessageSnapshot) -> Result<(), PinError> {
        if !message.kind.is_replicable() {
            return Err(PinError::not_pinnable(
                "this type of message cannot be pinned",
            ));
        }

        if let Some(webhook_id) = message.webhook_id {
            let owner = match self.platform.fetch_identity(webhook_id).await {
                Ok(binding) => binding.owner_id,
                Err(err) => {
                    debug!(
                        "webhook origin lookup failed message_id={} webhook_id={} error={}",
                        message.id, webhook_id, err
                    );
                    None
                }
            };

            let ambiguous = match (owner, self.platform.bot_user_id()) {
                (None, _) => true,
                (Some(owner), Some(bot)) => owner == bot,
                (Some(_), None) => true,
            };
            if ambiguous {
                return Err(PinError::not_pinnable(
                    "ambiguous webhooks cannot be pinned",
                ));
            }
        }

        if !message.has_replicable_content() {
            return Err(PinError::not_pinnable("message has no content to pin"));
        }

        Ok(())
    }

    /// Sends the full copy and returns the location of the first message sent.
    pub async fn replicate(
        &self,
        guild_id: u64,
        message: &MessageSnapshot,
        identity: &RemoteIdentity,
    ) -> Result<PinLocation, PinError> {
        let poster = self.poster(guild_id, message).await;
        let packed = self.package(guild_id, message).await;

        let mut file_groups = packed.file_groups.into_iter();
        let mut link_groups = packed.link_groups.into_iter();

        let mut primary = poster.message(message.content.clone());
        primary.embeds = message.rich_embeds();
        primary.components = message.components.clone();
        primary.files = file_groups.next().unwrap_or_default();
        if primary.files.is_empty() && primary.content.trim().is_empty() {
            if let Some(links) = link_groups.next() {
                primary.content = links.join("\n");
            }
        }

        if primary.is_empty() {
            return Err(PinError::not_pinnable("message has no content to pin"));
        }

        let location = self
            .platform
            .execute_identity(identity, primary)
            .await
            .map_err(PinError::ReplicationFailed)?;

        for files in file_groups {
            let mut follow_up = poster.message(String::new());
            follow_up.files = files;
            self.send_follow_up(identity, follow_up).await?;
        }

        for links in link_groups {
            self.send_follow_up(identity, poster.message(links.join("\n")))
                .await?;
        }

        if self.pins.jump_footer {
            let footer = jump_footer(&message.link(guild_id), message.author.id);
            self.send_follow_up(identity, poster.message(footer)).await?;
        }

        self.mirror_reactions(message, location).await;

        info!(
            "replicated message guild_id={} message_id={} copy_id={}",
            guild_id, message.id, location.message_id
        );
        Ok(location)
    }

    /// Back-reference posted ahead of a reply, pointing at the copy of its parent.
    pub async fn send_preface(
        &self,
        guild_id: u64,
        message: &MessageSnapshot,
        identity: &RemoteIdentity,
        parent: PinLocation,
    ) -> Result<PinLocation, PinError> {
        let poster = self.poster(guild_id, message).await;
        let preface = poster.message(reply_preface(&parent.link(guild_id)));
        self.platform
            .execute_identity(identity, preface)
            .await
            .map_err(PinError::ReplicationFailed)
    }

    async fn send_follow_up(
        &self,
        identity: &RemoteIdentity,
        message: OutgoingMessage,
    ) -> Result<(), PinError> {
        self.platform
            .execute_identity(identity, message)
            .await
            .map(|_| ())
            .map_err(|err| PinError::ReplicationFailed(err.context("follow-up message failed")))
    }

    async fn poster(&self, guild_id: u64, message: &MessageSnapshot) -> Poster {
        let author = &message.author;
        let (name, avatar_url) = match self.platform.fetch_member(guild_id, author.id).await {
            Ok(member) => (member.display_name, member.avatar_url),
            Err(err) => {
                debug!(
                    "member lookup failed, using global profile guild_id={} user_id={} error={}",
                    guild_id, author.id, err
                );
                (author.display_name().to_string(), author.avatar_url.clone())
            }
        };

        let username: String = name.trim().chars().take(MAX_USERNAME_CHARS).collect();
        Poster {
            username: if username.is_empty() {
                UNKNOWN_USERNAME.to_string()
            } else {
                username
            },
            avatar_url: (!avatar_url.is_empty()).then_some(avatar_url),
        }
    }

    async fn package(&self, guild_id: u64, message: &MessageSnapshot) -> PackedAttachments {
        let premium_tier = match self.platform.fetch_guild(guild_id).await {
            Ok(guild) => guild.premium_tier,
            Err(err) => {
                warn!(
                    "guild lookup failed, using base upload limit guild_id={} error={}",
                    guild_id, err
                );
                0
            }
        };

        let mut packer = AttachmentPacker::new(
            upload_ceiling(premium_tier),
            self.pins.max_files_per_message,
            self.pins.max_links_per_message,
        );

        for attachment in &message.attachments {
            let link = attachment_link(&attachment.url, attachment.is_spoiler());
            if !packer.fits(attachment.size) {
                packer.push_link(link);
                continue;
            }

            match self.platform.download_attachment(&attachment.url).await {
                Ok(data) if packer.fits(data.len() as u64) => packer.push_file(OutgoingFile {
                    filename: attachment.filename.clone(),
                    data,
                }),
                Ok(data) => {
                    warn!(
                        "attachment larger than reported attachment_id={} size={}",
                        attachment.id,
                        data.len()
                    );
                    packer.push_link(link);
                }
                Err(err) => {
                    warn!(
                        "attachment download failed, sending link attachment_id={} error={}",
                        attachment.id, err
                    );
                    packer.push_link(link);
                }
            }
        }

        for sticker in &message.sticker_urls {
            packer.push_link(sticker.clone());
        }

        packer.finish()
    }

    async fn mirror_reactions(&self, message: &MessageSnapshot, location: PinLocation) {
        let mut seen = HashSet::new();
        for reaction in &message.reactions {
            if !seen.insert(reaction.emoji.key()) {
                continue;
            }
            if let Err(err) = self
                .platform
                .add_reaction(location.channel_id, location.message_id, &reaction.emoji)
                .await
            {
                warn!(
                    "could not mirror reaction message_id={} emoji={} error={}",
                    location.message_id,
                    reaction.emoji.key(),
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serenity::all::Embed;

    use super::Replicator;
    use crate::config::PinsConfig;
    use crate::pin::error::PinError;
    use crate::pin::model::{
        IdentityBinding, MemberProfile, MessageKind, ReactionCount, ReactionEmoji,
        RemoteIdentity,
    };
    use crate::pin::testing::{FakePlatform, attachment, message};

    const GUILD: u64 = 1;

    fn identity(platform: &FakePlatform) -> RemoteIdentity {
        platform.register_identity(900)
    }

    fn replicator(platform: &Arc<FakePlatform>, jump_footer: bool) -> Replicator {
        Replicator::new(
            platform.clone(),
            PinsConfig {
                jump_footer,
                max_links_per_message: 2,
                ..PinsConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn unsupported_kinds_are_not_pinnable() {
        let platform = Arc::new(FakePlatform::new());
        let mut msg = message(10, 20, "system notice");
        msg.kind = MessageKind::Other(7);

        let result = replicator(&platform, true).ensure_replicable(&msg).await;
        assert!(matches!(result, Err(PinError::NotPinnable(_))));
    }

    #[tokio::test]
    async fn webhook_messages_need_a_foreign_owner() {
        let platform = Arc::new(FakePlatform::new());
        let replicator = replicator(&platform, true);
        let mut msg = message(10, 20, "from a webhook");

        msg.webhook_id = Some(555);
        assert!(matches!(
            replicator.ensure_replicable(&msg).await,
            Err(PinError::NotPinnable(_))
        ));

        platform.add_binding(IdentityBinding {
            id: 555,
            channel_id: Some(20),
            owner_id: Some(platform.bot_id()),
        });
        assert!(matches!(
            replicator.ensure_replicable(&msg).await,
            Err(PinError::NotPinnable(_))
        ));

        platform.add_binding(IdentityBinding {
            id: 556,
            channel_id: Some(20),
            owner_id: Some(4242),
        });
        msg.webhook_id = Some(556);
        assert!(replicator.ensure_replicable(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn primary_message_carries_content_embeds_and_member_profile() {
        let platform = Arc::new(FakePlatform::new());
        let identity = identity(&platform);
        platform.add_member(
            GUILD,
            500,
            MemberProfile {
                display_name: "Nick".to_string(),
                avatar_url: "https://cdn.example/nick.png".to_string(),
            },
        );
        let mut msg = message(10, 20, "hello world");
        let mut rich = Embed::default();
        rich.kind = Some("rich".to_string());
        let mut preview = Embed::default();
        preview.kind = Some("link".to_string());
        msg.embeds = vec![rich, preview];

        let location = replicator(&platform, true)
            .replicate(GUILD, &msg, &identity)
            .await
            .expect("replicated");

        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].location, location);
        assert_eq!(sent[0].message.content, "hello world");
        assert_eq!(sent[0].message.username, "Nick");
        assert_eq!(sent[0].message.embeds.len(), 1);
        assert!(sent[1].message.content.starts_with("-# https://discord.com/channels/1/20/10"));
    }

    #[tokio::test]
    async fn missing_member_falls_back_to_global_profile() {
        let platform = Arc::new(FakePlatform::new());
        let identity = identity(&platform);
        let msg = message(10, 20, "hello");

        replicator(&platform, false)
            .replicate(GUILD, &msg, &identity)
            .await
            .expect("replicated");

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.username, msg.author.display_name());
    }

    #[tokio::test]
    async fn oversized_and_failed_attachments_become_links() {
        let platform = Arc::new(FakePlatform::new());
        let identity = identity(&platform);
        let mut msg = message(10, 20, "");
        msg.attachments = vec![
            attachment(&platform, 1, "small.png", 1024),
            {
                let mut huge = attachment(&platform, 2, "huge.mov", 0);
                huge.size = 200 * 1024 * 1024;
                huge
            },
            {
                let mut broken = attachment(&platform, 3, "SPOILER_broken.png", 16);
                platform.fail_download(&broken.url);
                broken.size = 16;
                broken
            },
        ];

        replicator(&platform, false)
            .replicate(GUILD, &msg, &identity)
            .await
            .expect("replicated");

        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message.files.len(), 1);
        assert_eq!(sent[0].message.files[0].filename, "small.png");
        let links = &sent[1].message.content;
        assert!(links.contains("huge.mov"));
        assert!(links.contains("|| https://cdn.example/attachments/3/SPOILER_broken.png ||"));
        assert_eq!(platform.downloads(), 2);
    }

    #[tokio::test]
    async fn links_replace_empty_primary_content() {
        let platform = Arc::new(FakePlatform::new());
        let identity = identity(&platform);
        let mut msg = message(10, 20, "");
        msg.sticker_urls = vec![
            "https://media.example/stickers/1.png".to_string(),
            "https://media.example/stickers/2.png".to_string(),
            "https://media.example/stickers/3.png".to_string(),
        ];

        replicator(&platform, false)
            .replicate(GUILD, &msg, &identity)
            .await
            .expect("replicated");

        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].message.content,
            "https://media.example/stickers/1.png\nhttps://media.example/stickers/2.png"
        );
        assert_eq!(sent[1].message.content, "https://media.example/stickers/3.png");
    }

    #[tokio::test]
    async fn reaction_mirroring_failures_are_ignored() {
        let platform = Arc::new(FakePlatform::new());
        let identity = identity(&platform);
        let mut msg = message(10, 20, "popular");
        msg.reactions = vec![
            ReactionCount {
                emoji: ReactionEmoji::Unicode("📌".to_string()),
                count: 4,
            },
            ReactionCount {
                emoji: ReactionEmoji::Unicode("🔥".to_string()),
                count: 1,
            },
        ];

        let location = replicator(&platform, false)
            .replicate(GUILD, &msg, &identity)
            .await
            .expect("replicated");
        let mirrored = platform.reactions();
        assert_eq!(mirrored.len(), 2);
        assert!(mirrored.iter().all(|(channel, message, _)| {
            *channel == location.channel_id && *message == location.message_id
        }));

        platform.fail_reactions(true);
        let second = replicator(&platform, false)
            .replicate(GUILD, &msg, &identity)
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn primary_send_failure_is_replication_failure() {
        let platform = Arc::new(FakePlatform::new());
        let identity = identity(&platform);
        platform.fail_sends_after(0);

        let result = replicator(&platform, true)
            .replicate(GUILD, &message(10, 20, "hello"), &identity)
            .await;
        assert!(matches!(result, Err(PinError::ReplicationFailed(_))));
    }
}
