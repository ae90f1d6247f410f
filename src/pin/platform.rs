use anyhow::Result;
use async_trait::async_trait;

use super::model::{
    ChannelInfo, GuildInfo, IdentityBinding, MemberProfile, MessageSnapshot, OutgoingMessage,
    PinLocation, PinNotice, ReactionEmoji, RemoteIdentity,
};

/// Calls the pin pipeline makes against the chat platform.
#[async_trait]
pub trait PinPlatform: Send + Sync {
    /// `None` until the gateway has reported ready.
    fn bot_user_id(&self) -> Option<u64>;

    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<MessageSnapshot>;
    async fn fetch_member(&self, guild_id: u64, user_id: u64) -> Result<MemberProfile>;
    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo>;
    async fn fetch_guild(&self, guild_id: u64) -> Result<GuildInfo>;

    /// Fails when the endpoint no longer exists.
    async fn fetch_identity(&self, identity_id: u64) -> Result<IdentityBinding>;
    async fn create_identity(&self, channel_id: u64, name: &str) -> Result<RemoteIdentity>;
    async fn delete_identity(&self, identity_id: u64) -> Result<()>;
    async fn execute_identity(
        &self,
        identity: &RemoteIdentity,
        message: OutgoingMessage,
    ) -> Result<PinLocation>;

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &ReactionEmoji,
    ) -> Result<()>;
    /// Newest first.
    async fn list_pinned_messages(&self, channel_id: u64) -> Result<Vec<MessageSnapshot>>;
    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>>;
    /// Fails when the author does not accept direct messages.
    async fn notify_author(&self, notice: &PinNotice) -> Result<()>;
}
