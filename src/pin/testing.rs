//! In-memory platform and stores for exercising the pin pipeline without a network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::SecretString;

use crate::config::{GuildDefaults, PinsConfig};
use crate::db::{
    ConfigStore, DatabaseError, GuildConfig, IdentityRecord, IdentityStore, PinRecord, PinStat,
    PinStore, StatsStore, Stores,
};

use super::PinEngine;
use super::model::{
    AttachmentSnapshot, AuthorSnapshot, ChannelInfo, GuildInfo, IdentityBinding, MemberProfile,
    MessageKind, MessageRef, MessageSnapshot, OutgoingMessage, PinLocation, PinNotice,
    ReactionEmoji, RemoteIdentity,
};
use super::platform::PinPlatform;

pub const AUTHOR_ID: u64 = 500;

pub fn message(id: u64, channel_id: u64, content: &str) -> MessageSnapshot {
    MessageSnapshot {
        id,
        channel_id,
        guild_id: Some(Harness::GUILD),
        kind: MessageKind::Regular,
        author: AuthorSnapshot {
            id: AUTHOR_ID,
            name: "author".to_string(),
            global_name: Some("Author".to_string()),
            avatar_url: "https://cdn.example/avatars/500.png".to_string(),
            bot: false,
        },
        content: content.to_string(),
        embeds: Vec::new(),
        components: Vec::new(),
        attachments: Vec::new(),
        sticker_urls: Vec::new(),
        reactions: Vec::new(),
        webhook_id: None,
        reference: None,
        parent: None,
    }
}

/// Registers downloadable bytes for the attachment and returns its snapshot.
pub fn attachment(platform: &FakePlatform, id: u64, filename: &str, size: u64) -> AttachmentSnapshot {
    let url = format!("https://cdn.example/attachments/{id}/{filename}");
    platform
        .state
        .lock()
        .downloads
        .insert(url.clone(), vec![0; size as usize]);
    AttachmentSnapshot {
        id,
        filename: filename.to_string(),
        url,
        size,
    }
}

/// Builds a reply chain with `ancestors` parents stored on the platform and returns its leaf.
pub fn reply_chain(platform: &FakePlatform, ancestors: u64) -> MessageSnapshot {
    const CHANNEL: u64 = 20;
    let mut previous: Option<u64> = None;
    for id in 1..=ancestors {
        let mut parent = message(id, CHANNEL, &format!("ancestor {id}"));
        if let Some(previous) = previous {
            parent.kind = MessageKind::InlineReply;
            parent.reference = Some(MessageRef {
                channel_id: CHANNEL,
                message_id: previous,
            });
        }
        platform.add_message(parent);
        previous = Some(id);
    }

    let mut leaf = message(100, CHANNEL, "leaf");
    if let Some(previous) = previous {
        leaf.kind = MessageKind::InlineReply;
        leaf.reference = Some(MessageRef {
            channel_id: CHANNEL,
            message_id: previous,
        });
    }
    leaf
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub identity_id: u64,
    pub location: PinLocation,
    pub message: OutgoingMessage,
}

#[derive(Default)]
struct FakeState {
    messages: HashMap<(u64, u64), MessageSnapshot>,
    members: HashMap<(u64, u64), MemberProfile>,
    channels: HashMap<u64, ChannelInfo>,
    bindings: HashMap<u64, IdentityBinding>,
    pinned: HashMap<u64, Vec<MessageSnapshot>>,
    downloads: HashMap<String, Vec<u8>>,
    failing_downloads: HashSet<String>,
    download_calls: usize,
    sent: Vec<SentMessage>,
    reactions: Vec<(u64, u64, ReactionEmoji)>,
    created_identities: usize,
    deleted_identities: Vec<u64>,
    next_id: u64,
    fail_identity_creation: bool,
    fail_reactions: bool,
    fail_notices: bool,
    sends_before_failure: Option<usize>,
    notices: Vec<PinNotice>,
}

pub struct FakePlatform {
    bot_id: u64,
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            bot_id: 1000,
            state: Mutex::new(FakeState {
                next_id: 5000,
                ..FakeState::default()
            }),
        }
    }

    pub fn bot_id(&self) -> u64 {
        self.bot_id
    }

    pub fn add_message(&self, message: MessageSnapshot) {
        self.state
            .lock()
            .messages
            .insert((message.channel_id, message.id), message);
    }

    pub fn add_member(&self, guild_id: u64, user_id: u64, profile: MemberProfile) {
        self.state.lock().members.insert((guild_id, user_id), profile);
    }

    pub fn add_channel(&self, channel: ChannelInfo) {
        self.state.lock().channels.insert(channel.id, channel);
    }

    pub fn add_binding(&self, binding: IdentityBinding) {
        self.state.lock().bindings.insert(binding.id, binding);
    }

    pub fn set_pinned(&self, channel_id: u64, pinned: Vec<MessageSnapshot>) {
        self.state.lock().pinned.insert(channel_id, pinned);
    }

    /// Creates an identity owned by the bot outside of the forwarder.
    pub fn register_identity(&self, channel_id: u64) -> RemoteIdentity {
        let mut state = self.state.lock();
        let id = next_id(&mut state);
        state.bindings.insert(
            id,
            IdentityBinding {
                id,
                channel_id: Some(channel_id),
                owner_id: Some(self.bot_id),
            },
        );
        RemoteIdentity {
            id,
            token: SecretString::new(format!("token-{id}")),
            channel_id,
        }
    }

    pub fn remove_identity_remotely(&self, identity_id: u64) {
        self.state.lock().bindings.remove(&identity_id);
    }

    pub fn fail_identity_creation(&self, fail: bool) {
        self.state.lock().fail_identity_creation = fail;
    }

    pub fn fail_reactions(&self, fail: bool) {
        self.state.lock().fail_reactions = fail;
    }

    /// Simulates authors with direct messages closed.
    pub fn fail_notices(&self, fail: bool) {
        self.state.lock().fail_notices = fail;
    }

    pub fn notices(&self) -> Vec<PinNotice> {
        self.state.lock().notices.clone()
    }

    pub fn fail_download(&self, url: &str) {
        self.state.lock().failing_downloads.insert(url.to_string());
    }

    /// Lets `count` more sends through, then fails every later one.
    pub fn fail_sends_after(&self, count: usize) {
        self.state.lock().sends_before_failure = Some(count);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    pub fn reactions(&self) -> Vec<(u64, u64, ReactionEmoji)> {
        self.state.lock().reactions.clone()
    }

    pub fn downloads(&self) -> usize {
        self.state.lock().download_calls
    }

    pub fn created_identities(&self) -> usize {
        self.state.lock().created_identities
    }

    pub fn deleted_identities(&self) -> Vec<u64> {
        self.state.lock().deleted_identities.clone()
    }
}

fn next_id(state: &mut FakeState) -> u64 {
    state.next_id += 1;
    state.next_id
}

#[async_trait]
impl PinPlatform for FakePlatform {
    fn bot_user_id(&self) -> Option<u64> {
        Some(self.bot_id)
    }

    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<MessageSnapshot> {
        self.state
            .lock()
            .messages
            .get(&(channel_id, message_id))
            .cloned()
            .ok_or_else(|| anyhow!("unknown message {message_id}"))
    }

    async fn fetch_member(&self, guild_id: u64, user_id: u64) -> Result<MemberProfile> {
        self.state
            .lock()
            .members
            .get(&(guild_id, user_id))
            .cloned()
            .ok_or_else(|| anyhow!("unknown member {user_id}"))
    }

    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo> {
        Ok(self
            .state
            .lock()
            .channels
            .get(&channel_id)
            .copied()
            .unwrap_or(ChannelInfo {
                id: channel_id,
                guild_id: Some(Harness::GUILD),
                nsfw: false,
            }))
    }

    async fn fetch_guild(&self, guild_id: u64) -> Result<GuildInfo> {
        Ok(GuildInfo {
            id: guild_id,
            premium_tier: 0,
        })
    }

    async fn fetch_identity(&self, identity_id: u64) -> Result<IdentityBinding> {
        self.state
            .lock()
            .bindings
            .get(&identity_id)
            .copied()
            .ok_or_else(|| anyhow!("unknown webhook {identity_id}"))
    }

    async fn create_identity(&self, channel_id: u64, _name: &str) -> Result<RemoteIdentity> {
        {
            let mut state = self.state.lock();
            if state.fail_identity_creation {
                bail!("missing permissions to create webhooks");
            }
            state.created_identities += 1;
        }
        Ok(self.register_identity(channel_id))
    }

    async fn delete_identity(&self, identity_id: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.deleted_identities.push(identity_id);
        match state.bindings.remove(&identity_id) {
            Some(_) => Ok(()),
            None => bail!("unknown webhook {identity_id}"),
        }
    }

    async fn execute_identity(
        &self,
        identity: &RemoteIdentity,
        message: OutgoingMessage,
    ) -> Result<PinLocation> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.sends_before_failure.as_mut() {
            if *remaining == 0 {
                bail!("webhook execution failed");
            }
            *remaining -= 1;
        }
        let Some(binding) = state.bindings.get(&identity.id).copied() else {
            bail!("unknown webhook {}", identity.id);
        };

        let location = PinLocation {
            channel_id: binding.channel_id.unwrap_or(identity.channel_id),
            message_id: next_id(&mut state),
        };
        state.sent.push(SentMessage {
            identity_id: identity.id,
            location,
            message,
        });
        Ok(location)
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &ReactionEmoji,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_reactions {
            bail!("unknown emoji");
        }
        state.reactions.push((channel_id, message_id, emoji.clone()));
        Ok(())
    }

    async fn list_pinned_messages(&self, channel_id: u64) -> Result<Vec<MessageSnapshot>> {
        Ok(self
            .state
            .lock()
            .pinned
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.download_calls += 1;
        if state.failing_downloads.contains(url) {
            bail!("download failed for {url}");
        }
        state
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no such attachment {url}"))
    }

    async fn notify_author(&self, notice: &PinNotice) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_notices {
            bail!("cannot send messages to user {}", notice.author_id);
        }
        state.notices.push(*notice);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    configs: HashMap<u64, GuildConfig>,
    pins: HashMap<(u64, u64), PinRecord>,
    identities: HashMap<u64, IdentityRecord>,
    stats: Vec<PinStat>,
    fail_pin_writes: bool,
}

/// Implements every store trait over one in-memory map set.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_pin_writes(&self, fail: bool) {
        self.state.lock().fail_pin_writes = fail;
    }

    pub fn stats(&self) -> Vec<PinStat> {
        self.state.lock().stats.clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_config(&self, guild_id: u64) -> Result<Option<GuildConfig>, DatabaseError> {
        Ok(self.state.lock().configs.get(&guild_id).cloned())
    }

    async fn save_config(&self, config: &GuildConfig) -> Result<(), DatabaseError> {
        self.state
            .lock()
            .configs
            .insert(config.guild_id, config.clone());
        Ok(())
    }
}

#[async_trait]
impl PinStore for MemoryStore {
    async fn get_pin(
        &self,
        guild_id: u64,
        source_message_id: u64,
    ) -> Result<Option<PinRecord>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .pins
            .get(&(guild_id, source_message_id))
            .cloned())
    }

    async fn add_pin(&self, record: &PinRecord) -> Result<(), DatabaseError> {
        let mut state = self.state.lock();
        if state.fail_pin_writes {
            return Err(DatabaseError::Query("disk full".to_string()));
        }
        let key = (record.guild_id, record.source_message_id);
        if state.pins.contains_key(&key) {
            return Err(DatabaseError::Conflict(format!(
                "message {} already pinned",
                record.source_message_id
            )));
        }
        let mut stored = record.clone();
        stored.id = state.pins.len() as i64 + 1;
        state.pins.insert(key, stored);
        Ok(())
    }

    async fn count_pins(&self, guild_id: u64) -> Result<i64, DatabaseError> {
        Ok(self
            .state
            .lock()
            .pins
            .keys()
            .filter(|(guild, _)| *guild == guild_id)
            .count() as i64)
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn get_identity(&self, guild_id: u64) -> Result<Option<IdentityRecord>, DatabaseError> {
        Ok(self.state.lock().identities.get(&guild_id).cloned())
    }

    async fn set_identity(&self, record: &IdentityRecord) -> Result<(), DatabaseError> {
        self.state
            .lock()
            .identities
            .insert(record.guild_id, record.clone());
        Ok(())
    }

    async fn delete_identity(&self, guild_id: u64) -> Result<(), DatabaseError> {
        self.state.lock().identities.remove(&guild_id);
        Ok(())
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn add_stat(&self, stat: &PinStat) -> Result<(), DatabaseError> {
        self.state.lock().stats.push(stat.clone());
        Ok(())
    }

    async fn count_stats_for_user(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<i64, DatabaseError> {
        Ok(self
            .state
            .lock()
            .stats
            .iter()
            .filter(|stat| stat.guild_id == guild_id && stat.user_id == user_id)
            .count() as i64)
    }
}

/// A fake platform and memory store wired into a `PinEngine`.
pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub const GUILD: u64 = 1;
    pub const PIN_CHANNEL: u64 = 900;

    pub fn new() -> Self {
        Self {
            platform: Arc::new(FakePlatform::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// A guild whose pin channel is already configured.
    pub async fn with_channel() -> Self {
        let harness = Self::new();
        let mut config = GuildConfig::from_defaults(Self::GUILD, &GuildDefaults::default());
        config.channel_id = Some(Self::PIN_CHANNEL);
        harness
            .store
            .save_config(&config)
            .await
            .expect("save config");
        harness
    }

    pub async fn set_reply_depth(&self, depth: u32) {
        let mut config = self
            .store
            .get_config(Self::GUILD)
            .await
            .expect("query")
            .expect("config exists");
        config.reply_depth = depth;
        self.store.save_config(&config).await.expect("save config");
    }

    pub fn stores(&self) -> Stores {
        Stores {
            configs: self.store.clone(),
            pins: self.store.clone(),
            identities: self.store.clone(),
            stats: self.store.clone(),
        }
    }

    /// Engine without the jump footer so each pin maps to exactly one sent message.
    pub fn engine(&self) -> PinEngine {
        self.engine_with(PinsConfig {
            jump_footer: false,
            ..PinsConfig::default()
        })
    }

    pub fn engine_with(&self, pins: PinsConfig) -> PinEngine {
        PinEngine::new(
            self.platform.clone(),
            self.stores(),
            pins,
            GuildDefaults::default(),
        )
    }
}
