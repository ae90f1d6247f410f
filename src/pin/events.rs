use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::config::PinsConfig;
use crate::utils::formatting::preview_text;

use super::PinEngine;
use super::channels::{ChannelCache, PinCountChange};
use super::eligibility::qualifying_emoji;
use super::error::PinError;
use super::model::{MessageSnapshot, PinOutcome, ReactionEmoji};
use super::platform::PinPlatform;
use super::queue::{PinQueue, Submission};
use super::reaction_state::ReactionStateCache;
use super::request::{PinRequest, PinTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: Option<u64>,
    pub user_is_bot: bool,
    pub emoji: ReactionEmoji,
}

/// Gateway events the pin pipeline cares about, already stripped of platform types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Ready { bot_user_id: u64, guilds: usize },
    ReactionAdd(ReactionEvent),
    ReactionRemove(ReactionEvent),
    ReactionRemoveAll { channel_id: u64, message_id: u64 },
    MessageDelete { channel_id: u64, message_ids: Vec<u64> },
    ChannelUpdate { channel_id: u64, nsfw: bool },
    ChannelDelete { channel_id: u64 },
    ChannelPinsUpdate { guild_id: Option<u64>, channel_id: u64 },
}

/// Result of asking for a manual pin.
#[derive(Debug)]
pub enum CommandTicket {
    Pending(oneshot::Receiver<Result<PinOutcome, PinError>>),
    /// The message is already being pinned.
    Duplicate,
    Unavailable,
}

/// Turns inbound events into cache updates and pin requests. Handlers may run
/// concurrently; every shared map has its own lock.
pub struct EventRouter {
    platform: Arc<dyn PinPlatform>,
    engine: Arc<PinEngine>,
    queue: PinQueue,
    reactions: ReactionStateCache,
    channels: ChannelCache,
    pins: PinsConfig,
}

impl EventRouter {
    pub fn new(
        platform: Arc<dyn PinPlatform>,
        engine: Arc<PinEngine>,
        queue: PinQueue,
        pins: PinsConfig,
    ) -> Self {
        Self {
            platform,
            engine,
            queue,
            reactions: ReactionStateCache::new(),
            channels: ChannelCache::new(),
            pins,
        }
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        let result = match event {
            InboundEvent::Ready { bot_user_id, guilds } => {
                info!("gateway ready bot_user_id={} guilds={}", bot_user_id, guilds);
                Ok(())
            }
            InboundEvent::ReactionAdd(reaction) => self.on_reaction_add(reaction).await,
            InboundEvent::ReactionRemove(reaction) => {
                self.on_reaction_remove(&reaction);
                Ok(())
            }
            InboundEvent::ReactionRemoveAll { message_id, .. } => {
                self.reactions.purge(message_id);
                Ok(())
            }
            InboundEvent::MessageDelete { message_ids, .. } => {
                for message_id in message_ids {
                    self.reactions.purge(message_id);
                }
                Ok(())
            }
            InboundEvent::ChannelUpdate { channel_id, nsfw } => {
                self.channels.set_nsfw(channel_id, nsfw);
                Ok(())
            }
            InboundEvent::ChannelDelete { channel_id } => {
                self.channels.forget(channel_id);
                Ok(())
            }
            InboundEvent::ChannelPinsUpdate {
                guild_id,
                channel_id,
            } => self.on_pins_update(guild_id, channel_id).await,
        };

        if let Err(err) = result {
            warn!("event handling failed error={}", err);
        }
    }

    /// Queues a manual pin and hands back a receiver for the outcome.
    pub fn pin_command(&self, guild_id: u64, user_id: u64, message: MessageSnapshot) -> CommandTicket {
        let (request, receiver) =
            PinRequest::new(guild_id, message, PinTrigger::Command { user_id }).with_responder();

        match self.queue.submit(request) {
            Submission::Queued => CommandTicket::Pending(receiver),
            Submission::Duplicate => CommandTicket::Duplicate,
            Submission::Closed => CommandTicket::Unavailable,
        }
    }

    async fn on_reaction_add(&self, event: ReactionEvent) -> Result<(), PinError> {
        let (Some(guild_id), Some(user_id)) = (event.guild_id, event.user_id) else {
            return Ok(());
        };
        if Some(user_id) == self.platform.bot_user_id() {
            return Ok(());
        }
        if self.pins.ignore_bots && event.user_is_bot {
            trace!("ignoring bot reaction user_id={}", user_id);
            return Ok(());
        }

        let message = self
            .platform
            .fetch_message(event.channel_id, event.message_id)
            .await
            .map_err(PinError::Platform)?;

        let emoji_key = event.emoji.key();
        self.reactions
            .record_add(message.id, message.author.id, user_id, &emoji_key);

        if self.pins.ignore_bots && message.author.bot {
            return Ok(());
        }

        let config = self.engine.guild_config(guild_id).await?;
        let Some(pin_channel) = config.channel_id else {
            return Ok(());
        };
        if pin_channel == event.channel_id {
            return Ok(());
        }
        if !config.nsfw && self.is_nsfw(event.channel_id).await? {
            debug!("ignoring reaction in nsfw channel channel_id={}", event.channel_id);
            return Ok(());
        }

        if self.engine.ledger().lookup(guild_id, message.id).await?.is_some() {
            return Ok(());
        }

        let authored = self.reactions.authored(message.id);
        let Some(emoji) = qualifying_emoji(&config, &message, &authored).map(ReactionEmoji::key)
        else {
            return Ok(());
        };

        info!(
            "reaction threshold reached guild_id={} message_id={} emoji={} preview={:?}",
            guild_id,
            message.id,
            emoji,
            preview_text(&message.content)
        );
        self.submit(PinRequest::new(
            guild_id,
            message,
            PinTrigger::Reaction { emoji },
        ));
        Ok(())
    }

    fn on_reaction_remove(&self, event: &ReactionEvent) {
        if let Some(user_id) = event.user_id {
            self.reactions
                .record_remove(event.message_id, user_id, &event.emoji.key());
        }
    }

    async fn on_pins_update(&self, guild_id: Option<u64>, channel_id: u64) -> Result<(), PinError> {
        if !self.pins.native_pins {
            return Ok(());
        }
        let Some(guild_id) = guild_id else {
            return Ok(());
        };

        let mut pinned = self
            .platform
            .list_pinned_messages(channel_id)
            .await
            .map_err(PinError::Platform)?;

        if self.channels.update_pin_count(channel_id, pinned.len()) == PinCountChange::Removed {
            debug!("native pin removed channel_id={}", channel_id);
            return Ok(());
        }
        if pinned.is_empty() {
            return Ok(());
        }

        let newest = pinned.swap_remove(0);
        info!(
            "native pin detected guild_id={} channel_id={} message_id={}",
            guild_id, channel_id, newest.id
        );
        self.submit(PinRequest::new(guild_id, newest, PinTrigger::NativePin));
        Ok(())
    }

    async fn is_nsfw(&self, channel_id: u64) -> Result<bool, PinError> {
        if let Some(nsfw) = self.channels.nsfw(channel_id) {
            return Ok(nsfw);
        }

        let channel = self
            .platform
            .fetch_channel(channel_id)
            .await
            .map_err(PinError::Platform)?;
        self.channels.set_nsfw(channel_id, channel.nsfw);
        Ok(channel.nsfw)
    }

    fn submit(&self, request: PinRequest) {
        let message_id = request.message_id();
        match self.queue.submit(request) {
            Submission::Queued => debug!("queued pin request message_id={}", message_id),
            Submission::Duplicate => debug!("pin request deduplicated message_id={}", message_id),
            Submission::Closed => warn!("pin queue closed message_id={}", message_id),
        }
    }

    #[cfg(test)]
    pub(crate) fn reaction_state(&self) -> &ReactionStateCache {
        &self.reactions
    }
}
