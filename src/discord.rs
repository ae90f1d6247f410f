use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serenity::all::{
    Channel, ChannelId, ChannelPinsUpdateEvent, Client as SerenityClient, Command,
    Context as SerenityContext, CreateActionRow, CreateAllowedMentions, CreateAttachment,
    CreateButton, CreateEmbed, CreateMessage, CreateWebhook, EventHandler as SerenityEventHandler,
    ExecuteWebhook, GatewayIntents,
    GuildChannel, GuildId, Http, Interaction, Message as SerenityMessage, MessageId, Reaction,
    Ready, UserId, Webhook, WebhookId,
};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::media::MediaHandler;
use crate::utils::formatting::pin_notice;
use crate::pin::model::{
    ChannelInfo, GuildInfo, IdentityBinding, MemberProfile, MessageSnapshot, OutgoingMessage,
    PinLocation, PinNotice, ReactionEmoji, RemoteIdentity,
};
use crate::pin::{EventRouter, InboundEvent, PinPlatform, ReactionEvent};

pub mod commands;
pub mod convert;

use self::commands::{PIN_MESSAGE_COMMAND, handle_pin_command, pin_message_command};
use self::convert::{action_rows, message_snapshot, reaction_emoji, reaction_type};

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const READY_TIMEOUT_SECONDS: u64 = 30;

/// Serenity-backed platform client: REST calls for the pin pipeline and the gateway
/// connection that feeds the event router.
#[derive(Clone)]
pub struct DiscordClient {
    config: Arc<Config>,
    http: Arc<Http>,
    media: MediaHandler,
    login_state: Arc<AsyncMutex<DiscordLoginState>>,
    router: Arc<RwLock<Option<Arc<EventRouter>>>>,
    bot_user_id: Arc<AtomicU64>,
}

#[derive(Default)]
struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

struct PinEventHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    router: Arc<RwLock<Option<Arc<EventRouter>>>>,
    bot_user_id: Arc<AtomicU64>,
}

impl PinEventHandler {
    async fn dispatch(&self, event: InboundEvent) {
        let router = self.router.read().await.clone();
        let Some(router) = router else {
            debug!("ignoring discord event before router binding");
            return;
        };
        router.dispatch(event).await;
    }
}

fn reaction_event(reaction: &Reaction) -> ReactionEvent {
    ReactionEvent {
        guild_id: reaction.guild_id.map(|id| id.get()),
        channel_id: reaction.channel_id.get(),
        message_id: reaction.message_id.get(),
        user_id: reaction.user_id.map(|id| id.get()),
        user_is_bot: reaction
            .member
            .as_ref()
            .is_some_and(|member| member.user.bot),
        emoji: reaction_emoji(&reaction.emoji),
    }
}

fn unique_message_ids(ids: Vec<MessageId>) -> Vec<u64> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .map(MessageId::get)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Message content is privileged; without it forwarded copies would be empty.
fn pin_intents(use_privileged_intents: bool) -> GatewayIntents {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;
    if use_privileged_intents {
        intents | GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILD_MEMBERS
    } else {
        intents
    }
}

#[serenity::async_trait]
impl SerenityEventHandler for PinEventHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({})",
            ready.user.name, ready.user.id
        );
        self.bot_user_id.store(ready.user.id.get(), Ordering::SeqCst);

        if let Err(err) = Command::create_global_command(&ctx.http, pin_message_command()).await {
            error!("failed to register pin command: {err}");
        }

        self.dispatch(InboundEvent::Ready {
            bot_user_id: ready.user.id.get(),
            guilds: ready.guilds.len(),
        })
        .await;

        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
    }

    async fn reaction_add(&self, _ctx: SerenityContext, reaction: Reaction) {
        self.dispatch(InboundEvent::ReactionAdd(reaction_event(&reaction)))
            .await;
    }

    async fn reaction_remove(&self, _ctx: SerenityContext, reaction: Reaction) {
        self.dispatch(InboundEvent::ReactionRemove(reaction_event(&reaction)))
            .await;
    }

    async fn reaction_remove_all(
        &self,
        _ctx: SerenityContext,
        channel_id: ChannelId,
        removed_from_message_id: MessageId,
    ) {
        self.dispatch(InboundEvent::ReactionRemoveAll {
            channel_id: channel_id.get(),
            message_id: removed_from_message_id.get(),
        })
        .await;
    }

    async fn message_delete(
        &self,
        _ctx: SerenityContext,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        self.dispatch(InboundEvent::MessageDelete {
            channel_id: channel_id.get(),
            message_ids: vec![deleted_message_id.get()],
        })
        .await;
    }

    async fn message_delete_bulk(
        &self,
        _ctx: SerenityContext,
        channel_id: ChannelId,
        deleted_messages_ids: Vec<MessageId>,
        _guild_id: Option<GuildId>,
    ) {
        self.dispatch(InboundEvent::MessageDelete {
            channel_id: channel_id.get(),
            message_ids: unique_message_ids(deleted_messages_ids),
        })
        .await;
    }

    async fn channel_update(
        &self,
        _ctx: SerenityContext,
        _old: Option<GuildChannel>,
        new: GuildChannel,
    ) {
        self.dispatch(InboundEvent::ChannelUpdate {
            channel_id: new.id.get(),
            nsfw: new.nsfw,
        })
        .await;
    }

    async fn channel_delete(
        &self,
        _ctx: SerenityContext,
        channel: GuildChannel,
        _messages: Option<Vec<SerenityMessage>>,
    ) {
        self.dispatch(InboundEvent::ChannelDelete {
            channel_id: channel.id.get(),
        })
        .await;
    }

    async fn channel_pins_update(&self, _ctx: SerenityContext, pin: ChannelPinsUpdateEvent) {
        self.dispatch(InboundEvent::ChannelPinsUpdate {
            guild_id: pin.guild_id.map(|id| id.get()),
            channel_id: pin.channel_id.get(),
        })
        .await;
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name != PIN_MESSAGE_COMMAND {
            return;
        }

        let router = self.router.read().await.clone();
        let Some(router) = router else {
            warn!("pin command received before router binding");
            return;
        };

        if let Err(err) = handle_pin_command(&ctx, &command, &router).await {
            error!("failed to handle pin command: {err}");
        }
    }
}

impl DiscordClient {
    pub fn new(config: Arc<Config>) -> Self {
        info!("initializing discord client");
        Self {
            http: Arc::new(Http::new(config.auth.token())),
            media: MediaHandler::new(),
            login_state: Arc::new(AsyncMutex::new(DiscordLoginState::default())),
            router: Arc::new(RwLock::new(None)),
            bot_user_id: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub async fn set_router(&self, router: Arc<EventRouter>) {
        *self.router.write().await = Some(router);
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let intents = pin_intents(self.config.auth.use_privileged_intents);
        let (ready_tx, ready_rx) = oneshot::channel();
        let event_handler = PinEventHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            router: self.router.clone(),
            bot_user_id: self.bot_user_id.clone(),
        };

        let mut gateway_client = SerenityClient::builder(self.config.auth.token(), intents)
            .event_handler(event_handler)
            .await
            .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        match tokio::time::timeout(
            std::time::Duration::from_secs(READY_TIMEOUT_SECONDS),
            ready_rx,
        )
        .await
        {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");
                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!("discord gateway exited before receiving Ready event"))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(retry_seconds)).await;
                    retry_seconds = (retry_seconds * 2).min(MAX_LOGIN_RETRY_SECONDS);
                }
            }
        }
    }

    /// Resolves when the gateway task exits.
    pub async fn wait(&self) {
        let task = self.login_state.lock().await.gateway_task.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!("discord gateway task join error: {err}");
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.is_logged_in = false;
        info!("discord client stopped");
        Ok(())
    }
}

#[async_trait]
impl PinPlatform for DiscordClient {
    fn bot_user_id(&self) -> Option<u64> {
        match self.bot_user_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<MessageSnapshot> {
        let message = self
            .http
            .get_message(ChannelId::new(channel_id), MessageId::new(message_id))
            .await
            .map_err(|e| anyhow!("failed to fetch message {}: {}", message_id, e))?;
        Ok(message_snapshot(&message))
    }

    async fn fetch_member(&self, guild_id: u64, user_id: u64) -> Result<MemberProfile> {
        let member = self
            .http
            .get_member(GuildId::new(guild_id), UserId::new(user_id))
            .await
            .map_err(|e| anyhow!("failed to fetch member {}: {}", user_id, e))?;
        Ok(MemberProfile {
            display_name: member.display_name().to_string(),
            avatar_url: member.face(),
        })
    }

    async fn fetch_channel(&self, channel_id: u64) -> Result<ChannelInfo> {
        let channel = self
            .http
            .get_channel(ChannelId::new(channel_id))
            .await
            .map_err(|e| anyhow!("failed to fetch channel {}: {}", channel_id, e))?;
        Ok(match channel {
            Channel::Guild(channel) => ChannelInfo {
                id: channel_id,
                guild_id: Some(channel.guild_id.get()),
                nsfw: channel.nsfw,
            },
            _ => ChannelInfo {
                id: channel_id,
                guild_id: None,
                nsfw: false,
            },
        })
    }

    async fn fetch_guild(&self, guild_id: u64) -> Result<GuildInfo> {
        let guild = self
            .http
            .get_guild(GuildId::new(guild_id))
            .await
            .map_err(|e| anyhow!("failed to fetch guild {}: {}", guild_id, e))?;
        Ok(GuildInfo {
            id: guild_id,
            premium_tier: u8::from(guild.premium_tier),
        })
    }

    async fn fetch_identity(&self, identity_id: u64) -> Result<IdentityBinding> {
        let webhook = self
            .http
            .get_webhook(WebhookId::new(identity_id))
            .await
            .map_err(|e| anyhow!("failed to fetch webhook {}: {}", identity_id, e))?;
        Ok(IdentityBinding {
            id: identity_id,
            channel_id: webhook.channel_id.map(|id| id.get()),
            owner_id: webhook.user.as_ref().map(|user| user.id.get()),
        })
    }

    async fn create_identity(&self, channel_id: u64, name: &str) -> Result<RemoteIdentity> {
        let webhook = ChannelId::new(channel_id)
            .create_webhook(&self.http, CreateWebhook::new(name))
            .await
            .map_err(|e| anyhow!("failed to create webhook in channel {}: {}", channel_id, e))?;
        let token = webhook
            .token
            .clone()
            .ok_or_else(|| anyhow!("created webhook has no token"))?;

        Ok(RemoteIdentity {
            id: webhook.id.get(),
            token,
            channel_id: webhook.channel_id.map_or(channel_id, |id| id.get()),
        })
    }

    async fn delete_identity(&self, identity_id: u64) -> Result<()> {
        self.http
            .delete_webhook(WebhookId::new(identity_id), None)
            .await
            .map_err(|e| anyhow!("failed to delete webhook {}: {}", identity_id, e))
    }

    async fn execute_identity(
        &self,
        identity: &RemoteIdentity,
        message: OutgoingMessage,
    ) -> Result<PinLocation> {
        let webhook = Webhook::from_id_with_token(
            &self.http,
            WebhookId::new(identity.id),
            identity.token.expose_secret(),
        )
        .await
        .map_err(|e| anyhow!("failed to load webhook {}: {}", identity.id, e))?;

        let mut builder = ExecuteWebhook::new()
            .username(message.username)
            .allowed_mentions(CreateAllowedMentions::new());
        if let Some(avatar) = message.avatar_url {
            builder = builder.avatar_url(avatar);
        }
        if !message.content.is_empty() {
            builder = builder.content(message.content);
        }
        if !message.embeds.is_empty() {
            builder = builder.embeds(message.embeds.into_iter().map(CreateEmbed::from).collect());
        }
        let components = action_rows(&message.components);
        if !components.is_empty() {
            builder = builder.components(components);
        }
        if !message.files.is_empty() {
            builder = builder.add_files(
                message
                    .files
                    .into_iter()
                    .map(|file| CreateAttachment::bytes(file.data, file.filename)),
            );
        }

        let sent: SerenityMessage = webhook
            .execute(&self.http, true, builder)
            .await
            .map_err(|e| anyhow!("webhook send failed: {}", e))?
            .ok_or_else(|| anyhow!("webhook execution returned no message"))?;

        debug!(
            "sent message via webhook webhook_id={} message_id={}",
            identity.id, sent.id
        );
        Ok(PinLocation {
            channel_id: sent.channel_id.get(),
            message_id: sent.id.get(),
        })
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &ReactionEmoji,
    ) -> Result<()> {
        self.http
            .create_reaction(
                ChannelId::new(channel_id),
                MessageId::new(message_id),
                &reaction_type(emoji),
            )
            .await
            .map_err(|e| anyhow!("failed to add reaction to {}: {}", message_id, e))
    }

    async fn list_pinned_messages(&self, channel_id: u64) -> Result<Vec<MessageSnapshot>> {
        let pins = self
            .http
            .get_pins(ChannelId::new(channel_id))
            .await
            .map_err(|e| anyhow!("failed to list pins in channel {}: {}", channel_id, e))?;
        Ok(pins.iter().map(message_snapshot).collect())
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>> {
        let media = self.media.download_from_url(url).await?;
        debug!(
            "downloaded attachment filename={} content_type={} bytes={}",
            media.filename, media.content_type, media.size
        );
        Ok(media.data)
    }

    async fn notify_author(&self, notice: &PinNotice) -> Result<()> {
        let guild = self
            .http
            .get_guild(GuildId::new(notice.guild_id))
            .await
            .map_err(|e| anyhow!("failed to fetch guild {}: {}", notice.guild_id, e))?;
        let created_at = MessageId::new(notice.source_message_id)
            .created_at()
            .unix_timestamp();

        let dm = UserId::new(notice.author_id)
            .create_dm_channel(&self.http)
            .await
            .map_err(|e| anyhow!("failed to open dm with {}: {}", notice.author_id, e))?;
        let button = CreateButton::new_link(notice.copy.link(notice.guild_id)).label("Check it out");
        dm.id
            .send_message(
                &self.http,
                CreateMessage::new()
                    .content(pin_notice(created_at, &guild.name))
                    .components(vec![CreateActionRow::Buttons(vec![button])]),
            )
            .await
            .map_err(|e| anyhow!("failed to send dm to {}: {}", notice.author_id, e))?;
        Ok(())
    }
}
