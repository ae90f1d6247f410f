pub mod channels;
pub mod eligibility;
pub mod error;
pub mod events;
pub mod identity;
pub mod ledger;
pub mod model;
pub mod packaging;
pub mod platform;
pub mod queue;
pub mod reaction_state;
pub mod replicator;
pub mod request;

mod reply_chain;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::config::{GuildDefaults, PinsConfig};
use crate::db::{GuildConfig, PinStat, Stores};

pub use self::error::PinError;
pub use self::events::{CommandTicket, EventRouter, InboundEvent, ReactionEvent};
pub use self::identity::IdentityForwarder;
pub use self::ledger::PinLedger;
pub use self::model::{MessageSnapshot, PinLocation, PinNotice, PinOutcome};
pub use self::platform::PinPlatform;
pub use self::queue::{PinQueue, PinWorker, Submission};
pub use self::replicator::Replicator;
pub use self::request::{PinRequest, PinTrigger};

/// Runs one pin attempt end to end: ledger check, reply ancestry, identity,
/// replication and the ledger write.
pub struct PinEngine {
    platform: Arc<dyn PinPlatform>,
    stores: Stores,
    ledger: PinLedger,
    identities: IdentityForwarder,
    replicator: Replicator,
    defaults: GuildDefaults,
}

impl PinEngine {
    pub fn new(
        platform: Arc<dyn PinPlatform>,
        stores: Stores,
        pins: PinsConfig,
        defaults: GuildDefaults,
    ) -> Self {
        let identities = IdentityForwarder::new(
            platform.clone(),
            stores.identities.clone(),
            pins.identity_strategy,
            pins.identity_name.clone(),
            pins.merge_window(),
        );

        Self {
            ledger: PinLedger::new(stores.pins.clone()),
            replicator: Replicator::new(platform.clone(), pins),
            identities,
            platform,
            stores,
            defaults,
        }
    }

    pub fn ledger(&self) -> &PinLedger {
        &self.ledger
    }

    /// Loads the guild's settings, creating them from the defaults on first use.
    pub async fn guild_config(&self, guild_id: u64) -> Result<GuildConfig, PinError> {
        if let Some(config) = self.stores.configs.get_config(guild_id).await? {
            return Ok(config);
        }

        let config = GuildConfig::from_defaults(guild_id, &self.defaults);
        self.stores.configs.save_config(&config).await?;
        info!("created default guild config guild_id={}", guild_id);
        Ok(config)
    }

    /// Pins `message` unless it already has a copy. Reply ancestors are pinned first,
    /// up to the guild's configured depth.
    pub async fn pin(
        &self,
        message: &MessageSnapshot,
        guild_id: u64,
    ) -> Result<PinOutcome, PinError> {
        let config = self.guild_config(guild_id).await?;
        self.pin_with_depth(message, guild_id, config.reply_depth).await
    }

    pub(crate) async fn pin_request(&self, request: &PinRequest) -> Result<PinOutcome, PinError> {
        let outcome = self.pin(&request.message, request.guild_id).await?;
        if let PinOutcome::Pinned(copy) = outcome {
            self.record_stat(request);
            self.notify_author(request, copy).await;
        }
        Ok(outcome)
    }

    fn pin_with_depth<'a>(
        &'a self,
        message: &'a MessageSnapshot,
        guild_id: u64,
        depth: u32,
    ) -> BoxFuture<'a, Result<PinOutcome, PinError>> {
        Box::pin(async move {
            if let Some(location) = self.ledger.lookup(guild_id, message.id).await? {
                debug!(
                    "message already pinned guild_id={} message_id={}",
                    guild_id, message.id
                );
                return Ok(PinOutcome::AlreadyPinned(location));
            }

            self.replicator.ensure_replicable(message).await?;

            let config = self.guild_config(guild_id).await?;
            let channel_id = config
                .channel_id
                .ok_or(PinError::ChannelNotConfigured(guild_id))?;

            if depth > 0 {
                self.pin_reply_chain(message, guild_id, depth).await;
            }

            let identity = self.identities.acquire(guild_id, channel_id).await?;
            let location = self
                .replicator
                .replicate(guild_id, message, &identity)
                .await?;
            self.ledger.record(guild_id, message, location).await?;

            Ok(PinOutcome::Pinned(location))
        })
    }

    /// Webhook and bot authors cannot receive direct messages.
    async fn notify_author(&self, request: &PinRequest, copy: PinLocation) {
        let message = &request.message;
        if message.webhook_id.is_some() || message.author.bot {
            return;
        }
        match self.guild_config(request.guild_id).await {
            Ok(config) if config.dm => {}
            Ok(_) => return,
            Err(err) => {
                warn!(
                    "skipping author notice guild_id={} error={}",
                    request.guild_id, err
                );
                return;
            }
        }

        let platform = self.platform.clone();
        let notice = PinNotice {
            guild_id: request.guild_id,
            author_id: message.author.id,
            source_message_id: message.id,
            copy,
        };
        tokio::spawn(async move {
            match platform.notify_author(&notice).await {
                Ok(()) => debug!(
                    "notified author guild_id={} user_id={} message_id={}",
                    notice.guild_id, notice.author_id, notice.source_message_id
                ),
                Err(err) => warn!(
                    "failed to notify author guild_id={} user_id={} error={}",
                    notice.guild_id, notice.author_id, err
                ),
            }
        });
    }

    fn record_stat(&self, request: &PinRequest) {
        let stats = self.stores.stats.clone();
        let stat = PinStat {
            guild_id: request.guild_id,
            user_id: request.message.author.id,
            emoji: request.trigger.emoji(),
            created_at: Utc::now(),
        };

        tokio::spawn(async move {
            if let Err(err) = stats.add_stat(&stat).await {
                warn!(
                    "failed to record pin stat guild_id={} user_id={} error={}",
                    stat.guild_id, stat.user_id, err
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{PinError, PinNotice, PinOutcome, PinRequest, PinTrigger};
    use crate::config::{IdentityStrategy, PinsConfig};
    use crate::db::{ConfigStore, PinStore, StatsStore};
    use crate::pin::model::MessageKind;
    use crate::pin::testing::{Harness, attachment, message, reply_chain};

    #[tokio::test]
    async fn second_pin_returns_same_location_without_replicating() {
        let harness = Harness::with_channel().await;
        let engine = harness.engine();
        let source = message(10, 20, "pin me");

        let first = engine.pin(&source, Harness::GUILD).await.expect("first pin");
        let sends = harness.platform.sent().len();
        let second = engine.pin(&source, Harness::GUILD).await.expect("second pin");

        assert!(matches!(first, PinOutcome::Pinned(_)));
        assert_eq!(second, PinOutcome::AlreadyPinned(first.location()));
        assert_eq!(harness.platform.sent().len(), sends);
        assert_eq!(harness.store.count_pins(Harness::GUILD).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn guild_without_pin_channel_is_rejected() {
        let harness = Harness::new();
        let engine = harness.engine();

        let result = engine.pin(&message(10, 20, "hi"), Harness::GUILD).await;
        assert!(matches!(result, Err(PinError::ChannelNotConfigured(id)) if id == Harness::GUILD));
        let created = harness
            .store
            .get_config(Harness::GUILD)
            .await
            .expect("query")
            .expect("default config saved");
        assert_eq!(created.threshold, 3);
        assert!(harness.platform.sent().is_empty());
    }

    #[tokio::test]
    async fn unsupported_kind_never_reaches_the_platform() {
        let harness = Harness::with_channel().await;
        let mut source = message(10, 20, "joined");
        source.kind = MessageKind::Other(7);

        let result = harness.engine().pin(&source, Harness::GUILD).await;
        assert!(matches!(result, Err(PinError::NotPinnable(_))));
        assert!(harness.platform.sent().is_empty());
        assert_eq!(harness.platform.created_identities(), 0);
    }

    #[tokio::test]
    async fn reply_prefaces_are_bounded_by_depth() {
        for (ancestors, depth, expected) in [(3, 1, 1), (3, 2, 2), (1, 3, 1), (2, 0, 0)] {
            let harness = Harness::with_channel().await;
            harness.set_reply_depth(depth).await;
            let leaf = reply_chain(&harness.platform, ancestors);

            harness
                .engine()
                .pin(&leaf, Harness::GUILD)
                .await
                .expect("leaf pinned");

            let prefaces = harness
                .platform
                .sent()
                .iter()
                .filter(|sent| sent.message.content.starts_with("-# ↪ replying to"))
                .count();
            assert_eq!(prefaces, expected, "ancestors={ancestors} depth={depth}");
            assert_eq!(
                harness.store.count_pins(Harness::GUILD).await.expect("count"),
                1 + expected as i64
            );
        }
    }

    #[tokio::test]
    async fn preface_links_to_the_parent_copy() {
        let harness = Harness::with_channel().await;
        let leaf = reply_chain(&harness.platform, 1);
        let parent_id = leaf.reference.expect("reply").message_id;

        harness
            .engine()
            .pin(&leaf, Harness::GUILD)
            .await
            .expect("leaf pinned");

        let parent_copy = harness
            .store
            .get_pin(Harness::GUILD, parent_id)
            .await
            .expect("query")
            .expect("parent pinned");
        let sent = harness.platform.sent();
        let preface = sent
            .iter()
            .find(|sent| sent.message.content.starts_with("-# ↪"))
            .expect("preface sent");
        assert!(preface.message.content.ends_with(&format!(
            "/{}/{}",
            parent_copy.dest_channel_id, parent_copy.dest_message_id
        )));
        assert_ne!(preface.identity_id, sent.last().expect("leaf").identity_id);
    }

    #[tokio::test]
    async fn missing_parent_does_not_block_the_reply() {
        let harness = Harness::with_channel().await;
        let mut leaf = message(10, 20, "answer");
        leaf.kind = MessageKind::InlineReply;
        leaf.reference = Some(crate::pin::model::MessageRef {
            channel_id: 20,
            message_id: 9,
        });

        let outcome = harness
            .engine()
            .pin(&leaf, Harness::GUILD)
            .await
            .expect("reply pinned");
        assert!(matches!(outcome, PinOutcome::Pinned(_)));
        assert_eq!(harness.platform.sent().len(), 1);
    }

    #[tokio::test]
    async fn ledger_failure_is_reported_after_sending() {
        let harness = Harness::with_channel().await;
        harness.store.fail_pin_writes(true);

        let result = harness
            .engine()
            .pin(&message(10, 20, "hi"), Harness::GUILD)
            .await;
        assert!(matches!(result, Err(PinError::LedgerWriteFailed(_))));
        assert_eq!(harness.platform.sent().len(), 1);
    }

    #[tokio::test]
    async fn identity_failure_aborts_before_sending() {
        let harness = Harness::with_channel().await;
        harness.platform.fail_identity_creation(true);

        let result = harness
            .engine()
            .pin(&message(10, 20, "hi"), Harness::GUILD)
            .await;
        assert!(matches!(result, Err(PinError::IdentityUnavailable(_))));
        assert!(harness.platform.sent().is_empty());
        assert_eq!(harness.store.count_pins(Harness::GUILD).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn consecutive_pins_use_different_identities() {
        for strategy in [IdentityStrategy::Rotate, IdentityStrategy::Alternate] {
            let harness = Harness::with_channel().await;
            let engine = harness.engine_with(PinsConfig {
                identity_strategy: strategy,
                jump_footer: false,
                ..PinsConfig::default()
            });

            engine.pin(&message(10, 20, "a"), Harness::GUILD).await.expect("a");
            engine.pin(&message(11, 20, "b"), Harness::GUILD).await.expect("b");

            let sent = harness.platform.sent();
            assert_eq!(sent.len(), 2);
            assert_ne!(sent[0].identity_id, sent[1].identity_id, "{strategy:?}");
        }
    }

    #[tokio::test]
    async fn oversized_attachment_set_is_split_into_follow_ups() {
        let harness = Harness::with_channel().await;
        let engine = harness.engine();
        let mut source = message(10, 20, "");
        let mb = 1024 * 1024;
        source.attachments = vec![
            attachment(&harness.platform, 1, "a.bin", 10 * mb),
            attachment(&harness.platform, 2, "b.bin", 20 * mb),
        ];

        let outcome = engine.pin(&source, Harness::GUILD).await.expect("pinned");

        let sent = harness.platform.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].location, outcome.location());
        assert_eq!(sent[0].message.files.len(), 1);
        assert_eq!(sent[1].message.files.len(), 1);
    }

    #[tokio::test]
    async fn successful_request_records_a_stat() {
        let harness = Harness::with_channel().await;
        let engine = harness.engine();
        let request = PinRequest::new(
            Harness::GUILD,
            message(10, 20, "hi"),
            PinTrigger::Reaction {
                emoji: "📌".to_string(),
            },
        );

        engine.pin_request(&request).await.expect("pinned");

        let mut recorded = 0;
        for _ in 0..50 {
            recorded = harness
                .store
                .count_stats_for_user(Harness::GUILD, request.message.author.id)
                .await
                .expect("count");
            if recorded > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(recorded, 1);
        assert_eq!(harness.store.stats()[0].emoji.as_deref(), Some("📌"));
    }

    #[tokio::test]
    async fn failed_follow_up_keeps_sent_messages_and_skips_the_ledger() {
        let harness = Harness::with_channel().await;
        harness.platform.fail_sends_after(1);
        let mut source = message(10, 20, "");
        let mb = 1024 * 1024;
        source.attachments = vec![
            attachment(&harness.platform, 1, "a.bin", 10 * mb),
            attachment(&harness.platform, 2, "b.bin", 20 * mb),
        ];

        let result = harness.engine().pin(&source, Harness::GUILD).await;

        assert!(matches!(result, Err(PinError::ReplicationFailed(_))));
        assert_eq!(harness.platform.sent().len(), 1);
        assert_eq!(harness.store.count_pins(Harness::GUILD).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn unpinnable_parent_does_not_block_the_reply() {
        let harness = Harness::with_channel().await;
        let leaf = reply_chain(&harness.platform, 1);
        let mut parent = message(1, 20, "ancestor 1");
        parent.kind = MessageKind::Other(7);
        harness.platform.add_message(parent);

        let outcome = harness
            .engine()
            .pin(&leaf, Harness::GUILD)
            .await
            .expect("reply pinned");

        assert!(matches!(outcome, PinOutcome::Pinned(_)));
        let sent = harness.platform.sent();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].message.content.starts_with("-# ↪"));
        assert_eq!(harness.store.count_pins(Harness::GUILD).await.expect("count"), 1);
    }

    async fn wait_for_notices(harness: &Harness, expected: usize) -> Vec<PinNotice> {
        for _ in 0..50 {
            let notices = harness.platform.notices();
            if notices.len() >= expected {
                return notices;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        harness.platform.notices()
    }

    #[tokio::test]
    async fn author_is_told_where_the_copy_lives() {
        let harness = Harness::with_channel().await;
        let request = PinRequest::new(
            Harness::GUILD,
            message(10, 20, "hi"),
            PinTrigger::NativePin,
        );

        let outcome = harness.engine().pin_request(&request).await.expect("pinned");

        let notices = wait_for_notices(&harness, 1).await;
        assert_eq!(
            notices,
            vec![PinNotice {
                guild_id: Harness::GUILD,
                author_id: request.message.author.id,
                source_message_id: 10,
                copy: outcome.location(),
            }]
        );
    }

    #[tokio::test]
    async fn authors_are_not_notified_when_disabled_or_unreachable() {
        let harness = Harness::with_channel().await;
        let mut config = harness
            .store
            .get_config(Harness::GUILD)
            .await
            .expect("query")
            .expect("config exists");
        config.dm = false;
        harness.store.save_config(&config).await.expect("save config");
        let engine = harness.engine();

        let quiet = PinRequest::new(Harness::GUILD, message(10, 20, "a"), PinTrigger::NativePin);
        engine.pin_request(&quiet).await.expect("pinned without dm");

        config.dm = true;
        harness.store.save_config(&config).await.expect("save config");
        let mut from_bot = message(11, 20, "b");
        from_bot.author.bot = true;
        let from_bot = PinRequest::new(Harness::GUILD, from_bot, PinTrigger::NativePin);
        engine.pin_request(&from_bot).await.expect("bot message pinned");

        harness.platform.fail_notices(true);
        let closed = PinRequest::new(Harness::GUILD, message(12, 20, "c"), PinTrigger::NativePin);
        let outcome = engine
            .pin_request(&closed)
            .await
            .expect("closed dms do not fail the pin");

        assert!(matches!(outcome, PinOutcome::Pinned(_)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(harness.platform.notices().is_empty());
        assert_eq!(harness.store.count_pins(Harness::GUILD).await.expect("count"), 3);
    }
}
