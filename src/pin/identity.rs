use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::IdentityStrategy;
use crate::db::{IdentityRecord, IdentitySlot, IdentityStore};

use super::error::PinError;
use super::model::RemoteIdentity;
use super::platform::PinPlatform;

/// Hands out channel-bound posting identities so that consecutive pins are never
/// grouped under one sender by the client.
pub struct IdentityForwarder {
    platform: Arc<dyn PinPlatform>,
    store: Arc<dyn IdentityStore>,
    strategy: IdentityStrategy,
    name: String,
    merge_window: Duration,
}

impl IdentityForwarder {
    pub fn new(
        platform: Arc<dyn PinPlatform>,
        store: Arc<dyn IdentityStore>,
        strategy: IdentityStrategy,
        name: impl Into<String>,
        merge_window: Duration,
    ) -> Self {
        Self {
            platform,
            store,
            strategy,
            name: name.into(),
            merge_window,
        }
    }

    pub async fn acquire(&self, guild_id: u64, channel_id: u64) -> Result<RemoteIdentity, PinError> {
        let stored = self
            .store
            .get_identity(guild_id)
            .await
            .map_err(|e| PinError::IdentityUnavailable(e.into()))?;

        match self.strategy {
            IdentityStrategy::Rotate => self.acquire_rotating(guild_id, channel_id, stored).await,
            IdentityStrategy::Alternate => {
                self.acquire_alternating(guild_id, channel_id, stored).await
            }
        }
    }

    async fn acquire_rotating(
        &self,
        guild_id: u64,
        channel_id: u64,
        stored: Option<IdentityRecord>,
    ) -> Result<RemoteIdentity, PinError> {
        let now = Utc::now();
        let had_record = stored.is_some();

        if let Some(mut record) = stored {
            if self.is_bound_to(&record.primary, channel_id).await {
                if !self.used_recently(record.last_used_at, now) {
                    record.last_used_at = Some(now);
                    record.updated_at = now;
                    self.persist(&record, None).await?;
                    return Ok(remote(&record.primary, channel_id));
                }
                debug!(
                    "rotating identity inside merge window guild_id={} identity_id={}",
                    guild_id, record.primary.id
                );
            }
            self.discard(record.primary.id).await;
        }

        let slot = match self.create(channel_id).await {
            Ok(slot) => slot,
            Err(err) => {
                if had_record {
                    self.forget(guild_id).await;
                }
                return Err(err);
            }
        };
        let record = IdentityRecord {
            guild_id,
            primary: slot.clone(),
            secondary: None,
            next_slot: 0,
            last_used_at: Some(now),
            updated_at: now,
        };
        self.persist(&record, Some(slot.id)).await?;
        Ok(remote(&slot, channel_id))
    }

    async fn acquire_alternating(
        &self,
        guild_id: u64,
        channel_id: u64,
        stored: Option<IdentityRecord>,
    ) -> Result<RemoteIdentity, PinError> {
        let now = Utc::now();
        let (primary, secondary, slot_index) = match stored {
            Some(record) => (Some(record.primary), record.secondary, record.next_slot),
            None => (None, None, 0),
        };

        let (current, other) = if slot_index == 0 {
            (primary, secondary)
        } else {
            (secondary, primary)
        };

        let mut created = None;
        let chosen = match current {
            Some(slot) if self.is_bound_to(&slot, channel_id).await => slot,
            stale => {
                if let Some(slot) = stale {
                    self.discard(slot.id).await;
                }
                let slot = self.create(channel_id).await?;
                created = Some(slot.id);
                slot
            }
        };

        let record = match (slot_index, other) {
            (0, secondary) => IdentityRecord {
                guild_id,
                primary: chosen.clone(),
                secondary,
                next_slot: 1,
                last_used_at: Some(now),
                updated_at: now,
            },
            (_, Some(primary)) => IdentityRecord {
                guild_id,
                primary,
                secondary: Some(chosen.clone()),
                next_slot: 0,
                last_used_at: Some(now),
                updated_at: now,
            },
            (_, None) => IdentityRecord {
                guild_id,
                primary: chosen.clone(),
                secondary: None,
                next_slot: 1,
                last_used_at: Some(now),
                updated_at: now,
            },
        };

        self.persist(&record, created).await?;
        Ok(remote(&chosen, channel_id))
    }

    fn used_recently(&self, last_used_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_used_at.is_some_and(|at| now.signed_duration_since(at) < self.merge_window)
    }

    async fn is_bound_to(&self, slot: &IdentitySlot, channel_id: u64) -> bool {
        match self.platform.fetch_identity(slot.id).await {
            Ok(binding) if binding.channel_id == Some(channel_id) => true,
            Ok(binding) => {
                info!(
                    "identity points at an old channel identity_id={} channel_id={:?} expected={}",
                    slot.id, binding.channel_id, channel_id
                );
                false
            }
            Err(err) => {
                warn!("identity lookup failed identity_id={} error={}", slot.id, err);
                false
            }
        }
    }

    async fn create(&self, channel_id: u64) -> Result<IdentitySlot, PinError> {
        let identity = self
            .platform
            .create_identity(channel_id, &self.name)
            .await
            .map_err(PinError::IdentityUnavailable)?;

        if identity.channel_id != channel_id {
            self.discard(identity.id).await;
            return Err(PinError::IdentityUnavailable(anyhow!(
                "identity {} was created in channel {} instead of {}",
                identity.id,
                identity.channel_id,
                channel_id
            )));
        }

        info!(
            "created posting identity identity_id={} channel_id={}",
            identity.id, channel_id
        );
        Ok(IdentitySlot {
            id: identity.id,
            token: identity.token,
        })
    }

    /// Best effort: the endpoint may already be gone.
    async fn discard(&self, identity_id: u64) {
        if let Err(err) = self.platform.delete_identity(identity_id).await {
            debug!(
                "could not delete stale identity identity_id={} error={}",
                identity_id, err
            );
        }
    }

    /// Drops the stored reference once its endpoint is gone and no replacement exists.
    async fn forget(&self, guild_id: u64) {
        if let Err(err) = self.store.delete_identity(guild_id).await {
            warn!(
                "could not clear stored identity guild_id={} error={}",
                guild_id, err
            );
        }
    }

    async fn persist(&self, record: &IdentityRecord, created: Option<u64>) -> Result<(), PinError> {
        if let Err(err) = self.store.set_identity(record).await {
            if let Some(identity_id) = created {
                self.discard(identity_id).await;
            }
            return Err(PinError::IdentityUnavailable(err.into()));
        }
        Ok(())
    }
}

fn remote(slot: &IdentitySlot, channel_id: u64) -> RemoteIdentity {
    RemoteIdentity {
        id: slot.id,
        token: slot.token.clone(),
        channel_id,
    }
}
